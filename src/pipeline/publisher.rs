//! Vote publisher: front end → queue

use crate::pipeline::codec::VoteCodec;
use crate::pipeline::transport::{QueueSpec, QueueTransport};
use crate::telemetry::{CLIENT_HOST, CLIENT_USER_AGENT, Sampler, TextMapPropagator, TraceContext, VoteMetrics};
use crate::types::{Candidate, RequestMetadata, VoteEvent};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::Instrument;

/// Publishes cast votes onto the vote queue
///
/// Publishing is fire-and-forget: success means the broker accepted the
/// message, not that it was counted. There is no retry here; a failed
/// publish is reported to the caller as [`Error::TransportUnavailable`].
pub struct VotePublisher {
    transport: Arc<dyn QueueTransport>,
    codec: VoteCodec,
    queue: QueueSpec,
    sampler: Sampler,
    metrics: Arc<VoteMetrics>,
}

impl VotePublisher {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        queue: QueueSpec,
        propagator: Arc<dyn TextMapPropagator>,
        sampler: Sampler,
        metrics: Arc<VoteMetrics>,
    ) -> Self {
        Self {
            transport,
            codec: VoteCodec::new(propagator),
            queue,
            sampler,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<VoteMetrics> {
        &self.metrics
    }

    pub fn queue(&self) -> &QueueSpec {
        &self.queue
    }

    /// Cast a vote for `candidate` on behalf of the calling request
    ///
    /// Starts a producer context under `parent` (or a new root when `parent`
    /// is empty), attaches the client's agent and host as baggage, and
    /// publishes. Returns the event that was handed to the broker.
    pub async fn cast_vote(
        &self,
        candidate: Candidate,
        parent: &TraceContext,
        meta: &RequestMetadata,
    ) -> Result<VoteEvent> {
        tracing::info!("🗳️  Received vote for candidate {}", candidate);

        if let Err(e) = self.metrics.record_submitted(meta) {
            tracing::warn!("⚠️  Failed to record vote metric: {}", e);
        }

        let mut cx = parent.child_or_root(&self.sampler);
        if let Some(user_agent) = &meta.user_agent {
            cx.baggage.insert(CLIENT_USER_AGENT, user_agent.as_str());
        }
        if let Some(host) = &meta.host {
            cx.baggage.insert(CLIENT_HOST, host.as_str());
        }

        let event = VoteEvent::new(candidate, cx);
        let span = tracing::info_span!(
            "rabbitmq publish",
            trace_id = %event.trace_context.trace_id,
            span_id = %event.trace_context.span_id,
            parent_span_id = ?event.trace_context.parent_span_id,
            sampled = event.trace_context.is_sampled(),
            messaging.system = "rabbitmq",
            messaging.destination_kind = "queue",
            messaging.rabbitmq.queue = %self.queue.name,
            message_id = %event.event_id,
            client_ua = meta.user_agent_or_unknown(),
        );

        self.publish_event(&event).instrument(span).await?;
        Ok(event)
    }

    async fn publish_event(&self, event: &VoteEvent) -> Result<()> {
        let message = self.codec.encode_event(event);

        // Declared before every publish; repeating it is a no-op on the broker
        let published = match self.transport.declare_queue(&self.queue).await {
            Ok(()) => self.transport.publish(&self.queue.name, &message).await,
            Err(e) => Err(e),
        };

        if let Err(e) = published {
            self.metrics.record_publish_failure();
            tracing::error!(
                "❌ Failed to publish vote for candidate {}: {}",
                event.candidate,
                e
            );
            return Err(match e {
                Error::TransportUnavailable { .. } => e,
                other => Error::transport(other.to_string()),
            });
        }

        tracing::info!(
            "📤 Published message on queue '{}' for candidate {}",
            self.queue.name,
            event.candidate
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::transport::InMemoryTransport;
    use crate::telemetry::{CompositePropagator, TraceContextPropagator};
    use futures::StreamExt;

    fn publisher(transport: Arc<InMemoryTransport>) -> VotePublisher {
        VotePublisher::new(
            transport,
            QueueSpec::new("votes"),
            Arc::new(CompositePropagator::default()),
            Sampler::AlwaysOn,
            Arc::new(VoteMetrics::new()),
        )
    }

    #[tokio::test]
    async fn test_cast_vote_publishes_with_context() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = publisher(transport.clone());
        let meta = RequestMetadata::new("Firefox", "web-1");

        let event = publisher
            .cast_vote(Candidate::One, &TraceContext::empty(), &meta)
            .await
            .unwrap();

        assert!(event.trace_context.is_valid());
        assert_eq!(event.trace_context.baggage.get(CLIENT_USER_AGENT), Some("Firefox"));
        assert_eq!(event.trace_context.baggage.get(CLIENT_HOST), Some("web-1"));
        assert_eq!(transport.queue_depth("votes"), 1);
        assert_eq!(publisher.metrics().submitted_for(&meta).unwrap(), 1);

        let mut subscription = transport.subscribe("votes", true).await.unwrap();
        let delivery = subscription.next().await.unwrap().unwrap();
        let parent = TraceContextPropagator::new().extract(&delivery.headers);
        assert_eq!(parent.trace_id, event.trace_context.trace_id);
        assert_eq!(parent.span_id, event.trace_context.span_id);
    }

    #[tokio::test]
    async fn test_child_of_valid_parent() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = publisher(transport);
        let parent = TraceContext::new_root(&Sampler::AlwaysOn);

        let event = publisher
            .cast_vote(Candidate::Two, &parent, &RequestMetadata::default())
            .await
            .unwrap();

        assert_eq!(event.trace_context.trace_id, parent.trace_id);
        assert_eq!(event.trace_context.parent_span_id, Some(parent.span_id));
        assert!(event.trace_context.baggage.is_empty());
    }

    #[tokio::test]
    async fn test_declares_before_every_publish() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = publisher(transport.clone());

        for _ in 0..3 {
            publisher
                .cast_vote(Candidate::One, &TraceContext::empty(), &RequestMetadata::default())
                .await
                .unwrap();
        }

        assert_eq!(transport.declaration_count(), 3);
        assert_eq!(transport.queue_depth("votes"), 3);
    }

    #[tokio::test]
    async fn test_outage_reports_transport_unavailable() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = publisher(transport.clone());
        transport.set_available(false);

        let result = publisher
            .cast_vote(Candidate::One, &TraceContext::empty(), &RequestMetadata::default())
            .await;

        assert!(matches!(result, Err(Error::TransportUnavailable { .. })));
        assert_eq!(publisher.metrics().snapshot().unwrap().publish_failures, 1);
        assert_eq!(transport.queue_depth("votes"), 0);
    }
}
