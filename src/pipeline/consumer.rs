//! Vote consumer: queue → counter store
//!
//! A single long-running worker per deployment. Messages are acknowledged
//! by the broker on delivery and only then applied to the store, so a
//! store failure or a crash mid-message loses that vote.

use crate::config::QueueConfig;
use crate::pipeline::codec::VoteCodec;
use crate::pipeline::store::CounterStore;
use crate::pipeline::transport::{Delivery, QueueSpec, QueueTransport, Subscription};
use crate::telemetry::{ConsumerStats, Sampler, TextMapPropagator, TraceContext};
use crate::types::Candidate;
use crate::{Error, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

/// Lifecycle of the consumer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Declaring the queue and subscribing, retrying with backoff
    Connecting,
    /// Waiting for the next delivery
    Subscribed,
    /// Applying a delivery to the store
    Processing,
    /// Stop signal received
    Stopped,
}

/// Exponential backoff between subscribe attempts
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Give up after this many consecutive failures; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            base: config.reconnect_base(),
            max: config.reconnect_max(),
            max_attempts: None,
        }
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(10));
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// What happened to a single delivery
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Counter incremented to `total`
    Applied { candidate: Candidate, total: i64 },
    /// Payload could not be decoded; the message was discarded
    Dropped(Error),
    /// Store rejected the increment after the message was acknowledged
    Lost { candidate: Candidate, error: Error },
}

/// Result of handling one delivery
#[derive(Debug)]
pub struct DeliveryReport {
    /// Consumer-side context, a child of the extracted producer context
    pub context: TraceContext,
    pub outcome: DeliveryOutcome,
}

/// Subscribes to the vote queue and applies each vote to its counter
pub struct VoteConsumer {
    transport: Arc<dyn QueueTransport>,
    store: Arc<dyn CounterStore>,
    codec: VoteCodec,
    queue: QueueSpec,
    sampler: Sampler,
    reconnect: ReconnectPolicy,
    stats: Arc<ConsumerStats>,
    state: watch::Sender<ConsumerState>,
}

impl VoteConsumer {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        store: Arc<dyn CounterStore>,
        queue: QueueSpec,
        propagator: Arc<dyn TextMapPropagator>,
        sampler: Sampler,
        reconnect: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Connecting);
        Self {
            transport,
            store,
            codec: VoteCodec::new(propagator),
            queue,
            sampler,
            reconnect,
            stats: Arc::new(ConsumerStats::new()),
            state,
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }

    /// Run until `stop_signal` fires
    ///
    /// Deliveries are handled one at a time. When the subscription ends or
    /// reports a lost connection the consumer re-declares the queue and
    /// subscribes again. Returns an error only when reconnecting is given up
    /// or the transport rejects the subscription outright.
    ///
    /// Dropping every sender of `stop_signal` also stops the consumer, so
    /// callers must keep a sender alive for as long as it should run. The
    /// state is `Stopped` whenever this returns, on success or error.
    pub async fn run(&self, mut stop_signal: mpsc::Receiver<()>) -> Result<()> {
        tracing::info!("🚀 Vote consumer started on queue '{}'", self.queue.name);

        'session: loop {
            let mut subscription = match self.connect(&mut stop_signal).await {
                Ok(Some(subscription)) => subscription,
                Ok(None) => break,
                Err(e) => {
                    self.set_state(ConsumerState::Stopped);
                    tracing::error!("❌ Vote consumer stopped: {}", e);
                    return Err(e);
                }
            };

            loop {
                tokio::select! {
                    next = subscription.next() => match next {
                        Some(Ok(delivery)) => {
                            self.set_state(ConsumerState::Processing);
                            self.handle_delivery(&delivery).await;
                            self.set_state(ConsumerState::Subscribed);
                        }
                        Some(Err(e)) => {
                            tracing::warn!("🔌 Subscription to '{}' interrupted: {}", self.queue.name, e);
                            break;
                        }
                        None => {
                            tracing::warn!("🔌 Subscription to '{}' closed by broker", self.queue.name);
                            break;
                        }
                    },
                    signal = stop_signal.recv() => {
                        log_stop(signal);
                        break 'session;
                    }
                }
            }

            self.stats.record_reconnect();
        }

        self.set_state(ConsumerState::Stopped);
        tracing::info!("✅ Vote consumer stopped");
        Ok(())
    }

    /// Declare and subscribe, backing off between failures
    ///
    /// `Ok(None)` means the stop signal arrived while waiting.
    async fn connect(&self, stop_signal: &mut mpsc::Receiver<()>) -> Result<Option<Subscription>> {
        let mut attempt = 0u32;

        loop {
            self.set_state(ConsumerState::Connecting);

            let error = match self.subscribe().await {
                Ok(subscription) => {
                    self.set_state(ConsumerState::Subscribed);
                    tracing::info!("📥 Subscribed to queue '{}'", self.queue.name);
                    return Ok(Some(subscription));
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }
            attempt += 1;
            if let Some(max) = self.reconnect.max_attempts {
                if attempt >= max {
                    tracing::error!(
                        "❌ Giving up on queue '{}' after {} attempts: {}",
                        self.queue.name,
                        attempt,
                        error
                    );
                    return Err(error);
                }
            }

            let delay = self.reconnect.delay(attempt - 1);
            tracing::warn!(
                "⚠️  Subscribe attempt {} failed: {} (retrying in {:?})",
                attempt,
                error,
                delay
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                signal = stop_signal.recv() => {
                    log_stop(signal);
                    return Ok(None);
                }
            }
        }
    }

    async fn subscribe(&self) -> Result<Subscription> {
        self.transport.declare_queue(&self.queue).await?;
        self.transport.subscribe(&self.queue.name, true).await
    }

    /// Decode one delivery and apply it to the store
    ///
    /// Never fails: decode errors drop the message and store errors lose the
    /// vote, both are logged and counted.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> DeliveryReport {
        let decoded = self.codec.decode_delivery(delivery);
        let context = decoded.parent.child_or_root(&self.sampler);

        let span = tracing::info_span!(
            "rabbitmq receive",
            trace_id = %context.trace_id,
            span_id = %context.span_id,
            parent_span_id = ?context.parent_span_id,
            sampled = context.is_sampled(),
            messaging.system = "rabbitmq",
            messaging.destination_kind = "queue",
            messaging.rabbitmq.queue = %self.queue.name,
            delivery_tag = delivery.delivery_tag,
            baggage = %context.baggage,
        );

        let outcome = self.apply(decoded.candidate).instrument(span).await;
        DeliveryReport { context, outcome }
    }

    async fn apply(&self, candidate: Result<Candidate>) -> DeliveryOutcome {
        let candidate = match candidate {
            Ok(candidate) => candidate,
            Err(e) => {
                self.stats.record_dropped();
                tracing::warn!("⚠️  Dropping undecodable vote message: {}", e);
                return DeliveryOutcome::Dropped(e);
            }
        };

        match self.store.increment(&candidate.counter_key()).await {
            Ok(total) => {
                self.stats.record_processed(candidate);
                tracing::info!("✅ Counted vote for candidate {} (total {})", candidate, total);
                DeliveryOutcome::Applied { candidate, total }
            }
            Err(error) => {
                self.stats.record_lost();
                tracing::error!("❌ Vote for candidate {} lost: {}", candidate, error);
                DeliveryOutcome::Lost { candidate, error }
            }
        }
    }
}

fn log_stop(signal: Option<()>) {
    match signal {
        Some(()) => tracing::info!("🛑 Vote consumer stopping"),
        None => tracing::warn!("🛑 Stop handle dropped, vote consumer stopping"),
    }
}
