//! Read side: current tally and administrative reset

use crate::Result;
use crate::config::VoteSettings;
use crate::pipeline::store::CounterStore;
use crate::telemetry::{CLIENT_USER_AGENT, Sampler, TraceContext};
use crate::types::{Candidate, RequestMetadata, Tally, TallyEntry};
use std::sync::Arc;
use tracing::Instrument;

/// Reads and resets the candidate counters
///
/// Reads see whatever the consumer has applied so far; there is no
/// read-your-writes guarantee with respect to a vote just cast.
#[derive(Clone)]
pub struct TallyReader {
    store: Arc<dyn CounterStore>,
    settings: VoteSettings,
    sampler: Sampler,
}

impl TallyReader {
    pub fn new(store: Arc<dyn CounterStore>, settings: VoteSettings, sampler: Sampler) -> Self {
        Self {
            store,
            settings,
            sampler,
        }
    }

    pub fn settings(&self) -> &VoteSettings {
        &self.settings
    }

    /// Current labelled counts; a counter that was never set reads as zero
    ///
    /// Runs as a child of `parent`, or a new root when `parent` is empty.
    pub async fn read(&self, parent: &TraceContext) -> Result<Tally> {
        let cx = parent.child_or_root(&self.sampler);
        self.read_counts().instrument(store_span("get", &cx)).await
    }

    /// Set both counters to zero
    ///
    /// Not atomic with in-flight increments: a vote applied between the two
    /// writes, or right after them, survives the reset.
    pub async fn reset(&self, parent: &TraceContext, meta: &RequestMetadata) -> Result<()> {
        let cx = parent.child_or_root(&self.sampler);
        self.reset_counts(meta)
            .instrument(store_span("reset", &cx))
            .await
    }

    async fn read_counts(&self) -> Result<Tally> {
        let (one, two) = tokio::try_join!(
            self.count(Candidate::One),
            self.count(Candidate::Two)
        )?;

        tracing::info!("📊 Tally read: {} / {}", one, two);
        Ok(Tally {
            candidate1: self.entry(Candidate::One, one),
            candidate2: self.entry(Candidate::Two, two),
        })
    }

    async fn reset_counts(&self, meta: &RequestMetadata) -> Result<()> {
        for candidate in Candidate::ALL {
            self.store.set(&candidate.counter_key(), 0).await?;
        }

        tracing::warn!(
            "🧹 Vote counters reset by client '{}'",
            meta.user_agent_or_unknown()
        );
        Ok(())
    }

    async fn count(&self, candidate: Candidate) -> Result<i64> {
        Ok(self
            .store
            .get(&candidate.counter_key())
            .await?
            .unwrap_or(0))
    }

    fn entry(&self, candidate: Candidate, count: i64) -> TallyEntry {
        TallyEntry {
            label: self.settings.label(candidate).to_string(),
            count,
        }
    }
}

fn store_span(operation: &'static str, cx: &TraceContext) -> tracing::Span {
    tracing::info_span!(
        "redis votes",
        trace_id = %cx.trace_id,
        span_id = %cx.span_id,
        parent_span_id = ?cx.parent_span_id,
        sampled = cx.is_sampled(),
        db.system = "redis",
        db.operation = operation,
        client_ua = cx.baggage.get(CLIENT_USER_AGENT).unwrap_or("unknown"),
    )
}
