//! In-process counters for the publish and consume sides

use crate::types::{Candidate, RequestMetadata};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tag pair attached to each submitted vote
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionTags {
    pub user_agent: String,
    pub host: String,
}

impl From<&RequestMetadata> for SubmissionTags {
    fn from(meta: &RequestMetadata) -> Self {
        Self {
            user_agent: meta.user_agent.clone().unwrap_or_default(),
            host: meta.host.clone().unwrap_or_default(),
        }
    }
}

/// Publisher-side metrics
#[derive(Debug, Default)]
pub struct VoteMetrics {
    submitted: RwLock<HashMap<SubmissionTags, u64>>,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`VoteMetrics`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteMetricsSnapshot {
    pub votes_submitted: u64,
    pub publish_failures: u64,
    pub by_client: Vec<(SubmissionTags, u64)>,
}

impl VoteMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a vote submission, tagged with the client's agent and host
    pub fn record_submitted(&self, meta: &RequestMetadata) -> Result<()> {
        let mut submitted = self
            .submitted
            .write()
            .map_err(|_| Error::internal("Vote metrics write error"))?;

        *submitted.entry(SubmissionTags::from(meta)).or_insert(0) += 1;
        Ok(())
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Submissions recorded for one client tag pair
    pub fn submitted_for(&self, meta: &RequestMetadata) -> Result<u64> {
        let submitted = self
            .submitted
            .read()
            .map_err(|_| Error::internal("Vote metrics read error"))?;

        Ok(submitted
            .get(&SubmissionTags::from(meta))
            .copied()
            .unwrap_or(0))
    }

    pub fn snapshot(&self) -> Result<VoteMetricsSnapshot> {
        let submitted = self
            .submitted
            .read()
            .map_err(|_| Error::internal("Vote metrics read error"))?;

        let mut by_client: Vec<(SubmissionTags, u64)> =
            submitted.iter().map(|(k, v)| (k.clone(), *v)).collect();
        by_client.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(VoteMetricsSnapshot {
            votes_submitted: by_client.iter().map(|(_, n)| n).sum(),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            by_client,
        })
    }
}

/// Consumer-side counters
#[derive(Debug, Default)]
pub struct ConsumerStats {
    processed_one: AtomicU64,
    processed_two: AtomicU64,
    dropped: AtomicU64,
    lost: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStatsSnapshot {
    pub processed: u64,
    pub processed_candidate1: u64,
    pub processed_candidate2: u64,
    /// Messages that failed to decode
    pub dropped: u64,
    /// Decoded votes whose increment failed after auto-ack
    pub lost: u64,
    pub reconnects: u64,
}

impl ConsumerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self, candidate: Candidate) {
        let counter = match candidate {
            Candidate::One => &self.processed_one,
            Candidate::Two => &self.processed_two,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lost(&self) {
        self.lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        let one = self.processed_one.load(Ordering::Relaxed);
        let two = self.processed_two.load(Ordering::Relaxed);

        ConsumerStatsSnapshot {
            processed: one + two,
            processed_candidate1: one,
            processed_candidate2: two,
            dropped: self.dropped.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submitted_votes_are_tagged() {
        let metrics = VoteMetrics::new();
        let firefox = RequestMetadata::new("Firefox", "web-1");
        let curl = RequestMetadata::new("curl", "web-2");

        metrics.record_submitted(&firefox).unwrap();
        metrics.record_submitted(&firefox).unwrap();
        metrics.record_submitted(&curl).unwrap();
        metrics.record_publish_failure();

        assert_eq!(metrics.submitted_for(&firefox).unwrap(), 2);
        assert_eq!(metrics.submitted_for(&curl).unwrap(), 1);

        let snapshot = metrics.snapshot().unwrap();
        assert_eq!(snapshot.votes_submitted, 3);
        assert_eq!(snapshot.publish_failures, 1);
        assert_eq!(snapshot.by_client[0].0.user_agent, "Firefox");
    }

    #[test]
    fn test_consumer_stats() {
        let stats = ConsumerStats::new();
        stats.record_processed(Candidate::One);
        stats.record_processed(Candidate::Two);
        stats.record_processed(Candidate::Two);
        stats.record_dropped();
        stats.record_reconnect();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.processed_candidate2, 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.lost, 0);
        assert_eq!(snapshot.reconnects, 1);
    }
}
