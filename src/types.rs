//! # Core Types for the Vote Pipeline
//!
//! This module defines the data that flows through the pipeline: the
//! candidates a vote can name, the counter keys their totals live under,
//! the vote event carried across the queue, and the tally snapshot served
//! to readers.
//!
//! ## Type Categories
//!
//! - [`Candidate`]: the closed set of votable options
//! - [`CounterKey`]: the store key holding one candidate's total
//! - [`VoteEvent`]: a single vote plus the trace context that produced it
//! - [`Tally`] / [`TallyEntry`]: labelled counter snapshot
//! - [`RequestMetadata`]: client details captured at the front end
//!
//! ## Usage Examples
//!
//! ```rust
//! use vote_pipeline::types::{Candidate, CounterKey};
//!
//! let candidate = Candidate::try_from(2).unwrap();
//! assert_eq!(candidate, Candidate::Two);
//! assert_eq!(CounterKey::for_candidate(candidate).as_str(), "vote2_total");
//!
//! assert!(Candidate::try_from(3).is_err());
//! ```

use crate::telemetry::TraceContext;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A votable option
///
/// Candidates are identified on the wire by a small integer. Only the ids
/// listed in [`Candidate::ALL`] are valid; anything else is a protocol
/// violation rather than a vote.
///
/// # Examples
///
/// ```rust
/// use vote_pipeline::types::Candidate;
///
/// assert_eq!(Candidate::One.id(), 1);
/// assert_eq!(Candidate::ALL.len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Candidate {
    One,
    Two,
}

impl Candidate {
    /// Every candidate in this deployment, in display order
    pub const ALL: [Candidate; 2] = [Candidate::One, Candidate::Two];

    /// Wire identifier of the candidate
    pub fn id(self) -> i32 {
        match self {
            Candidate::One => 1,
            Candidate::Two => 2,
        }
    }

    /// Counter key holding this candidate's total
    pub fn counter_key(self) -> CounterKey {
        CounterKey::for_candidate(self)
    }
}

impl TryFrom<i32> for Candidate {
    type Error = Error;

    fn try_from(id: i32) -> Result<Self> {
        match id {
            1 => Ok(Candidate::One),
            2 => Ok(Candidate::Two),
            other => Err(Error::UnknownCandidate(other)),
        }
    }
}

impl From<Candidate> for i32 {
    fn from(candidate: Candidate) -> Self {
        candidate.id()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Store key for one candidate's running total
///
/// Keys are stable for the lifetime of a deployment and map one-to-one to
/// [`Candidate`]s. The vote consumer is the only writer apart from the
/// administrative reset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey(String);

impl CounterKey {
    /// Key for the given candidate (`vote1_total`, `vote2_total`)
    pub fn for_candidate(candidate: Candidate) -> Self {
        Self(format!("vote{}_total", candidate.id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CounterKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single vote travelling through the queue
///
/// Created by the publisher at cast time and consumed by the vote consumer.
/// The trace context is carried in the transport headers, never inside the
/// payload, so the event is split apart by the codec and put back together
/// on the consumer side.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteEvent {
    /// Unique message identifier, used as the AMQP message id
    pub event_id: Uuid,

    /// The candidate this vote is for
    pub candidate: Candidate,

    /// Producer-side trace context for this vote
    pub trace_context: TraceContext,

    /// When the vote was cast
    pub cast_at: DateTime<Utc>,
}

impl VoteEvent {
    /// Create a new vote event stamped with the current time
    pub fn new(candidate: Candidate, trace_context: TraceContext) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            candidate,
            trace_context,
            cast_at: Utc::now(),
        }
    }
}

/// Client details captured from the front-end request
///
/// Used to tag the submitted-votes metric and forwarded to downstream hops
/// as baggage (`ClientUserAgent`, `ClientHost`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub user_agent: Option<String>,
    pub host: Option<String>,
}

impl RequestMetadata {
    pub fn new(user_agent: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            host: Some(host.into()),
        }
    }

    /// User agent for log lines, `unknown` when absent
    pub fn user_agent_or_unknown(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("unknown")
    }
}

/// One candidate's labelled count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    /// Display label configured for the candidate
    pub label: String,

    /// Current counter value, zero when the key was never set
    pub count: i64,
}

/// Snapshot of both counters
///
/// Computed on demand by the tally reader and never cached. Serializes to
/// `{"candidate1": {"label", "count"}, "candidate2": {"label", "count"}}`.
///
/// # Examples
///
/// ```rust
/// use vote_pipeline::types::{Candidate, Tally, TallyEntry};
///
/// let tally = Tally {
///     candidate1: TallyEntry { label: "Cats".to_string(), count: 3 },
///     candidate2: TallyEntry { label: "Dogs".to_string(), count: 5 },
/// };
///
/// assert_eq!(tally.get(Candidate::Two).count, 5);
/// assert_eq!(tally.total(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub candidate1: TallyEntry,
    pub candidate2: TallyEntry,
}

impl Tally {
    /// Entry for a single candidate
    pub fn get(&self, candidate: Candidate) -> &TallyEntry {
        match candidate {
            Candidate::One => &self.candidate1,
            Candidate::Two => &self.candidate2,
        }
    }

    /// Sum of all counts
    pub fn total(&self) -> i64 {
        Candidate::ALL.iter().map(|c| self.get(*c).count).sum()
    }
}
