//! Trace context values carried between pipeline hops
//!
//! Contexts are plain values. Nothing here is stored in a process-wide
//! "current context"; every hop receives its parent explicitly and hands a
//! child to the next one.

use super::sampler::Sampler;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 16-byte trace identifier shared by every hop of one vote
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TraceId([u8; 16]);

impl TraceId {
    /// The all-zero id, never valid on the wire
    pub const INVALID: TraceId = TraceId([0u8; 16]);

    /// Generate a random non-zero trace id
    pub fn random() -> Self {
        loop {
            let bytes = rand::random::<[u8; 16]>();
            if bytes != [0u8; 16] {
                return Self(bytes);
            }
        }
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    /// Parse 32 lowercase hex characters
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 32 || !is_lower_hex(hex) {
            return None;
        }

        let mut bytes = [0u8; 16];
        hex::decode_to_slice(hex, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.to_hex())
    }
}

/// 8-byte identifier of a single hop
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SpanId([u8; 8]);

impl SpanId {
    /// The all-zero id, never valid on the wire
    pub const INVALID: SpanId = SpanId([0u8; 8]);

    /// Generate a random non-zero span id
    pub fn random() -> Self {
        loop {
            let bytes = rand::random::<[u8; 8]>();
            if bytes != [0u8; 8] {
                return Self(bytes);
            }
        }
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Parse 16 lowercase hex characters
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 16 || !is_lower_hex(hex) {
            return None;
        }

        let mut bytes = [0u8; 8];
        hex::decode_to_slice(hex, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self.to_hex())
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Trace flags byte; only the sampled bit is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TraceFlags(u8);

impl TraceFlags {
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_sampled(self) -> bool {
        self.0 & Self::SAMPLED.0 == Self::SAMPLED.0
    }

    pub fn with_sampled(self, sampled: bool) -> Self {
        if sampled {
            Self(self.0 | Self::SAMPLED.0)
        } else {
            Self(self.0 & !Self::SAMPLED.0)
        }
    }
}

/// User-defined key/value pairs travelling with a trace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baggage(BTreeMap<String, String>);

impl Baggage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every entry of `other` over this baggage
    pub fn merge(&mut self, other: &Baggage) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }
}

impl fmt::Display for Baggage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Baggage {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Correlation identifiers of one hop plus the baggage it carries
///
/// An empty context (all-zero ids) means "no parent". Baggage may still be
/// present on an empty context since baggage is propagated independently of
/// the trace identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// Span this context was started from, if any
    pub parent_span_id: Option<SpanId>,
    pub flags: TraceFlags,
    /// Vendor `tracestate` value, passed through untouched
    pub trace_state: Option<String>,
    pub baggage: Baggage,
}

impl TraceContext {
    /// Context with no identifiers and no baggage
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start a new trace, asking the sampler whether to record it
    pub fn new_root(sampler: &Sampler) -> Self {
        let trace_id = TraceId::random();
        Self {
            trace_id,
            span_id: SpanId::random(),
            parent_span_id: None,
            flags: TraceFlags::default().with_sampled(sampler.should_sample(&trace_id)),
            trace_state: None,
            baggage: Baggage::new(),
        }
    }

    /// Start a child of this context, or a new root (keeping baggage) when
    /// this context is empty
    pub fn child_or_root(&self, sampler: &Sampler) -> Self {
        if self.is_valid() {
            Self {
                trace_id: self.trace_id,
                span_id: SpanId::random(),
                parent_span_id: Some(self.span_id),
                flags: self.flags,
                trace_state: self.trace_state.clone(),
                baggage: self.baggage.clone(),
            }
        } else {
            let mut root = Self::new_root(sampler);
            root.baggage = self.baggage.clone();
            root
        }
    }

    /// Both identifiers are non-zero
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key, value);
        self
    }
}
