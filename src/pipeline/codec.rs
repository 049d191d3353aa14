//! Vote message codec
//!
//! The payload is the candidate id as a 4-byte little-endian integer and
//! nothing else. Trace context travels in the message headers.

use crate::pipeline::transport::{Delivery, MessageHeaders, OutgoingMessage};
use crate::telemetry::{TextMapPropagator, TraceContext};
use crate::types::{Candidate, VoteEvent};
use crate::{Error, Result};
use std::sync::Arc;

/// Width of an encoded candidate
pub const PAYLOAD_WIDTH: usize = 4;

/// Encode a candidate as its fixed-width payload
pub fn encode(candidate: Candidate) -> [u8; PAYLOAD_WIDTH] {
    candidate.id().to_le_bytes()
}

/// Decode a payload back into a candidate
///
/// Fails with [`Error::MalformedPayload`] when the length is not
/// [`PAYLOAD_WIDTH`] and with [`Error::UnknownCandidate`] when the integer
/// names no known candidate.
pub fn decode(payload: &[u8]) -> Result<Candidate> {
    let bytes: [u8; PAYLOAD_WIDTH] = payload.try_into().map_err(|_| Error::MalformedPayload {
        expected: PAYLOAD_WIDTH,
        actual: payload.len(),
    })?;

    Candidate::try_from(i32::from_le_bytes(bytes))
}

/// A delivery split back into its parts
#[derive(Debug)]
pub struct DecodedVote {
    /// Context extracted from the headers, empty when none was sent
    pub parent: TraceContext,

    /// Decoded candidate, or the reason the payload was rejected
    pub candidate: Result<Candidate>,
}

/// Combines payload encoding with header propagation
#[derive(Clone)]
pub struct VoteCodec {
    propagator: Arc<dyn TextMapPropagator>,
}

impl VoteCodec {
    pub fn new(propagator: Arc<dyn TextMapPropagator>) -> Self {
        Self { propagator }
    }

    /// Build the outgoing message for a vote, injecting its trace context
    pub fn encode_event(&self, event: &VoteEvent) -> OutgoingMessage {
        let mut headers = MessageHeaders::new();
        self.propagator.inject(&event.trace_context, &mut headers);

        OutgoingMessage {
            payload: encode(event.candidate).to_vec(),
            headers,
            message_id: Some(event.event_id.to_string()),
            timestamp: u64::try_from(event.cast_at.timestamp()).ok(),
        }
    }

    /// Recover the parent context and candidate from a delivery
    ///
    /// Header extraction never fails; a bad payload only affects
    /// `candidate`.
    pub fn decode_delivery(&self, delivery: &Delivery) -> DecodedVote {
        DecodedVote {
            parent: self.propagator.extract(&delivery.headers),
            candidate: decode(&delivery.payload),
        }
    }
}
