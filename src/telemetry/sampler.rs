//! Head sampling decisions for new root traces

use super::context::TraceId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Decides whether a newly started trace is recorded
///
/// Only consulted when a hop has no valid parent; children always inherit
/// the parent's decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum Sampler {
    #[default]
    AlwaysOn,
    AlwaysOff,
    /// Sample roughly this fraction of traces, decided by the trace id
    TraceIdRatio(f64),
}

impl Sampler {
    pub fn should_sample(&self, trace_id: &TraceId) -> bool {
        match self {
            Sampler::AlwaysOn => true,
            Sampler::AlwaysOff => false,
            Sampler::TraceIdRatio(ratio) => {
                if *ratio >= 1.0 {
                    return true;
                }
                if *ratio <= 0.0 || ratio.is_nan() {
                    return false;
                }

                // Same trace id gives the same answer on every hop
                let upper_bound = (ratio * (1u64 << 63) as f64) as u64;
                let bytes = trace_id.to_bytes();
                let mut low = [0u8; 8];
                low.copy_from_slice(&bytes[8..16]);
                (u64::from_be_bytes(low) >> 1) < upper_bound
            }
        }
    }
}

impl FromStr for Sampler {
    type Err = Error;

    /// Parse `always_on`, `always_off` or `ratio:<fraction>`
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "always_on" => Ok(Sampler::AlwaysOn),
            "always_off" => Ok(Sampler::AlwaysOff),
            other => {
                let ratio = other
                    .strip_prefix("ratio:")
                    .ok_or_else(|| Error::configuration(format!("Unknown sampler: {other}")))?
                    .parse::<f64>()
                    .map_err(|_| Error::configuration(format!("Invalid sampler ratio: {other}")))?;

                if !(0.0..=1.0).contains(&ratio) {
                    return Err(Error::configuration(format!(
                        "Sampler ratio must be within 0..=1, got {ratio}"
                    )));
                }

                Ok(Sampler::TraceIdRatio(ratio))
            }
        }
    }
}
