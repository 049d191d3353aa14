//! Trace context, propagation and metrics for the vote pipeline

pub mod context;
pub mod metrics;
pub mod propagation;
pub mod sampler;

pub use context::{Baggage, SpanId, TraceContext, TraceFlags, TraceId};
pub use metrics::{ConsumerStats, ConsumerStatsSnapshot, VoteMetrics, VoteMetricsSnapshot};
pub use propagation::{
    BaggagePropagator, CompositePropagator, Extractor, Injector, TextMapPropagator,
    TraceContextPropagator,
};
pub use sampler::Sampler;

/// Baggage key carrying the voting client's user agent
pub const CLIENT_USER_AGENT: &str = "ClientUserAgent";

/// Baggage key carrying the host the vote was submitted to
pub const CLIENT_HOST: &str = "ClientHost";
