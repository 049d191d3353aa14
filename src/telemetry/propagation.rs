//! Text-map propagation of trace context across process boundaries
//!
//! Two formats are supported and combined by default:
//!
//! - W3C Trace Context: `traceparent: 00-<trace id>-<span id>-<flags>` plus an
//!   opaque `tracestate`
//! - W3C Baggage: `baggage: key1=value1,key2=value2` with percent-encoded
//!   values
//!
//! Extraction never fails. Missing or malformed headers leave the context
//! as it was, which for a fresh extraction means "no parent".

use super::context::{SpanId, TraceContext, TraceFlags, TraceId};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::collections::HashMap;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
pub const BAGGAGE_HEADER: &str = "baggage";

const SUPPORTED_VERSION: &str = "00";
const MAX_BAGGAGE_MEMBERS: usize = 180;
const MAX_BAGGAGE_BYTES: usize = 8192;

/// Characters escaped in baggage keys and values
const BAGGAGE_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b',')
    .add(b';')
    .add(b'=')
    .add(b'\\')
    .add(b'%');

/// Write side of a carrier (message headers, HTTP headers)
pub trait Injector {
    fn set(&mut self, key: &str, value: String);
}

/// Read side of a carrier
pub trait Extractor {
    fn get(&self, key: &str) -> Option<&str>;
}

impl Injector for HashMap<String, String> {
    fn set(&mut self, key: &str, value: String) {
        HashMap::insert(self, key.to_lowercase(), value);
    }
}

impl Extractor for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, &key.to_lowercase()).map(String::as_str)
    }
}

/// A propagation format
pub trait TextMapPropagator: Send + Sync {
    /// Write `cx` into the carrier
    fn inject(&self, cx: &TraceContext, injector: &mut dyn Injector);

    /// Read the carrier on top of `cx`, returning the updated context
    fn extract_with(&self, cx: TraceContext, extractor: &dyn Extractor) -> TraceContext;

    /// Header names this propagator reads and writes
    fn fields(&self) -> Vec<&'static str>;

    /// Read the carrier into a fresh context
    fn extract(&self, extractor: &dyn Extractor) -> TraceContext {
        self.extract_with(TraceContext::empty(), extractor)
    }
}

/// W3C Trace Context (`traceparent` / `tracestate`)
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceContextPropagator;

impl TraceContextPropagator {
    pub fn new() -> Self {
        Self
    }

    fn parse_traceparent(header: &str) -> Option<(TraceId, SpanId, TraceFlags)> {
        let parts: Vec<&str> = header.trim().split('-').collect();
        if parts.len() < 4 {
            return None;
        }

        let version = parts[0];
        if version.len() != 2 || version == "ff" || hex::decode(version).is_err() {
            return None;
        }
        // Version 00 has exactly four fields; later versions may append more
        if version == SUPPORTED_VERSION && parts.len() != 4 {
            return None;
        }

        let trace_id = TraceId::from_hex(parts[1]).filter(TraceId::is_valid)?;
        let span_id = SpanId::from_hex(parts[2]).filter(SpanId::is_valid)?;

        if parts[3].len() != 2 {
            return None;
        }
        let flags = u8::from_str_radix(parts[3], 16).ok()?;

        Some((trace_id, span_id, TraceFlags::new(flags)))
    }
}

impl TextMapPropagator for TraceContextPropagator {
    fn inject(&self, cx: &TraceContext, injector: &mut dyn Injector) {
        if !cx.is_valid() {
            return;
        }

        injector.set(
            TRACEPARENT_HEADER,
            format!(
                "{}-{}-{}-{:02x}",
                SUPPORTED_VERSION,
                cx.trace_id,
                cx.span_id,
                cx.flags.bits() & TraceFlags::SAMPLED.bits()
            ),
        );

        if let Some(state) = cx.trace_state.as_deref().filter(|s| !s.is_empty()) {
            injector.set(TRACESTATE_HEADER, state.to_string());
        }
    }

    fn extract_with(&self, mut cx: TraceContext, extractor: &dyn Extractor) -> TraceContext {
        let Some(header) = extractor.get(TRACEPARENT_HEADER) else {
            return cx;
        };

        match Self::parse_traceparent(header) {
            Some((trace_id, span_id, flags)) => {
                cx.trace_id = trace_id;
                cx.span_id = span_id;
                cx.parent_span_id = None;
                cx.flags = flags;
                cx.trace_state = extractor
                    .get(TRACESTATE_HEADER)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
            }
            None => {
                tracing::debug!("Ignoring malformed traceparent header: {}", header);
            }
        }

        cx
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![TRACEPARENT_HEADER, TRACESTATE_HEADER]
    }
}

/// W3C Baggage (`baggage`)
#[derive(Debug, Clone, Copy, Default)]
pub struct BaggagePropagator;

impl BaggagePropagator {
    pub fn new() -> Self {
        Self
    }
}

impl TextMapPropagator for BaggagePropagator {
    fn inject(&self, cx: &TraceContext, injector: &mut dyn Injector) {
        if cx.baggage.is_empty() {
            return;
        }

        let header = cx
            .baggage
            .iter()
            .take(MAX_BAGGAGE_MEMBERS)
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k.trim(), BAGGAGE_ENCODE_SET),
                    utf8_percent_encode(v, BAGGAGE_ENCODE_SET)
                )
            })
            .collect::<Vec<_>>()
            .join(",");

        if header.len() > MAX_BAGGAGE_BYTES {
            tracing::warn!(
                "⚠️  Baggage of {} bytes exceeds {} byte limit, not propagated",
                header.len(),
                MAX_BAGGAGE_BYTES
            );
            return;
        }

        injector.set(BAGGAGE_HEADER, header);
    }

    fn extract_with(&self, mut cx: TraceContext, extractor: &dyn Extractor) -> TraceContext {
        let Some(header) = extractor.get(BAGGAGE_HEADER) else {
            return cx;
        };

        if header.len() > MAX_BAGGAGE_BYTES {
            tracing::debug!("Ignoring oversized baggage header ({} bytes)", header.len());
            return cx;
        }

        for member in header.split(',').take(MAX_BAGGAGE_MEMBERS) {
            // Member properties after ';' are not carried
            let pair = member.split(';').next().unwrap_or_default();
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };

            let key = percent_decode_str(key.trim()).decode_utf8();
            let value = percent_decode_str(value.trim()).decode_utf8();

            match (key, value) {
                (Ok(key), Ok(value)) if !key.is_empty() => {
                    cx.baggage.insert(key.into_owned(), value.into_owned());
                }
                _ => tracing::debug!("Ignoring malformed baggage member: {}", member),
            }
        }

        cx
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![BAGGAGE_HEADER]
    }
}

/// Runs several propagators in order
pub struct CompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator>>,
}

impl CompositePropagator {
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator>>) -> Self {
        Self { propagators }
    }
}

impl Default for CompositePropagator {
    /// Trace context followed by baggage
    fn default() -> Self {
        Self::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ])
    }
}

impl TextMapPropagator for CompositePropagator {
    fn inject(&self, cx: &TraceContext, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject(cx, injector);
        }
    }

    fn extract_with(&self, cx: TraceContext, extractor: &dyn Extractor) -> TraceContext {
        self.propagators
            .iter()
            .fold(cx, |cx, propagator| propagator.extract_with(cx, extractor))
    }

    fn fields(&self) -> Vec<&'static str> {
        self.propagators.iter().flat_map(|p| p.fields()).collect()
    }
}
