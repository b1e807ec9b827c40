//! # Telemetry
//!
//! Span creation around the two entry points, and W3C trace-context plumbing
//! through event metadata. This module fixes the *contract*; exporting spans
//! anywhere is the host application's `tracing` subscriber's business, and a
//! missing subscriber makes every span a free no-op — span creation cannot
//! fail.
//!
//! Trace context rides inside event metadata: on append, an active context is
//! written under [`TRACEPARENT_KEY`] / [`TRACESTATE_KEY`]; on stream, a
//! [`TRACE_CONTEXT_KEY`]` = available` flag is added when the stored
//! `traceparent` parses as a valid context. Where the context comes from is
//! abstracted behind [`TraceContextPropagator`] so the core never depends on
//! a specific tracing exporter.

use std::sync::LazyLock;

use regex::Regex;
use tracing::Span;

use crate::query::StreamQuery;
use crate::types::{
    EventEnvelope, EventToPersist, Tenant, TRACEPARENT_KEY, TRACESTATE_KEY,
    TRACE_CONTEXT_AVAILABLE, TRACE_CONTEXT_KEY,
};

// =============================================================================
// Trace Context
// =============================================================================

/// W3C `traceparent`: version, 16-byte trace id, 8-byte parent id, flags.
static TRACEPARENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[0-9a-f]{2}-[0-9a-f]{32}-[0-9a-f]{16}-[0-9a-f]{2}$").expect("traceparent pattern")
});

/// A serialised W3C trace context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// The `traceparent` header value.
    pub traceparent: String,
    /// The optional `tracestate` header value.
    pub tracestate: Option<String>,
}

impl TraceContext {
    /// True when the `traceparent` value is well-formed.
    pub fn is_valid(&self) -> bool {
        is_valid_traceparent(&self.traceparent)
    }
}

/// True when `value` is a well-formed W3C `traceparent`.
pub fn is_valid_traceparent(value: &str) -> bool {
    TRACEPARENT_RE.is_match(value)
}

/// Source of the active trace context, if any.
///
/// The default is [`NoopPropagator`]; hosts running a tracing exporter plug
/// in an implementation that serialises their current span context.
pub trait TraceContextPropagator: Send + Sync {
    /// The context of the active trace, or `None` when no trace is active.
    fn current(&self) -> Option<TraceContext>;
}

/// A propagator that never reports an active trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPropagator;

impl TraceContextPropagator for NoopPropagator {
    fn current(&self) -> Option<TraceContext> {
        None
    }
}

// =============================================================================
// Spans
// =============================================================================

/// The span wrapping a `stream` call; its name carries the canonical query.
pub(crate) fn stream_span(tenant: &Tenant, query: &StreamQuery, max_count: Option<usize>) -> Span {
    tracing::info_span!(
        "Stream",
        tenant = %tenant,
        query = %query,
        events.max = max_count.unwrap_or(0)
    )
}

/// The span wrapping an `append` call.
pub(crate) fn append_span(tenant: &Tenant, event_count: usize) -> Span {
    tracing::info_span!("Append", tenant = %tenant, events.count = event_count)
}

/// Attaches one per-event record to the current span.
pub(crate) fn record_event(event: &EventToPersist) {
    let tags: Vec<String> = event.tags.iter().map(ToString::to_string).collect();
    tracing::debug!(
        event.id = %event.id,
        event.r#type = %event.event_type,
        event.tags = %tags.join(","),
        "appending event"
    );
}

// =============================================================================
// Metadata Plumbing
// =============================================================================

/// Writes the active context into each event's metadata before append.
///
/// Reserved keys belong to the core: anything the caller put there is
/// overwritten.
pub(crate) fn inject_trace_context(events: &mut [EventToPersist], context: &TraceContext) {
    for event in events.iter_mut() {
        event
            .metadata
            .insert(TRACEPARENT_KEY.to_string(), context.traceparent.clone());
        match &context.tracestate {
            Some(state) => {
                event
                    .metadata
                    .insert(TRACESTATE_KEY.to_string(), state.clone());
            }
            None => {
                event.metadata.remove(TRACESTATE_KEY);
            }
        }
    }
}

/// Flags envelopes whose stored `traceparent` parses as a valid context.
pub(crate) fn flag_trace_context(envelopes: &mut [EventEnvelope]) {
    for envelope in envelopes.iter_mut() {
        let valid = envelope
            .metadata
            .get(TRACEPARENT_KEY)
            .is_some_and(|value| is_valid_traceparent(value));
        if valid {
            envelope.metadata.insert(
                TRACE_CONTEXT_KEY.to_string(),
                TRACE_CONTEXT_AVAILABLE.to_string(),
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
