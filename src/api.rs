//! # FenceDB Facade
//!
//! The outward handle for one tenant: it resolves nothing and decides
//! nothing, it opens the telemetry span, handles trace-context metadata, and
//! forwards to the configured backend. Multi-tenant hosts typically construct
//! one [`FenceDB`] per request after resolving the ambient tenant in their
//! own middleware.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::backend::EventStoreBackend;
use crate::error::Result;
use crate::query::StreamQuery;
use crate::telemetry::{self, NoopPropagator, TraceContextPropagator};
use crate::types::{EventEnvelope, EventToPersist, Tenant};

/// A tenant-scoped handle over an event store backend.
///
/// Cloneable and cheap to construct; all clones share the backend.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use fencedb::{EventToPersist, EventType, FenceDB, InMemoryBackend, StreamQuery};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> fencedb::Result<()> {
/// let store = FenceDB::new(Arc::new(InMemoryBackend::new()), "acme");
///
/// let event = EventToPersist::new(
///     EventType::new("order-created")?,
///     serde_json::json!({"total": 42}),
/// )
/// .with_tag("order:123".parse()?);
/// store.append(vec![event], None, None).await?;
///
/// let query = StreamQuery::new().with_tag("order:123".parse()?);
/// let envelopes = store.stream(&query, None).await?;
/// assert_eq!(envelopes[0].position(), Some(1));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FenceDB {
    backend: Arc<dyn EventStoreBackend>,
    tenant: Tenant,
    propagator: Arc<dyn TraceContextPropagator>,
}

impl FenceDB {
    /// Creates a handle for one tenant over the given backend.
    pub fn new(backend: Arc<dyn EventStoreBackend>, tenant: impl Into<Tenant>) -> Self {
        Self {
            backend,
            tenant: tenant.into(),
            propagator: Arc::new(NoopPropagator),
        }
    }

    /// Replaces the trace-context propagator (builder pattern).
    pub fn with_propagator(mut self, propagator: Arc<dyn TraceContextPropagator>) -> Self {
        self.propagator = propagator;
        self
    }

    /// The tenant this handle is scoped to.
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Streams the tenant's events matching `query` in position order.
    ///
    /// See [`EventStoreBackend::stream`] for the contract. Envelopes whose
    /// stored trace context is valid come back flagged with
    /// `_trace_context = available`.
    pub async fn stream(
        &self,
        query: &StreamQuery,
        max_count: Option<usize>,
    ) -> Result<Vec<EventEnvelope>> {
        let span = telemetry::stream_span(&self.tenant, query, max_count);
        async {
            let mut envelopes = self.backend.stream(&self.tenant, query, max_count).await?;
            telemetry::flag_trace_context(&mut envelopes);
            Ok(envelopes)
        }
        .instrument(span)
        .await
    }

    /// Appends `events` atomically, optionally fenced by a consistency
    /// boundary.
    ///
    /// See [`EventStoreBackend::append`] for the contract. When the
    /// propagator reports an active trace, its context is written into each
    /// event's metadata before the append.
    pub async fn append(
        &self,
        mut events: Vec<EventToPersist>,
        consistency_boundary: Option<&StreamQuery>,
        expected_last_event_id: Option<Uuid>,
    ) -> Result<Vec<EventEnvelope>> {
        let span = telemetry::append_span(&self.tenant, events.len());
        async {
            if let Some(context) = self.propagator.current() {
                telemetry::inject_trace_context(&mut events, &context);
            }
            for event in &events {
                telemetry::record_event(event);
            }
            self.backend
                .append(
                    &self.tenant,
                    events,
                    consistency_boundary,
                    expected_last_event_id,
                )
                .await
        }
        .instrument(span)
        .await
    }
}
