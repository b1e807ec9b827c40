//! # Backend Contract
//!
//! Two tenant-scoped operations, implemented by every storage backend:
//! `stream` (ordered read) and `append` (atomic write, optionally fenced by a
//! consistency boundary). Everything else a backend exposes is outside the
//! contract.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::query::StreamQuery;
use crate::types::{EventEnvelope, EventToPersist, Tenant};

/// The storage contract for the event log.
///
/// # `stream`
///
/// Returns all stored events of `tenant` matching `query`, ordered by
/// ascending global position. `max_count` of `Some(n)` with `n > 0` truncates
/// to the first `n` after ordering; `None` and `Some(0)` do not truncate.
/// Each envelope carries the assigned position in
/// `metadata["_position"]` as a decimal string, with all caller metadata
/// preserved. Fails only on backend I/O errors.
///
/// # `append`
///
/// Inserts `events` in input order as one atomic unit: either every event
/// gets a position contiguous with respect to the store's sequence, or none
/// is stored. An empty batch returns empty without side effects.
///
/// When `consistency_boundary` is given, the insert succeeds only if the
/// boundary has not grown:
///
/// - with `expected_last_event_id`: no event of the tenant matching the
///   boundary has a position strictly greater than that event's position (an
///   unknown id degenerates to "no matching events at all");
/// - without it: no event of the tenant matches the boundary at all.
///
/// A violated boundary fails with
/// [`Error::ConcurrencyConflict`](crate::Error::ConcurrencyConflict) and an
/// already-present id with
/// [`Error::DuplicateEventId`](crate::Error::DuplicateEventId); both leave
/// the store unchanged. Returned envelopes mirror the inputs in order, with
/// the assigned positions injected into metadata.
#[async_trait]
pub trait EventStoreBackend: Send + Sync {
    /// Streams the tenant's events matching `query` in position order.
    async fn stream(
        &self,
        tenant: &Tenant,
        query: &StreamQuery,
        max_count: Option<usize>,
    ) -> Result<Vec<EventEnvelope>>;

    /// Appends `events` atomically, fenced by the optional boundary.
    async fn append(
        &self,
        tenant: &Tenant,
        events: Vec<EventToPersist>,
        consistency_boundary: Option<&StreamQuery>,
        expected_last_event_id: Option<Uuid>,
    ) -> Result<Vec<EventEnvelope>>;
}
