//! # In-Memory Backend
//!
//! The reference implementation of the backend contract. Correctness is easy
//! to see here, which is the point: the durable backend must be observably
//! equivalent under the shared integration suite.
//!
//! ## Concurrency Model
//!
//! - `append` serialises on one process-wide async mutex. Boundary
//!   evaluation, duplicate detection, and insertion all happen under it, so
//!   the check-then-insert is trivially serialisable.
//! - `stream` never takes the append mutex. It takes the state read-lock just
//!   long enough to snapshot the tenant's events. A concurrent reader may see
//!   a prefix of an in-flight append — every event is inserted only after its
//!   position is stamped — but never a torn event.
//! - Positions come from an atomic counter shared by all tenants; the first
//!   accepted event gets position 1.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::EventStoreBackend;
use crate::error::{Error, Result};
use crate::query::StreamQuery;
use crate::types::{EventEnvelope, EventToPersist, StoredEvent, Tenant};

// =============================================================================
// State
// =============================================================================

#[derive(Default)]
struct State {
    /// tenant → (event id → stored event)
    tenants: HashMap<Tenant, HashMap<Uuid, StoredEvent>>,

    /// Every stored id, across all tenants. Ids are globally unique.
    ids: HashSet<Uuid>,
}

impl State {
    fn tenant_events(&self, tenant: &Tenant) -> Option<&HashMap<Uuid, StoredEvent>> {
        self.tenants.get(tenant)
    }
}

// =============================================================================
// Backend
// =============================================================================

/// In-memory event store backend.
///
/// Not durable; intended for tests and as the executable specification of
/// the append/stream semantics.
#[derive(Default)]
pub struct InMemoryBackend {
    /// Process-wide append serialisation.
    append_lock: Mutex<()>,

    /// The shared store, readable without the append lock.
    state: RwLock<State>,

    /// Last assigned global position (0 = nothing stored yet).
    position: AtomicI64,
}

impl InMemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Debugging Accessors (not part of the backend contract)
    // =========================================================================

    /// All stored events of a tenant, in position order.
    pub fn events_for_tenant(&self, tenant: &Tenant) -> Vec<StoredEvent> {
        let state = self.state.read().expect("state lock poisoned");
        let mut events: Vec<StoredEvent> = state
            .tenant_events(tenant)
            .map(|events| events.values().cloned().collect())
            .unwrap_or_default();
        events.sort_by_key(|event| event.position);
        events
    }

    /// Total number of stored events, across all tenants.
    pub fn len(&self) -> usize {
        self.state.read().expect("state lock poisoned").ids.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when an event with this id is stored (any tenant).
    pub fn contains(&self, id: Uuid) -> bool {
        self.state
            .read()
            .expect("state lock poisoned")
            .ids
            .contains(&id)
    }

    // =========================================================================
    // Boundary Evaluation
    // =========================================================================

    /// Evaluates the consistency boundary against the tenant's events.
    ///
    /// Returns `true` when the boundary is violated: a matching event exists
    /// past the expected last event's position (or at all, when no expected
    /// id is given). An unknown expected id is treated as position -1, which
    /// degenerates to "no matching events at all".
    fn boundary_violated(
        state: &State,
        tenant: &Tenant,
        boundary: &StreamQuery,
        expected_last_event_id: Option<Uuid>,
    ) -> bool {
        let Some(events) = state.tenant_events(tenant) else {
            return false;
        };

        let fence = expected_last_event_id
            .and_then(|id| events.get(&id).map(|event| event.position))
            .unwrap_or(-1);

        events
            .values()
            .any(|event| event.position > fence && boundary.matches(&event.event_type, &event.tags))
    }
}

#[async_trait]
impl EventStoreBackend for InMemoryBackend {
    async fn stream(
        &self,
        tenant: &Tenant,
        query: &StreamQuery,
        max_count: Option<usize>,
    ) -> Result<Vec<EventEnvelope>> {
        // Snapshot under the read lock only; an empty query matches nothing
        // through the predicate itself.
        let mut matching: Vec<StoredEvent> = {
            let state = self.state.read().expect("state lock poisoned");
            state
                .tenant_events(tenant)
                .map(|events| {
                    events
                        .values()
                        .filter(|event| query.matches(&event.event_type, &event.tags))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        matching.sort_by_key(|event| event.position);
        if let Some(limit) = max_count.filter(|n| *n > 0) {
            matching.truncate(limit);
        }

        Ok(matching.iter().map(StoredEvent::envelope).collect())
    }

    async fn append(
        &self,
        tenant: &Tenant,
        events: Vec<EventToPersist>,
        consistency_boundary: Option<&StreamQuery>,
        expected_last_event_id: Option<Uuid>,
    ) -> Result<Vec<EventEnvelope>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let _append = self.append_lock.lock().await;

        // All validation happens before the first insert so a failed append
        // stores nothing.
        {
            let state = self.state.read().expect("state lock poisoned");

            let mut batch_ids = HashSet::with_capacity(events.len());
            for event in &events {
                if state.ids.contains(&event.id) || !batch_ids.insert(event.id) {
                    return Err(Error::DuplicateEventId { id: event.id });
                }
            }

            if let Some(boundary) = consistency_boundary {
                if Self::boundary_violated(&state, tenant, boundary, expected_last_event_id) {
                    return Err(Error::ConcurrencyConflict {
                        query: boundary.to_string(),
                        expected_last_event_id,
                    });
                }
            }
        }

        // Insert one event at a time, each visible only once its position is
        // stamped. Readers snapshotting mid-append see a prefix of the batch;
        // the envelopes returned below are what makes the append observable
        // as a whole.
        let mut envelopes = Vec::with_capacity(events.len());
        for event in events {
            let position = self.position.fetch_add(1, Ordering::SeqCst) + 1;
            let stored = StoredEvent {
                position,
                id: event.id,
                tenant: tenant.clone(),
                event_type: event.event_type,
                tags: event.tags,
                payload: event.payload,
                metadata: event.metadata,
                created: event.created,
            };
            envelopes.push(stored.envelope());

            let mut state = self.state.write().expect("state lock poisoned");
            state.ids.insert(stored.id);
            state
                .tenants
                .entry(tenant.clone())
                .or_default()
                .insert(stored.id, stored);
        }

        Ok(envelopes)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;

    fn event(ty: &str, tag: &str) -> EventToPersist {
        EventToPersist::new(EventType::new(ty).unwrap(), serde_json::json!({}))
            .with_tag(tag.parse().unwrap())
    }

    #[tokio::test]
    async fn test_debug_accessors() {
        let backend = InMemoryBackend::new();
        let tenant = Tenant::new("acme");
        assert!(backend.is_empty());

        let appended = backend
            .append(&tenant, vec![event("order-created", "order:1")], None, None)
            .await
            .unwrap();

        assert_eq!(backend.len(), 1);
        assert!(backend.contains(appended[0].id));
        assert!(!backend.contains(Uuid::new_v4()));

        let stored = backend.events_for_tenant(&tenant);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].position, 1);
        assert_eq!(stored[0].tenant, tenant);
    }

    #[tokio::test]
    async fn test_positions_are_shared_across_tenants() {
        let backend = InMemoryBackend::new();
        backend
            .append(&Tenant::new("a"), vec![event("order-created", "order:1")], None, None)
            .await
            .unwrap();
        let second = backend
            .append(&Tenant::new("b"), vec![event("order-created", "order:1")], None, None)
            .await
            .unwrap();

        // One global sequence: tenant b's first event takes position 2.
        assert_eq!(second[0].position(), Some(2));
    }
}
