#![allow(dead_code)]

use std::sync::Arc;

use fencedb::{
    EventStoreBackend, EventTag, EventToPersist, EventType, FenceDB, InMemoryBackend, StreamQuery,
};

pub fn tag(s: &str) -> EventTag {
    s.parse().expect("valid tag")
}

pub fn ty(s: &str) -> EventType {
    EventType::new(s).expect("valid event type")
}

/// An event with the given type and tags, a fresh v7 id, and a small payload.
pub fn event(event_type: &str, tags: &[&str]) -> EventToPersist {
    EventToPersist::new(ty(event_type), serde_json::json!({"source": "test"}))
        .with_tags(tags.iter().map(|s| tag(s)))
}

/// A query matching events carrying any of the given tags.
pub fn tags_query(tags: &[&str]) -> StreamQuery {
    StreamQuery::new().with_tags(tags.iter().map(|s| tag(s)))
}

/// A query matching every event of the tenant.
pub fn all_events() -> StreamQuery {
    StreamQuery::new().with_event_type(EventType::wildcard())
}

pub fn in_memory() -> Arc<InMemoryBackend> {
    Arc::new(InMemoryBackend::new())
}

pub fn store_for(backend: &Arc<InMemoryBackend>, tenant: &str) -> FenceDB {
    let backend: Arc<dyn EventStoreBackend> = backend.clone();
    FenceDB::new(backend, tenant)
}

/// Positions of the returned envelopes, in order.
pub fn positions(envelopes: &[fencedb::EventEnvelope]) -> Vec<i64> {
    envelopes
        .iter()
        .map(|e| e.position().expect("envelope carries a position"))
        .collect()
}
