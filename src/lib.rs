//! # FenceDB - Event Log with Dynamic Consistency Boundaries
//!
//! FenceDB is a multi-tenant, append-only event log whose optimistic
//! concurrency control is a *dynamic consistency boundary* (DCB): instead of
//! fencing an append on a single stream's version, a writer describes — as a
//! query over tags and event types — the set of events whose appearance would
//! invalidate its decision. The store accepts the append only if that set has
//! not grown since the writer last read it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        FenceDB (facade)                         │
//! │         tenant scoping · telemetry spans · trace context        │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ EventStoreBackend
//!                ┌──────────────┴───────────────┐
//!                ▼                              ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────────┐
//! │     InMemoryBackend      │   │         PostgresBackend          │
//! │  append mutex + atomic   │   │  one statement checks the        │
//! │  position counter        │   │  boundary AND inserts the batch  │
//! └──────────────────────────┘   └──────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! These hold for every backend and must never be violated:
//!
//! 1. **Global order**: `position` strictly increases across the whole store;
//!    all tenants share one sequence. Committed order equals position order.
//! 2. **Identity**: event ids are unique across the store; events are
//!    immutable once stored.
//! 3. **Atomic appends**: a failed append stores nothing. Readers of the
//!    durable backend observe all of a multi-event append or none of it; the
//!    in-memory reference backend may expose a position-contiguous prefix of
//!    an in-flight batch to a concurrent reader (see the [`memory`] module
//!    docs).
//! 4. **Serialisable fencing**: of two concurrent appends racing on
//!    overlapping boundaries, at most one commits; the other observes a
//!    concurrency conflict.
//! 5. **Tenant isolation**: no query or append ever crosses tenants.
//!
//! ## Module Organization
//!
//! - [`error`]: the error taxonomy (`ConcurrencyConflict`, `DuplicateEventId`, ...)
//! - [`types`]: tenants, event types, tags, and the event input/output forms
//! - [`query`]: [`StreamQuery`], the predicate doubling as consistency boundary
//! - [`backend`]: the two-operation storage contract
//! - [`memory`]: the in-memory reference backend
//! - [`schema`]: PostgreSQL DDL and bootstrap
//! - [`postgres`]: the durable backend with the atomic check-and-insert
//! - [`scope`]: ambient transaction scopes for multi-append units of work
//! - [`telemetry`]: spans around the entry points, trace-context plumbing
//! - [`api`]: the [`FenceDB`] facade

/// Error types for all FenceDB operations.
pub mod error;

/// Domain value types: tenants, event types, tags, events.
pub mod types;

/// Stream queries: the predicate over tags and types.
pub mod query;

/// The backend storage contract.
pub mod backend;

/// In-memory reference backend.
pub mod memory;

/// PostgreSQL schema DDL and bootstrap.
pub mod schema;

/// PostgreSQL backend.
pub mod postgres;

/// Ambient transaction scopes.
pub mod scope;

/// Telemetry spans and trace-context handling.
pub mod telemetry;

/// The outward facade.
pub mod api;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::FenceDB;
pub use backend::EventStoreBackend;
pub use error::{Error, Result};
pub use memory::InMemoryBackend;
pub use postgres::{PostgresBackend, PostgresConfig};
pub use query::StreamQuery;
pub use scope::TransactionScope;
pub use telemetry::{NoopPropagator, TraceContext, TraceContextPropagator};
pub use types::{
    EventEnvelope, EventTag, EventToPersist, EventType, StoredEvent, Tenant, POSITION_KEY,
    TRACEPARENT_KEY, TRACESTATE_KEY, TRACE_CONTEXT_KEY,
};
