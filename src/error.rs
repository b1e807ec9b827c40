//! # Error Handling for FenceDB
//!
//! This module defines the error types used throughout FenceDB. A single
//! error enum ([`Error`]) represents all failure modes, which keeps function
//! signatures small and lets callers match on the cases they care about.
//!
//! ## Error Categories
//!
//! | Category | Variants | Typical Response |
//! |----------|----------|------------------|
//! | Conflict | `ConcurrencyConflict` | Re-read, re-decide, retry the append |
//! | Duplicate | `DuplicateEventId` | Treat the original append as the result |
//! | Validation | `InvalidTag`, `InvalidEventType` | Fix the input; raised before any I/O |
//! | Misuse | `ScopeCompleted`, `Config` | Fix the calling code / configuration |
//! | Internal | `Backend` | Log and investigate |
//!
//! The two conflict-shaped variants are *atomic*: when they are returned, the
//! store is guaranteed unchanged by the failed call.

use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in FenceDB operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The consistency boundary grew since the writer last observed it.
    ///
    /// Returned by `append` when a consistency boundary was supplied and at
    /// least one stored event violates it: an event matching the boundary
    /// query exists past the expected last event (or at all, when no expected
    /// event was named). The store is unchanged.
    ///
    /// # Recovery
    ///
    /// 1. Re-stream the boundary query to observe the new events
    /// 2. Re-apply the business decision against the fresh state
    /// 3. Retry the append with an updated expectation
    #[error("concurrency conflict: new events match consistency boundary '{query}'")]
    ConcurrencyConflict {
        /// Canonical string form of the violated boundary query.
        query: String,
        /// The event id the writer expected to be the last match, if any.
        expected_last_event_id: Option<Uuid>,
    },

    /// An append contained an event id that is already stored.
    ///
    /// Event ids are unique across the whole store (all tenants). The failed
    /// append stored nothing, including events before the duplicate in the
    /// same batch.
    #[error("duplicate event id '{id}': already present in the store")]
    DuplicateEventId {
        /// The id that collided.
        id: Uuid,
    },

    /// A tag failed validation at construction time.
    ///
    /// Both sides of a `concept:id` tag must be non-empty and match
    /// `[A-Za-z0-9_-]+`. Raised synchronously, before any I/O.
    #[error("invalid tag '{value}': both sides must be non-empty and match [A-Za-z0-9_-]+")]
    InvalidTag {
        /// The rejected input.
        value: String,
    },

    /// An event type failed validation at construction time.
    ///
    /// Event types must be non-empty and match `[a-z-]+`, or be the literal
    /// query wildcard `"*"`. Raised synchronously, before any I/O.
    #[error("invalid event type '{value}': must be non-empty and match [a-z-]+")]
    InvalidEventType {
        /// The rejected input.
        value: String,
    },

    /// A transaction scope was used after it was committed or rolled back.
    ///
    /// Appends running inside an ambient [`TransactionScope`] require the
    /// scope's transaction to still be open; settling the scope while work
    /// is in flight is a bug in the calling code.
    ///
    /// [`TransactionScope`]: crate::scope::TransactionScope
    #[error("transaction scope already completed")]
    ScopeCompleted,

    /// Invalid backend configuration (bad schema name, unparsable URL, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Any database or I/O error not classifiable above.
    ///
    /// The `#[from]` conversion lets `?` propagate `sqlx` errors directly.
    /// Unique-constraint violations are classified into [`Error::DuplicateEventId`]
    /// by the backend before this conversion applies.
    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
