//! # Domain Types for FenceDB
//!
//! This module defines the core value objects: tenants, event types, event
//! tags, and the input/output forms of an event. Everything here is a pure
//! value — construction may validate, but nothing touches storage.
//!
//! ## Design Philosophy: Newtypes for Safety
//!
//! Primitive strings are wrapped in single-field structs so that a tenant
//! can never be passed where an event type is expected, and so that the
//! character-class rules for tags and types are enforced exactly once, at
//! construction time.
//!
//! ## Input vs Output Forms
//!
//! - [`EventToPersist`] is what a writer hands to `append`: no position yet.
//! - [`EventEnvelope`] is what readers get back: identity fields unchanged,
//!   with the assigned global position injected into metadata under
//!   [`POSITION_KEY`].
//! - [`StoredEvent`] is the internal stored form carrying the position and
//!   tenant; it only surfaces through the in-memory backend's debugging
//!   accessors.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// Reserved Metadata Keys
// =============================================================================

/// Metadata key carrying the assigned global position as a decimal string.
///
/// Injected by the store into every envelope returned by `append` and
/// `stream`. Callers must not set it themselves.
pub const POSITION_KEY: &str = "_position";

/// Metadata key flagging that a stored trace context parsed as valid.
///
/// Added on `stream` by the facade when the stored [`TRACEPARENT_KEY`] value
/// is a well-formed W3C trace context.
pub const TRACE_CONTEXT_KEY: &str = "_trace_context";

/// Metadata key carrying the serialised W3C `traceparent` header.
pub const TRACEPARENT_KEY: &str = "traceparent";

/// Metadata key carrying the serialised W3C `tracestate` header.
pub const TRACESTATE_KEY: &str = "tracestate";

/// Value stored under [`TRACE_CONTEXT_KEY`] when the context is valid.
pub const TRACE_CONTEXT_AVAILABLE: &str = "available";

// =============================================================================
// Tenant
// =============================================================================

/// An opaque tenant identifier.
///
/// Every operation is scoped by exactly one tenant; the store never crosses
/// tenants within a single query or append. The identifier is treated as an
/// opaque non-empty string — the store does not interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tenant(String);

impl Tenant {
    /// Creates a tenant identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this tenant.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Tenant {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Tenant {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Event Type
// =============================================================================

static EVENT_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z-]+$").expect("event type pattern"));

/// The classification of an event, e.g. `order-created`.
///
/// Valid types are non-empty and match `[a-z-]+`. The literal `"*"` is also
/// accepted: used inside a [`StreamQuery`](crate::query::StreamQuery) type
/// set it matches any event type, which is how callers express "all events"
/// (an empty query matches nothing).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType(String);

impl EventType {
    /// The wildcard type literal, matching any event type in queries.
    pub const WILDCARD: &'static str = "*";

    /// Creates an event type, validating the character class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEventType`] when the input is empty or
    /// contains characters outside `[a-z-]` (the wildcard `"*"` excepted).
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value == Self::WILDCARD || EVENT_TYPE_RE.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidEventType { value })
        }
    }

    /// Creates the wildcard type.
    pub fn wildcard() -> Self {
        Self(Self::WILDCARD.to_string())
    }

    /// Returns true if this is the query wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    /// Returns the string form of this type.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for EventType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.0
    }
}

// =============================================================================
// Event Tag
// =============================================================================

static TAG_SIDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9_-]+$").expect("tag side pattern"));

/// A `(concept, id)` label attached to an event, e.g. `order:123`.
///
/// Tags are the index that dynamic consistency boundaries are built from: a
/// writer tags the entities its decision depended on, and later writers fence
/// their appends on queries over those tags.
///
/// Both sides must be non-empty and match `[A-Za-z0-9_-]+`. The canonical
/// string form is `concept:id`; parsing splits on the *first* colon only,
/// and the character class then rejects any remaining colon in the id side.
///
/// Equality and ordering are structural on the pair, which gives tag sets a
/// deterministic iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventTag {
    concept: String,
    id: String,
}

impl EventTag {
    /// Creates a tag from its two sides, validating both.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTag`] when either side is empty or contains
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn new(concept: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let concept = concept.into();
        let id = id.into();
        if TAG_SIDE_RE.is_match(&concept) && TAG_SIDE_RE.is_match(&id) {
            Ok(Self { concept, id })
        } else {
            Err(Error::InvalidTag {
                value: format!("{concept}:{id}"),
            })
        }
    }

    /// Parses the canonical `concept:id` form, splitting on the first colon.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTag`] when there is no colon or either side
    /// fails validation.
    pub fn parse(value: &str) -> Result<Self> {
        match value.split_once(':') {
            Some((concept, id)) => Self::new(concept, id),
            None => Err(Error::InvalidTag {
                value: value.to_string(),
            }),
        }
    }

    /// The concept side, e.g. `order` in `order:123`.
    pub fn concept(&self) -> &str {
        &self.concept
    }

    /// The id side, e.g. `123` in `order:123`.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.concept, self.id)
    }
}

impl FromStr for EventTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EventTag {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EventTag> for String {
    fn from(value: EventTag) -> Self {
        value.to_string()
    }
}

// =============================================================================
// Events: Input Form
// =============================================================================

/// An event to be appended — the input form, with no position yet.
///
/// The payload is opaque JSON: serialisation of domain events belongs to the
/// layer above the store. Metadata is a flat string-to-string map; the keys
/// [`POSITION_KEY`], [`TRACE_CONTEXT_KEY`], [`TRACEPARENT_KEY`] and
/// [`TRACESTATE_KEY`] are reserved by the core and will be overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventToPersist {
    /// Unique event id. Time-ordered (v7) UUIDs are recommended.
    pub id: Uuid,

    /// The event's classification.
    pub event_type: EventType,

    /// Tags indexing this event for consistency-boundary queries.
    pub tags: BTreeSet<EventTag>,

    /// Opaque JSON payload.
    pub payload: serde_json::Value,

    /// Caller metadata, preserved verbatim on read.
    pub metadata: BTreeMap<String, String>,

    /// Caller-side creation instant.
    pub created: DateTime<Utc>,
}

impl EventToPersist {
    /// Creates an event with a freshly generated time-ordered (v7) id and
    /// the current instant.
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type,
            tags: BTreeSet::new(),
            payload,
            metadata: BTreeMap::new(),
            created: Utc::now(),
        }
    }

    /// Replaces the generated id (builder pattern).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Adds one tag (builder pattern).
    pub fn with_tag(mut self, tag: EventTag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Adds several tags (builder pattern).
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = EventTag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Adds one metadata entry (builder pattern).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Events: Output Form
// =============================================================================

/// A stored event as observed by readers.
///
/// Identity fields are exactly what the writer supplied; the assigned global
/// position rides along in `metadata[`[`POSITION_KEY`]`]` as a decimal
/// string. Envelopes do not carry tags — tags are a write-side index, not
/// part of the read model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The writer-supplied event id.
    pub id: Uuid,

    /// The event's classification.
    pub event_type: EventType,

    /// Opaque JSON payload, verbatim.
    pub payload: serde_json::Value,

    /// Caller metadata plus the reserved keys injected by the core.
    pub metadata: BTreeMap<String, String>,

    /// The writer-supplied creation instant.
    pub created: DateTime<Utc>,
}

impl EventEnvelope {
    /// Parses the assigned global position out of metadata.
    ///
    /// Returns `None` only for envelopes not produced by the store.
    pub fn position(&self) -> Option<i64> {
        self.metadata.get(POSITION_KEY)?.parse().ok()
    }
}

// =============================================================================
// Events: Stored Form
// =============================================================================

/// The internal stored form of an event.
///
/// Carries everything the store knows: the assigned position, the owning
/// tenant, and the write-side tag index. Exposed publicly only through the
/// in-memory backend's debugging accessors; the backend contract speaks
/// [`EventEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Globally monotonic position, shared across all tenants.
    pub position: i64,

    /// The writer-supplied event id (unique across the store).
    pub id: Uuid,

    /// The owning tenant.
    pub tenant: Tenant,

    /// The event's classification.
    pub event_type: EventType,

    /// The write-side tag index.
    pub tags: BTreeSet<EventTag>,

    /// Opaque JSON payload.
    pub payload: serde_json::Value,

    /// Caller metadata as supplied at append time.
    pub metadata: BTreeMap<String, String>,

    /// The writer-supplied creation instant.
    pub created: DateTime<Utc>,
}

impl StoredEvent {
    /// Builds the read-model envelope: identity fields verbatim, position
    /// injected under [`POSITION_KEY`].
    pub fn envelope(&self) -> EventEnvelope {
        let mut metadata = self.metadata.clone();
        metadata.insert(POSITION_KEY.to_string(), self.position.to_string());
        EventEnvelope {
            id: self.id,
            event_type: self.event_type.clone(),
            payload: self.payload.clone(),
            metadata,
            created: self.created,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
