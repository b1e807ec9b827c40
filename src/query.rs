//! # Stream Queries
//!
//! A [`StreamQuery`] is an immutable predicate over a single event's tags and
//! type. It serves double duty:
//!
//! - as the filter for `stream` (which events to return), and
//! - as a *consistency boundary* for `append` (which events, had they
//!   appeared since the writer last looked, invalidate its decision).
//!
//! ## Matching Rules
//!
//! - Tags, when present: with `requiring_all_tags` every query tag must be on
//!   the event; otherwise one overlapping tag suffices.
//! - Types, when present: with `requiring_all_event_types` the query is only
//!   satisfiable with exactly one type, which the event must equal; otherwise
//!   the event's type must be in the set. The wildcard `"*"` matches any type.
//! - Both dimensions present: AND.
//! - Neither present: the query matches *nothing*. Callers wanting all events
//!   supply the wildcard type.
//!
//! Builders consume and return the query by value, so chains read naturally
//! and every intermediate stays immutable.

use std::collections::BTreeSet;
use std::fmt;

use crate::types::{EventTag, EventType};

// =============================================================================
// StreamQuery
// =============================================================================

/// An immutable predicate over event tags and event types.
///
/// # Example
///
/// ```rust
/// use fencedb::{EventTag, EventType, StreamQuery};
///
/// let query = StreamQuery::new()
///     .with_tag(EventTag::new("order", "123")?)
///     .with_event_type(EventType::new("order-shipped")?)
///     .requiring_all_tags();
/// assert_eq!(
///     query.to_string(),
///     "tag in ['order:123'] AND event type in ['order-shipped']"
/// );
/// # Ok::<(), fencedb::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamQuery {
    tags: BTreeSet<EventTag>,
    types: BTreeSet<EventType>,
    require_all_tags: bool,
    require_all_types: bool,
}

impl StreamQuery {
    /// Creates the empty query (matches nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a query with the given tags added.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = EventTag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Returns a query with one tag added.
    pub fn with_tag(mut self, tag: EventTag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Returns a query with the given event types added.
    pub fn with_event_types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.types.extend(types);
        self
    }

    /// Returns a query with one event type added.
    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.types.insert(event_type);
        self
    }

    /// Returns a query requiring *every* query tag on a matching event.
    pub fn requiring_all_tags(mut self) -> Self {
        self.require_all_tags = true;
        self
    }

    /// Returns a query requiring the event type to equal the single query
    /// type. With more than one type this is unsatisfiable and matches
    /// nothing.
    pub fn requiring_all_event_types(mut self) -> Self {
        self.require_all_types = true;
        self
    }

    /// The tag set of this query.
    pub fn tags(&self) -> &BTreeSet<EventTag> {
        &self.tags
    }

    /// The type set of this query.
    pub fn event_types(&self) -> &BTreeSet<EventType> {
        &self.types
    }

    /// Whether all tags are required on a matching event.
    pub fn require_all_tags(&self) -> bool {
        self.require_all_tags
    }

    /// Whether the single query type must equal the event type.
    pub fn require_all_event_types(&self) -> bool {
        self.require_all_types
    }

    /// True when the query has no conditions at all.
    ///
    /// An empty query matches nothing — in every backend.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.types.is_empty()
    }

    /// True when the query can never match any event.
    ///
    /// Either it is empty, or it requires all of several event types — a
    /// single event has exactly one type.
    pub fn is_unsatisfiable(&self) -> bool {
        self.is_empty() || (self.require_all_types && self.types.len() > 1)
    }

    /// True when the type set contains the wildcard.
    pub fn has_wildcard_type(&self) -> bool {
        self.types.iter().any(EventType::is_wildcard)
    }

    /// Evaluates this query against one event's type and tags.
    pub fn matches(&self, event_type: &EventType, tags: &BTreeSet<EventTag>) -> bool {
        if self.is_empty() {
            return false;
        }

        if !self.tags.is_empty() {
            let tags_match = if self.require_all_tags {
                self.tags.iter().all(|tag| tags.contains(tag))
            } else {
                self.tags.iter().any(|tag| tags.contains(tag))
            };
            if !tags_match {
                return false;
            }
        }

        if !self.types.is_empty() {
            let types_match = if self.require_all_types {
                // Only satisfiable with exactly one required type.
                self.types.len() == 1 && {
                    let only = self.types.iter().next().expect("len checked");
                    only.is_wildcard() || only == event_type
                }
            } else {
                self.types
                    .iter()
                    .any(|ty| ty.is_wildcard() || ty == event_type)
            };
            if !types_match {
                return false;
            }
        }

        true
    }
}

// =============================================================================
// Canonical String Form
// =============================================================================

/// The canonical string form, used for telemetry and logging only.
///
/// - No conditions: `*`
/// - Single dimension: `tag in ['t1','t2']` or `event type in ['e1']`
/// - Both dimensions, joined with ` AND ` if either `requiring_all_*` is set,
///   else ` OR `.
impl fmt::Display for StreamQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "*");
        }

        let tag_part = (!self.tags.is_empty()).then(|| {
            let items: Vec<String> = self.tags.iter().map(|t| format!("'{t}'")).collect();
            format!("tag in [{}]", items.join(","))
        });
        let type_part = (!self.types.is_empty()).then(|| {
            let items: Vec<String> = self.types.iter().map(|t| format!("'{t}'")).collect();
            format!("event type in [{}]", items.join(","))
        });

        match (tag_part, type_part) {
            (Some(tags), Some(types)) => {
                let joiner = if self.require_all_tags || self.require_all_types {
                    " AND "
                } else {
                    " OR "
                };
                write!(f, "{tags}{joiner}{types}")
            }
            (Some(tags), None) => write!(f, "{tags}"),
            (None, Some(types)) => write!(f, "{types}"),
            (None, None) => unreachable!("empty handled above"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
