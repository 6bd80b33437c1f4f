//! Table mutation events
//!
//! Events are the sole coupling from the table to the advert engine: every
//! accepted mutation emits exactly one event, and adverts are batches of
//! them.

use crate::route::Route;
use selkie_registry::Action;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;

/// Kind of table mutation
///
/// Wire encoding is fixed: `Create=1, Update=2, Delete=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum EventType {
    /// A route was inserted
    Create = 1,
    /// A route's payload was overwritten
    Update = 2,
    /// A route was removed
    Delete = 3,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

impl From<EventType> for Action {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Create => Action::Create,
            EventType::Update => Action::Update,
            EventType::Delete => Action::Delete,
        }
    }
}

/// A single accepted table mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// What happened
    pub event_type: EventType,
    /// When the table accepted the mutation (Unix ms)
    pub timestamp_ms: u64,
    /// The route after the mutation (or the removed route for deletes)
    pub route: Route,
}

impl Event {
    /// Create a new event
    pub fn new(event_type: EventType, timestamp_ms: u64, route: Route) -> Self {
        Self {
            event_type,
            timestamp_ms,
            route,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_encoding() {
        assert_eq!(serde_json::to_string(&EventType::Create).unwrap(), "1");
        assert_eq!(serde_json::to_string(&EventType::Update).unwrap(), "2");
        assert_eq!(serde_json::to_string(&EventType::Delete).unwrap(), "3");

        let parsed: EventType = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, EventType::Delete);
    }

    #[test]
    fn test_event_type_to_action() {
        assert_eq!(Action::from(EventType::Create), Action::Create);
        assert_eq!(Action::from(EventType::Update), Action::Update);
        assert_eq!(Action::from(EventType::Delete), Action::Delete);
    }
}
