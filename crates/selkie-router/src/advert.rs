//! Adverts: batches of route events disseminated between routers

use crate::event::Event;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;

/// Kind of advert
///
/// Wire encoding is fixed: `Announce=1, Update=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum AdvertType {
    /// Full-table snapshot sent when advertising begins
    Announce = 1,
    /// Periodic aggregate of table changes
    Update = 2,
}

impl fmt::Display for AdvertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Announce => write!(f, "announce"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// A batch of route events from one router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advert {
    /// Identifier of the origin router
    pub id: String,
    /// Snapshot or periodic aggregate
    pub advert_type: AdvertType,
    /// How long receivers should consider the advert fresh
    pub ttl_ms: u64,
    /// When the advert was published (Unix ms)
    pub timestamp_ms: u64,
    /// The aggregated events
    pub events: Vec<Event>,
}

impl Advert {
    /// Create a new advert
    pub fn new(
        id: impl Into<String>,
        advert_type: AdvertType,
        ttl_ms: u64,
        timestamp_ms: u64,
        events: Vec<Event>,
    ) -> Self {
        Self {
            id: id.into(),
            advert_type,
            ttl_ms,
            timestamp_ms,
            events,
        }
    }
}
