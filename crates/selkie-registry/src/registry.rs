//! Registry trait and watcher contract
//!
//! TigerStyle: Explicit trait seams so discovery backends are pluggable.

use crate::error::{RegistryError, RegistryResult};
use crate::service::Service;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happened to a service in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Service was registered
    Create,
    /// Service record changed
    Update,
    /// Service (or some of its nodes) was deregistered
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for Action {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(RegistryError::UnknownAction {
                action: other.to_string(),
            }),
        }
    }
}

/// A service change observed by a registry watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// What happened
    pub action: Action,
    /// The service the action applies to
    pub service: Service,
}

impl RegistryEvent {
    /// Create a new event
    pub fn new(action: Action, service: Service) -> Self {
        Self { action, service }
    }
}

/// The registry contract consumed by the router
///
/// Domains partition services administratively; `"*"` is the wildcard.
///
/// # Guarantees
/// - `get_service` returns every version record of a service
/// - watchers observe every accepted register/deregister
#[async_trait]
pub trait Registry: Send + Sync {
    /// Register a service record, merging nodes into an existing version
    async fn register(&self, service: &Service) -> RegistryResult<()>;

    /// Deregister the given nodes of a service
    ///
    /// A service with no nodes deregisters the whole record.
    async fn deregister(&self, service: &Service) -> RegistryResult<()>;

    /// List all services in a domain (`"*"` for all domains)
    async fn list_services(&self, domain: &str) -> RegistryResult<Vec<Service>>;

    /// Get all versions of a service
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if the service does not exist.
    async fn get_service(&self, name: &str, domain: &str) -> RegistryResult<Vec<Service>>;

    /// Open a watcher for service changes in a domain
    async fn watch(&self, domain: &str) -> RegistryResult<Box<dyn RegistryWatcher>>;
}

/// Stream of registry events
#[async_trait]
pub trait RegistryWatcher: Send {
    /// Return the next event
    ///
    /// # Errors
    /// Returns [`RegistryError::WatcherStopped`] once the watcher is stopped.
    async fn next(&mut self) -> RegistryResult<RegistryEvent>;

    /// Stop the watcher; idempotent
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip() {
        for action in [Action::Create, Action::Update, Action::Delete] {
            let parsed: Action = action.to_string().parse().unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_action_parse_is_case_insensitive() {
        assert_eq!(Action::from_str("DELETE").unwrap(), Action::Delete);
    }

    #[test]
    fn test_action_parse_unknown() {
        let err = Action::from_str("upsert").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAction { .. }));
    }
}
