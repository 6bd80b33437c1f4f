//! Router error types
//!
//! TigerStyle: Explicit error variants with context.

use selkie_registry::RegistryError;
use thiserror::Error;

/// Router-specific errors
#[derive(Error, Debug)]
pub enum RouterError {
    /// A route with the same identity already exists
    #[error("duplicate route for service {service} at {address}")]
    DuplicateRoute { service: String, address: String },

    /// No route matched
    #[error("route not found for service {service}")]
    RouteNotFound { service: String },

    /// Watcher was stopped; clean end-of-stream sentinel
    #[error("table watcher stopped")]
    WatcherStopped,

    /// Invalid configuration
    #[error("invalid router configuration: {reason}")]
    Config { reason: String },

    /// The initial table flush for advertisement failed
    #[error("failed to start advertising: {reason}")]
    AdvertiseFailed { reason: String },

    /// Registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl RouterError {
    /// Create a duplicate route error
    pub fn duplicate_route(service: impl Into<String>, address: impl Into<String>) -> Self {
        Self::DuplicateRoute {
            service: service.into(),
            address: address.into(),
        }
    }

    /// Create a route not found error
    pub fn route_not_found(service: impl Into<String>) -> Self {
        Self::RouteNotFound {
            service: service.into(),
        }
    }

    /// Check if reconciliation paths may absorb this error and continue
    ///
    /// Duplicate creates and missing deletes are expected when replaying
    /// registry or peer state against the table.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRoute { .. } | Self::RouteNotFound { .. }
        )
    }
}

/// Result type for router operations
pub type RouterResult<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RouterError::duplicate_route("auth", "10.0.0.1:8080");
        assert!(err.to_string().contains("auth"));
        assert!(err.to_string().contains("10.0.0.1:8080"));
    }

    #[test]
    fn test_error_recoverable() {
        assert!(RouterError::duplicate_route("a", "b").is_recoverable());
        assert!(RouterError::route_not_found("a").is_recoverable());
        assert!(!RouterError::WatcherStopped.is_recoverable());

        let registry = RouterError::Registry(RegistryError::backend("down"));
        assert!(!registry.is_recoverable());
    }
}
