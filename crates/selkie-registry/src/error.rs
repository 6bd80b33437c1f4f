//! Registry error types
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

/// Registry-specific errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Service not found in the registry
    #[error("service not found: {service}")]
    NotFound { service: String },

    /// Watcher was stopped; clean end-of-stream sentinel
    #[error("registry watcher stopped")]
    WatcherStopped,

    /// Service failed validation
    #[error("invalid service: {name}, reason: {reason}")]
    InvalidService { name: String, reason: String },

    /// Event carried an action string the registry does not know
    #[error("unknown registry action: {action}")]
    UnknownAction { action: String },

    /// Backend operation failed
    #[error("registry backend error: {reason}")]
    Backend { reason: String },
}

impl RegistryError {
    /// Create a service not found error
    pub fn not_found(service: impl Into<String>) -> Self {
        Self::NotFound {
            service: service.into(),
        }
    }

    /// Create a backend error
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// Check if this error indicates a retriable condition
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
