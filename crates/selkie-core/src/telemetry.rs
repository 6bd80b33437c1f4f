//! Telemetry and observability infrastructure
//!
//! TigerStyle: Explicit telemetry configuration with bounded resource usage.
//!
//! Library crates emit `tracing` events and never install a global
//! subscriber; binaries and tests call [`init_telemetry`] once at process
//! boundaries.

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed
    #[error("failed to initialize tracing subscriber: {reason}")]
    SubscriberInit { reason: String },
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name included in startup logs
    pub service_name: String,
    /// Log level filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to emit human-readable logs to stdout
    pub stdout_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "selkie".to_string(),
            log_level: "info".to_string(),
            stdout_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Disable stdout logging
    pub fn without_stdout(mut self) -> Self {
        self.stdout_enabled = false;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - `SELKIE_SERVICE_NAME`: service name (default: "selkie")
    /// - `RUST_LOG`: log level filter (default: "info")
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("SELKIE_SERVICE_NAME").unwrap_or_else(|_| "selkie".to_string());
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            service_name,
            log_level,
            stdout_enabled: true,
        }
    }
}

/// Initialize the tracing subscriber
///
/// Sets up an env-filtered fmt subscriber. Returns a guard for symmetry with
/// exporters that need flushing on shutdown.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.stdout_enabled {
        Some(tracing_subscriber::fmt::layer())
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit {
            reason: e.to_string(),
        })?;

    tracing::info!(service = %config.service_name, "telemetry initialized");

    Ok(TelemetryGuard {})
}

/// Guard returned by [`init_telemetry`]
pub struct TelemetryGuard {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "selkie");
        assert!(config.stdout_enabled);
    }

    #[test]
    fn test_telemetry_config_builder() {
        let config = TelemetryConfig::new("test-service")
            .with_log_level("debug")
            .without_stdout();

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.log_level, "debug");
        assert!(!config.stdout_enabled);
    }
}
