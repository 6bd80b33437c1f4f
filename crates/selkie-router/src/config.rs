//! Router configuration
//!
//! TigerStyle: Explicit configuration with bounded values.

use crate::strategy::Strategy;
use selkie_core::constants::{
    ADVERTISE_TICK_MS_DEFAULT, ADVERT_TTL_MS_DEFAULT, PRUNE_INTERVAL_MS_DEFAULT,
    REFRESH_INTERVAL_MS_DEFAULT,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// This router's identifier; stamped on authored routes and adverts
    pub id: String,
    /// Default gateway installed as a wildcard route at start, if any
    pub gateway: Option<String>,
    /// Which routes participate in queries-with-strategy and adverts
    pub advertise: Strategy,
    /// Whether to preload the table from the registry at start
    pub precache: bool,
    /// Interval of the full table refresh; doubles as the route TTL
    pub refresh_interval_ms: u64,
    /// Interval of the prune pass
    pub prune_interval_ms: u64,
    /// Interval at which aggregated events are advertised
    pub advertise_tick_ms: u64,
    /// TTL stamped on outbound adverts
    pub advert_ttl_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            gateway: None,
            advertise: Strategy::All,
            precache: false,
            refresh_interval_ms: REFRESH_INTERVAL_MS_DEFAULT,
            prune_interval_ms: PRUNE_INTERVAL_MS_DEFAULT,
            advertise_tick_ms: ADVERTISE_TICK_MS_DEFAULT,
            advert_ttl_ms: ADVERT_TTL_MS_DEFAULT,
        }
    }
}

impl RouterConfig {
    /// Create a configuration with an explicit router id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the default gateway
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    /// Set the advertise strategy
    pub fn with_advertise(mut self, strategy: Strategy) -> Self {
        self.advertise = strategy;
        self
    }

    /// Enable or disable registry preload at start
    pub fn with_precache(mut self, precache: bool) -> Self {
        self.precache = precache;
        self
    }

    /// Set the refresh interval (and thereby the route TTL)
    pub fn with_refresh_interval(mut self, interval_ms: u64) -> Self {
        self.refresh_interval_ms = interval_ms;
        self
    }

    /// Set the prune interval
    pub fn with_prune_interval(mut self, interval_ms: u64) -> Self {
        self.prune_interval_ms = interval_ms;
        self
    }

    /// Get the refresh interval as a Duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Get the prune interval as a Duration
    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("router id cannot be empty".into());
        }

        if self.refresh_interval_ms == 0
            || self.prune_interval_ms == 0
            || self.advertise_tick_ms == 0
        {
            return Err("intervals must be positive".into());
        }

        // The refresh interval is the route TTL: pruning more coarsely than
        // we refresh would expire live routes.
        if self.refresh_interval_ms <= self.prune_interval_ms {
            return Err("refresh interval must be greater than prune interval".into());
        }

        if self.advert_ttl_ms < self.advertise_tick_ms {
            return Err("advert TTL must cover at least one advertise tick".into());
        }

        Ok(())
    }

    /// Create configuration for testing with short intervals
    pub fn for_testing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            gateway: None,
            advertise: Strategy::All,
            precache: false,
            refresh_interval_ms: 100,
            prune_interval_ms: 20,
            advertise_tick_ms: 50,
            advert_ttl_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RouterConfig::default();
        assert!(!config.id.is_empty());
        assert!(config.gateway.is_none());
        assert_eq!(config.advertise, Strategy::All);
        assert!(!config.precache);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RouterConfig::new("router-1")
            .with_gateway("10.0.0.254")
            .with_advertise(Strategy::Local)
            .with_precache(true);

        assert_eq!(config.id, "router-1");
        assert_eq!(config.gateway.as_deref(), Some("10.0.0.254"));
        assert_eq!(config.advertise, Strategy::Local);
        assert!(config.precache);
    }

    #[test]
    fn test_config_validation() {
        assert!(RouterConfig::for_testing("router-1").validate().is_ok());

        let empty_id = RouterConfig::new("");
        assert!(empty_id.validate().is_err());

        let inverted = RouterConfig::new("router-1")
            .with_refresh_interval(10)
            .with_prune_interval(20);
        assert!(inverted.validate().is_err());

        let zero = RouterConfig::new("router-1").with_prune_interval(0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_config_durations() {
        let config = RouterConfig::default();
        assert!(config.refresh_interval() > config.prune_interval());
    }
}
