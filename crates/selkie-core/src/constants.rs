//! TigerStyle constants for selkie
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Table Refresh & Pruning
// =============================================================================

/// Interval at which the routing table is fully refreshed from the registry
/// (2 min). Doubles as the route TTL: a route not seen for one refresh
/// interval is eligible for pruning.
pub const REFRESH_INTERVAL_MS_DEFAULT: u64 = 120 * 1000;

/// Interval at which expired routes are pruned from the table (10 sec)
pub const PRUNE_INTERVAL_MS_DEFAULT: u64 = 10 * 1000;

/// Delay before reopening a failed registry watcher (1 sec)
pub const REGISTRY_RETRY_DELAY_MS: u64 = 1000;

// =============================================================================
// Advertisement
// =============================================================================

/// Interval at which aggregated table events are advertised (10 sec)
pub const ADVERTISE_TICK_MS_DEFAULT: u64 = 10 * 1000;

/// Time-to-live stamped on outbound adverts (2 min)
pub const ADVERT_TTL_MS_DEFAULT: u64 = 2 * 60 * 1000;

/// Depth of a table watcher's event buffer; oldest events are dropped on
/// overflow
pub const WATCHER_BUFFER_COUNT_DEFAULT: usize = 128;

/// Depth of an advert subscriber's channel
pub const SUBSCRIBER_BUFFER_COUNT_DEFAULT: usize = 128;

// =============================================================================
// Route Defaults
// =============================================================================

/// Metric assigned to routes projected from the local registry
pub const METRIC_LOCAL_DEFAULT: u64 = 1;

/// Link class of routes reachable without crossing the network
pub const LINK_LOCAL: &str = "local";

/// Link class of routes learned from peer routers
pub const LINK_NETWORK: &str = "network";

// =============================================================================
// Domains
// =============================================================================

/// Wildcard domain, matches any administrative domain
pub const DOMAIN_WILDCARD: &str = "*";

/// Domain assigned to services that carry no domain metadata
pub const DOMAIN_DEFAULT: &str = "default";

/// Maximum length of a service name in bytes
pub const SERVICE_NAME_LENGTH_BYTES_MAX: usize = 256;

// Compile-time assertions for constant validity
const _: () = {
    assert!(REFRESH_INTERVAL_MS_DEFAULT > PRUNE_INTERVAL_MS_DEFAULT);
    assert!(ADVERT_TTL_MS_DEFAULT >= ADVERTISE_TICK_MS_DEFAULT);
    assert!(WATCHER_BUFFER_COUNT_DEFAULT >= 1);
    assert!(SUBSCRIBER_BUFFER_COUNT_DEFAULT >= 1);
    assert!(SERVICE_NAME_LENGTH_BYTES_MAX >= 64);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_is_finer_than_refresh() {
        // A route refreshed every interval must survive several prune passes.
        assert!(REFRESH_INTERVAL_MS_DEFAULT / PRUNE_INTERVAL_MS_DEFAULT >= 2);
    }

    #[test]
    fn test_limits_have_units_in_names() {
        // This test documents the naming convention:
        // time limits end in _MS_, count limits end in _COUNT_.
        let _: u64 = REFRESH_INTERVAL_MS_DEFAULT;
        let _: usize = WATCHER_BUFFER_COUNT_DEFAULT;
    }
}
