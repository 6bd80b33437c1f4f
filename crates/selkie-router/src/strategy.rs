//! Advertisement strategies
//!
//! A strategy selects which routes participate in queries and adverts.

use crate::error::RouterError;
use crate::route::Route;
use selkie_core::constants::LINK_LOCAL;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Route selection strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Advertise every route
    #[default]
    All,
    /// Advertise only the lowest-metric route(s) per service
    Best,
    /// Advertise only link-local routes
    Local,
    /// Advertise nothing
    None,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Best => write!(f, "best"),
            Self::Local => write!(f, "local"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for Strategy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "best" => Ok(Self::Best),
            "local" => Ok(Self::Local),
            "none" => Ok(Self::None),
            other => Err(RouterError::Config {
                reason: format!("unknown advertise strategy: {other}"),
            }),
        }
    }
}

impl Strategy {
    /// Check whether a single route passes this strategy's link filter
    ///
    /// `Best` needs the whole candidate set and always passes here.
    pub fn admits(&self, route: &Route) -> bool {
        match self {
            Self::None => false,
            Self::Local => route.link == LINK_LOCAL,
            Self::All | Self::Best => true,
        }
    }
}

/// Filter and rank routes under a strategy
///
/// Results are ordered by ascending metric, tie-broken by router id, so
/// equal inputs always produce equal outputs.
pub fn apply_strategy(mut routes: Vec<Route>, strategy: Strategy) -> Vec<Route> {
    match strategy {
        Strategy::None => return Vec::new(),
        Strategy::Local => routes.retain(|r| r.link == LINK_LOCAL),
        Strategy::Best => {
            let mut best: HashMap<String, u64> = HashMap::new();
            for route in &routes {
                best.entry(route.service.clone())
                    .and_modify(|metric| *metric = (*metric).min(route.metric))
                    .or_insert(route.metric);
            }
            routes.retain(|r| best[&r.service] == r.metric);
        }
        Strategy::All => {}
    }

    routes.sort_by(|a, b| {
        a.metric
            .cmp(&b.metric)
            .then_with(|| a.router.cmp(&b.router))
    });
    routes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> Vec<Route> {
        vec![
            Route::new("auth", "10.0.0.1:8080", "default", "router-b").with_metric(10),
            Route::new("auth", "10.0.0.2:8080", "default", "router-a")
                .with_link("network")
                .with_metric(10),
            Route::new("auth", "10.0.0.3:8080", "default", "router-c").with_metric(50),
            Route::new("cart", "10.0.1.1:8080", "default", "router-a").with_metric(5),
        ]
    }

    #[test]
    fn test_strategy_all_keeps_everything_ordered() {
        let result = apply_strategy(routes(), Strategy::All);
        assert_eq!(result.len(), 4);

        // Ascending metric, router id breaks the tie
        assert_eq!(result[0].service, "cart");
        assert_eq!(result[1].router, "router-a");
        assert_eq!(result[2].router, "router-b");
        assert_eq!(result[3].metric, 50);
    }

    #[test]
    fn test_strategy_best_keeps_minimum_metric_per_service() {
        let result = apply_strategy(routes(), Strategy::Best);

        let auth: Vec<_> = result.iter().filter(|r| r.service == "auth").collect();
        assert_eq!(auth.len(), 2); // both metric-10 ties survive
        assert!(auth.iter().all(|r| r.metric == 10));

        assert_eq!(result.iter().filter(|r| r.service == "cart").count(), 1);
    }

    #[test]
    fn test_strategy_local_filters_link() {
        let result = apply_strategy(routes(), Strategy::Local);
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|r| r.link == LINK_LOCAL));
    }

    #[test]
    fn test_strategy_none_is_empty() {
        assert!(apply_strategy(routes(), Strategy::None).is_empty());
    }

    #[test]
    fn test_strategy_admits() {
        let local = Route::new("auth", "10.0.0.1:8080", "default", "router-a");
        let network = local.clone().with_link("network");

        assert!(Strategy::All.admits(&network));
        assert!(Strategy::Local.admits(&local));
        assert!(!Strategy::Local.admits(&network));
        assert!(!Strategy::None.admits(&local));
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(Strategy::from_str("best").unwrap(), Strategy::Best);
        assert_eq!(Strategy::from_str("LOCAL").unwrap(), Strategy::Local);
        assert!(Strategy::from_str("fastest").is_err());
    }
}
