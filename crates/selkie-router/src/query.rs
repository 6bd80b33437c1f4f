//! Table query predicates

use crate::route::Route;
use crate::strategy::Strategy;
use selkie_core::constants::DOMAIN_WILDCARD;

/// Predicate set for [`Table::query`](crate::Table::query)
///
/// Unset fields match everything. The strategy is applied to the filtered
/// result and is not itself a predicate: a query with only a strategy and no
/// matches returns an empty set rather than an error.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Match on service name
    pub service: Option<String>,
    /// Match on endpoint address
    pub address: Option<String>,
    /// Match on gateway
    pub gateway: Option<String>,
    /// Match on network; `"*"` matches any
    pub network: Option<String>,
    /// Match on authoring router
    pub router: Option<String>,
    /// Match on link class
    pub link: Option<String>,
    /// Selection strategy applied to the matches
    pub strategy: Option<Strategy>,
}

impl Query {
    /// Create an empty query matching all routes
    pub fn new() -> Self {
        Self::default()
    }

    /// Match on service name
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Match on endpoint address
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Match on gateway
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    /// Match on network
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Match on authoring router
    pub fn with_router(mut self, router: impl Into<String>) -> Self {
        self.router = Some(router.into());
        self
    }

    /// Match on link class
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Apply a selection strategy to the matches
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Check whether any predicate was specified
    pub fn has_predicates(&self) -> bool {
        self.service.is_some()
            || self.address.is_some()
            || self.gateway.is_some()
            || self.network.is_some()
            || self.router.is_some()
            || self.link.is_some()
    }

    /// Check whether a route satisfies every predicate
    pub fn matches(&self, route: &Route) -> bool {
        fn field(want: &Option<String>, have: &str) -> bool {
            match want {
                None => true,
                Some(w) => w == DOMAIN_WILDCARD || w == have,
            }
        }

        let network_ok = match &self.network {
            None => true,
            Some(w) => {
                w == DOMAIN_WILDCARD || route.network == DOMAIN_WILDCARD || *w == route.network
            }
        };

        field(&self.service, &route.service)
            && field(&self.address, &route.address)
            && field(&self.gateway, &route.gateway)
            && network_ok
            && field(&self.router, &route.router)
            && field(&self.link, &route.link)
    }
}
