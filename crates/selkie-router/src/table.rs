//! Routing table
//!
//! Fingerprint-keyed store of routes with deterministic event emission,
//! per-route liveness tracking, and filtered watchers.
//!
//! Concurrency: the route index is behind a readers-writer lock; the watcher
//! registry has its own mutex. Events are pushed to watcher buffers after
//! the index guard is dropped, and pushes never block (watchers drop their
//! oldest event on overflow), so mutators are never held hostage by slow
//! subscribers.

use crate::error::{RouterError, RouterResult};
use crate::event::{Event, EventType};
use crate::query::Query;
use crate::route::Route;
use crate::strategy::{apply_strategy, Strategy};
use crate::watcher::{WatchQuery, Watcher, WatcherShared};
use async_trait::async_trait;
use selkie_core::constants::{DOMAIN_WILDCARD, WATCHER_BUFFER_COUNT_DEFAULT};
use selkie_core::TimeProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

/// Fallback lookup invoked when a service query finds nothing
///
/// The resolved routes are inserted into the table (emitting events) before
/// the query is retried, so cold queries double as table population.
#[async_trait]
pub trait RouteResolver: Send + Sync {
    /// Resolve routes for a service the table does not know
    async fn resolve(&self, service: &str) -> RouterResult<Vec<Route>>;
}

struct StoredRoute {
    route: Route,
    last_seen_ms: u64,
}

struct WatcherHandle {
    filter: WatchQuery,
    shared: Arc<WatcherShared>,
}

/// The routing table
pub struct Table {
    routes: RwLock<HashMap<u64, StoredRoute>>,
    watchers: Mutex<HashMap<String, WatcherHandle>>,
    resolver: Option<Arc<dyn RouteResolver>>,
    time: Arc<dyn TimeProvider>,
}

impl Table {
    /// Create a table without a fallback resolver
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
            resolver: None,
            time,
        }
    }

    /// Create a table with a fallback resolver for cold queries
    pub fn with_resolver(time: Arc<dyn TimeProvider>, resolver: Arc<dyn RouteResolver>) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
            resolver: Some(resolver),
            time,
        }
    }

    /// Insert a new route
    ///
    /// # Errors
    /// Returns [`RouterError::DuplicateRoute`] if a route with the same
    /// fingerprint exists.
    pub async fn create(&self, route: Route) -> RouterResult<()> {
        let fingerprint = route.fingerprint();
        let event = {
            let mut routes = self.routes.write().await;
            if routes.contains_key(&fingerprint) {
                return Err(RouterError::duplicate_route(&route.service, &route.address));
            }
            let now_ms = self.time.now_ms();
            routes.insert(
                fingerprint,
                StoredRoute {
                    route: route.clone(),
                    last_seen_ms: now_ms,
                },
            );
            trace!(service = %route.service, address = %route.address, "route created");
            Event::new(EventType::Create, now_ms, route)
        };

        self.send_event(event).await;
        Ok(())
    }

    /// Upsert a route
    ///
    /// If the route exists its payload (metric, metadata) is overwritten and
    /// its liveness refreshed; an `Update` event is emitted only when the
    /// payload actually changed, so periodic re-registration does not flood
    /// watchers. An absent route falls back to `create`, so reconciling
    /// callers never need to probe existence first.
    pub async fn update(&self, route: Route) -> RouterResult<()> {
        let fingerprint = route.fingerprint();
        let event = {
            let mut routes = self.routes.write().await;
            let now_ms = self.time.now_ms();
            match routes.get_mut(&fingerprint) {
                Some(stored) => {
                    let changed = stored.route.metric != route.metric
                        || stored.route.metadata != route.metadata;
                    stored.route = route.clone();
                    stored.last_seen_ms = now_ms;
                    if !changed {
                        return Ok(());
                    }
                    trace!(service = %route.service, address = %route.address, "route updated");
                    Event::new(EventType::Update, now_ms, route)
                }
                None => {
                    routes.insert(
                        fingerprint,
                        StoredRoute {
                            route: route.clone(),
                            last_seen_ms: now_ms,
                        },
                    );
                    trace!(service = %route.service, address = %route.address, "route created");
                    Event::new(EventType::Create, now_ms, route)
                }
            }
        };

        self.send_event(event).await;
        Ok(())
    }

    /// Remove a route by fingerprint
    ///
    /// # Errors
    /// Returns [`RouterError::RouteNotFound`] if the route is absent.
    pub async fn delete(&self, route: &Route) -> RouterResult<()> {
        let fingerprint = route.fingerprint();
        let event = {
            let mut routes = self.routes.write().await;
            let removed = routes
                .remove(&fingerprint)
                .ok_or_else(|| RouterError::route_not_found(&route.service))?;
            trace!(service = %removed.route.service, address = %removed.route.address, "route deleted");
            Event::new(EventType::Delete, self.time.now_ms(), removed.route)
        };

        self.send_event(event).await;
        Ok(())
    }

    /// Remove every route of a service within a network
    ///
    /// `"*"` matches any network. Emits one `Delete` event per removed
    /// route. Returns the number of routes removed.
    pub async fn delete_service(&self, service: &str, network: &str) -> usize {
        let events = {
            let mut routes = self.routes.write().await;
            let now_ms = self.time.now_ms();
            let matched: Vec<u64> = routes
                .iter()
                .filter(|(_, stored)| {
                    stored.route.service == service
                        && (network == DOMAIN_WILDCARD || stored.route.network == network)
                })
                .map(|(fingerprint, _)| *fingerprint)
                .collect();

            matched
                .into_iter()
                .filter_map(|fingerprint| routes.remove(&fingerprint))
                .map(|stored| Event::new(EventType::Delete, now_ms, stored.route))
                .collect::<Vec<_>>()
        };

        let removed = events.len();
        if removed > 0 {
            debug!(service = %service, network = %network, count = removed, "service wiped from table");
        }
        for event in events {
            self.send_event(event).await;
        }
        removed
    }

    /// Remove routes whose liveness lapsed
    ///
    /// A route not refreshed for longer than `ttl_ms` is removed and a
    /// `Delete` event emitted. Returns the number of routes pruned.
    pub async fn prune_routes(&self, ttl_ms: u64) -> usize {
        let events = {
            let mut routes = self.routes.write().await;
            let now_ms = self.time.now_ms();
            let expired: Vec<u64> = routes
                .iter()
                .filter(|(_, stored)| now_ms.saturating_sub(stored.last_seen_ms) > ttl_ms)
                .map(|(fingerprint, _)| *fingerprint)
                .collect();

            expired
                .into_iter()
                .filter_map(|fingerprint| routes.remove(&fingerprint))
                .map(|stored| Event::new(EventType::Delete, now_ms, stored.route))
                .collect::<Vec<_>>()
        };

        let pruned = events.len();
        if pruned > 0 {
            debug!(count = pruned, ttl_ms = ttl_ms, "pruned expired routes");
        }
        for event in events {
            self.send_event(event).await;
        }
        pruned
    }

    /// Query routes by predicate set and strategy
    ///
    /// When a service predicate finds nothing and a fallback resolver is
    /// configured, the resolver is invoked, its routes inserted, and the
    /// query retried once.
    ///
    /// # Errors
    /// Returns [`RouterError::RouteNotFound`] when nothing matches and at
    /// least one predicate was specified.
    pub async fn query(&self, query: &Query) -> RouterResult<Vec<Route>> {
        let found = self.read_query(query).await;
        if !found.is_empty() {
            return Ok(found);
        }

        if let (Some(service), Some(resolver)) = (&query.service, &self.resolver) {
            match resolver.resolve(service).await {
                Ok(resolved) => {
                    for route in resolved {
                        match self.create(route).await {
                            Ok(()) | Err(RouterError::DuplicateRoute { .. }) => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
                // The resolver not knowing the service is the same miss
                Err(RouterError::RouteNotFound { .. }) => {}
                Err(e) => return Err(e),
            }

            let retried = self.read_query(query).await;
            if !retried.is_empty() {
                return Ok(retried);
            }
        }

        if query.has_predicates() {
            let service = query
                .service
                .clone()
                .unwrap_or_else(|| DOMAIN_WILDCARD.to_string());
            return Err(RouterError::route_not_found(service));
        }
        Ok(Vec::new())
    }

    async fn read_query(&self, query: &Query) -> Vec<Route> {
        let routes = self.routes.read().await;
        let matched: Vec<Route> = routes
            .values()
            .filter(|stored| query.matches(&stored.route))
            .map(|stored| stored.route.clone())
            .collect();
        apply_strategy(matched, query.strategy.unwrap_or(Strategy::All))
    }

    /// List every route in the table
    pub async fn list(&self) -> Vec<Route> {
        let routes = self.routes.read().await;
        routes.values().map(|stored| stored.route.clone()).collect()
    }

    /// Number of routes in the table
    pub async fn len(&self) -> usize {
        self.routes.read().await.len()
    }

    /// Check whether the table is empty
    pub async fn is_empty(&self) -> bool {
        self.routes.read().await.is_empty()
    }

    /// Register a filtered watcher over table events
    pub async fn watch(&self, filter: WatchQuery) -> Watcher {
        let id = Uuid::new_v4().to_string();
        let shared = Arc::new(WatcherShared::new(WATCHER_BUFFER_COUNT_DEFAULT));

        let mut watchers = self.watchers.lock().await;
        watchers.insert(
            id.clone(),
            WatcherHandle {
                filter,
                shared: shared.clone(),
            },
        );
        Watcher::new(id, shared)
    }

    async fn send_event(&self, event: Event) {
        let mut watchers = self.watchers.lock().await;
        // Stopped watchers detach lazily here
        watchers.retain(|_, handle| !handle.shared.is_stopped());
        for handle in watchers.values() {
            if handle.filter.matches(&event.route.service) {
                handle.shared.push(event.clone());
            }
        }
    }
}
