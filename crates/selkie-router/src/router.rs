//! Router facade
//!
//! Owns the routing table and the registry-sync and advert machinery:
//! - start/close lifecycle with a single shutdown signal
//! - registry preload, periodic refresh and TTL pruning
//! - watch-driven incremental sync with reinit support
//! - lazily started advert engine and inbound advert application
//!
//! The table knows nothing of the engine; everything downstream of it speaks
//! through table watchers, which is what keeps the table/advert/table cycle
//! acyclic in ownership terms.

use crate::advert::{Advert, AdvertType};
use crate::advertise::{aggregate_loop, publish_advert, table_forward_loop, SubscriberMap};
use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult};
use crate::event::{Event, EventType};
use crate::query::Query;
use crate::route::Route;
use crate::table::{RouteResolver, Table};
use crate::watcher::{WatchQuery, Watcher};
use async_trait::async_trait;
use selkie_core::constants::{
    DOMAIN_WILDCARD, LINK_LOCAL, METRIC_LOCAL_DEFAULT, REGISTRY_RETRY_DELAY_MS,
    SUBSCRIBER_BUFFER_COUNT_DEFAULT, WATCHER_BUFFER_COUNT_DEFAULT,
};
use selkie_core::{TimeProvider, WallClockTime};
use selkie_registry::{Action, Registry, RegistryError, RegistryEvent, RegistryWatcher, Service};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

#[derive(Default)]
struct RunState {
    running: bool,
    shutdown: Option<broadcast::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Service-discovery-driven router
///
/// Mirrors a registry into a routing table and disseminates table changes
/// as adverts. See the crate docs for the data flow.
pub struct Router {
    config: Arc<RwLock<RouterConfig>>,
    registry: Arc<dyn Registry>,
    table: Arc<Table>,
    time: Arc<dyn TimeProvider>,
    run: Mutex<RunState>,
    reinit: broadcast::Sender<()>,
    subscribers: Arc<Mutex<SubscriberMap>>,
    engine: Mutex<Option<mpsc::Sender<Event>>>,
}

impl Router {
    /// Create a router over the given registry
    ///
    /// # Errors
    /// Returns [`RouterError::Config`] if the configuration is invalid.
    pub fn new(config: RouterConfig, registry: Arc<dyn Registry>) -> RouterResult<Self> {
        Self::with_clock(config, registry, Arc::new(WallClockTime::new()))
    }

    /// Create a router with an injected time provider (for tests)
    pub fn with_clock(
        config: RouterConfig,
        registry: Arc<dyn Registry>,
        time: Arc<dyn TimeProvider>,
    ) -> RouterResult<Self> {
        config
            .validate()
            .map_err(|reason| RouterError::Config { reason })?;

        // The resolver holds the registry, not the router, so cold-query
        // fallback does not create an ownership cycle.
        let resolver: Arc<dyn RouteResolver> = Arc::new(RegistryResolver {
            registry: registry.clone(),
            router_id: config.id.clone(),
        });
        let table = Arc::new(Table::with_resolver(time.clone(), resolver));
        let (reinit, _) = broadcast::channel(1);

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            registry,
            table,
            time,
            run: Mutex::new(RunState::default()),
            reinit,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            engine: Mutex::new(None),
        })
    }

    /// Start the router; idempotent
    ///
    /// Optionally preloads the table from the registry, installs the default
    /// gateway route, and launches the refresh, prune and registry-watch
    /// tasks.
    pub async fn start(&self) -> RouterResult<()> {
        let mut run = self.run.lock().await;
        if run.running {
            return Ok(());
        }

        let config = self.config.read().await.clone();

        if config.precache {
            load_routes(self.registry.as_ref(), &self.table, &config).await?;
        }

        if let Some(gateway) = &config.gateway {
            let route = Route::default_gateway(gateway, &config.id);
            self.table
                .create(route)
                .await
                .map_err(|e| RouterError::Config {
                    reason: format!("failed adding default gateway route: {e}"),
                })?;
        }

        let (shutdown, _) = broadcast::channel(1);

        // Periodic full refresh pins live routes against pruning
        {
            let registry = self.registry.clone();
            let table = self.table.clone();
            let config = self.config.clone();
            let time = self.time.clone();
            let mut shutdown = shutdown.subscribe();
            run.tasks.push(tokio::spawn(async move {
                loop {
                    let interval_ms = config.read().await.refresh_interval_ms;
                    tokio::select! {
                        _ = time.sleep_ms(interval_ms) => {
                            let snapshot = config.read().await.clone();
                            if let Err(e) =
                                load_routes(registry.as_ref(), &table, &snapshot).await
                            {
                                debug!(error = %e, "failed refreshing registry routes");
                            }
                        }
                        _ = shutdown.recv() => break,
                    }
                }
            }));
        }

        // Periodic prune expires routes the refresh no longer sees. The TTL
        // is the refresh interval: the two are one knob on purpose.
        {
            let table = self.table.clone();
            let config = self.config.clone();
            let time = self.time.clone();
            let mut shutdown = shutdown.subscribe();
            run.tasks.push(tokio::spawn(async move {
                loop {
                    let (prune_ms, ttl_ms) = {
                        let config = config.read().await;
                        (config.prune_interval_ms, config.refresh_interval_ms)
                    };
                    tokio::select! {
                        _ = time.sleep_ms(prune_ms) => {
                            table.prune_routes(ttl_ms).await;
                        }
                        _ = shutdown.recv() => break,
                    }
                }
            }));
        }

        // Incremental sync from the registry watcher
        {
            let registry = self.registry.clone();
            let table = self.table.clone();
            let config = self.config.clone();
            let time = self.time.clone();
            let mut shutdown = shutdown.subscribe();
            let mut reinit = self.reinit.subscribe();
            run.tasks.push(tokio::spawn(async move {
                registry_watch_loop(registry, table, config, time, &mut shutdown, &mut reinit)
                    .await;
            }));
        }

        run.shutdown = Some(shutdown);
        run.running = true;
        info!(router_id = %config.id, "router started");
        Ok(())
    }

    /// Hot-reconfigure the router
    ///
    /// The registry watcher reopens so a swapped registry or domain change
    /// takes effect.
    pub async fn init(&self, config: RouterConfig) -> RouterResult<()> {
        config
            .validate()
            .map_err(|reason| RouterError::Config { reason })?;
        *self.config.write().await = config;
        let _ = self.reinit.send(());
        Ok(())
    }

    /// Snapshot of the current configuration
    pub async fn options(&self) -> RouterConfig {
        self.config.read().await.clone()
    }

    /// Handle to the routing table
    pub fn table(&self) -> Arc<Table> {
        self.table.clone()
    }

    /// Query routes; equivalent to `table().query`
    pub async fn lookup(&self, query: &Query) -> RouterResult<Vec<Route>> {
        self.table.query(query).await
    }

    /// Watch table events
    pub async fn watch(&self, filter: WatchQuery) -> Watcher {
        self.table.watch(filter).await
    }

    /// Subscribe to outbound adverts, lazily starting the advert engine
    ///
    /// The first subscription flushes the whole table (under the configured
    /// strategy) into one `Announce` advert; afterwards aggregated `Update`
    /// adverts are published on every tick. Every call returns a fresh
    /// subscriber stream.
    pub async fn advertise(&self) -> RouterResult<mpsc::Receiver<Advert>> {
        self.start().await?;

        let mut engine = self.engine.lock().await;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_COUNT_DEFAULT);
        let subscriber_id = Uuid::new_v4().to_string();

        if engine.is_some() {
            self.subscribers.lock().await.insert(subscriber_id, tx);
            return Ok(rx);
        }

        // Watch before flushing so no mutation falls between snapshot and
        // stream; duplicates collapse in the aggregator.
        let table_watcher = self.table.watch(WatchQuery::new()).await;

        let config = self.config.read().await.clone();
        let events = self
            .flush_route_events(EventType::Create)
            .await
            .map_err(|e| RouterError::AdvertiseFailed {
                reason: format!("failed to flush routes: {e}"),
            })?;

        let (mut announce_shutdown, forward_shutdown, aggregate_shutdown) = {
            let run = self.run.lock().await;
            match run.shutdown.as_ref() {
                Some(shutdown) => (
                    shutdown.subscribe(),
                    shutdown.subscribe(),
                    shutdown.subscribe(),
                ),
                None => {
                    return Err(RouterError::AdvertiseFailed {
                        reason: "router is not running".into(),
                    })
                }
            }
        };

        self.subscribers.lock().await.insert(subscriber_id, tx);

        debug!(
            router_id = %config.id,
            routes = events.len(),
            strategy = %config.advertise,
            "advertising started"
        );
        let announce = Advert::new(
            config.id.clone(),
            AdvertType::Announce,
            config.advert_ttl_ms,
            self.time.now_ms(),
            events,
        );
        publish_advert(&self.subscribers, announce, &mut announce_shutdown).await;

        let (event_tx, event_rx) = mpsc::channel(WATCHER_BUFFER_COUNT_DEFAULT);
        *engine = Some(event_tx.clone());

        let mut run = self.run.lock().await;
        run.tasks.push(tokio::spawn(table_forward_loop(
            self.table.clone(),
            self.time.clone(),
            table_watcher,
            event_tx,
            forward_shutdown,
        )));
        run.tasks.push(tokio::spawn(aggregate_loop(
            self.config.clone(),
            self.time.clone(),
            self.subscribers.clone(),
            event_rx,
            aggregate_shutdown,
        )));

        Ok(rx)
    }

    /// Apply a peer advert to the local table
    ///
    /// Events are applied in timestamp order. Events authored by this router
    /// are skipped so our own originations never loop back in.
    pub async fn process(&self, advert: &Advert) -> RouterResult<()> {
        let mut events = advert.events.clone();
        events.sort_by_key(|event| event.timestamp_ms);

        let router_id = self.config.read().await.id.clone();
        trace!(
            router_id = %router_id,
            from = %advert.id,
            count = events.len(),
            "processing advert"
        );

        for event in events {
            if event.route.router == router_id {
                trace!(router_id = %router_id, "skipping own route");
                continue;
            }
            manage_route(&self.table, event.route, event.event_type.into()).await?;
        }
        Ok(())
    }

    /// Close the router; idempotent
    ///
    /// Signals shutdown, joins every background task, and removes all
    /// advert subscribers. The router may be started again afterwards.
    pub async fn close(&self) -> RouterResult<()> {
        let (shutdown, tasks) = {
            let mut run = self.run.lock().await;
            if !run.running {
                return Ok(());
            }
            run.running = false;
            (run.shutdown.take(), std::mem::take(&mut run.tasks))
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        for task in tasks {
            let _ = task.await;
        }

        // Dropping the senders ends every subscriber stream; pending events
        // die with the aggregator.
        *self.engine.lock().await = None;
        self.subscribers.lock().await.clear();

        info!("router closed");
        Ok(())
    }

    /// Snapshot the table as a list of events under the advertise strategy
    async fn flush_route_events(&self, event_type: EventType) -> RouterResult<Vec<Event>> {
        let strategy = self.config.read().await.advertise;
        let routes = self
            .table
            .query(&Query::new().with_strategy(strategy))
            .await?;

        let now_ms = self.time.now_ms();
        Ok(routes
            .into_iter()
            .map(|route| Event::new(event_type, now_ms, route))
            .collect())
    }
}

/// Registry-backed fallback for cold table queries
struct RegistryResolver {
    registry: Arc<dyn Registry>,
    router_id: String,
}

#[async_trait]
impl RouteResolver for RegistryResolver {
    async fn resolve(&self, service: &str) -> RouterResult<Vec<Route>> {
        trace!(service = %service, "resolving routes via registry");
        let records = match self.registry.get_service(service, DOMAIN_WILDCARD).await {
            Ok(records) => records,
            Err(RegistryError::NotFound { .. }) => {
                return Err(RouterError::route_not_found(service))
            }
            Err(e) => return Err(e.into()),
        };

        let mut routes = Vec::new();
        for record in records {
            let domain = record.domain();
            routes.extend(routes_for_service(&record, &domain, &self.router_id));
        }
        Ok(routes)
    }
}

/// Project a service's nodes into routes authored by this router
fn routes_for_service(service: &Service, network: &str, router_id: &str) -> Vec<Route> {
    service
        .nodes
        .iter()
        .map(|node| Route {
            service: service.name.clone(),
            address: node.address.clone(),
            gateway: String::new(),
            network: network.to_string(),
            router: router_id.to_string(),
            link: LINK_LOCAL.to_string(),
            metric: METRIC_LOCAL_DEFAULT,
            metadata: node.metadata.clone(),
        })
        .collect()
}

/// Apply one action to the table with reconcile tolerance
///
/// Duplicate creates and missing deletes are expected when replaying
/// registry or peer state; anything else propagates.
async fn manage_route(table: &Table, route: Route, action: Action) -> RouterResult<()> {
    match action {
        Action::Create => match table.create(route).await {
            Ok(()) | Err(RouterError::DuplicateRoute { .. }) => Ok(()),
            Err(e) => Err(e),
        },
        Action::Update => table.update(route).await,
        Action::Delete => match table.delete(&route).await {
            Ok(()) | Err(RouterError::RouteNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        },
    }
}

/// Insert a route, refreshing liveness when it already exists
async fn create_or_refresh(table: &Table, route: Route) -> RouterResult<()> {
    match table.create(route.clone()).await {
        Err(RouterError::DuplicateRoute { .. }) => table.update(route).await,
        other => other,
    }
}

/// Mirror every registry service into the table
///
/// Per-service failures are logged and skipped; only listing failure aborts.
async fn load_routes(
    registry: &dyn Registry,
    table: &Table,
    config: &RouterConfig,
) -> RouterResult<()> {
    let services = registry.list_services(DOMAIN_WILDCARD).await?;

    for service in services {
        let domain = service.domain();
        let routes = routes_for_service(&service, &domain, &config.id);

        if !routes.is_empty() {
            for route in routes {
                trace!(service = %service.name, domain = %domain, "creating route");
                if let Err(e) = create_or_refresh(table, route).await {
                    warn!(error = %e, service = %service.name, domain = %domain, "failed creating route");
                }
            }
            continue;
        }

        // The listing may elide nodes; fetch the full records
        let records = match registry.get_service(&service.name, &domain).await {
            Ok(records) => records,
            Err(e) => {
                trace!(error = %e, service = %service.name, domain = %domain, "failed fetching service");
                continue;
            }
        };
        for record in records {
            for route in routes_for_service(&record, &domain, &config.id) {
                if let Err(e) = create_or_refresh(table, route).await {
                    warn!(error = %e, service = %record.name, domain = %domain, "failed creating route");
                }
            }
        }
    }

    Ok(())
}

enum WatchOutcome {
    Shutdown,
    Reopen,
    Failed,
}

/// Open registry watchers until shutdown, backing off on failure
async fn registry_watch_loop(
    registry: Arc<dyn Registry>,
    table: Arc<Table>,
    config: Arc<RwLock<RouterConfig>>,
    time: Arc<dyn TimeProvider>,
    shutdown: &mut broadcast::Receiver<()>,
    reinit: &mut broadcast::Receiver<()>,
) {
    loop {
        let opened = tokio::select! {
            result = registry.watch(DOMAIN_WILDCARD) => result,
            _ = shutdown.recv() => return,
        };

        let mut watcher = match opened {
            Ok(watcher) => watcher,
            Err(e) => {
                debug!(error = %e, "failed creating registry watcher");
                tokio::select! {
                    _ = time.sleep_ms(REGISTRY_RETRY_DELAY_MS) => continue,
                    _ = shutdown.recv() => return,
                }
            }
        };

        let outcome = watch_registry(&table, &config, watcher.as_mut(), shutdown, reinit).await;
        watcher.stop();
        match outcome {
            WatchOutcome::Shutdown => return,
            WatchOutcome::Reopen => {}
            WatchOutcome::Failed => {
                tokio::select! {
                    _ = time.sleep_ms(REGISTRY_RETRY_DELAY_MS) => {}
                    _ = shutdown.recv() => return,
                }
            }
        }
    }
}

/// Consume one registry watcher session
async fn watch_registry(
    table: &Table,
    config: &RwLock<RouterConfig>,
    watcher: &mut dyn RegistryWatcher,
    shutdown: &mut broadcast::Receiver<()>,
    reinit: &mut broadcast::Receiver<()>,
) -> WatchOutcome {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return WatchOutcome::Shutdown,
            _ = reinit.recv() => {
                debug!("reinit requested, reopening registry watcher");
                return WatchOutcome::Reopen;
            }
            result = watcher.next() => match result {
                Ok(event) => {
                    let router_id = config.read().await.id.clone();
                    if let Err(e) = apply_registry_event(table, &router_id, &event).await {
                        warn!(
                            error = %e,
                            service = %event.service.name,
                            "failed applying registry event"
                        );
                        return WatchOutcome::Failed;
                    }
                }
                Err(RegistryError::WatcherStopped) => return WatchOutcome::Reopen,
                Err(e) => {
                    debug!(error = %e, "registry watcher failed");
                    return WatchOutcome::Failed;
                }
            }
        }
    }
}

/// Translate one registry event into table mutations
async fn apply_registry_event(
    table: &Table,
    router_id: &str,
    event: &RegistryEvent,
) -> RouterResult<()> {
    let domain = event.service.domain();
    let routes = routes_for_service(&event.service, &domain, router_id);

    // A delete with no nodes left means the service is gone entirely
    if event.action == Action::Delete && routes.is_empty() {
        table.delete_service(&event.service.name, &domain).await;
        return Ok(());
    }

    for route in routes {
        trace!(
            service = %event.service.name,
            domain = %domain,
            action = %event.action,
            "applying registry event"
        );
        manage_route(table, route, event.action).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_registry::MemoryRegistry;

    fn router(id: &str) -> Router {
        Router::new(
            RouterConfig::for_testing(id),
            Arc::new(MemoryRegistry::new()),
        )
        .unwrap()
    }

    fn peer_route(service: &str, address: &str, peer: &str) -> Route {
        Route::new(service, address, "default", peer).with_link("network")
    }

    #[tokio::test]
    async fn test_process_skips_own_routes() {
        let router = router("router-1");

        let advert = Advert::new(
            "peer-1",
            AdvertType::Update,
            1000,
            1,
            vec![
                Event::new(
                    EventType::Create,
                    1,
                    peer_route("auth", "10.0.0.1:8080", "router-1"),
                ),
                Event::new(
                    EventType::Create,
                    2,
                    peer_route("auth", "10.0.0.2:8080", "peer-1"),
                ),
            ],
        );

        router.process(&advert).await.unwrap();

        let routes = router.table().list().await;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].router, "peer-1");
    }

    #[tokio::test]
    async fn test_process_applies_in_timestamp_order() {
        let router = router("router-1");
        let route = peer_route("auth", "10.0.0.1:8080", "peer-1");

        // Out-of-order batch: the delete happened after the create
        let advert = Advert::new(
            "peer-1",
            AdvertType::Update,
            1000,
            5,
            vec![
                Event::new(EventType::Delete, 3, route.clone()),
                Event::new(EventType::Create, 1, route.clone()),
            ],
        );

        router.process(&advert).await.unwrap();
        assert!(router.table().is_empty().await);
    }

    #[tokio::test]
    async fn test_process_tolerates_reconcile_errors() {
        let router = router("router-1");
        let route = peer_route("auth", "10.0.0.1:8080", "peer-1");

        // A delete for a route we never had, and a duplicate create
        router.table().create(route.clone()).await.unwrap();
        let advert = Advert::new(
            "peer-1",
            AdvertType::Update,
            1000,
            5,
            vec![
                Event::new(EventType::Create, 1, route.clone()),
                Event::new(
                    EventType::Delete,
                    2,
                    peer_route("ghost", "10.0.9.9:8080", "peer-1"),
                ),
            ],
        );

        router.process(&advert).await.unwrap();
        assert_eq!(router.table().len().await, 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_close_restarts() {
        let router = router("router-1");

        router.start().await.unwrap();
        router.start().await.unwrap();

        router.close().await.unwrap();
        router.close().await.unwrap();

        router.start().await.unwrap();
        router.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_installs_default_gateway() {
        let registry = Arc::new(MemoryRegistry::new());
        let router = Router::new(
            RouterConfig::for_testing("router-1").with_gateway("10.0.0.254"),
            registry,
        )
        .unwrap();

        router.start().await.unwrap();

        let routes = router.table().list().await;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].gateway, "10.0.0.254");
        assert_eq!(routes[0].service, "*");

        router.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_init_swaps_options() {
        let router = router("router-1");

        let reconfigured = RouterConfig::for_testing("router-1").with_gateway("10.9.9.9");
        router.init(reconfigured).await.unwrap();

        assert_eq!(router.options().await.gateway.as_deref(), Some("10.9.9.9"));

        let invalid = RouterConfig::for_testing("");
        assert!(router.init(invalid).await.is_err());
    }

    #[tokio::test]
    async fn test_routes_for_service_projection() {
        let service = Service::new("auth")
            .with_node(selkie_registry::Node::new("auth-1", "10.0.0.1:8080"))
            .with_node(selkie_registry::Node::new("auth-2", "10.0.0.2:8080"));

        let routes = routes_for_service(&service, "prod", "router-1");
        assert_eq!(routes.len(), 2);
        for route in &routes {
            assert_eq!(route.service, "auth");
            assert_eq!(route.network, "prod");
            assert_eq!(route.router, "router-1");
            assert_eq!(route.link, LINK_LOCAL);
            assert_eq!(route.metric, METRIC_LOCAL_DEFAULT);
            assert!(route.gateway.is_empty());
        }
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_registry() {
        let registry = Arc::new(MemoryRegistry::new());
        registry
            .register(
                &Service::new("auth")
                    .with_node(selkie_registry::Node::new("auth-1", "10.0.0.1:8080")),
            )
            .await
            .unwrap();

        // No precache and no start: the table is cold
        let router = Router::new(RouterConfig::for_testing("router-1"), registry).unwrap();

        let routes = router
            .lookup(&Query::new().with_service("auth"))
            .await
            .unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].address, "10.0.0.1:8080");

        // The miss populated the table
        assert_eq!(router.table().len().await, 1);
    }
}
