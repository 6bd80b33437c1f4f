//! Advert engine internals
//!
//! Table events are absorbed into an aggregation map keyed by route
//! fingerprint; a periodic tick drains the map into one advert fanned out to
//! every subscriber. Rapid same-type events for one fingerprint collapse to
//! a single entry (flap suppression), and a type change replaces the pending
//! entry so a create-then-delete within a window yields a single delete.

use crate::advert::{Advert, AdvertType};
use crate::config::RouterConfig;
use crate::event::Event;
use crate::strategy::Strategy;
use crate::table::Table;
use crate::watcher::{WatchQuery, Watcher};
use selkie_core::constants::REGISTRY_RETRY_DELAY_MS;
use selkie_core::TimeProvider;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, trace};

pub(crate) type SubscriberMap = HashMap<String, mpsc::Sender<Advert>>;

/// Pending events keyed by route fingerprint
pub(crate) type AdvertMap = HashMap<u64, Event>;

/// Absorb a table event into the aggregation map
pub(crate) fn absorb(adverts: &mut AdvertMap, event: Event) {
    match adverts.entry(event.route.fingerprint()) {
        Entry::Vacant(slot) => {
            slot.insert(event);
        }
        Entry::Occupied(mut slot) => {
            // Repeated same-type events within a window collapse to the
            // first; a differing type supersedes the pending entry.
            if slot.get().event_type != event.event_type {
                slot.insert(event);
            }
        }
    }
}

/// Drain advertisable entries from the aggregation map
///
/// Entries the strategy does not admit stay pending.
pub(crate) fn drain(adverts: &mut AdvertMap, strategy: Strategy) -> Vec<Event> {
    if strategy == Strategy::None {
        return Vec::new();
    }

    let drained: Vec<u64> = adverts
        .iter()
        .filter(|(_, event)| strategy.admits(&event.route))
        .map(|(fingerprint, _)| *fingerprint)
        .collect();

    let mut events = Vec::with_capacity(drained.len());
    for fingerprint in drained {
        if let Some(event) = adverts.remove(&fingerprint) {
            events.push(event);
        }
    }
    events
}

/// Publish one advert to every subscriber
///
/// A full subscriber blocks the publisher only until shutdown fires, which
/// keeps teardown bounded even when a consumer is stuck. Closed subscribers
/// are removed.
pub(crate) async fn publish_advert(
    subscribers: &Mutex<SubscriberMap>,
    advert: Advert,
    shutdown: &mut broadcast::Receiver<()>,
) {
    let targets: Vec<(String, mpsc::Sender<Advert>)> = {
        let subs = subscribers.lock().await;
        subs.iter().map(|(id, tx)| (id.clone(), tx.clone())).collect()
    };

    let mut closed = Vec::new();
    for (id, tx) in targets {
        tokio::select! {
            result = tx.send(advert.clone()) => {
                if result.is_err() {
                    closed.push(id);
                }
            }
            _ = shutdown.recv() => {
                debug!("shutdown during advert publish");
                return;
            }
        }
    }

    if !closed.is_empty() {
        let mut subs = subscribers.lock().await;
        for id in closed {
            subs.remove(&id);
            debug!(subscriber = %id, "removed closed advert subscriber");
        }
    }
}

/// Forward table events into the aggregator, reopening the watcher on stop
pub(crate) async fn table_forward_loop(
    table: Arc<Table>,
    time: Arc<dyn TimeProvider>,
    initial: Watcher,
    events: mpsc::Sender<Event>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut watcher = initial;
    loop {
        loop {
            tokio::select! {
                result = watcher.next() => match result {
                    Ok(event) => {
                        tokio::select! {
                            sent = events.send(event) => {
                                if sent.is_err() {
                                    return;
                                }
                            }
                            _ = shutdown.recv() => {
                                watcher.stop();
                                return;
                            }
                        }
                    }
                    Err(_) => break,
                },
                _ = shutdown.recv() => {
                    watcher.stop();
                    return;
                }
            }
        }

        debug!("table watcher stopped, reopening");
        tokio::select! {
            _ = time.sleep_ms(REGISTRY_RETRY_DELAY_MS) => {}
            _ = shutdown.recv() => return,
        }
        watcher = table.watch(WatchQuery::new()).await;
    }
}

/// Aggregate table events and advertise them on every tick
pub(crate) async fn aggregate_loop(
    config: Arc<RwLock<RouterConfig>>,
    time: Arc<dyn TimeProvider>,
    subscribers: Arc<Mutex<SubscriberMap>>,
    mut events: mpsc::Receiver<Event>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut adverts: AdvertMap = AdvertMap::new();
    let tick_ms = config.read().await.advertise_tick_ms;
    let mut next_tick_ms = time.now_ms() + tick_ms;

    loop {
        // Event arrivals must not starve the tick, so sleep to a deadline
        // instead of a fresh interval each iteration.
        let sleep_ms = next_tick_ms.saturating_sub(time.now_ms());
        tokio::select! {
            _ = time.sleep_ms(sleep_ms) => {
                let (strategy, tick_ms, ttl_ms, router_id) = {
                    let config = config.read().await;
                    (
                        config.advertise,
                        config.advertise_tick_ms,
                        config.advert_ttl_ms,
                        config.id.clone(),
                    )
                };
                next_tick_ms = time.now_ms() + tick_ms;

                if strategy == Strategy::None {
                    continue;
                }
                let drained = drain(&mut adverts, strategy);
                if drained.is_empty() {
                    continue;
                }

                debug!(count = drained.len(), "publishing aggregated advert");
                let advert = Advert::new(
                    router_id,
                    AdvertType::Update,
                    ttl_ms,
                    time.now_ms(),
                    drained,
                );
                publish_advert(&subscribers, advert, &mut shutdown).await;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                let strategy = config.read().await.advertise;
                if strategy == Strategy::None || !strategy.admits(&event.route) {
                    continue;
                }
                trace!(
                    event_type = %event.event_type,
                    service = %event.route.service,
                    "absorbing table event"
                );
                absorb(&mut adverts, event);
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::route::Route;

    fn route(service: &str) -> Route {
        Route::new(service, "10.0.0.1:8080", "default", "router-1")
    }

    fn event(event_type: EventType, service: &str, timestamp_ms: u64) -> Event {
        Event::new(event_type, timestamp_ms, route(service))
    }

    #[test]
    fn test_absorb_collapses_same_type() {
        let mut adverts = AdvertMap::new();
        absorb(&mut adverts, event(EventType::Update, "auth", 1));
        absorb(&mut adverts, event(EventType::Update, "auth", 2));
        absorb(&mut adverts, event(EventType::Update, "auth", 3));

        assert_eq!(adverts.len(), 1);
        let pending = adverts.values().next().unwrap();
        assert_eq!(pending.event_type, EventType::Update);
        // Keep-first: the earliest of the run survives
        assert_eq!(pending.timestamp_ms, 1);
    }

    #[test]
    fn test_absorb_type_change_supersedes() {
        let mut adverts = AdvertMap::new();
        absorb(&mut adverts, event(EventType::Create, "auth", 1));
        absorb(&mut adverts, event(EventType::Delete, "auth", 2));

        assert_eq!(adverts.len(), 1);
        assert_eq!(
            adverts.values().next().unwrap().event_type,
            EventType::Delete
        );
    }

    #[test]
    fn test_absorb_keys_by_fingerprint() {
        let mut adverts = AdvertMap::new();
        absorb(&mut adverts, event(EventType::Create, "auth", 1));
        absorb(&mut adverts, event(EventType::Create, "cart", 2));

        assert_eq!(adverts.len(), 2);
    }

    #[test]
    fn test_drain_empties_admitted_entries() {
        let mut adverts = AdvertMap::new();
        absorb(&mut adverts, event(EventType::Create, "auth", 1));
        absorb(&mut adverts, event(EventType::Create, "cart", 2));

        let drained = drain(&mut adverts, Strategy::All);
        assert_eq!(drained.len(), 2);
        assert!(adverts.is_empty());
    }

    #[test]
    fn test_drain_none_keeps_everything() {
        let mut adverts = AdvertMap::new();
        absorb(&mut adverts, event(EventType::Create, "auth", 1));

        assert!(drain(&mut adverts, Strategy::None).is_empty());
        assert_eq!(adverts.len(), 1);
    }

    #[test]
    fn test_drain_local_leaves_network_routes_pending() {
        let mut adverts = AdvertMap::new();
        absorb(&mut adverts, event(EventType::Create, "auth", 1));
        absorb(
            &mut adverts,
            Event::new(EventType::Create, 2, route("cart").with_link("network")),
        );

        let drained = drain(&mut adverts, Strategy::Local);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].route.service, "auth");
        assert_eq!(adverts.len(), 1);
    }
}
