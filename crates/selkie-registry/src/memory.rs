//! In-memory registry
//!
//! Suitable for tests and single-node deployment. All state is lost on
//! restart. Services are partitioned by administrative domain; watchers are
//! fanned out over bounded channels and slow watchers lose events rather
//! than block registrations.

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{Action, Registry, RegistryEvent, RegistryWatcher};
use crate::service::Service;
use async_trait::async_trait;
use selkie_core::constants::{DOMAIN_WILDCARD, WATCHER_BUFFER_COUNT_DEFAULT};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tracing::debug;
use uuid::Uuid;

// domain -> service name -> version records
type ServiceMap = HashMap<String, HashMap<String, Vec<Service>>>;

struct WatcherEntry {
    id: String,
    domain: String,
    tx: mpsc::Sender<RegistryEvent>,
    stopped: Arc<AtomicBool>,
}

/// In-memory registry implementation
pub struct MemoryRegistry {
    services: RwLock<ServiceMap>,
    watchers: Mutex<Vec<WatcherEntry>>,
}

impl MemoryRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    async fn publish(&self, domain: &str, action: Action, mut service: Service) {
        // Pin the domain into the event payload so consumers resolve the
        // same domain even when the node that carried it is gone.
        service
            .metadata
            .insert("domain".to_string(), domain.to_string());
        let event = RegistryEvent::new(action, service);

        let mut watchers = self.watchers.lock().await;
        watchers.retain(|w| {
            if w.stopped.load(Ordering::Acquire) {
                return false;
            }
            if w.domain != DOMAIN_WILDCARD && w.domain != domain {
                return true;
            }
            match w.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!(watcher = %w.id, domain = %domain, "watcher buffer full, dropping event");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, service: &Service) -> RegistryResult<()> {
        service.validate()?;
        let domain = service.domain();

        let (action, current) = {
            let mut services = self.services.write().await;
            let versions = services
                .entry(domain.clone())
                .or_default()
                .entry(service.name.clone())
                .or_default();

            match versions.iter_mut().find(|s| s.version == service.version) {
                Some(existing) => {
                    // Merge nodes into the stored record, replacing by id
                    for node in &service.nodes {
                        match existing.nodes.iter_mut().find(|n| n.id == node.id) {
                            Some(slot) => *slot = node.clone(),
                            None => existing.nodes.push(node.clone()),
                        }
                    }
                    existing.metadata = service.metadata.clone();
                    (Action::Update, existing.clone())
                }
                None => {
                    versions.push(service.clone());
                    (Action::Create, service.clone())
                }
            }
        };

        self.publish(&domain, action, current).await;
        Ok(())
    }

    async fn deregister(&self, service: &Service) -> RegistryResult<()> {
        service.validate()?;
        let domain = service.domain();

        let removed = {
            let mut services = self.services.write().await;
            let bucket = services
                .get_mut(&domain)
                .ok_or_else(|| RegistryError::not_found(&service.name))?;
            if !bucket.contains_key(&service.name) {
                return Err(RegistryError::not_found(&service.name));
            }

            let mut removed = service.clone();
            if service.nodes.is_empty() {
                // No nodes listed: drop the whole record
                bucket.remove(&service.name);
            } else {
                let emptied = match bucket.get_mut(&service.name) {
                    Some(versions) => {
                        for record in versions.iter_mut() {
                            if record.version == service.version {
                                record
                                    .nodes
                                    .retain(|n| !service.nodes.iter().any(|d| d.id == n.id));
                            }
                        }
                        versions.retain(|record| !record.nodes.is_empty());
                        versions.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    bucket.remove(&service.name);
                    // The record is gone entirely; consumers treat a
                    // node-less delete as a full wipe
                    removed.nodes.clear();
                }
            }
            if bucket.is_empty() {
                services.remove(&domain);
            }
            removed
        };

        self.publish(&domain, Action::Delete, removed).await;
        Ok(())
    }

    async fn list_services(&self, domain: &str) -> RegistryResult<Vec<Service>> {
        let services = self.services.read().await;

        let mut records: Vec<Service> = if domain == DOMAIN_WILDCARD {
            services
                .values()
                .flat_map(|bucket| bucket.values().flatten().cloned())
                .collect()
        } else {
            services
                .get(domain)
                .map(|bucket| bucket.values().flatten().cloned().collect())
                .unwrap_or_default()
        };

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn get_service(&self, name: &str, domain: &str) -> RegistryResult<Vec<Service>> {
        let services = self.services.read().await;

        let records: Vec<Service> = if domain == DOMAIN_WILDCARD {
            services
                .values()
                .filter_map(|bucket| bucket.get(name))
                .flatten()
                .cloned()
                .collect()
        } else {
            services
                .get(domain)
                .and_then(|bucket| bucket.get(name))
                .cloned()
                .unwrap_or_default()
        };

        if records.is_empty() {
            return Err(RegistryError::not_found(name));
        }
        Ok(records)
    }

    async fn watch(&self, domain: &str) -> RegistryResult<Box<dyn RegistryWatcher>> {
        let (tx, rx) = mpsc::channel(WATCHER_BUFFER_COUNT_DEFAULT);
        let stopped = Arc::new(AtomicBool::new(false));

        let mut watchers = self.watchers.lock().await;
        watchers.push(WatcherEntry {
            id: Uuid::new_v4().to_string(),
            domain: domain.to_string(),
            tx,
            stopped: stopped.clone(),
        });

        Ok(Box::new(MemoryWatcher {
            rx,
            stopped,
            stop_notify: Notify::new(),
        }))
    }
}

/// Watcher over an in-memory registry
struct MemoryWatcher {
    rx: mpsc::Receiver<RegistryEvent>,
    stopped: Arc<AtomicBool>,
    stop_notify: Notify,
}

#[async_trait]
impl RegistryWatcher for MemoryWatcher {
    async fn next(&mut self) -> RegistryResult<RegistryEvent> {
        let notified = self.stop_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.stopped.load(Ordering::Acquire) {
            return Err(RegistryError::WatcherStopped);
        }

        tokio::select! {
            event = self.rx.recv() => event.ok_or(RegistryError::WatcherStopped),
            _ = notified => Err(RegistryError::WatcherStopped),
        }
    }

    fn stop(&mut self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.stop_notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Node;

    fn auth_service() -> Service {
        Service::new("auth").with_node(Node::new("auth-1", "10.0.0.1:8080"))
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = MemoryRegistry::new();
        registry.register(&auth_service()).await.unwrap();

        let found = registry.get_service("auth", "default").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].nodes.len(), 1);

        let wildcard = registry.get_service("auth", "*").await.unwrap();
        assert_eq!(wildcard.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_service() {
        let registry = MemoryRegistry::new();
        let err = registry.get_service("ghost", "*").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_register_merges_nodes() {
        let registry = MemoryRegistry::new();
        registry.register(&auth_service()).await.unwrap();
        registry
            .register(&Service::new("auth").with_node(Node::new("auth-2", "10.0.0.2:8080")))
            .await
            .unwrap();

        let found = registry.get_service("auth", "default").await.unwrap();
        assert_eq!(found[0].nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_list_services_by_domain() {
        let registry = MemoryRegistry::new();
        registry.register(&auth_service()).await.unwrap();
        registry
            .register(&Service::new("cart").with_metadata("domain", "prod"))
            .await
            .unwrap();

        let prod = registry.list_services("prod").await.unwrap();
        assert_eq!(prod.len(), 1);
        assert_eq!(prod[0].name, "cart");

        let all = registry.list_services("*").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_deregister_node_then_record() {
        let registry = MemoryRegistry::new();
        registry
            .register(
                &Service::new("auth")
                    .with_node(Node::new("auth-1", "10.0.0.1:8080"))
                    .with_node(Node::new("auth-2", "10.0.0.2:8080")),
            )
            .await
            .unwrap();

        registry
            .deregister(&Service::new("auth").with_node(Node::new("auth-1", "10.0.0.1:8080")))
            .await
            .unwrap();
        let found = registry.get_service("auth", "default").await.unwrap();
        assert_eq!(found[0].nodes.len(), 1);

        registry
            .deregister(&Service::new("auth").with_node(Node::new("auth-2", "10.0.0.2:8080")))
            .await
            .unwrap();
        assert!(registry.get_service("auth", "default").await.is_err());
    }

    #[tokio::test]
    async fn test_watch_observes_lifecycle() {
        let registry = MemoryRegistry::new();
        let mut watcher = registry.watch("*").await.unwrap();

        registry.register(&auth_service()).await.unwrap();
        let event = watcher.next().await.unwrap();
        assert_eq!(event.action, Action::Create);
        assert_eq!(event.service.name, "auth");

        registry.register(&auth_service()).await.unwrap();
        let event = watcher.next().await.unwrap();
        assert_eq!(event.action, Action::Update);

        registry.deregister(&Service::new("auth")).await.unwrap();
        let event = watcher.next().await.unwrap();
        assert_eq!(event.action, Action::Delete);
        assert!(event.service.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_watch_filters_by_domain() {
        let registry = MemoryRegistry::new();
        let mut watcher = registry.watch("prod").await.unwrap();

        registry.register(&auth_service()).await.unwrap(); // default domain
        registry
            .register(
                &Service::new("cart")
                    .with_metadata("domain", "prod")
                    .with_node(Node::new("cart-1", "10.0.1.1:8080")),
            )
            .await
            .unwrap();

        let event = watcher.next().await.unwrap();
        assert_eq!(event.service.name, "cart");
    }

    #[tokio::test]
    async fn test_watcher_stop_is_idempotent() {
        let registry = MemoryRegistry::new();
        let mut watcher = registry.watch("*").await.unwrap();

        watcher.stop();
        watcher.stop();
        let err = watcher.next().await.unwrap_err();
        assert!(matches!(err, RegistryError::WatcherStopped));
    }

    #[tokio::test]
    async fn test_delete_event_preserves_domain() {
        let registry = MemoryRegistry::new();
        let mut watcher = registry.watch("*").await.unwrap();

        registry
            .register(
                &Service::new("cart")
                    .with_node(Node::new("cart-1", "10.0.1.1:8080").with_metadata("domain", "prod")),
            )
            .await
            .unwrap();
        let _ = watcher.next().await.unwrap();

        registry
            .deregister(&Service::new("cart").with_metadata("domain", "prod"))
            .await
            .unwrap();
        let event = watcher.next().await.unwrap();
        // The wiped record has no nodes left to carry the domain
        assert_eq!(event.service.domain(), "prod");
    }
}
