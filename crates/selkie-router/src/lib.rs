//! Selkie router
//!
//! A service-discovery-driven routing table engine for a service mesh.
//!
//! # Overview
//!
//! The router mirrors a service registry into an in-memory routing table,
//! keeps the table fresh against drift and failure, and disseminates route
//! changes as a stream of adverts that peer routers consume:
//!
//! - [`Table`]: indexed route store with deterministic event emission,
//!   per-route TTL and filtered watchers
//! - Registry sync: preload, periodic refresh, prune, and watch-driven
//!   incremental updates
//! - Advert engine: event aggregation with flap suppression, fan-out to
//!   subscribers, and inbound advert application with loop prevention
//! - [`Router`]: lifecycle and wiring facade
//!
//! The registry is consumed only through the `selkie-registry` contract; the
//! transport that carries adverts between peers is the caller's concern.
//!
//! # Example
//!
//! ```rust,ignore
//! use selkie_registry::MemoryRegistry;
//! use selkie_router::{Query, Router, RouterConfig};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(MemoryRegistry::new());
//! let router = Router::new(RouterConfig::default().with_precache(true), registry)?;
//! router.start().await?;
//!
//! let routes = router.lookup(&Query::new().with_service("auth")).await?;
//! let mut adverts = router.advertise().await?;
//! while let Some(advert) = adverts.recv().await {
//!     // hand the advert to the peer transport
//! }
//! ```

mod advert;
mod advertise;
mod config;
mod error;
mod event;
mod query;
mod route;
mod router;
mod strategy;
mod table;
mod watcher;

pub use advert::{Advert, AdvertType};
pub use config::RouterConfig;
pub use error::{RouterError, RouterResult};
pub use event::{Event, EventType};
pub use query::Query;
pub use route::Route;
pub use router::Router;
pub use strategy::Strategy;
pub use table::{RouteResolver, Table};
pub use watcher::{WatchQuery, Watcher};
