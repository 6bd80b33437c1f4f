//! Selkie registry
//!
//! Service discovery contract consumed by the selkie router.
//!
//! # Overview
//!
//! The registry is the source of truth for which service instances exist.
//! The router only consumes a minimal capability set:
//! - list services in a domain
//! - fetch all versions of one service
//! - watch for service change events
//!
//! [`MemoryRegistry`] implements the contract in-process for tests and
//! single-node deployments. Alternative discovery backends plug in by
//! implementing [`Registry`] and [`RegistryWatcher`].
//!
//! # Example
//!
//! ```rust,ignore
//! use selkie_registry::{MemoryRegistry, Registry, Node, Service};
//!
//! let registry = MemoryRegistry::new();
//!
//! let service = Service::new("auth")
//!     .with_node(Node::new("auth-1", "10.0.0.1:8080"));
//! registry.register(&service).await?;
//!
//! let found = registry.get_service("auth", "*").await?;
//! ```

mod error;
mod memory;
mod registry;
mod service;

pub use error::{RegistryError, RegistryResult};
pub use memory::MemoryRegistry;
pub use registry::{Action, Registry, RegistryEvent, RegistryWatcher};
pub use service::{Node, Service};
