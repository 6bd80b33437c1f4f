//! Service and node data model
//!
//! TigerStyle: Validated identifiers, explicit domain resolution.

use crate::error::{RegistryError, RegistryResult};
use selkie_core::constants::{DOMAIN_DEFAULT, SERVICE_NAME_LENGTH_BYTES_MAX};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single instance of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance identifier
    pub id: String,
    /// Endpoint address of this instance
    pub address: String,
    /// Custom metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Node {
    /// Create a new node
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A named service and its live instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Logical service name
    pub name: String,
    /// Version of this service record
    #[serde(default)]
    pub version: String,
    /// Custom metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Live instances
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Service {
    /// Create a new service with no nodes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "latest".to_string(),
            metadata: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Set the service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add a node
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Resolve the administrative domain of this service
    ///
    /// Precedence: service metadata, then the first node's metadata, then
    /// the default domain.
    pub fn domain(&self) -> String {
        if let Some(domain) = self.metadata.get("domain") {
            if !domain.is_empty() {
                return domain.clone();
            }
        }
        if let Some(node) = self.nodes.first() {
            if let Some(domain) = node.metadata.get("domain") {
                if !domain.is_empty() {
                    return domain.clone();
                }
            }
        }
        DOMAIN_DEFAULT.to_string()
    }

    /// Validate this service record
    ///
    /// # Errors
    /// Returns error if the name is empty or exceeds the length limit.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.name.is_empty() {
            return Err(RegistryError::InvalidService {
                name: self.name.clone(),
                reason: "service name cannot be empty".into(),
            });
        }

        if self.name.len() > SERVICE_NAME_LENGTH_BYTES_MAX {
            return Err(RegistryError::InvalidService {
                name: self.name.clone(),
                reason: format!(
                    "service name length {} exceeds limit {}",
                    self.name.len(),
                    SERVICE_NAME_LENGTH_BYTES_MAX
                ),
            });
        }

        Ok(())
    }
}
