//! Host Collaborators
//!
//! Abstract interfaces for the resources the host hands to plugins through the
//! permission mediator. Concrete engines (SQL, HTTP client, disk) live outside
//! the plugin host and are plugged in through [`HostCollaborators`]; in-memory
//! implementations of the lightweight ones are provided in [`memory`].

pub mod memory;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::error::PluginResult;

pub use memory::{LogPluginLogger, MemoryCache, MemoryConfigStore, MemoryRouter, StoreMetricsRecorder};

/// Database access
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a statement, returning the number of affected rows
    async fn execute(&self, statement: &str, params: &[Value]) -> PluginResult<u64>;

    /// Run a query, returning one JSON object per row
    async fn query(&self, statement: &str, params: &[Value]) -> PluginResult<Vec<Value>>;
}

/// Key/value cache access
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> PluginResult<Option<Value>>;
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> PluginResult<()>;
    fn delete(&self, key: &str) -> PluginResult<bool>;
}

/// Configuration access
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> PluginResult<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> PluginResult<()>;
    fn keys(&self) -> PluginResult<Vec<String>>;
}

/// A registered route
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Route {
    pub method: String,
    pub path: String,
}

impl Route {
    pub fn new(method: &str, path: &str) -> Self {
        Self { method: method.to_uppercase(), path: path.to_string() }
    }
}

/// Router registration
///
/// `routes` and `has_route` have no error channel; a denied router answers
/// them with empty results.
pub trait Router: Send + Sync {
    fn add_route(&self, method: &str, path: &str) -> PluginResult<()>;
    fn remove_route(&self, method: &str, path: &str) -> PluginResult<bool>;
    fn routes(&self) -> Vec<Route>;
    fn has_route(&self, method: &str, path: &str) -> bool;
}

/// Filesystem access
#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn read(&self, path: &Path) -> PluginResult<Vec<u8>>;
    async fn write(&self, path: &Path, data: &[u8]) -> PluginResult<()>;
    async fn exists(&self, path: &Path) -> PluginResult<bool>;
    async fn list(&self, path: &Path) -> PluginResult<Vec<PathBuf>>;
}

/// An outbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<Vec<u8>>,
}

impl NetworkRequest {
    pub fn get(url: &str) -> Self {
        Self { method: "GET".to_string(), url: url.to_string(), headers: Vec::new(), body: None }
    }
}

/// The response to an outbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

/// Outbound network access
#[async_trait]
pub trait Network: Send + Sync {
    async fn request(&self, request: NetworkRequest) -> PluginResult<NetworkResponse>;
}

/// Structured logging scoped to one plugin
pub trait PluginLogger: Send + Sync {
    fn log(&self, level: log::Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(log::Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(log::Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(log::Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(log::Level::Error, message);
    }
}

/// Metrics recording scoped to one plugin
pub trait MetricsRecorder: Send + Sync {
    fn increment(&self, name: &str, delta: f64);
    fn gauge(&self, name: &str, value: f64);
}

/// The set of live collaborators a host offers
///
/// A capability with no collaborator is reported as unavailable even when the
/// plugin holds the permission for it.
#[derive(Clone, Default)]
pub struct HostCollaborators {
    pub database: Option<Arc<dyn Database>>,
    pub cache: Option<Arc<dyn Cache>>,
    pub config: Option<Arc<dyn ConfigStore>>,
    pub router: Option<Arc<dyn Router>>,
    pub filesystem: Option<Arc<dyn Filesystem>>,
    pub network: Option<Arc<dyn Network>>,
}

impl HostCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory cache, config and router; no database, filesystem or network
    pub fn in_memory() -> Self {
        Self {
            cache: Some(Arc::new(MemoryCache::new())),
            config: Some(Arc::new(MemoryConfigStore::new())),
            router: Some(Arc::new(MemoryRouter::new())),
            ..Self::default()
        }
    }

    pub fn with_database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: Arc<dyn ConfigStore>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_filesystem(mut self, filesystem: Arc<dyn Filesystem>) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    pub fn with_network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }
}

impl std::fmt::Debug for HostCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCollaborators")
            .field("database", &self.database.is_some())
            .field("cache", &self.cache.is_some())
            .field("config", &self.config.is_some())
            .field("router", &self.router.is_some())
            .field("filesystem", &self.filesystem.is_some())
            .field("network", &self.network.is_some())
            .finish()
    }
}
