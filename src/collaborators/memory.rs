//! In-memory collaborators

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

use super::{Cache, ConfigStore, MetricsRecorder, PluginLogger, Route, Router};
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::metrics::SharedMetrics;

/// Process-local cache with optional per-entry expiry
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Value, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> PluginResult<Option<Value>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expiry)) if expiry.map_or(true, |at| at > now) => {
                    return Ok(Some(value.clone()))
                }
                Some(_) => {}
            }
        }
        // expired
        self.entries.write().remove(key);
        Ok(None)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> PluginResult<()> {
        let expiry = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.write().insert(key.to_string(), (value, expiry));
        Ok(())
    }

    fn delete(&self, key: &str) -> PluginResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

/// Configuration values held in memory
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: BTreeMap<String, Value>) -> Self {
        Self { values: RwLock::new(values) }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> PluginResult<Option<Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> PluginResult<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> PluginResult<Vec<String>> {
        Ok(self.values.read().keys().cloned().collect())
    }
}

/// Route table without a transport behind it
#[derive(Debug, Default)]
pub struct MemoryRouter {
    routes: RwLock<BTreeSet<Route>>,
}

impl MemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Router for MemoryRouter {
    fn add_route(&self, method: &str, path: &str) -> PluginResult<()> {
        if path.is_empty() || !path.starts_with('/') {
            return Err(PluginError::generic(format!("Invalid route path: '{}'", path)));
        }
        let route = Route::new(method, path);
        if !self.routes.write().insert(route) {
            return Err(PluginError::generic(format!(
                "Route {} {} is already registered",
                method.to_uppercase(),
                path
            )));
        }
        Ok(())
    }

    fn remove_route(&self, method: &str, path: &str) -> PluginResult<bool> {
        Ok(self.routes.write().remove(&Route::new(method, path)))
    }

    fn routes(&self) -> Vec<Route> {
        self.routes.read().iter().cloned().collect()
    }

    fn has_route(&self, method: &str, path: &str) -> bool {
        self.routes.read().contains(&Route::new(method, path))
    }
}

/// Logger writing through the `log` facade with target `plugin::<name>`
#[derive(Debug, Clone)]
pub struct LogPluginLogger {
    target: String,
}

impl LogPluginLogger {
    pub fn new(plugin: &str) -> Self {
        Self { target: format!("plugin::{}", plugin) }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl PluginLogger for LogPluginLogger {
    fn log(&self, level: log::Level, message: &str) {
        log::log!(target: self.target.as_str(), level, "{}", message);
    }
}

/// Recorder writing custom metrics into the shared counter store
#[derive(Debug, Clone)]
pub struct StoreMetricsRecorder {
    plugin: String,
    metrics: SharedMetrics,
}

impl StoreMetricsRecorder {
    pub fn new(plugin: &str, metrics: SharedMetrics) -> Self {
        Self { plugin: plugin.to_string(), metrics }
    }
}

impl MetricsRecorder for StoreMetricsRecorder {
    fn increment(&self, name: &str, delta: f64) {
        self.metrics.add_custom(&self.plugin, name, delta);
    }

    fn gauge(&self, name: &str, value: f64) {
        self.metrics.set_custom(&self.plugin, name, value);
    }
}
