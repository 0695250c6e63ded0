//! Service Registry
//!
//! Namespaced directory through which one plugin exposes an object for
//! another to consume. Entries are keyed by `(owner, name)`; names are unique
//! per owner only. Values are opaque to the registry and are handed back as
//! the same `Arc` that was exported.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::RwLock;

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::metrics::SharedMetrics;

/// An exported service value
pub type ServiceValue = Arc<dyn Any + Send + Sync>;

struct ServiceEntry {
    value: ServiceValue,
    type_name: &'static str,
    exported_at: DateTime<Utc>,
}

/// Metadata about an exported service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub owner: String,
    pub name: String,
    pub type_name: &'static str,
    pub exported_at: DateTime<Utc>,
}

pub struct ServiceRegistry {
    services: RwLock<HashMap<(String, String), ServiceEntry>>,
    metrics: SharedMetrics,
}

impl ServiceRegistry {
    pub fn new(metrics: SharedMetrics) -> Self {
        Self { services: RwLock::new(HashMap::new()), metrics }
    }

    /// Export a value under `(owner, name)`
    pub fn export<T: Any + Send + Sync>(&self, owner: &str, name: &str, value: T) -> PluginResult<()> {
        self.export_shared(owner, name, Arc::new(value))
    }

    /// Export an already shared value; importers receive this same `Arc`
    pub fn export_shared<T: Any + Send + Sync>(&self, owner: &str, name: &str, value: Arc<T>) -> PluginResult<()> {
        if owner.is_empty() || name.is_empty() {
            return Err(PluginError::generic("Service owner and name must not be empty"));
        }

        let mut services = self.services.write();
        let key = (owner.to_string(), name.to_string());
        if services.contains_key(&key) {
            return Err(PluginError::service_already_exported(owner, name));
        }
        services.insert(key, ServiceEntry { value, type_name: type_name::<T>(), exported_at: Utc::now() });
        debug!("Plugin '{}' exported service '{}' ({})", owner, name, type_name::<T>());
        Ok(())
    }

    /// Import the exact value exported under `(owner, name)`
    pub fn import(&self, owner: &str, name: &str) -> PluginResult<ServiceValue> {
        let value = {
            let services = self.services.read();
            let entry = services
                .get(&(owner.to_string(), name.to_string()))
                .ok_or_else(|| PluginError::service_not_found(owner, name))?;
            Arc::clone(&entry.value)
        };
        self.metrics.record_service_call(owner);
        Ok(value)
    }

    /// Import and downcast to the expected type
    pub fn import_as<T: Any + Send + Sync>(&self, owner: &str, name: &str) -> PluginResult<Arc<T>> {
        self.import(owner, name)?
            .downcast::<T>()
            .map_err(|_| PluginError::service_type_mismatch(owner, name, type_name::<T>()))
    }

    /// Names exported by one owner, sorted
    pub fn list(&self, owner: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .read()
            .keys()
            .filter(|(o, _)| o == owner)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn info(&self, owner: &str, name: &str) -> Option<ServiceInfo> {
        self.services.read().get(&(owner.to_string(), name.to_string())).map(|entry| ServiceInfo {
            owner: owner.to_string(),
            name: name.to_string(),
            type_name: entry.type_name,
            exported_at: entry.exported_at,
        })
    }

    pub fn contains(&self, owner: &str, name: &str) -> bool {
        self.services.read().contains_key(&(owner.to_string(), name.to_string()))
    }

    /// Remove one entry; removing an absent entry is an error
    pub fn unregister(&self, owner: &str, name: &str) -> PluginResult<()> {
        self.services
            .write()
            .remove(&(owner.to_string(), name.to_string()))
            .map(|_| debug!("Plugin '{}' unregistered service '{}'", owner, name))
            .ok_or_else(|| PluginError::service_not_found(owner, name))
    }

    /// Remove everything an owner exported; returns how many were removed
    pub fn unregister_all(&self, owner: &str) -> usize {
        let mut services = self.services.write();
        let before = services.len();
        services.retain(|(o, _), _| o != owner);
        before - services.len()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry").field("services", &self.len()).finish()
    }
}

/// A plugin's view of the registry; exports are always owned by that plugin
#[derive(Clone)]
pub struct PluginServices {
    plugin: String,
    registry: Arc<ServiceRegistry>,
}

impl PluginServices {
    pub fn new(plugin: &str, registry: Arc<ServiceRegistry>) -> Self {
        Self { plugin: plugin.to_string(), registry }
    }

    pub fn export<T: Any + Send + Sync>(&self, name: &str, value: T) -> PluginResult<()> {
        self.registry.export(&self.plugin, name, value)
    }

    pub fn export_shared<T: Any + Send + Sync>(&self, name: &str, value: Arc<T>) -> PluginResult<()> {
        self.registry.export_shared(&self.plugin, name, value)
    }

    pub fn import(&self, owner: &str, name: &str) -> PluginResult<ServiceValue> {
        self.registry.import(owner, name)
    }

    pub fn import_as<T: Any + Send + Sync>(&self, owner: &str, name: &str) -> PluginResult<Arc<T>> {
        self.registry.import_as(owner, name)
    }

    pub fn list(&self, owner: &str) -> Vec<String> {
        self.registry.list(owner)
    }

    /// Remove one of this plugin's own services
    pub fn unregister(&self, name: &str) -> PluginResult<()> {
        self.registry.unregister(&self.plugin, name)
    }
}

impl std::fmt::Debug for PluginServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginServices").field("plugin", &self.plugin).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::metrics::MetricsStore;

    #[derive(Debug, PartialEq)]
    struct Greeter {
        greeting: String,
    }

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(MetricsStore::shared())
    }

    #[test]
    fn test_export_and_import_identical_value() {
        let registry = registry();
        let greeter = Arc::new(Greeter { greeting: "hi".into() });
        registry.export_shared("a", "greeter", Arc::clone(&greeter)).unwrap();

        assert_eq!(registry.list("a"), vec!["greeter"]);
        let imported = registry.import_as::<Greeter>("a", "greeter").unwrap();
        assert!(Arc::ptr_eq(&imported, &greeter));
    }

    #[test]
    fn test_duplicate_export_rejected() {
        let registry = registry();
        registry.export("a", "svc", 1u32).unwrap();
        let err = registry.export("a", "svc", 2u32).unwrap_err();
        assert!(matches!(err, PluginError::ServiceAlreadyExported { .. }));
    }

    #[test]
    fn test_same_name_isolated_per_owner() {
        let registry = registry();
        registry.export("a", "svc", "from a").unwrap();
        registry.export("b", "svc", "from b").unwrap();

        assert_eq!(*registry.import_as::<&str>("a", "svc").unwrap(), "from a");
        assert_eq!(*registry.import_as::<&str>("b", "svc").unwrap(), "from b");
        registry.unregister("a", "svc").unwrap();
        assert!(registry.contains("b", "svc"));
    }

    #[test]
    fn test_import_missing_is_not_found() {
        let registry = registry();
        registry.export("a", "svc", 1u8).unwrap();
        let err = registry.import("b", "svc").unwrap_err();
        assert!(matches!(err, PluginError::ServiceNotFound { .. }));
        assert!(registry.list("b").is_empty());
    }

    #[test]
    fn test_import_as_wrong_type() {
        let registry = registry();
        registry.export("a", "svc", 1u8).unwrap();
        let err = registry.import_as::<String>("a", "svc").unwrap_err();
        assert!(matches!(err, PluginError::ServiceTypeMismatch { .. }));
    }

    #[test]
    fn test_double_unregister_is_error() {
        let registry = registry();
        registry.export("a", "svc", 1u8).unwrap();
        registry.unregister("a", "svc").unwrap();
        assert!(registry.unregister("a", "svc").is_err());
    }

    #[test]
    fn test_unregister_all_and_call_counts() {
        let metrics = MetricsStore::shared();
        let registry = ServiceRegistry::new(metrics.clone());
        registry.export("a", "one", 1u8).unwrap();
        registry.export("a", "two", 2u8).unwrap();
        registry.export("b", "one", 3u8).unwrap();

        registry.import("a", "one").unwrap();
        registry.import("a", "two").unwrap();
        assert_eq!(metrics.snapshot("a").service_calls, 2);

        assert_eq!(registry.unregister_all("a"), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.info("b", "one").map(|i| i.type_name), Some("u8"));
    }

    #[test]
    fn test_plugin_view_exports_as_owner() {
        let registry = Arc::new(registry());
        let view = PluginServices::new("blog", Arc::clone(&registry));
        view.export("posts", vec![1, 2, 3]).unwrap();
        assert_eq!(registry.list("blog"), vec!["posts"]);
        assert_eq!(*view.import_as::<Vec<i32>>("blog", "posts").unwrap(), vec![1, 2, 3]);
        view.unregister("posts").unwrap();
        assert!(registry.is_empty());
    }
}
