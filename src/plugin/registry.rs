//! Plugin Registry
//!
//! Explicit registry of plugin implementations. Each plugin module registers
//! its implementation with a call at startup; nothing registers itself as a
//! side effect of being linked. Iteration is name-sorted.

use std::collections::BTreeMap;

use log::debug;

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::manifest::is_valid_plugin_name;
use crate::plugin::traits::Plugin;

/// Registry of plugin implementations by name
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under its own name
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) -> PluginResult<()> {
        let name = plugin.name().to_string();
        if !is_valid_plugin_name(&name) {
            return Err(PluginError::manifest_invalid(format!("Invalid plugin name: '{}'", name)));
        }
        if self.plugins.contains_key(&name) {
            return Err(PluginError::plugin_already_registered(&name));
        }
        debug!("Registered plugin implementation '{}'", name);
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Remove an implementation, handing it back to the caller
    pub fn unregister_plugin(&mut self, name: &str) -> PluginResult<Box<dyn Plugin>> {
        self.plugins.remove(name).ok_or_else(|| PluginError::plugin_not_found(name))
    }

    pub fn get_plugin(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.get(name).map(|p| p.as_ref())
    }

    pub fn get_plugin_mut(&mut self, name: &str) -> Option<&mut Box<dyn Plugin>> {
        self.plugins.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names, sorted
    pub fn list_plugins(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").field("plugins", &self.list_plugins()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::tests::mock_plugins::MockPlugin;

    #[test]
    fn test_registry_basic_operations() {
        let mut registry = PluginRegistry::new();
        assert!(registry.is_empty());

        registry.register_plugin(Box::new(MockPlugin::new("zeta"))).unwrap();
        registry.register_plugin(Box::new(MockPlugin::new("alpha"))).unwrap();

        assert_eq!(registry.plugin_count(), 2);
        assert_eq!(registry.list_plugins(), vec!["alpha", "zeta"]);
        assert!(registry.get_plugin("alpha").is_some());
        assert!(registry.get_plugin("missing").is_none());

        let removed = registry.unregister_plugin("alpha").unwrap();
        assert_eq!(removed.name(), "alpha");
        assert!(!registry.contains("alpha"));
    }

    #[test]
    fn test_registry_duplicate_registration() {
        let mut registry = PluginRegistry::new();
        registry.register_plugin(Box::new(MockPlugin::new("test"))).unwrap();
        let result = registry.register_plugin(Box::new(MockPlugin::new("test")));
        assert!(matches!(result.unwrap_err(), PluginError::PluginAlreadyRegistered { .. }));
    }

    #[test]
    fn test_registry_rejects_invalid_names() {
        let mut registry = PluginRegistry::new();
        assert!(registry.register_plugin(Box::new(MockPlugin::new("has space"))).is_err());
        assert!(registry.unregister_plugin("nobody").is_err());
    }
}
