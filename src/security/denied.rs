//! Denial Stand-In
//!
//! A single type that implements every collaborator interface and refuses
//! every call. Handed to a plugin in place of a collaborator it may not use.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::audit::AuditLog;
use super::capability::Capability;
use crate::collaborators::{
    Cache, ConfigStore, Database, Filesystem, Network, NetworkRequest, NetworkResponse, Route, Router,
};
use crate::plugin::error::{PluginError, PluginResult};

/// Why a capability was withheld
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The plugin lacks the permission; calls are audited
    NotPermitted,
    /// The plugin is permitted but the host has no collaborator
    NotProvided,
}

/// Stand-in for a withheld collaborator
#[derive(Debug, Clone)]
pub struct DeniedCapability {
    plugin: String,
    capability: Capability,
    reason: DenialReason,
    audit: Arc<AuditLog>,
}

impl DeniedCapability {
    pub fn new(plugin: &str, capability: Capability, reason: DenialReason, audit: Arc<AuditLog>) -> Self {
        Self { plugin: plugin.to_string(), capability, reason, audit }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn reason(&self) -> DenialReason {
        self.reason
    }

    /// Audit or log a refused call, depending on why the capability is withheld
    fn refuse(&self, operation: &str) {
        match self.reason {
            DenialReason::NotPermitted => {
                self.audit.record(&self.plugin, self.capability.as_str(), operation);
            }
            DenialReason::NotProvided => debug!(
                "Plugin '{}' called {}.{} but the host provides no {} collaborator",
                self.plugin, self.capability, operation, self.capability
            ),
        }
    }

    fn deny(&self, operation: &str) -> PluginError {
        self.refuse(operation);
        match self.reason {
            DenialReason::NotPermitted => PluginError::permission_denied(&self.plugin, self.capability.as_str()),
            DenialReason::NotProvided => PluginError::capability_unavailable(self.capability.as_str()),
        }
    }
}

#[async_trait]
impl Database for DeniedCapability {
    async fn execute(&self, _statement: &str, _params: &[Value]) -> PluginResult<u64> {
        Err(self.deny("execute"))
    }

    async fn query(&self, _statement: &str, _params: &[Value]) -> PluginResult<Vec<Value>> {
        Err(self.deny("query"))
    }
}

impl Cache for DeniedCapability {
    fn get(&self, _key: &str) -> PluginResult<Option<Value>> {
        Err(self.deny("get"))
    }

    fn set(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> PluginResult<()> {
        Err(self.deny("set"))
    }

    fn delete(&self, _key: &str) -> PluginResult<bool> {
        Err(self.deny("delete"))
    }
}

impl ConfigStore for DeniedCapability {
    fn get(&self, _key: &str) -> PluginResult<Option<Value>> {
        Err(self.deny("get"))
    }

    fn set(&self, _key: &str, _value: Value) -> PluginResult<()> {
        Err(self.deny("set"))
    }

    fn keys(&self) -> PluginResult<Vec<String>> {
        Err(self.deny("keys"))
    }
}

impl Router for DeniedCapability {
    fn add_route(&self, _method: &str, _path: &str) -> PluginResult<()> {
        Err(self.deny("add_route"))
    }

    fn remove_route(&self, _method: &str, _path: &str) -> PluginResult<bool> {
        Err(self.deny("remove_route"))
    }

    fn routes(&self) -> Vec<Route> {
        self.refuse("routes");
        Vec::new()
    }

    fn has_route(&self, _method: &str, _path: &str) -> bool {
        self.refuse("has_route");
        false
    }
}

#[async_trait]
impl Filesystem for DeniedCapability {
    async fn read(&self, _path: &Path) -> PluginResult<Vec<u8>> {
        Err(self.deny("read"))
    }

    async fn write(&self, _path: &Path, _data: &[u8]) -> PluginResult<()> {
        Err(self.deny("write"))
    }

    async fn exists(&self, _path: &Path) -> PluginResult<bool> {
        Err(self.deny("exists"))
    }

    async fn list(&self, _path: &Path) -> PluginResult<Vec<PathBuf>> {
        Err(self.deny("list"))
    }
}

#[async_trait]
impl Network for DeniedCapability {
    async fn request(&self, _request: NetworkRequest) -> PluginResult<NetworkResponse> {
        Err(self.deny("request"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::metrics::MetricsStore;

    fn audit() -> Arc<AuditLog> {
        Arc::new(AuditLog::new(100, MetricsStore::shared()))
    }

    #[test]
    fn test_not_permitted_is_audited() {
        let audit = audit();
        let denied = DeniedCapability::new("blog", Capability::Cache, DenialReason::NotPermitted, audit.clone());
        let err = Cache::get(&denied, "key").unwrap_err();
        assert!(err.is_security_error());
        assert_eq!(audit.len(), 1);
        assert_eq!(audit.entries()[0].operation, "get");
    }

    #[test]
    fn test_not_provided_is_not_a_violation() {
        let audit = audit();
        let denied = DeniedCapability::new("blog", Capability::Network, DenialReason::NotProvided, audit.clone());
        let err = futures::executor::block_on(denied.request(NetworkRequest::get("http://example.com")))
            .unwrap_err();
        assert!(matches!(err, PluginError::CapabilityUnavailable { .. }));
        assert!(audit.is_empty());
    }

    #[test]
    fn test_router_queries_are_silent_but_audited() {
        let audit = audit();
        let denied = DeniedCapability::new("blog", Capability::Router, DenialReason::NotPermitted, audit.clone());
        assert!(denied.routes().is_empty());
        assert!(!denied.has_route("GET", "/"));
        assert_eq!(audit.violation_count("blog"), 2);
        let operations: Vec<String> = audit.entries().into_iter().map(|v| v.operation).collect();
        assert_eq!(operations, vec!["routes", "has_route"]);
    }
}
