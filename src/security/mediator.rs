//! Permission Mediator
//!
//! The single enforcement point for plugin capabilities. The mediator owns the
//! per-plugin permission table, hands out capability bindings and records
//! every denial in the audit log. Plugins have no handle that can change their
//! own permissions; only the manager calls [`PermissionMediator::set_permissions`].

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

use super::audit::{AuditLog, SecurityViolation};
use super::capability::{Capability, CapabilityFlags};
use super::denied::{DenialReason, DeniedCapability};
use crate::collaborators::{Cache, ConfigStore, Database, Filesystem, HostCollaborators, Network, Router};
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::manifest::PluginPermissions;
use crate::plugin::metrics::SharedMetrics;

pub struct PermissionMediator {
    permissions: RwLock<HashMap<String, CapabilityFlags>>,
    collaborators: HostCollaborators,
    audit: Arc<AuditLog>,
}

impl PermissionMediator {
    pub fn new(collaborators: HostCollaborators, metrics: SharedMetrics, max_audit_entries: usize) -> Self {
        Self {
            permissions: RwLock::new(HashMap::new()),
            collaborators,
            audit: Arc::new(AuditLog::new(max_audit_entries, metrics)),
        }
    }

    /// Replace a plugin's permission table
    pub fn set_permissions(&self, plugin: &str, flags: CapabilityFlags) {
        let previous = self.permissions.write().insert(plugin.to_string(), flags);
        if previous != Some(flags) {
            info!("Permissions for plugin '{}' set to [{}]", plugin, flags.names().join(", "));
        }
    }

    /// Set a plugin's permissions from its manifest declaration
    pub fn grant_declared(&self, plugin: &str, declared: &PluginPermissions) {
        self.set_permissions(plugin, declared.to_flags());
    }

    /// Current permissions; unknown plugins hold none
    pub fn permissions(&self, plugin: &str) -> CapabilityFlags {
        self.permissions.read().get(plugin).copied().unwrap_or_default()
    }

    pub fn is_allowed(&self, plugin: &str, capability: Capability) -> bool {
        self.permissions(plugin).allows(capability)
    }

    pub fn remove_plugin(&self, plugin: &str) {
        self.permissions.write().remove(plugin);
    }

    /// Check a capability, auditing the attempt on denial
    pub fn check(&self, plugin: &str, capability: Capability, operation: &str) -> PluginResult<()> {
        if self.is_allowed(plugin, capability) {
            return Ok(());
        }
        self.audit.record(plugin, capability.as_str(), operation);
        Err(PluginError::permission_denied(plugin, capability.as_str()))
    }

    /// Check the separately-mapped `exec` permission
    pub fn check_exec(&self, plugin: &str, operation: &str) -> PluginResult<()> {
        if self.permissions(plugin).contains(CapabilityFlags::EXEC) {
            return Ok(());
        }
        self.audit.record(plugin, "exec", operation);
        Err(PluginError::permission_denied(plugin, "exec"))
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn violations(&self) -> Vec<SecurityViolation> {
        self.audit.entries()
    }

    pub fn violations_for(&self, plugin: &str) -> Vec<SecurityViolation> {
        self.audit.entries_for(plugin)
    }

    pub fn violation_count(&self, plugin: &str) -> u64 {
        self.audit.violation_count(plugin)
    }

    fn denied(&self, plugin: &str, capability: Capability, reason: DenialReason) -> DeniedCapability {
        DeniedCapability::new(plugin, capability, reason, Arc::clone(&self.audit))
    }

    fn select<T: ?Sized>(
        flags: CapabilityFlags,
        capability: Capability,
        live: &Option<Arc<T>>,
        deny: impl FnOnce(DenialReason) -> Arc<T>,
    ) -> Arc<T> {
        if !flags.allows(capability) {
            return deny(DenialReason::NotPermitted);
        }
        match live {
            Some(live) => Arc::clone(live),
            None => deny(DenialReason::NotProvided),
        }
    }

    /// Evaluate the table once and bind each capability to its collaborator
    /// or a denial stand-in
    fn bind(&self, plugin: &str, flags: CapabilityFlags) -> BoundCapabilities {
        let c = &self.collaborators;
        debug!("Binding capabilities for plugin '{}': [{}]", plugin, flags.names().join(", "));
        BoundCapabilities {
            flags,
            database: Self::select(flags, Capability::Database, &c.database, |r| {
                Arc::new(self.denied(plugin, Capability::Database, r)) as Arc<dyn Database>
            }),
            cache: Self::select(flags, Capability::Cache, &c.cache, |r| {
                Arc::new(self.denied(plugin, Capability::Cache, r)) as Arc<dyn Cache>
            }),
            config: Self::select(flags, Capability::Config, &c.config, |r| {
                Arc::new(self.denied(plugin, Capability::Config, r)) as Arc<dyn ConfigStore>
            }),
            router: Self::select(flags, Capability::Router, &c.router, |r| {
                Arc::new(self.denied(plugin, Capability::Router, r)) as Arc<dyn Router>
            }),
            filesystem: Self::select(flags, Capability::Filesystem, &c.filesystem, |r| {
                Arc::new(self.denied(plugin, Capability::Filesystem, r)) as Arc<dyn Filesystem>
            }),
            network: Self::select(flags, Capability::Network, &c.network, |r| {
                Arc::new(self.denied(plugin, Capability::Network, r)) as Arc<dyn Network>
            }),
        }
    }
}

impl std::fmt::Debug for PermissionMediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionMediator")
            .field("plugins", &self.permissions.read().len())
            .field("collaborators", &self.collaborators)
            .field("violations", &self.audit.len())
            .finish()
    }
}

#[derive(Clone)]
struct BoundCapabilities {
    flags: CapabilityFlags,
    database: Arc<dyn Database>,
    cache: Arc<dyn Cache>,
    config: Arc<dyn ConfigStore>,
    router: Arc<dyn Router>,
    filesystem: Arc<dyn Filesystem>,
    network: Arc<dyn Network>,
}

/// A plugin's capability accessors
///
/// Bound once at construction. Each access re-checks the plugin's current
/// flags and rebinds if the manager has re-set them since.
pub struct CapabilityBindings {
    plugin: String,
    mediator: Arc<PermissionMediator>,
    bound: RwLock<BoundCapabilities>,
}

impl CapabilityBindings {
    pub fn new(mediator: Arc<PermissionMediator>, plugin: &str) -> Self {
        let bound = mediator.bind(plugin, mediator.permissions(plugin));
        Self { plugin: plugin.to_string(), mediator, bound: RwLock::new(bound) }
    }

    fn current<R>(&self, access: impl FnOnce(&BoundCapabilities) -> R) -> R {
        let flags = self.mediator.permissions(&self.plugin);
        {
            let bound = self.bound.read();
            if bound.flags == flags {
                return access(&*bound);
            }
        }
        let fresh = self.mediator.bind(&self.plugin, flags);
        let result = access(&fresh);
        *self.bound.write() = fresh;
        result
    }

    pub fn flags(&self) -> CapabilityFlags {
        self.mediator.permissions(&self.plugin)
    }

    pub fn database(&self) -> Arc<dyn Database> {
        self.current(|b| Arc::clone(&b.database))
    }

    pub fn cache(&self) -> Arc<dyn Cache> {
        self.current(|b| Arc::clone(&b.cache))
    }

    pub fn config(&self) -> Arc<dyn ConfigStore> {
        self.current(|b| Arc::clone(&b.config))
    }

    pub fn router(&self) -> Arc<dyn Router> {
        self.current(|b| Arc::clone(&b.router))
    }

    pub fn filesystem(&self) -> Arc<dyn Filesystem> {
        self.current(|b| Arc::clone(&b.filesystem))
    }

    pub fn network(&self) -> Arc<dyn Network> {
        self.current(|b| Arc::clone(&b.network))
    }

    pub fn exec_allowed(&self, operation: &str) -> PluginResult<()> {
        self.mediator.check_exec(&self.plugin, operation)
    }
}

impl std::fmt::Debug for CapabilityBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityBindings")
            .field("plugin", &self.plugin)
            .field("flags", &self.bound.read().flags)
            .finish()
    }
}
