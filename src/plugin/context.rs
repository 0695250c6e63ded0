//! Plugin Context
//!
//! The mediated view of the host a plugin receives at initialization. All
//! capability access goes through the mediator; hook, service and event
//! operations are bound to the plugin's own name so one plugin cannot act
//! as another.

use std::sync::Arc;

use crate::collaborators::{
    Cache, ConfigStore, Database, Filesystem, LogPluginLogger, MetricsRecorder, Network, PluginLogger, Router,
    StoreMetricsRecorder,
};
use crate::events::{EventBus, PluginEvents};
use crate::hooks::{HookSystem, PluginHooks};
use crate::plugin::error::PluginResult;
use crate::plugin::manifest::PluginManifest;
use crate::plugin::metrics::SharedMetrics;
use crate::security::{CapabilityBindings, CapabilityFlags, PermissionMediator};
use crate::services::{PluginServices, ServiceRegistry};

/// Host-side handles a context is built from
#[derive(Clone)]
pub struct HostHandles {
    pub mediator: Arc<PermissionMediator>,
    pub hooks: Arc<HookSystem>,
    pub services: Arc<ServiceRegistry>,
    pub events: Arc<EventBus>,
    pub metrics: SharedMetrics,
}

/// Per-plugin execution context
#[derive(Clone)]
pub struct PluginContext {
    manifest: Arc<PluginManifest>,
    capabilities: Arc<CapabilityBindings>,
    hooks: PluginHooks,
    services: PluginServices,
    events: PluginEvents,
    logger: Arc<dyn PluginLogger>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl PluginContext {
    pub fn new(manifest: Arc<PluginManifest>, host: &HostHandles) -> Self {
        let name = manifest.name.as_str();
        Self {
            capabilities: Arc::new(CapabilityBindings::new(Arc::clone(&host.mediator), name)),
            hooks: PluginHooks::new(name, Arc::clone(&host.hooks)),
            services: PluginServices::new(name, Arc::clone(&host.services)),
            events: PluginEvents::new(name, Arc::clone(&host.events)),
            logger: Arc::new(LogPluginLogger::new(name)),
            metrics: Arc::new(StoreMetricsRecorder::new(name, Arc::clone(&host.metrics))),
            manifest,
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// Capabilities currently granted
    pub fn permissions(&self) -> CapabilityFlags {
        self.capabilities.flags()
    }

    pub fn database(&self) -> Arc<dyn Database> {
        self.capabilities.database()
    }

    pub fn cache(&self) -> Arc<dyn Cache> {
        self.capabilities.cache()
    }

    pub fn config(&self) -> Arc<dyn ConfigStore> {
        self.capabilities.config()
    }

    pub fn router(&self) -> Arc<dyn Router> {
        self.capabilities.router()
    }

    pub fn filesystem(&self) -> Arc<dyn Filesystem> {
        self.capabilities.filesystem()
    }

    pub fn network(&self) -> Arc<dyn Network> {
        self.capabilities.network()
    }

    /// Check the `exec` permission before spawning anything
    pub fn exec_allowed(&self, operation: &str) -> PluginResult<()> {
        self.capabilities.exec_allowed(operation)
    }

    pub fn logger(&self) -> &dyn PluginLogger {
        self.logger.as_ref()
    }

    pub fn metrics(&self) -> &dyn MetricsRecorder {
        self.metrics.as_ref()
    }

    pub fn hooks(&self) -> &PluginHooks {
        &self.hooks
    }

    pub fn services(&self) -> &PluginServices {
        &self.services
    }

    pub fn events(&self) -> &PluginEvents {
        &self.events
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.manifest.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
