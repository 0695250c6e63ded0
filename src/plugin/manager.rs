//! Plugin Manager
//!
//! Central coordinator for the plugin lifecycle. Owns the registry of plugin
//! implementations and the per-plugin records, drives discovery, dependency
//! resolution, initialization, start and shutdown, and assembles health and
//! metrics snapshots from the host subcomponents.
//!
//! Lifecycle calls run strictly one at a time: the registry mutex is held for
//! the whole of each phase, so `initialize`, `start` and `stop` never overlap.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::collaborators::HostCollaborators;
use crate::config::PluginHostConfig;
use crate::events::EventBus;
use crate::hooks::system::panic_message;
use crate::hooks::{DispatchReport, HookContext, HookSystem, HookType};
use crate::plugin::compatibility::VersionCompatibilityChecker;
use crate::plugin::context::{HostHandles, PluginContext};
use crate::plugin::discovery::{FileBasedDiscovery, PluginDiscovery};
use crate::plugin::error::{PluginError, PluginFailure, PluginResult};
use crate::plugin::health::{render_prometheus, PluginHealth, PluginMetrics};
use crate::plugin::manifest::PluginManifest;
use crate::plugin::metrics::{MetricsStore, SharedMetrics};
use crate::plugin::registry::PluginRegistry;
use crate::plugin::resolver::DependencyResolver;
use crate::plugin::traits::{Plugin, PluginState};
use crate::security::{CapabilityFlags, PermissionMediator};
use crate::services::ServiceRegistry;

/// What the manager knows about one discovered plugin
#[derive(Debug, Clone)]
pub struct PluginRecord {
    pub name: String,
    pub manifest: Arc<PluginManifest>,
    pub state: PluginState,
    /// Manifest file, when discovered from disk
    pub source: Option<PathBuf>,
}

/// Outcome of a shutdown pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Plugins stopped cleanly, in stop order
    pub stopped: Vec<String>,
    pub failures: Vec<PluginFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Plugin lifecycle coordinator
pub struct PluginManager {
    config: PluginHostConfig,
    checker: VersionCompatibilityChecker,
    registry: Mutex<PluginRegistry>,
    records: RwLock<BTreeMap<String, PluginRecord>>,
    order: RwLock<Vec<String>>,
    host: HostHandles,
    stopped: AtomicBool,
}

impl PluginManager {
    /// Create a manager with the in-memory collaborators
    pub fn new(config: PluginHostConfig) -> PluginResult<Self> {
        Self::with_collaborators(config, HostCollaborators::in_memory())
    }

    /// Create a manager granting plugins the given collaborators
    pub fn with_collaborators(config: PluginHostConfig, collaborators: HostCollaborators) -> PluginResult<Self> {
        let checker = VersionCompatibilityChecker::new(&config.framework_version)?;
        let metrics = MetricsStore::shared();
        let host = HostHandles {
            mediator: Arc::new(PermissionMediator::new(collaborators, Arc::clone(&metrics), config.max_audit_entries)),
            hooks: Arc::new(HookSystem::with_fault_threshold(Arc::clone(&metrics), config.hook_fault_threshold)),
            services: Arc::new(ServiceRegistry::new(Arc::clone(&metrics))),
            events: Arc::new(EventBus::new(Arc::clone(&metrics))),
            metrics,
        };

        debug!(
            "Plugin manager created (framework {}, enabled: {})",
            config.framework_version, config.enabled
        );
        Ok(Self {
            config,
            checker,
            registry: Mutex::new(PluginRegistry::new()),
            records: RwLock::new(BTreeMap::new()),
            order: RwLock::new(Vec::new()),
            host,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PluginHostConfig {
        &self.config
    }

    /// Register a plugin implementation; its manifest is bound at discovery
    pub async fn register_plugin(&self, plugin: Box<dyn Plugin>) -> PluginResult<()> {
        self.registry.lock().await.register_plugin(plugin)
    }

    /// Discover manifests in the configured plugin directory
    pub async fn discover_plugins(&self) -> PluginResult<Vec<String>> {
        if !self.config.enabled {
            debug!("Plugin support disabled; skipping discovery");
            return Ok(Vec::new());
        }

        let discovery = FileBasedDiscovery::new(&self.config.directory)?;
        let found = discovery.discover_plugins().await?;
        let batch = found.into_iter().map(|d| (d.manifest, Some(d.path))).collect();
        self.discover_batch(batch).await
    }

    /// Admit manifests supplied directly rather than read from disk
    pub async fn discover_manifests(&self, manifests: Vec<PluginManifest>) -> PluginResult<Vec<String>> {
        let batch = manifests.into_iter().map(|m| (m, None)).collect();
        self.discover_batch(batch).await
    }

    /// Validate a batch of manifests; nothing is admitted unless all pass
    async fn discover_batch(&self, batch: Vec<(PluginManifest, Option<PathBuf>)>) -> PluginResult<Vec<String>> {
        let registry = self.registry.lock().await;
        let mut failures = Vec::new();
        let mut accepted = Vec::new();

        {
            let records = self.records.read();
            let mut seen = BTreeSet::new();

            for (manifest, source) in batch {
                if self.config.is_excluded(&manifest.name) {
                    info!("Skipping excluded plugin '{}'", manifest.name);
                    continue;
                }

                let check = manifest
                    .validate()
                    .and_then(|_| self.checker.check_plugin_compatibility(&manifest))
                    .and_then(|_| {
                        let known = records.get(&manifest.name).map_or(false, |r| !r.state.is_terminal());
                        if !seen.insert(manifest.name.clone()) || known {
                            Err(PluginError::plugin_already_registered(&manifest.name))
                        } else {
                            Ok(())
                        }
                    })
                    .and_then(|_| {
                        if registry.contains(&manifest.name) {
                            Ok(())
                        } else {
                            Err(PluginError::generic(format!(
                                "No implementation registered for plugin '{}'",
                                manifest.name
                            )))
                        }
                    });

                match check {
                    Ok(()) => accepted.push((manifest, source)),
                    Err(e) => {
                        let label = if manifest.name.trim().is_empty() { "<unnamed>" } else { manifest.name.as_str() };
                        warn!("Rejected plugin manifest '{}': {}", label, e);
                        failures.push(PluginFailure::new(label, e.to_string()));
                    }
                }
            }
        }
        drop(registry);

        if !failures.is_empty() {
            return Err(PluginError::startup_failed("discover", failures));
        }

        let names: Vec<String> = accepted.iter().map(|(m, _)| m.name.clone()).collect();
        {
            let mut records = self.records.write();
            for (manifest, source) in accepted {
                let name = manifest.name.clone();
                records.insert(
                    name.clone(),
                    PluginRecord { name, manifest: Arc::new(manifest), state: PluginState::Discovered, source },
                );
            }
        }
        for name in &names {
            self.set_state(name, PluginState::Validated);
        }

        info!("Discovered {} plugin(s)", names.len());
        Ok(names)
    }

    /// Resolve dependency order and initialize every validated plugin
    pub async fn initialize_all(&self) -> PluginResult<()> {
        let manifests: Vec<Arc<PluginManifest>> = self
            .records
            .read()
            .values()
            .filter(|r| !r.state.is_terminal())
            .map(|r| Arc::clone(&r.manifest))
            .collect();
        let refs: Vec<&PluginManifest> = manifests.iter().map(|m| m.as_ref()).collect();

        let order = match DependencyResolver::new(&self.checker).resolve(&refs) {
            Ok(order) => order,
            Err(e) => {
                error!("Plugin dependency resolution failed: {}", e);
                for name in self.names_in_state(PluginState::Validated) {
                    self.host.metrics.record_error(&name, &e.to_string());
                    self.set_state(&name, PluginState::Failed);
                }
                return Err(e);
            }
        };
        *self.order.write() = order.clone();

        let mut registry = self.registry.lock().await;
        let mut failures = Vec::new();

        for name in &order {
            let Some(record) = self.record(name) else { continue };
            if record.state != PluginState::Validated {
                continue;
            }

            if let Some(dep) = self.unmet_dependency(&record.manifest, |s| s == PluginState::Initialized || s.is_active()) {
                let e = PluginError::lifecycle_failed(
                    name,
                    "initialize",
                    format!("required dependency '{}' is not initialized", dep),
                );
                failures.push(self.fail(name, &e));
                continue;
            }

            self.host.mediator.grant_declared(name, &record.manifest.permissions);
            let context = PluginContext::new(Arc::clone(&record.manifest), &self.host);

            let result = match registry.get_plugin_mut(name) {
                Some(plugin) => guarded(name, "initialize", plugin.initialize(&context)).await,
                None => Err(PluginError::plugin_not_found(name)),
            };
            match result {
                Ok(()) => {
                    self.set_state(name, PluginState::Initialized);
                    info!("Initialized plugin '{}' v{}", name, record.manifest.version);
                }
                Err(e) => failures.push(self.fail(name, &e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PluginError::startup_failed("initialize", failures))
        }
    }

    /// Start initialized plugins in order, then fire the startup hooks
    pub async fn start_all(&self) -> PluginResult<()> {
        let order = self.order.read().clone();
        let mut failures = Vec::new();

        {
            let mut registry = self.registry.lock().await;
            for name in &order {
                if self.plugin_state(name) != Some(PluginState::Initialized) {
                    continue;
                }
                let Some(manifest) = self.manifest(name) else { continue };

                if let Some(dep) = self.unmet_dependency(&manifest, |s| s.is_active()) {
                    let e = PluginError::lifecycle_failed(
                        name,
                        "start",
                        format!("required dependency '{}' is not running", dep),
                    );
                    failures.push(self.fail(name, &e));
                    continue;
                }

                let result = match registry.get_plugin_mut(name) {
                    Some(plugin) => guarded(name, "start", plugin.start()).await,
                    None => Err(PluginError::plugin_not_found(name)),
                };
                match result {
                    Ok(()) => {
                        self.set_state(name, PluginState::Started);
                        info!("Started plugin '{}'", name);
                    }
                    Err(e) => failures.push(self.fail(name, &e)),
                }
            }
        }

        let started = self.names_in_state(PluginState::Started);
        if !started.is_empty() {
            self.stopped.store(false, Ordering::SeqCst);
            self.fire(HookType::Startup);
            for name in &started {
                self.set_state(name, PluginState::Running);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PluginError::startup_failed("start", failures))
        }
    }

    /// Fire the shutdown hooks, then stop plugins in reverse order
    ///
    /// Calls after the first are no-ops until plugins are started again. A
    /// failing stop is logged and never prevents the rest from stopping.
    pub async fn stop_all(&self) -> ShutdownReport {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Plugin shutdown already performed");
            return ShutdownReport::default();
        }

        self.fire(HookType::Shutdown);

        let order = self.order.read().clone();
        let mut report = ShutdownReport::default();
        let mut registry = self.registry.lock().await;

        for name in order.iter().rev() {
            let Some(state) = self.plugin_state(name) else { continue };

            if state.is_active() {
                let result = match registry.get_plugin_mut(name) {
                    Some(plugin) => guarded(name, "stop", plugin.stop()).await,
                    None => Err(PluginError::plugin_not_found(name)),
                };
                match result {
                    Ok(()) => {
                        self.set_state(name, PluginState::Stopped);
                        self.teardown(name);
                        info!("Stopped plugin '{}'", name);
                        report.stopped.push(name.clone());
                    }
                    Err(e) => report.failures.push(self.fail(name, &e)),
                }
            } else if state == PluginState::Initialized {
                self.set_state(name, PluginState::Stopped);
                self.teardown(name);
                report.stopped.push(name.clone());
            }
        }

        info!(
            "Plugin shutdown complete: {} stopped, {} failed",
            report.stopped.len(),
            report.failures.len()
        );
        report
    }

    /// Discover, initialize and start everything; a no-op when plugins are disabled
    pub async fn startup(&self) -> PluginResult<()> {
        if !self.config.enabled {
            info!("Plugin support disabled");
            return Ok(());
        }
        self.discover_plugins().await?;
        self.initialize_all().await?;
        self.start_all().await
    }

    /// Stop (if needed) and remove one plugin with everything it registered
    pub async fn unload_plugin(&self, name: &str) -> PluginResult<()> {
        let record = self.record(name).ok_or_else(|| PluginError::plugin_not_found(name))?;

        let dependents: Vec<String> = self
            .records
            .read()
            .values()
            .filter(|r| r.name != name && (r.state == PluginState::Initialized || r.state.is_active()))
            .filter(|r| r.manifest.required_dependencies().any(|d| d.name == name))
            .map(|r| r.name.clone())
            .collect();
        if !dependents.is_empty() {
            return Err(PluginError::invalid_state(format!(
                "Cannot unload plugin '{}': required by {}",
                name,
                dependents.join(", ")
            )));
        }

        {
            let mut registry = self.registry.lock().await;
            if record.state.is_active() {
                if let Some(plugin) = registry.get_plugin_mut(name) {
                    if let Err(e) = guarded(name, "stop", plugin.stop()).await {
                        warn!("Plugin '{}' failed to stop cleanly during unload: {}", name, e);
                    }
                }
            }
            if registry.unregister_plugin(name).is_err() {
                debug!("Plugin '{}' had no registered implementation", name);
            }
        }

        self.teardown(name);
        self.host.hooks.clear_stats(name);
        self.host.mediator.remove_plugin(name);
        self.host.metrics.remove(name);
        self.records.write().remove(name);
        self.order.write().retain(|n| n != name);

        info!("Unloaded plugin '{}'", name);
        Ok(())
    }

    /// Replace a plugin's capability grants
    pub fn set_permissions(&self, name: &str, flags: CapabilityFlags) -> PluginResult<()> {
        if !self.records.read().contains_key(name) {
            return Err(PluginError::plugin_not_found(name));
        }
        info!("Setting permissions for plugin '{}': {:?}", name, flags.names());
        self.host.mediator.set_permissions(name, flags);
        Ok(())
    }

    /// Dispatch a hook type to every registered handler
    pub fn execute_hooks(&self, hook: HookType, context: &mut HookContext) -> DispatchReport {
        self.host.hooks.execute_hooks(hook, context)
    }

    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.records.read().get(name).map(|r| r.state)
    }

    /// Most recently resolved initialization order
    pub fn initialization_order(&self) -> Vec<String> {
        self.order.read().clone()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    pub fn manifest(&self, name: &str) -> Option<Arc<PluginManifest>> {
        self.records.read().get(name).map(|r| Arc::clone(&r.manifest))
    }

    pub fn record(&self, name: &str) -> Option<PluginRecord> {
        self.records.read().get(name).cloned()
    }

    /// Health of every known plugin, by name
    pub fn get_all_health(&self) -> Vec<PluginHealth> {
        self.records
            .read()
            .values()
            .map(|r| PluginHealth::new(&r.name, &r.manifest.version, r.state, &self.host.metrics.snapshot(&r.name)))
            .collect()
    }

    /// Counters and per-hook statistics of every known plugin, by name
    pub fn get_all_plugin_metrics(&self) -> Vec<PluginMetrics> {
        self.records
            .read()
            .values()
            .map(|r| PluginMetrics {
                name: r.name.clone(),
                state: r.state,
                counters: self.host.metrics.snapshot(&r.name),
                hooks: self
                    .host
                    .hooks
                    .stats_for(&r.name)
                    .into_iter()
                    .map(|(hook, stats)| (hook.to_string(), stats))
                    .collect(),
            })
            .collect()
    }

    pub fn export_prometheus_metrics(&self) -> String {
        render_prometheus(&self.get_all_plugin_metrics())
    }

    pub fn hooks(&self) -> &Arc<HookSystem> {
        &self.host.hooks
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.host.services
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.host.events
    }

    pub fn mediator(&self) -> &Arc<PermissionMediator> {
        &self.host.mediator
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.host.metrics
    }

    fn fire(&self, hook: HookType) {
        let mut context = HookContext::new(hook);
        let report = self.host.hooks.execute_hooks(hook, &mut context);
        if report.fault_count() > 0 {
            warn!("{} hook: {} of {} handler(s) faulted", hook, report.fault_count(), report.executed());
        } else {
            debug!("{} hook: {} handler(s) ran", hook, report.executed());
        }
    }

    fn set_state(&self, name: &str, next: PluginState) {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(name) {
            if record.state.can_transition_to(next) {
                debug!("Plugin '{}': {} -> {}", name, record.state, next);
                record.state = next;
            } else {
                warn!("Ignoring invalid transition for plugin '{}': {} -> {}", name, record.state, next);
            }
        }
    }

    fn names_in_state(&self, state: PluginState) -> Vec<String> {
        self.records.read().values().filter(|r| r.state == state).map(|r| r.name.clone()).collect()
    }

    /// First required dependency whose state does not satisfy `ready`
    fn unmet_dependency(&self, manifest: &PluginManifest, ready: impl Fn(PluginState) -> bool) -> Option<String> {
        let records = self.records.read();
        manifest
            .required_dependencies()
            .find(|dep| !records.get(&dep.name).map_or(false, |r| ready(r.state)))
            .map(|dep| dep.name.clone())
    }

    /// Mark a plugin failed and drop everything it registered
    fn fail(&self, name: &str, e: &PluginError) -> PluginFailure {
        let message = e.to_string();
        error!("Plugin '{}' failed: {}", name, message);
        self.host.metrics.record_error(name, &message);
        self.set_state(name, PluginState::Failed);
        self.teardown(name);
        PluginFailure::new(name, message)
    }

    fn teardown(&self, name: &str) {
        let hooks = self.host.hooks.unregister_plugin(name);
        let services = self.host.services.unregister_all(name);
        let subscriptions = self.host.events.unsubscribe_all(name);
        if hooks + services + subscriptions > 0 {
            debug!(
                "Removed {} hook(s), {} service(s) and {} subscription(s) of plugin '{}'",
                hooks, services, subscriptions, name
            );
        }
    }
}

/// Run one lifecycle call, turning errors and panics into a lifecycle failure
async fn guarded<F>(plugin: &str, phase: &str, call: F) -> PluginResult<()>
where
    F: Future<Output = PluginResult<()>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e @ PluginError::LifecycleFailed { .. })) => Err(e),
        Ok(Err(e)) => Err(PluginError::lifecycle_failed(plugin, phase, e.to_string())),
        Err(payload) => Err(PluginError::lifecycle_failed(
            plugin,
            phase,
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}
