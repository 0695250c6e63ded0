//! Hook System
//!
//! Priority-ordered, fault-isolated dispatch over the fixed set of hook
//! types. Dispatch copies the ordered handler list under the read lock and
//! releases it before running any handler, so handlers may register or
//! unregister hooks without deadlocking and without affecting the dispatch
//! already in flight.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use log::{debug, error, warn};
use parking_lot::RwLock;

use super::types::{
    DispatchReport, HandlerReport, HookContext, HookHandler, HookId, HookOutcome, HookStats, HookType,
};
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::manifest::is_valid_plugin_name;
use crate::plugin::metrics::SharedMetrics;
use crate::plugin::priority_queue::PriorityQueue;

#[derive(Clone)]
struct HookRegistration {
    id: HookId,
    plugin: String,
    priority: i32,
    handler: HookHandler,
    consecutive_faults: Arc<AtomicU32>,
    disabled: Arc<AtomicBool>,
}

/// Public view of a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInfo {
    pub id: HookId,
    pub plugin: String,
    pub hook: HookType,
    pub priority: i32,
    pub disabled: bool,
}

pub struct HookSystem {
    hooks: RwLock<HashMap<HookType, PriorityQueue<HookRegistration>>>,
    stats: DashMap<(String, HookType), HookStats>,
    next_id: AtomicU64,
    /// Consecutive faults before a registration is disabled; zero never disables
    fault_threshold: u32,
    metrics: SharedMetrics,
}

impl HookSystem {
    pub fn new(metrics: SharedMetrics) -> Self {
        Self::with_fault_threshold(metrics, 0)
    }

    pub fn with_fault_threshold(metrics: SharedMetrics, fault_threshold: u32) -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
            stats: DashMap::new(),
            next_id: AtomicU64::new(1),
            fault_threshold,
            metrics,
        }
    }

    /// Register a handler; higher priorities run first, ties in registration order
    pub fn register<F>(&self, plugin: &str, hook: HookType, priority: i32, handler: F) -> PluginResult<HookId>
    where
        F: Fn(&mut HookContext) -> PluginResult<()> + Send + Sync + 'static,
    {
        self.register_handler(plugin, hook, priority, Arc::new(handler))
    }

    /// Register against a hook type given by name
    pub fn register_named<F>(&self, plugin: &str, hook: &str, priority: i32, handler: F) -> PluginResult<HookId>
    where
        F: Fn(&mut HookContext) -> PluginResult<()> + Send + Sync + 'static,
    {
        let hook: HookType = hook.parse()?;
        self.register(plugin, hook, priority, handler)
    }

    pub fn register_handler(
        &self,
        plugin: &str,
        hook: HookType,
        priority: i32,
        handler: HookHandler,
    ) -> PluginResult<HookId> {
        if !is_valid_plugin_name(plugin) {
            return Err(PluginError::invalid_hook(format!(
                "Invalid plugin name '{}' for {} hook",
                plugin, hook
            )));
        }

        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = HookRegistration {
            id,
            plugin: plugin.to_string(),
            priority,
            handler,
            consecutive_faults: Arc::new(AtomicU32::new(0)),
            disabled: Arc::new(AtomicBool::new(false)),
        };
        self.hooks.write().entry(hook).or_default().push(priority, registration);
        debug!("Registered {} hook {} for plugin '{}' at priority {}", hook, id, plugin, priority);
        Ok(id)
    }

    /// Remove one registration
    pub fn unregister(&self, id: HookId) -> PluginResult<()> {
        let mut hooks = self.hooks.write();
        for queue in hooks.values_mut() {
            if queue.remove_by(|r| r.id == id).is_some() {
                debug!("Unregistered {}", id);
                return Ok(());
            }
        }
        Err(PluginError::invalid_hook(format!("No hook registered with id {}", id.0)))
    }

    /// Remove every registration owned by a plugin; returns how many were removed
    ///
    /// Execution stats are kept so a stopped or failed plugin still reports them.
    pub fn unregister_plugin(&self, plugin: &str) -> usize {
        let removed: usize = self
            .hooks
            .write()
            .values_mut()
            .map(|queue| queue.retain(|r| r.plugin != plugin))
            .sum();
        if removed > 0 {
            debug!("Removed {} hook registrations for plugin '{}'", removed, plugin);
        }
        removed
    }

    /// Drop the execution stats of a plugin
    pub fn clear_stats(&self, plugin: &str) {
        self.stats.retain(|(owner, _), _| owner != plugin);
    }

    /// Dispatch a hook type; always succeeds, faults are reported per handler
    pub fn execute_hooks(&self, hook: HookType, ctx: &mut HookContext) -> DispatchReport {
        let handlers = {
            let hooks = self.hooks.read();
            hooks.get(&hook).map(|queue| queue.snapshot()).unwrap_or_default()
        };

        ctx.begin_dispatch(hook);
        let mut report = DispatchReport { hook, handlers: Vec::with_capacity(handlers.len()), skipped: false };

        for registration in handlers {
            if registration.disabled.load(Ordering::Relaxed) {
                continue;
            }

            let started = Instant::now();
            let outcome = invoke(&registration.handler, ctx);
            let duration = started.elapsed();

            self.record(&registration, hook, &outcome, duration);
            report.handlers.push(HandlerReport {
                id: registration.id,
                plugin: registration.plugin.clone(),
                priority: registration.priority,
                outcome,
                duration,
            });

            if ctx.is_skipped() {
                debug!("{} dispatch skipped by plugin '{}'", hook, registration.plugin);
                report.skipped = true;
                break;
            }
        }
        report
    }

    /// Dispatch a hook type given by name
    pub fn execute_named(&self, hook: &str, ctx: &mut HookContext) -> PluginResult<DispatchReport> {
        let hook: HookType = hook.parse()?;
        Ok(self.execute_hooks(hook, ctx))
    }

    fn record(&self, registration: &HookRegistration, hook: HookType, outcome: &HookOutcome, duration: std::time::Duration) {
        let failed = !outcome.is_success();
        {
            let mut stats = self.stats.entry((registration.plugin.clone(), hook)).or_default();
            stats.executions += 1;
            stats.total_duration += duration;
            if failed {
                stats.errors += 1;
            }
        }
        self.metrics.record_hook_execution(&registration.plugin, failed);

        match outcome {
            HookOutcome::Success => registration.consecutive_faults.store(0, Ordering::Relaxed),
            HookOutcome::Fault(message) => {
                let err = PluginError::hook_failed(&registration.plugin, hook.as_str(), message);
                error!("{}", err);
                self.metrics.record_error(&registration.plugin, &err.to_string());

                let faults = registration.consecutive_faults.fetch_add(1, Ordering::Relaxed) + 1;
                if self.fault_threshold > 0 && faults >= self.fault_threshold {
                    registration.disabled.store(true, Ordering::Relaxed);
                    warn!(
                        "Disabled {} hook {} of plugin '{}' after {} consecutive faults",
                        hook, registration.id, registration.plugin, faults
                    );
                }
            }
        }
    }

    /// Re-enable a registration disabled by the fault threshold
    pub fn enable(&self, id: HookId) -> PluginResult<()> {
        let hooks = self.hooks.read();
        let registration = hooks
            .values()
            .find_map(|queue| queue.find(|r| r.id == id))
            .ok_or_else(|| PluginError::invalid_hook(format!("No hook registered with id {}", id.0)))?;
        registration.consecutive_faults.store(0, Ordering::Relaxed);
        registration.disabled.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Registrations for one hook type in dispatch order
    pub fn registrations(&self, hook: HookType) -> Vec<HookInfo> {
        let hooks = self.hooks.read();
        hooks
            .get(&hook)
            .map(|queue| {
                queue
                    .iter()
                    .map(|(priority, r)| HookInfo {
                        id: r.id,
                        plugin: r.plugin.clone(),
                        hook,
                        priority: *priority,
                        disabled: r.disabled.load(Ordering::Relaxed),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn registration_count(&self) -> usize {
        self.hooks.read().values().map(|queue| queue.len()).sum()
    }

    /// Per-hook statistics for one plugin
    pub fn stats_for(&self, plugin: &str) -> BTreeMap<HookType, HookStats> {
        self.stats
            .iter()
            .filter(|entry| entry.key().0 == plugin)
            .map(|entry| (entry.key().1, entry.value().clone()))
            .collect()
    }

    /// Statistics for every (plugin, hook type) pair that has run
    pub fn all_stats(&self) -> BTreeMap<(String, HookType), HookStats> {
        self.stats.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }
}

impl std::fmt::Debug for HookSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSystem")
            .field("registrations", &self.registration_count())
            .field("fault_threshold", &self.fault_threshold)
            .finish()
    }
}

fn invoke(handler: &HookHandler, ctx: &mut HookContext) -> HookOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(ctx))) {
        Ok(Ok(())) => HookOutcome::Success,
        Ok(Err(err)) => HookOutcome::Fault(err.to_string()),
        Err(payload) => HookOutcome::Fault(format!("panic: {}", panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A plugin's view of the hook system; every registration is owned by that plugin
#[derive(Clone)]
pub struct PluginHooks {
    plugin: String,
    system: Arc<HookSystem>,
}

impl PluginHooks {
    pub fn new(plugin: &str, system: Arc<HookSystem>) -> Self {
        Self { plugin: plugin.to_string(), system }
    }

    pub fn register<F>(&self, hook: HookType, priority: i32, handler: F) -> PluginResult<HookId>
    where
        F: Fn(&mut HookContext) -> PluginResult<()> + Send + Sync + 'static,
    {
        self.system.register(&self.plugin, hook, priority, handler)
    }

    pub fn register_named<F>(&self, hook: &str, priority: i32, handler: F) -> PluginResult<HookId>
    where
        F: Fn(&mut HookContext) -> PluginResult<()> + Send + Sync + 'static,
    {
        self.system.register_named(&self.plugin, hook, priority, handler)
    }

    /// Remove one of this plugin's own registrations
    pub fn unregister(&self, id: HookId) -> PluginResult<()> {
        let owned = HookType::ALL
            .iter()
            .any(|hook| self.system.registrations(*hook).iter().any(|r| r.id == id && r.plugin == self.plugin));
        if !owned {
            return Err(PluginError::invalid_hook(format!(
                "Plugin '{}' has no hook registered with id {}",
                self.plugin, id.0
            )));
        }
        self.system.unregister(id)
    }
}

impl std::fmt::Debug for PluginHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHooks").field("plugin", &self.plugin).finish()
    }
}
