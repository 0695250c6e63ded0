//! Plugin Counter Store
//!
//! Per-plugin counters that the hook system, event bus, service registry and
//! mediator report into. Health and metrics snapshots are read from here.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

/// Live counters for one plugin
#[derive(Debug, Default)]
pub struct PluginCounters {
    hook_executions: AtomicU64,
    hook_errors: AtomicU64,
    events_published: AtomicU64,
    events_received: AtomicU64,
    service_calls: AtomicU64,
    security_violations: AtomicU64,
    error_count: AtomicU64,
    last_error: Mutex<Option<(String, DateTime<Utc>)>>,
    custom: DashMap<String, f64>,
}

/// Point-in-time copy of a plugin's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CounterSnapshot {
    pub hook_executions: u64,
    pub hook_errors: u64,
    pub events_published: u64,
    pub events_received: u64,
    pub service_calls: u64,
    pub security_violations: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub custom: BTreeMap<String, f64>,
}

impl PluginCounters {
    fn snapshot(&self) -> CounterSnapshot {
        let last_error = self.last_error.lock().clone();
        CounterSnapshot {
            hook_executions: self.hook_executions.load(Ordering::Relaxed),
            hook_errors: self.hook_errors.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            service_calls: self.service_calls.load(Ordering::Relaxed),
            security_violations: self.security_violations.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            last_error_at: last_error.as_ref().map(|(_, at)| *at),
            last_error: last_error.map(|(message, _)| message),
            custom: self.custom.iter().map(|e| (e.key().clone(), *e.value())).collect(),
        }
    }
}

/// Shared store of per-plugin counters
#[derive(Debug, Default)]
pub struct MetricsStore {
    plugins: DashMap<String, Arc<PluginCounters>>,
}

pub type SharedMetrics = Arc<MetricsStore>;

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedMetrics {
        Arc::new(Self::new())
    }

    fn counters(&self, plugin: &str) -> Arc<PluginCounters> {
        if let Some(existing) = self.plugins.get(plugin) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.plugins.entry(plugin.to_string()).or_default().value())
    }

    pub fn record_hook_execution(&self, plugin: &str, failed: bool) {
        let counters = self.counters(plugin);
        counters.hook_executions.fetch_add(1, Ordering::Relaxed);
        if failed {
            counters.hook_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_event_published(&self, plugin: &str) {
        self.counters(plugin).events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_received(&self, plugin: &str) {
        self.counters(plugin).events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_service_call(&self, owner: &str) {
        self.counters(owner).service_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_security_violation(&self, plugin: &str) {
        self.counters(plugin).security_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an error against the plugin and remember it as the latest
    pub fn record_error(&self, plugin: &str, message: &str) {
        let counters = self.counters(plugin);
        counters.error_count.fetch_add(1, Ordering::Relaxed);
        *counters.last_error.lock() = Some((message.to_string(), Utc::now()));
    }

    pub fn set_custom(&self, plugin: &str, name: &str, value: f64) {
        self.counters(plugin).custom.insert(name.to_string(), value);
    }

    pub fn add_custom(&self, plugin: &str, name: &str, delta: f64) {
        *self.counters(plugin).custom.entry(name.to_string()).or_insert(0.0) += delta;
    }

    pub fn security_violations(&self, plugin: &str) -> u64 {
        self.plugins
            .get(plugin)
            .map(|c| c.security_violations.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Snapshot one plugin; unknown plugins read as all zeroes
    pub fn snapshot(&self, plugin: &str) -> CounterSnapshot {
        self.plugins.get(plugin).map(|c| c.snapshot()).unwrap_or_default()
    }

    /// Snapshot every plugin that has reported anything
    pub fn snapshot_all(&self) -> BTreeMap<String, CounterSnapshot> {
        self.plugins.iter().map(|e| (e.key().clone(), e.value().snapshot())).collect()
    }

    pub fn remove(&self, plugin: &str) {
        self.plugins.remove(plugin);
    }
}
