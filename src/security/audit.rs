//! Security Audit Log
//!
//! Every denied capability access lands here as a [`SecurityViolation`]. The
//! entry list is bounded; the per-plugin violation counters in the metrics
//! store are not.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use log::warn;
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::plugin::metrics::SharedMetrics;

/// Log target for security violations
pub const SECURITY_TARGET: &str = "plughost::security";

/// One audited denial
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityViolation {
    pub id: Uuid,
    pub plugin: String,
    pub capability: String,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, append-only record of security violations
#[derive(Debug)]
pub struct AuditLog {
    entries: RwLock<VecDeque<SecurityViolation>>,
    /// Zero keeps every entry
    max_entries: usize,
    metrics: SharedMetrics,
}

impl AuditLog {
    pub fn new(max_entries: usize, metrics: SharedMetrics) -> Self {
        Self { entries: RwLock::new(VecDeque::new()), max_entries, metrics }
    }

    /// Record a denial and count it against the plugin
    pub fn record(&self, plugin: &str, capability: &str, operation: &str) -> SecurityViolation {
        let violation = SecurityViolation {
            id: Uuid::new_v4(),
            plugin: plugin.to_string(),
            capability: capability.to_string(),
            operation: operation.to_string(),
            timestamp: Utc::now(),
        };

        warn!(
            target: SECURITY_TARGET,
            "Security violation: plugin '{}' attempted {}.{} without permission",
            plugin, capability, operation
        );
        self.metrics.record_security_violation(plugin);

        let mut entries = self.entries.write();
        if self.max_entries > 0 && entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(violation.clone());
        violation
    }

    /// All retained entries, oldest first
    pub fn entries(&self) -> Vec<SecurityViolation> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn entries_for(&self, plugin: &str) -> Vec<SecurityViolation> {
        self.entries.read().iter().filter(|v| v.plugin == plugin).cloned().collect()
    }

    /// Lifetime violation count for a plugin, unaffected by the entry bound
    pub fn violation_count(&self, plugin: &str) -> u64 {
        self.metrics.security_violations(plugin)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::metrics::MetricsStore;

    #[test]
    fn test_record_names_plugin_and_capability() {
        let log = AuditLog::new(10, MetricsStore::shared());
        let violation = log.record("blog", "database", "query");
        assert_eq!(violation.plugin, "blog");
        assert_eq!(violation.capability, "database");
        assert_eq!(violation.operation, "query");
        assert_eq!(log.entries(), vec![violation]);
        assert_eq!(log.violation_count("blog"), 1);
        assert_eq!(log.violation_count("other"), 0);
    }

    #[test]
    fn test_bound_drops_oldest_but_counts_everything() {
        let log = AuditLog::new(2, MetricsStore::shared());
        log.record("a", "cache", "get");
        log.record("b", "cache", "set");
        log.record("a", "network", "request");

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].plugin, "b");
        assert_eq!(entries[1].capability, "network");
        assert_eq!(log.entries_for("a").len(), 1);
        assert_eq!(log.violation_count("a"), 2);
    }

    #[test]
    fn test_zero_bound_keeps_everything() {
        let log = AuditLog::new(0, MetricsStore::shared());
        for _ in 0..50 {
            log.record("a", "router", "add_route");
        }
        assert_eq!(log.len(), 50);
    }
}
