//! Plugin Health and Metrics Snapshots
//!
//! Read-only views assembled by the manager from plugin records, the hook
//! system statistics, the service registry call counts and the mediator's
//! violation counters, plus Prometheus text exposition of the same data.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::metrics::CounterSnapshot;
use super::traits::PluginState;
use crate::hooks::HookStats;

/// Health of one plugin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginHealth {
    pub name: String,
    pub version: String,
    pub state: PluginState,
    pub healthy: bool,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub security_violations: u64,
}

impl PluginHealth {
    pub fn new(name: &str, version: &str, state: PluginState, counters: &CounterSnapshot) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            state,
            healthy: state != PluginState::Failed,
            error_count: counters.error_count,
            last_error: counters.last_error.clone(),
            last_error_at: counters.last_error_at,
            security_violations: counters.security_violations,
        }
    }
}

/// Metrics for one plugin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginMetrics {
    pub name: String,
    pub state: PluginState,
    pub counters: CounterSnapshot,
    /// Keyed by hook type name
    pub hooks: BTreeMap<String, HookStats>,
}

/// Render plugin metrics in Prometheus text exposition format
pub fn render_prometheus(metrics: &[PluginMetrics]) -> String {
    let mut out = String::new();

    family(&mut out, "plughost_plugins", "gauge", "Number of plugins known to the host.");
    let _ = writeln!(out, "plughost_plugins {}", metrics.len());

    family(&mut out, "plughost_plugin_state", "gauge",
        "Plugin lifecycle state (0 discovered .. 4 running, 5 stopped, 6 failed).");
    for m in metrics {
        let _ = writeln!(out, "plughost_plugin_state{{plugin=\"{}\"}} {}", m.name, m.state.metric_value());
    }

    let counters: [(&str, &str, fn(&CounterSnapshot) -> u64); 6] = [
        ("plughost_plugin_events_published_total", "Events published by the plugin.", |c| c.events_published),
        ("plughost_plugin_events_received_total", "Events delivered to the plugin.", |c| c.events_received),
        ("plughost_plugin_service_calls_total", "Imports of services exported by the plugin.", |c| c.service_calls),
        ("plughost_plugin_security_violations_total", "Denied capability accesses by the plugin.", |c| {
            c.security_violations
        }),
        ("plughost_plugin_errors_total", "Errors recorded against the plugin.", |c| c.error_count),
        ("plughost_plugin_hook_executions_total", "Hook handler invocations by the plugin.", |c| c.hook_executions),
    ];
    for (name, help, value) in counters {
        family(&mut out, name, "counter", help);
        for m in metrics {
            let _ = writeln!(out, "{}{{plugin=\"{}\"}} {}", name, m.name, value(&m.counters));
        }
    }

    family(&mut out, "plughost_hook_executions_total", "counter", "Hook handler invocations by hook type.");
    for_each_hook(metrics, |plugin, hook, stats| {
        let _ = writeln!(
            out,
            "plughost_hook_executions_total{{plugin=\"{}\",hook=\"{}\"}} {}",
            plugin, hook, stats.executions
        );
    });

    let mut errors = String::new();
    let mut durations = String::new();
    for_each_hook(metrics, |plugin, hook, stats| {
        let _ = writeln!(errors, "plughost_hook_errors_total{{plugin=\"{}\",hook=\"{}\"}} {}", plugin, hook, stats.errors);
        let _ = writeln!(
            durations,
            "plughost_hook_duration_seconds_total{{plugin=\"{}\",hook=\"{}\"}} {:.6}",
            plugin,
            hook,
            stats.total_duration.as_secs_f64()
        );
    });
    family(&mut out, "plughost_hook_errors_total", "counter", "Hook handler faults by hook type.");
    out.push_str(&errors);
    family(&mut out, "plughost_hook_duration_seconds_total", "counter", "Cumulative hook handler time.");
    out.push_str(&durations);

    out
}

fn family(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

fn for_each_hook(metrics: &[PluginMetrics], mut visit: impl FnMut(&str, &str, &HookStats)) {
    for m in metrics {
        for (hook, stats) in &m.hooks {
            visit(&m.name, hook, stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample() -> PluginMetrics {
        let mut hooks = BTreeMap::new();
        hooks.insert(
            "startup".to_string(),
            HookStats { executions: 3, errors: 1, total_duration: Duration::from_millis(1500) },
        );
        PluginMetrics {
            name: "blog".to_string(),
            state: PluginState::Running,
            counters: CounterSnapshot { service_calls: 4, security_violations: 2, ..Default::default() },
            hooks,
        }
    }

    #[test]
    fn test_prometheus_format() {
        let output = render_prometheus(&[sample()]);
        assert!(output.contains("# TYPE plughost_plugin_state gauge"));
        assert!(output.contains("plughost_plugins 1"));
        assert!(output.contains("plughost_plugin_state{plugin=\"blog\"} 4"));
        assert!(output.contains("plughost_plugin_service_calls_total{plugin=\"blog\"} 4"));
        assert!(output.contains("plughost_plugin_security_violations_total{plugin=\"blog\"} 2"));
        assert!(output.contains("plughost_hook_executions_total{plugin=\"blog\",hook=\"startup\"} 3"));
        assert!(output.contains("plughost_hook_errors_total{plugin=\"blog\",hook=\"startup\"} 1"));
        assert!(output.contains("plughost_hook_duration_seconds_total{plugin=\"blog\",hook=\"startup\"} 1.500000"));
    }

    #[test]
    fn test_health_reflects_failure() {
        let counters = CounterSnapshot { error_count: 1, last_error: Some("boom".into()), ..Default::default() };
        let health = PluginHealth::new("blog", "1.0.0", PluginState::Failed, &counters);
        assert!(!health.healthy);
        assert_eq!(health.last_error.as_deref(), Some("boom"));

        let health = PluginHealth::new("blog", "1.0.0", PluginState::Running, &CounterSnapshot::default());
        assert!(health.healthy);
    }
}
