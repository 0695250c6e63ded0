//! Hook Types and Dispatch Context

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::error::{PluginError, PluginResult};

/// The fixed set of extension points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookType {
    Startup,
    Shutdown,
    PreRequest,
    PostRequest,
    PreResponse,
    PostResponse,
    Error,
}

impl HookType {
    pub const ALL: [HookType; 7] = [
        HookType::Startup,
        HookType::Shutdown,
        HookType::PreRequest,
        HookType::PostRequest,
        HookType::PreResponse,
        HookType::PostResponse,
        HookType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::Startup => "startup",
            HookType::Shutdown => "shutdown",
            HookType::PreRequest => "pre-request",
            HookType::PostRequest => "post-request",
            HookType::PreResponse => "pre-response",
            HookType::PostResponse => "post-response",
            HookType::Error => "error",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookType {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookType::ALL
            .iter()
            .copied()
            .find(|hook| hook.as_str() == s)
            .ok_or_else(|| PluginError::invalid_hook(format!("Unknown hook type: '{}'", s)))
    }
}

/// Shared state for one dispatch
///
/// Handlers see the same scratch space in priority order. Calling
/// [`HookContext::skip`] stops the remaining handlers.
#[derive(Debug, Clone)]
pub struct HookContext {
    hook: HookType,
    values: HashMap<String, Value>,
    skipped: bool,
}

impl HookContext {
    pub fn new(hook: HookType) -> Self {
        Self { hook, values: HashMap::new(), skipped: false }
    }

    pub fn with_value<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn hook(&self) -> HookType {
        self.hook
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set<K: Into<String>>(&mut self, key: K, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Stop subsequent handlers in this dispatch
    pub fn skip(&mut self) {
        self.skipped = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Prepare the context for a new dispatch; values carry over, `skip` does not
    pub(crate) fn begin_dispatch(&mut self, hook: HookType) {
        self.hook = hook;
        self.skipped = false;
    }
}

/// A hook handler
pub type HookHandler = Arc<dyn Fn(&mut HookContext) -> PluginResult<()> + Send + Sync>;

/// Identifies a registration for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HookId(pub u64);

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

/// Result of one handler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Success,
    /// The handler returned an error or panicked
    Fault(String),
}

impl HookOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HookOutcome::Success)
    }
}

/// Per-handler entry in a dispatch report
#[derive(Debug, Clone)]
pub struct HandlerReport {
    pub id: HookId,
    pub plugin: String,
    pub priority: i32,
    pub outcome: HookOutcome,
    pub duration: Duration,
}

/// Everything that happened during one `execute_hooks` call
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub hook: HookType,
    pub handlers: Vec<HandlerReport>,
    /// A handler called `skip`
    pub skipped: bool,
}

impl DispatchReport {
    pub fn executed(&self) -> usize {
        self.handlers.len()
    }

    pub fn faults(&self) -> impl Iterator<Item = &HandlerReport> {
        self.handlers.iter().filter(|h| !h.outcome.is_success())
    }

    pub fn fault_count(&self) -> usize {
        self.faults().count()
    }

    /// Plugins whose handlers ran, in order
    pub fn plugins(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.plugin.as_str()).collect()
    }
}

/// Execution statistics for one (plugin, hook type) pair
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HookStats {
    pub executions: u64,
    pub errors: u64,
    pub total_duration: Duration,
}

impl HookStats {
    pub fn average_duration(&self) -> Duration {
        if self.executions == 0 {
            return Duration::ZERO;
        }
        self.total_duration / self.executions as u32
    }
}
