//! Core Plugin Traits
//!
//! The interface every plugin implements and the lifecycle states the manager
//! tracks for it.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::context::PluginContext;
use super::error::PluginResult;

/// Core plugin interface
///
/// Lifecycle calls are made strictly one at a time, in dependency order for
/// `initialize` and `start` and in reverse order for `stop`.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name matching the plugin's manifest
    fn name(&self) -> &str;

    /// Register services, hooks and subscriptions through the context
    async fn initialize(&mut self, context: &PluginContext) -> PluginResult<()>;

    async fn start(&mut self) -> PluginResult<()> {
        Ok(())
    }

    async fn stop(&mut self) -> PluginResult<()> {
        Ok(())
    }
}

/// Plugin lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Manifest found
    Discovered,
    /// Manifest validated and bound to an implementation
    Validated,
    /// `initialize` returned successfully
    Initialized,
    /// `start` returned successfully
    Started,
    /// Startup hooks have fired
    Running,
    Stopped,
    Failed,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Discovered => "discovered",
            PluginState::Validated => "validated",
            PluginState::Initialized => "initialized",
            PluginState::Started => "started",
            PluginState::Running => "running",
            PluginState::Stopped => "stopped",
            PluginState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PluginState::Stopped | PluginState::Failed)
    }

    /// Started or running
    pub fn is_active(&self) -> bool {
        matches!(self, PluginState::Started | PluginState::Running)
    }

    /// Check whether the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: PluginState) -> bool {
        use PluginState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Discovered, Validated)
            | (Validated, Initialized)
            | (Initialized, Started)
            | (Started, Running)
            | (Initialized, Stopped)
            | (Started, Stopped)
            | (Running, Stopped) => true,
            _ => false,
        }
    }

    /// Numeric value used in metrics exposition
    pub fn metric_value(&self) -> u8 {
        match self {
            PluginState::Discovered => 0,
            PluginState::Validated => 1,
            PluginState::Initialized => 2,
            PluginState::Started => 3,
            PluginState::Running => 4,
            PluginState::Stopped => 5,
            PluginState::Failed => 6,
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
