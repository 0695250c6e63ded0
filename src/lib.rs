//! In-process plugin host
//!
//! Runs independently authored plugins as least-privilege principals:
//! manifests are validated and ordered by dependency, each plugin gets a
//! mediated context whose capabilities are checked and audited, and plugins
//! cooperate through hooks, a service registry and an event bus.

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod events;
pub mod hooks;
pub mod logging;
pub mod plugin;
pub mod security;
pub mod services;
pub mod version;

pub use plugin::{Plugin, PluginContext, PluginError, PluginManager, PluginResult, PluginState};
