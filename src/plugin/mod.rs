//! Plugin System Module
//!
//! Manifests, dependency resolution, discovery and the lifecycle manager that
//! ties the host subcomponents together.
//!
//! # Example Usage
//!
//! ```no_run
//! use plughost::config::PluginHostConfig;
//! use plughost::plugin::PluginManager;
//!
//! # async fn run() -> plughost::plugin::PluginResult<()> {
//! let manager = PluginManager::new(PluginHostConfig::default())?;
//! // manager.register_plugin(Box::new(MyPlugin::new())).await?;
//! manager.startup().await?;
//! // ... serve requests ...
//! manager.stop_all().await;
//! # Ok(())
//! # }
//! ```

pub mod compatibility;
pub mod context;
pub mod discovery;
pub mod error;
pub mod health;
pub mod manager;
pub mod manifest;
pub mod metrics;
pub mod priority_queue;
pub mod registry;
pub mod resolver;
pub mod traits;

#[cfg(test)]
pub mod tests;

// Re-export core types for easier access
pub use compatibility::{is_valid_version, Version, VersionCompatibilityChecker, VersionConstraint};
pub use context::{HostHandles, PluginContext};
pub use discovery::{DiscoveredManifest, FileBasedDiscovery, PluginDiscovery};
pub use error::{PluginError, PluginFailure, PluginResult};
pub use health::{PluginHealth, PluginMetrics};
pub use manager::{PluginManager, PluginRecord, ShutdownReport};
pub use manifest::{ConfigField, ConfigFieldType, ManifestFormat, PluginDependency, PluginManifest, PluginPermissions};
pub use metrics::{CounterSnapshot, MetricsStore, SharedMetrics};
pub use registry::PluginRegistry;
pub use resolver::DependencyResolver;
pub use traits::{Plugin, PluginState};
