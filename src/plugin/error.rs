//! Plugin Error Types
//!
//! Error taxonomy for the plugin host. Startup-time errors (manifest, dependency,
//! lifecycle) abort the host when plugin support is enabled; runtime errors
//! (permission denials, hook faults) are recovered and logged.

use std::fmt;
use thiserror::Error;

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

/// A single plugin that failed during a startup phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFailure {
    pub plugin: String,
    pub message: String,
}

impl PluginFailure {
    pub fn new<P: Into<String>, M: Into<String>>(plugin: P, message: M) -> Self {
        Self { plugin: plugin.into(), message: message.into() }
    }
}

impl fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.plugin, self.message)
    }
}

fn join_failures(failures: &[PluginFailure]) -> String {
    failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ")
}

/// Error types for plugin host operations
#[derive(Error, Debug, Clone)]
pub enum PluginError {
    /// Malformed manifest or missing required field
    #[error("Invalid plugin manifest: {message}")]
    ManifestInvalid { message: String },

    /// Generic dependency problem (version mismatch, bad graph input)
    #[error("Plugin dependency error: {message}")]
    DependencyError { message: String },

    /// Required dependency absent from the discovered set
    #[error("Plugin '{plugin}' requires dependency '{dependency}' which is not available")]
    MissingDependency { plugin: String, dependency: String },

    /// Dependency cycle among the named plugins
    #[error("Circular dependency detected between plugins: {}", plugins.join(", "))]
    DependencyCycle { plugins: Vec<String> },

    /// Capability denied at call time
    #[error("Permission denied: plugin '{plugin}' lacks the '{capability}' capability")]
    PermissionDenied { plugin: String, capability: String },

    /// Capability granted but the host has no collaborator for it
    #[error("Capability '{capability}' is not available on this host")]
    CapabilityUnavailable { capability: String },

    /// Hook handler fault (error or recovered panic)
    #[error("Hook '{hook}' of plugin '{plugin}' failed: {message}")]
    HookFailed { plugin: String, hook: String, message: String },

    /// Hook registration rejected
    #[error("Invalid hook registration: {message}")]
    InvalidHook { message: String },

    /// Init/Start/Stop failure
    #[error("Plugin '{plugin}' failed during {phase}: {message}")]
    LifecycleFailed { plugin: String, phase: String, message: String },

    /// Aggregated startup failure naming every failing plugin
    #[error("Plugin startup failed during {phase}: {}", join_failures(failures))]
    StartupFailed { phase: String, failures: Vec<PluginFailure> },

    /// Service name already exported by this owner
    #[error("Service '{name}' is already exported by plugin '{owner}'")]
    ServiceAlreadyExported { owner: String, name: String },

    /// No such service for this owner
    #[error("Service '{name}' not found for plugin '{owner}'")]
    ServiceNotFound { owner: String, name: String },

    /// Imported service does not have the expected shape
    #[error("Service '{name}' of plugin '{owner}' is not a {expected}")]
    ServiceTypeMismatch { owner: String, name: String, expected: String },

    /// Plugin not found
    #[error("Plugin not found: {plugin_name}")]
    PluginNotFound { plugin_name: String },

    /// Plugin already registered
    #[error("Plugin already registered: {plugin_name}")]
    PluginAlreadyRegistered { plugin_name: String },

    /// Framework version constraint not satisfied
    #[error("Version compatibility error: {message}")]
    VersionIncompatible { message: String },

    /// Configuration error
    #[error("Plugin configuration error: {message}")]
    ConfigurationError { message: String },

    /// Operation not valid in the plugin's current state
    #[error("Invalid plugin state: {message}")]
    InvalidState { message: String },

    /// Generic plugin error
    #[error("Plugin error: {message}")]
    Generic { message: String },
}

impl PluginError {
    /// Create a manifest error
    pub fn manifest_invalid<S: Into<String>>(message: S) -> Self {
        Self::ManifestInvalid { message: message.into() }
    }

    /// Create a dependency error
    pub fn dependency_error<S: Into<String>>(message: S) -> Self {
        Self::DependencyError { message: message.into() }
    }

    /// Create a missing dependency error
    pub fn missing_dependency<P: Into<String>, D: Into<String>>(plugin: P, dependency: D) -> Self {
        Self::MissingDependency { plugin: plugin.into(), dependency: dependency.into() }
    }

    /// Create a dependency cycle error
    pub fn dependency_cycle(plugins: Vec<String>) -> Self {
        Self::DependencyCycle { plugins }
    }

    /// Create a permission denied error
    pub fn permission_denied<P: Into<String>, C: Into<String>>(plugin: P, capability: C) -> Self {
        Self::PermissionDenied { plugin: plugin.into(), capability: capability.into() }
    }

    /// Create a capability unavailable error
    pub fn capability_unavailable<S: Into<String>>(capability: S) -> Self {
        Self::CapabilityUnavailable { capability: capability.into() }
    }

    /// Create a hook failure
    pub fn hook_failed<P: Into<String>, H: Into<String>, M: Into<String>>(plugin: P, hook: H, message: M) -> Self {
        Self::HookFailed { plugin: plugin.into(), hook: hook.into(), message: message.into() }
    }

    /// Create an invalid hook registration error
    pub fn invalid_hook<S: Into<String>>(message: S) -> Self {
        Self::InvalidHook { message: message.into() }
    }

    /// Create a lifecycle failure
    pub fn lifecycle_failed<P: Into<String>, S: Into<String>, M: Into<String>>(plugin: P, phase: S, message: M) -> Self {
        Self::LifecycleFailed { plugin: plugin.into(), phase: phase.into(), message: message.into() }
    }

    /// Create an aggregated startup error
    pub fn startup_failed<S: Into<String>>(phase: S, failures: Vec<PluginFailure>) -> Self {
        Self::StartupFailed { phase: phase.into(), failures }
    }

    /// Create a duplicate service error
    pub fn service_already_exported<O: Into<String>, N: Into<String>>(owner: O, name: N) -> Self {
        Self::ServiceAlreadyExported { owner: owner.into(), name: name.into() }
    }

    /// Create a service not found error
    pub fn service_not_found<O: Into<String>, N: Into<String>>(owner: O, name: N) -> Self {
        Self::ServiceNotFound { owner: owner.into(), name: name.into() }
    }

    /// Create a service type mismatch error
    pub fn service_type_mismatch<O: Into<String>, N: Into<String>, E: Into<String>>(owner: O, name: N, expected: E) -> Self {
        Self::ServiceTypeMismatch { owner: owner.into(), name: name.into(), expected: expected.into() }
    }

    /// Create a plugin not found error
    pub fn plugin_not_found<S: Into<String>>(plugin_name: S) -> Self {
        Self::PluginNotFound { plugin_name: plugin_name.into() }
    }

    /// Create a plugin already registered error
    pub fn plugin_already_registered<S: Into<String>>(plugin_name: S) -> Self {
        Self::PluginAlreadyRegistered { plugin_name: plugin_name.into() }
    }

    /// Create a version incompatible error
    pub fn version_incompatible<S: Into<String>>(message: S) -> Self {
        Self::VersionIncompatible { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration_error<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Create a generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic { message: message.into() }
    }

    /// Errors raised while bringing plugins up; fatal to the host by policy
    pub fn is_startup_error(&self) -> bool {
        matches!(self,
            PluginError::ManifestInvalid { .. } |
            PluginError::DependencyError { .. } |
            PluginError::MissingDependency { .. } |
            PluginError::DependencyCycle { .. } |
            PluginError::VersionIncompatible { .. } |
            PluginError::LifecycleFailed { .. } |
            PluginError::StartupFailed { .. }
        )
    }

    /// Errors raised after start; recovered and logged, never fatal
    pub fn is_runtime_error(&self) -> bool {
        matches!(self,
            PluginError::PermissionDenied { .. } |
            PluginError::CapabilityUnavailable { .. } |
            PluginError::HookFailed { .. } |
            PluginError::ServiceNotFound { .. } |
            PluginError::ServiceTypeMismatch { .. }
        )
    }

    /// Check if error is a security violation
    pub fn is_security_error(&self) -> bool {
        matches!(self, PluginError::PermissionDenied { .. })
    }

    /// Names of the plugins implicated by this error, if any
    pub fn plugins(&self) -> Vec<String> {
        match self {
            PluginError::MissingDependency { plugin, .. } |
            PluginError::PermissionDenied { plugin, .. } |
            PluginError::HookFailed { plugin, .. } |
            PluginError::LifecycleFailed { plugin, .. } => vec![plugin.clone()],
            PluginError::DependencyCycle { plugins } => plugins.clone(),
            PluginError::StartupFailed { failures, .. } => {
                failures.iter().map(|f| f.plugin.clone()).collect()
            }
            PluginError::PluginNotFound { plugin_name } |
            PluginError::PluginAlreadyRegistered { plugin_name } => vec![plugin_name.clone()],
            _ => Vec::new(),
        }
    }
}

impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        PluginError::generic(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        PluginError::manifest_invalid(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for PluginError {
    fn from(err: serde_yaml::Error) -> Self {
        PluginError::manifest_invalid(format!("YAML error: {}", err))
    }
}
