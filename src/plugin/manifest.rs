//! Plugin Manifest
//!
//! Declared plugin metadata (identity, dependencies, requested permissions,
//! config schema) parsed from YAML or JSON. Parsing is all-or-nothing: a
//! manifest that fails validation is never returned.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::plugin::compatibility::{is_valid_version, Version, VersionConstraint};
use crate::plugin::error::{PluginError, PluginResult};
use crate::security::{Capability, CapabilityFlags};

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static pattern"))
}

/// Check a plugin name against the identifier charset
pub fn is_valid_plugin_name(name: &str) -> bool {
    name_pattern().is_match(name)
}

/// Manifest serialisation format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
}

impl ManifestFormat {
    /// Pick a format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Some(ManifestFormat::Yaml),
            Some("json") => Some(ManifestFormat::Json),
            _ => None,
        }
    }
}

/// Framework version requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkRequirement {
    #[serde(default = "any_version")]
    pub version: String,
}

fn any_version() -> String {
    "*".to_string()
}

impl Default for FrameworkRequirement {
    fn default() -> Self {
        Self { version: any_version() }
    }
}

/// Plugin dependency specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependency {
    /// Dependency name
    #[serde(default)]
    pub name: String,

    /// Version constraint the dependency must satisfy
    #[serde(default)]
    pub version: String,

    /// Optional dependencies never block initialization
    #[serde(default)]
    pub optional: bool,

    /// Framework constraint for this edge; inherits the manifest's when absent
    #[serde(default, rename = "framework", skip_serializing_if = "Option::is_none")]
    pub framework_version: Option<String>,
}

impl PluginDependency {
    pub fn required<N: Into<String>, V: Into<String>>(name: N, version: V) -> Self {
        Self { name: name.into(), version: version.into(), optional: false, framework_version: None }
    }

    pub fn optional<N: Into<String>, V: Into<String>>(name: N, version: V) -> Self {
        Self { optional: true, ..Self::required(name, version) }
    }

    /// The framework constraint that applies to this edge
    pub fn framework_constraint<'a>(&'a self, manifest: &'a PluginManifest) -> &'a str {
        self.framework_version.as_deref().unwrap_or(&manifest.framework.version)
    }
}

/// Declared permission intent; enforcement happens in the mediator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginPermissions {
    pub database: bool,
    pub cache: bool,
    pub config: bool,
    pub router: bool,
    pub filesystem: bool,
    pub network: bool,
    pub exec: bool,
}

impl PluginPermissions {
    /// No capabilities at all
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether the manifest requests a gated capability
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Database => self.database,
            Capability::Cache => self.cache,
            Capability::Config => self.config,
            Capability::Router => self.router,
            Capability::Filesystem => self.filesystem,
            Capability::Network => self.network,
        }
    }

    /// Builder-style grant of one capability
    pub fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Database => self.database = true,
            Capability::Cache => self.cache = true,
            Capability::Config => self.config = true,
            Capability::Router => self.router = true,
            Capability::Filesystem => self.filesystem = true,
            Capability::Network => self.network = true,
        }
        self
    }

    /// Convert to the mediator's flag representation
    pub fn to_flags(&self) -> CapabilityFlags {
        let mut flags = Capability::ALL
            .iter()
            .filter(|c| self.allows(**c))
            .fold(CapabilityFlags::empty(), |acc, c| acc | c.flag());
        if self.exec {
            flags |= CapabilityFlags::EXEC;
        }
        flags
    }
}

/// Type of a config schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFieldType {
    String,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "number")]
    Float,
    #[serde(alias = "bool")]
    Boolean,
    Array,
    Object,
}

impl ConfigFieldType {
    /// Whether a JSON value is acceptable for this field type
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (ConfigFieldType::String, Value::String(_)) => true,
            (ConfigFieldType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ConfigFieldType::Float, Value::Number(_)) => true,
            (ConfigFieldType::Boolean, Value::Bool(_)) => true,
            (ConfigFieldType::Array, Value::Array(_)) => true,
            (ConfigFieldType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

/// One field of a plugin's config schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    #[serde(rename = "type")]
    pub field_type: ConfigFieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: String,
}

/// Immutable plugin metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name (unique identifier)
    #[serde(default)]
    pub name: String,

    /// Plugin version
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub framework: FrameworkRequirement,

    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,

    #[serde(default)]
    pub permissions: PluginPermissions,

    #[serde(default)]
    pub config: BTreeMap<String, ConfigField>,
}

impl PluginManifest {
    /// Build a minimal manifest in code
    pub fn new<N, V, D, A>(name: N, version: V, description: D, author: A) -> Self
    where
        N: Into<String>,
        V: Into<String>,
        D: Into<String>,
        A: Into<String>,
    {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            author: author.into(),
            framework: FrameworkRequirement::default(),
            dependencies: Vec::new(),
            permissions: PluginPermissions::default(),
            config: BTreeMap::new(),
        }
    }

    pub fn with_dependency(mut self, dependency: PluginDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_permissions(mut self, permissions: PluginPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_framework(mut self, constraint: &str) -> Self {
        self.framework.version = constraint.to_string();
        self
    }

    /// Parse and validate a YAML manifest
    pub fn from_yaml(content: &str) -> PluginResult<Self> {
        let manifest: PluginManifest = serde_yaml::from_str(content)
            .map_err(|e| PluginError::manifest_invalid(format!("Failed to parse YAML: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate a JSON manifest
    pub fn from_json(content: &str) -> PluginResult<Self> {
        let manifest: PluginManifest = serde_json::from_str(content)
            .map_err(|e| PluginError::manifest_invalid(format!("Failed to parse JSON: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse content in the given format
    pub fn parse(content: &str, format: ManifestFormat) -> PluginResult<Self> {
        match format {
            ManifestFormat::Yaml => Self::from_yaml(content),
            ManifestFormat::Json => Self::from_json(content),
        }
    }

    /// Read and parse a manifest file, choosing the format by extension
    pub fn from_path(path: &Path) -> PluginResult<Self> {
        let format = ManifestFormat::from_path(path).ok_or_else(|| {
            PluginError::manifest_invalid(format!("Unsupported manifest file: {}", path.display()))
        })?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            PluginError::manifest_invalid(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content, format).map_err(|e| match e {
            PluginError::ManifestInvalid { message } => {
                PluginError::manifest_invalid(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    pub fn to_yaml(&self) -> PluginResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> PluginResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parsed version; only valid after `validate`
    pub fn semver(&self) -> Option<Version> {
        Version::parse(self.version.trim()).ok()
    }

    /// Names of required dependencies
    pub fn required_dependencies(&self) -> impl Iterator<Item = &PluginDependency> {
        self.dependencies.iter().filter(|d| !d.optional)
    }

    /// Validate the manifest for required fields and well-formed values
    pub fn validate(&self) -> PluginResult<()> {
        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("description", &self.description),
            ("author", &self.author),
        ] {
            if value.trim().is_empty() {
                return Err(PluginError::manifest_invalid(format!(
                    "Plugin manifest missing required field '{}'",
                    field
                )));
            }
        }

        if !is_valid_plugin_name(&self.name) {
            return Err(PluginError::manifest_invalid(format!(
                "Invalid plugin name '{}': only letters, digits, '_' and '-' are allowed",
                self.name
            )));
        }

        if !is_valid_version(&self.version) {
            return Err(PluginError::manifest_invalid(format!(
                "Plugin '{}' has invalid version format: {}",
                self.name, self.version
            )));
        }

        if !VersionConstraint::is_valid(&self.framework.version) {
            return Err(PluginError::manifest_invalid(format!(
                "Plugin '{}' has invalid framework version constraint: {}",
                self.name, self.framework.version
            )));
        }

        for (index, dep) in self.dependencies.iter().enumerate() {
            if dep.name.trim().is_empty() {
                return Err(PluginError::manifest_invalid(format!(
                    "Plugin '{}' dependency #{} has no name",
                    self.name, index + 1
                )));
            }
            if dep.version.trim().is_empty() {
                return Err(PluginError::manifest_invalid(format!(
                    "Plugin '{}' dependency '{}' has no version",
                    self.name, dep.name
                )));
            }
            if !VersionConstraint::is_valid(&dep.version) {
                return Err(PluginError::manifest_invalid(format!(
                    "Plugin '{}' dependency '{}' has invalid version constraint: {}",
                    self.name, dep.name, dep.version
                )));
            }
            if let Some(framework) = &dep.framework_version {
                if !VersionConstraint::is_valid(framework) {
                    return Err(PluginError::manifest_invalid(format!(
                        "Plugin '{}' dependency '{}' has invalid framework version constraint: {}",
                        self.name, dep.name, framework
                    )));
                }
            }
            if dep.name == self.name {
                return Err(PluginError::manifest_invalid(format!(
                    "Plugin '{}' cannot depend on itself",
                    self.name
                )));
            }
        }

        for (field, schema) in &self.config {
            if let Some(default) = &schema.default {
                if !schema.field_type.accepts(default) {
                    return Err(PluginError::manifest_invalid(format!(
                        "Plugin '{}' config field '{}' has a default that is not of type {:?}",
                        self.name, field, schema.field_type
                    )));
                }
            }
        }

        Ok(())
    }
}
