use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info};
use toml::Value;

use crate::plugin::compatibility::is_valid_version;

/// Configuration storage - section_name -> key -> value
pub type Configuration = HashMap<String, HashMap<String, String>>;

/// Default bound on retained audit entries
pub const DEFAULT_MAX_AUDIT_ENTRIES: usize = 10_000;

/// Configuration manager
pub struct ConfigManager {
    config: Configuration,
    config_file_path: Option<PathBuf>,
    selected_section: Option<String>,
}

impl ConfigManager {
    /// Create a new ConfigManager from a Configuration (primarily for testing)
    pub fn from_config(config: Configuration) -> Self {
        Self { config, config_file_path: None, selected_section: None }
    }

    /// Load configuration using discovery hierarchy
    pub fn load() -> Result<Self> {
        debug!("Starting configuration discovery");

        for path in discover_config_files() {
            debug!("Attempting to load config from: {}", path.display());
            if path.exists() {
                info!("Loading configuration from: {}", path.display());
                return Self::load_from_file(path);
            }
        }

        info!("No configuration file found, using empty configuration");
        Ok(Self::from_config(Configuration::new()))
    }

    /// Load configuration from explicit file path
    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        debug!("Loading configuration from file: {}", path.display());

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = parse_toml_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Successfully loaded configuration from: {}", path.display());
        Ok(Self { config, config_file_path: Some(path), selected_section: None })
    }

    pub fn config_file_path(&self) -> Option<&PathBuf> {
        self.config_file_path.as_ref()
    }

    /// Get value from configuration with section fallback
    pub fn get_value(&self, section: &str, key: &str) -> Option<&String> {
        // Priority: selected_section -> specified section -> base
        if let Some(selected) = &self.selected_section {
            if let Some(value) = self.config.get(selected).and_then(|s| s.get(key)) {
                return Some(value);
            }
        }

        if let Some(value) = self.config.get(section).and_then(|s| s.get(key)) {
            return Some(value);
        }

        self.config.get("base").and_then(|s| s.get(key))
    }

    /// Select a configuration section that overrides all others
    pub fn select_section(&mut self, section: String) {
        debug!("Selecting configuration section: {}", section);
        self.selected_section = Some(section);
    }

    /// Get boolean value with type conversion
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get_value(section, key) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(anyhow::anyhow!("Invalid boolean value for {}.{}: {}", section, key, value)),
            },
            None => Ok(None),
        }
    }

    /// Get an unsigned integer value
    pub fn get_usize(&self, section: &str, key: &str) -> Result<Option<usize>> {
        self.get_value(section, key)
            .map(|value| {
                value.parse::<usize>()
                    .with_context(|| format!("Invalid value for {}.{}: {}", section, key, value))
            })
            .transpose()
    }

    /// Get log level value with type conversion
    pub fn get_log_level(&self, section: &str, key: &str) -> Result<Option<log::LevelFilter>> {
        match self.get_value(section, key) {
            Some(value) => Ok(Some(crate::logging::parse_log_level(value)?)),
            None => Ok(None),
        }
    }

    /// Get path value with type conversion
    pub fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.get_value(section, key).map(PathBuf::from)
    }

    /// Get a comma-separated list
    pub fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get_value(section, key)
            .map(|value| {
                value.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Build the plugin host configuration from the `[plugins]` section
    pub fn get_plugin_host_config(&self) -> Result<PluginHostConfig> {
        let mut config = PluginHostConfig::default();

        if let Some(enabled) = self.get_bool("plugins", "enabled")? {
            config.enabled = enabled;
        }
        if let Some(directory) = self.get_path("plugins", "directory") {
            config.directory = directory;
        }
        if let Some(version) = self.get_value("plugins", "framework-version") {
            config.framework_version = version.clone();
        }
        config.excluded = self.get_list("plugins", "excluded");
        if let Some(max) = self.get_usize("plugins", "max-audit-entries")? {
            config.max_audit_entries = max;
        }
        if let Some(threshold) = self.get_usize("plugins", "hook-fault-threshold")? {
            config.hook_fault_threshold = u32::try_from(threshold)
                .with_context(|| format!("hook-fault-threshold out of range: {}", threshold))?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Plugin host settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginHostConfig {
    /// Plugin support on or off; when off, startup is a no-op
    pub enabled: bool,
    /// Directory scanned for plugin manifests
    pub directory: PathBuf,
    /// Version matched against each manifest's framework constraint
    pub framework_version: String,
    /// Plugin names skipped at discovery
    pub excluded: Vec<String>,
    /// Retained audit entries; zero keeps all
    pub max_audit_entries: usize,
    /// Consecutive faults before a hook registration is disabled; zero never disables
    pub hook_fault_threshold: u32,
}

impl Default for PluginHostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("./plugins"),
            framework_version: crate::version::framework_version().to_string(),
            excluded: Vec::new(),
            max_audit_entries: DEFAULT_MAX_AUDIT_ENTRIES,
            hook_fault_threshold: 0,
        }
    }
}

impl PluginHostConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_valid_version(&self.framework_version) {
            anyhow::bail!("Invalid framework-version: {}", self.framework_version);
        }
        Ok(())
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.iter().any(|excluded| excluded == name)
    }
}

/// Discover configuration files in order of precedence
fn discover_config_files() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. Environment variable $PLUGHOST_CONFIG
    if let Ok(env_path) = env::var("PLUGHOST_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    // 2. XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("plughost").join("config.toml"));
    }

    // 3. Home directory
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".plughost.toml"));
    }

    // 4. Project local
    paths.push(PathBuf::from("./.plughost.toml"));

    debug!("Config discovery paths: {:?}", paths);
    paths
}

/// Parse TOML content to string-based configuration
fn parse_toml_config(content: &str) -> Result<Configuration> {
    let toml_value: Value = content.parse()
        .context("Failed to parse TOML content")?;

    let mut config = Configuration::new();

    if let Value::Table(table) = toml_value {
        flatten_toml_table(&table, String::new(), &mut config);
    }

    debug!("Parsed configuration: {:?}", config);
    Ok(config)
}

/// Recursively flatten TOML tables into section.subsection format
fn flatten_toml_table(table: &toml::Table, prefix: String, config: &mut Configuration) {
    for (key, value) in table {
        let section_name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Table(subtable) if subtable.values().all(|v| !matches!(v, Value::Table(_))) => {
                // Leaf table: a configuration section
                let section_map = subtable
                    .iter()
                    .map(|(subkey, subvalue)| (subkey.clone(), toml_value_to_string(subvalue)))
                    .collect();
                config.insert(section_name, section_map);
            }
            Value::Table(subtable) => flatten_toml_table(subtable, section_name, config),
            _ => {
                // Top-level key outside any table
                config
                    .entry("base".to_string())
                    .or_default()
                    .insert(key.clone(), toml_value_to_string(value));
            }
        }
    }
}

/// Convert TOML Value to string representation; arrays become comma-separated lists
fn toml_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Array(items) => items.iter().map(toml_value_to_string).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
