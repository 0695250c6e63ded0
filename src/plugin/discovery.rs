//! Plugin Discovery
//!
//! File-based discovery of plugin manifests. Each plugin lives in its own
//! directory with a `plugin.yaml`, `plugin.yml` or `plugin.json` manifest.
//! Discovery is all-or-nothing: one unreadable or invalid manifest fails the
//! whole batch.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use tokio::fs;

use super::error::{PluginError, PluginResult};
use super::manifest::{ManifestFormat, PluginManifest};

/// Manifest file names recognised by discovery
pub const MANIFEST_FILE_NAMES: [&str; 3] = ["plugin.yaml", "plugin.yml", "plugin.json"];

/// A validated manifest and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredManifest {
    pub manifest: PluginManifest,
    pub path: PathBuf,
}

/// Source of plugin manifests
#[async_trait]
pub trait PluginDiscovery: Send + Sync {
    /// Discover every manifest, failing if any one is invalid
    async fn discover_plugins(&self) -> PluginResult<Vec<DiscoveredManifest>>;

    fn plugin_directory(&self) -> &Path;
}

/// Discovery over a plugin directory tree
#[derive(Debug, Clone)]
pub struct FileBasedDiscovery {
    plugin_directory: PathBuf,
}

impl FileBasedDiscovery {
    pub fn new<P: AsRef<Path>>(plugin_directory: P) -> PluginResult<Self> {
        let path = plugin_directory.as_ref().to_path_buf();
        if !path.exists() {
            return Err(PluginError::configuration_error(format!(
                "Plugin directory does not exist: {}",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(PluginError::configuration_error(format!(
                "Plugin path is not a directory: {}",
                path.display()
            )));
        }
        Ok(Self { plugin_directory: path })
    }

    fn is_manifest_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| MANIFEST_FILE_NAMES.contains(&name))
    }

    /// Walk the tree collecting manifest paths, sorted for determinism
    async fn scan_directory(&self, dir: &Path) -> PluginResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut directories_to_scan = vec![dir.to_path_buf()];

        while let Some(current_dir) = directories_to_scan.pop() {
            let mut entries = fs::read_dir(&current_dir).await.map_err(|e| {
                PluginError::generic(format!("Failed to read directory {}: {}", current_dir.display(), e))
            })?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| PluginError::generic(format!("Failed to read directory entry: {}", e)))?
            {
                let path = entry.path();
                if path.is_dir() {
                    directories_to_scan.push(path);
                } else if Self::is_manifest_file(&path) {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    async fn load_manifest(path: &Path) -> PluginResult<PluginManifest> {
        let format = ManifestFormat::from_path(path).ok_or_else(|| {
            PluginError::manifest_invalid(format!("Unsupported manifest format: {}", path.display()))
        })?;
        let content = fs::read_to_string(path).await.map_err(|e| {
            PluginError::manifest_invalid(format!("Failed to read {}: {}", path.display(), e))
        })?;
        PluginManifest::parse(&content, format).map_err(|e| match e {
            PluginError::ManifestInvalid { message } => {
                PluginError::manifest_invalid(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }
}

#[async_trait]
impl PluginDiscovery for FileBasedDiscovery {
    async fn discover_plugins(&self) -> PluginResult<Vec<DiscoveredManifest>> {
        let paths = self.scan_directory(&self.plugin_directory).await?;
        let mut discovered = Vec::with_capacity(paths.len());

        for path in paths {
            let manifest = Self::load_manifest(&path).await?;
            debug!("Discovered plugin '{}' v{} at {}", manifest.name, manifest.version, path.display());
            discovered.push(DiscoveredManifest { manifest, path });
        }

        info!(
            "Discovered {} plugin manifest(s) in {}",
            discovered.len(),
            self.plugin_directory.display()
        );
        Ok(discovered)
    }

    fn plugin_directory(&self) -> &Path {
        &self.plugin_directory
    }
}
