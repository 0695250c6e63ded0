//! CLI module: argument parsing, command execution and terminal rendering

pub mod args;
pub mod report;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::config::PluginHostConfig;
use crate::plugin::compatibility::VersionCompatibilityChecker;
use crate::plugin::discovery::{DiscoveredManifest, FileBasedDiscovery, PluginDiscovery};
use crate::plugin::error::{PluginError, PluginFailure};
use crate::plugin::manifest::{ManifestFormat, PluginManifest};
use crate::plugin::resolver::DependencyResolver;

pub use args::{Args, Command};
use report::Palette;

/// Execute the parsed command, returning the text to print
pub async fn execute(command: &Command, host: &PluginHostConfig, palette: &Palette) -> Result<String> {
    match command {
        Command::Validate { directory } => {
            let discovered = load_checked(directory.as_deref(), host).await?;
            let mut out = report::manifest_table(&discovered);
            out.push_str(&format!(
                "\n{} {} plugin manifest(s) valid\n",
                palette.success("ok"),
                discovered.len()
            ));
            Ok(out)
        }
        Command::Order { directory } => {
            let discovered = load_checked(directory.as_deref(), host).await?;
            let order = resolve(&discovered, host)?;
            Ok(report::order_listing(&order, palette))
        }
        Command::Inspect { file, raw } => {
            let manifest = PluginManifest::from_path(file)
                .with_context(|| format!("Failed to load manifest {}", file.display()))?;
            match raw.as_deref().map(str::to_lowercase).as_deref() {
                Some("json") => Ok(manifest.to_json()?),
                Some(_) => Ok(manifest.to_yaml()?),
                None => Ok(report::manifest_details(&manifest, palette)),
            }
        }
    }
}

/// Discover manifests and check each against the host framework version
async fn load_checked(directory: Option<&Path>, host: &PluginHostConfig) -> Result<Vec<DiscoveredManifest>> {
    let directory: PathBuf = directory.map_or_else(|| host.directory.clone(), Path::to_path_buf);
    info!("Scanning plugin directory {}", directory.display());

    let discovery = FileBasedDiscovery::new(&directory)?;
    let discovered: Vec<DiscoveredManifest> = discovery
        .discover_plugins()
        .await?
        .into_iter()
        .filter(|d| !host.is_excluded(&d.manifest.name))
        .collect();

    let checker = VersionCompatibilityChecker::new(&host.framework_version)?;
    let failures: Vec<PluginFailure> = discovered
        .iter()
        .filter_map(|d| {
            checker
                .check_plugin_compatibility(&d.manifest)
                .err()
                .map(|e| PluginFailure::new(&d.manifest.name, e.to_string()))
        })
        .collect();
    if !failures.is_empty() {
        return Err(PluginError::startup_failed("discover", failures).into());
    }

    debug!("{} manifest(s) passed validation", discovered.len());
    Ok(discovered)
}

fn resolve(discovered: &[DiscoveredManifest], host: &PluginHostConfig) -> Result<Vec<String>> {
    let checker = VersionCompatibilityChecker::new(&host.framework_version)?;
    let manifests: Vec<&PluginManifest> = discovered.iter().map(|d| &d.manifest).collect();
    Ok(DependencyResolver::new(&checker).resolve(&manifests)?)
}

/// Whether a path names a manifest file the host understands
pub fn is_manifest_path(path: &Path) -> bool {
    ManifestFormat::from_path(path).is_some()
}
