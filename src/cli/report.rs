//! Terminal rendering for the CLI commands

use colored::{ColoredString, Colorize};
use prettytable::{format, Cell, Row, Table};

use crate::plugin::discovery::DiscoveredManifest;
use crate::plugin::manifest::PluginManifest;
use crate::security::Capability;

/// Colour output with NO_COLOR and `--no-color` support
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(no_color_flag: bool) -> Self {
        let enabled = !no_color_flag && std::env::var_os("NO_COLOR").is_none();
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self { enabled: false }
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> ColoredString {
        if self.enabled {
            style(text)
        } else {
            text.normal()
        }
    }

    pub fn heading(&self, text: &str) -> ColoredString {
        self.paint(text, |t| t.bold())
    }

    pub fn success(&self, text: &str) -> ColoredString {
        self.paint(text, |t| t.green())
    }

    pub fn error(&self, text: &str) -> ColoredString {
        self.paint(text, |t| t.red().bold())
    }
}

/// Compact table with a header row, indented two spaces
pub fn format_compact_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.add_row(Row::new(headers.iter().map(|h| Cell::new(h)).collect()));
    for row in rows {
        table.add_row(Row::new(row.iter().map(|c| Cell::new(c)).collect()));
    }

    table.to_string().lines().map(|line| format!("  {}\n", line)).collect()
}

/// Granted capabilities as a comma list, `-` when none
pub fn permission_summary(manifest: &PluginManifest) -> String {
    let mut granted: Vec<&str> = Capability::ALL
        .iter()
        .filter(|c| manifest.permissions.allows(**c))
        .map(|c| c.as_str())
        .collect();
    if manifest.permissions.exec {
        granted.push("exec");
    }
    if granted.is_empty() {
        "-".to_string()
    } else {
        granted.join(",")
    }
}

fn dependency_summary(manifest: &PluginManifest) -> String {
    if manifest.dependencies.is_empty() {
        return "-".to_string();
    }
    manifest
        .dependencies
        .iter()
        .map(|d| {
            if d.optional {
                format!("{} {} (optional)", d.name, d.version)
            } else {
                format!("{} {}", d.name, d.version)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// One row per discovered plugin
pub fn manifest_table(discovered: &[DiscoveredManifest]) -> String {
    let rows: Vec<Vec<String>> = discovered
        .iter()
        .map(|d| {
            vec![
                d.manifest.name.clone(),
                d.manifest.version.clone(),
                d.manifest.framework.version.clone(),
                dependency_summary(&d.manifest),
                permission_summary(&d.manifest),
            ]
        })
        .collect();
    format_compact_table(&["Plugin", "Version", "Framework", "Dependencies", "Permissions"], &rows)
}

/// Numbered initialization order
pub fn order_listing(order: &[String], palette: &Palette) -> String {
    order
        .iter()
        .enumerate()
        .map(|(index, name)| format!("  {:>3}. {}\n", index + 1, palette.success(name)))
        .collect()
}

/// Detailed view of a single manifest
pub fn manifest_details(manifest: &PluginManifest, palette: &Palette) -> String {
    let mut out = format!(
        "{} {}\n  {}\n  by {}\n\n",
        palette.heading(&manifest.name),
        manifest.version,
        manifest.description,
        manifest.author
    );

    let permission_rows: Vec<Vec<String>> = Capability::ALL
        .iter()
        .map(|c| (c.as_str(), manifest.permissions.allows(*c)))
        .chain(std::iter::once(("exec", manifest.permissions.exec)))
        .map(|(name, granted)| vec![name.to_string(), if granted { "yes" } else { "no" }.to_string()])
        .collect();
    out.push_str(&format_compact_table(&["Capability", "Requested"], &permission_rows));

    out.push_str(&format!("\n  framework {}\n", manifest.framework.version));
    out.push_str(&format!("  dependencies: {}\n", dependency_summary(manifest)));

    if !manifest.config.is_empty() {
        let config_rows: Vec<Vec<String>> = manifest
            .config
            .iter()
            .map(|(field, definition)| {
                vec![
                    field.clone(),
                    format!("{:?}", definition.field_type).to_lowercase(),
                    definition.required.to_string(),
                    definition.default.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string()),
                ]
            })
            .collect();
        out.push('\n');
        out.push_str(&format_compact_table(&["Setting", "Type", "Required", "Default"], &config_rows));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::{PluginDependency, PluginPermissions};
    use std::path::PathBuf;

    fn sample() -> PluginManifest {
        PluginManifest::new("blog", "1.2.0", "Blog engine", "Jane")
            .with_dependency(PluginDependency::required("auth", "^2.0.0"))
            .with_dependency(PluginDependency::optional("search", "*"))
            .with_permissions(PluginPermissions::none().with(Capability::Database).with(Capability::Router))
    }

    #[test]
    fn test_manifest_table() {
        let table = manifest_table(&[DiscoveredManifest { manifest: sample(), path: PathBuf::from("blog/plugin.yaml") }]);
        assert!(table.contains("Plugin"));
        assert!(table.contains("auth ^2.0.0, search * (optional)"));
        assert!(table.contains("database,router"));
    }

    #[test]
    fn test_empty_table() {
        assert!(format_compact_table(&["Plugin"], &[]).is_empty());
        assert_eq!(permission_summary(&PluginManifest::new("x", "1.0.0", "d", "a")), "-");
    }

    #[test]
    fn test_order_listing_plain() {
        let listing = order_listing(&["auth".to_string(), "blog".to_string()], &Palette::plain());
        assert_eq!(listing, "    1. auth\n    2. blog\n");
    }

    #[test]
    fn test_manifest_details() {
        let details = manifest_details(&sample(), &Palette::plain());
        assert!(details.starts_with("blog 1.2.0"));
        assert!(details.contains("database"));
        assert!(details.contains("dependencies: auth ^2.0.0"));
    }
}
