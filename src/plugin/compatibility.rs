//! Version Compatibility Checker
//!
//! Semantic versions and version constraints for framework compatibility and
//! inter-plugin dependencies, on top of the `semver` crate.

use std::fmt;

pub use semver::Version;
use semver::VersionReq;

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::manifest::PluginManifest;

/// Check whether a string is a well-formed semantic version
pub fn is_valid_version(version: &str) -> bool {
    Version::parse(version.trim()).is_ok()
}

/// A conjunction of comparators, e.g. `>=1.2.0, <2.0.0`
///
/// A bare version such as `1.2.0` is an exact match, not a caret range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    req: VersionReq,
}

impl VersionConstraint {
    /// Parse a constraint string; empty constraints and empty terms are rejected
    pub fn parse(constraint: &str) -> Option<Self> {
        let raw = constraint.trim();
        let mut terms = Vec::new();
        for term in raw.split(',') {
            let term = term.trim();
            if term.is_empty() {
                return None;
            }
            if term.starts_with(|c: char| c.is_ascii_digit()) {
                terms.push(format!("={}", term));
            } else {
                terms.push(term.to_string());
            }
        }

        let req = VersionReq::parse(&terms.join(", ")).ok()?;
        Some(Self { raw: raw.to_string(), req })
    }

    pub fn is_valid(constraint: &str) -> bool {
        Self::parse(constraint).is_some()
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Checker for framework and dependency version compatibility
pub struct VersionCompatibilityChecker {
    /// Version of the host framework
    framework_version: Version,
}

impl VersionCompatibilityChecker {
    /// Create a checker for the given framework version
    pub fn new(framework_version: &str) -> PluginResult<Self> {
        let framework_version = Version::parse(framework_version.trim()).map_err(|e| {
            PluginError::configuration_error(format!("Invalid framework version '{}': {}", framework_version, e))
        })?;
        Ok(Self { framework_version })
    }

    pub fn framework_version(&self) -> &Version {
        &self.framework_version
    }

    /// Check if version matches requirement
    pub fn version_matches(&self, requirement: &str, version: &str) -> bool {
        match (VersionConstraint::parse(requirement), Version::parse(version.trim())) {
            (Some(constraint), Ok(version)) => constraint.matches(&version),
            _ => false,
        }
    }

    /// Check if the host framework satisfies a requirement
    pub fn framework_matches(&self, requirement: &str) -> bool {
        VersionConstraint::parse(requirement).is_some_and(|c| c.matches(&self.framework_version))
    }

    /// Check a manifest's framework constraint against the host framework
    pub fn check_plugin_compatibility(&self, manifest: &PluginManifest) -> PluginResult<()> {
        let requirement = &manifest.framework.version;
        let constraint = VersionConstraint::parse(requirement).ok_or_else(|| {
            PluginError::manifest_invalid(format!(
                "Plugin '{}' has an invalid framework version constraint: {}",
                manifest.name, requirement
            ))
        })?;

        if !constraint.matches(&self.framework_version) {
            return Err(PluginError::version_incompatible(format!(
                "Plugin '{}' requires framework version {} but the host is {}",
                manifest.name, requirement, self.framework_version
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_validity() {
        assert!(is_valid_version("1.2.3"));
        assert!(is_valid_version("2.0.0-beta.1"));

        assert!(!is_valid_version("1"));
        assert!(!is_valid_version("1.2"));
        assert!(!is_valid_version("1.2.3.4"));
        assert!(!is_valid_version("01.02.3"));
        assert!(!is_valid_version("a.b.c"));
        assert!(!is_valid_version("1.2.3-"));
        assert!(!is_valid_version(""));
    }

    #[test]
    fn test_prerelease_ordering() {
        let release = Version::parse("1.0.0").unwrap();
        let pre = Version::parse("1.0.0-rc1").unwrap();
        assert!(pre < release);
        assert!(Version::parse("0.9.9").unwrap() < pre);
    }

    #[test]
    fn test_constraint_validity() {
        assert!(VersionConstraint::is_valid("*"));
        assert!(VersionConstraint::is_valid(">=1.0.0, <2.0.0"));
        assert!(VersionConstraint::is_valid("^1.2"));

        assert!(!VersionConstraint::is_valid(""));
        assert!(!VersionConstraint::is_valid("   "));
        assert!(!VersionConstraint::is_valid("1.0.0,"));
        assert!(!VersionConstraint::is_valid(",>=1.0.0"));
        assert!(!VersionConstraint::is_valid(">=banana"));
    }

    #[test]
    fn test_version_matching() {
        let checker = VersionCompatibilityChecker::new("1.4.0").unwrap();

        // Bare versions are exact
        assert!(checker.version_matches("1.0.0", "1.0.0"));
        assert!(!checker.version_matches("1.0.0", "1.0.1"));
        assert!(checker.version_matches("=1.0.0", "1.0.0"));

        // Wildcard
        assert!(checker.version_matches("*", "1.0.0"));
        assert!(!checker.version_matches("", "2.5.3"));

        // Caret
        assert!(checker.version_matches("^1.0.0", "1.9.9"));
        assert!(!checker.version_matches("^1.0.0", "2.0.0"));
        assert!(!checker.version_matches("^0.2.3", "0.3.0"));

        // Tilde
        assert!(checker.version_matches("~1.2.0", "1.2.5"));
        assert!(!checker.version_matches("~1.2.0", "1.3.0"));

        // Ranges
        assert!(checker.version_matches(">=1.0.0, <2.0.0", "1.5.0"));
        assert!(!checker.version_matches(">=1.0.0, <2.0.0", "2.0.0"));
        assert!(checker.version_matches(">0.9", "1.0.0"));
        assert!(checker.version_matches("<=1.0.0", "1.0.0"));

        // Garbage never matches
        assert!(!checker.version_matches(">=banana", "1.0.0"));
        assert!(!checker.version_matches("^1.0.0", "not-a-version"));
    }

    #[test]
    fn test_framework_matches() {
        let checker = VersionCompatibilityChecker::new("1.4.0").unwrap();
        assert!(checker.framework_matches("^1.0.0"));
        assert!(!checker.framework_matches(">=2.0.0"));
        assert!(!checker.framework_matches(""));
    }

    #[test]
    fn test_framework_compatibility() {
        let checker = VersionCompatibilityChecker::new("1.4.0").unwrap();
        let mut manifest = PluginManifest::new("blog", "1.0.0", "Blog engine", "Jane");

        manifest.framework.version = "^1.2.0".to_string();
        assert!(checker.check_plugin_compatibility(&manifest).is_ok());

        manifest.framework.version = ">=2.0.0".to_string();
        let err = checker.check_plugin_compatibility(&manifest).unwrap_err();
        assert!(matches!(err, PluginError::VersionIncompatible { .. }));

        manifest.framework.version = "~~nonsense".to_string();
        let err = checker.check_plugin_compatibility(&manifest).unwrap_err();
        assert!(matches!(err, PluginError::ManifestInvalid { .. }));

        manifest.framework.version = String::new();
        let err = checker.check_plugin_compatibility(&manifest).unwrap_err();
        assert!(matches!(err, PluginError::ManifestInvalid { .. }));
    }

    #[test]
    fn test_invalid_framework_version() {
        assert!(VersionCompatibilityChecker::new("latest").is_err());
        assert!(VersionCompatibilityChecker::new("1.0").is_err());
    }
}
