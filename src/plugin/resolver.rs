//! Dependency Resolver
//!
//! Turns a set of manifests into a deterministic, acyclic initialization
//! order. Only required dependencies form edges; optional ones are advisory.
//! Any failure rejects the whole batch.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::plugin::compatibility::VersionCompatibilityChecker;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::manifest::PluginManifest;

/// Computes initialization order over a batch of manifests
pub struct DependencyResolver<'a> {
    checker: &'a VersionCompatibilityChecker,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(checker: &'a VersionCompatibilityChecker) -> Self {
        Self { checker }
    }

    /// Resolve the batch into a topological order; ties broken by name
    pub fn resolve(&self, manifests: &[&PluginManifest]) -> PluginResult<Vec<String>> {
        let mut by_name: BTreeMap<&str, &PluginManifest> = BTreeMap::new();
        for manifest in manifests {
            if by_name.insert(manifest.name.as_str(), *manifest).is_some() {
                return Err(PluginError::plugin_already_registered(&manifest.name));
            }
        }

        // dependency -> dependents, and dependent -> number of unresolved deps
        let mut dependents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut in_degree: BTreeMap<&str, usize> = by_name.keys().map(|name| (*name, 0)).collect();

        for (name, manifest) in &by_name {
            for dep in &manifest.dependencies {
                match by_name.get(dep.name.as_str()) {
                    Some(found) => {
                        let satisfied = self.checker.version_matches(&dep.version, &found.version);
                        let framework = dep.framework_constraint(manifest);
                        let framework_ok = self.checker.framework_matches(framework);
                        if dep.optional {
                            if !satisfied {
                                warn!(
                                    "Plugin '{}' optional dependency '{}' ({}) does not match version {}; ignoring",
                                    name, dep.name, dep.version, found.version
                                );
                            } else if !framework_ok {
                                warn!(
                                    "Plugin '{}' optional dependency '{}' needs framework {} but the host is {}; ignoring",
                                    name, dep.name, framework, self.checker.framework_version()
                                );
                            }
                            continue;
                        }
                        if !satisfied {
                            return Err(PluginError::dependency_error(format!(
                                "Plugin '{}' requires {} version {} but found version {}",
                                name, dep.name, dep.version, found.version
                            )));
                        }
                        if !framework_ok {
                            return Err(PluginError::dependency_error(format!(
                                "Plugin '{}' dependency '{}' requires framework version {} but the host is {}",
                                name, dep.name, framework, self.checker.framework_version()
                            )));
                        }
                        if dependents.entry(found.name.as_str()).or_default().insert(*name) {
                            *in_degree.entry(*name).or_default() += 1;
                        }
                    }
                    None if dep.optional => {
                        debug!("Plugin '{}' optional dependency '{}' not present", name, dep.name);
                    }
                    None => return Err(PluginError::missing_dependency(*name, &dep.name)),
                }
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(by_name.len());

        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            if let Some(children) = dependents.get(name) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(*child);
                        }
                    }
                }
            }
        }

        if order.len() != by_name.len() {
            let cyclic: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(name, _)| name.to_string())
                .collect();
            return Err(PluginError::dependency_cycle(cyclic));
        }

        debug!("Resolved plugin initialization order: {:?}", order);
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::PluginDependency;

    fn manifest(name: &str, deps: Vec<PluginDependency>) -> PluginManifest {
        let mut m = PluginManifest::new(name, "1.0.0", "test", "tester");
        m.dependencies = deps;
        m
    }

    fn resolve(manifests: &[PluginManifest]) -> PluginResult<Vec<String>> {
        let checker = VersionCompatibilityChecker::new("1.0.0").unwrap();
        let refs: Vec<&PluginManifest> = manifests.iter().collect();
        DependencyResolver::new(&checker).resolve(&refs)
    }

    #[test]
    fn test_independent_plugins_sorted_by_name() {
        let order = resolve(&[manifest("zeta", vec![]), manifest("alpha", vec![]), manifest("mid", vec![])]).unwrap();
        assert_eq!(order, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let order = resolve(&[
            manifest("app", vec![PluginDependency::required("db", "^1.0.0"), PluginDependency::required("auth", "*")]),
            manifest("auth", vec![PluginDependency::required("db", "1.0.0")]),
            manifest("db", vec![]),
            manifest("aaa", vec![]),
        ])
        .unwrap();
        assert_eq!(order, vec!["aaa", "db", "auth", "app"]);
    }

    #[test]
    fn test_optional_missing_dependency_is_ignored() {
        let order = resolve(&[
            manifest("plugin", vec![PluginDependency::required("dep1", "*"), PluginDependency::optional("dep2", "*")]),
            manifest("dep1", vec![]),
        ])
        .unwrap();
        assert_eq!(order, vec!["dep1", "plugin"]);
    }

    #[test]
    fn test_missing_required_dependency_names_it() {
        let err = resolve(&[manifest("plugin", vec![PluginDependency::required("ghost", "*")])]).unwrap_err();
        assert!(matches!(err, PluginError::MissingDependency { .. }));
        assert!(err.to_string().contains("ghost"));
        assert!(err.to_string().contains("plugin"));
    }

    #[test]
    fn test_cycle_rejected_with_members() {
        let err = resolve(&[
            manifest("a", vec![PluginDependency::required("b", "*")]),
            manifest("b", vec![PluginDependency::required("c", "*")]),
            manifest("c", vec![PluginDependency::required("a", "*")]),
            manifest("free", vec![]),
        ])
        .unwrap_err();
        match err {
            PluginError::DependencyCycle { plugins } => assert_eq!(plugins, vec!["a", "b", "c"]),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let err = resolve(&[
            manifest("app", vec![PluginDependency::required("db", "^2.0.0")]),
            manifest("db", vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, PluginError::DependencyError { .. }));
    }

    #[test]
    fn test_dependency_framework_constraint_checked() {
        let mut pinned = PluginDependency::required("db", "*");
        pinned.framework_version = Some(">=2.0.0".to_string());
        let err = resolve(&[manifest("app", vec![pinned]), manifest("db", vec![])]).unwrap_err();
        assert!(matches!(err, PluginError::DependencyError { .. }));
        assert!(err.to_string().contains("framework"));

        let mut loose = PluginDependency::optional("db", "*");
        loose.framework_version = Some(">=2.0.0".to_string());
        let order = resolve(&[manifest("app", vec![loose]), manifest("db", vec![])]).unwrap();
        assert_eq!(order, vec!["app", "db"]);

        let mut compatible = PluginDependency::required("db", "*");
        compatible.framework_version = Some("^1.0.0".to_string());
        let order = resolve(&[manifest("app", vec![compatible]), manifest("db", vec![])]).unwrap();
        assert_eq!(order, vec!["db", "app"]);
    }

    #[test]
    fn test_optional_edges_do_not_create_cycles() {
        let order = resolve(&[
            manifest("a", vec![PluginDependency::required("b", "*")]),
            manifest("b", vec![PluginDependency::optional("a", "*")]),
        ])
        .unwrap();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = resolve(&[manifest("a", vec![]), manifest("a", vec![])]).unwrap_err();
        assert!(matches!(err, PluginError::PluginAlreadyRegistered { .. }));
    }
}
