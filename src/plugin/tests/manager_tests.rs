//! Tests for the Plugin Manager lifecycle
//!
//! Discovery batches, dependency ordering, failure propagation, shutdown and
//! unloading.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use super::mock_plugins::*;
use crate::config::PluginHostConfig;
use crate::hooks::{HookContext, HookType};
use crate::plugin::error::PluginError;
use crate::plugin::manager::PluginManager;
use crate::plugin::manifest::PluginDependency;
use crate::plugin::traits::PluginState;

#[tokio::test]
async fn test_required_and_optional_dependencies() {
    let manager = create_test_manager();
    let calls = journal();
    admit(
        &manager,
        vec![
            (
                MockPlugin::new("app").with_journal(&calls),
                manifest(
                    "app",
                    vec![PluginDependency::required("dep1", "^1.0.0"), PluginDependency::optional("dep2", "*")],
                ),
            ),
            (MockPlugin::new("dep1").with_journal(&calls), manifest("dep1", vec![])),
        ],
    )
    .await;

    manager.initialize_all().await.unwrap();

    assert_eq!(manager.initialization_order(), vec!["dep1", "app"]);
    assert_eq!(*calls.lock(), vec!["initialize:dep1", "initialize:app"]);
    assert_eq!(manager.plugin_state("app"), Some(PluginState::Initialized));
}

#[tokio::test]
async fn test_missing_required_dependency_fails_initialize() {
    let manager = create_test_manager();
    let calls = journal();
    admit(
        &manager,
        vec![(
            MockPlugin::new("app").with_journal(&calls),
            manifest("app", vec![PluginDependency::required("dep1", "*")]),
        )],
    )
    .await;

    let err = manager.initialize_all().await.unwrap_err();
    match &err {
        PluginError::MissingDependency { plugin, dependency } => {
            assert_eq!(plugin, "app");
            assert_eq!(dependency, "dep1");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(calls.lock().is_empty());
    assert_eq!(manager.plugin_state("app"), Some(PluginState::Failed));
}

#[tokio::test]
async fn test_full_lifecycle_order() {
    let manager = create_test_manager();
    let calls = journal();
    let hook_calls = Arc::clone(&calls);
    admit(
        &manager,
        vec![
            (
                MockPlugin::new("web").with_journal(&calls).with_setup(move |ctx| {
                    let startup = Arc::clone(&hook_calls);
                    ctx.hooks().register(HookType::Startup, 0, move |_| {
                        startup.lock().push("hook:startup".to_string());
                        Ok(())
                    })?;
                    let shutdown = Arc::clone(&hook_calls);
                    ctx.hooks().register(HookType::Shutdown, 0, move |_| {
                        shutdown.lock().push("hook:shutdown".to_string());
                        Ok(())
                    })?;
                    Ok(())
                }),
                manifest("web", vec![PluginDependency::required("db", "*")]),
            ),
            (MockPlugin::new("db").with_journal(&calls), manifest("db", vec![])),
        ],
    )
    .await;

    manager.initialize_all().await.unwrap();
    manager.start_all().await.unwrap();
    assert_eq!(manager.plugin_state("web"), Some(PluginState::Running));
    assert_eq!(manager.plugin_state("db"), Some(PluginState::Running));

    let report = manager.stop_all().await;
    assert!(report.is_clean());
    assert_eq!(report.stopped, vec!["web", "db"]);

    assert_eq!(
        *calls.lock(),
        vec![
            "initialize:db",
            "initialize:web",
            "start:db",
            "start:web",
            "hook:startup",
            "hook:shutdown",
            "stop:web",
            "stop:db",
        ]
    );
    assert_eq!(manager.plugin_state("web"), Some(PluginState::Stopped));
    assert_eq!(manager.hooks().registration_count(), 0);
}

#[tokio::test]
async fn test_stop_all_is_idempotent_and_survives_failures() {
    let manager = create_test_manager();
    let calls = journal();
    admit(
        &manager,
        vec![
            (MockPlugin::new("a").with_journal(&calls).failing(Phase::Stop), manifest("a", vec![])),
            (MockPlugin::new("b").with_journal(&calls).panicking(Phase::Stop), manifest("b", vec![])),
            (MockPlugin::new("c").with_journal(&calls), manifest("c", vec![])),
        ],
    )
    .await;
    manager.initialize_all().await.unwrap();
    manager.start_all().await.unwrap();

    let report = manager.stop_all().await;
    assert_eq!(report.stopped, vec!["c"]);
    let failed: Vec<&str> = report.failures.iter().map(|f| f.plugin.as_str()).collect();
    assert_eq!(failed, vec!["b", "a"]);
    assert!(report.failures[0].message.contains("panicked"));
    assert_eq!(manager.plugin_state("a"), Some(PluginState::Failed));

    let stops_before = calls.lock().iter().filter(|c| c.starts_with("stop:")).count();
    let again = manager.stop_all().await;
    assert!(again.stopped.is_empty() && again.failures.is_empty());
    let stops_after = calls.lock().iter().filter(|c| c.starts_with("stop:")).count();
    assert_eq!(stops_before, stops_after);
}

#[tokio::test]
async fn test_initialize_failure_blocks_dependents_only() {
    let manager = create_test_manager();
    admit(
        &manager,
        vec![
            (MockPlugin::new("base").failing(Phase::Initialize), manifest("base", vec![])),
            (MockPlugin::new("child"), manifest("child", vec![PluginDependency::required("base", "*")])),
            (MockPlugin::new("other"), manifest("other", vec![])),
        ],
    )
    .await;

    let err = manager.initialize_all().await.unwrap_err();
    assert!(err.is_startup_error());
    assert_eq!(err.plugins(), vec!["base", "child"]);
    assert_eq!(manager.plugin_state("base"), Some(PluginState::Failed));
    assert_eq!(manager.plugin_state("child"), Some(PluginState::Failed));
    assert_eq!(manager.plugin_state("other"), Some(PluginState::Initialized));

    manager.start_all().await.unwrap();
    assert_eq!(manager.plugin_state("other"), Some(PluginState::Running));
}

#[tokio::test]
async fn test_start_panic_is_contained() {
    let manager = create_test_manager();
    admit(
        &manager,
        vec![
            (MockPlugin::new("crashy").panicking(Phase::Start), manifest("crashy", vec![])),
            (MockPlugin::new("steady"), manifest("steady", vec![])),
        ],
    )
    .await;
    manager.initialize_all().await.unwrap();

    let err = manager.start_all().await.unwrap_err();
    match err {
        PluginError::StartupFailed { phase, failures } => {
            assert_eq!(phase, "start");
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].plugin, "crashy");
            assert!(failures[0].message.contains("blew up"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(manager.plugin_state("steady"), Some(PluginState::Running));

    let health = manager.get_all_health();
    let crashy = health.iter().find(|h| h.name == "crashy").unwrap();
    assert!(!crashy.healthy);
    assert_eq!(crashy.error_count, 1);
    assert!(crashy.last_error_at.is_some());
}

#[tokio::test]
async fn test_discovery_batch_is_all_or_nothing() {
    let manager = create_test_manager();
    manager.register_plugin(Box::new(MockPlugin::new("good"))).await.unwrap();
    manager.register_plugin(Box::new(MockPlugin::new("future"))).await.unwrap();

    let err = manager
        .discover_manifests(vec![
            manifest("good", vec![]),
            manifest("future", vec![]).with_framework(">=99.0.0"),
            manifest("ghost", vec![]),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.plugins(), vec!["future", "ghost"]);
    assert!(manager.plugin_names().is_empty());
}

#[tokio::test]
async fn test_duplicate_manifest_rejected() {
    let manager = create_test_manager();
    admit(&manager, vec![(MockPlugin::new("blog"), manifest("blog", vec![]))]).await;

    let err = manager.discover_manifests(vec![manifest("blog", vec![])]).await.unwrap_err();
    assert!(err.to_string().contains("blog"));
    assert_eq!(manager.plugin_names(), vec!["blog"]);
}

#[tokio::test]
async fn test_excluded_plugins_are_skipped() {
    let config = PluginHostConfig { excluded: vec!["legacy".to_string()], ..PluginHostConfig::default() };
    let manager = PluginManager::new(config).unwrap();
    manager.register_plugin(Box::new(MockPlugin::new("blog"))).await.unwrap();

    let admitted = manager
        .discover_manifests(vec![manifest("blog", vec![]), manifest("legacy", vec![])])
        .await
        .unwrap();
    assert_eq!(admitted, vec!["blog"]);
}

#[tokio::test]
async fn test_unload_refused_while_required() {
    let manager = create_test_manager();
    admit(
        &manager,
        vec![
            (
                MockPlugin::new("auth").with_setup(|ctx| {
                    ctx.services().export("tokens", 42u32)?;
                    ctx.events().subscribe("user.created", |_| Ok(()))?;
                    ctx.hooks().register(HookType::PreRequest, 5, |_| Ok(()))?;
                    Ok(())
                }),
                manifest("auth", vec![]),
            ),
            (MockPlugin::new("blog"), manifest("blog", vec![PluginDependency::required("auth", "*")])),
        ],
    )
    .await;
    startup_registered(&manager).await;

    let err = manager.unload_plugin("auth").await.unwrap_err();
    assert!(matches!(err, PluginError::InvalidState { .. }));

    manager.unload_plugin("blog").await.unwrap();
    manager.unload_plugin("auth").await.unwrap();

    assert!(manager.plugin_names().is_empty());
    assert!(manager.initialization_order().is_empty());
    assert!(manager.services().is_empty());
    assert_eq!(manager.events().subscriber_count("user.created"), 0);
    assert_eq!(manager.hooks().registration_count(), 0);
    assert!(matches!(manager.unload_plugin("auth").await, Err(PluginError::PluginNotFound { .. })));
}

#[tokio::test]
async fn test_hooks_across_plugins_by_priority() {
    let manager = create_test_manager();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut plugins = Vec::new();
    for (name, priority) in [("low", 1), ("high", 10), ("mid", 5)] {
        let seen = Arc::clone(&order);
        plugins.push((
            MockPlugin::new(name).with_setup(move |ctx| {
                let seen = Arc::clone(&seen);
                let name = ctx.name().to_string();
                ctx.hooks().register(HookType::PreRequest, priority, move |hook_ctx| {
                    seen.lock().push(name.clone());
                    if name == "mid" {
                        hook_ctx.skip();
                    }
                    Ok(())
                })?;
                Ok(())
            }),
            manifest(name, vec![]),
        ));
    }
    admit(&manager, plugins).await;
    startup_registered(&manager).await;

    let mut ctx = HookContext::new(HookType::PreRequest);
    let report = manager.execute_hooks(HookType::PreRequest, &mut ctx);
    assert!(report.skipped);
    assert_eq!(*order.lock(), vec!["high", "mid"]);

    let metrics = manager.get_all_plugin_metrics();
    let high = metrics.iter().find(|m| m.name == "high").unwrap();
    assert_eq!(high.hooks["pre-request"].executions, 1);
    let low = metrics.iter().find(|m| m.name == "low").unwrap();
    assert!(low.hooks.get("pre-request").map_or(true, |s| s.executions == 0));
}

#[tokio::test]
async fn test_hook_metrics_outlive_stop_until_unload() {
    let manager = create_test_manager();
    admit(
        &manager,
        vec![(
            MockPlugin::new("flaky").with_setup(|ctx| {
                ctx.hooks().register(HookType::PostRequest, 0, |_| Err(PluginError::generic("broken")))?;
                Ok(())
            }),
            manifest("flaky", vec![]),
        )],
    )
    .await;
    startup_registered(&manager).await;

    let report = manager.execute_hooks(HookType::PostRequest, &mut HookContext::new(HookType::PostRequest));
    assert_eq!(report.fault_count(), 1);
    manager.stop_all().await;
    assert_eq!(manager.hooks().registration_count(), 0);

    let metrics = manager.get_all_plugin_metrics();
    let flaky = metrics.iter().find(|m| m.name == "flaky").unwrap();
    assert_eq!(flaky.state, PluginState::Stopped);
    assert_eq!(flaky.hooks["post-request"].executions, 1);
    assert_eq!(flaky.hooks["post-request"].errors, 1);

    manager.unload_plugin("flaky").await.unwrap();
    assert!(manager.hooks().stats_for("flaky").is_empty());
}

#[tokio::test]
async fn test_startup_from_plugin_directory() {
    let temp = TempDir::new().unwrap();
    let plugin_dir = temp.path().join("greeter");
    fs::create_dir_all(&plugin_dir).unwrap();
    fs::write(
        plugin_dir.join("plugin.yaml"),
        "name: greeter\nversion: 1.2.0\ndescription: Says hello\nauthor: Test Author\npermissions:\n  cache: true\n",
    )
    .unwrap();

    let config = PluginHostConfig { directory: temp.path().to_path_buf(), ..PluginHostConfig::default() };
    let manager = PluginManager::new(config).unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&started);
    manager
        .register_plugin(Box::new(MockPlugin::new("greeter").with_setup(move |ctx| {
            assert!(ctx.cache().set("greeting", serde_json::json!("hello"), None).is_ok());
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })))
        .await
        .unwrap();

    manager.startup().await.unwrap();
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(manager.plugin_state("greeter"), Some(PluginState::Running));
    assert!(manager.record("greeter").unwrap().source.unwrap().ends_with("greeter/plugin.yaml"));

    let prometheus = manager.export_prometheus_metrics();
    assert!(prometheus.contains("plughost_plugin_state{plugin=\"greeter\"} 4"));
}

#[tokio::test]
async fn test_disabled_startup_is_noop() {
    let config = PluginHostConfig {
        enabled: false,
        directory: "/definitely/not/a/plugin/dir".into(),
        ..PluginHostConfig::default()
    };
    let manager = PluginManager::new(config).unwrap();
    manager.startup().await.unwrap();
    assert!(manager.plugin_names().is_empty());
}

#[tokio::test]
async fn test_missing_plugin_directory_fails_startup() {
    let config = PluginHostConfig { directory: "/definitely/not/a/plugin/dir".into(), ..PluginHostConfig::default() };
    let manager = PluginManager::new(config).unwrap();
    let err = manager.startup().await.unwrap_err();
    assert!(matches!(err, PluginError::ConfigurationError { .. }));
}

/// Initialize and start whatever has been admitted
async fn startup_registered(manager: &PluginManager) {
    manager.initialize_all().await.unwrap();
    manager.start_all().await.unwrap();
}
