//! Tests for per-plugin isolation through the manager
//!
//! Capability mediation, service ownership and event delivery between
//! plugins running under one host.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use super::mock_plugins::*;
use crate::plugin::context::PluginContext;
use crate::plugin::error::PluginError;
use crate::plugin::manifest::PluginPermissions;
use crate::security::{Capability, CapabilityFlags};

type Slot = Arc<Mutex<Option<PluginContext>>>;

fn capture(slot: &Slot) -> impl Fn(&PluginContext) -> crate::plugin::error::PluginResult<()> + Send + Sync + 'static {
    let slot = Arc::clone(slot);
    move |ctx: &PluginContext| {
        *slot.lock() = Some(ctx.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_denied_capability_is_audited() {
    let manager = create_test_manager();
    let slot: Slot = Arc::new(Mutex::new(None));
    admit(
        &manager,
        vec![(
            MockPlugin::new("blog").with_setup(capture(&slot)),
            manifest("blog", vec![]).with_permissions(PluginPermissions::none().with(Capability::Cache)),
        )],
    )
    .await;
    manager.initialize_all().await.unwrap();

    let ctx = slot.lock().clone().unwrap();
    assert!(ctx.cache().set("k", json!(1), None).is_ok());

    let err = ctx.config().get("site.title").unwrap_err();
    assert!(err.is_security_error());
    assert_eq!(manager.mediator().violation_count("blog"), 1);
    let violations = manager.mediator().violations_for("blog");
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].capability, Capability::Config.as_str());

    manager.set_permissions("blog", CapabilityFlags::CACHE | CapabilityFlags::CONFIG).unwrap();
    assert!(ctx.config().get("site.title").is_ok());
    assert_eq!(manager.mediator().violation_count("blog"), 1);

    let health = manager.get_all_health();
    assert_eq!(health[0].security_violations, 1);
    assert!(health[0].healthy);
}

#[tokio::test]
async fn test_set_permissions_requires_known_plugin() {
    let manager = create_test_manager();
    let err = manager.set_permissions("ghost", CapabilityFlags::CACHE).unwrap_err();
    assert!(matches!(err, PluginError::PluginNotFound { .. }));
}

#[tokio::test]
async fn test_services_are_namespaced_by_owner() {
    let manager = create_test_manager();
    let slot: Slot = Arc::new(Mutex::new(None));
    admit(
        &manager,
        vec![
            (
                MockPlugin::new("alpha").with_setup(|ctx| ctx.services().export("greeting", "from alpha".to_string())),
                manifest("alpha", vec![]),
            ),
            (
                MockPlugin::new("beta").with_setup(|ctx| ctx.services().export("greeting", "from beta".to_string())),
                manifest("beta", vec![]),
            ),
            (MockPlugin::new("gamma").with_setup(capture(&slot)), manifest("gamma", vec![])),
        ],
    )
    .await;
    manager.initialize_all().await.unwrap();

    let gamma = slot.lock().clone().unwrap();
    assert_eq!(gamma.services().list("alpha"), vec!["greeting"]);
    assert_eq!(*gamma.services().import_as::<String>("alpha", "greeting").unwrap(), "from alpha");
    assert_eq!(*gamma.services().import_as::<String>("beta", "greeting").unwrap(), "from beta");
    assert!(matches!(
        gamma.services().import("gamma", "greeting"),
        Err(PluginError::ServiceNotFound { .. })
    ));
    assert!(matches!(
        gamma.services().import_as::<u64>("alpha", "greeting"),
        Err(PluginError::ServiceTypeMismatch { .. })
    ));

    let metrics = manager.get_all_plugin_metrics();
    // Every import that finds the entry counts, including a failed downcast; `list` does not
    let calls = |name: &str| metrics.iter().find(|m| m.name == name).unwrap().counters.service_calls;
    assert_eq!(calls("alpha"), 2);
    assert_eq!(calls("beta"), 1);
    assert_eq!(calls("gamma"), 0);
}

#[tokio::test]
async fn test_events_flow_between_plugins() {
    let manager = create_test_manager();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let slot: Slot = Arc::new(Mutex::new(None));
    admit(
        &manager,
        vec![
            (
                MockPlugin::new("listener").with_setup(move |ctx| {
                    let sink = Arc::clone(&sink);
                    ctx.events().subscribe("post.published", move |event| {
                        sink.lock().push((event.source.clone(), event.payload.clone()));
                        Ok(())
                    })?;
                    Ok(())
                }),
                manifest("listener", vec![]),
            ),
            (MockPlugin::new("writer").with_setup(capture(&slot)), manifest("writer", vec![])),
        ],
    )
    .await;
    manager.initialize_all().await.unwrap();

    let writer = slot.lock().clone().unwrap();
    assert_eq!(writer.events().publish("post.published", json!({"id": 7})), 1);
    assert_eq!(*received.lock(), vec![("writer".to_string(), json!({"id": 7}))]);

    manager.unload_plugin("listener").await.unwrap();
    assert_eq!(writer.events().publish("post.published", json!({"id": 8})), 0);
}
