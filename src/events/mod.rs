//! Event Bus
//!
//! Lightweight publish/subscribe between plugins. Delivery is synchronous to
//! the subscribers registered at publish time; nothing is stored or replayed.
//! Subscriptions are owner-tagged so a plugin's subscriptions can be dropped
//! in one call when it is torn down.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::hooks::system::panic_message;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::metrics::SharedMetrics;

/// A published event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    /// Publishing plugin
    pub source: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(source: &str, name: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            source: source.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&Event) -> PluginResult<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    owner: String,
    handler: EventHandler,
}

/// Totals across the bus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub published: u64,
    pub delivered: u64,
    pub failures: u64,
}

pub struct EventBus {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    failures: AtomicU64,
    metrics: SharedMetrics,
}

impl EventBus {
    pub fn new(metrics: SharedMetrics) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn subscribe<F>(&self, owner: &str, event: &str, handler: F) -> PluginResult<SubscriptionId>
    where
        F: Fn(&Event) -> PluginResult<()> + Send + Sync + 'static,
    {
        if owner.is_empty() || event.is_empty() {
            return Err(PluginError::generic("Subscription owner and event name must not be empty"));
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Subscription { id, owner: owner.to_string(), handler: Arc::new(handler) });
        debug!("Plugin '{}' subscribed to '{}'", owner, event);
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> PluginResult<()> {
        let mut subscriptions = self.subscriptions.write();
        for list in subscriptions.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                return Ok(());
            }
        }
        Err(PluginError::generic(format!("No subscription with id {}", id.0)))
    }

    /// Drop every subscription owned by a plugin; returns how many were removed
    pub fn unsubscribe_all(&self, owner: &str) -> usize {
        let mut subscriptions = self.subscriptions.write();
        let mut removed = 0;
        for list in subscriptions.values_mut() {
            let before = list.len();
            list.retain(|s| s.owner != owner);
            removed += before - list.len();
        }
        subscriptions.retain(|_, list| !list.is_empty());
        removed
    }

    /// Deliver an event to its current subscribers; returns how many handled it
    pub fn publish(&self, source: &str, name: &str, payload: Value) -> usize {
        let event = Event::new(source, name, payload);
        let subscribers = {
            let subscriptions = self.subscriptions.read();
            subscriptions.get(name).cloned().unwrap_or_default()
        };

        self.published.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_event_published(source);

        let mut delivered = 0;
        for subscription in subscribers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| (subscription.handler)(&event)));
            self.metrics.record_event_received(&subscription.owner);
            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(payload) => Some(format!("panic: {}", panic_message(payload.as_ref()))),
            };
            match failure {
                None => delivered += 1,
                Some(message) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Subscriber '{}' failed to handle event '{}': {}",
                        subscription.owner, name, message
                    );
                    self.metrics.record_error(&subscription.owner, &message);
                }
            }
        }

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscriptions.read().get(event).map_or(0, |list| list.len())
    }

    /// Event names with at least one subscriber, sorted
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("events", &self.events()).field("stats", &self.stats()).finish()
    }
}

/// A plugin's view of the bus; publishes and subscribes as that plugin
#[derive(Clone)]
pub struct PluginEvents {
    plugin: String,
    bus: Arc<EventBus>,
}

impl PluginEvents {
    pub fn new(plugin: &str, bus: Arc<EventBus>) -> Self {
        Self { plugin: plugin.to_string(), bus }
    }

    pub fn subscribe<F>(&self, event: &str, handler: F) -> PluginResult<SubscriptionId>
    where
        F: Fn(&Event) -> PluginResult<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(&self.plugin, event, handler)
    }

    pub fn publish(&self, event: &str, payload: Value) -> usize {
        self.bus.publish(&self.plugin, event, payload)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> PluginResult<()> {
        self.bus.unsubscribe(id)
    }
}

impl std::fmt::Debug for PluginEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEvents").field("plugin", &self.plugin).finish()
    }
}
