//! HookRegistry -- priority-ordered lifecycle observer list.
//!
//! Panels and consoles announce lifecycle transitions (activate-request,
//! close-request, dispose, prompt creation) through a registry instead of
//! virtual overrides. Anything that wants to react, including tests that
//! record which lifecycle messages were delivered, registers an observer.
//!
//! # Dispatch Semantics
//!
//! Observers run **synchronously** in priority order (lower number = earlier)
//! on the turn that emits the event. Observers registered under
//! [`events::WILDCARD`](crate::events::WILDCARD) receive every event after the
//! event-specific ones. Default fields are merged into every payload and an
//! RFC-3339 `timestamp` is stamped on object payloads.
//!
//! # Connections
//!
//! - [`LifecycleObserver`](crate::traits::LifecycleObserver) defines the
//!   observer contract.
//! - Event names come from [`crate::events`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::events::WILDCARD;
use crate::traits::LifecycleObserver;

/// A registered observer with its priority and name.
struct ObserverEntry {
    observer: Arc<dyn LifecycleObserver>,
    priority: i32,
    name: String,
    /// Unique ID for unregistration.
    id: u64,
}

/// Lifecycle observer registry.
///
/// # Example
///
/// ```rust
/// use console_panel::hooks::HookRegistry;
///
/// let registry = HookRegistry::new();
/// assert_eq!(registry.emit("panel:dispose", serde_json::json!({})), 0);
/// ```
pub struct HookRegistry {
    /// Observers keyed by event name, sorted by priority within each event.
    /// Wrapped in `Arc` so unregister closures can hold a reference.
    observers: Arc<Mutex<HashMap<String, Vec<ObserverEntry>>>>,
    /// Default fields merged into every `emit()` call.
    defaults: Mutex<Option<Value>>,
    next_id: Mutex<u64>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            observers: Arc::new(Mutex::new(HashMap::new())),
            defaults: Mutex::new(None),
            next_id: Mutex::new(0),
        }
    }

    /// Register an observer for an event (or [`WILDCARD`]).
    ///
    /// # Returns
    ///
    /// An unregister closure. Call it to remove this observer.
    pub fn register(
        &self,
        event: &str,
        observer: Arc<dyn LifecycleObserver>,
        priority: i32,
        name: Option<String>,
    ) -> Box<dyn Fn() + Send + Sync> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };

        let entry = ObserverEntry {
            observer,
            priority,
            name: name.unwrap_or_else(|| format!("observer-{id}")),
            id,
        };

        {
            let mut observers = self.observers.lock().unwrap();
            let event_observers = observers.entry(event.to_string()).or_default();
            event_observers.push(entry);
            event_observers.sort_by_key(|e| e.priority);
        }

        let event_key = event.to_string();
        let observers_ref = self.observers.clone();

        Box::new(move || {
            let mut observers = observers_ref.lock().unwrap();
            if let Some(event_observers) = observers.get_mut(&event_key) {
                event_observers.retain(|e| e.id != id);
            }
        })
    }

    /// Set default fields merged into every `emit()` call. Explicit event
    /// data takes precedence.
    pub fn set_default_fields(&self, defaults: Value) {
        *self.defaults.lock().unwrap() = Some(defaults);
    }

    /// Notify observers of `event`. Returns how many were notified.
    pub fn emit(&self, event: &str, data: Value) -> usize {
        // Snapshot so observers may register or unregister while running.
        let entries: Vec<Arc<dyn LifecycleObserver>> = {
            let observers = self.observers.lock().unwrap();
            let specific = observers.get(event).into_iter().flatten();
            let wildcard = observers.get(WILDCARD).into_iter().flatten();
            specific
                .chain(wildcard)
                .map(|e| e.observer.clone())
                .collect()
        };

        if entries.is_empty() {
            return 0;
        }

        let mut payload = {
            let defaults = self.defaults.lock().unwrap();
            match defaults.as_ref() {
                Some(defaults_val) => merge_json(defaults_val, &data),
                None => data,
            }
        };

        if let Value::Object(ref mut map) = payload {
            map.insert(
                "timestamp".to_string(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }

        for observer in &entries {
            observer.notify(event, &payload);
        }
        entries.len()
    }

    /// Names of observers registered for `event`, in dispatch order.
    pub fn list_observers(&self, event: &str) -> Vec<String> {
        self.observers
            .lock()
            .unwrap()
            .get(event)
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Drop every observer. Used on disposal.
    pub fn clear(&self) {
        self.observers.lock().unwrap().clear();
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow merge of two JSON objects (`overlay` wins). Non-object overlays
/// replace the base entirely.
fn merge_json(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in overlay_map {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingObserver;

    /// Observer that appends its label to a shared log.
    struct LabelObserver {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl LifecycleObserver for LabelObserver {
        fn notify(&self, _event: &str, _data: &Value) {
            self.log.lock().unwrap().push(self.label);
        }
    }

    #[test]
    fn emit_with_no_observers_notifies_nobody() {
        let registry = HookRegistry::new();
        assert_eq!(registry.emit("panel:attach", serde_json::json!({})), 0);
    }

    #[test]
    fn register_and_emit() {
        let registry = HookRegistry::new();
        let observer = Arc::new(RecordingObserver::new());
        registry.register("panel:attach", observer.clone(), 0, None);

        assert_eq!(registry.emit("panel:attach", serde_json::json!({"id": "p1"})), 1);
        let events = observer.recorded_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "panel:attach");
        assert_eq!(events[0].1["id"], "p1");
    }

    #[test]
    fn priority_ordering() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(
            "e:x",
            Arc::new(LabelObserver { label: "low", log: log.clone() }),
            10,
            Some("low".into()),
        );
        registry.register(
            "e:x",
            Arc::new(LabelObserver { label: "high", log: log.clone() }),
            5,
            Some("high".into()),
        );

        registry.emit("e:x", serde_json::json!({}));
        assert_eq!(*log.lock().unwrap(), vec!["high", "low"]);
        assert_eq!(registry.list_observers("e:x"), vec!["high", "low"]);
    }

    #[test]
    fn wildcard_observers_see_every_event_after_specific_ones() {
        let registry = HookRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(
            WILDCARD,
            Arc::new(LabelObserver { label: "all", log: log.clone() }),
            -100,
            None,
        );
        registry.register(
            "e:x",
            Arc::new(LabelObserver { label: "x", log: log.clone() }),
            0,
            None,
        );

        assert_eq!(registry.emit("e:x", serde_json::json!({})), 2);
        assert_eq!(registry.emit("e:y", serde_json::json!({})), 1);
        assert_eq!(*log.lock().unwrap(), vec!["x", "all", "all"]);
    }

    #[test]
    fn unregister_removes_observer() {
        let registry = HookRegistry::new();
        let observer = Arc::new(RecordingObserver::new());
        let unregister = registry.register("e:x", observer.clone(), 0, None);
        unregister();
        assert_eq!(registry.emit("e:x", serde_json::json!({})), 0);
        assert!(observer.recorded_events().is_empty());
    }

    #[test]
    fn default_fields_merge_and_timestamp_is_stamped() {
        let registry = HookRegistry::new();
        registry.set_default_fields(serde_json::json!({"panel_id": "p1", "state": "old"}));
        let observer = Arc::new(RecordingObserver::new());
        registry.register(WILDCARD, observer.clone(), 0, None);

        registry.emit("e:x", serde_json::json!({"state": "new"}));
        let (_, data) = &observer.recorded_events()[0];
        assert_eq!(data["panel_id"], "p1");
        assert_eq!(data["state"], "new");
        let ts = data["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn clear_drops_all_observers() {
        let registry = HookRegistry::new();
        registry.register("e:x", Arc::new(RecordingObserver::new()), 0, None);
        registry.clear();
        assert!(registry.list_observers("e:x").is_empty());
    }
}
