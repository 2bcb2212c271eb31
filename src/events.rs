//! Event contract and the synchronous EventBus.
//!
//! ## Event kinds
//!
//! | Kind          | Fired by                              | Extra payload        |
//! |---------------|---------------------------------------|----------------------|
//! | `expand`      | `expand` / `toggle`                   |                      |
//! | `collapse`    | `collapse` / `toggle`                 |                      |
//! | `show`        | `set_layer_visible(id, true)`         | splat_id / model_id  |
//! | `hide`        | `set_layer_visible(id, false)`        | splat_id / model_id  |
//! | `splatload`   | successful splat load                 | url, splat_id        |
//! | `splatremove` | splat removal                         | splat_id             |
//! | `modelload`   | successful model load                 | url, model_id        |
//! | `modelremove` | model removal                         | model_id             |
//! | `error`       | failed load                           | url, error           |
//!
//! Every payload carries a copy of the control state taken right after the
//! transition that produced it. Dispatch is synchronous, in registration
//! order, with no buffering or replay for late subscribers.

use crate::state::ControlState;
use crate::types::AssetKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Expand,
    Collapse,
    Show,
    Hide,
    SplatLoad,
    SplatRemove,
    ModelLoad,
    ModelRemove,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Expand,
        EventKind::Collapse,
        EventKind::Show,
        EventKind::Hide,
        EventKind::SplatLoad,
        EventKind::SplatRemove,
        EventKind::ModelLoad,
        EventKind::ModelRemove,
        EventKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Expand => "expand",
            EventKind::Collapse => "collapse",
            EventKind::Show => "show",
            EventKind::Hide => "hide",
            EventKind::SplatLoad => "splatload",
            EventKind::SplatRemove => "splatremove",
            EventKind::ModelLoad => "modelload",
            EventKind::ModelRemove => "modelremove",
            EventKind::Error => "error",
        }
    }

    pub fn load_for(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Splat => EventKind::SplatLoad,
            AssetKind::Model => EventKind::ModelLoad,
        }
    }

    pub fn remove_for(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Splat => EventKind::SplatRemove,
            AssetKind::Model => EventKind::ModelRemove,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub state: ControlState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

impl ControlEvent {
    pub fn new(kind: EventKind, state: ControlState) -> Self {
        Self {
            kind,
            state,
            url: None,
            error: None,
            splat_id: None,
            model_id: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set `splat_id` or `model_id` depending on the asset kind.
    pub fn with_asset(mut self, kind: AssetKind, id: impl Into<String>) -> Self {
        match kind {
            AssetKind::Splat => self.splat_id = Some(id.into()),
            AssetKind::Model => self.model_id = Some(id.into()),
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Token returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct HandlerId(u64);

pub type Handler = Arc<dyn Fn(&ControlEvent) + Send + Sync>;

/// Event kind → ordered list of subscribed handlers.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ControlEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Unsubscribe. Returns `false` (and does nothing) for an unknown handler.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        before != list.len()
    }

    /// Deliver `event` to every handler subscribed to its kind.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe,
    /// unsubscribe or call back into the control without deadlocking.
    pub fn emit(&self, event: &ControlEvent) {
        let snapshot: Vec<Handler> = match self.handlers.lock().get(&event.kind) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        for handler in snapshot {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ControlOptions;

    fn event(kind: EventKind) -> ControlEvent {
        ControlEvent::new(kind, ControlState::from_options(&ControlOptions::default()))
    }

    #[test]
    fn dispatch_follows_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.on(EventKind::Expand, move |_| seen.lock().push(tag));
        }
        bus.emit(&event(EventKind::Expand));

        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_kind_is_notified() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = hits.clone();
        bus.on(EventKind::SplatLoad, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&event(EventKind::ModelLoad));
        bus.emit(&event(EventKind::SplatLoad));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_is_idempotent() {
        let bus = EventBus::new();
        let id = bus.on(EventKind::Error, |_| {});

        assert!(bus.off(EventKind::Error, id));
        assert!(!bus.off(EventKind::Error, id));
        assert!(!bus.off(EventKind::Hide, id));
    }

    #[test]
    fn handler_can_unsubscribe_itself_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<HandlerId>>> = Arc::new(Mutex::new(None));

        let hits = Arc::new(AtomicU64::new(0));

        let (b, s, h) = (bus.clone(), slot.clone(), hits.clone());
        let id = bus.on(EventKind::Collapse, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *s.lock() {
                b.off(EventKind::Collapse, id);
            }
        });
        *slot.lock() = Some(id);

        bus.emit(&event(EventKind::Collapse));
        bus.emit(&event(EventKind::Collapse));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!bus.off(EventKind::Collapse, id));
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let ev = event(EventKind::SplatLoad)
            .with_url("a.splat")
            .with_asset(AssetKind::Splat, "splat-1");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "splatload");
        assert_eq!(json["splat_id"], "splat-1");
        assert!(json.get("model_id").is_none());
    }
}
