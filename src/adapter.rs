//! Layer-control adapter.
//!
//! Exposes the control's assets to an external layer switcher as plain
//! layers. Everything goes through the control's public capability surface
//! (`layers`, `set_layer_visible`, `set_layer_opacity`, events); the adapter
//! never sees the registry or the scene handles.

use crate::control::{LayerInfo, SplatControl};
use crate::events::{ControlEvent, EventKind, HandlerId};
use crate::types::AssetKind;
use parking_lot::Mutex;
use std::sync::Arc;

/// Adapter type tag reported to layer switchers.
pub const ADAPTER_TYPE: &str = "gaussian-splat";

/// Change notification forwarded to the layer switcher.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerChange {
    Added { id: String },
    Removed { id: String },
    Visibility { id: String, visible: bool },
}

/// Symbol the switcher draws next to a layer.
pub fn symbol_for(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Splat => "circle",
        AssetKind::Model => "fill",
    }
}

pub struct LayerAdapter {
    control: SplatControl,
    subscriptions: Mutex<Vec<(EventKind, HandlerId)>>,
}

impl LayerAdapter {
    pub fn new(control: SplatControl) -> Self {
        Self {
            control,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn adapter_type(&self) -> &'static str {
        ADAPTER_TYPE
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.control.get_layer_ids()
    }

    pub fn layer_state(&self, id: &str) -> Option<LayerInfo> {
        self.control.layers().into_iter().find(|l| l.id == id)
    }

    pub fn name(&self, id: &str) -> Option<String> {
        self.layer_state(id).map(|l| l.name)
    }

    pub fn symbol(&self, id: &str) -> Option<&'static str> {
        self.layer_state(id).map(|l| symbol_for(l.kind))
    }

    pub fn set_visibility(&self, id: &str, visible: bool) -> bool {
        self.control.set_layer_visible(id, visible)
    }

    pub fn set_opacity(&self, id: &str, opacity: f64) -> bool {
        self.control.set_layer_opacity(id, opacity)
    }

    /// Forward load/remove/show/hide events as [`LayerChange`]s until
    /// [`LayerAdapter::unsubscribe`] is called.
    pub fn on_layer_change<F>(&self, callback: F)
    where
        F: Fn(LayerChange) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let kinds = [
            EventKind::SplatLoad,
            EventKind::ModelLoad,
            EventKind::SplatRemove,
            EventKind::ModelRemove,
            EventKind::Show,
            EventKind::Hide,
        ];

        let mut subs = self.subscriptions.lock();
        for kind in kinds {
            let cb = callback.clone();
            let id = self.control.on(kind, move |event| {
                if let Some(change) = translate(event) {
                    cb(change);
                }
            });
            subs.push((kind, id));
        }
    }

    /// Drop every subscription made through [`LayerAdapter::on_layer_change`].
    pub fn unsubscribe(&self) {
        for (kind, id) in self.subscriptions.lock().drain(..) {
            self.control.off(kind, id);
        }
    }
}

impl Drop for LayerAdapter {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn translate(event: &ControlEvent) -> Option<LayerChange> {
    let id = event.splat_id.clone().or_else(|| event.model_id.clone())?;
    match event.kind {
        EventKind::SplatLoad | EventKind::ModelLoad => Some(LayerChange::Added { id }),
        EventKind::SplatRemove | EventKind::ModelRemove => Some(LayerChange::Removed { id }),
        EventKind::Show => Some(LayerChange::Visibility { id, visible: true }),
        EventKind::Hide => Some(LayerChange::Visibility { id, visible: false }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ControlState;
    use crate::types::ControlOptions;

    fn state() -> ControlState {
        ControlState::from_options(&ControlOptions::default())
    }

    #[test]
    fn translates_lifecycle_events() {
        let load = ControlEvent::new(EventKind::ModelLoad, state())
            .with_url("a.glb")
            .with_asset(AssetKind::Model, "model-1");
        assert_eq!(
            translate(&load),
            Some(LayerChange::Added {
                id: "model-1".into()
            })
        );

        let hide =
            ControlEvent::new(EventKind::Hide, state()).with_asset(AssetKind::Splat, "splat-2");
        assert_eq!(
            translate(&hide),
            Some(LayerChange::Visibility {
                id: "splat-2".into(),
                visible: false
            })
        );
    }

    #[test]
    fn events_without_asset_are_ignored() {
        assert_eq!(translate(&ControlEvent::new(EventKind::Expand, state())), None);
    }
}
