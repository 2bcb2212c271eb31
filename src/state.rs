//! ControlState: the single snapshot the panel renders from, and the explicit
//! transitions that change it.
//!
//! Every mutation goes through [`ControlState::apply`] while the control's
//! lock is held. Concurrent loads therefore never interleave inside one
//! transition; for the transient fields (`loading`, `status`, `error`) the
//! transition applied last wins.

use crate::types::{AssetKind, ControlOptions};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlState {
    pub collapsed: bool,

    // Form values
    pub url: String,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
    /// Euler rotation in degrees (x, y, z).
    pub rotation: [f64; 3],
    pub scale: f64,
    pub opacity: f64,

    // Transient
    pub loading: bool,
    pub error: Option<String>,
    pub status: Option<String>,

    // Derived from the registry
    pub has_layer: bool,
    pub layer_count: usize,
}

impl ControlState {
    /// Initial snapshot for a freshly constructed control.
    pub fn from_options(options: &ControlOptions) -> Self {
        Self {
            collapsed: options.collapsed,
            url: options.default_url.clone().unwrap_or_default(),
            longitude: options.default_longitude,
            latitude: options.default_latitude,
            altitude: options.default_altitude,
            rotation: options.default_rotation,
            scale: options.default_scale,
            opacity: options.default_opacity,
            loading: false,
            error: None,
            status: None,
            has_layer: false,
            layer_count: 0,
        }
    }

    pub fn apply(&mut self, transition: StateTransition) {
        match transition {
            StateTransition::Expand => self.collapsed = false,
            StateTransition::Collapse => self.collapsed = true,
            StateTransition::FormEdited(edit) => edit.apply_to(self),
            StateTransition::LoadStarted { kind, url } => {
                self.loading = true;
                self.error = None;
                self.status = Some(format!("Loading {kind} from {url}..."));
            }
            StateTransition::LoadSucceeded {
                kind,
                id,
                layer_count,
            } => {
                self.loading = false;
                self.status = Some(format!("Loaded {kind} {id}"));
                self.set_layer_count(layer_count);
            }
            StateTransition::LoadFailed { message } => {
                self.loading = false;
                self.status = None;
                self.error = Some(message);
            }
            StateTransition::LayerRemoved { layer_count } => {
                self.status = None;
                self.set_layer_count(layer_count);
            }
            StateTransition::Unmounted => {
                self.loading = false;
                self.status = None;
            }
        }
    }

    fn set_layer_count(&mut self, layer_count: usize) {
        self.layer_count = layer_count;
        self.has_layer = layer_count > 0;
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum StateTransition {
    Expand,
    Collapse,
    FormEdited(FormEdit),
    LoadStarted {
        kind: AssetKind,
        url: String,
    },
    LoadSucceeded {
        kind: AssetKind,
        id: String,
        layer_count: usize,
    },
    LoadFailed {
        message: String,
    },
    LayerRemoved {
        layer_count: usize,
    },
    /// The control left its map; any load still in flight is discarded.
    Unmounted,
}

/// Form-field edits issued by the panel. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FormEdit {
    pub url: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub altitude: Option<f64>,
    pub rotation: Option<[f64; 3]>,
    pub scale: Option<f64>,
    pub opacity: Option<f64>,
}

impl FormEdit {
    fn apply_to(self, state: &mut ControlState) {
        if let Some(url) = self.url {
            state.url = url;
        }
        if let Some(v) = self.longitude {
            state.longitude = v;
        }
        if let Some(v) = self.latitude {
            state.latitude = v;
        }
        if let Some(v) = self.altitude {
            state.altitude = v;
        }
        if let Some(v) = self.rotation {
            state.rotation = v;
        }
        if let Some(v) = self.scale {
            state.scale = v;
        }
        if let Some(v) = self.opacity {
            state.opacity = v.clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initial() -> ControlState {
        ControlState::from_options(&ControlOptions {
            default_url: Some("a.splat".into()),
            ..Default::default()
        })
    }

    #[test]
    fn initial_state_mirrors_options() {
        let s = initial();
        assert_eq!(s.url, "a.splat");
        assert!(s.collapsed);
        assert!(!s.has_layer);
        assert_eq!(s.layer_count, 0);
        assert_eq!(s.scale, 1.0);
    }

    #[test]
    fn load_start_clears_previous_error() {
        let mut s = initial();
        s.apply(StateTransition::LoadFailed {
            message: "boom".into(),
        });
        assert_eq!(s.error.as_deref(), Some("boom"));

        s.apply(StateTransition::LoadStarted {
            kind: AssetKind::Splat,
            url: "a.splat".into(),
        });
        assert!(s.loading);
        assert!(s.error.is_none());
        assert!(s.status.is_some());
    }

    #[test]
    fn last_transition_wins_for_transient_fields() {
        let mut s = initial();
        s.apply(StateTransition::LoadStarted {
            kind: AssetKind::Splat,
            url: "a.splat".into(),
        });
        s.apply(StateTransition::LoadStarted {
            kind: AssetKind::Model,
            url: "b.glb".into(),
        });
        s.apply(StateTransition::LoadSucceeded {
            kind: AssetKind::Model,
            id: "model-1".into(),
            layer_count: 1,
        });
        s.apply(StateTransition::LoadFailed {
            message: "late failure".into(),
        });

        assert!(!s.loading);
        assert!(s.status.is_none());
        assert_eq!(s.error.as_deref(), Some("late failure"));
        assert_eq!(s.layer_count, 1);
        assert!(s.has_layer);
    }

    #[test]
    fn removal_recomputes_has_layer() {
        let mut s = initial();
        s.apply(StateTransition::LoadSucceeded {
            kind: AssetKind::Splat,
            id: "splat-1".into(),
            layer_count: 1,
        });
        s.apply(StateTransition::LayerRemoved { layer_count: 0 });
        assert!(!s.has_layer);
        assert!(s.status.is_none());
    }

    #[test]
    fn unmount_drops_pending_load_status() {
        let mut s = initial();
        s.apply(StateTransition::LoadFailed {
            message: "earlier".into(),
        });
        s.apply(StateTransition::LoadStarted {
            kind: AssetKind::Model,
            url: "b.glb".into(),
        });
        s.apply(StateTransition::Unmounted);

        assert!(!s.loading);
        assert!(s.status.is_none());
        assert_eq!(s.url, "a.splat");
    }

    #[test]
    fn form_edit_clamps_opacity() {
        let mut s = initial();
        s.apply(StateTransition::FormEdited(FormEdit {
            opacity: Some(3.0),
            longitude: Some(8.5),
            ..Default::default()
        }));
        assert_eq!(s.opacity, 1.0);
        assert_eq!(s.longitude, 8.5);
    }
}
