//! Core value types shared across all modules.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

/// A geographic position: degrees / degrees / metres above the ellipsoid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct GeoAnchor {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
}

impl GeoAnchor {
    pub fn new(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude,
        }
    }
}

impl std::fmt::Display for GeoAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}, {:.1}m)",
            self.longitude, self.latitude, self.altitude
        )
    }
}

/// Map view center as reported by the host map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

// ---------------------------------------------------------------------------
// Asset kinds
// ---------------------------------------------------------------------------

/// The two families of 3D assets the control can place.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Gaussian-splat point cloud (splat / ply / spz / ksplat / sog).
    Splat,
    /// GLTF / GLB mesh.
    Model,
}

impl AssetKind {
    /// Prefix used for registry ids (`splat-1`, `model-3`, ...).
    pub fn id_prefix(self) -> &'static str {
        match self {
            AssetKind::Splat => "splat",
            AssetKind::Model => "model",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id_prefix())
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Caller-supplied placement for a single load. Every field left `None`
/// falls back to the control's current form value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlacementOverride {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub altitude: Option<f64>,
    /// Euler rotation in degrees (x, y, z).
    pub rotation: Option<[f64; 3]>,
    pub scale: Option<f64>,
}

impl PlacementOverride {
    pub fn at(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            longitude: Some(longitude),
            latitude: Some(latitude),
            altitude: Some(altitude),
            ..Default::default()
        }
    }

    pub fn with_rotation(mut self, rotation: [f64; 3]) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// A fully resolved placement, computed once per load call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Placement {
    pub anchor: GeoAnchor,
    /// Euler rotation in degrees (x, y, z).
    pub rotation: [f64; 3],
    pub scale: f64,
}

/// Read-only projection of a registry entry returned by `get_splat_info` /
/// `get_model_info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetInfo {
    pub url: String,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Corner of the map the control's container is docked to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ControlPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Control configuration. Immutable after construction except through
/// [`crate::SplatControl::update`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlOptions {
    pub position: ControlPosition,
    /// Start with the panel collapsed.
    pub collapsed: bool,
    /// Panel width in pixels.
    pub panel_width: u32,
    /// Maximum panel height in pixels (`None` = grow with content).
    pub panel_max_height: Option<u32>,
    /// URL pre-filled in the form and used by the deferred default load.
    pub default_url: Option<String>,
    pub default_longitude: f64,
    pub default_latitude: f64,
    pub default_altitude: f64,
    /// Default Euler rotation (degrees) for splats.
    pub default_rotation: [f64; 3],
    /// Default Euler rotation (degrees) for GLTF/GLB models. GLTF is Y-up
    /// while splat exports usually are not, hence the separate default.
    pub default_model_rotation: [f64; 3],
    pub default_scale: f64,
    pub default_opacity: f64,
    /// Load `default_url` once the host map is idle after mount.
    pub load_default_url: bool,
    /// Fly the camera to each newly loaded asset.
    pub fly_to: bool,
    pub fly_to_zoom: f64,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            position: ControlPosition::TopRight,
            collapsed: true,
            panel_width: 320,
            panel_max_height: None,
            default_url: None,
            default_longitude: 0.0,
            default_latitude: 0.0,
            default_altitude: 0.0,
            default_rotation: [-90.0, 0.0, 0.0],
            default_model_rotation: [90.0, 0.0, 0.0],
            default_scale: 1.0,
            default_opacity: 1.0,
            load_default_url: false,
            fly_to: true,
            fly_to_zoom: 18.0,
        }
    }
}

/// Partial options merged by `update`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlOptionsPatch {
    pub position: Option<ControlPosition>,
    pub collapsed: Option<bool>,
    pub panel_width: Option<u32>,
    pub panel_max_height: Option<u32>,
    pub default_url: Option<String>,
    pub default_longitude: Option<f64>,
    pub default_latitude: Option<f64>,
    pub default_altitude: Option<f64>,
    pub default_rotation: Option<[f64; 3]>,
    pub default_model_rotation: Option<[f64; 3]>,
    pub default_scale: Option<f64>,
    pub default_opacity: Option<f64>,
    pub load_default_url: Option<bool>,
    pub fly_to: Option<bool>,
    pub fly_to_zoom: Option<f64>,
}

impl ControlOptions {
    /// Merge a patch into these options.
    pub fn merge(&mut self, patch: ControlOptionsPatch) {
        if let Some(v) = patch.position {
            self.position = v;
        }
        if let Some(v) = patch.collapsed {
            self.collapsed = v;
        }
        if let Some(v) = patch.panel_width {
            self.panel_width = v;
        }
        if let Some(v) = patch.default_longitude {
            self.default_longitude = v;
        }
        if let Some(v) = patch.default_latitude {
            self.default_latitude = v;
        }
        if let Some(v) = patch.default_altitude {
            self.default_altitude = v;
        }
        if let Some(v) = patch.default_rotation {
            self.default_rotation = v;
        }
        if let Some(v) = patch.default_model_rotation {
            self.default_model_rotation = v;
        }
        if let Some(v) = patch.default_scale {
            self.default_scale = v;
        }
        if let Some(v) = patch.default_opacity {
            self.default_opacity = v;
        }
        if let Some(v) = patch.load_default_url {
            self.load_default_url = v;
        }
        if let Some(v) = patch.fly_to {
            self.fly_to = v;
        }
        if let Some(v) = patch.fly_to_zoom {
            self.fly_to_zoom = v;
        }
        if patch.panel_max_height.is_some() {
            self.panel_max_height = patch.panel_max_height;
        }
        if patch.default_url.is_some() {
            self.default_url = patch.default_url;
        }
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

/// Camera pitch used when flying to a freshly loaded asset.
pub const FLY_TO_PITCH: f64 = 60.0;
/// Camera animation duration when flying to a freshly loaded asset.
pub const FLY_TO_DURATION_MS: u64 = 2000;

/// Camera command issued to the host map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FlyTo {
    pub center: LngLat,
    pub zoom: f64,
    pub pitch: f64,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_touches_present_fields() {
        let mut opts = ControlOptions::default();
        opts.merge(ControlOptionsPatch {
            collapsed: Some(false),
            default_url: Some("a.splat".into()),
            fly_to_zoom: Some(12.0),
            ..Default::default()
        });

        assert!(!opts.collapsed);
        assert_eq!(opts.default_url.as_deref(), Some("a.splat"));
        assert_eq!(opts.fly_to_zoom, 12.0);
        assert_eq!(opts.panel_width, 320);
        assert_eq!(opts.default_scale, 1.0);
    }

    #[test]
    fn kinds_have_distinct_default_rotation() {
        let opts = ControlOptions::default();
        assert_ne!(opts.default_rotation, opts.default_model_rotation);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ControlOptions =
            serde_json::from_str(r#"{"position":"bottom-left","load_default_url":true}"#)
                .unwrap();
        assert_eq!(opts.position, ControlPosition::BottomLeft);
        assert!(opts.load_default_url);
        assert_eq!(opts.default_opacity, 1.0);
    }
}
