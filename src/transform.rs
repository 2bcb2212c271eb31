//! GeoTransform: geographic anchor + Euler rotation + uniform scale into the
//! parameters a scene bridge needs to build an anchored local group.
//!
//! Pure computation. Both asset kinds go through [`compute`]; only the
//! default rotation they feed it differs.

use crate::types::{GeoAnchor, Placement};
use serde::{Deserialize, Serialize};

/// Parameters for `SceneBridge::create_anchored_group`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TransformSpec {
    pub anchor: GeoAnchor,
    /// Euler rotation in radians (x, y, z).
    pub rotation_radians: [f64; 3],
    pub scale: f64,
}

/// Convert a placement expressed in degrees into a [`TransformSpec`].
pub fn compute(anchor: GeoAnchor, rotation_degrees: [f64; 3], scale: f64) -> TransformSpec {
    TransformSpec {
        anchor,
        rotation_radians: rotation_degrees.map(f64::to_radians),
        scale,
    }
}

impl From<&Placement> for TransformSpec {
    fn from(p: &Placement) -> Self {
        compute(p.anchor, p.rotation, p.scale)
    }
}
