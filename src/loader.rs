//! AssetLoader: the splat and model load pipelines.
//!
//! ## Completion semantics
//!
//! | Pipeline | Decode                      | Resolves                         |
//! |----------|-----------------------------|----------------------------------|
//! | Splat    | background, inside decoder  | right after the group is attached |
//! | Model    | awaited                     | after decode + attach            |
//!
//! Splat meshes render progressively, so waiting for them would only delay
//! the first visible points. GLTF scenes are all-or-nothing.

use crate::error::ControlError;
use crate::scene::{ModelDecoder, NodeHandle, SceneBridge, SplatDecoder};
use crate::transform::TransformSpec;
use crate::types::AssetKind;
use log::debug;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Extension routing
// ---------------------------------------------------------------------------

const MODEL_EXTENSIONS: [&str; 2] = ["gltf", "glb"];

/// Pick the pipeline for `url` from its path extension.
///
/// Case-insensitive, ignores query string and fragment. Only `gltf`/`glb`
/// route to the model pipeline; everything else goes to the splat decoder,
/// which decides for itself whether it understands the format.
pub fn detect_kind(url: &str) -> AssetKind {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((_, ext)) if MODEL_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)) => {
            AssetKind::Model
        }
        _ => AssetKind::Splat,
    }
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// A failed pipeline run.
///
/// `orphan` is the anchored group built before the failure point, if any. The
/// loader does not release it; the control detaches it.
#[derive(Debug)]
pub struct LoadFailure {
    pub error: ControlError,
    pub orphan: Option<NodeHandle>,
}

impl LoadFailure {
    fn new(error: ControlError, orphan: Option<NodeHandle>) -> Self {
        Self { error, orphan }
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Runs the load pipelines against the scene bridge and decoders.
#[derive(Clone)]
pub struct AssetLoader {
    scene: Arc<dyn SceneBridge>,
    splats: Arc<dyn SplatDecoder>,
    models: Arc<dyn ModelDecoder>,
}

impl AssetLoader {
    pub fn new(
        scene: Arc<dyn SceneBridge>,
        splats: Arc<dyn SplatDecoder>,
        models: Arc<dyn ModelDecoder>,
    ) -> Self {
        Self {
            scene,
            splats,
            models,
        }
    }

    /// Run the pipeline for `kind`. Returns the attached group on success.
    pub async fn load(
        &self,
        kind: AssetKind,
        url: &str,
        spec: &TransformSpec,
    ) -> Result<NodeHandle, LoadFailure> {
        match kind {
            AssetKind::Splat => self.load_splat(url, spec),
            AssetKind::Model => self.load_model(url, spec).await,
        }
    }

    /// Splat pipeline. Synchronous: the decoder fills the mesh in after this
    /// returns.
    pub fn load_splat(&self, url: &str, spec: &TransformSpec) -> Result<NodeHandle, LoadFailure> {
        let kind = AssetKind::Splat;
        let scene_err = |e| ControlError::from_scene(kind, url, e);

        let group = self
            .scene
            .create_anchored_group(spec)
            .map_err(|e| LoadFailure::new(scene_err(e), None))?;

        let mesh = match self.splats.create_mesh(url) {
            Ok(mesh) => mesh,
            Err(e) => {
                return Err(LoadFailure::new(
                    ControlError::from_decoder(kind, url, e),
                    Some(group),
                ))
            }
        };

        let s = spec.scale;
        let attached = self
            .scene
            .set_scale(&mesh, [s, s, s])
            .and_then(|_| self.scene.add_child(&group, mesh))
            .and_then(|_| self.scene.attach(&group));
        if let Err(e) = attached {
            return Err(LoadFailure::new(scene_err(e), Some(group)));
        }

        debug!("Splat {} attached at {}", url, spec.anchor);
        Ok(group)
    }

    /// Model pipeline. Awaits the full GLTF/GLB decode before attaching.
    pub async fn load_model(
        &self,
        url: &str,
        spec: &TransformSpec,
    ) -> Result<NodeHandle, LoadFailure> {
        let kind = AssetKind::Model;
        let scene_err = |e| ControlError::from_scene(kind, url, e);

        let group = self
            .scene
            .create_anchored_group(spec)
            .map_err(|e| LoadFailure::new(scene_err(e), None))?;

        let root = match self.models.load(url).await {
            Ok(root) => root,
            Err(e) => {
                return Err(LoadFailure::new(
                    ControlError::from_decoder(kind, url, e),
                    Some(group),
                ))
            }
        };

        // GLTF handedness differs from the map's local frame: flip Y.
        let s = spec.scale;
        let attached = self
            .scene
            .set_scale(&root, [s, -s, s])
            .and_then(|_| self.scene.add_child(&group, root))
            .and_then(|_| self.scene.attach(&group));
        if let Err(e) = attached {
            return Err(LoadFailure::new(scene_err(e), Some(group)));
        }

        debug!("Model {} attached at {}", url, spec.anchor);
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gltf_and_glb_route_to_model_pipeline() {
        assert_eq!(detect_kind("https://x/a.GLB?x=1"), AssetKind::Model);
        assert_eq!(detect_kind("https://x/scene.gltf"), AssetKind::Model);
        assert_eq!(detect_kind("models/house.Gltf#node"), AssetKind::Model);
    }

    #[test]
    fn everything_else_routes_to_splat_pipeline() {
        for url in [
            "https://x/a.spz",
            "https://x/a.splat",
            "https://x/a.ply",
            "https://x/a.ksplat",
            "https://x/a.sog",
            "https://x/a.unknown",
            "https://x/no-extension",
        ] {
            assert_eq!(detect_kind(url), AssetKind::Splat, "{url}");
        }
    }

    #[test]
    fn query_string_extension_is_ignored() {
        assert_eq!(detect_kind("https://x/a.spz?format=.glb"), AssetKind::Splat);
        assert_eq!(detect_kind("https://x.glb/a.ply"), AssetKind::Splat);
    }
}
