//! GeoSplat Control
//!
//! A map control that places georeferenced 3D assets (Gaussian splats and
//! GLTF/GLB models) into a map's 3D scene and tracks their lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! SplatControl  (control.rs)   ← mount lifecycle, load/remove, panel state
//!   ├── AssetLoader   (loader.rs)    ← splat / model pipelines
//!   │     └── transform::compute     ← anchor + rotation + scale
//!   ├── AssetRegistry (registry.rs)  ← id allocation, records
//!   ├── ControlState  (state.rs)     ← snapshot + transitions
//!   └── EventBus      (events.rs)    ← expand, splatload, error, ...
//!
//! scene.rs  ← HostMap / SceneBridge / decoders / PanelView contracts
//! ```
//!
//! The scene bridge, decoders, host map and panel view are collaborators
//! supplied by the embedder. [`headless`] provides in-memory versions.

pub mod adapter;
pub mod control;
pub mod error;
pub mod events;
pub mod headless;
pub mod loader;
pub mod registry;
pub mod scene;
pub mod state;
pub mod transform;
pub mod types;

// Convenience re-exports
pub use adapter::{LayerAdapter, LayerChange};
pub use control::{Collaborators, LayerInfo, SplatControl};
pub use error::{ControlError, DecoderError, SceneError};
pub use events::{ControlEvent, EventKind, HandlerId};
pub use scene::{
    HostMap, ModelDecoder, NodeHandle, NodeId, PanelView, SceneBridge, SplatDecoder,
};
pub use state::{ControlState, FormEdit};
pub use types::{
    AssetInfo, AssetKind, ControlOptions, ControlOptionsPatch, ControlPosition, GeoAnchor,
    LngLat, PlacementOverride,
};
