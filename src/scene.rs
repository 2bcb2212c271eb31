//! Collaborator contracts: the host map, the scene bridge and the per-format
//! decoders.
//!
//! The control never looks inside a scene node; it only holds the
//! [`NodeHandle`]s the bridge and decoders hand out. Handles are deliberately
//! not `Clone`: detaching a group consumes its handle, so a group can be
//! released at most once.

use crate::error::{DecoderError, SceneError};
use crate::state::ControlState;
use crate::transform::TransformSpec;
use crate::types::{ControlOptions, FlyTo, LngLat};
use futures::future::BoxFuture;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opaque reference to a scene-graph node owned by exactly one holder.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle(u64);

impl NodeHandle {
    /// Wrap a bridge- or decoder-specific node identifier.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Non-owning reference for property updates.
    pub fn id(&self) -> NodeId {
        NodeId(self.0)
    }
}

/// Copyable reference to a node, used for visibility and opacity updates
/// that happen outside the control's lock. It does not keep the node alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Post-render callback registered with the scene bridge.
pub type RenderHook = Box<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// Host map
// ---------------------------------------------------------------------------

/// The map the control is mounted on.
pub trait HostMap: Send + Sync {
    /// Current view center.
    fn center(&self) -> LngLat;

    /// Animate the camera.
    fn fly_to(&self, cmd: FlyTo);

    /// Ask the map to render another frame.
    fn trigger_repaint(&self);

    /// Resolves once the map has finished loading and is idle. Used for the
    /// one-shot deferred default load.
    fn wait_until_idle(&self) -> BoxFuture<'static, ()>;
}

// ---------------------------------------------------------------------------
// Scene bridge
// ---------------------------------------------------------------------------

/// Converts geographic anchors into local renderable groups and mutates the
/// active scene.
pub trait SceneBridge: Send + Sync {
    /// Open the connection to the map's 3D scene and add the ambient and
    /// directional lights. Called once per mount.
    fn connect(&self) -> Result<(), SceneError>;

    /// Release the scene connection. Called once per unmount.
    fn disconnect(&self);

    /// Build a local coordinate group anchored at `spec.anchor`, rotated by
    /// `spec.rotation_radians`.
    fn create_anchored_group(&self, spec: &TransformSpec) -> Result<NodeHandle, SceneError>;

    /// Set a per-axis scale on a node.
    fn set_scale(&self, node: &NodeHandle, scale: [f64; 3]) -> Result<(), SceneError>;

    /// Move `child` into `group`'s subtree.
    fn add_child(&self, group: &NodeHandle, child: NodeHandle) -> Result<(), SceneError>;

    /// Add a group to the active scene.
    fn attach(&self, group: &NodeHandle) -> Result<(), SceneError>;

    /// Remove a group from the active scene (if attached) and drop its subtree.
    fn detach(&self, group: NodeHandle);

    /// Nodes that were detached in the meantime are ignored.
    fn set_visible(&self, node: NodeId, visible: bool);

    /// Nodes that were detached in the meantime are ignored.
    fn set_opacity(&self, node: NodeId, opacity: f64);

    /// Register a callback fired after every rendered frame.
    fn on_after_render(&self, hook: RenderHook);
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// Gaussian-splat decoder family (splat / ply / spz / ksplat / sog).
pub trait SplatDecoder: Send + Sync {
    /// Construct a self-initializing mesh bound to `url`. Decoding runs in the
    /// background; the mesh fills in progressively once attached.
    fn create_mesh(&self, url: &str) -> Result<NodeHandle, DecoderError>;
}

/// GLTF / GLB decoder.
pub trait ModelDecoder: Send + Sync {
    /// Fetch and fully decode `url` into a scene subtree.
    fn load(&self, url: &str) -> BoxFuture<'static, Result<NodeHandle, DecoderError>>;
}

// ---------------------------------------------------------------------------
// Panel view
// ---------------------------------------------------------------------------

/// Presentation layer over the control's state. Pure view: it reads
/// snapshots and never owns state of its own.
pub trait PanelView: Send + Sync {
    /// Build the container for the given options.
    fn mount(&self, options: &ControlOptions);

    /// Redraw from a fresh snapshot.
    fn render(&self, state: &ControlState);

    /// Remove the container from the page.
    fn unmount(&self);
}
