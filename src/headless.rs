//! In-memory collaborators.
//!
//! A scene graph, host map, decoder pair and panel view that keep everything
//! in plain data structures. The `geosplat` binary runs the control against
//! them, and the test suites use them to observe exactly what the control did
//! to the scene.
//!
//! Failure injection:
//! - urls with a scheme other than `http`, `https` or `file` fail with a
//!   network error;
//! - splat urls whose extension is not a known splat format fail to decode;
//! - [`MemoryDecoders::fail_url`] forces a specific error for one url;
//! - [`MemoryDecoders::hold_models`] parks every model decode, failing ones
//!   included, until [`MemoryDecoders::release_models`].

use crate::control::Collaborators;
use crate::error::{DecoderError, SceneError};
use crate::scene::{
    HostMap, ModelDecoder, NodeHandle, NodeId, PanelView, RenderHook, SceneBridge,
    SplatDecoder,
};
use crate::state::ControlState;
use crate::transform::TransformSpec;
use crate::types::{ControlOptions, FlyTo, LngLat};
use futures::future::BoxFuture;
use log::debug;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Formats the in-memory splat decoder understands.
pub const SPLAT_EXTENSIONS: [&str; 5] = ["splat", "ply", "spz", "ksplat", "sog"];

const SCHEMES: [&str; 3] = ["http", "https", "file"];

fn check_scheme(url: &str) -> Result<(), DecoderError> {
    match url.split_once("://") {
        Some((scheme, _)) if !SCHEMES.iter().any(|s| scheme.eq_ignore_ascii_case(s)) => Err(
            DecoderError::Network(format!("unsupported scheme '{scheme}'")),
        ),
        _ => Ok(()),
    }
}

fn extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group(TransformSpec),
    SplatMesh { url: String },
    ModelRoot { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub kind: NodeKind,
    pub scale: [f64; 3],
    pub children: Vec<u64>,
    pub visible: bool,
    pub opacity: f64,
}

#[derive(Default)]
struct SceneGraph {
    nodes: HashMap<u64, SceneNode>,
    /// Groups attached to the active scene, in attach order.
    active: Vec<u64>,
    connected: bool,
    lights: usize,
    hooks: Vec<Arc<dyn Fn() + Send + Sync>>,
}

impl SceneGraph {
    fn drop_subtree(&mut self, raw: u64) {
        if let Some(node) = self.nodes.remove(&raw) {
            for child in node.children {
                self.drop_subtree(child);
            }
        }
    }
}

/// Scene graph held in memory.
#[derive(Default)]
pub struct MemoryScene {
    graph: Mutex<SceneGraph>,
    next_id: AtomicU64,
    fail_attach: Mutex<HashSet<String>>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached node. Decoders use this to hand out meshes.
    pub fn create_node(&self, kind: NodeKind) -> NodeHandle {
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.graph.lock().nodes.insert(
            raw,
            SceneNode {
                kind,
                scale: [1.0; 3],
                children: Vec::new(),
                visible: true,
                opacity: 1.0,
            },
        );
        NodeHandle::from_raw(raw)
    }

    /// Make `attach` fail for any group containing a node loaded from `url`.
    pub fn fail_attach_for(&self, url: impl Into<String>) {
        self.fail_attach.lock().insert(url.into());
    }

    /// Run the post-render hooks once, as a frame would.
    pub fn render_frame(&self) {
        let hooks = self.graph.lock().hooks.clone();
        for hook in hooks {
            hook();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.graph.lock().connected
    }

    pub fn light_count(&self) -> usize {
        self.graph.lock().lights
    }

    /// Raw ids of the groups in the active scene.
    pub fn attached_groups(&self) -> Vec<u64> {
        self.graph.lock().active.clone()
    }

    /// Every node that has been created and not yet dropped.
    pub fn live_node_count(&self) -> usize {
        self.graph.lock().nodes.len()
    }

    pub fn node(&self, raw: u64) -> Option<SceneNode> {
        self.graph.lock().nodes.get(&raw).cloned()
    }

    /// First child of `group`, i.e. the decoded mesh or model root.
    pub fn content_of(&self, group: u64) -> Option<SceneNode> {
        let graph = self.graph.lock();
        let child = *graph.nodes.get(&group)?.children.first()?;
        graph.nodes.get(&child).cloned()
    }

    fn content_url(graph: &SceneGraph, group: u64) -> Option<String> {
        let child = graph.nodes.get(&group)?.children.first()?;
        match &graph.nodes.get(child)?.kind {
            NodeKind::SplatMesh { url } | NodeKind::ModelRoot { url } => Some(url.clone()),
            NodeKind::Group(_) => None,
        }
    }
}

impl SceneBridge for MemoryScene {
    fn connect(&self) -> Result<(), SceneError> {
        let mut graph = self.graph.lock();
        if !graph.connected {
            graph.connected = true;
            // ambient + directional
            graph.lights = 2;
        }
        Ok(())
    }

    fn disconnect(&self) {
        let mut graph = self.graph.lock();
        graph.connected = false;
        graph.lights = 0;
        graph.hooks.clear();
    }

    fn create_anchored_group(&self, spec: &TransformSpec) -> Result<NodeHandle, SceneError> {
        if !self.is_connected() {
            return Err(SceneError("scene is not connected".into()));
        }
        Ok(self.create_node(NodeKind::Group(*spec)))
    }

    fn set_scale(&self, node: &NodeHandle, scale: [f64; 3]) -> Result<(), SceneError> {
        let mut graph = self.graph.lock();
        let node = graph
            .nodes
            .get_mut(&node.raw())
            .ok_or_else(|| SceneError(format!("unknown node {}", node.raw())))?;
        node.scale = scale;
        Ok(())
    }

    fn add_child(&self, group: &NodeHandle, child: NodeHandle) -> Result<(), SceneError> {
        let mut graph = self.graph.lock();
        if !graph.nodes.contains_key(&child.raw()) {
            return Err(SceneError(format!("unknown node {}", child.raw())));
        }
        let parent = graph
            .nodes
            .get_mut(&group.raw())
            .ok_or_else(|| SceneError(format!("unknown group {}", group.raw())))?;
        parent.children.push(child.raw());
        Ok(())
    }

    fn attach(&self, group: &NodeHandle) -> Result<(), SceneError> {
        let mut graph = self.graph.lock();
        if !graph.connected {
            return Err(SceneError("scene is not connected".into()));
        }
        if let Some(url) = Self::content_url(&graph, group.raw()) {
            if self.fail_attach.lock().contains(&url) {
                return Err(SceneError(format!("attach rejected for {url}")));
            }
        }
        if !graph.active.contains(&group.raw()) {
            graph.active.push(group.raw());
        }
        debug!("Attached group {}", group.raw());
        Ok(())
    }

    fn detach(&self, group: NodeHandle) {
        let mut graph = self.graph.lock();
        graph.active.retain(|g| *g != group.raw());
        graph.drop_subtree(group.raw());
        debug!("Detached group {}", group.raw());
    }

    fn set_visible(&self, node: NodeId, visible: bool) {
        if let Some(node) = self.graph.lock().nodes.get_mut(&node.raw()) {
            node.visible = visible;
        }
    }

    fn set_opacity(&self, node: NodeId, opacity: f64) {
        if let Some(node) = self.graph.lock().nodes.get_mut(&node.raw()) {
            node.opacity = opacity;
        }
    }

    fn on_after_render(&self, hook: RenderHook) {
        self.graph.lock().hooks.push(Arc::from(hook));
    }
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// Splat + model decoders producing nodes in a [`MemoryScene`].
pub struct MemoryDecoders {
    scene: Arc<MemoryScene>,
    failures: Mutex<HashMap<String, DecoderError>>,
    model_gate: watch::Sender<bool>,
    model_requests: AtomicUsize,
}

impl MemoryDecoders {
    pub fn new(scene: Arc<MemoryScene>) -> Self {
        let (model_gate, _) = watch::channel(true);
        Self {
            scene,
            failures: Mutex::new(HashMap::new()),
            model_gate,
            model_requests: AtomicUsize::new(0),
        }
    }

    /// Make every decode of `url` fail with `err`.
    pub fn fail_url(&self, url: impl Into<String>, err: DecoderError) {
        self.failures.lock().insert(url.into(), err);
    }

    /// Park model decodes until [`MemoryDecoders::release_models`].
    pub fn hold_models(&self) {
        self.model_gate.send_replace(false);
    }

    pub fn release_models(&self) {
        self.model_gate.send_replace(true);
    }

    /// Number of model decodes started so far.
    pub fn model_requests(&self) -> usize {
        self.model_requests.load(Ordering::SeqCst)
    }

    fn forced_failure(&self, url: &str) -> Result<(), DecoderError> {
        match self.failures.lock().get(url) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl SplatDecoder for MemoryDecoders {
    fn create_mesh(&self, url: &str) -> Result<NodeHandle, DecoderError> {
        check_scheme(url)?;
        self.forced_failure(url)?;
        match extension(url) {
            Some(ext) if SPLAT_EXTENSIONS.contains(&ext.as_str()) => {
                Ok(self.scene.create_node(NodeKind::SplatMesh {
                    url: url.to_string(),
                }))
            }
            other => Err(DecoderError::Decode(format!(
                "unsupported splat format '{}'",
                other.unwrap_or_default()
            ))),
        }
    }
}

impl ModelDecoder for MemoryDecoders {
    fn load(&self, url: &str) -> BoxFuture<'static, Result<NodeHandle, DecoderError>> {
        self.model_requests.fetch_add(1, Ordering::SeqCst);
        let url = url.to_string();
        let early = check_scheme(&url).and_then(|_| self.forced_failure(&url));
        let scene = self.scene.clone();
        let mut gate = self.model_gate.subscribe();

        Box::pin(async move {
            // Sender lives as long as the decoders; a closed channel just
            // means nobody can hold the decode any more.
            let _ = gate.wait_for(|open| *open).await;
            if let Err(e) = early {
                return Err(e);
            }
            Ok(scene.create_node(NodeKind::ModelRoot { url }))
        })
    }
}

// ---------------------------------------------------------------------------
// Host map
// ---------------------------------------------------------------------------

pub struct MemoryMap {
    center: Mutex<LngLat>,
    flights: Mutex<Vec<FlyTo>>,
    repaints: AtomicUsize,
    idle: watch::Sender<bool>,
}

impl MemoryMap {
    pub fn new(center: LngLat) -> Self {
        let (idle, _) = watch::channel(false);
        Self {
            center: Mutex::new(center),
            flights: Mutex::new(Vec::new()),
            repaints: AtomicUsize::new(0),
            idle,
        }
    }

    /// Signal that the map finished loading.
    pub fn fire_idle(&self) {
        self.idle.send_replace(true);
    }

    pub fn set_center(&self, center: LngLat) {
        *self.center.lock() = center;
    }

    pub fn flights(&self) -> Vec<FlyTo> {
        self.flights.lock().clone()
    }

    pub fn repaint_count(&self) -> usize {
        self.repaints.load(Ordering::SeqCst)
    }
}

impl HostMap for MemoryMap {
    fn center(&self) -> LngLat {
        *self.center.lock()
    }

    fn fly_to(&self, cmd: FlyTo) {
        self.flights.lock().push(cmd);
    }

    fn trigger_repaint(&self) {
        self.repaints.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_until_idle(&self) -> BoxFuture<'static, ()> {
        let mut idle = self.idle.subscribe();
        Box::pin(async move {
            let _ = idle.wait_for(|ready| *ready).await;
        })
    }
}

// ---------------------------------------------------------------------------
// Panel view
// ---------------------------------------------------------------------------

/// Records what the panel would have drawn.
#[derive(Default)]
pub struct MemoryView {
    mounted: Mutex<Option<ControlOptions>>,
    last: Mutex<Option<ControlState>>,
    renders: AtomicUsize,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.lock().is_some()
    }

    pub fn mounted_options(&self) -> Option<ControlOptions> {
        self.mounted.lock().clone()
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn last_rendered(&self) -> Option<ControlState> {
        self.last.lock().clone()
    }
}

impl PanelView for MemoryView {
    fn mount(&self, options: &ControlOptions) {
        *self.mounted.lock() = Some(options.clone());
    }

    fn render(&self, state: &ControlState) {
        self.renders.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(state.clone());
    }

    fn unmount(&self) {
        *self.mounted.lock() = None;
    }
}

// ---------------------------------------------------------------------------
// Rig
// ---------------------------------------------------------------------------

/// All in-memory collaborators wired together.
pub struct HeadlessRig {
    pub scene: Arc<MemoryScene>,
    pub decoders: Arc<MemoryDecoders>,
    pub map: Arc<MemoryMap>,
    pub view: Arc<MemoryView>,
}

impl HeadlessRig {
    pub fn new() -> Self {
        let scene = Arc::new(MemoryScene::new());
        Self {
            decoders: Arc::new(MemoryDecoders::new(scene.clone())),
            scene,
            map: Arc::new(MemoryMap::new(LngLat { lng: 0.0, lat: 0.0 })),
            view: Arc::new(MemoryView::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.scene.clone(),
            self.decoders.clone(),
            self.decoders.clone(),
        )
        .with_view(self.view.clone())
    }

    pub fn host(&self) -> Arc<dyn HostMap> {
        self.map.clone()
    }
}

impl Default for HeadlessRig {
    fn default() -> Self {
        Self::new()
    }
}
