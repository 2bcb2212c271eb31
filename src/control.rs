//! SplatControl – mount lifecycle, asset load/remove, panel state, events.
//!
//! ## Asset lifecycle
//!
//! ```text
//! Absent ──load──▶ Loading ──pipeline ok──▶ Attached ──remove──▶ Absent
//!                     │
//!                     └──pipeline error──▶ Absent (error event, Err returned)
//! ```
//!
//! There is no in-place update of an attached asset: changing placement,
//! rotation or scale means remove + load.
//!
//! ## Locking
//!
//! All mutable state sits in one `parking_lot::Mutex<Core>`. The lock is never
//! held across an `.await`, and views and event handlers always run after it
//! has been released, so handlers may call back into the control.
//!
//! Mount and unmount each bump a generation counter. Async completions
//! compare the generation they started under with the current one and drop
//! their result (detaching any scene node they built) when the control was
//! unmounted in between.

use crate::error::{ControlError, Result};
use crate::events::{ControlEvent, EventBus, EventKind, HandlerId};
use crate::loader::{detect_kind, AssetLoader, LoadFailure};
use crate::registry::{AssetRecord, AssetRegistry};
use crate::scene::{HostMap, ModelDecoder, NodeHandle, PanelView, SceneBridge, SplatDecoder};
use crate::state::{ControlState, FormEdit, StateTransition};
use crate::transform::TransformSpec;
use crate::types::{
    AssetInfo, AssetKind, ControlOptions, ControlOptionsPatch, FlyTo, GeoAnchor, LngLat,
    Placement, PlacementOverride, FLY_TO_DURATION_MS, FLY_TO_PITCH,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External engines the control drives.
#[derive(Clone)]
pub struct Collaborators {
    pub scene: Arc<dyn SceneBridge>,
    pub splats: Arc<dyn SplatDecoder>,
    pub models: Arc<dyn ModelDecoder>,
    pub view: Option<Arc<dyn PanelView>>,
}

impl Collaborators {
    pub fn new(
        scene: Arc<dyn SceneBridge>,
        splats: Arc<dyn SplatDecoder>,
        models: Arc<dyn ModelDecoder>,
    ) -> Self {
        Self {
            scene,
            splats,
            models,
            view: None,
        }
    }

    pub fn with_view(mut self, view: Arc<dyn PanelView>) -> Self {
        self.view = Some(view);
        self
    }
}

// ---------------------------------------------------------------------------
// Layer listing
// ---------------------------------------------------------------------------

/// One entry of [`SplatControl::layers`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LayerInfo {
    pub id: String,
    pub kind: AssetKind,
    /// File name component of the source url.
    pub name: String,
    pub url: String,
    pub visible: bool,
    pub opacity: f64,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// Deferred default load scheduled on mount.
struct DeferredLoad {
    task: JoinHandle<()>,
    /// Set once the map went idle and the load itself started. From then on
    /// the task is left to finish so the generation check can release what
    /// it built.
    fired: Arc<AtomicBool>,
}

struct Core {
    options: ControlOptions,
    state: ControlState,
    registry: AssetRegistry,
    map: Option<Arc<dyn HostMap>>,
    generation: u64,
    pending_default_load: Option<DeferredLoad>,
}

impl Core {
    fn is_live(&self, generation: u64) -> bool {
        self.map.is_some() && self.generation == generation
    }

    /// Fill every unspecified field from the current form values. Models
    /// without an explicit rotation use the model-specific default.
    fn resolve_placement(&self, kind: AssetKind, o: PlacementOverride) -> Placement {
        let default_rotation = match kind {
            AssetKind::Splat => self.state.rotation,
            AssetKind::Model => self.options.default_model_rotation,
        };
        Placement {
            anchor: GeoAnchor::new(
                o.longitude.unwrap_or(self.state.longitude),
                o.latitude.unwrap_or(self.state.latitude),
                o.altitude.unwrap_or(self.state.altitude),
            ),
            rotation: o.rotation.unwrap_or(default_rotation),
            scale: o.scale.unwrap_or(self.state.scale),
        }
    }

    fn transition(&mut self, t: StateTransition) -> ControlState {
        self.state.apply(t);
        self.state.clone()
    }
}

struct Inner {
    scene: Arc<dyn SceneBridge>,
    view: Option<Arc<dyn PanelView>>,
    loader: AssetLoader,
    events: EventBus,
    core: Mutex<Core>,
}

// ---------------------------------------------------------------------------
// SplatControl
// ---------------------------------------------------------------------------

/// The map control. Cheap to clone; clones share the same control.
#[derive(Clone)]
pub struct SplatControl {
    inner: Arc<Inner>,
}

impl SplatControl {
    pub fn new(options: ControlOptions, collaborators: Collaborators) -> Self {
        let state = ControlState::from_options(&options);
        let Collaborators {
            scene,
            splats,
            models,
            view,
        } = collaborators;

        Self {
            inner: Arc::new(Inner {
                loader: AssetLoader::new(scene.clone(), splats, models),
                scene,
                view,
                events: EventBus::new(),
                core: Mutex::new(Core {
                    options,
                    state,
                    registry: AssetRegistry::new(),
                    map: None,
                    generation: 0,
                    pending_default_load: None,
                }),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Mount / unmount
    // -----------------------------------------------------------------------

    /// Attach the control to a host map.
    ///
    /// Connects the scene bridge (which adds its lights), mounts the panel and,
    /// when `load_default_url` is set, schedules a one-shot load of the default
    /// url for when the map first becomes idle. Mounting an already mounted
    /// control is a no-op.
    pub fn on_add(&self, map: Arc<dyn HostMap>) -> Result<()> {
        if self.is_mounted() {
            warn!("SplatControl already mounted; ignoring on_add");
            return Ok(());
        }

        self.inner
            .scene
            .connect()
            .map_err(|e| ControlError::SceneUnavailable(e.0))?;

        let repaint_map = map.clone();
        self.inner
            .scene
            .on_after_render(Box::new(move || repaint_map.trigger_repaint()));

        let (options, state, generation) = {
            let mut core = self.inner.core.lock();
            core.map = Some(map.clone());
            core.generation += 1;
            (core.options.clone(), core.state.clone(), core.generation)
        };

        if let Some(view) = &self.inner.view {
            view.mount(&options);
            view.render(&state);
        }

        let default_url = options
            .default_url
            .filter(|url| options.load_default_url && !url.is_empty());
        if let Some(url) = default_url {
            self.schedule_default_load(map.as_ref(), url, generation);
        }

        info!("SplatControl mounted (generation {})", generation);
        Ok(())
    }

    fn schedule_default_load(&self, map: &dyn HostMap, url: String, generation: u64) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(rt) => rt,
            Err(_) => {
                warn!("No tokio runtime available; skipping deferred load of {}", url);
                return;
            }
        };

        let idle = map.wait_until_idle();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let fired = Arc::new(AtomicBool::new(false));
        let started = fired.clone();
        let task = runtime.spawn(async move {
            idle.await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let control = SplatControl { inner };
            {
                let core = control.inner.core.lock();
                if !core.is_live(generation) {
                    debug!("Control unmounted before map idle; dropping default load");
                    return;
                }
                started.store(true, Ordering::SeqCst);
            }
            let kind = detect_kind(&url);
            if let Err(e) = control.load_kind(kind, &url, None, Some(generation)).await {
                warn!("Default load of {} failed: {}", url, e);
            }
        });

        self.inner.core.lock().pending_default_load = Some(DeferredLoad { task, fired });
    }

    /// Detach the control from its map.
    ///
    /// Cancels a deferred default load that is still waiting for the map,
    /// removes every tracked asset, disconnects the scene bridge and unmounts
    /// the panel. In-flight loads that complete afterwards are discarded.
    pub fn on_remove(&self) {
        let (pending, removed) = {
            let mut core = self.inner.core.lock();
            if core.map.is_none() {
                return;
            }
            core.map = None;
            core.generation += 1;

            let mut removed = Vec::new();
            for kind in [AssetKind::Splat, AssetKind::Model] {
                for id in core.registry.list(Some(kind)) {
                    if let Some(record) = core.registry.remove(&id) {
                        let layer_count = core.registry.count();
                        let snapshot =
                            core.transition(StateTransition::LayerRemoved { layer_count });
                        removed.push((kind, id, record.into_group(), snapshot));
                    }
                }
            }
            core.transition(StateTransition::Unmounted);
            (core.pending_default_load.take(), removed)
        };

        if let Some(pending) = pending {
            if !pending.fired.load(Ordering::SeqCst) {
                pending.task.abort();
            }
        }

        for (kind, id, group, snapshot) in removed {
            self.released(kind, &id, group, &snapshot);
        }

        self.inner.scene.disconnect();
        if let Some(view) = &self.inner.view {
            view.unmount();
        }
        info!("SplatControl unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.core.lock().map.is_some()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load `url`, choosing the pipeline from its file extension.
    pub async fn load(&self, url: &str, placement: Option<PlacementOverride>) -> Result<String> {
        self.load_kind(detect_kind(url), url, placement, None).await
    }

    /// Load `url` through the splat pipeline regardless of its extension.
    pub async fn load_splat(
        &self,
        url: &str,
        placement: Option<PlacementOverride>,
    ) -> Result<String> {
        self.load_kind(AssetKind::Splat, url, placement, None).await
    }

    /// Load `url` through the model pipeline regardless of its extension.
    pub async fn load_model(
        &self,
        url: &str,
        placement: Option<PlacementOverride>,
    ) -> Result<String> {
        self.load_kind(AssetKind::Model, url, placement, None).await
    }

    /// With `Some(generation)` the load only starts if the control is still
    /// mounted under that generation, and is silently dropped otherwise.
    async fn load_kind(
        &self,
        kind: AssetKind,
        url: &str,
        placement: Option<PlacementOverride>,
        expected: Option<u64>,
    ) -> Result<String> {
        let started = {
            let mut core = self.inner.core.lock();
            let stale = expected.is_some_and(|g| !core.is_live(g));
            if core.map.is_none() || stale {
                None
            } else {
                let placement = core.resolve_placement(kind, placement.unwrap_or_default());
                let snapshot = core.transition(StateTransition::LoadStarted {
                    kind,
                    url: url.to_string(),
                });
                Some((placement, core.generation, core.state.opacity, snapshot))
            }
        };
        let Some((placement, generation, opacity, snapshot)) = started else {
            if expected.is_some() {
                return Err(ControlError::UnresolvedHost);
            }
            return Err(self.fail(kind, url, ControlError::UnresolvedHost, None));
        };
        self.render(&snapshot);

        debug!("Loading {} {} at {}", kind, url, placement.anchor);
        let spec = TransformSpec::from(&placement);
        let group = match self.inner.loader.load(kind, url, &spec).await {
            Ok(group) => group,
            Err(LoadFailure { error, orphan }) => {
                if let Some(orphan) = orphan {
                    self.inner.scene.detach(orphan);
                }
                return Err(self.fail(kind, url, error, Some(generation)));
            }
        };

        if kind == AssetKind::Splat {
            self.inner.scene.set_opacity(group.id(), opacity);
        }

        self.commit(kind, url, placement, opacity, group, generation)
    }

    /// Register a freshly attached group and announce it.
    fn commit(
        &self,
        kind: AssetKind,
        url: &str,
        placement: Placement,
        opacity: f64,
        group: NodeHandle,
        generation: u64,
    ) -> Result<String> {
        let committed = {
            let mut core = self.inner.core.lock();
            if !core.is_live(generation) {
                Err((ControlError::UnresolvedHost, group))
            } else {
                let id = core.registry.allocate(kind);
                let mut record = AssetRecord::new(&id, kind, url, placement.anchor, group);
                if kind == AssetKind::Splat {
                    record.opacity = opacity;
                }
                match core.registry.insert(record) {
                    Err((e, record)) => Err((e, record.into_group())),
                    Ok(()) => {
                        let layer_count = core.registry.count();
                        let snapshot = core.transition(StateTransition::LoadSucceeded {
                            kind,
                            id: id.clone(),
                            layer_count,
                        });
                        let fly = core.options.fly_to.then(|| FlyTo {
                            center: LngLat {
                                lng: placement.anchor.longitude,
                                lat: placement.anchor.latitude,
                            },
                            zoom: core.options.fly_to_zoom,
                            pitch: FLY_TO_PITCH,
                            duration_ms: FLY_TO_DURATION_MS,
                        });
                        Ok((id, snapshot, core.map.clone(), fly))
                    }
                }
            }
        };

        let (id, snapshot, map, fly) = match committed {
            Ok(c) => c,
            Err((ControlError::UnresolvedHost, group)) => {
                warn!("{} {} finished loading after unmount; discarding", kind, url);
                self.inner.scene.detach(group);
                return Err(ControlError::UnresolvedHost);
            }
            Err((error, group)) => {
                self.inner.scene.detach(group);
                return Err(self.fail(kind, url, error, Some(generation)));
            }
        };

        if let Some(map) = map {
            map.trigger_repaint();
            if let Some(fly) = fly {
                map.fly_to(fly);
            }
        }

        info!("Loaded {} {} from {}", kind, id, url);
        self.render(&snapshot);
        self.inner.events.emit(
            &ControlEvent::new(EventKind::load_for(kind), snapshot)
                .with_url(url)
                .with_asset(kind, &id),
        );
        Ok(id)
    }

    /// Record a failed load and emit `error`. Returns the error to hand back
    /// to the caller.
    ///
    /// With `Some(generation)` the state is only touched (and the event only
    /// emitted) if the control is still mounted under that generation; the
    /// caller gets the error either way.
    fn fail(
        &self,
        kind: AssetKind,
        url: &str,
        error: ControlError,
        generation: Option<u64>,
    ) -> ControlError {
        let message = error.to_string();
        let snapshot = {
            let mut core = self.inner.core.lock();
            match generation {
                Some(g) if !core.is_live(g) => None,
                _ => Some(core.transition(StateTransition::LoadFailed {
                    message: message.clone(),
                })),
            }
        };

        let Some(snapshot) = snapshot else {
            warn!("{} {} failed after unmount: {}", kind, url, message);
            return error;
        };

        warn!("Failed to load {} {}: {}", kind, url, message);
        self.render(&snapshot);
        self.inner.events.emit(
            &ControlEvent::new(EventKind::Error, snapshot)
                .with_url(url)
                .with_error(message),
        );
        error
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Remove a splat. Unknown ids (or an unmounted control) are ignored.
    pub fn remove_splat(&self, id: &str) {
        self.remove(AssetKind::Splat, id);
    }

    /// Remove a model. Unknown ids (or an unmounted control) are ignored.
    pub fn remove_model(&self, id: &str) {
        self.remove(AssetKind::Model, id);
    }

    pub fn remove_all_splats(&self) {
        for id in self.ids(Some(AssetKind::Splat)) {
            self.remove_splat(&id);
        }
    }

    pub fn remove_all_models(&self) {
        for id in self.ids(Some(AssetKind::Model)) {
            self.remove_model(&id);
        }
    }

    /// Remove every asset of both kinds.
    pub fn remove_all(&self) {
        self.remove_all_splats();
        self.remove_all_models();
    }

    fn remove(&self, kind: AssetKind, id: &str) -> bool {
        let removed = {
            let mut core = self.inner.core.lock();
            let matches = core.registry.get(id).is_some_and(|r| r.kind == kind);
            if core.map.is_none() || !matches {
                None
            } else if let Some(record) = core.registry.remove(id) {
                let layer_count = core.registry.count();
                let snapshot = core.transition(StateTransition::LayerRemoved { layer_count });
                Some((record.into_group(), snapshot))
            } else {
                None
            }
        };

        let Some((group, snapshot)) = removed else {
            return false;
        };

        self.released(kind, id, group, &snapshot);
        true
    }

    /// Detach a group that just left the registry and announce it.
    fn released(&self, kind: AssetKind, id: &str, group: NodeHandle, snapshot: &ControlState) {
        self.inner.scene.detach(group);
        info!("Removed {} {}", kind, id);
        self.render(snapshot);
        self.inner.events.emit(
            &ControlEvent::new(EventKind::remove_for(kind), snapshot.clone()).with_asset(kind, id),
        );
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn ids(&self, kind: Option<AssetKind>) -> Vec<String> {
        self.inner.core.lock().registry.list(kind)
    }

    fn info(&self, kind: AssetKind, id: &str) -> Option<AssetInfo> {
        let core = self.inner.core.lock();
        core.registry
            .get(id)
            .filter(|r| r.kind == kind)
            .map(AssetRecord::info)
    }

    pub fn get_splat_ids(&self) -> Vec<String> {
        self.ids(Some(AssetKind::Splat))
    }

    pub fn get_splat_info(&self, id: &str) -> Option<AssetInfo> {
        self.info(AssetKind::Splat, id)
    }

    pub fn get_model_ids(&self) -> Vec<String> {
        self.ids(Some(AssetKind::Model))
    }

    pub fn get_model_info(&self, id: &str) -> Option<AssetInfo> {
        self.info(AssetKind::Model, id)
    }

    /// Every asset id of both kinds, in load order.
    pub fn get_layer_ids(&self) -> Vec<String> {
        self.ids(None)
    }

    /// Every asset with its current visibility and opacity, in load order.
    pub fn layers(&self) -> Vec<LayerInfo> {
        let core = self.inner.core.lock();
        core.registry
            .iter()
            .map(|r| LayerInfo {
                id: r.id.clone(),
                kind: r.kind,
                name: file_name(&r.source_url).to_string(),
                url: r.source_url.clone(),
                visible: r.visible,
                opacity: r.opacity,
            })
            .collect()
    }

    /// Copy of the current state. Mutating it has no effect on the control.
    pub fn get_state(&self) -> ControlState {
        self.inner.core.lock().state.clone()
    }

    pub fn get_options(&self) -> ControlOptions {
        self.inner.core.lock().options.clone()
    }

    // -----------------------------------------------------------------------
    // Visibility / opacity
    // -----------------------------------------------------------------------

    /// Show or hide an asset. Emits `show`/`hide` only when the visibility
    /// actually changes. Returns `false` for unknown ids.
    pub fn set_layer_visible(&self, id: &str, visible: bool) -> bool {
        let changed = {
            let mut core = self.inner.core.lock();
            let Some(record) = core.registry.get_mut(id) else {
                return false;
            };
            if record.visible == visible {
                None
            } else {
                record.visible = visible;
                let (kind, node) = (record.kind, record.group().id());
                Some((kind, node, core.state.clone()))
            }
        };

        if let Some((kind, node, snapshot)) = changed {
            self.inner.scene.set_visible(node, visible);
            let event = if visible {
                EventKind::Show
            } else {
                EventKind::Hide
            };
            self.inner
                .events
                .emit(&ControlEvent::new(event, snapshot).with_asset(kind, id));
        }
        true
    }

    /// Set an asset's opacity, clamped to `[0, 1]`. Returns `false` for
    /// unknown ids.
    pub fn set_layer_opacity(&self, id: &str, opacity: f64) -> bool {
        let opacity = opacity.clamp(0.0, 1.0);
        let node = {
            let mut core = self.inner.core.lock();
            let Some(record) = core.registry.get_mut(id) else {
                return false;
            };
            record.opacity = opacity;
            record.group().id()
        };
        self.inner.scene.set_opacity(node, opacity);
        true
    }

    // -----------------------------------------------------------------------
    // Panel
    // -----------------------------------------------------------------------

    /// Expand the panel. No-op (and no event) when already expanded.
    pub fn expand(&self) {
        self.set_collapsed(false);
    }

    /// Collapse the panel. No-op (and no event) when already collapsed.
    pub fn collapse(&self) {
        self.set_collapsed(true);
    }

    pub fn toggle(&self) {
        let collapsed = self.inner.core.lock().state.collapsed;
        self.set_collapsed(!collapsed);
    }

    fn set_collapsed(&self, collapsed: bool) {
        let snapshot = {
            let mut core = self.inner.core.lock();
            if core.state.collapsed == collapsed {
                return;
            }
            core.transition(if collapsed {
                StateTransition::Collapse
            } else {
                StateTransition::Expand
            })
        };

        self.render(&snapshot);
        let kind = if collapsed {
            EventKind::Collapse
        } else {
            EventKind::Expand
        };
        self.inner.events.emit(&ControlEvent::new(kind, snapshot));
    }

    /// Merge `patch` into the options. A present `collapsed` is applied to the
    /// panel immediately, without an expand/collapse event.
    pub fn update(&self, patch: ControlOptionsPatch) {
        let collapsed = patch.collapsed;
        let (options, snapshot) = {
            let mut core = self.inner.core.lock();
            core.options.merge(patch);
            if let Some(collapsed) = collapsed {
                core.state.apply(if collapsed {
                    StateTransition::Collapse
                } else {
                    StateTransition::Expand
                });
            }
            (core.options.clone(), core.state.clone())
        };

        if let Some(view) = &self.inner.view {
            if self.is_mounted() {
                view.mount(&options);
            }
            view.render(&snapshot);
        }
    }

    /// Apply form edits coming from the panel.
    pub fn edit_form(&self, edit: FormEdit) {
        let snapshot = self
            .inner
            .core
            .lock()
            .transition(StateTransition::FormEdited(edit));
        self.render(&snapshot);
    }

    /// Copy the host map's view center into the form's longitude/latitude.
    pub fn use_map_center(&self) -> Result<LngLat> {
        let map = self
            .inner
            .core
            .lock()
            .map
            .clone()
            .ok_or(ControlError::UnresolvedHost)?;
        let center = map.center();
        self.edit_form(FormEdit {
            longitude: Some(center.lng),
            latitude: Some(center.lat),
            ..Default::default()
        });
        Ok(center)
    }

    fn render(&self, state: &ControlState) {
        if let Some(view) = &self.inner.view {
            view.render(state);
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ControlEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    /// Unsubscribe. Unknown handlers are ignored.
    pub fn off(&self, kind: EventKind, id: HandlerId) {
        self.inner.events.off(kind, id);
    }
}

fn file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::file_name;

    #[test]
    fn file_name_strips_path_and_query() {
        assert_eq!(file_name("https://x/data/garden.spz?v=2"), "garden.spz");
        assert_eq!(file_name("garden.ply"), "garden.ply");
        assert_eq!(file_name("https://x/dir/"), "dir");
    }
}
