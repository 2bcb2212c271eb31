//! Mount / unmount, deferred default load and late completions

#[cfg(test)]
mod tests {
    use geosplat_control::{
        headless::HeadlessRig, ControlError, ControlEvent, ControlOptions, DecoderError,
        EventKind, SplatControl,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn unmounted(options: ControlOptions) -> (SplatControl, HeadlessRig) {
        let rig = HeadlessRig::new();
        let control = SplatControl::new(options, rig.collaborators());
        (control, rig)
    }

    fn with_default_url(url: &str) -> ControlOptions {
        ControlOptions {
            default_url: Some(url.to_string()),
            load_default_url: true,
            ..Default::default()
        }
    }

    fn channel(control: &SplatControl) -> mpsc::UnboundedReceiver<ControlEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in EventKind::ALL {
            let tx = tx.clone();
            control.on(kind, move |e| {
                let _ = tx.send(e.clone());
            });
        }
        rx
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_for_model_requests(rig: &HeadlessRig, count: usize) {
        for _ in 0..100 {
            if rig.decoders.model_requests() == count {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(rig.decoders.model_requests(), count);
    }

    /// Start a held `load_model` on its own task and wait until the decoder
    /// has been asked for it.
    async fn spawn_held_model(
        control: &SplatControl,
        rig: &HeadlessRig,
        url: &'static str,
    ) -> tokio::task::JoinHandle<Result<String, ControlError>> {
        rig.decoders.hold_models();
        let task = {
            let control = control.clone();
            tokio::spawn(async move { control.load_model(url, None).await })
        };
        wait_for_model_requests(rig, 1).await;
        task
    }

    fn record_kinds(control: &SplatControl) -> Arc<Mutex<Vec<EventKind>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let events = events.clone();
            control.on(kind, move |e| events.lock().push(e.kind));
        }
        events
    }

    // -----------------------------------------------------------------------
    // Mount / unmount
    // -----------------------------------------------------------------------

    #[test]
    fn mount_connects_scene_and_panel() {
        let (control, rig) = unmounted(ControlOptions::default());
        assert!(!control.is_mounted());

        assert_ok!(control.on_add(rig.host()));

        assert!(control.is_mounted());
        assert!(rig.scene.is_connected());
        assert_eq!(rig.scene.light_count(), 2);
        assert!(rig.view.is_mounted());
        assert_eq!(rig.view.last_rendered(), Some(control.get_state()));
    }

    #[test]
    fn second_mount_is_ignored() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();
        let renders = rig.view.render_count();

        assert_ok!(control.on_add(rig.host()));
        assert_eq!(rig.view.render_count(), renders);
    }

    #[tokio::test]
    async fn unmount_removes_every_asset() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();
        control.load("https://x/a.spz", None).await.unwrap();
        control.load("https://x/b.glb", None).await.unwrap();
        let mut rx = channel(&control);

        control.on_remove();

        assert!(!control.is_mounted());
        assert!(control.get_layer_ids().is_empty());
        assert_eq!(rig.scene.live_node_count(), 0);
        assert!(!rig.scene.is_connected());
        assert_eq!(rig.scene.light_count(), 0);
        assert!(!rig.view.is_mounted());

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(
            (first.kind, second.kind),
            (EventKind::SplatRemove, EventKind::ModelRemove)
        );
        assert!(!second.state.has_layer);
    }

    #[tokio::test]
    async fn operations_after_unmount_are_ignored() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();
        control.on_remove();
        control.on_remove();

        control.remove_splat("splat-1");
        control.remove_all();
        let err = assert_err!(control.load("https://x/a.spz", None).await);
        assert_eq!(err, ControlError::UnresolvedHost);
    }

    #[tokio::test]
    async fn remount_keeps_id_sequence() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();
        control.load("https://x/a.spz", None).await.unwrap();
        control.on_remove();

        control.on_add(rig.host()).unwrap();
        let id = control.load("https://x/a.spz", None).await.unwrap();
        assert_eq!(id, "splat-2");
        assert_eq!(rig.scene.light_count(), 2);
    }

    #[test]
    fn frames_trigger_map_repaints_while_mounted() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();

        rig.scene.render_frame();
        rig.scene.render_frame();
        assert_eq!(rig.map.repaint_count(), 2);

        control.on_remove();
        rig.scene.render_frame();
        assert_eq!(rig.map.repaint_count(), 2);
    }

    #[tokio::test]
    async fn successful_load_requests_a_repaint() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();

        control.load("https://x/a.spz", None).await.unwrap();
        assert_eq!(rig.map.repaint_count(), 1);
    }

    // -----------------------------------------------------------------------
    // Deferred default load
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn default_url_loads_once_map_is_idle() {
        let (control, rig) = unmounted(with_default_url("a.splat"));
        let mut rx = channel(&control);
        control.on_add(rig.host()).unwrap();

        settle().await;
        assert!(rx.try_recv().is_err(), "nothing loads before idle");

        rig.map.fire_idle();
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.kind, EventKind::SplatLoad);
        assert_eq!(event.url.as_deref(), Some("a.splat"));
        assert!(event.state.has_layer);
        assert_eq!(control.get_splat_ids(), vec!["splat-1"]);

        settle().await;
        assert!(rx.try_recv().is_err(), "default load runs only once");
    }

    #[tokio::test]
    async fn default_model_url_goes_through_model_pipeline() {
        let (control, rig) = unmounted(with_default_url("https://x/site.glb"));
        let mut rx = channel(&control);
        control.on_add(rig.host()).unwrap();
        rig.map.fire_idle();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventKind::ModelLoad);
        assert_eq!(event.model_id.as_deref(), Some("model-1"));
    }

    #[tokio::test]
    async fn unmount_before_idle_cancels_default_load() {
        let (control, rig) = unmounted(with_default_url("a.splat"));
        let mut rx = channel(&control);
        control.on_add(rig.host()).unwrap();

        control.on_remove();
        rig.map.fire_idle();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(rig.scene.live_node_count(), 0);
        assert!(control.get_state().error.is_none());
    }

    #[tokio::test]
    async fn unmount_during_default_model_decode_releases_its_group() {
        let (control, rig) = unmounted(with_default_url("https://x/site.glb"));
        rig.decoders.hold_models();
        control.on_add(rig.host()).unwrap();
        rig.map.fire_idle();
        wait_for_model_requests(&rig, 1).await;
        assert_eq!(rig.scene.live_node_count(), 1);

        let events = record_kinds(&control);
        control.on_remove();
        rig.decoders.release_models();

        for _ in 0..100 {
            if rig.scene.live_node_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(rig.scene.live_node_count(), 0);
        assert!(events.lock().is_empty());
        assert!(control.get_model_ids().is_empty());
        assert!(!control.get_state().loading);
    }

    #[tokio::test]
    async fn default_load_needs_the_flag() {
        let (control, rig) = unmounted(ControlOptions {
            default_url: Some("a.splat".into()),
            load_default_url: false,
            ..Default::default()
        });
        control.on_add(rig.host()).unwrap();
        rig.map.fire_idle();
        settle().await;

        assert!(control.get_layer_ids().is_empty());
    }

    #[test]
    fn mount_without_runtime_skips_default_load() {
        let (control, rig) = unmounted(with_default_url("a.splat"));
        assert_ok!(control.on_add(rig.host()));
        assert!(control.get_layer_ids().is_empty());
    }

    // -----------------------------------------------------------------------
    // In-flight loads
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn model_completing_after_unmount_is_discarded() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();
        let events = record_kinds(&control);

        let task = spawn_held_model(&control, &rig, "https://x/late.glb").await;
        assert!(control.get_state().loading);

        control.on_remove();
        let state = control.get_state();
        assert!(!state.loading);
        assert!(state.status.is_none());

        rig.decoders.release_models();

        // The scene is gone, so attaching the late model fails.
        let result = task.await.unwrap();
        assert!(matches!(result, Err(ControlError::SceneFailure { .. })));
        assert!(events.lock().is_empty());
        assert!(control.get_model_ids().is_empty());
        assert_eq!(rig.scene.live_node_count(), 0);
        assert!(control.get_state().error.is_none());
    }

    #[tokio::test]
    async fn completion_after_remount_is_discarded() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();
        let task = spawn_held_model(&control, &rig, "https://x/late.glb").await;

        control.on_remove();
        control.on_add(rig.host()).unwrap();
        let events = record_kinds(&control);
        rig.decoders.release_models();

        assert_eq!(task.await.unwrap(), Err(ControlError::UnresolvedHost));
        assert!(events.lock().is_empty());
        assert!(control.get_model_ids().is_empty());
        assert_eq!(rig.scene.live_node_count(), 0);

        let state = control.get_state();
        assert!(!state.loading);
        assert!(state.status.is_none());
        assert_eq!(rig.view.last_rendered().map(|s| s.loading), Some(false));
    }

    #[tokio::test]
    async fn late_failure_keeps_its_cause() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();
        rig.decoders
            .fail_url("https://x/late.glb", DecoderError::Network("reset".into()));
        let task = spawn_held_model(&control, &rig, "https://x/late.glb").await;
        let events = record_kinds(&control);

        control.on_remove();
        rig.decoders.release_models();

        assert_eq!(
            task.await.unwrap(),
            Err(ControlError::NetworkFailure {
                kind: geosplat_control::AssetKind::Model,
                url: "https://x/late.glb".into(),
                reason: "reset".into(),
            })
        );
        assert!(events.lock().is_empty());
        assert!(control.get_state().error.is_none());
        assert_eq!(rig.scene.live_node_count(), 0);
    }

    #[tokio::test]
    async fn last_completed_load_owns_the_status() {
        let (control, rig) = unmounted(ControlOptions::default());
        control.on_add(rig.host()).unwrap();

        let task = spawn_held_model(&control, &rig, "https://x/slow.glb").await;

        let splat = control.load("https://x/fast.spz", None).await.unwrap();
        let state = control.get_state();
        assert_eq!(state.status.as_deref(), Some("Loaded splat splat-1"));
        assert!(!state.loading);
        assert_eq!(splat, "splat-1");

        rig.decoders.release_models();
        let model = task.await.unwrap().unwrap();
        assert_eq!(model, "model-1");

        let state = control.get_state();
        assert_eq!(state.status.as_deref(), Some("Loaded model model-1"));
        assert_eq!(state.layer_count, 2);
        assert_eq!(control.get_layer_ids(), vec!["splat-1", "model-1"]);
    }
}
