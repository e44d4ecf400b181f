//! End-to-end controller behavior against a scripted in-memory backend.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc, RwLock};
use tunehub_core::catalog::{Station, StationCatalog, StationRef};
use tunehub_core::config::ResolverConfig;
use tunehub_core::error::{ControlError, ControlResult};
use tunehub_core::history::TrackRecord;
use tunehub_core::protocol::{Event, RunState};
use tunehub_daemon::backend::{Backend, Zone};
use tunehub_daemon::controller::{CycleDirection, PlaybackController, VOLUME_STEP};
use tunehub_daemon::sleep::CancelOutcome;

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    volume: u8,
    now_playing: TrackRecord,
}

struct MockBackend {
    state: Mutex<MockState>,
    transient_ok: bool,
    native_sleep: bool,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                volume: 50,
                ..Default::default()
            }),
            transient_ok: true,
            native_sleep: false,
        }
    }

    fn multi_zone() -> Self {
        Self {
            transient_ok: false,
            native_sleep: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn supports_transient_streams(&self) -> bool {
        self.transient_ok
    }

    fn has_native_sleep(&self) -> bool {
        self.native_sleep
    }

    async fn list_zones(&self) -> ControlResult<Vec<Zone>> {
        Ok(vec![
            Zone { name: "Z1".into(), address: "10.0.0.1".into() },
            Zone { name: "Z2".into(), address: "10.0.0.2".into() },
        ])
    }

    async fn play(&self, zone: &Zone, stream_url: &str, _title: &str) -> ControlResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("play {} {}", zone.name, stream_url));
        Ok(())
    }

    async fn stop(&self, zone: &Zone) -> ControlResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("stop {}", zone.name));
        Ok(())
    }

    async fn set_volume(&self, zone: &Zone, percent: u8) -> ControlResult<()> {
        let mut s = self.state.lock().unwrap();
        s.volume = percent;
        s.calls.push(format!("volume {} {}", zone.name, percent));
        Ok(())
    }

    async fn get_volume(&self, _zone: &Zone) -> ControlResult<u8> {
        Ok(self.state.lock().unwrap().volume)
    }

    async fn set_sleep_timer(&self, zone: &Zone, seconds: u64) -> ControlResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("sleep {} {}", zone.name, seconds));
        Ok(())
    }

    async fn now_playing(&self, _zone: &Zone) -> ControlResult<TrackRecord> {
        Ok(self.state.lock().unwrap().now_playing.clone())
    }
}

fn catalog() -> Arc<RwLock<StationCatalog>> {
    Arc::new(RwLock::new(StationCatalog::new(vec![
        Station { name: "A".into(), url: "http://a".into() },
        Station { name: "B".into(), url: "http://b".into() },
    ])))
}

struct Harness {
    backend: Arc<MockBackend>,
    controller: Arc<PlaybackController>,
    events: broadcast::Receiver<Event>,
    _sleep_rx: mpsc::Receiver<tunehub_daemon::sleep::SleepFired>,
}

async fn harness_with(backend: MockBackend, resolver: ResolverConfig) -> Harness {
    let backend = Arc::new(backend);
    let (event_tx, events) = broadcast::channel(64);
    let (sleep_tx, sleep_rx) = mpsc::channel(8);
    let controller = Arc::new(PlaybackController::new(
        backend.clone(),
        catalog(),
        resolver,
        event_tx,
        sleep_tx,
    ));
    controller.reload_zones().await.unwrap();
    Harness {
        backend,
        controller,
        events,
        _sleep_rx: sleep_rx,
    }
}

async fn harness() -> Harness {
    harness_with(MockBackend::new(), ResolverConfig::default()).await
}

#[tokio::test]
async fn play_by_name_updates_state_and_emits_event() {
    let mut h = harness().await;

    let snap = h
        .controller
        .play(&StationRef::Name("A".into()), Some("Z1"))
        .await
        .unwrap();
    assert_eq!(snap.run_state, RunState::Playing);
    assert_eq!(snap.current_station.unwrap().name, "A");
    assert_eq!(snap.station_idx, Some(0));
    assert_eq!(snap.zone.as_deref(), Some("Z1"));

    match h.events.recv().await.unwrap() {
        Event::Play { station, state, .. } => {
            assert_eq!(station.as_deref(), Some("A"));
            assert_eq!(state, RunState::Playing);
        }
        other => panic!("expected play event, got {:?}", other),
    }
    // Indicator follows the play event.
    assert!(matches!(
        h.events.recv().await.unwrap(),
        Event::Indicator { station_idx: 0, .. }
    ));
}

#[tokio::test]
async fn play_by_numeric_index_resolves_station() {
    let h = harness().await;
    let snap = h
        .controller
        .play(&StationRef::parse("1"), Some("Z1"))
        .await
        .unwrap();
    assert_eq!(snap.current_station.unwrap().name, "B");
}

#[tokio::test]
async fn unknown_station_and_zone_are_reported() {
    let h = harness().await;
    assert!(matches!(
        h.controller
            .play(&StationRef::Name("nope".into()), Some("Z1"))
            .await,
        Err(ControlError::UnknownStation(_))
    ));
    assert!(matches!(
        h.controller
            .play(&StationRef::Index(0), Some("Attic"))
            .await,
        Err(ControlError::ZoneNotFound(_))
    ));
}

#[tokio::test]
async fn station_up_cycles_and_reuses_zone() {
    let h = harness().await;
    h.controller
        .play(&StationRef::Name("A".into()), Some("Z2"))
        .await
        .unwrap();

    let snap = h
        .controller
        .cycle_station(CycleDirection::Up, None)
        .await
        .unwrap();
    assert_eq!(snap.current_station.unwrap().name, "B");
    assert_eq!(snap.zone.as_deref(), Some("Z2"));

    // Wraps from the last station back to the first.
    let snap = h
        .controller
        .cycle_station(CycleDirection::Up, None)
        .await
        .unwrap();
    assert_eq!(snap.current_station.unwrap().name, "A");
}

#[tokio::test]
async fn station_cycle_honors_explicit_zone() {
    let h = harness().await;
    h.controller
        .play(&StationRef::Name("A".into()), Some("Z1"))
        .await
        .unwrap();

    let snap = h
        .controller
        .cycle_station(CycleDirection::Up, Some("Z2"))
        .await
        .unwrap();
    assert_eq!(snap.current_station.unwrap().name, "B");
    assert_eq!(snap.zone.as_deref(), Some("Z2"));
    assert!(h.backend.calls().contains(&"play Z2 http://b".to_string()));
}

#[tokio::test]
async fn cycle_on_empty_catalog_fails_cleanly() {
    let h = harness().await;
    h.controller
        .play(&StationRef::Name("A".into()), Some("Z1"))
        .await
        .unwrap();
    {
        let catalog_handle = h.controller_catalog();
        let mut catalog = catalog_handle.write().await;
        catalog.replace(Vec::new());
    }
    assert!(matches!(
        h.controller.cycle_station(CycleDirection::Up, None).await,
        Err(ControlError::UnknownStation(_))
    ));
}

#[tokio::test]
async fn volume_is_clamped_before_dispatch() {
    let h = harness().await;
    let v = h.controller.set_volume(Some("Z1"), 150).await.unwrap();
    assert_eq!(v, 100);
    let v = h.controller.set_volume(Some("Z1"), -20).await.unwrap();
    assert_eq!(v, 0);
    // The backend only ever saw in-range values.
    for call in h.backend.calls() {
        if let Some(rest) = call.strip_prefix("volume Z1 ") {
            let v: u8 = rest.parse().unwrap();
            assert!(v <= 100);
        }
    }
}

#[tokio::test]
async fn volume_steps_read_then_write() {
    let h = harness().await;
    let v = h.controller.step_volume(Some("Z1"), VOLUME_STEP).await.unwrap();
    assert_eq!(v, 55);
    let v = h.controller.step_volume(Some("Z1"), -VOLUME_STEP).await.unwrap();
    assert_eq!(v, 50);
    // Clamps at the rails.
    h.controller.set_volume(Some("Z1"), 98).await.unwrap();
    let v = h.controller.step_volume(Some("Z1"), VOLUME_STEP).await.unwrap();
    assert_eq!(v, 100);
}

#[tokio::test]
async fn failed_stream_resolution_leaves_state_unchanged() {
    let resolver = ResolverConfig {
        ytdlp_binary: Some(PathBuf::from("/nonexistent/yt-dlp")),
        timeout_secs: 1,
    };
    let h = harness_with(MockBackend::new(), resolver).await;
    {
        let catalog_handle = h.controller_catalog();
        let mut catalog = catalog_handle.write().await;
        catalog.replace(vec![Station {
            name: "Tube".into(),
            url: "https://youtu.be/abc123".into(),
        }]);
    }

    let err = h
        .controller
        .play(&StationRef::Name("Tube".into()), Some("Z1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::StreamResolutionFailed(_)));

    let snap = h.controller.state_snapshot().await;
    assert_eq!(snap.run_state, RunState::Stopped);
    assert!(snap.current_station.is_none());
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn failed_resolution_while_playing_keeps_current_station() {
    let resolver = ResolverConfig {
        ytdlp_binary: Some(PathBuf::from("/nonexistent/yt-dlp")),
        timeout_secs: 1,
    };
    let h = harness_with(MockBackend::new(), resolver).await;
    {
        let catalog_handle = h.controller_catalog();
        let mut catalog = catalog_handle.write().await;
        catalog.replace(vec![
            Station { name: "A".into(), url: "http://a".into() },
            Station { name: "Tube".into(), url: "https://youtu.be/abc123".into() },
        ]);
    }

    h.controller
        .play(&StationRef::Name("A".into()), Some("Z1"))
        .await
        .unwrap();

    let err = h
        .controller
        .play(&StationRef::Name("Tube".into()), Some("Z1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::StreamResolutionFailed(_)));

    // Still playing the station from before the failed switch.
    let snap = h.controller.state_snapshot().await;
    assert_eq!(snap.run_state, RunState::Playing);
    assert_eq!(snap.current_station.unwrap().name, "A");
    assert_eq!(
        h.backend.calls(),
        vec!["play Z1 http://a".to_string()]
    );
}

#[tokio::test]
async fn transient_stream_is_rejected_on_multi_zone_backend() {
    let h = harness_with(MockBackend::multi_zone(), ResolverConfig::default()).await;
    {
        let catalog_handle = h.controller_catalog();
        let mut catalog = catalog_handle.write().await;
        catalog.replace(vec![Station {
            name: "Tube".into(),
            url: "https://www.youtube.com/watch?v=abc".into(),
        }]);
    }
    let err = h
        .controller
        .play(&StationRef::Index(0), Some("Z1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::UnsupportedStream(_)));
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn sleep_then_cancel_reports_cancelled_then_not_pending() {
    let h = harness().await;
    h.controller
        .play(&StationRef::Name("A".into()), Some("Z1"))
        .await
        .unwrap();

    h.controller.sleep(1).await.unwrap();
    assert!(h.controller.sleep_pending().await);

    assert_eq!(
        h.controller.sleep_cancel().await.unwrap(),
        CancelOutcome::Cancelled
    );
    assert_eq!(
        h.controller.sleep_cancel().await.unwrap(),
        CancelOutcome::NotPending
    );
}

#[tokio::test]
async fn stop_cancels_pending_sleep_timer() {
    let h = harness().await;
    h.controller
        .play(&StationRef::Name("A".into()), Some("Z1"))
        .await
        .unwrap();
    h.controller.sleep(1).await.unwrap();

    h.controller.stop(None).await.unwrap();
    assert!(!h.controller.sleep_pending().await);
    assert_eq!(
        h.controller.sleep_cancel().await.unwrap(),
        CancelOutcome::NotPending
    );
}

#[tokio::test]
async fn sleep_rejects_invalid_duration_and_stopped_state() {
    let h = harness().await;
    assert!(matches!(
        h.controller.sleep(5).await,
        Err(ControlError::InvalidState(_))
    ));
    h.controller
        .play(&StationRef::Name("A".into()), Some("Z1"))
        .await
        .unwrap();
    assert!(matches!(
        h.controller.sleep(0).await,
        Err(ControlError::InvalidDuration(_))
    ));
}

#[tokio::test]
async fn native_sleep_backend_arms_and_cancels_via_backend() {
    let h = harness_with(MockBackend::multi_zone(), ResolverConfig::default()).await;
    h.controller
        .play(&StationRef::Name("A".into()), Some("Z1"))
        .await
        .unwrap();

    h.controller.sleep(2).await.unwrap();
    assert!(h.backend.calls().contains(&"sleep Z1 120".to_string()));

    assert_eq!(
        h.controller.sleep_cancel().await.unwrap(),
        CancelOutcome::Cancelled
    );
    assert!(h.backend.calls().contains(&"sleep Z1 0".to_string()));
}

#[tokio::test]
async fn stop_keeps_station_for_later_cycling() {
    let h = harness().await;
    h.controller
        .play(&StationRef::Name("B".into()), Some("Z1"))
        .await
        .unwrap();
    let snap = h.controller.stop(None).await.unwrap();
    assert_eq!(snap.run_state, RunState::Stopped);
    assert_eq!(snap.current_station.unwrap().name, "B");

    let snap = h
        .controller
        .cycle_station(CycleDirection::Up, None)
        .await
        .unwrap();
    assert_eq!(snap.current_station.unwrap().name, "A");
}

impl Harness {
    fn controller_catalog(&self) -> Arc<RwLock<StationCatalog>> {
        self.controller.catalog_handle()
    }
}
