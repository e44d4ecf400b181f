//! PlaybackController: the single owner of playback state.
//!
//! All command handlers and the polling loop go through the methods here.
//! Shared state lives behind one `RwLock`; backend and network calls are
//! never made while a guard is held — state is snapshotted, the guard
//! dropped, the I/O performed, and the result committed afterwards.

use crate::backend::{Backend, Zone};
use crate::resolver;
use crate::sleep::{CancelOutcome, SleepFired, SleepTimer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::info;
use tunehub_core::catalog::{Station, StationCatalog, StationRef};
use tunehub_core::config::ResolverConfig;
use tunehub_core::error::{ControlError, ControlResult};
use tunehub_core::history::TrackRecord;
use tunehub_core::protocol::{Event, RunState};

/// Step size for the volume-up/volume-down controls.
pub const VOLUME_STEP: i16 = 5;

const INDICATOR_PALETTE: &[&str] = &["#2f9e44", "#1971c2", "#e8590c", "#9c36b5", "#f08c00"];
const INDICATOR_DURATION_MS: u64 = 1500;

#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub current_station: Option<Station>,
    pub station_idx: Option<usize>,
    /// Last-used zone; also the default target when a command omits one.
    pub zone: Option<String>,
    pub run_state: RunState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleDirection {
    Up,
    Down,
}

pub struct PlaybackController {
    backend: Arc<dyn Backend>,
    catalog: Arc<RwLock<StationCatalog>>,
    zones: RwLock<Vec<Zone>>,
    state: RwLock<PlaybackState>,
    sleep: SleepTimer,
    sleep_tx: mpsc::Sender<SleepFired>,
    /// Zone whose native sleep timer is armed, for backends that have one.
    native_sleep_zone: Mutex<Option<Zone>>,
    events: broadcast::Sender<Event>,
    resolver: ResolverConfig,
}

impl PlaybackController {
    pub fn new(
        backend: Arc<dyn Backend>,
        catalog: Arc<RwLock<StationCatalog>>,
        resolver: ResolverConfig,
        events: broadcast::Sender<Event>,
        sleep_tx: mpsc::Sender<SleepFired>,
    ) -> Self {
        Self {
            backend,
            catalog,
            zones: RwLock::new(Vec::new()),
            state: RwLock::new(PlaybackState::default()),
            sleep: SleepTimer::new(),
            sleep_tx,
            native_sleep_zone: Mutex::new(None),
            events,
            resolver,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn catalog_handle(&self) -> Arc<RwLock<StationCatalog>> {
        self.catalog.clone()
    }

    pub async fn state_snapshot(&self) -> PlaybackState {
        self.state.read().await.clone()
    }

    // ── zone registry ─────────────────────────────────────────────────────

    /// Rediscover zones and replace the cache. On failure the cached
    /// registry survives untouched.
    pub async fn reload_zones(&self) -> ControlResult<Vec<Zone>> {
        let discovered = self.backend.list_zones().await?;
        let mut zones = self.zones.write().await;
        *zones = discovered.clone();
        info!("zones: {} known", zones.len());
        Ok(discovered)
    }

    pub async fn zones(&self) -> Vec<Zone> {
        self.zones.read().await.clone()
    }

    pub async fn cached_zone(&self, name: &str) -> Option<Zone> {
        self.zones.read().await.iter().find(|z| z.name == name).cloned()
    }

    /// Named zone from the cache, or the default target when omitted: the
    /// last-used zone, else the first discovered one.
    async fn resolve_zone(&self, zone: Option<&str>) -> ControlResult<Zone> {
        match zone {
            Some(name) => self
                .cached_zone(name)
                .await
                .ok_or_else(|| ControlError::ZoneNotFound(name.to_string())),
            None => {
                let last = self.state.read().await.zone.clone();
                if let Some(name) = last {
                    if let Some(z) = self.cached_zone(&name).await {
                        return Ok(z);
                    }
                }
                self.zones
                    .read()
                    .await
                    .first()
                    .cloned()
                    .ok_or_else(|| ControlError::ZoneNotFound("no zones discovered".into()))
            }
        }
    }

    // ── transport ─────────────────────────────────────────────────────────

    pub async fn play(
        &self,
        station: &StationRef,
        zone: Option<&str>,
    ) -> ControlResult<PlaybackState> {
        let zone = self.resolve_zone(zone).await?;
        let (idx, station) = self.catalog.read().await.resolve(station)?;

        let mut url = station.url.clone();
        if resolver::needs_resolution(&url) {
            if !self.backend.supports_transient_streams() {
                return Err(ControlError::UnsupportedStream(url));
            }
            // Bounded extraction; failure aborts with state unchanged.
            url = resolver::resolve_stream_url(&self.resolver, &url).await?;
        }

        self.backend.play(&zone, &url, &station.name).await?;

        let snapshot = {
            let mut state = self.state.write().await;
            state.current_station = Some(station.clone());
            state.station_idx = Some(idx);
            state.zone = Some(zone.name.clone());
            state.run_state = RunState::Playing;
            state.clone()
        };
        info!("play: {} on {}", station.name, zone.name);

        self.emit(Event::Play {
            station: Some(station.name.clone()),
            station_idx: Some(idx),
            zone: Some(zone.name),
            state: RunState::Playing,
        });
        self.emit(Event::Indicator {
            station_idx: idx,
            color: INDICATOR_PALETTE[idx % INDICATOR_PALETTE.len()].to_string(),
            duration_ms: INDICATOR_DURATION_MS,
        });
        Ok(snapshot)
    }

    pub async fn stop(&self, zone: Option<&str>) -> ControlResult<PlaybackState> {
        let zone = self.resolve_zone(zone).await?;
        self.backend.stop(&zone).await?;

        // A pending delayed stop is moot once stopped.
        let _ = self.sleep.cancel().await;
        self.native_sleep_zone.lock().await.take();

        let snapshot = {
            let mut state = self.state.write().await;
            state.run_state = RunState::Stopped;
            state.clone()
        };
        info!("stop: {}", zone.name);

        self.emit(Event::Play {
            station: snapshot.current_station.as_ref().map(|s| s.name.clone()),
            station_idx: snapshot.station_idx,
            zone: Some(zone.name),
            state: RunState::Stopped,
        });
        Ok(snapshot)
    }

    /// Step to the adjacent station. An explicit zone wins; otherwise the
    /// last-used zone carries over.
    pub async fn cycle_station(
        &self,
        direction: CycleDirection,
        zone: Option<&str>,
    ) -> ControlResult<PlaybackState> {
        let (current, last_zone) = {
            let state = self.state.read().await;
            (
                state
                    .current_station
                    .as_ref()
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
                state.zone.clone(),
            )
        };

        let target = {
            let catalog = self.catalog.read().await;
            match direction {
                CycleDirection::Up => catalog.next(&current),
                CycleDirection::Down => catalog.previous(&current),
            }
        };

        let Some((idx, _)) = target else {
            return Err(ControlError::UnknownStation("catalog is empty".into()));
        };
        let zone = zone.map(str::to_string).or(last_zone);
        self.play(&StationRef::Index(idx), zone.as_deref()).await
    }

    // ── volume ────────────────────────────────────────────────────────────

    /// Absolute set, clamped to 0–100 before dispatch regardless of what the
    /// backend itself would tolerate.
    pub async fn set_volume(&self, zone: Option<&str>, value: i64) -> ControlResult<u8> {
        let zone = self.resolve_zone(zone).await?;
        let clamped = value.clamp(0, 100) as u8;
        self.backend.set_volume(&zone, clamped).await?;
        self.emit(Event::Volume {
            zone: zone.name,
            volume: clamped,
        });
        Ok(clamped)
    }

    pub async fn get_volume(&self, zone: Option<&str>) -> ControlResult<u8> {
        let zone = self.resolve_zone(zone).await?;
        self.backend.get_volume(&zone).await
    }

    /// Relative step: read current volume, apply the delta, clamp, write.
    pub async fn step_volume(&self, zone: Option<&str>, delta: i16) -> ControlResult<u8> {
        let zone = self.resolve_zone(zone).await?;
        let current = self.backend.get_volume(&zone).await? as i16;
        let next = (current + delta).clamp(0, 100) as u8;
        self.backend.set_volume(&zone, next).await?;
        self.emit(Event::Volume {
            zone: zone.name,
            volume: next,
        });
        Ok(next)
    }

    // ── sleep timer ───────────────────────────────────────────────────────

    /// Schedule a delayed stop. Valid only while playing; uses the
    /// backend's native timer when it has one, the shared SleepTimer
    /// otherwise.
    pub async fn sleep(&self, minutes: u64) -> ControlResult<()> {
        if minutes == 0 {
            return Err(ControlError::InvalidDuration(
                "sleep requires at least one minute".into(),
            ));
        }
        if self.state.read().await.run_state != RunState::Playing {
            return Err(ControlError::InvalidState(
                "sleep is only valid while playing".into(),
            ));
        }

        let zone = self.resolve_zone(None).await?;
        if self.backend.has_native_sleep() {
            self.backend
                .set_sleep_timer(&zone, minutes * 60)
                .await?;
            *self.native_sleep_zone.lock().await = Some(zone);
        } else {
            self.sleep
                .schedule(
                    Duration::from_secs(minutes * 60),
                    Some(zone.name),
                    self.sleep_tx.clone(),
                )
                .await;
        }
        info!("sleep: stopping in {} minutes", minutes);
        Ok(())
    }

    pub async fn sleep_cancel(&self) -> ControlResult<CancelOutcome> {
        if self.sleep.cancel().await == CancelOutcome::Cancelled {
            return Ok(CancelOutcome::Cancelled);
        }
        if let Some(zone) = self.native_sleep_zone.lock().await.take() {
            self.backend.set_sleep_timer(&zone, 0).await?;
            return Ok(CancelOutcome::Cancelled);
        }
        Ok(CancelOutcome::NotPending)
    }

    pub async fn sleep_pending(&self) -> bool {
        self.sleep.is_pending().await || self.native_sleep_zone.lock().await.is_some()
    }

    // ── observation ───────────────────────────────────────────────────────

    /// On-demand now-playing query for the command surface. The monitor has
    /// its own polling path.
    pub async fn now_playing(&self, zone: Option<&str>) -> ControlResult<TrackRecord> {
        let zone = self.resolve_zone(zone).await?;
        let mut record = self.backend.now_playing(&zone).await?;
        if record.station.is_empty() {
            if let Some(station) = &self.state.read().await.current_station {
                record.station = station.name.clone();
            }
        }
        Ok(record)
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
