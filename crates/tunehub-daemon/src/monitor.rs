//! NowPlayingMonitor: continuous background polling of the active backend.
//!
//! Every tick the monitor snapshots the shared playback state, skips all
//! work while stopped, and otherwise queries the backend for current track
//! metadata. Distinct observations are appended to the track history and
//! broadcast as `Event::Status`; anything that fails inside a tick is logged
//! and treated as "no change" — the loop never terminates on a bad
//! observation.

use crate::backend::Backend;
use crate::controller::PlaybackController;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tunehub_core::history::{TrackLog, TrackRecord};
use tunehub_core::protocol::{Event, RunState};

pub struct NowPlayingMonitor {
    controller: Arc<PlaybackController>,
    backend: Arc<dyn Backend>,
    log: TrackLog,
    events: broadcast::Sender<Event>,
    interval: Duration,
    last_identity: Option<(String, String)>,
}

impl NowPlayingMonitor {
    pub fn new(
        controller: Arc<PlaybackController>,
        backend: Arc<dyn Backend>,
        log: TrackLog,
        events: broadcast::Sender<Event>,
        interval: Duration,
    ) -> Self {
        // Seed dedup state from the persisted tail so a restart does not
        // duplicate the still-playing track.
        let last_identity = log.last().map(|r| owned_identity(&r));
        Self {
            controller,
            backend,
            log,
            events,
            interval,
            last_identity,
        }
    }

    pub fn start(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("monitor: polling every {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.tick().await {
                    warn!("monitor: tick failed: {}", e);
                }
            }
        })
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        // Snapshot, then drop the guard before any backend I/O.
        let snapshot = self.controller.state_snapshot().await;
        if snapshot.run_state != RunState::Playing {
            return Ok(());
        }
        let Some(zone_name) = snapshot.zone else {
            return Ok(());
        };
        let Some(zone) = self.controller.cached_zone(&zone_name).await else {
            return Ok(());
        };

        let mut record = self.backend.now_playing(&zone).await?;
        if record.station.is_empty() {
            record.station = snapshot
                .current_station
                .map(|s| s.name)
                .unwrap_or_default();
        }

        if should_skip(self.last_identity.as_ref(), &record) {
            return Ok(());
        }

        record.observed_at = Some(Local::now());
        self.log.append(&record).await?;
        self.last_identity = Some(owned_identity(&record));
        debug!("monitor: track change: {}", record.display());

        // Best-effort fanout; a lagging bus subscriber never stalls polling.
        let _ = self.events.send(Event::Status { record });
        Ok(())
    }
}

fn owned_identity(record: &TrackRecord) -> (String, String) {
    let (artist, title) = record.identity();
    (artist.to_string(), title.to_string())
}

/// "No new information" filter: unchanged identity, an empty observation, or
/// a station field that is really a raw stream URL.
fn should_skip(last: Option<&(String, String)>, record: &TrackRecord) -> bool {
    let (artist, title) = record.identity();
    if title.is_empty() {
        return true;
    }
    if record.station.contains("http") {
        return true;
    }
    match last {
        Some((la, lt)) => la == artist && lt == title,
        None => false,
    }
}
