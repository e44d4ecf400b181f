use async_trait::async_trait;
use tunehub_core::error::ControlResult;
use tunehub_core::history::TrackRecord;

/// An addressable playback output: a speaker (group) for the multi-zone
/// backend, or the single implicit endpoint of the local media daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: String,
    /// Opaque backend handle — a device IP for sonos, a fixed marker for mpd.
    pub address: String,
}

/// Capability surface shared by both backends. Selected once at startup and
/// dispatched through `Arc<dyn Backend>`; no per-call backend branching
/// anywhere else. Every failure is non-fatal and surfaced as `ControlError`.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend can carry expiring streaming-service URLs
    /// (after just-in-time resolution).
    fn supports_transient_streams(&self) -> bool;

    /// Whether the backend has its own per-zone sleep timer. When false the
    /// shared SleepTimer component schedules the delayed stop.
    fn has_native_sleep(&self) -> bool;

    async fn list_zones(&self) -> ControlResult<Vec<Zone>>;

    async fn play(&self, zone: &Zone, stream_url: &str, title: &str) -> ControlResult<()>;

    async fn stop(&self, zone: &Zone) -> ControlResult<()>;

    /// Absolute volume, 0–100. Callers clamp before dispatch; backends may
    /// clamp again.
    async fn set_volume(&self, zone: &Zone, percent: u8) -> ControlResult<()>;

    async fn get_volume(&self, zone: &Zone) -> ControlResult<u8>;

    /// Arm (or with `seconds == 0` clear) the backend's native sleep timer.
    async fn set_sleep_timer(&self, zone: &Zone, seconds: u64) -> ControlResult<()>;

    /// Current track metadata. Fields may be partial; `station` is filled in
    /// by the caller when the backend reports none.
    async fn now_playing(&self, zone: &Zone) -> ControlResult<TrackRecord>;
}
