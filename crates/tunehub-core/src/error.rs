use thiserror::Error;

/// Failure taxonomy for the command path. Every variant is non-fatal: the
/// gateway and bus turn these into structured replies, and background loops
/// log them and keep going.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unknown station: {0}")]
    UnknownStation(String),

    #[error("zone not found: {0}")]
    ZoneNotFound(String),

    /// The backend's zone mechanism cannot carry this stream type at all
    /// (e.g. an expiring streaming-service URL on the multi-zone backend).
    #[error("unsupported stream for this backend: {0}")]
    UnsupportedStream(String),

    /// Just-in-time URL extraction failed or timed out.
    #[error("stream resolution failed: {0}")]
    StreamResolutionFailed(String),

    /// The underlying device or daemon call failed.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Station-list or metadata-service fetch failed.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// Command is not valid in the current playback state
    /// (e.g. sleep while stopped).
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl ControlError {
    /// Stable machine-readable kind for wire replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownStation(_) => "unknown_station",
            Self::ZoneNotFound(_) => "zone_not_found",
            Self::UnsupportedStream(_) => "unsupported_stream",
            Self::StreamResolutionFailed(_) => "stream_resolution_failed",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::UpstreamFetch(_) => "upstream_fetch",
            Self::InvalidDuration(_) => "invalid_duration",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
