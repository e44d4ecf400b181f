//! Single local media-daemon backend, driven through the `mpc` client.
//!
//! One implicit zone; the zone argument is accepted and ignored so the
//! capability surface matches the multi-zone backend. Now-playing text from
//! `mpc current` is classified through the ordered rule cascade in
//! [`crate::rules`].

use crate::backend::{Backend, Zone};
use crate::rules::{self, Provider, RuleOutcome};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tunehub_core::error::{ControlError, ControlResult};
use tunehub_core::history::TrackRecord;
use tunehub_core::platform;

/// Error marker the daemon emits when the audio subsystem drops out from
/// under it. Seen after ALSA device contention; a service restart clears it.
const AUDIO_FAILURE_MARKER: &str = "Failed to open audio output";

const RESTART_SETTLE_DELAY: Duration = Duration::from_secs(2);

pub const MPD_ZONE_NAME: &str = "mpd";

pub struct MpdBackend {
    mpc: PathBuf,
    audio_restart_cmd: String,
}

impl MpdBackend {
    pub fn new(mpc_override: Option<PathBuf>, audio_restart_cmd: String) -> anyhow::Result<Self> {
        let mpc = match mpc_override {
            Some(path) if path.is_file() => path,
            Some(path) => anyhow::bail!("configured mpc binary not found: {:?}", path),
            None => platform::find_mpc_binary()
                .ok_or_else(|| anyhow::anyhow!("mpc binary not found on PATH"))?,
        };
        Ok(Self {
            mpc,
            audio_restart_cmd,
        })
    }

    fn zone() -> Zone {
        Zone {
            name: MPD_ZONE_NAME.to_string(),
            address: "local".to_string(),
        }
    }

    /// Run `mpc` with the given arguments, returning combined output.
    /// Stderr is folded in because mpc reports playback errors there.
    async fn mpc(&self, args: &[&str]) -> ControlResult<String> {
        let output = tokio::process::Command::new(&self.mpc)
            .args(args)
            .output()
            .await
            .map_err(|e| ControlError::BackendUnavailable(format!("mpc spawn: {e}")))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            text.push('\n');
            text.push_str(stderr.trim());
        }

        if !output.status.success() && !text.contains(AUDIO_FAILURE_MARKER) {
            return Err(ControlError::BackendUnavailable(format!(
                "mpc {:?} exited {}: {}",
                args.first().unwrap_or(&""),
                output.status,
                text.trim()
            )));
        }
        Ok(text)
    }

    /// Audio-subsystem recovery: save volume, restart the daemon's service,
    /// wait for it to settle, restore volume. Caller retries once after.
    async fn recover_audio(&self) {
        warn!("mpd: audio subsystem failure, restarting service");
        let saved_volume = self.read_volume().await.ok();

        let restart = tokio::process::Command::new("sh")
            .args(["-c", &self.audio_restart_cmd])
            .output()
            .await;
        if let Err(e) = restart {
            warn!("mpd: restart command failed: {}", e);
            return;
        }

        tokio::time::sleep(RESTART_SETTLE_DELAY).await;

        if let Some(volume) = saved_volume {
            if let Err(e) = self.mpc(&["volume", &volume.to_string()]).await {
                warn!("mpd: could not restore volume: {}", e);
            }
        }
        info!("mpd: audio service restarted");
    }

    async fn read_volume(&self) -> ControlResult<u8> {
        let out = self.mpc(&["volume"]).await?;
        parse_volume(&out)
            .ok_or_else(|| ControlError::BackendUnavailable(format!("bad volume reply: {out}")))
    }

    /// `mpc current` with one recovery-and-retry round on audio failure.
    async fn current_line(&self) -> ControlResult<String> {
        let out = self.mpc(&["current"]).await?;
        if out.contains(AUDIO_FAILURE_MARKER) {
            self.recover_audio().await;
            return self.mpc(&["current"]).await;
        }
        Ok(out)
    }
}

#[async_trait]
impl Backend for MpdBackend {
    fn name(&self) -> &'static str {
        "mpd"
    }

    fn supports_transient_streams(&self) -> bool {
        true
    }

    fn has_native_sleep(&self) -> bool {
        false
    }

    async fn list_zones(&self) -> ControlResult<Vec<Zone>> {
        Ok(vec![Self::zone()])
    }

    async fn play(&self, _zone: &Zone, stream_url: &str, _title: &str) -> ControlResult<()> {
        self.mpc(&["clear"]).await?;
        self.mpc(&["add", stream_url]).await?;
        self.mpc(&["play"]).await?;
        Ok(())
    }

    async fn stop(&self, _zone: &Zone) -> ControlResult<()> {
        self.mpc(&["stop"]).await?;
        self.mpc(&["clear"]).await?;
        Ok(())
    }

    async fn set_volume(&self, _zone: &Zone, percent: u8) -> ControlResult<()> {
        self.mpc(&["volume", &percent.min(100).to_string()]).await?;
        Ok(())
    }

    async fn get_volume(&self, _zone: &Zone) -> ControlResult<u8> {
        self.read_volume().await
    }

    async fn set_sleep_timer(&self, _zone: &Zone, _seconds: u64) -> ControlResult<()> {
        // No native timer; the shared SleepTimer schedules the stop instead.
        Err(ControlError::InvalidState(
            "mpd has no native sleep timer".into(),
        ))
    }

    async fn now_playing(&self, _zone: &Zone) -> ControlResult<TrackRecord> {
        let line = self.current_line().await?;
        let line = line.trim();
        if line.is_empty() || line.contains(AUDIO_FAILURE_MARKER) {
            return Ok(TrackRecord::default());
        }

        let record = match rules::classify(line) {
            RuleOutcome::Track { artist, title } => TrackRecord {
                artist: (!artist.is_empty()).then_some(artist),
                title: (!title.is_empty()).then_some(title),
                ..Default::default()
            },
            RuleOutcome::Program(program) => TrackRecord {
                program: Some(program),
                ..Default::default()
            },
            RuleOutcome::Remote(Provider::Nts { channel }) => {
                rules::fetch_nts_live(channel, "").await.unwrap_or_default()
            }
        };
        Ok(record)
    }
}

/// Parse `volume: 85%` (also embedded in `mpc status` output).
fn parse_volume(out: &str) -> Option<u8> {
    let idx = out.find("volume:")?;
    let rest = out[idx + "volume:".len()..].trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_volume() {
        assert_eq!(parse_volume("volume: 85%\n"), Some(85));
        assert_eq!(parse_volume("volume:100%   repeat: off"), Some(100));
        assert_eq!(parse_volume("volume: n/a"), None);
        assert_eq!(parse_volume("no volume here"), None);
    }

    #[test]
    fn test_audio_failure_marker_detection() {
        let out = "ERROR: Failed to open audio output\n";
        assert!(out.contains(AUDIO_FAILURE_MARKER));
    }
}
