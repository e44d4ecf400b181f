use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub stations: StationsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_bus_port")]
    pub port: u16,
}

/// Which playback backend drives this installation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sonos,
    #[default]
    Mpd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Speaker addresses probed during zone discovery (sonos backend).
    #[serde(default)]
    pub sonos_devices: Vec<String>,
    /// Override for the mpc client binary; empty means search PATH.
    #[serde(default)]
    pub mpc_binary: Option<PathBuf>,
    /// Shell command that restarts the audio daemon's service after a
    /// transient audio-subsystem failure (mpd backend).
    #[serde(default = "default_audio_restart_cmd")]
    pub audio_restart_cmd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// TSV export URL of the shared station spreadsheet.
    #[serde(default = "default_stations_url")]
    pub list_url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Append-only track history file.
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Override for the yt-dlp binary; empty means search PATH.
    #[serde(default)]
    pub ytdlp_binary: Option<PathBuf>,
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_address: default_bind_address(),
            port: default_gateway_port(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_address: default_bind_address(),
            port: default_bus_port(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            sonos_devices: Vec::new(),
            mpc_binary: None,
            audio_restart_cmd: default_audio_restart_cmd(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            list_url: default_stations_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            history_file: default_history_file(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ytdlp_binary: None,
            timeout_secs: default_resolver_timeout_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    9000
}

fn default_bus_port() -> u16 {
    platform::BUS_TCP_PORT
}

fn default_audio_restart_cmd() -> String {
    "systemctl restart mpd".to_string()
}

fn default_stations_url() -> String {
    "https://docs.google.com/spreadsheets/d/1eCQ94Ur71X0C5-EoPVfuTXJH6f3zYkt1pFmO2872eVs/export?format=tsv"
        .to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_history_file() -> PathBuf {
    platform::data_dir().join("tracks.tsv")
}

fn default_resolver_timeout_secs() -> u64 {
    15
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
