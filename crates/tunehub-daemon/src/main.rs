use tunehub_daemon::backend::Backend;
use tunehub_daemon::controller::PlaybackController;
use tunehub_daemon::gateway::{self, GatewayState};
use tunehub_daemon::monitor::NowPlayingMonitor;
use tunehub_daemon::{bus, mpd, sleep, sonos};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tunehub_core::catalog::{fetch_station_tsv, StationCatalog};
use tunehub_core::config::{BackendKind, Config};
use tunehub_core::history::TrackLog;
use tunehub_core::platform;
use tunehub_core::protocol::Event;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tunehub_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    // Initial station list. A failed fetch is survivable: the catalog stays
    // empty until the next reload-stations command succeeds.
    let stations = match fetch_station_tsv(
        &config.stations.list_url,
        Duration::from_secs(config.stations.fetch_timeout_secs),
    )
    .await
    {
        Ok(stations) => {
            info!("Loaded {} stations", stations.len());
            stations
        }
        Err(e) => {
            warn!("Initial station fetch failed: {}", e);
            Vec::new()
        }
    };
    let catalog = Arc::new(RwLock::new(StationCatalog::new(stations)));

    let backend: Arc<dyn Backend> = match config.backend.kind {
        BackendKind::Sonos => Arc::new(sonos::SonosBackend::new(
            config.backend.sonos_devices.clone(),
        )?),
        BackendKind::Mpd => Arc::new(mpd::MpdBackend::new(
            config.backend.mpc_binary.clone(),
            config.backend.audio_restart_cmd.clone(),
        )?),
    };
    info!("Backend: {}", backend.name());

    let (event_tx, _) = broadcast::channel::<Event>(100);
    let (sleep_tx, mut sleep_rx) = mpsc::channel::<sleep::SleepFired>(8);

    let controller = Arc::new(PlaybackController::new(
        backend.clone(),
        catalog.clone(),
        config.resolver.clone(),
        event_tx.clone(),
        sleep_tx,
    ));

    if let Err(e) = controller.reload_zones().await {
        warn!("Initial zone discovery failed: {}", e);
    }

    if config.bus.enabled {
        let _bus_handle = bus::start_server(
            config.bus.bind_address.clone(),
            config.bus.port,
            controller.clone(),
            event_tx.clone(),
        );
    }

    if config.gateway.enabled {
        let _gateway_handle = gateway::start_server(
            config.gateway.bind_address.clone(),
            config.gateway.port,
            GatewayState {
                controller: controller.clone(),
                catalog: catalog.clone(),
                stations: config.stations.clone(),
            },
        );
    }

    let _monitor_handle = NowPlayingMonitor::new(
        controller.clone(),
        backend,
        TrackLog::new(config.monitor.history_file.clone()),
        event_tx,
        Duration::from_secs(config.monitor.poll_interval_secs),
    )
    .start();

    info!("Daemon initialised, running event loop");

    // Sleep-timer firings funnel back here so the timer task never holds a
    // reference to the controller.
    while let Some(fired) = sleep_rx.recv().await {
        info!("Sleep timer fired for {:?}", fired.zone);
        if let Err(e) = controller.stop(fired.zone.as_deref()).await {
            warn!("Sleep-timer stop failed: {}", e);
        }
    }

    Ok(())
}
