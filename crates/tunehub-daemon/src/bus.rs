//! TCP command/event bus: the side channel the hardware remotes and
//! indicator bridges speak. Newline-delimited JSON both ways.

use crate::controller::{CycleDirection, PlaybackController, VOLUME_STEP};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tunehub_core::catalog::StationRef;
use tunehub_core::protocol::{decode_command, encode_line, BusAction, BusCommand, Event};

pub fn start_server(
    bind_address: String,
    port: u16,
    controller: Arc<PlaybackController>,
    events: broadcast::Sender<Event>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("bus: failed to bind {}: {}", addr, e);
                return;
            }
        };
        info!("bus: listening at {}", addr);

        let mut client_id = 0usize;
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("bus: client {} connected from {}", id, peer);
                    let ctrl = controller.clone();
                    let rx = events.subscribe();
                    tokio::spawn(async move {
                        handle_client(stream, ctrl, id, rx).await;
                        info!("bus: client {} disconnected", id);
                    });
                }
                Err(e) => error!("bus: accept failed: {}", e),
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    controller: Arc<PlaybackController>,
    client_id: usize,
    mut events: broadcast::Receiver<Event>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Backend identity + current station on connect.
    if let Ok(line) = system_event(&controller).await {
        if write_half.write_all(line.as_bytes()).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            result = lines.next_line() => {
                match result {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let reply = match decode_command(&line) {
                            Ok(cmd) => dispatch(&controller, cmd).await,
                            Err(e) => {
                                warn!("bus: client {} sent bad payload: {}", client_id, e);
                                serde_json::json!({"result": "error", "error": "bad_payload"})
                            }
                        };
                        let mut out = reply.to_string();
                        out.push('\n');
                        if write_half.write_all(out.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("bus: read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(line) = encode_line(&event) {
                            if write_half.write_all(line.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("bus: client {} missed {} events, resyncing", client_id, n);
                        if let Ok(line) = system_event(&controller).await {
                            let _ = write_half.write_all(line.as_bytes()).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn dispatch(controller: &PlaybackController, cmd: BusCommand) -> serde_json::Value {
    let result = match cmd {
        BusCommand::Play { station, room } => controller
            .play(&StationRef::Index(station), room.as_deref())
            .await
            .map(|s| {
                format!(
                    "playing {} on {}",
                    s.current_station.map(|st| st.name).unwrap_or_default(),
                    s.zone.unwrap_or_default()
                )
            }),
        BusCommand::Action { cmd, room, minutes } => match cmd {
            BusAction::Stop => controller
                .stop(room.as_deref())
                .await
                .map(|s| format!("stopped {}", s.zone.unwrap_or_default())),
            BusAction::Vup => controller
                .step_volume(room.as_deref(), VOLUME_STEP)
                .await
                .map(|v| format!("volume {}", v)),
            BusAction::Vdown => controller
                .step_volume(room.as_deref(), -VOLUME_STEP)
                .await
                .map(|v| format!("volume {}", v)),
            BusAction::Sleep => {
                let minutes = minutes.unwrap_or(0);
                controller
                    .sleep(minutes)
                    .await
                    .map(|_| format!("sleeping in {} minutes", minutes))
            }
        },
    };

    match result {
        Ok(action) => serde_json::json!({"result": "success", "action": action}),
        Err(e) => {
            warn!("bus: command failed: {}", e);
            serde_json::json!({"result": "error", "error": e.kind(), "message": e.to_string()})
        }
    }
}

async fn system_event(controller: &PlaybackController) -> anyhow::Result<String> {
    let state = controller.state_snapshot().await;
    encode_line(&Event::System {
        backend: controller.backend_name().to_string(),
        station: state.current_station.map(|s| s.name),
        state: state.run_state,
    })
}
