//! HTTP command surface for the dashboard front-end.
//!
//! Routes mirror the original web app; every reply is a structured JSON
//! object and every `ControlError` maps to an error body with an
//! appropriate status — nothing propagates raw.

use crate::controller::{CycleDirection, PlaybackController, VOLUME_STEP};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tunehub_core::catalog::{fetch_station_tsv, StationCatalog, StationRef};
use tunehub_core::config::StationsConfig;
use tunehub_core::error::ControlError;

use crate::sleep::CancelOutcome;

#[derive(Clone)]
pub struct GatewayState {
    pub controller: Arc<PlaybackController>,
    pub catalog: Arc<RwLock<StationCatalog>>,
    pub stations: StationsConfig,
}

struct ApiError(ControlError);

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ControlError::UnknownStation(_) | ControlError::ZoneNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ControlError::UnsupportedStream(_)
            | ControlError::InvalidDuration(_)
            | ControlError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ControlError::StreamResolutionFailed(_)
            | ControlError::BackendUnavailable(_)
            | ControlError::UpstreamFetch(_) => StatusCode::BAD_GATEWAY,
        };
        let body = json!({
            "result": "error",
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/zones", get(list_zones))
        .route("/stations", get(list_stations))
        .route("/reload_zones", get(reload_zones))
        .route("/reload_stations", get(reload_stations))
        .route("/play", post(play))
        .route("/stop", post(stop))
        .route("/volume", post(set_volume))
        .route("/volume/get", get(get_volume_query).post(get_volume))
        .route("/volume/up", post(volume_up))
        .route("/volume/down", post(volume_down))
        .route("/station/up", post(station_up))
        .route("/station/down", post(station_down))
        .route("/sleep", post(sleep))
        .route("/sleep/cancel", post(sleep_cancel))
        .route("/now_playing", get(now_playing))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state: GatewayState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("gateway: failed to bind {}: {}", addr, e);
                return;
            }
        };
        info!("gateway: listening at http://{}", addr);
        if let Err(e) = axum::serve(listener, router(state)).await {
            error!("gateway: server error: {}", e);
        }
    })
}

// ── request shapes ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PlayRequest {
    station: String,
    zone: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ZoneRequest {
    zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VolumeRequest {
    zone: Option<String>,
    volume: i64,
}

#[derive(Debug, Deserialize)]
struct SleepRequest {
    minutes: u64,
}

// ── handlers ──────────────────────────────────────────────────────────────

async fn index(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "tunehub",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.controller.backend_name(),
    }))
}

async fn list_zones(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let names: Vec<String> = state
        .controller
        .zones()
        .await
        .into_iter()
        .map(|z| z.name)
        .collect();
    Json(json!(names))
}

async fn list_stations(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let map: BTreeMap<String, String> = state
        .catalog
        .read()
        .await
        .stations()
        .iter()
        .map(|s| (s.name.clone(), s.url.clone()))
        .collect();
    Json(json!(map))
}

async fn reload_zones(State(state): State<GatewayState>) -> ApiResult {
    let zones = state.controller.reload_zones().await?;
    let names: Vec<String> = zones.into_iter().map(|z| z.name).collect();
    Ok(Json(json!(names)))
}

/// Fetch-then-replace: a failed fetch leaves the current catalog intact.
async fn reload_stations(State(state): State<GatewayState>) -> ApiResult {
    let fetched = fetch_station_tsv(
        &state.stations.list_url,
        Duration::from_secs(state.stations.fetch_timeout_secs),
    )
    .await?;

    let mut catalog = state.catalog.write().await;
    catalog.replace(fetched);
    let map: BTreeMap<String, String> = catalog
        .stations()
        .iter()
        .map(|s| (s.name.clone(), s.url.clone()))
        .collect();
    Ok(Json(json!(map)))
}

async fn play(State(state): State<GatewayState>, Json(req): Json<PlayRequest>) -> ApiResult {
    let station = StationRef::parse(&req.station);
    let snapshot = state.controller.play(&station, req.zone.as_deref()).await?;
    let name = snapshot
        .current_station
        .map(|s| s.name)
        .unwrap_or_default();
    let zone = snapshot.zone.unwrap_or_default();
    Ok(Json(json!({
        "result": "success",
        "action": format!("playing {name} on {zone}"),
        "station": name,
        "zone": zone,
        "state": "playing",
    })))
}

async fn stop(State(state): State<GatewayState>, Json(req): Json<ZoneRequest>) -> ApiResult {
    let snapshot = state.controller.stop(req.zone.as_deref()).await?;
    let zone = snapshot.zone.unwrap_or_default();
    Ok(Json(json!({
        "result": "success",
        "action": format!("stopped {zone}"),
        "state": "stopped",
    })))
}

async fn set_volume(State(state): State<GatewayState>, Json(req): Json<VolumeRequest>) -> ApiResult {
    let volume = state
        .controller
        .set_volume(req.zone.as_deref(), req.volume)
        .await?;
    Ok(Json(json!({
        "result": "success",
        "action": format!("volume set to {volume}"),
        "volume": volume,
    })))
}

async fn get_volume(State(state): State<GatewayState>, Json(req): Json<ZoneRequest>) -> ApiResult {
    let volume = state.controller.get_volume(req.zone.as_deref()).await?;
    Ok(Json(json!({
        "result": "success",
        "action": "got volume",
        "volume": volume,
    })))
}

async fn get_volume_query(
    State(state): State<GatewayState>,
    Query(req): Query<ZoneRequest>,
) -> ApiResult {
    let volume = state.controller.get_volume(req.zone.as_deref()).await?;
    Ok(Json(json!({
        "result": "success",
        "action": "got volume",
        "volume": volume,
    })))
}

async fn volume_up(State(state): State<GatewayState>, Json(req): Json<ZoneRequest>) -> ApiResult {
    let volume = state
        .controller
        .step_volume(req.zone.as_deref(), VOLUME_STEP)
        .await?;
    Ok(Json(json!({ "result": "success", "volume": volume })))
}

async fn volume_down(State(state): State<GatewayState>, Json(req): Json<ZoneRequest>) -> ApiResult {
    let volume = state
        .controller
        .step_volume(req.zone.as_deref(), -VOLUME_STEP)
        .await?;
    Ok(Json(json!({ "result": "success", "volume": volume })))
}

async fn station_up(
    State(state): State<GatewayState>,
    req: Option<Json<ZoneRequest>>,
) -> ApiResult {
    cycle(state, CycleDirection::Up, req).await
}

async fn station_down(
    State(state): State<GatewayState>,
    req: Option<Json<ZoneRequest>>,
) -> ApiResult {
    cycle(state, CycleDirection::Down, req).await
}

async fn cycle(
    state: GatewayState,
    direction: CycleDirection,
    req: Option<Json<ZoneRequest>>,
) -> ApiResult {
    let zone = req.and_then(|Json(r)| r.zone);
    let snapshot = state
        .controller
        .cycle_station(direction, zone.as_deref())
        .await?;
    let name = snapshot
        .current_station
        .map(|s| s.name)
        .unwrap_or_default();
    Ok(Json(json!({
        "result": "success",
        "station": name,
        "state": "playing",
    })))
}

async fn sleep(State(state): State<GatewayState>, Json(req): Json<SleepRequest>) -> ApiResult {
    state.controller.sleep(req.minutes).await?;
    Ok(Json(json!({
        "result": "success",
        "action": format!("sleeping in {} minutes", req.minutes),
    })))
}

async fn sleep_cancel(State(state): State<GatewayState>) -> ApiResult {
    let outcome = state.controller.sleep_cancel().await?;
    let cancelled = outcome == CancelOutcome::Cancelled;
    Ok(Json(json!({
        "result": "success",
        "action": if cancelled { "cancelled" } else { "not pending" },
        "cancelled": cancelled,
    })))
}

async fn now_playing(
    State(state): State<GatewayState>,
    Query(req): Query<ZoneRequest>,
) -> ApiResult {
    let record = state.controller.now_playing(req.zone.as_deref()).await?;
    Ok(Json(json!({
        "result": "success",
        "track": record,
    })))
}
