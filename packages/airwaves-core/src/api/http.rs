//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the relay manager.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::stream::stream_audio;
use crate::api::ws::ws_metadata_handler;
use crate::api::AppState;
use crate::error::RelayResult;
use crate::protocol_constants::SERVICE_ID;
use crate::stream::NowPlaying;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/stations", get(list_stations))
        .route("/api/stats", get(get_stats))
        .route("/api/metadata/{id}", get(get_metadata))
        .route("/stream/{id}", get(stream_audio))
        .route("/ws/metadata", get(ws_metadata_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "stations": state.relay.station_ids().len(),
    }))
}

#[derive(Debug, Serialize)]
struct StationListing {
    id: String,
    name: String,
    /// Relay stream URL for this station.
    url: String,
}

/// Lists stations with their relay stream URLs.
///
/// URLs are absolute when the request carries a `Host` header.
async fn list_stations(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let base = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|host| format!("http://{}", host))
        .unwrap_or_default();

    let stations: Vec<StationListing> = state
        .relay
        .stations()
        .into_iter()
        .map(|station| StationListing {
            url: format!("{}/stream/{}", base, station.id),
            id: station.id,
            name: station.display_name,
        })
        .collect();

    Json(stations)
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.stats())
}

/// Last known metadata; empty fields until the station has sent any.
async fn get_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> RelayResult<Json<NowPlaying>> {
    let metadata = state.relay.metadata(&id)?.unwrap_or_else(|| NowPlaying {
        station_id: id,
        title: String::new(),
        artist: String::new(),
    });
    Ok(Json(metadata))
}
