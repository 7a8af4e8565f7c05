//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::RoomHandle;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::MatchPhase;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config.client_origin))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/rooms", get(rooms_handler))
        .route("/rooms/:name", get(room_handler))
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

/// `*` allows any origin, otherwise a comma-separated list
fn allowed_origins(client_origin: &str) -> AllowOrigin {
    if client_origin.trim() == "*" {
        return AllowOrigin::any();
    }

    let origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    AllowOrigin::list(origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.rooms.active_rooms(),
        active_players: state.rooms.total_players(),
    })
}

// ============================================================================
// Room listing
// ============================================================================

#[derive(Debug, Serialize)]
struct RoomSummary {
    name: String,
    player_count: usize,
    capacity: usize,
    state: MatchPhase,
    current_wave: u32,
    game_over: bool,
    in_progress: bool,
}

impl From<&RoomHandle> for RoomSummary {
    fn from(handle: &RoomHandle) -> Self {
        let status = handle.status();
        Self {
            name: handle.name.to_string(),
            player_count: status.player_count,
            capacity: handle.capacity,
            state: status.state,
            current_wave: status.current_wave,
            game_over: status.game_over,
            in_progress: status.is_active(),
        }
    }
}

#[derive(Serialize)]
struct RoomsResponse {
    rooms: Vec<RoomSummary>,
}

async fn rooms_handler(State(state): State<AppState>) -> Json<RoomsResponse> {
    let mut rooms: Vec<RoomSummary> = state
        .rooms
        .registry()
        .handles()
        .iter()
        .map(RoomSummary::from)
        .collect();
    rooms.sort_by(|a, b| a.name.cmp(&b.name));

    Json(RoomsResponse { rooms })
}

async fn room_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    let name = state.rooms.room_name(Some(&name));
    state
        .rooms
        .registry()
        .get(&name)
        .map(|handle| Json(RoomSummary::from(&handle)))
        .ok_or_else(|| AppError::NotFound(format!("room {}", name)))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
