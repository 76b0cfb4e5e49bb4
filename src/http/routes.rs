//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::game::{Room, LOCAL_ROOM_ID};
use crate::http::middleware::{PlayerIdentity, PLAYER_ID_HEADER};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::GameStateSnapshot;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/game/rooms", post(create_room_handler))
        .route("/game/:room_id/init", post(init_handler))
        .route("/game/:room_id/resume", post(resume_handler))
        .route("/game/:room_id/toggle-pause", post(toggle_pause_handler))
        .route("/game/:room_id/start-ai", post(start_ai_handler))
        .route("/game/:room_id/state", get(state_handler))
        .route("/game/:room_id", delete(remove_handler));

    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin))
        .with_state(state)
}

/// CORS for the configured origins. `*` allows any origin; anything else is a
/// comma-separated allow list.
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(PLAYER_ID_HEADER),
        ]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    cors.allow_origin(allowed_origins).allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    rooms: usize,
    sessions: usize,
    rooms_created: u64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        rooms: state.registry.room_count(),
        sessions: state.registry.session_count(),
        rooms_created: state.registry.rooms_created(),
    })
}

// ============================================================================
// Room control endpoints
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomResponse {
    room_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomStatus {
    room_id: String,
    paused: bool,
    game_ended: bool,
    ai_enabled: bool,
    /// Room will be dropped unless someone joins first
    eviction_pending: bool,
}

impl RoomStatus {
    fn of(room: &Room) -> Self {
        let (paused, game_ended) = room.with_match(|g| (g.paused, g.terminal));
        Self {
            room_id: room.id().to_string(),
            paused,
            game_ended,
            ai_enabled: room.is_ai_enabled(),
            eviction_pending: room.has_pending_eviction(),
        }
    }
}

/// Arm eviction for a room nobody has joined yet. No-op otherwise.
fn arm_eviction(state: &AppState, room: &Arc<Room>) {
    state
        .registry
        .schedule_eviction_if_empty(room.id(), state.config.room_eviction_delay);
}

async fn create_room_handler(
    State(state): State<AppState>,
    identity: PlayerIdentity,
) -> Json<CreateRoomResponse> {
    let room_id = state.registry.create_room();
    let room = state.registry.get(&room_id);
    arm_eviction(&state, &room);

    info!(room_id = %room_id, player_id = %identity.player_id, "Room created on request");
    Json(CreateRoomResponse { room_id })
}

async fn init_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Json<RoomStatus> {
    let room = state.registry.reset(&room_id);
    arm_eviction(&state, &room);
    Json(RoomStatus::of(&room))
}

async fn resume_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Json<RoomStatus> {
    let room = state.registry.get(&room_id);
    room.resume();
    arm_eviction(&state, &room);
    Json(RoomStatus::of(&room))
}

async fn toggle_pause_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Json<RoomStatus> {
    let room = state.registry.get(&room_id);
    let paused = room.toggle_pause();
    arm_eviction(&state, &room);
    info!(room_id = %room_id, paused, "Pause toggled");
    Json(RoomStatus::of(&room))
}

async fn start_ai_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Json<RoomStatus> {
    let room = state.ai.start(&room_id);
    arm_eviction(&state, &room);
    Json(RoomStatus::of(&room))
}

async fn state_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<GameStateSnapshot>, AppError> {
    let room = state
        .registry
        .lookup(&room_id)
        .ok_or_else(|| AppError::NotFound(format!("room {}", room_id)))?;
    Ok(Json(room.snapshot()))
}

async fn remove_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if room_id == LOCAL_ROOM_ID {
        return Err(AppError::BadRequest(
            "the local match cannot be removed".to_string(),
        ));
    }
    if state.registry.remove(&room_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("room {}", room_id)))
    }
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
