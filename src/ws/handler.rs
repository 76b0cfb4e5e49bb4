//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::RoomRegistry;
use crate::http::middleware::PlayerIdentity;
use crate::util::rate_limit::SessionRateLimiter;
use crate::ws::protocol::ClientMsg;

/// Frames buffered per session before the broadcaster starts dropping
const OUTBOUND_BUFFER: usize = 32;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Room to join; matchmaking picks one when absent
    pub room: Option<String>,
}

/// What happened to one inbound text frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposition {
    Applied,
    /// Recognized, but the session may not move anything right now
    Suppressed,
    /// Not a command we understand
    Ignored,
    RateLimited,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    identity: PlayerIdentity,
    State(state): State<AppState>,
) -> Response {
    let room_id = match query.room.map(|r| r.trim().to_string()) {
        Some(room) if !room.is_empty() => room,
        _ => state.registry.open_public_room(),
    };

    info!(
        player_id = %identity.player_id,
        guest = identity.guest,
        room_id = %room_id,
        "WebSocket upgrade"
    );
    ws.on_upgrade(move |socket| handle_socket(socket, identity.player_id, room_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: String, room_id: String, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let session = crate::game::SessionHandle::new(player_id.clone(), tx);
    let session_id = session.session_id;
    let outcome = state.registry.join(&room_id, session);
    info!(
        player_id = %player_id,
        session_id = %session_id,
        room_id = %room_id,
        role = ?outcome.role,
        ready = outcome.ready,
        "New WebSocket session"
    );

    run_session(session_id, &room_id, ws_sink, ws_stream, rx, &state.registry).await;

    state.registry.leave(&room_id, session_id);
    info!(player_id = %player_id, session_id = %session_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session_id: Uuid,
    room_id: &str,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound: mpsc::Receiver<String>,
    registry: &RoomRegistry,
) {
    let rate_limiter = SessionRateLimiter::new();

    // Writer task: room frames -> WebSocket. Ends when the room drops the
    // session or the socket stops accepting writes.
    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(text)).await {
                debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                return;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> room
    loop {
        let frame = tokio::select! {
            _ = &mut writer => {
                debug!(session_id = %session_id, "Outbound channel closed");
                break;
            }
            frame = ws_stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                let disposition = handle_text(registry, room_id, session_id, &text, &rate_limiter);
                if disposition == InputDisposition::RateLimited {
                    warn!(session_id = %session_id, "Rate limited input message");
                }
            }
            Some(Ok(Message::Binary(_))) => {
                debug!(session_id = %session_id, "Received binary message, ignoring");
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Some(Err(e)) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
            None => break,
        }
    }

    writer.abort();
}

/// Apply one inbound text frame. Unknown shapes are ignored, never fatal.
pub fn handle_text(
    registry: &RoomRegistry,
    room_id: &str,
    session_id: Uuid,
    text: &str,
    rate_limiter: &SessionRateLimiter,
) -> InputDisposition {
    let msg = match serde_json::from_str::<ClientMsg>(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(session_id = %session_id, error = %e, "Ignoring unrecognized client message");
            return InputDisposition::Ignored;
        }
    };

    if !rate_limiter.check_input() {
        return InputDisposition::RateLimited;
    }

    let Some(room) = registry.lookup(room_id) else {
        return InputDisposition::Suppressed;
    };

    if room.apply_input(session_id, &msg) {
        InputDisposition::Applied
    } else {
        InputDisposition::Suppressed
    }
}
