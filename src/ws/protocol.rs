//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::Side;

/// What a session is allowed to drive in its room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Left,
    Right,
    /// Watches only
    Spectator,
    /// Shared keyboard on the local match, drives either paddle
    Local,
}

impl Role {
    /// Paddle owned by this role, if it owns exactly one
    pub fn side(self) -> Option<Side> {
        match self {
            Role::Left => Some(Side::Left),
            Role::Right => Some(Side::Right),
            Role::Spectator | Role::Local => None,
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientMsg {
    MoveUp {
        /// Only honored for the local match
        #[serde(default)]
        side: Option<Side>,
    },
    MoveDown {
        #[serde(default)]
        side: Option<Side>,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Per-tick match snapshot
    GameState(GameStateSnapshot),

    /// Session bound to a room
    #[serde(rename_all = "camelCase")]
    RoomJoined { room_id: String, role: Role },

    /// Both paddles have an owner
    #[serde(rename_all = "camelCase")]
    GameReady { room_id: String },

    /// Pause flag changed
    GamePaused { paused: bool },

    /// A side player left the room
    #[serde(rename_all = "camelCase")]
    OpponentDisconnected { room_id: String },
}

/// Serializable subset of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateSnapshot {
    pub paddles: PaddlesSnapshot,
    pub ball: BallSnapshot,
    pub scores: ScoresSnapshot,
    pub game_ended: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaddlesSnapshot {
    pub left: PaddleSnapshot,
    pub right: PaddleSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaddleSnapshot {
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoresSnapshot {
    pub left: u32,
    pub right: u32,
}
