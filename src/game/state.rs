//! Match state: paddles, ball, score and field geometry

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Field width in pixels
pub const FIELD_WIDTH: f32 = 800.0;
/// Field height in pixels
pub const FIELD_HEIGHT: f32 = 600.0;
/// Paddle width in pixels
pub const PADDLE_WIDTH: f32 = 20.0;
/// Paddle height in pixels
pub const PADDLE_HEIGHT: f32 = 100.0;
/// Gap between a side wall and the outer face of its paddle
pub const PADDLE_OFFSET_X: f32 = 30.0;
/// Pixels a paddle travels per move command
pub const PADDLE_SPEED: f32 = 10.0;
/// Horizontal ball speed after a serve (pixels per tick)
pub const BALL_SPEED_X: f32 = 6.0;
/// Vertical ball speed after a serve (pixels per tick)
pub const BALL_SPEED_Y: f32 = 4.0;
/// First side to reach this score wins
pub const WINNING_SCORE: u32 = 10;
/// Room id reserved for the shared single-process match
pub const LOCAL_ROOM_ID: &str = "local";

/// Largest valid paddle offset
pub const PADDLE_MAX_Y: f32 = FIELD_HEIGHT - PADDLE_HEIGHT;

/// Paddle side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Left edge of this side's paddle collision plane
    pub fn paddle_x(self) -> f32 {
        match self {
            Side::Left => PADDLE_OFFSET_X,
            Side::Right => FIELD_WIDTH - PADDLE_OFFSET_X - PADDLE_WIDTH,
        }
    }
}

/// Vertical paddle direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paddle {
    pub side: Side,
    /// Top edge, kept within `[0, PADDLE_MAX_Y]`
    pub y: f32,
}

impl Paddle {
    fn centered(side: Side) -> Self {
        Self {
            side,
            y: PADDLE_MAX_Y / 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    /// Side the next serve heads toward. Set on a point, taken by the serve.
    pub serve_toward: Option<Side>,
}

impl Ball {
    fn centered() -> Self {
        Self {
            x: FIELD_WIDTH / 2.0,
            y: FIELD_HEIGHT / 2.0,
            dx: 0.0,
            dy: 0.0,
            serve_toward: None,
        }
    }

    /// Docked balls wait for a serve
    pub fn is_docked(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }

    /// Recenter and stop, remembering where the next serve goes
    pub fn dock(&mut self, serve_toward: Option<Side>) {
        *self = Self::centered();
        self.serve_toward = serve_toward;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

impl Score {
    pub fn award(&mut self, side: Side) -> u32 {
        let counter = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        *counter += 1;
        *counter
    }

    pub fn has_winner(&self) -> bool {
        self.left >= WINNING_SCORE || self.right >= WINNING_SCORE
    }
}

/// Authoritative state of one room's match
#[derive(Debug, Clone)]
pub struct Match {
    pub id: String,
    pub left: Paddle,
    pub right: Paddle,
    pub ball: Ball,
    pub score: Score,
    /// Set once a side reaches [`WINNING_SCORE`]; physics stays frozen afterwards
    pub terminal: bool,
    pub paused: bool,
    /// Serve randomness
    pub rng: ChaCha8Rng,
}

impl Match {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_seed(id, rand::random::<u64>())
    }

    pub fn with_seed(id: impl Into<String>, seed: u64) -> Self {
        Self {
            id: id.into(),
            left: Paddle::centered(Side::Left),
            right: Paddle::centered(Side::Right),
            ball: Ball::centered(),
            score: Score::default(),
            terminal: false,
            paused: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Paused and finished matches ignore movement and physics
    pub fn is_frozen(&self) -> bool {
        self.terminal || self.paused
    }

    pub fn is_local(&self) -> bool {
        self.id == LOCAL_ROOM_ID
    }
}
