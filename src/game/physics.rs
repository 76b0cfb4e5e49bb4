//! Ball integration, paddle collision, scoring and serving

use rand::Rng;

use super::state::{
    Ball, Direction, Match, Paddle, Side, BALL_SPEED_X, BALL_SPEED_Y, FIELD_HEIGHT, FIELD_WIDTH,
    PADDLE_HEIGHT, PADDLE_MAX_Y, PADDLE_SPEED, PADDLE_WIDTH,
};

/// What a single tick did to the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Match was paused or finished, nothing moved
    Idle,
    /// Ball moved without leaving the field
    Moved,
    /// A point was scored and the ball docked at center
    Scored {
        scorer: Side,
        /// Caller should serve after the serve delay
        serve_pending: bool,
    },
}

/// Physics system for advancing a match one tick at a time
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance the match by one tick
    pub fn advance(game: &mut Match) -> TickOutcome {
        if game.is_frozen() {
            return TickOutcome::Idle;
        }

        let ball = &mut game.ball;
        ball.x += ball.dx;
        ball.y += ball.dy;

        if ball.y <= 0.0 || ball.y >= FIELD_HEIGHT {
            ball.dy = -ball.dy;
        }

        // Tick-granular check, independent of travel direction. A ball that
        // ends up inside a plane without entering through its open face can
        // be reflected on consecutive ticks.
        if Self::in_paddle_plane(&game.ball, &game.left)
            || Self::in_paddle_plane(&game.ball, &game.right)
        {
            game.ball.dx = -game.ball.dx;
        }

        let scorer = if game.ball.x < 0.0 {
            Side::Right
        } else if game.ball.x > FIELD_WIDTH {
            Side::Left
        } else {
            return TickOutcome::Moved;
        };

        game.score.award(scorer);
        game.ball.dock(Some(scorer.opposite()));

        if game.score.has_winner() {
            game.terminal = true;
            game.ball.dx = 0.0;
            game.ball.dy = 0.0;
        }

        TickOutcome::Scored {
            scorer,
            serve_pending: !game.terminal,
        }
    }

    /// Move a paddle by one step, clamped to the field
    pub fn move_paddle(game: &mut Match, side: Side, direction: Direction) {
        if game.is_frozen() {
            return;
        }

        let paddle = game.paddle_mut(side);
        paddle.y = match direction {
            Direction::Up => (paddle.y - PADDLE_SPEED).max(0.0),
            Direction::Down => (paddle.y + PADDLE_SPEED).min(PADDLE_MAX_Y),
        };
    }

    /// Launch a docked ball. Returns false if the ball is already moving or
    /// the match is over.
    pub fn serve(game: &mut Match) -> bool {
        if game.terminal || !game.ball.is_docked() {
            return false;
        }

        let toward = match game.ball.serve_toward.take() {
            Some(side) => side,
            None if game.rng.gen_bool(0.5) => Side::Left,
            None => Side::Right,
        };

        game.ball.dx = match toward {
            Side::Left => -BALL_SPEED_X,
            Side::Right => BALL_SPEED_X,
        };
        game.ball.dy = if game.rng.gen_bool(0.5) {
            BALL_SPEED_Y
        } else {
            -BALL_SPEED_Y
        };

        true
    }

    /// Check whether the ball sits inside a paddle's collision plane
    fn in_paddle_plane(ball: &Ball, paddle: &Paddle) -> bool {
        let x0 = paddle.side.paddle_x();
        ball.x >= x0
            && ball.x <= x0 + PADDLE_WIDTH
            && ball.y >= paddle.y
            && ball.y <= paddle.y + PADDLE_HEIGHT
    }
}
