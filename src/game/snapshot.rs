//! Snapshot building for network transmission

use crate::ws::protocol::{
    BallSnapshot, GameStateSnapshot, PaddleSnapshot, PaddlesSnapshot, ScoresSnapshot, ServerMsg,
};

use super::state::Match;

/// Builds snapshots of a match
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Capture the client-visible state of a match
    pub fn build(game: &Match) -> GameStateSnapshot {
        GameStateSnapshot {
            paddles: PaddlesSnapshot {
                left: PaddleSnapshot { y: game.left.y },
                right: PaddleSnapshot { y: game.right.y },
            },
            ball: BallSnapshot {
                x: game.ball.x,
                y: game.ball.y,
            },
            scores: ScoresSnapshot {
                left: game.score.left,
                right: game.score.right,
            },
            game_ended: game.terminal,
        }
    }

    /// Serialize a `gameState` message once so it can be fanned out to every
    /// session of the room
    pub fn encode(game: &Match) -> Result<String, serde_json::Error> {
        serde_json::to_string(&ServerMsg::GameState(Self::build(game)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_mirrors_match() {
        let mut game = Match::with_seed("r1", 3);
        game.left.y = 10.0;
        game.score.right = 4;
        game.terminal = true;

        let snap = SnapshotBuilder::build(&game);
        assert_eq!(snap.paddles.left.y, 10.0);
        assert_eq!(snap.paddles.right.y, 250.0);
        assert_eq!(snap.ball, BallSnapshot { x: 400.0, y: 300.0 });
        assert_eq!(snap.scores, ScoresSnapshot { left: 0, right: 4 });
        assert!(snap.game_ended);
    }

    #[test]
    fn encoded_snapshot_is_tagged() {
        let text = SnapshotBuilder::encode(&Match::with_seed("r1", 3)).unwrap();
        assert!(text.starts_with(r#"{"event":"gameState","data":"#));
    }
}
