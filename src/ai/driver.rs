//! Per-room AI opponent loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::snapshot::SnapshotBuilder;
use crate::game::{Room, RoomRegistry, Side};

use super::client::{DecisionClient, DecisionRequest};

/// The AI always plays the right paddle
pub const AI_SIDE: Side = Side::Right;

/// Time span, in seconds, each plan is asked to cover
const PLAN_HORIZON_SECS: f32 = 1.0;

/// Arms and owns AI loops, one per room
pub struct AiDriver {
    registry: Arc<RoomRegistry>,
    client: Arc<dyn DecisionClient>,
    interval: Duration,
    generation: AtomicU64,
}

impl AiDriver {
    pub fn new(
        registry: Arc<RoomRegistry>,
        client: Arc<dyn DecisionClient>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            interval,
            generation: AtomicU64::new(0),
        }
    }

    /// Start (or restart) the AI loop for a room
    pub fn start(&self, room_id: &str) -> Arc<Room> {
        let room = self.registry.get(room_id);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let registry = self.registry.clone();
        let client = self.client.clone();
        let interval = self.interval;
        let id = room_id.to_string();
        room.attach_ai(generation, move || {
            tokio::spawn(run_ai_loop(registry, client, id, interval, generation))
        });

        info!(room_id = %room_id, generation, "AI opponent armed");
        room
    }
}

/// Poll the decision service every interval and replay its plans. Replays
/// live in a `JoinSet` owned by this task, so aborting the loop cancels them.
async fn run_ai_loop(
    registry: Arc<RoomRegistry>,
    client: Arc<dyn DecisionClient>,
    room_id: String,
    interval: Duration,
    generation: u64,
) {
    // First poll one full interval after arming
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut replays = JoinSet::new();

    loop {
        ticker.tick().await;
        while replays.try_join_next().is_some() {}

        let Some(room) = registry.lookup(&room_id) else {
            debug!(room_id = %room_id, "Room gone, AI loop exiting");
            return;
        };

        let (state, terminal) = room.with_match(|game| (SnapshotBuilder::build(game), game.terminal));
        if terminal {
            info!(room_id = %room_id, "Game ended, stopping AI loop");
            room.detach_ai(generation);
            return;
        }

        let request = DecisionRequest {
            state,
            side: AI_SIDE,
            dt: PLAN_HORIZON_SECS,
        };

        match client.decide(&request).await {
            Ok(plan) => {
                let received = Instant::now();
                for event in plan.events {
                    let Some(direction) = event.paddle_move() else {
                        continue;
                    };
                    let at = received + Duration::from_millis(event.at_ms);
                    let room = Arc::downgrade(&room);
                    replays.spawn(async move {
                        tokio::time::sleep_until(at).await;
                        if let Some(room) = room.upgrade() {
                            room.move_paddle(AI_SIDE, direction);
                        }
                    });
                }
            }
            Err(e) if e.is_unreachable() => {
                warn!(room_id = %room_id, error = %e, "Decision service unreachable, stopping AI loop");
                room.detach_ai(generation);
                return;
            }
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Decision service error, skipping interval");
            }
        }
    }
}
