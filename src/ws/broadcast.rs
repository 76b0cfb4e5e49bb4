//! Fixed-rate tick and snapshot broadcast across all active rooms

use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::game::RoomRegistry;
use crate::util::time::{tick_interval, SIMULATION_TPS};

/// Totals for one pass over the active rooms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub rooms: usize,
    pub delivered: usize,
    pub dropped: usize,
}

/// Advance and broadcast every room that has at least one session
pub fn tick_all(registry: &RoomRegistry) -> TickStats {
    let mut stats = TickStats::default();
    for room in registry.active_rooms() {
        let report = room.tick();
        stats.rooms += 1;
        stats.delivered += report.delivered;
        stats.dropped += report.dropped;
    }
    stats
}

/// Run the tick loop forever
pub async fn run_tick_loop(registry: Arc<RoomRegistry>) {
    info!(tps = SIMULATION_TPS, "Tick loop started");

    let mut ticker = interval(tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ticks: u64 = 0;
    let mut dropped: usize = 0;
    loop {
        ticker.tick().await;

        let stats = tick_all(&registry);
        ticks += 1;
        dropped += stats.dropped;

        // Roughly every ten seconds
        if ticks % (SIMULATION_TPS as u64 * 10) == 0 {
            debug!(
                rooms = stats.rooms,
                sessions = registry.session_count(),
                dropped_frames = dropped,
                "Tick loop status"
            );
            dropped = 0;
        }
    }
}
