//! Time utilities for the match simulation

use std::time::{Duration, Instant};

/// Tick rate for physics and snapshot broadcast
pub const SIMULATION_TPS: u32 = 60;
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Interval between two ticks
pub fn tick_interval() -> Duration {
    Duration::from_micros(TICK_DURATION_MICROS)
}
