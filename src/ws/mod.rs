//! WebSocket transport and tick broadcast

pub mod broadcast;
pub mod handler;
pub mod protocol;
