//! AI opponent: decision-service client and per-room replay loop

pub mod client;
pub mod driver;

pub use client::{DecisionClient, HttpDecisionClient};
pub use driver::AiDriver;
