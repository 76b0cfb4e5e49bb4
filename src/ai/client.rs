//! Client for the external AI decision service

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::{Direction, Side};
use crate::ws::protocol::GameStateSnapshot;

/// Body of a decision request
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRequest {
    /// Current match snapshot
    pub state: GameStateSnapshot,
    /// Paddle the AI controls
    pub side: Side,
    /// Seconds the plan should cover
    pub dt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEventKind {
    Keydown,
    Keyup,
}

/// One scheduled key event of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiKeyEvent {
    #[serde(rename = "type")]
    pub kind: KeyEventKind,
    /// `ArrowUp` or `ArrowDown`
    pub key: String,
    /// Delay from receipt of the plan
    pub at_ms: u64,
}

impl AiKeyEvent {
    /// Paddle move this event triggers, if any. Key releases and unknown keys
    /// do nothing.
    pub fn paddle_move(&self) -> Option<Direction> {
        if self.kind != KeyEventKind::Keydown {
            return None;
        }
        match self.key.as_str() {
            "ArrowUp" => Some(Direction::Up),
            "ArrowDown" => Some(Direction::Down),
            _ => None,
        }
    }
}

/// Ordered key events returned by the decision service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionPlan {
    #[serde(default)]
    pub events: Vec<AiKeyEvent>,
}

/// Decision service errors
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("Decision service unreachable: {0}")]
    Unreachable(String),

    #[error("Decision service error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse decision: {0}")]
    Malformed(String),
}

impl DecisionError {
    /// Transport failures stop the AI loop; everything else skips one interval
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DecisionError::Unreachable(_))
    }
}

/// Source of AI key plans
#[async_trait]
pub trait DecisionClient: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> Result<DecisionPlan, DecisionError>;
}

/// Decision client talking JSON over HTTP
#[derive(Clone)]
pub struct HttpDecisionClient {
    client: Client,
    endpoint: String,
    /// Applied to every request
    timeout: Duration,
}

impl HttpDecisionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/ai/update", base_url.trim_end_matches('/')),
            timeout,
        }
    }
}

#[async_trait]
impl DecisionClient for HttpDecisionClient {
    async fn decide(&self, request: &DecisionRequest) -> Result<DecisionPlan, DecisionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| DecisionError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DecisionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| DecisionError::Malformed(e.to_string()))
    }
}
