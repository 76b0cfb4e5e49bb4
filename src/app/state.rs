//! Application state shared across routes

use std::sync::Arc;

use crate::ai::{AiDriver, DecisionClient, HttpDecisionClient};
use crate::config::Config;
use crate::game::RoomRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
    pub ai: Arc<AiDriver>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let client = HttpDecisionClient::new(&config.ai_service_url, config.ai_request_timeout);
        Self::with_client(config, RoomRegistry::new(), Arc::new(client))
    }

    /// Wire state around an existing registry and decision client
    pub fn with_client(
        config: Config,
        registry: Arc<RoomRegistry>,
        client: Arc<dyn DecisionClient>,
    ) -> Self {
        let config = Arc::new(config);
        let ai = Arc::new(AiDriver::new(registry.clone(), client, config.ai_interval));

        Self {
            config,
            registry,
            ai,
        }
    }
}
