//! Player identity resolution
//!
//! Tokens are verified by the upstream gateway, which forwards the player id
//! in a header. Requests without it are treated as guests.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use uuid::Uuid;

/// Header set by the authenticating gateway
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Resolved player identity for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub player_id: String,
    pub guest: bool,
}

impl PlayerIdentity {
    /// Resolve from request headers, falling back to a generated guest id
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let forwarded = headers
            .get(PLAYER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match forwarded {
            Some(id) => Self {
                player_id: id.to_string(),
                guest: false,
            },
            None => Self::guest(),
        }
    }

    pub fn guest() -> Self {
        Self {
            player_id: format!("guest_{}", &Uuid::new_v4().simple().to_string()[..8]),
            guest: true,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for PlayerIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
