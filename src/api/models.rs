//! API Response Models

use crate::game::types::{FinishedRound, RoundSnapshot};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Service status response
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub round: RoundSnapshot,
}

/// Recent finished rounds, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentRoundsResponse {
    pub rounds: Vec<FinishedRound>,
    pub count: usize,
}

/// Query for `GET /rounds/recent`
#[derive(Debug, Deserialize)]
pub struct RecentRoundsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub const DEFAULT_RECENT_LIMIT: usize = 20;
pub const MAX_RECENT_LIMIT: usize = 100;

fn default_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

impl RecentRoundsQuery {
    /// Requested limit clamped to `1..=MAX_RECENT_LIMIT`
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_RECENT_LIMIT)
    }
}
