use serde::{Deserialize, Serialize};

use crate::core::breaker::BreakerSnapshot;
use crate::models::domain::{EngineTier, MatchResult, SignalMatch, TierAttempt};

/// Response for the match endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MatchSignalResponse {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub matches: Vec<SignalMatch>,
    pub engine: EngineTier,
    #[serde(rename = "latencyMs")]
    pub latency_ms: u64,
    pub degraded: bool,
    pub attempts: Vec<TierAttempt>,
}

impl MatchSignalResponse {
    pub fn new(request_id: String, result: MatchResult) -> Self {
        Self {
            request_id,
            matches: result.matches,
            engine: result.engine,
            latency_ms: result.latency_ms,
            degraded: result.degraded,
            attempts: result.attempts,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub breakers: Vec<BreakerSnapshot>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
