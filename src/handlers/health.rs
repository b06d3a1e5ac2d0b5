//! Health check endpoint

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::AppState;
use crate::cache::CacheStats;
use crate::dedup::DedupStats;
use crate::queue::{QueueStats, RateLimitStatus};

/// Queue depth above which the gateway reports itself degraded
const DEGRADED_QUEUE_DEPTH: usize = 200;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall system status
    pub status: HealthStatus,
    /// Uptime in seconds
    pub uptime_seconds: i64,
    /// Gallery contract address
    pub contract: String,
    /// RPC queue statistics
    pub queue: QueueStats,
    /// Rate-limit state
    pub rate_limit: RateLimitStatus,
    /// Cache statistics
    pub cache: CacheStats,
    /// Deduplicator statistics
    pub dedup: DedupStats,
}

/// Health status enum
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Rate limited or backed up, still serving
    Degraded,
}

/// Health check handler
///
/// GET /api/v1/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    let sample = state.sample();

    let status = if sample.rate_limit.is_limited || sample.queue.depth > DEGRADED_QUEUE_DEPTH {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status,
        uptime_seconds: uptime,
        contract: format!("{}", state.contract.address()),
        queue: sample.queue,
        rate_limit: sample.rate_limit,
        cache: sample.cache,
        dedup: sample.dedup,
    };

    // Degraded still answers 200; the gateway keeps serving from cache
    (StatusCode::OK, Json(response))
}

/// Simple health check (for load balancers)
///
/// GET /health
pub async fn health_simple() -> StatusCode {
    StatusCode::OK
}
