//! HTTP handlers for the gallery gateway

mod gallery;
mod health;
mod ws;

pub use gallery::*;
pub use health::*;
pub use ws::*;

use crate::contract::ContractService;
use crate::discovery::DiscoveryEngine;
use crate::metrics::{MetricsSample, MetricsState};
use crate::queue::RateLimitSignal;
use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared state for all handlers
pub struct AppState {
    pub contract: ContractService,
    pub discovery: Arc<DiscoveryEngine>,
    pub signal: Arc<RateLimitSignal>,
    pub metrics: Arc<MetricsState>,
    /// Application start time
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(discovery: Arc<DiscoveryEngine>, metrics: Arc<MetricsState>) -> Self {
        let contract = discovery.contract().clone();
        let signal = contract.queue().signal().clone();
        Self {
            contract,
            discovery,
            signal,
            metrics,
            started_at: Utc::now(),
        }
    }

    /// Current statistics of every component
    pub fn sample(&self) -> MetricsSample {
        let queue = self.contract.queue();
        MetricsSample {
            cache: self.contract.cache().stats(),
            dedup: self.contract.dedup_stats(),
            queue: queue.stats(),
            rate_limit: self.signal.current(),
            rate_limit_events: self.signal.limited_events(),
            accelerator: self.contract.accelerator().map(|a| a.stats()),
            discovery: self.discovery.stats(),
        }
    }
}

/// Gallery API routes
///
/// ```text
/// GET /health
/// GET /metrics
/// GET /api/v1/health
/// GET /api/v1/rate-limit
/// GET /api/v1/ws
/// GET /api/v1/tokens?start&limit
/// GET /api/v1/tokens/:id
/// GET /api/v1/tokens/:id/metadata
/// GET /api/v1/tokens/:id/account
/// GET /api/v1/owners/:address/tokens
/// GET /api/v1/creators
/// GET /api/v1/creators/:address/tokens?start&limit
/// ```
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/rate-limit", get(rate_limit_status))
        .route("/ws", get(ws_handler))
        .route("/tokens", get(list_tokens))
        .route("/tokens/:id", get(get_token))
        .route("/tokens/:id/metadata", get(get_token_metadata))
        .route("/tokens/:id/account", get(get_token_account))
        .route("/owners/:address/tokens", get(owner_tokens))
        .route("/creators", get(list_creators))
        .route("/creators/:address/tokens", get(creator_tokens));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_simple))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
