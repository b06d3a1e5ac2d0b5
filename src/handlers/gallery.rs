//! Gallery read API

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{AppState, RateLimitUpdate};
use crate::chain::{parse_address, parse_token_id};
use crate::discovery::IndexScope;
use crate::error::AppError;
use crate::models::{CreatorInfo, OwnedTokens, TokenBatch, TokenBoundAccount, TokenDetails, TokenMetadata};
use alloy_primitives::U256;

/// Largest page a client may request
const MAX_PAGE_SIZE: usize = 100;

/// Query parameters for paged listings
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Position of the first token (0 = most recent)
    #[serde(default)]
    pub start: usize,
    /// Page size; the configured batch size when absent
    pub limit: Option<usize>,
}

impl PageQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(0).min(MAX_PAGE_SIZE)
    }
}

/// A revert on a per-token read means the token was never minted
fn missing_token(token_id: U256) -> impl FnOnce(AppError) -> AppError {
    move |e| match e {
        AppError::Revert { .. } => AppError::NotFound(format!("Token {} does not exist", token_id)),
        other => other,
    }
}

/// Current rate-limit status
///
/// GET /api/v1/rate-limit
pub async fn rate_limit_status(State(state): State<Arc<AppState>>) -> Json<RateLimitUpdate> {
    Json(RateLimitUpdate::from(state.signal.current()))
}

/// Most recent tokens first
///
/// GET /api/v1/tokens?start=0&limit=20
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<TokenBatch>, AppError> {
    let batch = state
        .discovery
        .batch(&IndexScope::All, page.start, page.limit())
        .await?;
    Ok(Json(batch))
}

/// Token with creator and resolved metadata
///
/// GET /api/v1/tokens/:id
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TokenDetails>, AppError> {
    let token_id = parse_token_id(&id)?;
    let details = state
        .contract
        .token_details(token_id)
        .await
        .map_err(missing_token(token_id))?;
    Ok(Json(details))
}

/// Raw metadata document of a token
///
/// GET /api/v1/tokens/:id/metadata
pub async fn get_token_metadata(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TokenMetadata>, AppError> {
    let token_id = parse_token_id(&id)?;
    let uri = state
        .contract
        .token_uri(token_id)
        .await
        .map_err(missing_token(token_id))?;
    Ok(Json(state.contract.metadata().fetch(&uri).await?))
}

/// Token-bound account address of a token
///
/// GET /api/v1/tokens/:id/account
pub async fn get_token_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TokenBoundAccount>, AppError> {
    let token_id = parse_token_id(&id)?;
    Ok(Json(state.contract.token_bound_account(token_id).await?))
}

/// Every token held by an address, ascending by id
///
/// GET /api/v1/owners/:address/tokens
pub async fn owner_tokens(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<OwnedTokens>, AppError> {
    let owner = parse_address(&address)?;
    Ok(Json(state.discovery.tokens_of_owner(owner).await?))
}

/// Registered creators with their display names
///
/// GET /api/v1/creators
pub async fn list_creators(State(state): State<Arc<AppState>>) -> Result<Json<Vec<CreatorInfo>>, AppError> {
    Ok(Json(state.contract.creators().await?))
}

/// Tokens of one creator, most recent first
///
/// GET /api/v1/creators/:address/tokens?start=0&limit=20
pub async fn creator_tokens(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<TokenBatch>, AppError> {
    let creator = parse_address(&address)?;
    let batch = state
        .discovery
        .batch(&IndexScope::Creator(creator), page.start, page.limit())
        .await?;
    Ok(Json(batch))
}

/// Prometheus metrics
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.metrics.observe(&state.sample());
    let body = state.metrics.encode()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
