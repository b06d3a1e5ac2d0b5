//! API Integration Tests
//!
//! Drives the full router against an in-memory chain:
//! - Health and rate-limit status
//! - Token, owner and creator listings
//! - Error mapping for bad input and missing tokens
//! - Prometheus exposition

use crate::mock_chain::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use nft_gallery_gateway::{router, AppState, MetricsState};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const HOLDER: u8 = 0xB0;
const CREATOR: u8 = 0xC1;

fn gallery() -> Arc<MockChain> {
    let chain = Arc::new(MockChain::new());
    for n in 1..=12 {
        let owner = if n % 4 == 0 { addr(HOLDER) } else { addr(1) };
        let creator = if n <= 3 { addr(CREATOR) } else { addr(0xC2) };
        chain.mint(n, owner, creator);
        chain.set_uri(n, &format!("data:application/json,{{\"name\":\"Piece {}\"}}", n));
    }
    chain.set_creator_name(addr(CREATOR), "Ada");
    chain.set_creator_name(addr(0xC2), "Grace");
    chain
}

fn app(chain: Arc<MockChain>) -> Router {
    let h = Harness::new(chain);
    let metrics = Arc::new(MetricsState::new().unwrap());
    router(Arc::new(AppState::new(h.discovery.clone(), metrics)))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn hex_addr(byte: u8) -> String {
    format!("0x{}", hex::encode(addr(byte).as_slice()))
}

// =============================================================================
// HEALTH
// =============================================================================

#[tokio::test]
async fn test_simple_health_returns_ok() {
    let (status, body) = get(app(gallery()), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_detailed_health_reports_components() {
    let (status, json) = get_json(app(gallery()), "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["uptime_seconds"].as_i64().unwrap() >= 0);
    assert!(json["queue"].is_object());
    assert!(json["cache"].is_object());
    assert_eq!(json["rate_limit"]["is_limited"], false);
}

#[tokio::test]
async fn test_rate_limit_status() {
    let (status, json) = get_json(app(gallery()), "/api/v1/rate-limit").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_limited"], false);
    assert_eq!(json["retry_count"], 0);
}

// =============================================================================
// TOKENS
// =============================================================================

#[tokio::test]
async fn test_list_tokens_most_recent_first() {
    let (status, json) = get_json(app(gallery()), "/api/v1/tokens?limit=5").await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json["tokens"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["tokenId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["12", "11", "10", "9", "8"]);
    assert_eq!(json["hasMore"], true);
    assert_eq!(json["nextStart"], 5);
}

#[tokio::test]
async fn test_token_details() {
    let (status, json) = get_json(app(gallery()), "/api/v1/tokens/2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tokenId"], "2");
    assert_eq!(json["owner"].as_str().unwrap().to_lowercase(), hex_addr(1));
    assert_eq!(json["creatorName"], "Ada");
    assert_eq!(json["metadata"]["name"], "Piece 2");
}

#[tokio::test]
async fn test_invalid_token_id_is_bad_request() {
    let (status, json) = get_json(app(gallery()), "/api/v1/tokens/abc").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["reason"], "validation_failed");
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let (status, json) = get_json(app(gallery()), "/api/v1/tokens/999").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["reason"], "not_found");
}

#[tokio::test]
async fn test_token_metadata_document() {
    let (status, json) = get_json(app(gallery()), "/api/v1/tokens/7/metadata").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Piece 7");
}

#[tokio::test]
async fn test_token_bound_account() {
    let (status, json) = get_json(app(gallery()), "/api/v1/tokens/3/account").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tokenId"], "3");
    assert_eq!(
        json["account"].as_str().unwrap().to_lowercase(),
        format!("0x{}", hex::encode(MockChain::account_for(id(3)).as_slice()))
    );
}

// =============================================================================
// OWNERS AND CREATORS
// =============================================================================

#[tokio::test]
async fn test_owner_tokens_ascending() {
    let uri = format!("/api/v1/owners/{}/tokens", hex_addr(HOLDER));
    let (status, json) = get_json(app(gallery()), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["balance"], "3");
    let ids: Vec<&str> = json["tokens"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["tokenId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["4", "8", "12"]);
}

#[tokio::test]
async fn test_invalid_owner_address_is_bad_request() {
    let (status, _) = get_json(app(gallery()), "/api/v1/owners/not-an-address/tokens").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_creators_and_their_tokens() {
    let app = app(gallery());

    let (status, json) = get_json(app.clone(), "/api/v1/creators").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Ada"));
    assert!(names.contains(&"Grace"));

    let uri = format!("/api/v1/creators/{}/tokens", hex_addr(CREATOR));
    let (status, json) = get_json(app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json["tokens"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["tokenId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["3", "2", "1"]);
    assert_eq!(json["hasMore"], false);
}

// =============================================================================
// METRICS
// =============================================================================

#[tokio::test]
async fn test_metrics_exposition() {
    let app = app(gallery());
    get(app.clone(), "/api/v1/tokens?limit=2").await;

    let (status, body) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("gallery_queue_executed"));
}
