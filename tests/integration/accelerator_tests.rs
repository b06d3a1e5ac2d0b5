//! Remote Accelerator Tests
//!
//! Allow-listed gallery reads go to the accelerator first; every failure
//! falls back to the chain without surfacing an error.

use crate::mock_chain::*;
use mockito::{Matcher, Server, ServerGuard};
use nft_gallery_gateway::cache::{MemoryStore, TtlStore};
use nft_gallery_gateway::config::{AcceleratorConfig, MetadataConfig, TtlConfig};
use nft_gallery_gateway::contract::ContractService;
use nft_gallery_gateway::metadata::MetadataService;
use nft_gallery_gateway::queue::RateLimitedQueue;
use nft_gallery_gateway::RemoteAccelerator;
use serde_json::json;
use std::sync::Arc;

fn gallery_path(method: &str) -> String {
    format!("/contract/0x{}/{}", hex::encode(GALLERY.as_slice()), method)
}

fn wired(server: &ServerGuard, chain: Arc<MockChain>) -> (ContractService, Arc<RemoteAccelerator>) {
    let accelerator = Arc::new(
        RemoteAccelerator::new(&AcceleratorConfig {
            enabled: true,
            base_url: format!("{}/", server.url()),
            timeout_ms: 2_000,
        })
        .unwrap(),
    );
    let ttl = TtlConfig::default();
    let store: Arc<dyn TtlStore> = Arc::new(MemoryStore::new(100));
    let metadata = Arc::new(MetadataService::new(&MetadataConfig::default(), store.clone(), &ttl).unwrap());
    let contract = ContractService::new(
        GALLERY,
        chain,
        store,
        Arc::new(RateLimitedQueue::from_config(&fast_queue_config())),
        metadata,
        ttl,
    )
    .with_accelerator(accelerator.clone());
    (contract, accelerator)
}

fn gallery() -> Arc<MockChain> {
    let chain = Arc::new(MockChain::new());
    chain.mint(1, addr(1), addr(0xC1));
    chain
}

#[tokio::test]
async fn test_accelerator_hit_skips_the_chain() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", gallery_path("name").as_str())
        .with_header("content-type", "application/json")
        .with_body(json!({ "result": "Remote Gallery", "cached": true, "cachedAt": "2026-01-01T00:00:00Z" }).to_string())
        .expect(1)
        .create_async()
        .await;
    let chain = gallery();
    let (contract, accelerator) = wired(&server, chain.clone());

    assert_eq!(contract.name().await.unwrap(), "Remote Gallery");
    // Second read is served by the local cache
    assert_eq!(contract.name().await.unwrap(), "Remote Gallery");

    assert_eq!(chain.call_count("name"), 0);
    assert_eq!(accelerator.stats().hits, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_arguments_travel_as_query_parameters() {
    let mut server = Server::new_async().await;
    let owner = format!("0x{}", hex::encode(addr(7).as_slice()));
    let mock = server
        .mock("GET", gallery_path("ownerOf").as_str())
        .match_query(Matcher::UrlEncoded("tokenId".into(), "1".into()))
        .with_header("content-type", "application/json")
        .with_body(json!({ "result": owner, "cached": false }).to_string())
        .create_async()
        .await;
    let chain = gallery();
    let (contract, _) = wired(&server, chain.clone());

    assert_eq!(contract.owner_of(id(1)).await.unwrap(), addr(7));
    assert_eq!(chain.call_count("ownerOf"), 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_falls_back_to_chain() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", gallery_path("name").as_str())
        .with_status(500)
        .create_async()
        .await;
    let chain = gallery();
    let (contract, accelerator) = wired(&server, chain.clone());

    assert_eq!(contract.name().await.unwrap(), "Gallery");

    assert_eq!(chain.call_count("name"), 1);
    let stats = accelerator.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.fallbacks, 1);
}

#[tokio::test]
async fn test_null_result_falls_back_to_chain() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", gallery_path("totalSupply").as_str())
        .with_header("content-type", "application/json")
        .with_body(json!({ "result": null, "cached": false }).to_string())
        .create_async()
        .await;
    let chain = gallery();
    let (contract, accelerator) = wired(&server, chain.clone());

    assert_eq!(contract.total_supply().await.unwrap(), id(1));

    assert_eq!(chain.call_count("totalSupply"), 1);
    assert_eq!(accelerator.stats().fallbacks, 1);
}

#[tokio::test]
async fn test_unlisted_methods_never_reach_the_accelerator() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let chain = gallery();
    chain.set_soulbound(1);
    let (contract, accelerator) = wired(&server, chain.clone());

    assert!(contract.is_soulbound(id(1)).await.unwrap());

    assert_eq!(chain.call_count("isSoulbound"), 1);
    assert_eq!(accelerator.stats().fallbacks, 0);
    mock.assert_async().await;
}
