//! Persisted Cache Tests
//!
//! Contract reads keep working when the persistent tier is full, and a
//! restarted process reuses what was persisted.

use crate::mock_chain::*;
use nft_gallery_gateway::cache::{LayeredStore, MemoryStore, PersistentStore, TtlStore};
use nft_gallery_gateway::config::{MetadataConfig, TtlConfig};
use nft_gallery_gateway::contract::ContractService;
use nft_gallery_gateway::metadata::MetadataService;
use nft_gallery_gateway::queue::RateLimitedQueue;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn layered(dir: &Path, quota: u64) -> (Arc<dyn TtlStore>, Arc<PersistentStore>) {
    let persistent = Arc::new(PersistentStore::open(dir, "gallery_", quota).unwrap());
    let store = LayeredStore::new(
        Arc::new(MemoryStore::new(100)),
        persistent.clone(),
        Duration::from_secs(60),
    );
    (Arc::new(store), persistent)
}

fn contract(chain: Arc<MockChain>, store: Arc<dyn TtlStore>) -> ContractService {
    let ttl = TtlConfig::default();
    let metadata = Arc::new(MetadataService::new(&MetadataConfig::default(), store.clone(), &ttl).unwrap());
    ContractService::new(
        GALLERY,
        chain,
        store,
        Arc::new(RateLimitedQueue::from_config(&fast_queue_config())),
        metadata,
        ttl,
    )
}

#[tokio::test]
async fn test_reads_survive_exhausted_quota() {
    let dir = TempDir::new().unwrap();
    let chain = Arc::new(MockChain::new());
    for n in 1..=5 {
        chain.mint(n, addr(1), addr(0xC1));
    }
    // Too small for even one entry
    let (store, persistent) = layered(dir.path(), 16);
    let contract = contract(chain.clone(), store);

    for n in 1..=5 {
        assert_eq!(contract.owner_of(id(n)).await.unwrap(), addr(1));
    }

    assert_eq!(persistent.used_bytes(), 0);
    // Memory tier still serves the values
    for n in 1..=5 {
        contract.owner_of(id(n)).await.unwrap();
    }
    assert_eq!(chain.call_count("ownerOf"), 5);
}

#[tokio::test]
async fn test_persisted_reads_survive_restart() {
    let dir = TempDir::new().unwrap();
    let chain = Arc::new(MockChain::new());
    chain.mint(1, addr(1), addr(0xC1));

    {
        let (store, _) = layered(dir.path(), 1024 * 1024);
        let contract = contract(chain.clone(), store);
        assert_eq!(contract.name().await.unwrap(), "Gallery");
    }

    let (store, persistent) = layered(dir.path(), 1024 * 1024);
    assert!(persistent.used_bytes() > 0);
    let restarted = contract(chain.clone(), store);

    assert_eq!(restarted.name().await.unwrap(), "Gallery");
    assert_eq!(chain.call_count("name"), 1);
}
