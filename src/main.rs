//! NFT Gallery Gateway
//!
//! This is the main entry point for the gateway service.
//! It wires the RPC access layer together and serves the gallery API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nft_gallery_gateway::cache::{LayeredStore, MemoryStore, PersistentStore, TtlClass, TtlStore};
use nft_gallery_gateway::chain::{parse_address, ChainTransport, HttpTransport, NodeSigner};
use nft_gallery_gateway::config::AppConfig;
use nft_gallery_gateway::contract::{AccountSettings, ContractService};
use nft_gallery_gateway::discovery::DiscoveryEngine;
use nft_gallery_gateway::handlers::{router, AppState};
use nft_gallery_gateway::metadata::MetadataService;
use nft_gallery_gateway::metrics::MetricsState;
use nft_gallery_gateway::queue::RateLimitedQueue;
use nft_gallery_gateway::RemoteAccelerator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    tracing::info!("Starting NFT Gallery Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        rpc = %config.rpc.url,
        contract = %config.contract.address,
        "Configuration loaded"
    );

    let address = parse_address(&config.contract.address)?;
    let transport: Arc<dyn ChainTransport> = Arc::new(HttpTransport::new(&config.rpc)?);

    // Initialize cache
    let cache = build_cache(&config)?;
    tracing::info!(
        capacity = config.cache.memory_capacity,
        persistent = config.cache.persist_dir.is_some(),
        "Cache initialized"
    );

    // Initialize RPC queue
    let queue = Arc::new(RateLimitedQueue::from_config(&config.queue));
    tracing::info!(
        min_interval_ms = config.queue.min_interval_ms,
        backoff_ms = config.queue.rate_limit_backoff_ms,
        "RPC queue initialized"
    );

    let metadata = Arc::new(MetadataService::new(&config.metadata, cache.clone(), &config.cache.ttl)?);

    let mut contract = ContractService::new(
        address,
        transport.clone(),
        cache.clone(),
        queue,
        metadata,
        config.cache.ttl.clone(),
    );

    if let Some(accelerator) = RemoteAccelerator::from_config(&config.accelerator)? {
        tracing::info!(base_url = %config.accelerator.base_url, "Remote accelerator enabled");
        contract = contract.with_accelerator(Arc::new(accelerator));
    }

    if let Some(accounts) = AccountSettings::from_config(&config.contract)? {
        tracing::info!(registry = %accounts.registry, "Token-bound accounts enabled");
        contract = contract.with_accounts(accounts);
    }

    if !config.contract.signer_address.is_empty() {
        let signer = parse_address(&config.contract.signer_address)?;
        tracing::info!(signer = %signer, "Node signer connected");
        contract = contract.with_signer(Arc::new(NodeSigner::new(transport, signer)));
    }

    let discovery = DiscoveryEngine::new(contract, config.discovery.clone());
    let metrics = Arc::new(MetricsState::new()?);
    let state = Arc::new(AppState::new(discovery.clone(), metrics));

    // Spawn periodic sweep of expired cache entries, in-flight calls and indexes
    let sweep_interval = Duration::from_secs(config.cache.sweep_interval_secs.max(1));
    let sweep_cache = cache.clone();
    let sweep_discovery = discovery.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let entries = sweep_cache.sweep_expired();
            let calls = sweep_discovery.contract().sweep();
            let indexes = sweep_discovery.sweep_expired();
            if entries + calls + indexes > 0 {
                tracing::debug!(
                    entries = entries,
                    calls = calls,
                    indexes = indexes,
                    "Swept expired cache state"
                );
            }
        }
    });
    tracing::info!(interval_secs = sweep_interval.as_secs(), "Cache sweep task started");

    // Build router
    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Memory store, fronting a persistent store when a directory is configured
fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn TtlStore>> {
    let memory = Arc::new(MemoryStore::new(config.cache.memory_capacity));
    let Some(dir) = &config.cache.persist_dir else {
        return Ok(memory as Arc<dyn TtlStore>);
    };

    let persistent = Arc::new(PersistentStore::open(
        dir,
        &config.cache.storage_prefix,
        config.cache.storage_quota_bytes,
    )?);
    let promote_ttl = TtlClass::SemiStable.ttl(&config.cache.ttl);
    Ok(Arc::new(LayeredStore::new(memory, persistent, promote_ttl)))
}

/// Initialize tracing with JSON output
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nft_gallery_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Load and validate configuration
fn load_config() -> anyhow::Result<AppConfig> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    Ok(config)
}
