//! Configuration management for the gallery gateway
//!
//! Loads configuration from YAML files and environment variables.
//! Environment variables override YAML values.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// RPC endpoint configuration
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Gallery contract and ERC-6551 addresses
    #[serde(default)]
    pub contract: ContractConfig,
    /// Cache tiers and TTLs
    #[serde(default)]
    pub cache: CacheConfig,
    /// Rate-limited call queue
    #[serde(default)]
    pub queue: QueueConfig,
    /// Optional remote cache accelerator
    #[serde(default)]
    pub accelerator: AcceleratorConfig,
    /// Token metadata fetching
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Token discovery engine
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// RPC endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub url: String,
    /// Per-request HTTP timeout in milliseconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_ms: u64,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_rpc_timeout() -> u64 {
    30_000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_ms: default_rpc_timeout(),
        }
    }
}

/// Gallery contract configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
    /// Gallery NFT contract address
    #[serde(default)]
    pub address: String,
    /// ERC-6551 registry address
    #[serde(default = "default_registry")]
    pub registry_address: String,
    /// ERC-6551 account implementation address
    #[serde(default)]
    pub account_implementation: String,
    /// Salt used when deriving token-bound accounts
    #[serde(default)]
    pub account_salt: u64,
    /// Chain id used when deriving token-bound accounts
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Node-managed account used for state-changing calls (empty = read-only)
    #[serde(default)]
    pub signer_address: String,
}

fn default_registry() -> String {
    // Canonical ERC-6551 registry
    "0x000000006551c19487814612e58FE06813775758".to_string()
}

fn default_chain_id() -> u64 {
    1
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            registry_address: default_registry(),
            account_implementation: String::new(),
            account_salt: 0,
            chain_id: default_chain_id(),
            signer_address: String::new(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum entries in the in-memory tier
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    /// Directory for the persisted tier (disabled when unset)
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,
    /// Key prefix for persisted entries
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,
    /// Byte quota for the persisted tier
    #[serde(default = "default_storage_quota")]
    pub storage_quota_bytes: u64,
    /// Interval of the expired-entry sweep in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// TTLs per data class
    #[serde(default)]
    pub ttl: TtlConfig,
}

fn default_memory_capacity() -> usize {
    10_000
}

fn default_storage_prefix() -> String {
    "gallery_cache_".to_string()
}

fn default_storage_quota() -> u64 {
    5 * 1024 * 1024
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: default_memory_capacity(),
            persist_dir: None,
            storage_prefix: default_storage_prefix(),
            storage_quota_bytes: default_storage_quota(),
            sweep_interval_secs: default_sweep_interval(),
            ttl: TtlConfig::default(),
        }
    }
}

/// Time-to-live per data class, in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct TtlConfig {
    /// Balances, per-owner counts, supply
    #[serde(default = "default_volatile_ttl")]
    pub volatile_secs: u64,
    /// Token URI, owner-of, index lookups
    #[serde(default = "default_semi_stable_ttl")]
    pub semi_stable_secs: u64,
    /// Contract name, creator-of-token, token-bound account
    #[serde(default = "default_immutable_ttl")]
    pub immutable_secs: u64,
    /// Creator names and creator lists
    #[serde(default = "default_creator_ttl")]
    pub creator_secs: u64,
    /// Fast partial discovery index
    #[serde(default = "default_partial_index_ttl")]
    pub partial_index_secs: u64,
    /// Complete discovery index
    #[serde(default = "default_complete_index_ttl")]
    pub complete_index_secs: u64,
    /// Deduplicator completed-result window
    #[serde(default = "default_dedup_ttl")]
    pub dedup_secs: u64,
    /// Token metadata documents
    #[serde(default = "default_metadata_ttl")]
    pub metadata_secs: u64,
}

fn default_volatile_ttl() -> u64 {
    300
}

fn default_semi_stable_ttl() -> u64 {
    600
}

fn default_immutable_ttl() -> u64 {
    3600
}

fn default_creator_ttl() -> u64 {
    86_400
}

fn default_partial_index_ttl() -> u64 {
    120
}

fn default_complete_index_ttl() -> u64 {
    1800
}

fn default_dedup_ttl() -> u64 {
    30
}

fn default_metadata_ttl() -> u64 {
    3600
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            volatile_secs: default_volatile_ttl(),
            semi_stable_secs: default_semi_stable_ttl(),
            immutable_secs: default_immutable_ttl(),
            creator_secs: default_creator_ttl(),
            partial_index_secs: default_partial_index_ttl(),
            complete_index_secs: default_complete_index_ttl(),
            dedup_secs: default_dedup_ttl(),
            metadata_secs: default_metadata_ttl(),
        }
    }
}

/// Rate-limited queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Spacing after each successful call
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,
    /// Pause after a rate-limit error
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_ms: u64,
    /// Pause after any other failure
    #[serde(default = "default_error_delay")]
    pub error_delay_ms: u64,
    /// Retries performed by `execute_with_retry`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the exponential retry delay
    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay_ms: u64,
    /// Extra provider error codes treated as rate limiting
    #[serde(default)]
    pub rate_limit_codes: Vec<i64>,
    /// Extra message fragments treated as rate limiting
    #[serde(default)]
    pub rate_limit_patterns: Vec<String>,
}

fn default_min_interval() -> u64 {
    100
}

fn default_rate_limit_backoff() -> u64 {
    10_000
}

fn default_error_delay() -> u64 {
    250
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_retry_delay() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval(),
            rate_limit_backoff_ms: default_rate_limit_backoff(),
            error_delay_ms: default_error_delay(),
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay(),
            rate_limit_codes: Vec::new(),
            rate_limit_patterns: Vec::new(),
        }
    }
}

impl QueueConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }
}

/// Remote cache accelerator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AcceleratorConfig {
    /// Whether to consult the accelerator at all
    #[serde(default)]
    pub enabled: bool,
    /// Base URL, e.g. `https://casher.example.org/api`
    #[serde(default)]
    pub base_url: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_accelerator_timeout")]
    pub timeout_ms: u64,
}

fn default_accelerator_timeout() -> u64 {
    3000
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            timeout_ms: default_accelerator_timeout(),
        }
    }
}

/// Metadata fetch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Gateway used for `ipfs://` URIs
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
    /// HTTP timeout in milliseconds
    #[serde(default = "default_metadata_timeout")]
    pub timeout_ms: u64,
}

fn default_ipfs_gateway() -> String {
    "https://ipfs.io/ipfs/".to_string()
}

fn default_metadata_timeout() -> u64 {
    10_000
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            ipfs_gateway: default_ipfs_gateway(),
            timeout_ms: default_metadata_timeout(),
        }
    }
}

/// Token discovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Default number of tokens per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Most-recent token count in the fast partial index
    #[serde(default = "default_partial_index_size")]
    pub partial_index_size: usize,
    /// Index lookups per background sub-batch
    #[serde(default = "default_background_batch")]
    pub background_batch_size: usize,
    /// Pause between background sub-batches
    #[serde(default = "default_background_delay")]
    pub background_delay_ms: u64,
    /// First block scanned for Transfer events
    #[serde(default)]
    pub log_start_block: u64,
    /// Blocks per `eth_getLogs` query
    #[serde(default = "default_log_chunk")]
    pub log_chunk_size: u64,
    /// Timeout of one log query
    #[serde(default = "default_log_timeout")]
    pub log_timeout_ms: u64,
    /// Concurrent `ownerOf` calls during a range scan
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
    /// Pause between range scan groups
    #[serde(default = "default_scan_delay")]
    pub scan_delay_ms: u64,
    /// Lower bound of the guessed id range
    #[serde(default = "default_min_scan_range")]
    pub min_scan_range: u64,
    /// Largest totalSupply the id index will enumerate
    #[serde(default = "default_max_index_supply")]
    pub max_index_supply: usize,
}

fn default_batch_size() -> usize {
    10
}

fn default_partial_index_size() -> usize {
    20
}

fn default_background_batch() -> usize {
    10
}

fn default_background_delay() -> u64 {
    100
}

fn default_log_chunk() -> u64 {
    50_000
}

fn default_log_timeout() -> u64 {
    10_000
}

fn default_scan_concurrency() -> usize {
    5
}

fn default_scan_delay() -> u64 {
    100
}

fn default_min_scan_range() -> u64 {
    100
}

fn default_max_index_supply() -> usize {
    1_000_000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            partial_index_size: default_partial_index_size(),
            background_batch_size: default_background_batch(),
            background_delay_ms: default_background_delay(),
            log_start_block: 0,
            log_chunk_size: default_log_chunk(),
            log_timeout_ms: default_log_timeout(),
            scan_concurrency: default_scan_concurrency(),
            scan_delay_ms: default_scan_delay(),
            min_scan_range: default_min_scan_range(),
            max_index_supply: default_max_index_supply(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (GALLERY_*)
    /// 2. config/config.yaml (if exists)
    /// 3. config.yaml (if exists)
    /// 4. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("rpc.url", default_rpc_url())?
            .set_default("queue.min_interval_ms", 100)?
            .set_default("queue.rate_limit_backoff_ms", 10_000)?
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/config").required(false))
            // GALLERY_CONTRACT__ADDRESS=0x... -> contract.address
            // GALLERY_ACCELERATOR__ENABLED=true -> accelerator.enabled
            .add_source(
                Environment::with_prefix("GALLERY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.url.is_empty() {
            return Err(ConfigError::Message("RPC URL must be set".to_string()));
        }

        if self.contract.address.is_empty() {
            return Err(ConfigError::Message(
                "Gallery contract address must be set via GALLERY_CONTRACT__ADDRESS".to_string(),
            ));
        }

        if self.discovery.batch_size == 0
            || self.discovery.partial_index_size == 0
            || self.discovery.background_batch_size == 0
            || self.discovery.scan_concurrency == 0
            || self.discovery.max_index_supply == 0
        {
            return Err(ConfigError::Message(
                "Discovery batch sizes must be greater than zero".to_string(),
            ));
        }

        if self.cache.ttl.partial_index_secs >= self.cache.ttl.complete_index_secs {
            return Err(ConfigError::Message(
                "Partial index TTL must be shorter than the complete index TTL".to_string(),
            ));
        }

        if self.accelerator.enabled && self.accelerator.base_url.is_empty() {
            return Err(ConfigError::Message(
                "Accelerator base URL must be set when the accelerator is enabled".to_string(),
            ));
        }

        Ok(())
    }
}
