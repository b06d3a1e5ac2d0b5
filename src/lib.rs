//! NFT Gallery Gateway Library
//!
//! Rate-limit-aware access to an ERC-721 gallery contract over a public RPC
//! provider: TTL caching, request deduplication, a serialized retrying queue,
//! and token discovery without an indexer.
//! This library exposes core modules for the binary and for testing.

pub mod accelerator;
pub mod cache;
pub mod chain;
pub mod config;
pub mod constants;
pub mod contract;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod queue;

// Re-export commonly used types for tests
pub use accelerator::RemoteAccelerator;
pub use cache::{CacheKey, KeyArg, LayeredStore, MemoryStore, PersistentStore, TtlClass, TtlStore, TtlStoreExt};
pub use chain::{ChainTransport, HttpTransport, NodeSigner, TransactionSigner};
pub use config::AppConfig;
pub use contract::{AccountSettings, ContractService};
pub use dedup::RequestDeduplicator;
pub use discovery::{BatchCursor, DiscoveryEngine, IndexScope};
pub use error::{AppError, AppResult};
pub use handlers::{router, AppState};
pub use metadata::MetadataService;
pub use metrics::MetricsState;
pub use queue::{RateLimitSignal, RateLimitStatus, RateLimitedQueue, RetryPolicy};
