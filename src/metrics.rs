//! Prometheus metrics for the gallery gateway
//!
//! Values are sampled from component statistics at scrape time:
//! - Cache entries, hits and misses
//! - Deduplicator invocations and joins
//! - Queue depth and outcomes
//! - Rate-limit state and retry count

use crate::accelerator::AcceleratorStats;
use crate::cache::CacheStats;
use crate::dedup::DedupStats;
use crate::discovery::DiscoveryStats;
use crate::error::{AppError, AppResult};
use crate::queue::{QueueStats, RateLimitStatus};
use prometheus::{Encoder, IntGauge, Opts, Registry, TextEncoder};

/// Component statistics gathered for one scrape
#[derive(Debug, Clone, Default)]
pub struct MetricsSample {
    pub cache: CacheStats,
    pub dedup: DedupStats,
    pub queue: QueueStats,
    pub rate_limit: RateLimitStatus,
    pub rate_limit_events: u64,
    pub accelerator: Option<AcceleratorStats>,
    pub discovery: DiscoveryStats,
}

/// Metrics state
pub struct MetricsState {
    registry: Registry,
    pub cache_entries: IntGauge,
    pub cache_hits: IntGauge,
    pub cache_misses: IntGauge,
    pub dedup_invocations: IntGauge,
    pub dedup_joined: IntGauge,
    pub queue_depth: IntGauge,
    pub queue_executed: IntGauge,
    pub queue_failed: IntGauge,
    pub queue_rate_limited: IntGauge,
    pub queue_skipped: IntGauge,
    /// 1 while the queue is paused by a rate limit
    pub rate_limited: IntGauge,
    pub rate_limit_events: IntGauge,
    pub rate_limit_retry_count: IntGauge,
    pub accelerator_hits: IntGauge,
    pub accelerator_fallbacks: IntGauge,
    pub discovery_indexes: IntGauge,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> AppResult<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))
        .map_err(|e| AppError::Internal(format!("Failed to create gauge {}: {}", name, e)))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| AppError::Internal(format!("Failed to register gauge {}: {}", name, e)))?;
    Ok(gauge)
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered
    pub fn new() -> AppResult<Self> {
        let registry = Registry::new();
        Ok(Self {
            cache_entries: gauge(&registry, "gallery_cache_entries", "Entries in the in-memory cache")?,
            cache_hits: gauge(&registry, "gallery_cache_hits", "Cache hits since start")?,
            cache_misses: gauge(&registry, "gallery_cache_misses", "Cache misses since start")?,
            dedup_invocations: gauge(&registry, "gallery_dedup_invocations", "Deduplicated producer invocations")?,
            dedup_joined: gauge(&registry, "gallery_dedup_joined", "Callers that joined an in-flight call")?,
            queue_depth: gauge(&registry, "gallery_queue_depth", "RPC calls waiting in the queue")?,
            queue_executed: gauge(&registry, "gallery_queue_executed", "RPC calls that succeeded")?,
            queue_failed: gauge(&registry, "gallery_queue_failed", "RPC calls that failed")?,
            queue_rate_limited: gauge(&registry, "gallery_queue_rate_limited", "RPC calls rejected by rate limits")?,
            queue_skipped: gauge(&registry, "gallery_queue_skipped", "Cancelled RPC calls skipped")?,
            rate_limited: gauge(&registry, "gallery_rate_limited", "Queue paused by a rate limit (1 = paused)")?,
            rate_limit_events: gauge(&registry, "gallery_rate_limit_events", "Rate-limit pauses since start")?,
            rate_limit_retry_count: gauge(&registry, "gallery_rate_limit_retry_count", "Rate-limit retries since last success")?,
            accelerator_hits: gauge(&registry, "gallery_accelerator_hits", "Reads answered by the accelerator")?,
            accelerator_fallbacks: gauge(&registry, "gallery_accelerator_fallbacks", "Accelerator misses that fell back to RPC")?,
            discovery_indexes: gauge(&registry, "gallery_discovery_indexes", "Published discovery indexes")?,
            registry,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Copy a sample into the gauges
    pub fn observe(&self, sample: &MetricsSample) {
        self.cache_entries.set(clamp(sample.cache.entries as u64));
        self.cache_hits.set(clamp(sample.cache.hits));
        self.cache_misses.set(clamp(sample.cache.misses));
        self.dedup_invocations.set(clamp(sample.dedup.invocations));
        self.dedup_joined.set(clamp(sample.dedup.joined));
        self.queue_depth.set(clamp(sample.queue.depth as u64));
        self.queue_executed.set(clamp(sample.queue.executed));
        self.queue_failed.set(clamp(sample.queue.failed));
        self.queue_rate_limited.set(clamp(sample.queue.rate_limited));
        self.queue_skipped.set(clamp(sample.queue.skipped));
        self.rate_limited.set(i64::from(sample.rate_limit.is_limited));
        self.rate_limit_events.set(clamp(sample.rate_limit_events));
        self.rate_limit_retry_count.set(i64::from(sample.rate_limit.retry_count));
        if let Some(accelerator) = &sample.accelerator {
            self.accelerator_hits.set(clamp(accelerator.hits));
            self.accelerator_fallbacks.set(clamp(accelerator.fallbacks));
        }
        self.discovery_indexes.set(clamp(sample.discovery.indexes as u64));
    }

    /// Prometheus text exposition of the registry
    pub fn encode(&self) -> AppResult<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::Internal(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}
