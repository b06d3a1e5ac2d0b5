//! Process-wide rate-limit status
//!
//! Mutated only by the queue; observed by the gallery API (snapshot and
//! WebSocket stream).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Snapshot of the rate-limit state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateLimitStatus {
    /// Queue is paused after a rate-limit error
    pub is_limited: bool,
    /// Estimated resume time
    pub retry_at: Option<DateTime<Utc>>,
    /// Provider message that caused the pause
    pub message: String,
    /// Rate-limit retries since the last success
    pub retry_count: u32,
}

impl RateLimitStatus {
    /// Seconds left before the queue resumes (0 when not limited)
    pub fn seconds_until_retry(&self) -> i64 {
        match (self.is_limited, self.retry_at) {
            (true, Some(at)) => (at - Utc::now()).num_seconds().max(0),
            _ => 0,
        }
    }
}

/// Rate-limit signal shared by the queue and its observers
pub struct RateLimitSignal {
    state: RwLock<RateLimitStatus>,
    tx: broadcast::Sender<RateLimitStatus>,
    limited_events: AtomicU64,
}

impl Default for RateLimitSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(RateLimitStatus::default()),
            tx,
            limited_events: AtomicU64::new(0),
        }
    }

    /// Current status
    pub fn current(&self) -> RateLimitStatus {
        self.state.read().clone()
    }

    pub fn is_limited(&self) -> bool {
        self.state.read().is_limited
    }

    /// Stream of every status change
    pub fn subscribe(&self) -> broadcast::Receiver<RateLimitStatus> {
        self.tx.subscribe()
    }

    /// Number of times the signal has been raised
    pub fn limited_events(&self) -> u64 {
        self.limited_events.load(Ordering::Relaxed)
    }

    pub(crate) fn raise(&self, message: &str, backoff: Duration) {
        let retry_at = chrono::Duration::from_std(backoff)
            .ok()
            .map(|d| Utc::now() + d);
        self.update(|s| {
            s.is_limited = true;
            s.retry_at = retry_at;
            s.message = message.to_string();
        });
        self.limited_events.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            message = message,
            backoff_ms = backoff.as_millis() as u64,
            "Rate limit detected, pausing queue"
        );
    }

    pub(crate) fn clear(&self) {
        self.update(|s| {
            s.is_limited = false;
            s.retry_at = None;
            s.message.clear();
        });
        tracing::info!("Rate limit backoff elapsed, resuming queue");
    }

    pub(crate) fn increment_retry(&self) {
        self.update(|s| s.retry_count += 1);
    }

    pub(crate) fn reset_retries(&self) {
        if self.state.read().retry_count == 0 {
            return;
        }
        self.update(|s| s.retry_count = 0);
    }

    fn update(&self, f: impl FnOnce(&mut RateLimitStatus)) {
        let snapshot = {
            let mut state = self.state.write();
            f(&mut state);
            state.clone()
        };
        // No receivers is fine
        let _ = self.tx.send(snapshot);
    }
}
