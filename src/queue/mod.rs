//! Rate-limited call queue
//!
//! A single worker task drains a FIFO of deferred RPC calls, one at a time:
//! - After a success it waits `min_interval` before the next pop
//! - After a rate-limit error it raises the [`RateLimitSignal`], sleeps the
//!   full backoff, clears the signal and only then hands the error back
//! - After any other error it waits `error_delay` and moves on
//!
//! The queue never retries by itself; `execute_with_retry` does that for the
//! caller. A request whose [`CancellationToken`] fires before its turn is
//! skipped without running.

mod classifier;
mod signal;

pub use classifier::*;
pub use signal::*;

use crate::config::QueueConfig;
use crate::error::{AppError, AppResult};
use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Retry parameters for `execute_with_retry`
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_retry_delay(),
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// `base_delay * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Result of one executed call as seen by the worker
enum Outcome {
    Succeeded,
    RateLimited(String),
    Failed,
}

struct Completion {
    outcome: Outcome,
    /// Hands the result to the waiting caller
    deliver: Box<dyn FnOnce() + Send>,
}

struct QueuedRequest {
    id: u64,
    cancel: CancellationToken,
    task: BoxFuture<'static, Completion>,
    enqueued_at: Instant,
}

#[derive(Default)]
struct Counters {
    depth: AtomicUsize,
    executed: AtomicU64,
    failed: AtomicU64,
    rate_limited: AtomicU64,
    skipped: AtomicU64,
}

/// Queue statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    /// Requests waiting for their turn
    pub depth: usize,
    /// Calls that succeeded
    pub executed: u64,
    /// Calls that failed for reasons other than rate limiting
    pub failed: u64,
    /// Calls rejected by the provider's rate limit
    pub rate_limited: u64,
    /// Requests skipped because they were cancelled
    pub skipped: u64,
}

/// Global serial queue for blockchain RPC calls
pub struct RateLimitedQueue {
    tx: mpsc::UnboundedSender<QueuedRequest>,
    signal: Arc<RateLimitSignal>,
    classifier: Arc<dyn ErrorClassifier>,
    retry: RetryPolicy,
    next_id: AtomicU64,
    counters: Arc<Counters>,
}

impl RateLimitedQueue {
    /// Create the queue and spawn its worker on the current runtime
    pub fn new(
        config: &QueueConfig,
        classifier: Arc<dyn ErrorClassifier>,
        signal: Arc<RateLimitSignal>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        tokio::spawn(run_worker(
            rx,
            signal.clone(),
            WorkerTiming {
                min_interval: config.min_interval(),
                rate_limit_backoff: config.rate_limit_backoff(),
                error_delay: config.error_delay(),
            },
            counters.clone(),
        ));

        Self {
            tx,
            signal,
            classifier,
            retry: RetryPolicy::from_config(config),
            next_id: AtomicU64::new(1),
            counters,
        }
    }

    /// Queue with the default provider classifier and a fresh signal
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config,
            Arc::new(ProviderErrorClassifier::from_config(config)),
            Arc::new(RateLimitSignal::new()),
        )
    }

    pub fn signal(&self) -> &Arc<RateLimitSignal> {
        &self.signal
    }

    pub fn classifier(&self) -> &Arc<dyn ErrorClassifier> {
        &self.classifier
    }

    /// Retry policy built from the queue configuration
    pub fn default_retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.counters.depth.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    /// Run `producer` when its turn comes
    pub async fn execute<T, F, Fut>(&self, producer: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        self.execute_cancellable(CancellationToken::new(), producer).await
    }

    /// Run `producer` when its turn comes, unless `cancel` fires first
    ///
    /// Cancelling after the call has started only stops the wait; the call
    /// itself runs to completion.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        cancel: CancellationToken,
        producer: F,
    ) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let (result_tx, result_rx) = oneshot::channel();
        let classifier = self.classifier.clone();

        let task = async move {
            let result = producer().await;
            let outcome = match &result {
                Ok(_) => Outcome::Succeeded,
                Err(e) => match classifier.classify(e) {
                    ErrorKind::RateLimited => Outcome::RateLimited(e.to_string()),
                    _ => Outcome::Failed,
                },
            };
            Completion {
                outcome,
                deliver: Box::new(move || {
                    // Caller may have stopped waiting
                    let _ = result_tx.send(result);
                }),
            }
        }
        .boxed();

        let request = QueuedRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            cancel: cancel.clone(),
            task,
            enqueued_at: Instant::now(),
        };

        self.counters.depth.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(request).is_err() {
            self.counters.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(AppError::Internal("RPC queue worker stopped".to_string()));
        }

        tokio::select! {
            biased;
            result = result_rx => match result {
                Ok(result) => result,
                Err(_) if cancel.is_cancelled() => Err(AppError::Cancelled),
                Err(_) => Err(AppError::Internal("RPC queue dropped the request".to_string())),
            },
            _ = cancel.cancelled() => Err(AppError::Cancelled),
        }
    }

    /// Run `producer` through the queue, retrying retryable failures
    ///
    /// Rate-limit failures have already served their backoff inside the
    /// queue, so they are resubmitted immediately and bump the retry counter
    /// on the signal. Transient failures wait `base_delay * 2^attempt`.
    /// Reverts and invalid input are returned at once.
    pub async fn execute_with_retry<T, F, Fut>(&self, producer: F, policy: RetryPolicy) -> AppResult<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        self.execute_with_retry_cancellable(CancellationToken::new(), producer, policy)
            .await
    }

    /// Cancellable variant of [`execute_with_retry`](Self::execute_with_retry)
    pub async fn execute_with_retry_cancellable<T, F, Fut>(
        &self,
        cancel: CancellationToken,
        producer: F,
        policy: RetryPolicy,
    ) -> AppResult<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let producer = Arc::new(producer);
        let mut attempt = 0u32;

        loop {
            let p = producer.clone();
            match self.execute_cancellable(cancel.clone(), move || (*p)()).await {
                Ok(value) => {
                    if attempt > 0 {
                        self.signal.reset_retries();
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let kind = self.classifier.classify(&e);
                    if !kind.is_retryable() || attempt >= policy.max_retries {
                        if attempt > 0 {
                            tracing::warn!(attempts = attempt + 1, error = %e, "Giving up after retries");
                        }
                        return Err(e);
                    }

                    if kind == ErrorKind::RateLimited {
                        self.signal.increment_retry();
                        tracing::debug!(attempt = attempt + 1, "Retrying after rate limit");
                    } else {
                        let delay = policy.delay_for(attempt);
                        tracing::debug!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying after transient failure"
                        );
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = cancel.cancelled() => return Err(AppError::Cancelled),
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }
}

struct WorkerTiming {
    min_interval: Duration,
    rate_limit_backoff: Duration,
    error_delay: Duration,
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<QueuedRequest>,
    signal: Arc<RateLimitSignal>,
    timing: WorkerTiming,
    counters: Arc<Counters>,
) {
    while let Some(request) = rx.recv().await {
        counters.depth.fetch_sub(1, Ordering::Relaxed);

        if request.cancel.is_cancelled() {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(request_id = request.id, "Skipping cancelled request");
            continue;
        }

        tracing::trace!(
            request_id = request.id,
            waited_ms = request.enqueued_at.elapsed().as_millis() as u64,
            "Executing queued request"
        );

        let Completion { outcome, deliver } = request.task.await;
        match outcome {
            Outcome::Succeeded => {
                counters.executed.fetch_add(1, Ordering::Relaxed);
                deliver();
                sleep(timing.min_interval).await;
            }
            Outcome::RateLimited(message) => {
                counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                signal.raise(&message, timing.rate_limit_backoff);
                sleep(timing.rate_limit_backoff).await;
                signal.clear();
                deliver();
            }
            Outcome::Failed => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                deliver();
                sleep(timing.error_delay).await;
            }
        }
    }

    tracing::debug!("RPC queue worker stopped");
}
