//! Request deduplication
//!
//! Collapses concurrent calls sharing an identity key into one in-flight
//! future. The first caller for a key runs the producer; everyone arriving
//! while it is pending awaits the same [`Shared`] future. Successful results
//! are kept for a short window so a render burst that arrives just after
//! completion does not trigger a second call. Failures are never kept.
//!
//! Each waiter may carry its own cancellation token. A waiter that cancels
//! stops waiting; the shared call itself is cancelled only once every
//! attached waiter has cancelled.

use crate::error::AppError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

type SharedCall<V> = Shared<BoxFuture<'static, Result<V, AppError>>>;

/// One in-flight call and the waiters still interested in it
struct PendingCall<V> {
    id: u64,
    call: SharedCall<V>,
    cancel: CancellationToken,
    waiters: Arc<AtomicUsize>,
}

struct Inner<V> {
    pending: Mutex<HashMap<String, PendingCall<V>>>,
    next_id: AtomicU64,
    completed: Mutex<HashMap<String, (V, Instant)>>,
    completed_ttl: Duration,
    invocations: AtomicU64,
    joined: AtomicU64,
    short_circuited: AtomicU64,
}

/// Deduplicator statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DedupStats {
    /// Calls currently in flight
    pub pending: usize,
    /// Results held in the completed window
    pub completed: usize,
    /// Producer invocations
    pub invocations: u64,
    /// Callers that attached to an in-flight call
    pub joined: u64,
    /// Callers served from the completed window
    pub short_circuited: u64,
}

/// Deduplicates concurrent producers by key
pub struct RequestDeduplicator<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for RequestDeduplicator<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> RequestDeduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a deduplicator keeping successful results for `completed_ttl`
    pub fn new(completed_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                completed: Mutex::new(HashMap::new()),
                completed_ttl,
                invocations: AtomicU64::new(0),
                joined: AtomicU64::new(0),
                short_circuited: AtomicU64::new(0),
            }),
        }
    }

    /// Run `producer` unless an identical call is in flight or just finished
    pub async fn execute<F, Fut>(&self, key: &str, producer: F) -> Result<V, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, AppError>> + Send + 'static,
    {
        self.execute_cancellable(key, CancellationToken::new(), |_| producer())
            .await
    }

    /// Like [`execute`](Self::execute), but this caller stops waiting once
    /// `cancel` fires
    ///
    /// `producer` receives the token of the shared call, which is cancelled
    /// only when every waiter attached to it has cancelled. A caller that
    /// cancels gets `Cancelled`; the others still receive the result.
    pub async fn execute_cancellable<F, Fut>(
        &self,
        key: &str,
        cancel: CancellationToken,
        producer: F,
    ) -> Result<V, AppError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<V, AppError>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        if let Some(value) = self.completed(key) {
            self.inner.short_circuited.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = key, "Dedup window hit");
            return Ok(value);
        }

        let (call, shared_cancel, waiters) = {
            let mut pending = self.inner.pending.lock();
            match pending.get(key) {
                // A call abandoned by all of its waiters cannot be joined
                Some(existing) if !existing.cancel.is_cancelled() => {
                    self.inner.joined.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(key = key, "Joining in-flight call");
                    existing.waiters.fetch_add(1, Ordering::SeqCst);
                    (existing.call.clone(), existing.cancel.clone(), existing.waiters.clone())
                }
                _ => {
                    self.inner.invocations.fetch_add(1, Ordering::Relaxed);
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let shared_cancel = CancellationToken::new();
                    let waiters = Arc::new(AtomicUsize::new(1));
                    let call = Self::wrap(
                        self.inner.clone(),
                        key.to_string(),
                        id,
                        producer(shared_cancel.clone()),
                    );
                    pending.insert(
                        key.to_string(),
                        PendingCall {
                            id,
                            call: call.clone(),
                            cancel: shared_cancel.clone(),
                            waiters: waiters.clone(),
                        },
                    );
                    (call, shared_cancel, waiters)
                }
            }
        };

        tokio::select! {
            result = call => {
                waiters.fetch_sub(1, Ordering::SeqCst);
                result
            }
            _ = cancel.cancelled() => {
                if waiters.fetch_sub(1, Ordering::SeqCst) == 1 {
                    tracing::debug!(key = key, "Every waiter cancelled, abandoning shared call");
                    shared_cancel.cancel();
                }
                Err(AppError::Cancelled)
            }
        }
    }

    /// Wrap the producer so bookkeeping happens exactly once, whichever
    /// waiter drives the shared future to completion
    fn wrap<Fut>(inner: Arc<Inner<V>>, key: String, id: u64, fut: Fut) -> SharedCall<V>
    where
        Fut: Future<Output = Result<V, AppError>> + Send + 'static,
    {
        async move {
            let result = fut.await;
            if let Ok(value) = &result {
                inner
                    .completed
                    .lock()
                    .insert(key.clone(), (value.clone(), Instant::now()));
            }
            let mut pending = inner.pending.lock();
            // A newer call may already have replaced an abandoned one
            if pending.get(&key).map_or(false, |p| p.id == id) {
                pending.remove(&key);
            }
            result
        }
        .boxed()
        .shared()
    }

    fn completed(&self, key: &str) -> Option<V> {
        let mut completed = self.inner.completed.lock();
        match completed.get(key) {
            Some((value, at)) if at.elapsed() < self.inner.completed_ttl => Some(value.clone()),
            Some(_) => {
                completed.remove(key);
                None
            }
            None => None,
        }
    }

    /// Forget a completed result so the next call hits the producer
    pub fn forget(&self, key: &str) {
        self.inner.completed.lock().remove(key);
    }

    /// Forget every completed result whose key starts with `prefix`
    pub fn forget_prefix(&self, prefix: &str) {
        self.inner.completed.lock().retain(|k, _| !k.starts_with(prefix));
    }

    /// Drop completed results older than the window
    pub fn sweep_expired(&self) -> usize {
        let ttl = self.inner.completed_ttl;
        let mut completed = self.inner.completed.lock();
        let before = completed.len();
        completed.retain(|_, (_, at)| at.elapsed() < ttl);
        before - completed.len()
    }

    /// Whether a call for `key` is in flight
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.pending.lock().contains_key(key)
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            pending: self.inner.pending.lock().len(),
            completed: self.inner.completed.lock().len(),
            invocations: self.inner.invocations.load(Ordering::Relaxed),
            joined: self.inner.joined.load(Ordering::Relaxed),
            short_circuited: self.inner.short_circuited.load(Ordering::Relaxed),
        }
    }
}
