//! Write coalescing and caching in front of a rate-limited [`DocumentApi`].
//!
//! Write path: `set`/`delete` record a [`PendingChange`], update the cached
//! document in place, and re-arm a debounce timer. When the timer fires,
//! one flush merges every queued change into the document and issues a
//! single remote replace.
//!
//! Flush cycle, under the write lock:
//! 1. Snapshot and clear the pending queue (empty queue: no remote call)
//! 2. Merge base = cached document if still valid, else a fresh fetch
//! 3. Apply the snapshot, replace the remote document
//! 4. Success: cache the merged document. Failure: put the snapshot back
//!    (newer writes win) and re-arm the timer.
//!
//! Read path: a valid cache answers directly. Otherwise the document is
//! fetched and overlaid with the in-flight snapshot and the pending queue, so
//! a read after a write always observes the write.

use std::sync::{Arc, Weak};
use std::time::Duration;

use demoday_core::document::{apply_change, apply_changes, overlay, requeue};
use demoday_core::{ChangeSet, Document, PendingChange, RemoteCredentials};
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::DocumentApi;
use crate::config::SyncConfig;
use crate::error::RemoteError;
use crate::metrics::{record_flush, set_pending_changes};

/// Result of one flush attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending; no remote call was made.
    Idle,
    /// This many changes reached the remote document.
    Flushed(usize),
    /// The attempt failed and this many changes were put back in the queue.
    Requeued {
        changes: usize,
        retryable: bool,
        retry_in: Duration,
    },
    /// The flush task panicked or was cancelled before finishing.
    Aborted,
}

/// Point-in-time view of the coalescer for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Changes waiting for the next flush.
    pub pending_changes: usize,
    /// Changes currently being written.
    pub in_flight_changes: usize,
    /// Age of the cached document, if one is held.
    pub cache_age: Option<Duration>,
    /// Consecutive failed flushes since the last success.
    pub failure_streak: u32,
    /// Message of the most recent flush failure, cleared on success.
    pub last_error: Option<String>,
    /// The last failure will not clear without a configuration change
    /// (credentials rejected, document gone).
    pub blocked: bool,
}

#[derive(Debug)]
struct CacheEntry {
    doc: Document,
    fetched_at: Instant,
}

impl CacheEntry {
    fn new(doc: Document) -> Self {
        Self {
            doc,
            fetched_at: Instant::now(),
        }
    }

    fn is_valid(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

#[derive(Debug, Default)]
struct State {
    cache: Option<CacheEntry>,
    pending: ChangeSet,
    in_flight: ChangeSet,
    // Bumped whenever a flush installs a new cache, so that a slower read
    // that started earlier does not overwrite it with an older fetch.
    cache_epoch: u64,
    failure_streak: u32,
    last_error: Option<String>,
    blocked: bool,
}

struct Inner {
    api: Arc<dyn DocumentApi>,
    creds: RemoteCredentials,
    config: SyncConfig,
    state: Mutex<State>,
    write_lock: tokio::sync::Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Cache, pending queue, debounce timer, and write lock for one remote document.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct WriteCoalescer {
    inner: Arc<Inner>,
}

impl WriteCoalescer {
    /// Creates a coalescer for the document identified by `creds`.
    #[must_use]
    pub fn new(api: Arc<dyn DocumentApi>, creds: RemoteCredentials, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                creds,
                config,
                state: Mutex::new(State::default()),
                write_lock: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Credentials this coalescer writes with.
    #[must_use]
    pub fn credentials(&self) -> &RemoteCredentials {
        &self.inner.creds
    }

    /// Returns the current value of `key`, including unflushed writes.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read(|doc| doc.get(key).cloned()).await
    }

    /// Lists the document's keys, including unflushed writes.
    pub async fn keys(&self) -> Vec<String> {
        self.inner.read(|doc| doc.keys().cloned().collect()).await
    }

    /// Queues `value` for `key` and re-arms the debounce timer.
    pub fn set(&self, key: &str, value: Value) {
        self.inner.enqueue(key, PendingChange::Put(value));
    }

    /// Queues removal of `key` and re-arms the debounce timer.
    pub fn delete(&self, key: &str) {
        self.inner.enqueue(key, PendingChange::Delete);
    }

    /// Flushes pending changes now instead of waiting for the timer.
    ///
    /// Waits for any flush already in progress. The work runs on its own task,
    /// so dropping this future does not abandon a half-finished flush.
    pub async fn flush(&self) -> FlushOutcome {
        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.flush().await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "flush task did not complete");
                FlushOutcome::Aborted
            }
        }
    }

    /// Snapshot of queue, cache, and failure state.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        let state = self.inner.state.lock();
        SyncStatus {
            pending_changes: state.pending.len(),
            in_flight_changes: state.in_flight.len(),
            cache_age: state.cache.as_ref().map(|c| c.fetched_at.elapsed()),
            failure_streak: state.failure_streak,
            last_error: state.last_error.clone(),
            blocked: state.blocked,
        }
    }
}

impl Inner {
    async fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        let epoch = {
            let state = self.state.lock();
            if let Some(cache) = state.cache.as_ref().filter(|c| c.is_valid(self.config.cache_ttl)) {
                return f(&cache.doc);
            }
            state.cache_epoch
        };

        let fetched = self.api.fetch_document(&self.creds).await;

        let mut state = self.state.lock();
        let state = &mut *state;
        match fetched {
            Ok(remote) if state.cache_epoch == epoch => {
                let doc = overlay(&remote, &[&state.in_flight, &state.pending]);
                tracing::debug!(keys = doc.len(), "remote document cached");
                f(&state.cache.insert(CacheEntry::new(doc)).doc)
            }
            // A flush installed a newer cache while this fetch was in flight.
            Ok(_) => match state.cache.as_ref() {
                Some(cache) => f(&cache.doc),
                None => f(&overlay(&Document::new(), &[&state.in_flight, &state.pending])),
            },
            Err(e) => {
                tracing::warn!(error = %e, "remote read failed; serving last known document");
                let base = state.cache.as_ref().map(|c| c.doc.clone()).unwrap_or_default();
                f(&overlay(&base, &[&state.in_flight, &state.pending]))
            }
        }
    }

    fn enqueue(self: &Arc<Self>, key: &str, change: PendingChange) {
        let pending = {
            let mut state = self.state.lock();
            if let Some(cache) = state.cache.as_mut() {
                apply_change(&mut cache.doc, key, &change);
            }
            state.pending.insert(key.to_string(), change);
            state.pending.len()
        };
        tracing::debug!(key = %key, pending, "change queued");
        set_pending_changes(pending);
        self.schedule(self.config.batch_delay);
    }

    /// Re-arms the single debounce timer to fire `delay` from now.
    fn schedule(self: &Arc<Self>, delay: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                // Detached: re-arming the timer must not cancel a running flush.
                tokio::spawn(async move {
                    inner.flush().await;
                });
            }
        });
        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn flush(self: &Arc<Self>) -> FlushOutcome {
        let _write = self.write_lock.lock().await;

        let (snapshot, cached_base) = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                return FlushOutcome::Idle;
            }
            let snapshot = std::mem::take(&mut state.pending);
            state.in_flight.clone_from(&snapshot);
            let cached_base = state
                .cache
                .as_ref()
                .filter(|c| c.is_valid(self.config.cache_ttl))
                .map(|c| c.doc.clone());
            (snapshot, cached_base)
        };
        set_pending_changes(0);
        let changes = snapshot.len();
        tracing::debug!(changes, "flushing pending changes");

        let base = match cached_base {
            Some(doc) => doc,
            None => match self.api.fetch_document(&self.creds).await {
                Ok(doc) => doc,
                Err(e) => return self.fail(snapshot, &e),
            },
        };

        let mut merged = base;
        apply_changes(&mut merged, &snapshot);

        if let Err(e) = self.api.replace_document(&self.creds, &merged).await {
            return self.fail(snapshot, &e);
        }

        {
            let mut state = self.state.lock();
            state.in_flight.clear();
            let doc = overlay(&merged, &[&state.pending]);
            state.cache = Some(CacheEntry::new(doc));
            state.cache_epoch += 1;
            state.failure_streak = 0;
            state.last_error = None;
            state.blocked = false;
        }
        record_flush("ok");
        tracing::info!(changes, "pending changes written to remote document");
        FlushOutcome::Flushed(changes)
    }

    /// Puts a failed snapshot back in the queue and re-arms the timer.
    fn fail(self: &Arc<Self>, snapshot: ChangeSet, error: &RemoteError) -> FlushOutcome {
        let retryable = error.is_retryable();
        let (changes, pending, retry_in) = {
            let mut state = self.state.lock();
            state.in_flight.clear();
            let changes = requeue(&mut state.pending, snapshot);
            state.failure_streak = state.failure_streak.saturating_add(1);
            state.last_error = Some(error.to_string());
            state.blocked = !retryable;
            let retry_in = self.retry_delay(error, state.failure_streak);
            (changes, state.pending.len(), retry_in)
        };
        set_pending_changes(pending);

        if error.is_rate_limited() {
            record_flush("rate_limited");
            tracing::warn!(changes, ?retry_in, "remote rate limit reached; changes stay queued");
        } else if retryable {
            record_flush("retry");
            tracing::warn!(changes, ?retry_in, error = %error, "flush failed; changes stay queued");
        } else {
            record_flush("blocked");
            tracing::error!(
                changes,
                ?retry_in,
                error = %error,
                "flush rejected by remote; check the access token and document id"
            );
        }

        self.schedule(retry_in);
        FlushOutcome::Requeued {
            changes,
            retryable,
            retry_in,
        }
    }

    /// Delay before the next attempt after a failure.
    ///
    /// Rate limits wait for the server's hint (at least the batch delay);
    /// other transient failures retry after the batch delay; permanent
    /// failures back off exponentially with jitter. All capped.
    fn retry_delay(&self, error: &RemoteError, streak: u32) -> Duration {
        let base = self.config.batch_delay;
        let cap = self.config.max_retry_backoff.max(base);
        let delay = match error {
            RemoteError::RateLimited { retry_after } => {
                retry_after.map_or(base, |hint| hint.max(base))
            }
            e if e.is_retryable() => base,
            _ => {
                let exp = base.saturating_mul(1_u32 << streak.saturating_sub(1).min(16));
                let jitter_cap = u64::try_from(exp.as_millis() / 10).unwrap_or(u64::MAX).min(100);
                let jitter = rand::rng().random_range(0..=jitter_cap);
                exp.saturating_add(Duration::from_millis(jitter))
            }
        };
        delay.min(cap)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
        let pending = self.state.get_mut().pending.len();
        if pending > 0 {
            tracing::warn!(pending, "remote backend dropped with unflushed changes");
        }
    }
}
