//! Session cache for the current user.
//!
//! DESIGN
//! ======
//! One entry under a fixed key, served without a network call while younger
//! than the freshness window. Concurrent misses share a single in-flight
//! fetch (`futures::future::Shared`), so N callers observe one request and the
//! same settled result.
//!
//! Each fetch is driven by its own spawned task, which settles the entry and
//! clears the in-flight slot. Callers only wait on it, so a caller that is
//! dropped mid-fetch (timeout, aborted task) never leaves the cache stuck in
//! the fetching state.
//!
//! TRADE-OFFS
//! ==========
//! Writes and invalidation bump a generation counter instead of aborting the
//! in-flight fetch. A fetch that settles under an older generation is
//! discarded and its waiters receive the newer cached value, so a slow read
//! can never clobber a login or profile write that landed after it started.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::debug;

use crate::error::SessionFetchError;
use crate::types::User;

/// Fixed cache key for the current user.
pub const CURRENT_USER_KEY: &str = "current-user";

/// Outcome of a current-user fetch. `Ok(None)` means signed out.
pub type FetchResult = Result<Option<User>, SessionFetchError>;

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct CacheEntry {
    value: Option<User>,
    stored_at: Instant,
}

struct InFlight {
    id: u64,
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CacheInner {
    entry: Option<CacheEntry>,
    in_flight: Option<InFlight>,
    generation: u64,
    next_fetch_id: u64,
}

fn lock_inner(inner: &Mutex<CacheInner>) -> MutexGuard<'_, CacheInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SessionCache {
    inner: Arc<Mutex<CacheInner>>,
    fresh_for: Duration,
}

impl SessionCache {
    #[must_use]
    pub fn new(fresh_for: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(CacheInner::default())), fresh_for }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        lock_inner(&self.inner)
    }

    /// Bumped by every write and invalidation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    #[must_use]
    pub fn fresh_for(&self) -> Duration {
        self.fresh_for
    }

    /// Cached value regardless of age; `None` when nothing is cached.
    #[must_use]
    pub fn peek(&self) -> Option<Option<User>> {
        self.lock().entry.as_ref().map(|e| e.value.clone())
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        let inner = self.lock();
        inner.entry.as_ref().is_some_and(|e| e.stored_at.elapsed() < self.fresh_for)
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Serve the cached value if fresh, otherwise run (or join) one fetch.
    pub async fn read<F, Fut>(&self, fetch: F) -> FetchResult
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        {
            let inner = self.lock();
            if let Some(entry) = inner.entry.as_ref()
                && entry.stored_at.elapsed() < self.fresh_for
            {
                debug!(key = CURRENT_USER_KEY, "session cache hit");
                return Ok(entry.value.clone());
            }
        }
        self.fetch_shared(fetch).await
    }

    /// Ignore freshness and run (or join) one fetch.
    pub async fn refetch<F, Fut>(&self, fetch: F) -> FetchResult
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        self.fetch_shared(fetch).await
    }

    async fn fetch_shared<F, Fut>(&self, fetch: F) -> FetchResult
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let shared = {
            let mut inner = self.lock();
            let generation = inner.generation;
            let joinable = inner
                .in_flight
                .as_ref()
                .filter(|flight| flight.generation == generation)
                .map(|flight| (flight.id, flight.fetch.clone()));
            if let Some((id, shared)) = joinable {
                debug!(key = CURRENT_USER_KEY, fetch_id = id, "joining in-flight session fetch");
                shared
            } else {
                let id = inner.next_fetch_id;
                inner.next_fetch_id += 1;
                let shared = settle_into(Arc::clone(&self.inner), id, generation, fetch()).boxed().shared();
                inner.in_flight = Some(InFlight { id, generation, fetch: shared.clone() });
                drop(tokio::spawn(shared.clone()));
                debug!(key = CURRENT_USER_KEY, fetch_id = id, "session cache miss, fetching");
                shared
            }
        };
        shared.await
    }

    /// Replace the cached value and restart the freshness window. In-flight
    /// fetches are superseded.
    pub fn write(&self, value: Option<User>) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.in_flight = None;
        inner.entry = Some(CacheEntry { value, stored_at: Instant::now() });
    }

    /// Drop every cached entry and supersede in-flight fetches.
    pub fn invalidate_all(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.in_flight = None;
        inner.entry = None;
        debug!(key = CURRENT_USER_KEY, "session cache cleared");
    }
}

/// Await `fetch`, then record its outcome under the cache lock. Runs exactly
/// once per fetch id, on the spawned driver or whichever waiter polls first.
async fn settle_into(
    inner: Arc<Mutex<CacheInner>>,
    id: u64,
    generation: u64,
    fetch: impl Future<Output = FetchResult>,
) -> FetchResult {
    let result = fetch.await;

    let mut inner = lock_inner(&inner);
    if inner.in_flight.as_ref().is_some_and(|f| f.id == id) {
        inner.in_flight = None;
    }
    if inner.generation != generation {
        debug!(key = CURRENT_USER_KEY, fetch_id = id, "discarding stale session fetch");
        return Ok(inner.entry.as_ref().and_then(|e| e.value.clone()));
    }
    if let Ok(value) = &result {
        inner.entry = Some(CacheEntry { value: value.clone(), stored_at: Instant::now() });
    }
    result
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
