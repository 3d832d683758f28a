// IPPAN Gateway - explorer and proxy front for an IPPAN node
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-memory TTL cache for upstream reads with single-flight fetching

use crate::error::UpstreamError;
use futures::{
    future::{BoxFuture, Shared, WeakShared},
    FutureExt,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::{sync::RwLock, time::Instant};
use tracing::debug;

/// Outcome of an upstream read, shared by every waiter of one fetch
pub type FetchResult = Result<Option<Value>, UpstreamError>;

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
type WeakFetch = WeakShared<BoxFuture<'static, FetchResult>>;

/// A cached upstream document and its deadline
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached document
    pub value: Value,
    /// The entry is never returned at or after this instant
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-wide cache of explorer reads
///
/// Entries expire lazily on read. Concurrent [`ResponseCache::get_or_fetch`]
/// calls for the same key share one upstream future; the in-flight table
/// only keeps weak handles so a fetch nobody waits for anymore is dropped.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, WeakFetch>>,
    max_items: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl ResponseCache {
    /// Creates an empty cache bounded to `max_items` entries
    pub fn new(max_items: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            max_items: max_items.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Retrieves a live value
    ///
    /// # Arguments
    /// * `key` - The cache key to look up
    ///
    /// # Returns
    /// The cached value, or `None` when missing or expired. Expired entries
    /// are removed on the way.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let expired = match self.entries.read().await.get(key) {
            Some(entry) if entry.is_live(now) => {
                debug!("Cache hit: {}", key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        self.misses.fetch_add(1, Ordering::Relaxed);

        if expired {
            debug!("Cache entry expired: {}", key);
            let mut entries = self.entries.write().await;
            // Another writer may have refreshed it meanwhile
            if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
                entries.remove(key);
            }
        } else {
            debug!("Cache miss: {}", key);
        }
        None
    }

    /// Stores a value for `ttl` and hands it back
    ///
    /// A zero `ttl` stores nothing.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) -> Value {
        if ttl.is_zero() {
            return value;
        }

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_items && !entries.contains_key(key) {
            Self::evict(&mut entries, self.max_items, now);
        }

        entries.insert(key.to_string(), CacheEntry { value: value.clone(), expires_at: now + ttl });
        value
    }

    /// Returns the cached value or runs `fetch` once for all concurrent callers
    ///
    /// # Arguments
    /// * `key` - Cache key, also the single-flight key
    /// * `ttl` - Lifetime of a stored result, zero bypasses the cache entirely
    /// * `fetch` - Produces the upstream read; only invoked when no live entry
    ///   and no in-flight fetch exist
    ///
    /// # Returns
    /// The fetched or cached value. `Ok(None)` results and errors are handed
    /// to every waiter but never stored.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        if ttl.is_zero() {
            return fetch().await;
        }

        if let Some(value) = self.get(key).await {
            return Ok(Some(value));
        }

        let shared = self.join_or_start(key, fetch);
        let result = shared.clone().await;

        if let Ok(Some(value)) = &result {
            self.set(key, value.clone(), ttl).await;
        }
        self.finish(key, &shared);

        result
    }

    fn join_or_start<F, Fut>(&self, key: &str, fetch: F) -> SharedFetch
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock();
        if let Some(existing) = in_flight.get(key).and_then(WeakShared::upgrade) {
            debug!("Joining in-flight fetch: {}", key);
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return existing;
        }

        let shared = fetch().boxed().shared();
        if let Some(weak) = shared.downgrade() {
            in_flight.insert(key.to_string(), weak);
        }
        shared
    }

    /// Drops the in-flight slot if it still belongs to `shared` or is dead
    fn finish(&self, key: &str, shared: &SharedFetch) {
        let mut in_flight = self.in_flight.lock();
        let stale = match in_flight.get(key).map(WeakShared::upgrade) {
            Some(Some(current)) => current.ptr_eq(shared),
            Some(None) => true,
            None => false,
        };
        if stale {
            in_flight.remove(key);
        }
    }

    /// Drops expired entries, then the 10% closest to expiry if still full
    fn evict(entries: &mut HashMap<String, CacheEntry>, max_items: usize, now: Instant) {
        entries.retain(|_, entry| entry.is_live(now));
        if entries.len() < max_items {
            return;
        }

        let mut by_deadline: Vec<(Instant, String)> =
            entries.iter().map(|(key, entry)| (entry.expires_at, key.clone())).collect();
        by_deadline.sort();

        let to_remove = (entries.len() / 10).max(1);
        for (_, key) in by_deadline.into_iter().take(to_remove) {
            debug!("Evicting cache entry: {}", key);
            entries.remove(&key);
        }
    }

    /// Number of stored entries, expired ones included until next read
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Number of fetches that still have at least one waiter
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().values().filter(|weak| weak.upgrade().is_some()).count()
    }

    /// Returns cache statistics
    ///
    /// # Returns
    /// JSON object with entry counts, in-flight fetches and hit/miss counters
    pub async fn detailed_stats(&self) -> Value {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let live = entries.values().filter(|entry| entry.is_live(now)).count();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        json!({
            "entries": entries.len(),
            "liveEntries": live,
            "maxEntries": self.max_items,
            "inFlight": self.in_flight_count(),
            "hits": hits,
            "misses": misses,
            "coalesced": self.coalesced.load(Ordering::Relaxed),
            "hitRate": if lookups == 0 {
                "0.0%".to_string()
            } else {
                format!("{:.1}%", hits as f64 / lookups as f64 * 100.0)
            },
        })
    }
}
