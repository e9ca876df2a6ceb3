//! Time-bucketed memoization.
//!
//! A [`TtlCache`] maps resolved argument values to results. With
//! [`Ttl::Window`] the wall clock is split into consecutive buckets of the
//! window length, counted from the moment the cache was created; a cached
//! value is only returned to calls that land in the same bucket. Buckets that
//! have rolled over are never pruned.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of "now" for bucket arithmetic.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Entries live as long as the cache.
    Forever,
    /// Entries are valid within one window-sized bucket. A zero window never rolls over.
    Window(Duration),
}

impl Ttl {
    pub const fn secs(secs: u64) -> Self {
        Ttl::Window(Duration::from_secs(secs))
    }

    fn bucket(self, elapsed: Duration) -> u64 {
        match self {
            Ttl::Forever => 0,
            Ttl::Window(window) => elapsed
                .as_nanos()
                .checked_div(window.as_nanos())
                .map_or(0, |bucket| u64::try_from(bucket).unwrap_or(u64::MAX)),
        }
    }
}

pub struct TtlCache<K, V> {
    ttl: Ttl,
    anchor: Instant,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<u64, HashMap<K, V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn new(ttl: Ttl) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Ttl, clock: Arc<dyn Clock>) -> Self {
        let anchor = clock.now();
        Self {
            ttl,
            anchor,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn current_bucket(&self) -> u64 {
        let elapsed = self.clock.now().saturating_duration_since(self.anchor);
        let bucket = self.ttl.bucket(elapsed);
        tracing::trace!(?elapsed, bucket, "resolved cache bucket");
        bucket
    }

    /// Returns the value cached for `key` in the current bucket.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lookup(self.current_bucket(), key)
    }

    /// Returns the cached value or computes, stores and returns a fresh one.
    ///
    /// Errors from `f` are passed through and nothing is stored, so the next
    /// call with the same key runs `f` again.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, f: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        let bucket = self.current_bucket();
        if let Some(hit) = self.lookup(bucket, &key) {
            tracing::debug!(bucket, "memo hit");
            return Ok(hit);
        }

        tracing::debug!(bucket, "memo miss");
        let value = f(&key)?;
        self.store(bucket, key, value.clone());
        Ok(value)
    }

    /// Async counterpart of [`TtlCache::get_or_try_insert_with`].
    ///
    /// The lock is released while `fetch` runs; two concurrent misses on the
    /// same key both fetch and the later one wins.
    pub async fn get_or_try_fetch<E, F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let bucket = self.current_bucket();
        if let Some(hit) = self.lookup(bucket, &key) {
            tracing::debug!(bucket, "memo hit");
            return Ok(hit);
        }

        tracing::debug!(bucket, "memo miss");
        let value = fetch().await?;
        self.store(bucket, key, value.clone());
        Ok(value)
    }

    /// Number of stored entries, including unreachable ones from past buckets.
    pub fn len(&self) -> usize {
        self.buckets.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.buckets.lock().clear();
    }

    fn lookup(&self, bucket: u64, key: &K) -> Option<V> {
        self.buckets
            .lock()
            .get(&bucket)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    fn store(&self, bucket: u64, key: K, value: V) {
        self.buckets
            .lock()
            .entry(bucket)
            .or_default()
            .insert(key, value);
    }
}

impl<K, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: usize = self.buckets.lock().values().map(HashMap::len).sum();
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("entries", &entries)
            .finish()
    }
}

/// A function bundled with its own cache.
pub struct Memoized<K, V, F> {
    func: F,
    cache: TtlCache<K, V>,
}

impl<K, V, F> Memoized<K, V, F>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn new(ttl: Ttl, func: F) -> Self {
        Self {
            func,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn with_clock(ttl: Ttl, clock: Arc<dyn Clock>, func: F) -> Self {
        Self {
            func,
            cache: TtlCache::with_clock(ttl, clock),
        }
    }

    pub fn call<E>(&self, args: K) -> Result<V, E>
    where
        F: Fn(&K) -> Result<V, E>,
    {
        self.cache
            .get_or_try_insert_with(args, |args| (self.func)(args))
    }

    pub fn cache(&self) -> &TtlCache<K, V> {
        &self.cache
    }
}

impl<K, V, F> fmt::Debug for Memoized<K, V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
