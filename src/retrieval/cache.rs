//! The four named caches the pipeline consults on the hot path: embedding
//! vectors (keyed by content hash), LLM rewrite variants (TTL-bound), page
//! metadata (LRU), and the semantic query log (its own eviction policy,
//! defined in [`crate::retrieval::query_log`]).
//!
//! No crate in this workspace's dependency stack provides a ready-made LRU
//! or TTL cache, so these are built directly on `std::sync` primitives
//! rather than reaching for an unrelated ecosystem crate never used
//! elsewhere in the tree.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// Size-bounded LRU cache keyed by an arbitrary hashable key. Eviction
/// removes the least-recently-used entry once `capacity` is exceeded.
///
/// Misses never write under the read lock: a caller that misses computes
/// the value outside the lock, then calls [`LruCache::insert`], which
/// re-checks for a racing concurrent insert before taking the write lock's
/// effect (double-checked insert; last writer wins, no duplicate work is
/// observable to later readers).
pub struct LruCache<K, V> {
    capacity: usize,
    entries: RwLock<HashMap<K, (V, u64)>>,
    clock: Mutex<u64>,
}

impl<K, V> LruCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    /// Creates an empty cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
            clock: Mutex::new(0),
        }
    }

    /// Returns a clone of the cached value for `key`, if present, bumping
    /// its recency.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        #[allow(clippy::unwrap_used)]
        let mut entries = self.entries.write().unwrap();
        let value = entries.get(key).map(|(v, _)| v.clone());
        if value.is_some() {
            if let Some(entry) = entries.get_mut(key) {
                entry.1 = tick;
            }
        }
        value
    }

    /// Inserts or overwrites `key`, evicting the least-recently-used entry
    /// if this insert pushes the cache over capacity.
    pub fn insert(&self, key: K, value: V) {
        let tick = self.next_tick();
        #[allow(clippy::unwrap_used)]
        let mut entries = self.entries.write().unwrap();
        entries.insert(key, (value, tick));
        if entries.len() > self.capacity {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, (_, t))| *t)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }
    }

    /// Current number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        self.entries.read().unwrap().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_tick(&self) -> u64 {
        #[allow(clippy::unwrap_used)]
        let mut clock = self.clock.lock().unwrap();
        *clock += 1;
        *clock
    }
}

/// Caches embedding vectors keyed by `SHA-256(text ++ model)`, so the same
/// passage embedded under two different models gets two cache slots.
pub struct EmbeddingCache {
    inner: LruCache<String, Vec<f32>>,
}

impl EmbeddingCache {
    /// Creates an embedding cache with the given entry capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Derives the cache key for a `(text, model)` pair.
    #[must_use]
    pub fn key(text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(b"\0");
        hasher.update(model.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Looks up a cached embedding for `(text, model)`.
    #[must_use]
    pub fn get(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        self.inner.get(&Self::key(text, model))
    }

    /// Caches an embedding for `(text, model)`.
    pub fn insert(&self, text: &str, model: &str, embedding: Vec<f32>) {
        self.inner.insert(Self::key(text, model), embedding);
    }
}

/// Caches LLM-rewritten query variants, keyed by the normalized query, each
/// entry expiring after a fixed TTL rather than by recency.
pub struct RewriteCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Vec<String>, Instant)>>,
}

impl RewriteCache {
    /// Creates a rewrite cache whose entries expire after `ttl_secs`
    /// seconds.
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns cached variants for `query`, if present and not expired.
    #[must_use]
    pub fn get(&self, query: &str) -> Option<Vec<String>> {
        #[allow(clippy::unwrap_used)]
        let entries = self.entries.read().unwrap();
        entries.get(query).and_then(|(variants, inserted_at)| {
            (inserted_at.elapsed() < self.ttl).then(|| variants.clone())
        })
    }

    /// Caches `variants` for `query`, timestamped now.
    pub fn insert(&self, query: &str, variants: Vec<String>) {
        #[allow(clippy::unwrap_used)]
        let mut entries = self.entries.write().unwrap();
        entries.insert(query.to_string(), (variants, Instant::now()));
    }
}

/// Caches chunk metadata by `chunk_id`, LRU-bounded.
pub struct PageCache {
    inner: LruCache<String, crate::retrieval::chunk::Chunk>,
}

impl PageCache {
    /// Creates a page cache with the given entry capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Looks up a cached chunk by id.
    #[must_use]
    pub fn get(&self, chunk_id: &str) -> Option<crate::retrieval::chunk::Chunk> {
        self.inner.get(&chunk_id.to_string())
    }

    /// Caches a chunk.
    pub fn insert(&self, chunk: crate::retrieval::chunk::Chunk) {
        self.inner.insert(chunk.chunk_id.clone(), chunk);
    }
}
