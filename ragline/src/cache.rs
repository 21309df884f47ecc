//! Bounded embedding cache.
//!
//! [`EmbeddingCache`] is the capability the embedding layer depends on, so a
//! distributed cache can replace [`LruEmbeddingCache`] without touching call
//! sites.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use sha2::{Digest, Sha256};

/// Key/value store for embeddings, keyed by [`cache_key`].
pub trait EmbeddingCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<f32>>;

    fn set(&self, key: String, embedding: Vec<f32>);

    /// Remove an entry. Returns whether it was present.
    fn evict(&self, key: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SHA-256 of the model name and text, hex encoded.
pub fn cache_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// An approximate LRU cache split into independently locked shards.
///
/// Each shard is an exact LRU over its share of the capacity; keys are spread
/// by their leading hash byte, so concurrent callers rarely wait on the same
/// lock.
pub struct LruEmbeddingCache {
    shards: Vec<Mutex<LruCache<String, Vec<f32>>>>,
}

impl LruEmbeddingCache {
    pub const DEFAULT_SHARDS: usize = 8;

    /// Create a cache holding about `capacity` embeddings.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self::with_shards(capacity, Self::DEFAULT_SHARDS)
    }

    /// Create a cache with an explicit shard count (clamped to `1..=capacity`).
    pub fn with_shards(capacity: NonZeroUsize, shards: usize) -> Self {
        let shard_count = shards.clamp(1, capacity.get());
        let per_shard = capacity.get().div_ceil(shard_count);
        let per_shard = NonZeroUsize::new(per_shard).unwrap_or(NonZeroUsize::MIN);
        let shards = (0..shard_count).map(|_| Mutex::new(LruCache::new(per_shard))).collect();
        Self { shards }
    }

    fn shard(&self, key: &str) -> MutexGuard<'_, LruCache<String, Vec<f32>>> {
        let selector = key
            .as_bytes()
            .iter()
            .take(8)
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as usize));
        // Poisoned shards are still usable.
        self.shards[selector % self.shards.len()].lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EmbeddingCache for LruEmbeddingCache {
    fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.shard(key).get(key).cloned()
    }

    fn set(&self, key: String, embedding: Vec<f32>) {
        let mut shard = self.shard(&key);
        shard.put(key, embedding);
    }

    fn evict(&self, key: &str) -> bool {
        self.shard(key).pop(key).is_some()
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn keys_depend_on_model_and_text() {
        assert_eq!(cache_key("m", "hello"), cache_key("m", "hello"));
        assert_ne!(cache_key("m", "hello"), cache_key("n", "hello"));
        assert_ne!(cache_key("m", "hello"), cache_key("m", "hello!"));
        assert_eq!(cache_key("m", "x").len(), 64);
    }

    #[test]
    fn single_shard_evicts_least_recently_used() {
        let cache = LruEmbeddingCache::with_shards(cap(2), 1);
        cache.set("a".into(), vec![1.0]);
        cache.set("b".into(), vec![2.0]);
        assert_eq!(cache.get("a"), Some(vec![1.0]));
        cache.set("c".into(), vec![3.0]);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(vec![1.0]));
        assert_eq!(cache.get("c"), Some(vec![3.0]));
    }

    #[test]
    fn size_stays_bounded() {
        let cache = LruEmbeddingCache::with_shards(cap(16), 4);
        for i in 0..200 {
            cache.set(cache_key("m", &i.to_string()), vec![i as f32]);
        }
        assert!(cache.len() <= 16);
    }

    #[test]
    fn evict_removes_entry() {
        let cache = LruEmbeddingCache::new(cap(4));
        cache.set("k".into(), vec![0.5]);
        assert!(cache.evict("k"));
        assert!(!cache.evict("k"));
        assert!(cache.is_empty());
    }
}
