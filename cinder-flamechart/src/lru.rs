//! Capacity-bounded map with least-recently-used eviction.

use std::{hash::Hash, num::NonZeroUsize};

/// Fixed-capacity key to value map. `get` and `insert` mark a key as most
/// recently used; `has` does not.
pub struct LruCache<K, V> {
    inner: lru::LruCache<K, V>,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: lru::LruCache::new(capacity),
        }
    }

    pub fn has(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    /// Looks up `key` and promotes it to most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Inserts or replaces `key`, evicting the least recently used entry when
    /// a new key would exceed the capacity.
    pub fn insert(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    pub fn get_or_insert(&mut self, key: K, f: impl FnOnce(&K) -> V) -> &V
    where
        K: Clone,
    {
        let for_init = key.clone();
        self.inner.get_or_insert(key, || f(&for_init))
    }

    /// Removes and returns the entry touched longest ago.
    pub fn remove_lru(&mut self) -> Option<(K, V)> {
        self.inner.pop_lru()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }
}
