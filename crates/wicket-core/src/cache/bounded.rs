//! Bounded insertion-ordered cache.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// A capacity-capped map ordered by write recency.
///
/// Inserting over capacity evicts the single oldest entry. Re-inserting an
/// existing key (or refreshing it via [`get_refresh`](Self::get_refresh))
/// moves it to the newest position without changing the size. Plain reads via
/// [`peek`](Self::peek) do not affect eviction order; handlers that want
/// touch-on-read semantics opt in explicitly.
pub struct BoundedCache<K, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one; a cache that can hold nothing
    /// is never useful.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner: LruCache::new(capacity) }
    }

    /// Looks up a key and refreshes its recency on a hit.
    pub fn get_refresh(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Looks up a key without touching its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.inner.peek(key)
    }

    /// Inserts a value at the newest position, evicting the oldest entry if
    /// the cache is over capacity afterwards.
    pub fn insert(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    /// Returns the entry for `key`, creating it at the newest position via
    /// `create` if absent. Hits are refreshed like [`get_refresh`](Self::get_refresh).
    pub fn get_or_insert_with<F: FnOnce() -> V>(&mut self, key: K, create: F) -> &mut V
    where
        K: Clone,
    {
        if !self.inner.contains(&key) {
            self.inner.put(key.clone(), create());
        }
        self.inner.get_mut(&key).expect("entry present or just inserted")
    }

    /// Removes and returns the entry for `key`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    /// Iterates over entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.inner.len())
            .field("capacity", &self.inner.cap().get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_entry_first() {
        let mut cache = BoundedCache::new(3);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        cache.insert("d", 4);

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
        assert!(cache.contains(&"d"));
    }

    #[test]
    fn test_reinsert_refreshes_eviction_order() {
        let mut cache = BoundedCache::new(3);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        // Refreshing "a" makes "b" the oldest entry.
        cache.insert("a", 10);
        assert_eq!(cache.len(), 3);

        cache.insert("d", 4);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
    }

    #[test]
    fn test_get_refresh_promotes_hit() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);

        assert_eq!(cache.get_refresh(&"a"), Some(&1));
        cache.insert("c", 3);

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);

        assert_eq!(cache.peek(&"a"), Some(&1));
        cache.insert("c", 3);

        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut cache: BoundedCache<u64, Vec<u32>> = BoundedCache::new(2);
        cache.get_or_insert_with(1, Vec::new).push(7);
        cache.get_or_insert_with(1, Vec::new).push(8);

        assert_eq!(cache.peek(&1), Some(&vec![7, 8]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut cache = BoundedCache::new(0);
        cache.insert("a", 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_and_remove() {
        let mut cache = BoundedCache::new(4);
        cache.insert("a", 1);
        cache.insert("b", 2);

        assert_eq!(cache.remove(&"a"), Some(1));
        assert!(!cache.contains(&"a"));

        cache.clear();
        assert!(cache.is_empty());
    }
}
