//! Bounded, insertion-ordered caches backing the scanner and the renderer.

use std::collections::HashMap;
use std::time::SystemTime;

/// A cached value together with the timestamp that decides its validity.
///
/// The meaning of `stamp` is up to the owner: the tree cache stores the
/// wall-clock insertion time, the render cache stores the source file's
/// modification time.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stamp: SystemTime,
    seq: u64,
}

/// A size-bounded map that evicts its oldest entry, by insertion order,
/// once it grows past `max_size`.
#[derive(Debug)]
pub struct BoundedCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    max_size: usize,
    next_seq: u64,
}

impl<V> BoundedCache<V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_size: max_size.max(1),
            next_seq: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Inserts a value, replacing any existing entry under the same key.
    /// A replaced entry counts as freshly inserted for eviction purposes.
    pub fn insert(&mut self, key: String, value: V, stamp: SystemTime) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, CacheEntry { value, stamp, seq });
        while self.entries.len() > self.max_size {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> SystemTime {
        SystemTime::now()
    }

    #[test]
    fn never_exceeds_max_size() {
        let mut cache = BoundedCache::new(3);
        for i in 0..10 {
            cache.insert(format!("key-{i}"), i, now());
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn evicts_oldest_insertion_first() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a".to_string(), 1, now());
        cache.insert("b".to_string(), 2, now());
        cache.insert("c".to_string(), 3, now());
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b").map(|e| e.value), Some(2));
        assert_eq!(cache.get("c").map(|e| e.value), Some(3));
    }

    #[test]
    fn reinserting_a_key_does_not_grow_the_cache() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a".to_string(), 1, now());
        cache.insert("a".to_string(), 2, now());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").map(|e| e.value), Some(2));
    }

    #[test]
    fn reinsertion_refreshes_eviction_order() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a".to_string(), 1, now());
        cache.insert("b".to_string(), 2, now());
        cache.insert("a".to_string(), 3, now());
        cache.insert("c".to_string(), 4, now());
        // "b" is now the oldest insertion and goes first
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").map(|e| e.value), Some(3));
    }

    #[test]
    fn remove_and_clear() {
        let mut cache = BoundedCache::new(4);
        cache.insert("a".to_string(), 1, now());
        cache.insert("b".to_string(), 2, now());
        assert!(cache.remove("a").is_some());
        assert!(cache.remove("a").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
