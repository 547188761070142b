//! # Bounded FIFO containers
//!
//! Fixed-capacity map and set that evict the oldest *inserted* entry once
//! full. Access never refreshes an entry's position (this is not an LRU).
//!
//! Every bounded in-memory structure in the node (peer repository, verified
//! block cache, rate limiter records, future block buffer) is built on
//! [`BoundedFifoMap`] so they all evict the same way.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Fixed-capacity map with insertion-order eviction.
///
/// Replacing the value of an existing key keeps the key's original position
/// in the eviction order (last write wins on the value only).
#[derive(Debug, Clone)]
pub struct BoundedFifoMap<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K, V> BoundedFifoMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            order: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Insert or replace. Returns the evicted entry, if the insert of a new
    /// key pushed the oldest one out.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.pop_oldest()
        } else {
            None
        };

        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        evicted
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        if let Some(position) = self.order.iter().position(|k| k == key) {
            self.order.remove(position);
        }
        Some(value)
    }

    /// Remove and return the oldest entry.
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        while let Some(key) = self.order.pop_front() {
            if let Some(value) = self.entries.remove(&key) {
                return Some((key, value));
            }
        }
        None
    }

    /// Keep only the entries matching the predicate.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.entries.retain(|k, v| keep(k, v));
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Keys, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.order
            .iter()
            .filter_map(move |k| self.entries.get(k).map(|v| (k, v)))
    }

    /// Values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}

/// Fixed-capacity set with insertion-order eviction.
#[derive(Debug, Clone)]
pub struct BoundedFifoSet<K> {
    inner: BoundedFifoMap<K, ()>,
}

impl<K> BoundedFifoSet<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: BoundedFifoMap::new(capacity),
        }
    }

    /// Returns `true` if the key was not present before.
    pub fn insert(&mut self, key: K) -> bool {
        if self.inner.contains_key(&key) {
            return false;
        }
        self.inner.insert(key, ());
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.inner.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Members, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_evicts_oldest_insert() {
        let mut map = BoundedFifoMap::new(2);
        assert!(map.insert("a", 1).is_none());
        assert!(map.insert("b", 2).is_none());

        assert_eq!(map.insert("c", 3), Some(("a", 1)));
        assert!(!map.contains_key(&"a"));
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut map = BoundedFifoMap::new(2);
        map.insert("a", 1);
        map.insert("b", 2);
        assert!(map.insert("a", 10).is_none());
        assert_eq!(map.get(&"a"), Some(&10));

        // "a" is still the oldest entry.
        assert_eq!(map.insert("c", 3), Some(("a", 10)));
    }

    #[test]
    fn test_access_does_not_refresh() {
        let mut set = BoundedFifoSet::new(2);
        set.insert(1);
        set.insert(2);
        assert!(set.contains(&1));
        set.insert(3);
        assert!(!set.contains(&1));
        assert!(set.contains(&2) && set.contains(&3));
    }

    #[test]
    fn test_remove_and_retain_keep_order_consistent() {
        let mut map = BoundedFifoMap::new(4);
        for i in 0..4 {
            map.insert(i, i * 10);
        }
        assert_eq!(map.remove(&1), Some(10));
        map.retain(|k, _| *k != 2);
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![0, 3]);

        map.insert(4, 40);
        map.insert(5, 50);
        map.insert(6, 60);
        assert_eq!(map.len(), 4);
        assert!(!map.contains_key(&0));
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut set = BoundedFifoSet::new(0);
        assert_eq!(set.capacity(), 1);
        assert!(set.insert("x"));
        assert!(!set.insert("x"));
        assert_eq!(set.len(), 1);
    }

    fn proptest_config() -> ProptestConfig {
        let cases = std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(32);
        ProptestConfig::with_cases(cases)
    }

    proptest! {
        #![proptest_config(proptest_config())]

        #[test]
        fn prop_bound_holds_and_earliest_are_evicted(capacity in 1usize..64, extra in 1usize..64) {
            let mut set = BoundedFifoSet::new(capacity);
            for key in 0..capacity + extra {
                set.insert(key);
            }

            prop_assert_eq!(set.len(), capacity);
            for key in 0..extra {
                prop_assert!(!set.contains(&key));
            }
            for key in extra..capacity + extra {
                prop_assert!(set.contains(&key));
            }
        }
    }
}
