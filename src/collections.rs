//! Insertion-ordered map for the `civilizations` collection.
//!
//! No crate in reach provides a stable-order map here, and none is needed:
//! per-turn collections are small, so a vector of pairs plus a hash index for
//! O(1) lookup is simply the right shape, per the data model's own guidance
//! to back insertion order with "a vector of (id, state) pairs ... plus a
//! hash index" where a language lacks one natively.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedMap<K, V> {
    entries: Vec<(K, V)>,
    #[serde(skip)]
    index: FxHashMap<K, usize>,
}

impl<K, V> Default for OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<K, V> OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, preserving first-seen order. Re-inserting an existing key
    /// updates its value in place without moving it to the back.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(&idx) = self.index.get(&key) {
            self.entries[idx].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if let Some(&idx) = self.index.get(key) {
            Some(&mut self.entries[idx].1)
        } else {
            None
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order. Never sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.entries.iter_mut().map(|(k, v)| (&*k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    /// Remove a key, preserving relative order of the remaining entries.
    /// O(n); the per-turn civilization count is small enough that this
    /// never shows up in profiling.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        let (_, value) = self.entries.remove(idx);
        for (_, v) in self.index.iter_mut() {
            if *v > idx {
                *v -= 1;
            }
        }
        Some(value)
    }
}

impl<K, V> FromIterator<(K, V)> for OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_is_insertion_order_not_sorted() {
        let mut map = OrderedMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("mid", 3);
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec![&"zeta", &"alpha", &"mid"]);
    }

    #[test]
    fn reinsert_updates_value_without_reordering() {
        let mut map = OrderedMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        map.insert("a", 99);
        assert_eq!(map.get(&"a"), Some(&99));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![&"a", &"b"]);
    }

    #[test]
    fn remove_preserves_order_of_remainder() {
        let mut map = OrderedMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        map.insert("c", 3);
        map.remove(&"b");
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![&"a", &"c"]);
        assert_eq!(map.get(&"c"), Some(&3));
    }
}
