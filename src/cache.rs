//! Direct-mapped operation cache (computed table).
//!
//! Each key hashes to exactly one slot. Collisions overwrite the previous entry.
//! Full keys are stored, so a lookup never returns a result computed for another key.

use std::cell::Cell;

use crate::utils::MyHash;

pub struct Cache<K, V> {
    entries: Vec<Option<(K, V)>>,
    bitmask: u64,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<K, V> Cache<K, V> {
    /// Create a new cache with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Cache bits must be in range 0..=31, got {}", bits);

        let size = 1usize << bits;
        let bitmask = (size - 1) as u64;

        Self {
            entries: std::iter::repeat_with(|| None).take(size).collect(),
            bitmask,
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    /// Drop all entries. This is O(n).
    pub fn clear(&mut self) {
        self.entries.fill_with(|| None);
    }
}

impl<K, V> Cache<K, V>
where
    K: MyHash + Eq,
    V: Copy,
{
    fn index(&self, key: &K) -> usize {
        (key.hash() & self.bitmask) as usize
    }

    pub fn get(&self, key: &K) -> Option<V> {
        match &self.entries[self.index(key)] {
            Some((k, v)) if k == key => {
                self.hits.set(self.hits.get() + 1);
                Some(*v)
            }
            _ => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let index = self.index(&key);
        self.entries[index] = Some((key, value));
    }
}
