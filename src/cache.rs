use std::cell::Cell;

use crate::utils::MyHash;

struct Entry<K, V> {
    key: K,
    value: V,
}

/// Direct-mapped computed table.
///
/// Each key hashes to exactly one slot; a newer result simply evicts the
/// older one. Keys are compared in full, so a slot collision never returns a
/// wrong result.
pub struct Cache<K, V> {
    data: Vec<Option<Entry<K, V>>>,
    bitmask: u64,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<K, V> Cache<K, V> {
    /// Create a new cache with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 24, "Bits should be in the range 0..=24");

        let size = 1 << bits;
        Self {
            data: std::iter::repeat_with(|| None).take(size).collect(),
            bitmask: (size - 1) as u64,
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Get the number of cache hits.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }
    /// Get the number of cache misses.
    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    fn slot(&self, key: &K) -> usize
    where
        K: MyHash,
    {
        (key.hash() & self.bitmask) as usize
    }

    /// Get the cached result.
    pub fn get(&self, key: &K) -> Option<&V>
    where
        K: MyHash + Eq,
    {
        match &self.data[self.slot(key)] {
            Some(entry) if &entry.key == key => {
                self.hits.set(self.hits.get() + 1);
                Some(&entry.value)
            }
            _ => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    /// Insert a result into the cache.
    pub fn insert(&mut self, key: K, value: V)
    where
        K: MyHash,
    {
        let slot = self.slot(&key);
        self.data[slot] = Some(Entry { key, value });
    }
}
