use std::ops::Index;

use crate::utils::MyHash;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    /// Index of the next entry in the same bucket, 0 if none.
    next: usize,
}

/// Hash-consing table: equal values are stored once and share an index.
///
/// Index 0 is a sentry and is never handed out, so `0` can mark the end of a
/// bucket chain. The bucket array has a fixed size of `2^bits`; the entry
/// storage grows on demand.
pub struct Table<T> {
    data: Vec<Entry<T>>,
    buckets: Vec<usize>,
    bitmask: u64,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with `2^bits` buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 24, "Bucket bits should be in the range 0..=24");

        let buckets_size = 1 << bits;
        let mut data = Vec::with_capacity(buckets_size);
        data.push(Entry {
            value: T::default(),
            next: 0,
        });

        Self {
            data,
            buckets: vec![0; buckets_size],
            bitmask: (buckets_size - 1) as u64,
        }
    }
}

impl<T> Table<T> {
    /// Number of stored values (the sentry excluded).
    pub fn size(&self) -> usize {
        self.data.len() - 1
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }

    /// Append a value without hash-consing and return its index.
    pub fn add(&mut self, value: T) -> usize {
        self.data.push(Entry { value, next: 0 });
        self.data.len() - 1
    }
}

impl<T> Table<T>
where
    T: MyHash + Eq,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Put a value into the table and return its index.
    ///
    /// If an equal value is already stored, its index is returned instead.
    pub fn put(&mut self, value: T) -> usize {
        let bucket_index = self.bucket_index(&value);
        let mut index = self.buckets[bucket_index];

        if index == 0 {
            let i = self.add(value);
            self.buckets[bucket_index] = i;
            return i;
        }

        loop {
            if &value == self.value(index) {
                return index;
            }
            let next = self.data[index].next;
            if next == 0 {
                let i = self.add(value);
                self.data[index].next = i;
                return i;
            }
            index = next;
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}
