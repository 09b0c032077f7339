//! Hash-consing storage for BDD nodes.
//!
//! Values live in a growable arena and are chained into hash buckets,
//! so that [`Table::put`] returns the same index for equal values.
//! Index 0 is a sentinel and is never handed out.

use crate::utils::MyHash;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    next: u32,
    occupied: bool,
    /// Whether the entry is reachable through the buckets.
    linked: bool,
}

impl<T: Default> Default for Entry<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            next: 0,
            occupied: false,
            linked: false,
        }
    }
}

pub struct Table<T> {
    data: Vec<Entry<T>>,
    buckets: Vec<u32>,
    bitmask: u64,
    /// Indices of dropped cells, reused before the arena grows.
    free: Vec<u32>,
    /// Number of occupied cells.
    real_size: usize,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with `2^bits` buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Storage bits should be in the range 0..=31");

        let buckets_size = 1usize << bits;
        let mut data = Vec::with_capacity(buckets_size);
        data.push(Entry {
            occupied: true,
            ..Entry::default()
        });

        Self {
            data,
            buckets: vec![0; buckets_size],
            bitmask: (buckets_size - 1) as u64,
            free: Vec::new(),
            real_size: 0,
        }
    }

    /// Allocate a cell which is not reachable through [`Table::put`].
    pub fn alloc(&mut self, value: T) -> u32 {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.data.len();
                // Handles are signed 32-bit.
                if index > i32::MAX as usize {
                    panic!("Storage is full");
                }
                self.data.push(Entry::default());
                index as u32
            }
        };
        let entry = &mut self.data[index as usize];
        entry.value = value;
        entry.next = 0;
        entry.occupied = true;
        entry.linked = false;
        self.real_size += 1;
        index
    }
}

impl<T> Table<T> {
    /// Number of occupied cells.
    pub fn real_size(&self) -> usize {
        self.real_size
    }

    /// Number of cells ever allocated, including dropped ones.
    pub fn size(&self) -> usize {
        self.data.len() - 1
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn value(&self, index: u32) -> &T {
        debug_assert_ne!(index, 0, "Index is 0");
        &self.data[index as usize].value
    }

    pub fn is_occupied(&self, index: u32) -> bool {
        self.data[index as usize].occupied
    }
}

impl<T> Table<T>
where
    T: MyHash + Eq + Default,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Put a value into the table and return its index.
    ///
    /// If an equal value is already stored, its index is returned instead.
    pub fn put(&mut self, value: T) -> u32 {
        let bucket = self.bucket_index(&value);

        let mut index = self.buckets[bucket];
        while index != 0 {
            let entry = &self.data[index as usize];
            if entry.value == value {
                return index;
            }
            index = entry.next;
        }

        let index = self.alloc(value);
        let entry = &mut self.data[index as usize];
        entry.next = self.buckets[bucket];
        entry.linked = true;
        self.buckets[bucket] = index;

        if self.real_size > 2 * self.buckets.len() {
            self.grow();
        }

        index
    }

    /// Double the number of buckets and relink every chained cell.
    fn grow(&mut self) {
        let size = self.buckets.len() * 2;
        log::debug!("Growing unique table to {} buckets", size);
        self.buckets = vec![0; size];
        self.bitmask = (size - 1) as u64;
        self.relink();
    }

    fn relink(&mut self) {
        self.buckets.fill(0);
        for index in 1..self.data.len() {
            let entry = &self.data[index];
            if !entry.occupied || !entry.linked {
                continue;
            }
            let bucket = self.bucket_index(&entry.value);
            self.data[index].next = self.buckets[bucket];
            self.buckets[bucket] = index as u32;
        }
    }

    /// Drop every linked cell for which `keep` returns `false`, then rebuild the chains.
    ///
    /// Cells created by [`Table::alloc`] are never dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(u32) -> bool) -> usize {
        let mut dropped = 0;
        for index in 1..self.data.len() {
            let entry = &self.data[index];
            if entry.occupied && entry.linked && !keep(index as u32) {
                let entry = &mut self.data[index];
                entry.occupied = false;
                entry.linked = false;
                entry.next = 0;
                self.free.push(index as u32);
                self.real_size -= 1;
                dropped += 1;
            }
        }
        self.relink();
        dropped
    }
}
