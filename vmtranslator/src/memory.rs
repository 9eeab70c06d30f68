use std::collections::HashMap;

use crate::config::{PAGE_SIZE, RAM_SIZE};

/// The physical memory I/O primitive: word-indexed RAM plus a
/// page-granular evict/restore pair standing in for a backing store.
/// Grounded on `original_source/Ex4`'s `PhysicalMemory.h` contract
/// (`PMread`/`PMwrite`/`PMevict`/`PMrestore`). Persistent storage is out
/// of scope, so the backing store only needs to outlive one
/// `PhysicalMemory` value.
pub(crate) struct PhysicalMemory {
    ram: Vec<i64>,
    swap: HashMap<u64, [i64; PAGE_SIZE as usize]>,
}

impl PhysicalMemory {
    pub(crate) fn new() -> Self {
        PhysicalMemory {
            ram: vec![0i64; RAM_SIZE as usize],
            swap: HashMap::new(),
        }
    }

    pub(crate) fn read(&self, addr: u64) -> i64 {
        self.ram[addr as usize]
    }

    pub(crate) fn write(&mut self, addr: u64, value: i64) {
        self.ram[addr as usize] = value;
    }

    /// Flush frame `frame`'s contents to the page `page`'s backing-store
    /// slot.
    pub(crate) fn evict(&mut self, frame: u64, page: u64) {
        let start = (frame * PAGE_SIZE) as usize;
        let mut block = [0i64; PAGE_SIZE as usize];
        block.copy_from_slice(&self.ram[start..start + PAGE_SIZE as usize]);
        self.swap.insert(page, block);
    }

    /// Load page `page`'s backing-store slot into frame `frame`. A page
    /// that was never evicted restores as all zeros, matching a freshly
    /// zero-initialized disk image.
    pub(crate) fn restore(&mut self, frame: u64, page: u64) {
        let start = (frame * PAGE_SIZE) as usize;
        let block = self.swap.get(&page).copied().unwrap_or([0i64; PAGE_SIZE as usize]);
        self.ram[start..start + PAGE_SIZE as usize].copy_from_slice(&block);
    }
}
