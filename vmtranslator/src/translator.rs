use bit_field::BitField;

use crate::config::{
    NUM_FRAMES, OFFSET_WIDTH, PAGE_SIZE, RAM_SIZE, ROOT_WIDTH, TABLES_DEPTH, VIRTUAL_MEMORY_SIZE,
};
use crate::dfs::{self, DfsOutcome};
use crate::error::{fatal_invariant, Error};
use crate::memory::PhysicalMemory;

enum FrameSource {
    RecycledEmptyTable,
    Fresh,
}

/// A hierarchical page-table walker over a simulated physical memory.
/// Owns the only `PhysicalMemory` it ever touches; this core is
/// single-threaded, so no locking guards the frame tree.
pub struct Translator {
    memory: PhysicalMemory,
}

impl Translator {
    /// Zero frame 0 (the root table) and return a ready-to-use translator.
    pub fn new() -> Self {
        let mut translator = Translator {
            memory: PhysicalMemory::new(),
        };
        translator.initialize();
        translator
    }

    /// Zero frame 0. Exposed separately from `new` because it's a distinct
    /// operation in its own right.
    pub fn initialize(&mut self) {
        for word in 0..PAGE_SIZE {
            self.memory.write(word, 0);
        }
    }

    /// Translate `va`, then read the word at the resulting physical
    /// address.
    pub fn read(&mut self, va: u64) -> Result<i64, Error> {
        let pa = self.translate(va)?;
        Ok(self.memory.read(pa))
    }

    /// Translate `va`, then write `value` to the resulting physical
    /// address.
    pub fn write(&mut self, va: u64, value: i64) -> Result<(), Error> {
        let pa = self.translate(va)?;
        self.memory.write(pa, value);
        Ok(())
    }

    fn translate(&mut self, va: u64) -> Result<u64, Error> {
        if va >= VIRTUAL_MEMORY_SIZE {
            return Err(Error::AddressOutOfRange(va));
        }

        let mut cur_frame = 0u64;
        for depth in 0..TABLES_DEPTH {
            let index = table_index(va, depth);
            let slot = cur_frame * PAGE_SIZE + index;
            let entry = self.memory.read(slot);

            let next_frame = if entry != 0 {
                entry as u64
            } else {
                let (frame, source) = self.acquire_frame(cur_frame, va);
                self.memory.write(slot, frame as i64);

                let is_last = depth == TABLES_DEPTH - 1;
                if !is_last {
                    if !matches!(source, FrameSource::RecycledEmptyTable) {
                        for word in 0..PAGE_SIZE {
                            self.memory.write(frame * PAGE_SIZE + word, 0);
                        }
                    }
                } else {
                    let page = va >> OFFSET_WIDTH;
                    self.memory.restore(frame, page);
                }
                frame
            };
            cur_frame = next_frame;
        }

        let offset: u64 = va.get_bits(0..OFFSET_WIDTH as usize);
        let pa = cur_frame * PAGE_SIZE + offset;
        if pa == 0 || pa >= RAM_SIZE {
            return Err(Error::InvalidPhysicalAddress(pa));
        }
        Ok(pa)
    }

    /// Obtain a frame to fill the missing mapping at `saved_frame`, in
    /// priority order: a recyclable empty table, an unused frame, or an
    /// eviction by cyclic distance from the page `va` resolves into.
    fn acquire_frame(&mut self, saved_frame: u64, va: u64) -> (u64, FrameSource) {
        let desired_page = va >> OFFSET_WIDTH;
        match dfs::search(&self.memory, saved_frame, desired_page) {
            DfsOutcome::EmptyTable {
                frame,
                parent,
                parent_slot,
            } => {
                self.memory.write(parent * PAGE_SIZE + parent_slot, 0);
                (frame, FrameSource::RecycledEmptyTable)
            }
            DfsOutcome::NoEmptyTable {
                max_frame_index,
                eviction,
            } => {
                let candidate = max_frame_index + 1;
                if candidate < NUM_FRAMES {
                    (candidate, FrameSource::Fresh)
                } else {
                    let victim = eviction.unwrap_or_else(|| {
                        fatal_invariant(
                            "frame table exhausted but DFS found no eviction candidate",
                        )
                    });
                    self.memory.evict(victim.frame, victim.virtual_page);
                    self.memory.write(victim.parent * PAGE_SIZE + victim.parent_slot, 0);
                    (victim.frame, FrameSource::Fresh)
                }
            }
        }
    }
}

impl Default for Translator {
    fn default() -> Self {
        Translator::new()
    }
}

/// Extract the index used at table level `depth` (0 = root, using
/// `ROOT_WIDTH` bits; every other level uses `OFFSET_WIDTH` bits),
/// most-significant first.
fn table_index(va: u64, depth: u32) -> u64 {
    if depth == 0 {
        let shift = OFFSET_WIDTH * TABLES_DEPTH;
        va.get_bits(shift as usize..(shift + ROOT_WIDTH) as usize)
    } else {
        let shift = OFFSET_WIDTH * (TABLES_DEPTH - depth);
        va.get_bits(shift as usize..(shift + OFFSET_WIDTH) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_read_then_write_then_read_round_trips() {
        let mut translator = Translator::new();
        assert_eq!(translator.read(0x12).unwrap(), 0);
        translator.write(0x12, 42).unwrap();
        assert_eq!(translator.read(0x12).unwrap(), 42);
    }

    #[test]
    fn out_of_range_virtual_address_is_rejected() {
        let mut translator = Translator::new();
        let err = translator.read(VIRTUAL_MEMORY_SIZE).unwrap_err();
        assert_eq!(err, Error::AddressOutOfRange(VIRTUAL_MEMORY_SIZE));
    }

    #[test]
    fn distinct_pages_stay_independent() {
        let mut translator = Translator::new();
        translator.write(0x04, 7).unwrap();
        translator.write(0x08, 9).unwrap();
        assert_eq!(translator.read(0x04).unwrap(), 7);
        assert_eq!(translator.read(0x08).unwrap(), 9);
    }
}
