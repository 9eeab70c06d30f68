use crate::config::{NUM_PAGES, OFFSET_WIDTH, PAGE_SIZE, TABLES_DEPTH};
use crate::memory::PhysicalMemory;

/// Candidate frame to evict: the leaf page maximizing cyclic distance from
/// the page we're trying to reach, plus enough of its parent link to
/// detach it.
pub(crate) struct EvictionCandidate {
    pub frame: u64,
    pub virtual_page: u64,
    pub parent: u64,
    pub parent_slot: u64,
}

/// The three output channels a single DFS pass over the frame tree
/// computes simultaneously, modeled as a sum type instead of the
/// original's eleven out-parameters.
pub(crate) enum DfsOutcome {
    /// Case 1: a frame whose subtree is entirely zero, reusable directly.
    EmptyTable { frame: u64, parent: u64, parent_slot: u64 },
    /// Neither an empty table nor (yet) a verdict on eviction: the highest
    /// frame index seen, and the best eviction candidate found so far (if
    /// the tree has reached its deepest level at least once).
    NoEmptyTable {
        max_frame_index: u64,
        eviction: Option<EvictionCandidate>,
    },
}

/// Walk the frame tree rooted at frame 0, looking for (in priority order)
/// a recyclable empty table, otherwise tracking the maximum frame index in
/// use and the cyclic-distance-maximizing eviction candidate. `saved_frame`
/// is excluded from the empty-table search because it's the frame on the
/// translation path currently in progress.
pub(crate) fn search(memory: &PhysicalMemory, saved_frame: u64, desired_page: u64) -> DfsOutcome {
    let mut max_frame_index = 0u64;
    let mut eviction: Option<EvictionCandidate> = None;

    let found = visit(
        memory,
        0,
        saved_frame,
        0,
        0,
        desired_page,
        &mut max_frame_index,
        &mut eviction,
        0,
        0,
    );

    match found {
        Some((frame, parent, parent_slot)) => DfsOutcome::EmptyTable { frame, parent, parent_slot },
        None => DfsOutcome::NoEmptyTable { max_frame_index, eviction },
    }
}

fn cyclic_distance(a: u64, b: u64) -> u64 {
    let diff = (a as i64 - b as i64).unsigned_abs();
    std::cmp::min(NUM_PAGES - diff, diff)
}

#[allow(clippy::too_many_arguments)]
fn visit(
    memory: &PhysicalMemory,
    frame: u64,
    saved_frame: u64,
    depth: u32,
    virtual_page: u64,
    desired_page: u64,
    max_frame_index: &mut u64,
    eviction: &mut Option<EvictionCandidate>,
    parent: u64,
    parent_slot: u64,
) -> Option<(u64, u64, u64)> {
    if depth == TABLES_DEPTH {
        let distance = cyclic_distance(desired_page, virtual_page);
        let is_better = match eviction {
            None => true,
            Some(current) => distance > cyclic_distance(desired_page, current.virtual_page),
        };
        if is_better {
            *eviction = Some(EvictionCandidate {
                frame,
                virtual_page,
                parent,
                parent_slot,
            });
        }
        return None;
    }

    let mut all_zero = true;
    for slot in 0..PAGE_SIZE {
        let entry = memory.read(frame * PAGE_SIZE + slot);
        if entry == 0 {
            continue;
        }
        all_zero = false;
        let child = entry as u64;
        if child > *max_frame_index {
            *max_frame_index = child;
        }
        let child_page = (virtual_page << OFFSET_WIDTH) | slot;
        if let Some(found) = visit(
            memory,
            child,
            saved_frame,
            depth + 1,
            child_page,
            desired_page,
            max_frame_index,
            eviction,
            frame,
            slot,
        ) {
            return Some(found);
        }
    }

    if all_zero && frame != saved_frame {
        return Some((frame, parent, parent_slot));
    }
    None
}
