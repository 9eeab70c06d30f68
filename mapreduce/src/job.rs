use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::error::fatal_platform;

/// An intermediate (K2, V2) pair produced by `map` and consumed by `reduce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediatePair<K2, V2>(pub K2, pub V2);

/// A final (K3, V3) pair produced by `reduce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPair<K3, V3>(pub K3, pub V3);

/// Coarse pipeline phase, used for progress reporting. Monotonically
/// increasing: `getJobState` never observes a regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Stage {
    Undefined = 0,
    Map = 1,
    Shuffle = 2,
    Reduce = 3,
}

impl Stage {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Stage::Undefined,
            1 => Stage::Map,
            2 => Stage::Shuffle,
            _ => Stage::Reduce,
        }
    }
}

/// A point-in-time snapshot of a running or finished job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobState {
    pub stage: Stage,
    pub percentage: f32,
}

/// A single worker's intermediate vector. Written only by its owning
/// worker during MAP, read and drained only by worker 0 during SHUFFLE.
/// That ownership handoff is legal without a lock because every worker
/// rendezvous-es at a barrier between the two phases, so this carries no
/// synchronization of its own, matching `emit2`'s "no locking" contract,
/// and the `unsafe impl Sync` below is sound exactly because of that
/// barrier, not in spite of it.
pub(crate) struct PerWorkerSlot<T>(UnsafeCell<T>);

unsafe impl<T> Sync for PerWorkerSlot<T> {}

impl<T> PerWorkerSlot<T> {
    fn new(value: T) -> Self {
        PerWorkerSlot(UnsafeCell::new(value))
    }

    /// # Safety
    /// The caller must be the slot's owning worker during MAP, or worker 0
    /// during SHUFFLE (after the sort barrier), never two threads at once.
    pub(crate) unsafe fn get_mut(&self) -> &mut T {
        &mut *self.0.get()
    }
}

pub(crate) fn lock_or_fatal<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex
        .lock()
        .unwrap_or_else(|_| fatal_platform(&format!("{what} poisoned")))
}

pub(crate) struct JobShared<K2, V2, K3, V3> {
    pub n_workers: usize,
    pub input_len: usize,
    pub stage: AtomicU8,
    pub map_claim: AtomicUsize,
    pub map_finished: AtomicUsize,
    pub shuffle_emitted: AtomicUsize,
    pub reduce_emitted: AtomicUsize,
    pub total_pairs_after_map: AtomicUsize,
    pub per_worker: Vec<PerWorkerSlot<Vec<IntermediatePair<K2, V2>>>>,
    pub work_queue: Mutex<VecDeque<Vec<IntermediatePair<K2, V2>>>>,
    pub output: Mutex<Vec<OutputPair<K3, V3>>>,
    pub barrier: Barrier,
}

impl<K2, V2, K3, V3> JobShared<K2, V2, K3, V3> {
    pub(crate) fn new(n_workers: usize, input_len: usize) -> Self {
        JobShared {
            n_workers,
            input_len,
            stage: AtomicU8::new(Stage::Undefined as u8),
            map_claim: AtomicUsize::new(0),
            map_finished: AtomicUsize::new(0),
            shuffle_emitted: AtomicUsize::new(0),
            reduce_emitted: AtomicUsize::new(0),
            total_pairs_after_map: AtomicUsize::new(0),
            per_worker: (0..n_workers).map(|_| PerWorkerSlot::new(Vec::new())).collect(),
            work_queue: Mutex::new(VecDeque::new()),
            output: Mutex::new(Vec::new()),
            barrier: Barrier::new(n_workers),
        }
    }

    fn percentage(&self, finished: usize, total: usize) -> f32 {
        if total == 0 {
            0.0
        } else {
            finished as f32 / total as f32 * 100.0
        }
    }

    pub(crate) fn snapshot(&self) -> JobState {
        let stage = Stage::from_u8(self.stage.load(Ordering::SeqCst));
        let percentage = match stage {
            Stage::Undefined => 0.0,
            Stage::Map => self.percentage(
                self.map_finished.load(Ordering::SeqCst),
                self.input_len,
            ),
            Stage::Shuffle => self.percentage(
                self.shuffle_emitted.load(Ordering::SeqCst),
                self.total_pairs_after_map.load(Ordering::SeqCst),
            ),
            Stage::Reduce => self.percentage(
                self.reduce_emitted.load(Ordering::SeqCst),
                self.total_pairs_after_map.load(Ordering::SeqCst),
            ),
        };
        JobState { stage, percentage }
    }
}

/// An opaque handle to a running (or finished) MapReduce job.
pub struct JobHandle<K2, V2, K3, V3> {
    pub(crate) shared: Arc<JobShared<K2, V2, K3, V3>>,
    threads: Mutex<Option<Vec<JoinHandle<()>>>>,
    joined: Mutex<bool>,
}

impl<K2, V2, K3, V3> JobHandle<K2, V2, K3, V3> {
    pub(crate) fn new(shared: Arc<JobShared<K2, V2, K3, V3>>, threads: Vec<JoinHandle<()>>) -> Self {
        JobHandle {
            shared,
            threads: Mutex::new(Some(threads)),
            joined: Mutex::new(false),
        }
    }

    /// Join every worker. Idempotent: the first call joins, every later
    /// call returns immediately without touching the threads again.
    pub fn wait(&self) {
        {
            let mut joined = lock_or_fatal(&self.joined, "join flag mutex");
            if *joined {
                return;
            }
            *joined = true;
        }
        let handles = lock_or_fatal(&self.threads, "thread handle mutex").take();
        if let Some(handles) = handles {
            for handle in handles {
                if handle.join().is_err() {
                    fatal_platform("a mapreduce worker thread panicked");
                }
            }
        }
    }

    /// Snapshot the current stage and completion percentage. Safe to call
    /// concurrently with running workers; never blocks them.
    pub fn state(&self) -> JobState {
        self.shared.snapshot()
    }

    /// Wait for the job, then release its resources and return everything
    /// `reduce` emitted. Consumes the handle, so the type system itself
    /// enforces "exactly once per job" rather than a runtime check.
    pub fn close(self) -> Vec<OutputPair<K3, V3>> {
        self.wait();
        std::mem::take(&mut *lock_or_fatal(&self.shared.output, "output mutex"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_zero_on_empty_denominator() {
        let shared: JobShared<u32, u32, u32, u32> = JobShared::new(2, 0);
        shared.stage.store(Stage::Map as u8, Ordering::SeqCst);
        assert_eq!(shared.snapshot().percentage, 0.0);
    }

    #[test]
    fn stage_ordering_never_regresses() {
        assert!(Stage::Undefined < Stage::Map);
        assert!(Stage::Map < Stage::Shuffle);
        assert!(Stage::Shuffle < Stage::Reduce);
    }

    #[test]
    fn undefined_stage_reports_zero_percent() {
        let shared: JobShared<u32, u32, u32, u32> = JobShared::new(1, 10);
        assert_eq!(shared.snapshot().stage, Stage::Undefined);
        assert_eq!(shared.snapshot().percentage, 0.0);
    }
}
