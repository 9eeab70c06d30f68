use std::sync::Arc;

use crate::job::{lock_or_fatal, IntermediatePair, JobShared, OutputPair};

/// Per-worker handle passed to `map` and `reduce`. Carries the worker's id
/// (to find its own slot in the shared per-worker table) and a reference
/// to the job's shared state (for `emit3` and, internally, the shuffle and
/// reduce phases).
pub struct WorkerContext<K2, V2, K3, V3> {
    pub(crate) id: usize,
    pub(crate) shared: Arc<JobShared<K2, V2, K3, V3>>,
}

impl<K2, V2, K3, V3> WorkerContext<K2, V2, K3, V3> {
    pub(crate) fn new(id: usize, shared: Arc<JobShared<K2, V2, K3, V3>>) -> Self {
        WorkerContext { id, shared }
    }

    /// Append to this worker's own intermediate vector. No locking: only
    /// this worker ever touches its own slot during MAP.
    pub fn emit2(&self, key: K2, value: V2) {
        unsafe { self.shared.per_worker[self.id].get_mut() }.push(IntermediatePair(key, value));
    }

    /// Append to the shared output sequence under a mutex.
    pub fn emit3(&self, key: K3, value: V3) {
        lock_or_fatal(&self.shared.output, "output mutex").push(OutputPair(key, value));
    }
}
