//! A shared-memory MapReduce engine: a fixed pool of worker threads runs
//! map (embarrassingly parallel, claimed off an atomic index), a per-worker
//! sort, a single-coordinator shuffle (worker 0 only), and reduce (parallel,
//! LIFO off a shared work queue), all synchronized by two uses of one
//! reusable barrier. See `DESIGN.md` for why the per-worker intermediate
//! vectors need no lock even though they're shared across threads.

mod client;
mod context;
mod error;
mod job;
mod worker;

pub use client::MapReduceClient;
pub use context::WorkerContext;
pub use error::Error;
pub use job::{IntermediatePair, JobHandle, JobState, OutputPair, Stage};

use std::sync::Arc;
use std::thread;

use error::fatal_platform;
use job::JobShared;

/// Spawn `n_workers` threads to run `client` over `input`, and return a
/// handle to the running job. Worker and thread-primitive failures are
/// platform errors: they terminate the process rather than returning
/// through this `Result`, which is reserved for user misuse.
pub fn start_job<C, K1, V1, K2, V2, K3, V3>(
    client: C,
    input: Vec<(K1, V1)>,
    n_workers: usize,
) -> Result<JobHandle<K2, V2, K3, V3>, Error>
where
    C: MapReduceClient<K1, V1, K2, V2, K3, V3> + 'static,
    K1: Send + Sync + 'static,
    V1: Send + Sync + 'static,
    K2: Ord + Clone + Send + Sync + 'static,
    V2: Send + Sync + 'static,
    K3: Send + Sync + 'static,
    V3: Send + Sync + 'static,
{
    if n_workers == 0 {
        return Err(Error::NoWorkers);
    }

    let shared = Arc::new(JobShared::new(n_workers, input.len()));
    let client = Arc::new(client);
    let input = Arc::new(input);

    let mut threads = Vec::with_capacity(n_workers);
    for id in 0..n_workers {
        let shared = Arc::clone(&shared);
        let client = Arc::clone(&client);
        let input = Arc::clone(&input);
        let spawned = thread::Builder::new()
            .name(format!("mapreduce-worker-{id}"))
            .spawn(move || worker::run(id, client, input, shared));
        match spawned {
            Ok(handle) => threads.push(handle),
            Err(_) => fatal_platform("pthread_create-equivalent thread::spawn failed"),
        }
    }

    Ok(JobHandle::new(shared, threads))
}
