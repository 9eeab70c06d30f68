use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::client::MapReduceClient;
use crate::context::WorkerContext;
use crate::job::{lock_or_fatal, JobShared, Stage};

/// The script every worker thread runs: map, sort, barrier, (worker 0
/// shuffles; everyone else waits), barrier, reduce. Mirrors the original
/// `entryPoint`'s five-phase body exactly.
pub(crate) fn run<C, K1, V1, K2, V2, K3, V3>(
    id: usize,
    client: Arc<C>,
    input: Arc<Vec<(K1, V1)>>,
    shared: Arc<JobShared<K2, V2, K3, V3>>,
) where
    C: MapReduceClient<K1, V1, K2, V2, K3, V3>,
    K2: Ord + Clone,
{
    let _ = shared.stage.compare_exchange(
        Stage::Undefined as u8,
        Stage::Map as u8,
        Ordering::SeqCst,
        Ordering::SeqCst,
    );

    let ctx = WorkerContext::new(id, Arc::clone(&shared));
    map_phase(&*client, &input, &shared, &ctx);

    unsafe { shared.per_worker[id].get_mut() }.sort_by(|a, b| a.0.cmp(&b.0));

    shared.barrier.wait();

    if id == 0 {
        shuffle_phase(&shared);
    }

    shared.barrier.wait();

    reduce_phase(&*client, &shared, &ctx);
}

fn map_phase<C, K1, V1, K2, V2, K3, V3>(
    client: &C,
    input: &[(K1, V1)],
    shared: &JobShared<K2, V2, K3, V3>,
    ctx: &WorkerContext<K2, V2, K3, V3>,
) where
    C: MapReduceClient<K1, V1, K2, V2, K3, V3>,
    K2: Ord,
{
    loop {
        let idx = shared.map_claim.fetch_add(1, Ordering::SeqCst);
        if idx >= input.len() {
            break;
        }
        let (key, value) = &input[idx];
        client.map(key, value, ctx);
        shared.map_finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Worker 0 only. Repeatedly finds the maximum K2 across every non-empty
/// per-worker vector, back-pops every trailing pair equivalent to it into
/// a fresh grouped vector, and prepends that group to the work queue.
fn shuffle_phase<K2, V2, K3, V3>(shared: &JobShared<K2, V2, K3, V3>)
where
    K2: Ord + Clone,
{
    shared.stage.store(Stage::Shuffle as u8, Ordering::SeqCst);

    let total: usize = (0..shared.n_workers)
        .map(|i| unsafe { shared.per_worker[i].get_mut() }.len())
        .sum();
    shared.total_pairs_after_map.store(total, Ordering::SeqCst);

    loop {
        let all_empty = (0..shared.n_workers)
            .all(|i| unsafe { shared.per_worker[i].get_mut() }.is_empty());
        if all_empty {
            break;
        }

        let mut max_idx: Option<usize> = None;
        for i in 0..shared.n_workers {
            let has_last = unsafe { shared.per_worker[i].get_mut() }.last().is_some();
            if !has_last {
                continue;
            }
            max_idx = match max_idx {
                None => Some(i),
                Some(j) => {
                    let i_greater = {
                        let key_i = &unsafe { shared.per_worker[i].get_mut() }.last().unwrap().0;
                        let key_j = &unsafe { shared.per_worker[j].get_mut() }.last().unwrap().0;
                        key_j < key_i
                    };
                    if i_greater {
                        Some(i)
                    } else {
                        Some(j)
                    }
                }
            };
        }
        let max_idx = max_idx.expect("loop only reaches here when some vector is non-empty");
        let max_key = unsafe { shared.per_worker[max_idx].get_mut() }
            .last()
            .unwrap()
            .0
            .clone();

        let mut group = Vec::new();
        for i in 0..shared.n_workers {
            let vec = unsafe { shared.per_worker[i].get_mut() };
            while let Some(last) = vec.last() {
                if last.0 == max_key {
                    group.push(vec.pop().unwrap());
                } else {
                    break;
                }
            }
        }

        let group_len = group.len();
        lock_or_fatal(&shared.work_queue, "work queue mutex").push_front(group);
        shared.shuffle_emitted.fetch_add(group_len, Ordering::SeqCst);
    }
}

fn reduce_phase<C, K1, V1, K2, V2, K3, V3>(
    client: &C,
    shared: &JobShared<K2, V2, K3, V3>,
    ctx: &WorkerContext<K2, V2, K3, V3>,
) where
    C: MapReduceClient<K1, V1, K2, V2, K3, V3>,
    K2: Ord,
{
    if shared
        .stage
        .compare_exchange(
            Stage::Shuffle as u8,
            Stage::Reduce as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_ok()
    {
        // Purely cosmetic: nothing reads map_claim again.
        shared.map_claim.store(0, Ordering::SeqCst);
    }

    loop {
        let group = {
            let mut queue = lock_or_fatal(&shared.work_queue, "work queue mutex");
            match queue.pop_back() {
                Some(group) => group,
                None => break,
            }
        };
        let group_len = group.len();
        client.reduce(&group, ctx);
        shared.reduce_emitted.fetch_add(group_len, Ordering::SeqCst);
    }
}
