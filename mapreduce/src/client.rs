use crate::context::WorkerContext;
use crate::job::IntermediatePair;

/// The task a job runs. `map` may call `ctx.emit2` zero or more times;
/// `reduce` receives a sequence of pairs whose keys are all equivalent
/// under `K2`'s ordering and may call `ctx.emit3` zero or more times.
pub trait MapReduceClient<K1, V1, K2, V2, K3, V3>: Send + Sync
where
    K2: Ord,
{
    fn map(&self, key: &K1, value: &V1, ctx: &WorkerContext<K2, V2, K3, V3>);
    fn reduce(&self, group: &[IntermediatePair<K2, V2>], ctx: &WorkerContext<K2, V2, K3, V3>);
}
