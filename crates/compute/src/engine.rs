use std::sync::Arc;
use std::time::{Duration, Instant};

use splitsum_core::ComputeConfig;
use tracing::{debug, info};

use crate::algorithms::{Range, Reducer, Splitter, SumReducer, narrow};
use crate::pool::{ForkJoinPool, PoolMetrics};
use crate::task::{ComputeError, Invocation, TaskContext, TaskNode};

/// Fork/join reduction driver owning a worker pool.
///
/// Each call builds the root `(0, N)` node, invokes it on the pool and
/// returns either the total or the first fault of that invocation. The pool
/// is reused across calls.
pub struct ParallelSum {
    pool: ForkJoinPool,
    splitter: Splitter,
    deadline: Option<Duration>,
}

impl ParallelSum {
    pub fn new(threshold: usize, parallelism: usize) -> Result<Self, ComputeError> {
        let splitter = Splitter::new(threshold)?;
        let pool = ForkJoinPool::new(parallelism, None)?;
        Ok(Self {
            pool,
            splitter,
            deadline: None,
        })
    }

    /// Build from configuration (worker count, threshold, capacity, deadline).
    pub fn from_config(config: &ComputeConfig) -> Result<Self, ComputeError> {
        let splitter = Splitter::new(config.threshold)?;
        let pool = ForkJoinPool::new(config.resolved_worker_threads(), config.pending_capacity())?;
        Ok(Self {
            pool,
            splitter,
            deadline: config.deadline(),
        })
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn threshold(&self) -> usize {
        self.splitter.threshold()
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.worker_threads()
    }

    /// Sum the whole sequence.
    pub fn sum(&self, sequence: Arc<[i64]>) -> Result<i64, ComputeError> {
        self.reduce(sequence, Arc::new(SumReducer))
    }

    /// Run an arbitrary associative [`Reducer`] over the whole sequence.
    ///
    /// Partials stay wide through the tree; only the final total must fit
    /// in `i64`.
    pub fn reduce<R: Reducer>(
        &self,
        sequence: Arc<[i64]>,
        reducer: Arc<R>,
    ) -> Result<i64, ComputeError> {
        let start = Instant::now();
        let len = sequence.len();
        let invocation = Arc::new(Invocation::new(self.deadline));
        let ctx = Arc::new(TaskContext {
            sequence,
            reducer,
            splitter: self.splitter,
            pool: self.pool.handle(),
            invocation: Arc::clone(&invocation),
        });
        let name = ctx.reducer.name().to_string();
        let root = TaskNode::new(Range::full(len), ctx);

        debug!(reducer = %name, len, threshold = self.threshold(), "invoking reduction");
        let result = self.pool.invoke(move || root.compute());

        let elapsed = start.elapsed();
        self.pool.handle().metrics().record_invocation(elapsed);

        match result {
            Ok(total) => {
                debug!(reducer = %name, len, ?elapsed, "reduction complete");
                narrow(total)
            }
            // A cancelled branch may surface first; report the fault that caused it.
            Err(e) => Err(invocation.first_fault().unwrap_or(e)),
        }
    }

    /// Sum `1..=n`, building the sequence first.
    pub fn sum_closed_range(&self, n: u64) -> Result<i64, ComputeError> {
        self.sum(closed_range(n)?)
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }
}

/// The sequence `1..=n`.
pub fn closed_range(n: u64) -> Result<Arc<[i64]>, ComputeError> {
    let end = i64::try_from(n)
        .map_err(|_| ComputeError::WorkerFault(format!("{} does not fit in i64", n)))?;
    Ok((1..=end).collect())
}

/// Sum `sequence` with a fresh pool of `parallelism` workers, splitting
/// ranges longer than `threshold`.
///
/// Returns the exact total or a single fault, never a partial sum.
pub fn parallel_sum(
    sequence: &[i64],
    threshold: usize,
    parallelism: usize,
) -> Result<i64, ComputeError> {
    let driver = ParallelSum::new(threshold, parallelism)?;
    let total = driver.sum(Arc::from(sequence))?;
    info!(
        len = sequence.len(),
        threshold, parallelism, total, "parallel sum complete"
    );
    Ok(total)
}
