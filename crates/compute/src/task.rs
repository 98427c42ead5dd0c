use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::algorithms::{Decision, Partial, Range, Reducer, Splitter};
use crate::pool::PoolHandle;

/// Error type for fork/join reductions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError {
    #[error("Invalid range [{start}, {end}) for sequence of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },
    #[error("Threshold must be at least 1")]
    InvalidThreshold,
    #[error("Parallelism must be at least 1")]
    InvalidParallelism,
    #[error("Worker fault: {0}")]
    WorkerFault(String),
    #[error("Pool exhausted: {capacity} tasks already pending")]
    PoolExhausted { capacity: usize },
    #[error("Pool is shut down")]
    PoolShutdown,
    #[error("Failed to start worker pool: {0}")]
    PoolBuild(String),
    #[error("Task cancelled after a sibling failed")]
    Cancelled,
    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl ComputeError {
    /// Whether this error only marks work skipped because of another fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ComputeError::Cancelled)
    }
}

/// Abort state shared by every task of one driver invocation.
///
/// The first real fault trips the flag; tasks that start afterwards skip
/// their work and report `Cancelled`.
#[derive(Debug)]
pub struct Invocation {
    aborted: AtomicBool,
    first_fault: Mutex<Option<ComputeError>>,
    deadline: Option<(Instant, Duration)>,
}

impl Invocation {
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            aborted: AtomicBool::new(false),
            first_fault: Mutex::new(None),
            deadline: deadline.map(|budget| (Instant::now() + budget, budget)),
        }
    }

    /// Gate checked before a task does any work.
    pub fn check(&self) -> Result<(), ComputeError> {
        if self.aborted.load(Ordering::Acquire) {
            return Err(ComputeError::Cancelled);
        }
        if let Some((at, budget)) = self.deadline {
            if Instant::now() >= at {
                return Err(ComputeError::DeadlineExceeded(budget));
            }
        }
        Ok(())
    }

    /// Remember `err` if it is the first real fault and abort the rest.
    pub fn record(&self, err: &ComputeError) {
        if err.is_cancellation() {
            return;
        }
        let mut first = self.first_fault.lock().unwrap_or_else(|e| e.into_inner());
        if first.is_none() {
            warn!(error = %err, "reduction fault, cancelling pending tasks");
            *first = Some(err.clone());
        }
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn first_fault(&self) -> Option<ComputeError> {
        self.first_fault
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Everything a task node shares with its whole tree.
pub struct TaskContext<R: Reducer> {
    pub sequence: Arc<[i64]>,
    pub reducer: Arc<R>,
    pub splitter: Splitter,
    pub pool: PoolHandle,
    pub invocation: Arc<Invocation>,
}

/// One range of the reduction tree.
pub struct TaskNode<R: Reducer> {
    range: Range,
    ctx: Arc<TaskContext<R>>,
}

impl<R: Reducer> TaskNode<R> {
    pub fn new(range: Range, ctx: Arc<TaskContext<R>>) -> Self {
        Self { range, ctx }
    }

    pub fn range(&self) -> Range {
        self.range
    }

    /// Reduce this node's range, splitting and forking as needed.
    pub fn compute(&self) -> Result<Partial, ComputeError> {
        let result = self.compute_inner();
        if let Err(e) = &result {
            if !e.is_cancellation() {
                self.ctx.pool.metrics().record_fault();
            }
            self.ctx.invocation.record(e);
        }
        result
    }

    fn compute_inner(&self) -> Result<Partial, ComputeError> {
        self.ctx.invocation.check()?;

        match self.ctx.splitter.decide(self.range) {
            Decision::Leaf(range) => {
                self.ctx.pool.metrics().record_leaf();
                self.ctx.reducer.reduce(&self.ctx.sequence, range)
            }
            Decision::Split(left, right) => {
                trace!(range = %self.range, %left, %right, "split");
                self.ctx.pool.metrics().record_split();

                let left_node = self.child(left);
                let left_handle = self.ctx.pool.fork(move || left_node.compute())?;
                let right_value = self.child(right).compute()?;
                let left_value = left_handle.join()?;

                self.ctx.reducer.combine(left_value, right_value)
            }
        }
    }

    fn child(&self, range: Range) -> Self {
        Self {
            range,
            ctx: Arc::clone(&self.ctx),
        }
    }
}
