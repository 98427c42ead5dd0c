use std::cell::RefCell;
use std::iter;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_deque::{Steal, Worker};
use tracing::{debug, trace};

use super::core::{Job, Shared};

/// How long an idle worker sleeps before re-checking the queues.
const IDLE_WAIT: Duration = Duration::from_millis(1);

thread_local! {
    static CURRENT: RefCell<Option<Rc<WorkerContext>>> = const { RefCell::new(None) };
}

/// Per-thread state of a pool worker.
pub(crate) struct WorkerContext {
    index: usize,
    local: Worker<Job>,
    shared: Arc<Shared>,
}

impl WorkerContext {
    /// The calling thread's context, if it is a worker of `shared`'s pool.
    pub(crate) fn current_for(shared: &Arc<Shared>) -> Option<Rc<WorkerContext>> {
        CURRENT.with(|cell| {
            cell.borrow()
                .as_ref()
                .filter(|ctx| Arc::ptr_eq(&ctx.shared, shared))
                .cloned()
        })
    }

    pub(crate) fn push_local(&self, job: Job) {
        self.local.push(job);
    }

    /// Next runnable job: own deque, then a batch from the injector, then
    /// siblings starting just after this worker's index.
    pub(crate) fn find_job(&self) -> Option<Job> {
        if let Some(job) = self.local.pop() {
            return Some(job);
        }

        let injected = iter::repeat_with(|| self.shared.injector.steal_batch_and_pop(&self.local))
            .find(|s| !s.is_retry())
            .and_then(Steal::success);
        if injected.is_some() {
            return injected;
        }

        let stealers = &self.shared.stealers;
        let n = stealers.len();
        (1..n)
            .map(|offset| &stealers[(self.index + offset) % n])
            .find_map(|stealer| {
                iter::repeat_with(|| stealer.steal())
                    .find(|s| !s.is_retry())
                    .and_then(Steal::success)
            })
            .map(|job| {
                self.shared.metrics.record_steal();
                job
            })
    }
}

/// Worker thread body. Runs until shutdown is requested and no queued work
/// remains, so every forked job is eventually executed.
pub(crate) fn run(index: usize, local: Worker<Job>, shared: Arc<Shared>) {
    let ctx = Rc::new(WorkerContext {
        index,
        local,
        shared: Arc::clone(&shared),
    });
    CURRENT.with(|cell| *cell.borrow_mut() = Some(Rc::clone(&ctx)));
    debug!(worker = index, "fork/join worker started");

    loop {
        if let Some(job) = ctx.find_job() {
            shared.execute(job);
            continue;
        }
        if shared.is_shutdown() && shared.pending() == 0 {
            break;
        }
        trace!(worker = index, "idle");
        shared.wait_for_work(IDLE_WAIT);
    }

    CURRENT.with(|cell| *cell.borrow_mut() = None);
    debug!(worker = index, "fork/join worker stopped");
}
