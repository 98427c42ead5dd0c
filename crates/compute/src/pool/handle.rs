use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use super::core::Shared;
use super::worker::WorkerContext;
use crate::task::ComputeError;

/// How long a joining worker with nothing to run parks on the slot before
/// looking for new jobs again.
const JOIN_WAIT: Duration = Duration::from_micros(200);

/// Lifecycle of a forked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

enum SlotState<T> {
    Pending,
    Running,
    Completed(T),
    Failed(ComputeError),
}

/// Result slot shared between a queued job and its [`ForkHandle`].
///
/// The outcome is written once under the mutex, which gives every joiner a
/// happens-before edge from the task's completion.
pub(crate) struct TaskSlot<T> {
    state: Mutex<SlotState<T>>,
    done: Condvar,
}

impl<T: Clone> TaskSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            done: Condvar::new(),
        }
    }

    // Panics are caught before the lock is taken, so a poisoned guard still
    // holds a consistent state.
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` and publish its outcome. A panic becomes `WorkerFault`.
    pub(crate) fn run<F>(&self, f: F)
    where
        F: FnOnce() -> Result<T, ComputeError>,
    {
        *self.lock() = SlotState::Running;

        let outcome = panic::catch_unwind(AssertUnwindSafe(f))
            .unwrap_or_else(|payload| Err(ComputeError::WorkerFault(panic_message(payload))));

        *self.lock() = match outcome {
            Ok(value) => SlotState::Completed(value),
            Err(e) => SlotState::Failed(e),
        };
        self.done.notify_all();
    }

    pub(crate) fn status(&self) -> TaskStatus {
        match *self.lock() {
            SlotState::Pending => TaskStatus::Pending,
            SlotState::Running => TaskStatus::Running,
            SlotState::Completed(_) => TaskStatus::Completed,
            SlotState::Failed(_) => TaskStatus::Failed,
        }
    }

    /// Memoized outcome, if the task has finished.
    pub(crate) fn outcome(&self) -> Option<Result<T, ComputeError>> {
        Self::finished(&self.lock())
    }

    /// Park the calling thread until the task finishes.
    pub(crate) fn wait(&self) -> Result<T, ComputeError> {
        let mut guard = self.lock();
        loop {
            if let Some(out) = Self::finished(&guard) {
                return out;
            }
            guard = self.done.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Park for at most `timeout`, returning the outcome if it arrived.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, ComputeError>> {
        let guard = self.lock();
        if let Some(out) = Self::finished(&guard) {
            return Some(out);
        }
        let (guard, _) = self
            .done
            .wait_timeout(guard, timeout)
            .unwrap_or_else(|e| e.into_inner());
        Self::finished(&guard)
    }

    fn finished(state: &SlotState<T>) -> Option<Result<T, ComputeError>> {
        match state {
            SlotState::Completed(v) => Some(Ok(v.clone())),
            SlotState::Failed(e) => Some(Err(e.clone())),
            SlotState::Pending | SlotState::Running => None,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {}", s)
    } else {
        "task panicked".to_string()
    }
}

/// Handle to a forked task.
///
/// Joining is idempotent: once the task has finished, every `join` returns
/// a clone of the same memoized outcome without running anything again.
pub struct ForkHandle<T> {
    pub(crate) slot: Arc<TaskSlot<T>>,
    pub(crate) shared: Arc<Shared>,
}

impl<T: Clone> ForkHandle<T> {
    pub fn status(&self) -> TaskStatus {
        self.slot.status()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status(), TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Wait for the task's result or fault.
    ///
    /// On one of this pool's workers the caller keeps executing pending jobs
    /// (its own deque first, then the injector, then its siblings) until the
    /// task is done, so nested joins never pin an OS thread. Any other thread
    /// parks until the outcome is published.
    pub fn join(&self) -> Result<T, ComputeError> {
        if let Some(out) = self.slot.outcome() {
            return out;
        }

        match WorkerContext::current_for(&self.shared) {
            Some(ctx) => loop {
                if let Some(out) = self.slot.outcome() {
                    return out;
                }
                match ctx.find_job() {
                    Some(job) => {
                        self.shared.metrics.record_run_while_joining();
                        self.shared.execute(job);
                    }
                    // The child is running elsewhere; sleep on its slot
                    // instead of spinning.
                    None => {
                        if let Some(out) = self.slot.wait_timeout(JOIN_WAIT) {
                            return out;
                        }
                    }
                }
            },
            None => self.slot.wait(),
        }
    }
}
