use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_deque::{Injector, Stealer, Worker};
use tracing::{debug, info, warn};

use super::handle::{ForkHandle, TaskSlot};
use super::metrics::{MetricsRecorder, PoolMetrics};
use super::worker::{self, WorkerContext};
use crate::task::ComputeError;

/// Type-erased unit of queued work.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// State shared by the pool owner, its handles and every worker thread.
pub(crate) struct Shared {
    pub(crate) injector: Injector<Job>,
    pub(crate) stealers: Vec<Stealer<Job>>,
    pub(crate) metrics: MetricsRecorder,
    /// Forked jobs not yet finished (queued or running).
    pending: AtomicUsize,
    capacity: Option<usize>,
    shutdown: AtomicBool,
    idle: Mutex<()>,
    wake: Condvar,
}

impl Shared {
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Claim one pending slot, atomically against the capacity.
    fn reserve(&self) -> Result<(), ComputeError> {
        match self.capacity {
            Some(capacity) => self
                .pending
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < capacity).then_some(n + 1)
                })
                .map(|_| ())
                .map_err(|_| ComputeError::PoolExhausted { capacity }),
            None => {
                self.pending.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn release(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    /// Queue a reserved job on the caller's own deque when it is one of our
    /// workers, otherwise on the global injector.
    fn push(self: &Arc<Self>, job: Job) {
        match WorkerContext::current_for(self) {
            Some(ctx) => ctx.push_local(job),
            None => self.injector.push(job),
        }
        self.metrics.record_fork();
        self.wake.notify_one();
    }

    pub(crate) fn execute(&self, job: Job) {
        job();
        self.release();
        self.metrics.record_execution();
    }

    pub(crate) fn wait_for_work(&self, timeout: Duration) {
        let guard = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if self.injector.is_empty() && !self.is_shutdown() {
            // Timeout bounds any missed notification.
            let _ = self.wake.wait_timeout(guard, timeout);
        }
    }
}

/// Cloneable handle used by running tasks to fork further work.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    /// Submit `f` for asynchronous execution and return immediately.
    ///
    /// Fails with [`ComputeError::PoolExhausted`] when a pending-task
    /// capacity is configured and already reached, and with
    /// [`ComputeError::PoolShutdown`] once the pool is shutting down.
    pub fn fork<T, F>(&self, f: F) -> Result<ForkHandle<T>, ComputeError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T, ComputeError> + Send + 'static,
    {
        if self.shared.is_shutdown() {
            return Err(ComputeError::PoolShutdown);
        }
        self.shared.reserve()?;
        // Workers only exit once nothing is pending, so a shutdown that has
        // not been observed by now leaves a worker to run this job.
        if self.shared.is_shutdown() {
            self.shared.release();
            return Err(ComputeError::PoolShutdown);
        }

        let slot = Arc::new(TaskSlot::new());
        let job_slot = Arc::clone(&slot);
        self.shared.push(Box::new(move || job_slot.run(f)));

        Ok(ForkHandle {
            slot,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Fork `f` and join it. From a non-worker thread this blocks until done.
    pub fn invoke<T, F>(&self, f: F) -> Result<T, ComputeError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T, ComputeError> + Send + 'static,
    {
        self.fork(f)?.join()
    }

    /// Whether the calling thread is one of this pool's workers.
    pub fn is_worker_thread(&self) -> bool {
        WorkerContext::current_for(&self.shared).is_some()
    }

    pub(crate) fn metrics(&self) -> &MetricsRecorder {
        &self.shared.metrics
    }
}

/// Fixed-size work-stealing pool with fork/join semantics.
///
/// Each worker owns a LIFO deque; external submissions land on a shared
/// injector. Dropping the pool lets the workers drain all queued jobs and
/// then joins the threads.
pub struct ForkJoinPool {
    handle: PoolHandle,
    threads: Vec<JoinHandle<()>>,
}

impl ForkJoinPool {
    /// Spawn `worker_threads` workers. `capacity` bounds pending forks.
    pub fn new(worker_threads: usize, capacity: Option<usize>) -> Result<Self, ComputeError> {
        if worker_threads == 0 {
            return Err(ComputeError::InvalidParallelism);
        }

        let locals: Vec<Worker<Job>> = (0..worker_threads).map(|_| Worker::new_lifo()).collect();
        let shared = Arc::new(Shared {
            injector: Injector::new(),
            stealers: locals.iter().map(Worker::stealer).collect(),
            metrics: MetricsRecorder::new(worker_threads),
            pending: AtomicUsize::new(0),
            capacity,
            shutdown: AtomicBool::new(false),
            idle: Mutex::new(()),
            wake: Condvar::new(),
        });

        let mut pool = Self {
            handle: PoolHandle {
                shared: Arc::clone(&shared),
            },
            threads: Vec::with_capacity(worker_threads),
        };

        for (index, local) in locals.into_iter().enumerate() {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("splitsum-worker-{}", index))
                .spawn(move || worker::run(index, local, worker_shared));
            match spawned {
                Ok(t) => pool.threads.push(t),
                // Dropping `pool` stops the workers spawned so far.
                Err(e) => return Err(ComputeError::PoolBuild(e.to_string())),
            }
        }

        info!(
            "Fork/join pool started with {} workers (capacity: {:?})",
            worker_threads, capacity
        );
        Ok(pool)
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    pub fn worker_threads(&self) -> usize {
        self.handle.shared.stealers.len()
    }

    pub fn fork<T, F>(&self, f: F) -> Result<ForkHandle<T>, ComputeError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T, ComputeError> + Send + 'static,
    {
        self.handle.fork(f)
    }

    pub fn invoke<T, F>(&self, f: F) -> Result<T, ComputeError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T, ComputeError> + Send + 'static,
    {
        self.handle.invoke(f)
    }

    /// Get a snapshot of the current pool metrics.
    pub fn metrics(&self) -> PoolMetrics {
        self.handle.shared.metrics.snapshot()
    }
}

impl Drop for ForkJoinPool {
    fn drop(&mut self) {
        let shared = &self.handle.shared;
        debug!(pending = shared.pending(), "Fork/join pool shutdown requested");
        shared.shutdown.store(true, Ordering::SeqCst);
        shared.wake.notify_all();

        for t in self.threads.drain(..) {
            if t.join().is_err() {
                warn!("fork/join worker exited with a panic");
            }
        }
        info!("Fork/join pool stopped");
    }
}
