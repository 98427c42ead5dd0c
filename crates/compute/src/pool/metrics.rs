use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Pool operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolMetrics {
    /// Number of worker threads.
    pub worker_threads: usize,
    /// Jobs submitted through `fork`.
    pub tasks_forked: u64,
    /// Jobs that finished executing.
    pub tasks_executed: u64,
    /// Jobs taken from a sibling worker's deque.
    pub tasks_stolen: u64,
    /// Jobs a worker ran while waiting in `join`.
    pub tasks_run_while_joining: u64,
    /// Sequential leaf reductions performed.
    pub leaf_reductions: u64,
    /// Ranges split into two children.
    pub splits: u64,
    /// Tasks that ended in a fault (cancelled tasks excluded).
    pub faults: u64,
    /// Completed driver invocations.
    pub invocations: u64,
    /// Average wall time per invocation.
    pub avg_invocation_duration: Duration,
    /// When the last invocation finished.
    pub last_invocation: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct InvocationTimings {
    count: u64,
    avg: Duration,
    last: Option<DateTime<Utc>>,
}

/// Lock-free counters updated from the hot path, plus a small mutex for
/// invocation timings which are only touched once per driver call.
#[derive(Debug)]
pub(crate) struct MetricsRecorder {
    worker_threads: usize,
    forked: AtomicU64,
    executed: AtomicU64,
    stolen: AtomicU64,
    run_while_joining: AtomicU64,
    leaves: AtomicU64,
    splits: AtomicU64,
    faults: AtomicU64,
    timings: Mutex<InvocationTimings>,
}

impl MetricsRecorder {
    pub(crate) fn new(worker_threads: usize) -> Self {
        Self {
            worker_threads,
            forked: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            stolen: AtomicU64::new(0),
            run_while_joining: AtomicU64::new(0),
            leaves: AtomicU64::new(0),
            splits: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            timings: Mutex::new(InvocationTimings::default()),
        }
    }

    pub(crate) fn record_fork(&self) {
        self.forked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_execution(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_steal(&self) {
        self.stolen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_run_while_joining(&self) {
        self.run_while_joining.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_leaf(&self) {
        self.leaves.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_split(&self) {
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished driver invocation.
    pub(crate) fn record_invocation(&self, duration: Duration) {
        let mut t = self.timings.lock().unwrap_or_else(|e| e.into_inner());
        t.count += 1;
        t.last = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if t.count == 1 {
            duration
        } else {
            let prev_nanos = t.avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / t.count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
        t.avg = new_avg;
    }

    pub(crate) fn snapshot(&self) -> PoolMetrics {
        let t = self.timings.lock().unwrap_or_else(|e| e.into_inner());
        PoolMetrics {
            worker_threads: self.worker_threads,
            tasks_forked: self.forked.load(Ordering::Relaxed),
            tasks_executed: self.executed.load(Ordering::Relaxed),
            tasks_stolen: self.stolen.load(Ordering::Relaxed),
            tasks_run_while_joining: self.run_while_joining.load(Ordering::Relaxed),
            leaf_reductions: self.leaves.load(Ordering::Relaxed),
            splits: self.splits.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            invocations: t.count,
            avg_invocation_duration: t.avg,
            last_invocation: t.last,
        }
    }
}
