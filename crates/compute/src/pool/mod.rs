//! Work-stealing fork/join pool.
//!
//! Split into focused submodules:
//! - `core`: pool construction, fork/invoke entry points and shutdown
//! - `worker`: worker thread loop and job lookup (local, injector, steal)
//! - `handle`: per-task result slots and joinable handles
//! - `metrics`: pool counters and invocation timings

mod core;
mod handle;
pub mod metrics;
mod worker;

pub use self::core::{ForkJoinPool, PoolHandle};
pub use handle::{ForkHandle, TaskStatus};
pub use metrics::PoolMetrics;
