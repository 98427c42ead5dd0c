//! Divide-and-conquer parallel reduction on a work-stealing fork/join pool.

pub mod algorithms;
pub mod bench;
pub mod engine;
pub mod pool;
pub mod task;

pub use algorithms::{Decision, Partial, Range, Reducer, Splitter, SumReducer, sequential_sum};
pub use engine::{ParallelSum, closed_range, parallel_sum};
pub use pool::{ForkHandle, ForkJoinPool, PoolHandle, PoolMetrics, TaskStatus};
pub use task::{ComputeError, Invocation, TaskContext, TaskNode};
