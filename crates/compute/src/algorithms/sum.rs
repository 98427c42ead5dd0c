use rayon::prelude::*;

use super::split::Range;
use crate::task::ComputeError;

/// Partial result carried up the reduction tree.
///
/// Wider than the input so intermediate sums never overflow; the driver
/// narrows the final total back to `i64` exactly once.
pub type Partial = i128;

/// Leaf aggregate plugged into the fork/join tree.
///
/// `combine` must be associative: the tree regroups partial results
/// differently for every threshold, and only an associative operator makes
/// the outcome independent of that shape. Results are always combined as
/// `combine(left, right)`, so commutativity is not required.
pub trait Reducer: Send + Sync + 'static {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Aggregate `sequence[range]` directly.
    fn reduce(&self, sequence: &[i64], range: Range) -> Result<Partial, ComputeError>;

    /// Merge the results of two adjacent ranges.
    fn combine(&self, left: Partial, right: Partial) -> Result<Partial, ComputeError>;
}

/// Exact sum of 64-bit values over a 128-bit accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumReducer;

impl Reducer for SumReducer {
    fn name(&self) -> &str {
        "sum"
    }

    fn reduce(&self, sequence: &[i64], range: Range) -> Result<Partial, ComputeError> {
        let values = range.slice(sequence)?;
        // A slice holds far fewer than 2^64 values, so this cannot overflow.
        Ok(values.iter().map(|&v| Partial::from(v)).sum())
    }

    fn combine(&self, left: Partial, right: Partial) -> Result<Partial, ComputeError> {
        left.checked_add(right)
            .ok_or_else(|| ComputeError::WorkerFault("sum overflow while combining".to_string()))
    }
}

/// Reference linear scan over the whole sequence.
pub fn sequential_sum(sequence: &[i64]) -> Result<i64, ComputeError> {
    narrow(SumReducer.reduce(sequence, Range::full(sequence.len()))?)
}

/// Narrow a finished total to `i64`, faulting only if it does not fit.
pub fn narrow(total: Partial) -> Result<i64, ComputeError> {
    i64::try_from(total)
        .map_err(|_| ComputeError::WorkerFault(format!("sum {} overflows i64", total)))
}

/// Sum of `1..=n` folded over a lazy iterator.
pub fn iterator_sum(n: u64) -> Result<i64, ComputeError> {
    (1..=n).try_fold(0i64, |acc, v| {
        i64::try_from(v)
            .ok()
            .and_then(|v| acc.checked_add(v))
            .ok_or_else(|| overflow(n))
    })
}

/// Sum of `1..=n` with a plain counting loop.
pub fn loop_sum(n: u64) -> Result<i64, ComputeError> {
    let mut total: i128 = 0;
    let mut i: u64 = 1;
    while i <= n {
        total += i as i128;
        i += 1;
    }
    i64::try_from(total).map_err(|_| overflow(n))
}

/// Sum of `1..=n` through rayon's parallel iterators.
pub fn rayon_sum(n: u64) -> Result<i64, ComputeError> {
    let total: i128 = (1..=n).into_par_iter().map(|v| v as i128).sum();
    i64::try_from(total).map_err(|_| overflow(n))
}

fn overflow(n: u64) -> ComputeError {
    ComputeError::WorkerFault(format!("sum of 1..={} overflows i64", n))
}
