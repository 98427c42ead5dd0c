//! Side-by-side timing of the closed-range sum strategies.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::algorithms::{iterator_sum, loop_sum, rayon_sum};
use crate::engine::{ParallelSum, closed_range};
use crate::task::ComputeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Fold over a lazy iterator.
    Iterator,
    /// Plain counting loop.
    Loop,
    /// rayon parallel iterator.
    Rayon,
    /// This crate's fork/join pool.
    ForkJoin,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Iterator,
        Strategy::Loop,
        Strategy::Rayon,
        Strategy::ForkJoin,
    ];
}

/// Timing for one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub strategy: Strategy,
    pub total: i64,
    pub iterations: usize,
    pub avg: Duration,
}

/// Time every strategy on `1..=n`, `iterations` times each.
///
/// Fails if any strategy faults or the totals disagree.
pub fn run(driver: &ParallelSum, n: u64, iterations: usize) -> Result<Vec<BenchReport>, ComputeError> {
    let iterations = iterations.max(1);
    let sequence = closed_range(n)?;
    let mut reports = Vec::with_capacity(Strategy::ALL.len());

    for strategy in Strategy::ALL {
        let mut total = 0;
        let mut elapsed = Duration::ZERO;
        for _ in 0..iterations {
            let start = Instant::now();
            total = match strategy {
                Strategy::Iterator => iterator_sum(n)?,
                Strategy::Loop => loop_sum(n)?,
                Strategy::Rayon => rayon_sum(n)?,
                Strategy::ForkJoin => driver.sum(sequence.clone())?,
            };
            elapsed += start.elapsed();
        }
        let avg = average(elapsed, iterations);
        info!(?strategy, total, ?avg, "benchmark strategy finished");
        reports.push(BenchReport {
            strategy,
            total,
            iterations,
            avg,
        });
    }

    if let Some(first) = reports.first() {
        if let Some(bad) = reports.iter().find(|r| r.total != first.total) {
            return Err(ComputeError::WorkerFault(format!(
                "{:?} total {} disagrees with {:?} total {}",
                bad.strategy, bad.total, first.strategy, first.total
            )));
        }
    }
    Ok(reports)
}

/// Mean time per iteration; any count is valid, not just those fitting `u32`.
fn average(elapsed: Duration, iterations: usize) -> Duration {
    elapsed.div_f64(iterations.max(1) as f64)
}
