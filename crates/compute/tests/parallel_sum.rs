//! End-to-end behaviour of the public `parallel_sum` entry point and the
//! `ParallelSum` driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use splitsum_compute::{
    ComputeError, ForkJoinPool, Invocation, ParallelSum, Partial, Range, Reducer, Splitter,
    SumReducer, TaskContext, TaskNode, parallel_sum, sequential_sum,
};

/// Deterministic pseudo-random values in `[-1000, 1000)`.
fn sample(len: usize, seed: u64) -> Vec<i64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) % 2000) as i64 - 1000
        })
        .collect()
}

/// Sum reducer that counts leaf invocations.
#[derive(Default)]
struct CountingReducer {
    leaves: AtomicUsize,
}

impl CountingReducer {
    fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }
}

impl Reducer for CountingReducer {
    fn name(&self) -> &str {
        "counting-sum"
    }

    fn reduce(&self, sequence: &[i64], range: Range) -> Result<Partial, ComputeError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        SumReducer.reduce(sequence, range)
    }

    fn combine(&self, left: Partial, right: Partial) -> Result<Partial, ComputeError> {
        SumReducer.combine(left, right)
    }
}

/// Sum reducer that corrupts the leaf starting at `poisoned_start` into an
/// out-of-bounds range.
struct FaultyReducer {
    poisoned_start: usize,
}

impl Reducer for FaultyReducer {
    fn name(&self) -> &str {
        "faulty-sum"
    }

    fn reduce(&self, sequence: &[i64], range: Range) -> Result<Partial, ComputeError> {
        if range.start == self.poisoned_start {
            return SumReducer.reduce(sequence, Range::new(range.start, sequence.len() + 1));
        }
        SumReducer.reduce(sequence, range)
    }

    fn combine(&self, left: Partial, right: Partial) -> Result<Partial, ComputeError> {
        SumReducer.combine(left, right)
    }
}

#[test]
fn matches_sequential_sum_for_every_parallelism() {
    let data = sample(5_000, 7);
    let expected = sequential_sum(&data).unwrap();
    for workers in [1, 2, 3, 4, 8, 16, 32] {
        assert_eq!(parallel_sum(&data, 100, workers).unwrap(), expected, "workers={}", workers);
    }
}

#[test]
fn threshold_changes_shape_not_result() {
    let data = sample(3_333, 11);
    let expected = sequential_sum(&data).unwrap();
    for threshold in [1, 2, 3, 10, 64, 1_000, 3_333, 10_000] {
        assert_eq!(parallel_sum(&data, threshold, 4).unwrap(), expected, "threshold={}", threshold);
    }
}

#[test]
fn intermediate_overflow_does_not_depend_on_threshold() {
    // The running sum leaves the i64 range, the total does not.
    let rising = vec![i64::MAX, 1, -1, i64::MAX, -i64::MAX, 5, -5];
    let falling = vec![i64::MIN, -1, 1, 7, -7];
    for data in [rising, falling] {
        let expected = sequential_sum(&data).unwrap();
        for threshold in 1..=data.len() {
            for workers in [1, 2, 4] {
                assert_eq!(
                    parallel_sum(&data, threshold, workers).unwrap(),
                    expected,
                    "threshold={} workers={}",
                    threshold,
                    workers
                );
            }
        }
    }
}

#[test]
fn total_outside_i64_faults_for_every_threshold() {
    let data = vec![i64::MAX, 1, 0];
    assert!(matches!(sequential_sum(&data), Err(ComputeError::WorkerFault(_))));
    for threshold in 1..=data.len() {
        assert!(
            matches!(parallel_sum(&data, threshold, 2), Err(ComputeError::WorkerFault(_))),
            "threshold={}",
            threshold
        );
    }
}

#[test]
fn boundary_lengths() {
    assert_eq!(parallel_sum(&[], 3, 2).unwrap(), 0);
    assert_eq!(parallel_sum(&[-17], 3, 2).unwrap(), -17);
    assert_eq!(parallel_sum(&[4, 5, 6], 3, 2).unwrap(), 15);
}

#[test]
fn length_equal_to_threshold_does_not_split() {
    let driver = ParallelSum::new(16, 4).unwrap();
    let reducer = Arc::new(CountingReducer::default());

    let total = driver
        .reduce((1..=16).collect(), Arc::clone(&reducer))
        .unwrap();

    assert_eq!(total, 136);
    assert_eq!(reducer.leaves(), 1);
    assert_eq!(driver.metrics().splits, 0);
}

#[test]
fn one_to_ten_with_threshold_three() {
    let data: Vec<i64> = (1..=10).collect();
    let splitter = Splitter::new(3).unwrap();
    assert_eq!(
        splitter.leaves(Range::full(data.len())),
        vec![
            Range::new(0, 2),
            Range::new(2, 5),
            Range::new(5, 7),
            Range::new(7, 10),
        ]
    );

    for workers in [1, 2, 8] {
        let driver = ParallelSum::new(3, workers).unwrap();
        let reducer = Arc::new(CountingReducer::default());
        let total = driver
            .reduce(data.clone().into(), Arc::clone(&reducer))
            .unwrap();
        assert_eq!(total, 55, "workers={}", workers);
        assert_eq!(reducer.leaves(), 4);
        assert_eq!(driver.metrics().splits, 3);
    }
}

#[test]
fn joining_twice_does_not_recompute() {
    let pool = ForkJoinPool::new(2, None).unwrap();
    let reducer = Arc::new(CountingReducer::default());
    let ctx = Arc::new(TaskContext {
        sequence: (1..=1_000).collect(),
        reducer: Arc::clone(&reducer),
        splitter: Splitter::new(100).unwrap(),
        pool: pool.handle(),
        invocation: Arc::new(Invocation::new(None)),
    });
    let root = TaskNode::new(Range::full(1_000), ctx);

    let handle = pool.fork(move || root.compute()).unwrap();
    let first = handle.join().unwrap();
    let leaves_after_first = reducer.leaves();
    let second = handle.join().unwrap();

    assert_eq!(first, 500_500);
    assert_eq!(second, first);
    assert_eq!(reducer.leaves(), leaves_after_first);
    assert_eq!(leaves_after_first, 16);
}

#[test]
fn injected_leaf_fault_fails_whole_sum() {
    let data: Vec<i64> = (1..=1_000).collect();
    let leaves = Splitter::new(10).unwrap().leaves(Range::full(data.len()));
    let first_leaf = leaves[0].start;
    let last_leaf = leaves[leaves.len() - 1].start;
    let middle_leaf = leaves[leaves.len() / 2].start;

    for poisoned_start in [first_leaf, middle_leaf, last_leaf] {
        for workers in [1, 2, 8] {
            let driver = ParallelSum::new(10, workers).unwrap();
            let err = driver
                .reduce(data.clone().into(), Arc::new(FaultyReducer { poisoned_start }))
                .unwrap_err();
            assert_eq!(
                err,
                ComputeError::InvalidRange {
                    start: poisoned_start,
                    end: 1_001,
                    len: 1_000,
                },
                "poisoned_start={} workers={}",
                poisoned_start,
                workers
            );
        }
    }
}

#[test]
fn driver_recovers_after_fault() {
    let driver = ParallelSum::new(4, 2).unwrap();
    let data: Arc<[i64]> = (1..=40).collect();

    assert!(driver
        .reduce(Arc::clone(&data), Arc::new(FaultyReducer { poisoned_start: 0 }))
        .is_err());
    assert_eq!(driver.sum(data).unwrap(), 820);
}

#[test]
fn bounded_capacity_surfaces_pool_exhausted() {
    let config = splitsum_core::ComputeConfig {
        worker_threads: 1,
        threshold: 1,
        max_pending_tasks: 2,
        deadline_ms: 0,
    };
    let driver = ParallelSum::from_config(&config).unwrap();
    // One worker forks a left half at every level while recursing into the
    // right, so pending forks pile up past the cap.
    let err = driver.sum((1..=4_096).collect()).unwrap_err();
    assert_eq!(err, ComputeError::PoolExhausted { capacity: 2 });
}
