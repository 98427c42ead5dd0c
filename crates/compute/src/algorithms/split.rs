use serde::Serialize;

use crate::task::ComputeError;

/// Half-open sub-interval `[start, end)` of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The range covering a whole sequence of `len` elements.
    pub fn full(len: usize) -> Self {
        Self { start: 0, end: len }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the covered elements, rejecting inverted or out-of-bounds ranges.
    pub fn slice<'a, T>(&self, sequence: &'a [T]) -> Result<&'a [T], ComputeError> {
        if self.start > self.end || self.end > sequence.len() {
            return Err(ComputeError::InvalidRange {
                start: self.start,
                end: self.end,
                len: sequence.len(),
            });
        }
        Ok(&sequence[self.start..self.end])
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Outcome of asking the [`Splitter`] about a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Small enough to reduce sequentially.
    Leaf(Range),
    /// Two halves that partition the original range exactly.
    Split(Range, Range),
}

/// Threshold-based halving policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Splitter {
    threshold: usize,
}

impl Splitter {
    /// Threshold must be at least 1, otherwise single elements would split forever.
    pub fn new(threshold: usize) -> Result<Self, ComputeError> {
        if threshold == 0 {
            return Err(ComputeError::InvalidThreshold);
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Leaf when `len <= threshold`, otherwise split at the floor midpoint.
    /// Odd lengths give the left half the smaller share.
    pub fn decide(&self, range: Range) -> Decision {
        let size = range.len();
        if size <= self.threshold {
            return Decision::Leaf(range);
        }
        let mid = range.start + size / 2;
        Decision::Split(Range::new(range.start, mid), Range::new(mid, range.end))
    }

    /// Leaf ranges of the full split tree, left to right.
    pub fn leaves(&self, range: Range) -> Vec<Range> {
        let mut out = Vec::new();
        let mut stack = vec![range];
        while let Some(r) = stack.pop() {
            match self.decide(r) {
                Decision::Leaf(leaf) => out.push(leaf),
                Decision::Split(left, right) => {
                    // right first so left pops first
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        out
    }

    /// Number of internal (split) nodes in the tree rooted at `range`.
    pub fn split_count(&self, range: Range) -> usize {
        self.leaves(range).len().saturating_sub(1)
    }
}
