//! Leaf-level building blocks of the reduction: range splitting and
//! sequential aggregates.

pub mod split;
pub mod sum;

pub use split::{Decision, Range, Splitter};
pub use sum::{Partial, Reducer, SumReducer, iterator_sum, loop_sum, narrow, rayon_sum, sequential_sum};
