//! Sorting algorithms pluggable into [`SparseSet::sort_n_by`](crate::SparseSet::sort_n_by)
//! and the sorting methods built on it.

use std::cmp::Ordering;

/// A comparison sort over a mutable slice.
pub trait SortAlgorithm {
    /// Sorts `slice` in ascending order according to `compare`.
    fn sort<T, F>(&self, slice: &mut [T], compare: F)
    where
        F: FnMut(&T, &T) -> Ordering;
}

/// The standard library's stable merge sort.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdSort;

impl SortAlgorithm for StdSort {
    fn sort<T, F>(&self, slice: &mut [T], compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        slice.sort_by(compare);
    }
}

/// Stable insertion sort.
///
/// Faster than [`StdSort`] when the input is almost sorted,
/// e.g. re-sorting a storage every frame after a few values changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertionSort;

impl SortAlgorithm for InsertionSort {
    fn sort<T, F>(&self, slice: &mut [T], mut compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        for i in 1..slice.len() {
            let mut j = i;
            while j > 0 && compare(&slice[j - 1], &slice[j]) == Ordering::Greater {
                slice.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}
