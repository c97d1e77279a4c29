//! Miscellaneous helpers for borrowing parts of slices.

use std::marker::PhantomData;

use smallvec::SmallVec;

/// Borrows two distinct elements of a slice mutably.
///
/// # Panics
/// Panics if `lhs == rhs` or either index is out of bounds.
pub(crate) fn pair_mut<T>(slice: &mut [T], lhs: usize, rhs: usize) -> (&mut T, &mut T) {
    assert_ne!(lhs, rhs, "Cannot borrow the same element twice");

    if lhs < rhs {
        let (left, right) = slice.split_at_mut(rhs);
        (&mut left[lhs], &mut right[0])
    } else {
        let (left, right) = slice.split_at_mut(lhs);
        (&mut right[0], &mut left[rhs])
    }
}

/// Hands out mutable borrows of distinct slice elements, each at most once.
///
/// Only the taken indices are recorded,
/// so creating a taker over a long slice does not allocate.
pub(crate) struct Taker<'t, T> {
    base:  *mut T,
    len:   usize,
    taken: SmallVec<[usize; 8]>,
    _ph:   PhantomData<&'t mut [T]>,
}

impl<'t, T> Taker<'t, T> {
    pub(crate) fn new(slice: &'t mut [T]) -> Self {
        Self { base: slice.as_mut_ptr(), len: slice.len(), taken: SmallVec::new(), _ph: PhantomData }
    }

    /// Takes the element at `index`.
    ///
    /// Returns `None` if the index is out of bounds or was already taken.
    pub(crate) fn take(&mut self, index: usize) -> Option<&'t mut T> {
        if index >= self.len || self.taken.contains(&index) {
            return None;
        }
        self.taken.push(index);

        // Safety: `index` is in bounds of the slice borrowed for `'t`,
        // and no other reference to the same element was handed out.
        Some(unsafe { &mut *self.base.add(index) })
    }
}

#[cfg(test)]
mod tests {
    use super::{pair_mut, Taker};

    #[test]
    fn test_pair_mut() {
        let mut values = [1, 2, 3, 4];
        let (a, b) = pair_mut(&mut values, 3, 1);
        std::mem::swap(a, b);
        assert_eq!(values, [1, 4, 3, 2]);
    }

    #[test]
    #[should_panic = "Cannot borrow the same element twice"]
    fn test_pair_mut_same() {
        let mut values = [1, 2];
        let _ = pair_mut(&mut values, 1, 1);
    }

    #[test]
    fn test_taker() {
        let mut values = [1, 2, 3];
        let mut taker = Taker::new(&mut values);
        let first = taker.take(0).expect("index 0 is available");
        assert!(taker.take(0).is_none());
        assert!(taker.take(3).is_none());
        let third = taker.take(2).expect("index 2 is available");
        *first += 10;
        *third += 30;
        assert_eq!(values, [11, 2, 33]);
    }

    #[test]
    fn test_taker_many_disjoint() {
        let mut values: Vec<usize> = (0..64).collect();
        let mut taker = Taker::new(&mut values);
        let borrowed: Vec<&mut usize> =
            (0..64).rev().step_by(3).map(|index| taker.take(index).expect("not taken yet")).collect();
        assert_eq!(borrowed.len(), 22);
        assert!(taker.take(63).is_none());
        for value in borrowed {
            *value += 100;
        }

        assert_eq!(values.iter().filter(|&&value| value >= 100).count(), 22);
        assert_eq!(values[63], 163);
        assert_eq!(values[62], 62);
    }
}
