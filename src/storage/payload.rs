use std::collections::TryReserveError;
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

use crate::comp::Component;
use crate::entity::Raw;
use crate::sparse_set::Hooks;
use crate::util;

/// Paged component array aligned with the packed array of a sparse set.
///
/// Slot `pos` is initialized if and only if packed position `pos` holds a live entity.
/// Pages are allocated one at a time and never move,
/// so references into a page stay valid while the page table grows.
pub(super) struct Payload<C: Component> {
    pages: Vec<Box<[MaybeUninit<C>]>>,
}

/// Returns a reference to a value of zero-sized type.
///
/// # Safety
/// `C` must be zero-sized.
unsafe fn elided<'t, C>() -> &'t mut C {
    debug_assert_eq!(mem::size_of::<C>(), 0);
    // Safety: a dangling, aligned pointer is valid for zero-sized reads and writes.
    unsafe { NonNull::<C>::dangling().as_mut() }
}

impl<C: Component> Payload<C> {
    /// Whether values are discarded instead of stored.
    pub(super) const ELIDED: bool = C::PAGE_SIZE == 0;

    /// Creates an empty payload.
    ///
    /// # Panics
    /// Panics if the page size of `C` is invalid.
    pub(super) fn new() -> Self {
        assert!(
            C::PAGE_SIZE == 0 || C::PAGE_SIZE.is_power_of_two(),
            "Page size of {} must be zero or a power of two",
            std::any::type_name::<C>()
        );
        assert!(
            C::PAGE_SIZE != 0 || mem::size_of::<C>() == 0,
            "Cannot elide {} because it is not zero-sized",
            std::any::type_name::<C>()
        );

        Self { pages: Vec::new() }
    }

    /// A reference to an elided value.
    pub(super) fn elided_mut<'t>() -> &'t mut C {
        assert!(Self::ELIDED);
        // Safety: `new` only accepts elision for zero-sized types.
        unsafe { elided() }
    }

    fn locate(pos: usize) -> (usize, usize) { (pos / C::PAGE_SIZE, pos % C::PAGE_SIZE) }

    /// Ensures the page holding `pos` is allocated.
    pub(super) fn try_reserve_slot(&mut self, pos: usize) -> Result<(), TryReserveError> {
        if Self::ELIDED {
            return Ok(());
        }

        let (page, _) = Self::locate(pos);
        while self.pages.len() <= page {
            self.pages.try_reserve(1)?;

            let mut fresh = Vec::new();
            fresh.try_reserve_exact(C::PAGE_SIZE)?;
            fresh.resize_with(C::PAGE_SIZE, MaybeUninit::uninit);
            self.pages.push(fresh.into_boxed_slice());
        }

        Ok(())
    }

    /// Frees pages that only hold positions at or beyond `len`.
    pub(super) fn shrink(&mut self, len: usize) {
        if Self::ELIDED {
            return;
        }

        let pages = (len + C::PAGE_SIZE - 1) / C::PAGE_SIZE;
        self.pages.truncate(pages);
        self.pages.shrink_to_fit();
    }

    /// Allocated slots, for capacity reporting.
    pub(super) fn capacity(&self) -> usize { self.pages.len() * C::PAGE_SIZE }

    /// Moves `value` into slot `pos`.
    ///
    /// # Safety
    /// The page of `pos` must have been reserved and the slot must be uninitialized.
    pub(super) unsafe fn write(&mut self, pos: usize, value: C) -> &mut C {
        if Self::ELIDED {
            drop(value);
            // Safety: elided components are zero-sized.
            return unsafe { elided() };
        }

        let (page, offset) = Self::locate(pos);
        self.pages[page][offset].write(value)
    }

    /// # Safety
    /// Slot `pos` must be initialized.
    pub(super) unsafe fn get(&self, pos: usize) -> &C {
        if Self::ELIDED {
            // Safety: elided components are zero-sized.
            return unsafe { elided() };
        }

        let (page, offset) = Self::locate(pos);
        // Safety: guaranteed by the caller.
        unsafe { self.pages[page][offset].assume_init_ref() }
    }

    /// # Safety
    /// Slot `pos` must be initialized.
    pub(super) unsafe fn get_mut(&mut self, pos: usize) -> &mut C {
        if Self::ELIDED {
            // Safety: elided components are zero-sized.
            return unsafe { elided() };
        }

        let (page, offset) = Self::locate(pos);
        // Safety: guaranteed by the caller.
        unsafe { self.pages[page][offset].assume_init_mut() }
    }

    /// Moves the value out of slot `pos`, leaving it uninitialized.
    ///
    /// Returns `None` for elided components, whose values were never stored.
    ///
    /// # Safety
    /// Slot `pos` must be initialized.
    unsafe fn take(&mut self, pos: usize) -> Option<C> {
        if Self::ELIDED {
            return None;
        }

        let (page, offset) = Self::locate(pos);
        // Safety: guaranteed by the caller.
        Some(unsafe { self.pages[page][offset].assume_init_read() })
    }

    fn swap_slots(&mut self, lhs: usize, rhs: usize) {
        if Self::ELIDED || lhs == rhs {
            return;
        }

        let (lhs_page, lhs_offset) = Self::locate(lhs);
        let (rhs_page, rhs_offset) = Self::locate(rhs);

        if lhs_page == rhs_page {
            self.pages[lhs_page].swap(lhs_offset, rhs_offset);
        } else {
            let (lhs, rhs) = util::pair_mut(&mut self.pages, lhs_page, rhs_page);
            mem::swap(&mut lhs[lhs_offset], &mut rhs[rhs_offset]);
        }
    }

    pub(super) fn pages_mut(&mut self) -> &mut [Box<[MaybeUninit<C>]>] { &mut self.pages }
}

// The sparse set only reports live positions as popped,
// so every position passed to `take` below is initialized.
impl<C: Component, E: Raw> Hooks<E> for Payload<C> {
    fn swap_at(&mut self, lhs: usize, rhs: usize) { self.swap_slots(lhs, rhs); }

    fn move_and_pop(&mut self, from: usize, to: usize) { self.swap_slots(from, to); }

    fn swap_and_pop(&mut self, pos: usize, last: usize) {
        // Safety: `pos` was live until this call.
        let value = unsafe { self.take(pos) };
        self.swap_slots(pos, last);
        drop(value);
    }

    fn in_place_pop(&mut self, pos: usize) {
        // Safety: `pos` was live until this call.
        let value = unsafe { self.take(pos) };
        drop(value);
    }
}
