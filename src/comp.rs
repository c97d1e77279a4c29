//! Components are the values stored against entities.
//!
//! Each component type declares how its storage behaves through [`Component`],
//! usually derived with the [`#[comp]`](crate::comp) attribute.

use std::mem;

use crate::sparse_set::DeletionPolicy;

/// The default number of components in each payload page.
pub const PACKED_PAGE: usize = 1024;
static_assertions::const_assert!(PACKED_PAGE.is_power_of_two());

/// The page size used for `C` unless overridden: zero for zero-sized types, [`PACKED_PAGE`] otherwise.
pub const fn page_size_of<C>() -> usize {
    if mem::size_of::<C>() == 0 {
        0
    } else {
        PACKED_PAGE
    }
}

/// A type that can be stored in a [`Storage`](crate::Storage).
pub trait Component: Sized + 'static {
    /// How erased components leave the storage.
    const DELETION_POLICY: DeletionPolicy = DeletionPolicy::SwapAndPop;

    /// The number of components allocated together.
    ///
    /// Must be zero or a power of two.
    /// Zero elides payload storage entirely and is only valid for zero-sized types.
    const PAGE_SIZE: usize = page_size_of::<Self>();
}
