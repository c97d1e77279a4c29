/// Derives a [`comp::Component`](crate::comp::Component) implementation for the applied type.
/// This macro does not modify the input.
///
/// # Options
/// Options are applied behind the attribute name in the form `#[comp(...)]`.
/// Multiple options are separated by commas.
///
/// ## `in_place`
/// Erased entities leave a tombstone instead of being swapped with the last element,
/// so references to other elements stay at the same position until the storage is compacted.
///
/// ## `page_size = $expr`
/// The number of components allocated per payload page.
/// Must be zero or a power of two.
/// Zero only makes sense for zero-sized types, which default to zero anyway.
///
/// ## `sparsec_as($path)`
/// Indicates the path of the `sparsec` crate, only used in sparsec's own tests.
///
/// # Example
/// ```
/// #[sparsec::comp]
/// struct Position(f32, f32);
///
/// #[sparsec::comp(in_place, page_size = 256)]
/// struct Stable(u64);
///
/// #[sparsec::comp]
/// struct Marker;
///
/// use sparsec::comp::Component;
/// use sparsec::sparse_set::DeletionPolicy;
/// static_assertions::const_assert!(Position::PAGE_SIZE == 1024);
/// static_assertions::const_assert!(matches!(Stable::DELETION_POLICY, DeletionPolicy::InPlace));
/// static_assertions::const_assert!(Stable::PAGE_SIZE == 256);
/// static_assertions::const_assert!(Marker::PAGE_SIZE == 0);
/// ```
#[doc(inline)]
pub use sparsec_codegen::comp;

cfg_if::cfg_if! {
    if #[cfg(any(debug_assertions, feature = "release-assertions"))] {
        /// Checks a precondition of a public API.
        macro_rules! sparsec_assert {
            ($($tt:tt)*) => { assert!($($tt)*) }
        }
    } else {
        /// Checks a precondition of a public API.
        ///
        /// Precondition checks are compiled away in release builds
        /// unless the `release-assertions` feature is enabled.
        macro_rules! sparsec_assert {
            ($($tt:tt)*) => {
                if false {
                    assert!($($tt)*)
                }
            }
        }
    }
}
