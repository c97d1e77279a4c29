use std::fmt;
use std::hash::Hash;

use xias::Xias;

/// An entity identifier made of an index and a version.
///
/// The index addresses storage slots;
/// the version distinguishes identifiers that reuse the same index after recycling.
///
/// Two sentinels are reserved:
/// an identifier whose index field is all ones is [null](Raw::is_null),
/// and an identifier whose version field is all ones is a [tombstone](Raw::is_tombstone).
pub trait Raw: Sized + Copy + fmt::Debug + Eq + Ord + Hash + Send + Sync + 'static {
    /// Number of bits used by the index field.
    const INDEX_BITS: u32;
    /// Number of bits used by the version field.
    const VERSION_BITS: u32;

    /// The largest value the index field can hold, reserved for [`Raw::null`].
    const INDEX_MASK: usize;
    /// The largest value the version field can hold, reserved for [`Raw::tombstone`].
    const VERSION_MASK: u32;

    /// Packs `index` and `version` into an identifier.
    ///
    /// Both fields are masked to their bit width.
    fn construct(index: usize, version: u32) -> Self;

    /// Returns the index field.
    fn to_index(self) -> usize;

    /// Returns the version field.
    fn to_version(self) -> u32;

    /// Returns the identifier with the index of `lhs` and the version of `rhs`.
    fn combine(lhs: Self, rhs: Self) -> Self { Self::construct(lhs.to_index(), rhs.to_version()) }

    /// The null identifier.
    fn null() -> Self { Self::construct(Self::INDEX_MASK, Self::VERSION_MASK) }

    /// The tombstone identifier.
    fn tombstone() -> Self { Self::construct(Self::INDEX_MASK, Self::VERSION_MASK) }

    /// Whether the index field is the null index.
    fn is_null(self) -> bool { self.to_index() == Self::INDEX_MASK }

    /// Whether the version field is the tombstone version.
    fn is_tombstone(self) -> bool { self.to_version() == Self::VERSION_MASK }

    /// Returns the same index with the next version.
    ///
    /// The tombstone version is never produced; the version wraps around to zero instead.
    fn next(self) -> Self {
        let version = self.to_version().wrapping_add(1) & Self::VERSION_MASK;
        let version = if version == Self::VERSION_MASK { 0 } else { version };
        Self::construct(self.to_index(), version)
    }
}

macro_rules! impl_raw {
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty), index_bits = $index_bits:literal, version_bits = $version_bits:literal
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name($repr);

        static_assertions::const_assert_eq!(
            $index_bits + $version_bits,
            <$repr>::BITS
        );

        impl $name {
            /// Returns the packed integer representation.
            pub fn to_bits(self) -> $repr { self.0 }

            /// Interprets a packed integer as an identifier.
            pub fn from_bits(bits: $repr) -> Self { Self(bits) }
        }

        impl Raw for $name {
            const INDEX_BITS: u32 = $index_bits;
            const VERSION_BITS: u32 = $version_bits;

            const INDEX_MASK: usize = ((1 as $repr) << $index_bits).wrapping_sub(1) as usize;
            const VERSION_MASK: u32 = ((1 as u64) << $version_bits).wrapping_sub(1) as u32;

            fn construct(index: usize, version: u32) -> Self {
                let index: $repr = (index & Self::INDEX_MASK).small_int();
                let version = <$repr>::from(version & Self::VERSION_MASK);
                Self(index | (version << $index_bits))
            }

            fn to_index(self) -> usize {
                let mask: $repr = Self::INDEX_MASK.small_int();
                (self.0 & mask).small_int()
            }

            fn to_version(self) -> u32 {
                let mask = <$repr>::from(Self::VERSION_MASK);
                ((self.0 >> $index_bits) & mask).small_int()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_null() {
                    write!(f, "{}(null)", stringify!($name))
                } else {
                    write!(f, "{}({}v{})", stringify!($name), self.to_index(), self.to_version())
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}v{}", self.to_index(), self.to_version())
            }
        }
    };
}

impl_raw! {
    /// A 32-bit identifier with 20 index bits and 12 version bits.
    Entity(u32), index_bits = 20, version_bits = 12
}

impl_raw! {
    /// A 64-bit identifier with 32 index bits and 32 version bits.
    Entity64(u64), index_bits = 32, version_bits = 32
}
