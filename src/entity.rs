//! Entities are opaque identifiers that own components.
//!
//! An identifier packs an index, which addresses storage slots,
//! and a version, which is bumped every time the index is recycled.
//! Stale identifiers can thus be told apart from the live one at the same index.

mod raw;
pub use raw::{Entity, Entity64, Raw};

pub mod ealloc;
pub use ealloc::Ealloc;
