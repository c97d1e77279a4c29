//! A sparse-set entity/component storage engine.
//!
//! # Entities are identifiers, not objects
//! An [`Entity`] is an integer made of an *index* and a *version*.
//! The index addresses storage slots,
//! and the version distinguishes identifiers that reuse an index after the previous owner was destroyed.
//! Destroying an entity bumps the version of its index,
//! so stale identifiers are detected instead of aliasing a new entity.
//!
//! # Components live in sparse sets
//! Each component type has its own [`Storage`],
//! which pairs a [`SparseSet`] with a paged array of component values.
//! The sparse set maps entity indices to dense *packed* positions,
//! and the value of the entity at packed position `p` is stored at position `p` of the payload.
//! Lookup, insertion and removal are constant time,
//! and iteration walks contiguous memory.
//!
//! Iteration visits the packed array from the back to the front.
//! A loop walking positions downwards therefore survives the insertion of new components
//! and the removal of the component it is visiting.
//!
//! Each component type chooses how removed values leave the storage
//! through its [`Component`](comp::Component) implementation, usually derived with [`#[comp]`](comp).
//! The default *swap-and-pop* policy moves the last value into the hole;
//! the *in-place* policy leaves a tombstone so that other values keep their positions
//! until the storage is compacted.
//!
//! # Views and groups
//! A [`View`] iterates over the entities owning every requested component
//! by walking the smallest storage and checking the others.
//!
//! A [`Group`] is maintained incrementally instead.
//! An *owning* group rearranges the storages of its owned components
//! so that matching entities occupy the same leading positions in all of them,
//! and iteration needs no checks at all.
//!
//! ```
//! use sparsec::{comp, Registry};
//!
//! #[comp]
//! #[derive(Debug, PartialEq)]
//! struct Position(i32, i32);
//! #[comp]
//! struct Velocity(i32, i32);
//!
//! let mut registry = Registry::new();
//! let entity = registry.create();
//! registry.emplace(entity, Position(0, 0));
//! registry.emplace(entity, Velocity(1, 2));
//!
//! let mut group = registry.group::<(&mut Position, &Velocity), (), ()>();
//! group.each(|_, (position, velocity), ()| {
//!     position.0 += velocity.0;
//!     position.1 += velocity.1;
//! });
//!
//! assert_eq!(registry.get::<Position>(entity), &Position(1, 2));
//! ```
//!
//! # The registry
//! The [`Registry`] owns the entity allocator, one storage per component type and all groups.
//! Storages are created on first use.
//! Every insertion and removal through the registry keeps the groups consistent
//! and publishes the storage's construction, update and destruction signals.

#![cfg_attr(not(debug_assertions), deny(missing_docs))]
#![cfg_attr(doc, warn(missing_docs))]

/// Internal re-exports used in macros.
#[doc(hidden)]
pub mod _reexports {
    pub use static_assertions;
}

#[macro_use]
mod macros;
#[doc(inline)]
pub use macros::*;

pub mod algorithm;

pub mod comp;

pub mod entity;
pub use entity::Entity;

mod error;
pub use error::Error;

pub mod group;
pub use group::Group;

pub mod registry;
pub use registry::Registry;

pub mod signal;

pub mod sparse_set;
pub use sparse_set::SparseSet;

pub mod storage;
pub use storage::Storage;

#[cfg(any(test, feature = "internal-bench"))]
pub mod test_util;

mod util;

pub mod view;
pub use view::View;
