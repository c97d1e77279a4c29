//! A storage is the data structure where components of the same type for all entities are stored.
//!
//! [`Storage`] pairs a [`SparseSet`] with a paged payload array
//! whose slot `p` holds the component of the entity at packed position `p`.
//! [`Sighed`] decorates a storage with construction, update and destruction signals.

use std::any::{self, Any};
use std::cmp::Ordering;
use std::fmt;

use bitvec::prelude::BitVec;

use crate::algorithm::{SortAlgorithm, StdSort};
use crate::comp::Component;
use crate::entity::{Entity, Raw};
use crate::sparse_set::{DeletionPolicy, SortPlan, SparseSet};
use crate::Error;

mod payload;
use payload::Payload;

mod sighed;
pub use sighed::Sighed;


/// Stores components of type `C` for entities of type `E`.
pub struct Storage<C: Component, E: Raw = Entity> {
    set:     SparseSet<E>,
    payload: Payload<C>,
}

impl<C: Component, E: Raw> Default for Storage<C, E> {
    fn default() -> Self { Self::new() }
}

impl<C: Component + fmt::Debug, E: Raw> fmt::Debug for Storage<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<C: Component, E: Raw> Drop for Storage<C, E> {
    fn drop(&mut self) { self.clear(); }
}

/// Erases an entity inserted ahead of its value unless disarmed.
struct Rollback<'t, E: Raw> {
    set:    &'t mut SparseSet<E>,
    entity: E,
    armed:  bool,
}

impl<'t, E: Raw> Rollback<'t, E> {
    fn disarm(mut self) { self.armed = false; }
}

impl<'t, E: Raw> Drop for Rollback<'t, E> {
    fn drop(&mut self) {
        if self.armed {
            self.set.erase(self.entity);
        }
    }
}

impl<C: Component, E: Raw> Storage<C, E> {
    /// Creates an empty storage using the deletion policy of `C`.
    ///
    /// # Panics
    /// Panics if the page size declared by `C` is invalid.
    pub fn new() -> Self {
        Self { set: SparseSet::new(C::DELETION_POLICY), payload: Payload::new() }
    }

    /// The underlying sparse set.
    pub fn as_set(&self) -> &SparseSet<E> { &self.set }

    /// The deletion policy of this storage.
    pub fn policy(&self) -> DeletionPolicy { self.set.policy() }

    /// The length of the packed array, tombstones included.
    pub fn len(&self) -> usize { self.set.len() }

    /// Whether the packed array is empty.
    pub fn is_empty(&self) -> bool { self.set.is_empty() }

    /// Whether `entity` has a component in this storage.
    pub fn contains(&self, entity: E) -> bool { self.set.contains(entity) }

    /// The packed position of `entity`.
    pub fn index(&self, entity: E) -> usize { self.set.index(entity) }

    /// The number of components that fit in the allocated payload pages.
    pub fn capacity(&self) -> usize {
        if Payload::<C>::ELIDED {
            self.set.capacity()
        } else {
            self.payload.capacity()
        }
    }

    /// Reserves room for at least `additional` more components.
    pub fn reserve(&mut self, additional: usize) {
        if additional == 0 {
            return;
        }

        self.set.reserve(additional);
        if let Err(err) = self.payload.try_reserve_slot(self.set.len() + additional - 1) {
            panic!("Cannot reserve {} components of {}: {}", additional, any::type_name::<C>(), err);
        }
    }

    /// Releases memory not used by live positions.
    pub fn shrink_to_fit(&mut self) {
        self.set.shrink_to_fit();
        self.payload.shrink(self.set.len());
    }

    /// Assigns `value` to `entity`.
    ///
    /// # Panics
    /// Panics if `entity` already has a component or memory cannot be allocated.
    pub fn emplace(&mut self, entity: E, value: C) -> &mut C {
        match self.try_emplace(entity, value) {
            Ok(value) => value,
            Err(err) => panic!("Cannot insert {} for {:?}: {}", any::type_name::<C>(), entity, err),
        }
    }

    /// Assigns `value` to `entity`, replacing the existing component if any.
    pub fn emplace_or_replace(&mut self, entity: E, value: C) -> &mut C {
        match self.set.find(entity) {
            Some(pos) => {
                // Safety: positions referenced by the sparse array are live.
                let slot = unsafe { self.payload.get_mut(pos) };
                *slot = value;
                slot
            }
            None => self.emplace(entity, value),
        }
    }

    /// Fallible version of [`emplace`](Self::emplace).
    /// The storage is unchanged if an error is returned.
    pub fn try_emplace(&mut self, entity: E, value: C) -> Result<&mut C, Error> {
        self.payload.try_reserve_slot(self.set.next_position())?;
        let pos = self.set.try_emplace(entity)?;
        // Safety: the page was reserved above and `pos` was not live.
        Ok(unsafe { self.payload.write(pos, value) })
    }

    /// Assigns the value returned by `ctor` to `entity`.
    ///
    /// The entity is inserted into the sparse set before `ctor` runs.
    /// If `ctor` fails or panics, the insertion is rolled back.
    ///
    /// # Panics
    /// Panics if `entity` already has a component or memory cannot be allocated.
    pub fn emplace_with<X>(
        &mut self,
        entity: E,
        ctor: impl FnOnce() -> Result<C, X>,
    ) -> Result<&mut C, X> {
        if let Err(err) = self.payload.try_reserve_slot(self.set.next_position()) {
            panic!("Cannot insert {} for {:?}: {}", any::type_name::<C>(), entity, err);
        }

        let pos = self.set.emplace(entity);
        let rollback = Rollback { set: &mut self.set, entity, armed: true };
        let value = ctor()?;
        rollback.disarm();

        // Safety: the page was reserved above and `pos` was not live.
        Ok(unsafe { self.payload.write(pos, value) })
    }

    /// Assigns a clone of `value` to each of `entities`.
    pub fn insert(&mut self, entities: impl IntoIterator<Item = E>, value: C)
    where
        C: Clone,
    {
        let entities = entities.into_iter();
        self.reserve(entities.size_hint().0);

        for entity in entities {
            self.emplace(entity, value.clone());
        }
    }

    /// Assigns the value returned by `ctor` to each of `entities`.
    ///
    /// Stops at the first failure; entities processed before it keep their components.
    pub fn insert_with<X>(
        &mut self,
        entities: impl IntoIterator<Item = E>,
        mut ctor: impl FnMut(E) -> Result<C, X>,
    ) -> Result<(), X> {
        for entity in entities {
            self.emplace_with(entity, || ctor(entity))?;
        }
        Ok(())
    }

    /// Returns the component of `entity`.
    ///
    /// # Panics
    /// Panics if `entity` has no component in this storage.
    pub fn get(&self, entity: E) -> &C {
        let pos = self.set.index(entity);
        // Safety: positions referenced by the sparse array are live.
        unsafe { self.payload.get(pos) }
    }

    /// Returns the component of `entity` mutably.
    ///
    /// # Panics
    /// Panics if `entity` has no component in this storage.
    pub fn get_mut(&mut self, entity: E) -> &mut C {
        let pos = self.set.index(entity);
        // Safety: positions referenced by the sparse array are live.
        unsafe { self.payload.get_mut(pos) }
    }

    /// Returns the component of `entity` if it has one.
    pub fn try_get(&self, entity: E) -> Option<&C> {
        let pos = self.set.find(entity)?;
        // Safety: positions referenced by the sparse array are live.
        Some(unsafe { self.payload.get(pos) })
    }

    /// Returns the component of `entity` mutably if it has one.
    pub fn try_get_mut(&mut self, entity: E) -> Option<&mut C> {
        let pos = self.set.find(entity)?;
        // Safety: positions referenced by the sparse array are live.
        Some(unsafe { self.payload.get_mut(pos) })
    }

    /// Returns the component at packed position `pos`.
    ///
    /// # Panics
    /// Panics if `pos` is out of range or a tombstone.
    pub fn get_at(&self, pos: usize) -> &C {
        assert!(self.set.at(pos).is_some(), "Position {} is not live", pos);
        // Safety: checked above.
        unsafe { self.payload.get(pos) }
    }

    /// Returns the component at packed position `pos` mutably.
    ///
    /// # Panics
    /// Panics if `pos` is out of range or a tombstone.
    pub fn get_at_mut(&mut self, pos: usize) -> &mut C {
        assert!(self.set.at(pos).is_some(), "Position {} is not live", pos);
        // Safety: checked above.
        unsafe { self.payload.get_mut(pos) }
    }

    /// Applies `f` to the component of `entity` in place.
    pub fn patch(&mut self, entity: E, f: impl FnOnce(&mut C)) -> &mut C {
        let value = self.get_mut(entity);
        f(&mut *value);
        value
    }

    /// Replaces the component of `entity`, returning the previous value.
    pub fn replace(&mut self, entity: E, value: C) -> C { std::mem::replace(self.get_mut(entity), value) }

    /// Removes the component of `entity`.
    ///
    /// # Panics
    /// Panics if `entity` has no component in this storage.
    pub fn erase(&mut self, entity: E) { self.set.erase_with(entity, &mut self.payload); }

    /// Removes the component of `entity` if it has one. Returns whether it was removed.
    pub fn remove(&mut self, entity: E) -> bool { self.set.remove_with(entity, &mut self.payload) }

    /// Removes all components.
    pub fn clear(&mut self) { self.set.clear_with(&mut self.payload); }

    /// Fills the tombstones left by in-place deletion.
    pub fn compact(&mut self) { self.set.compact_with(&mut self.payload); }

    /// Exchanges the positions of the components of `lhs` and `rhs`.
    pub fn swap(&mut self, lhs: E, rhs: E) { self.set.swap_with(lhs, rhs, &mut self.payload); }

    /// Sorts components so that iteration visits them in ascending order of `compare`.
    pub fn sort_by(&mut self, mut compare: impl FnMut(&C, &C) -> Ordering) {
        self.compact();
        self.sort_n_by(self.len(), StdSort, |(_, lhs), (_, rhs)| compare(lhs, rhs));
    }

    /// Sorts components so that iteration visits their entities in ascending order of `compare`.
    pub fn sort_by_entity(&mut self, compare: impl FnMut(E, E) -> Ordering) {
        self.compact();
        self.set.sort_n_by_with(self.set.len(), StdSort, compare, &mut self.payload);
    }

    /// Sorts the first `length` packed components with `algo`.
    ///
    /// The storage is compacted first; `length` refers to the compacted array.
    /// If `compare` panics, the storage is left unchanged.
    pub fn sort_n_by(
        &mut self,
        length: usize,
        algo: impl SortAlgorithm,
        mut compare: impl FnMut((E, &C), (E, &C)) -> Ordering,
    ) {
        self.compact();

        let set = &self.set;
        let payload = &self.payload;
        let plan = set.sort_plan(length, algo, |lhs, rhs| {
            // Safety: only live entities are sorted.
            let (lhs_value, rhs_value) =
                unsafe { (payload.get(set.index(lhs)), payload.get(set.index(rhs))) };
            compare((lhs, lhs_value), (rhs, rhs_value))
        });

        self.set.apply_sort(plan, &mut self.payload);
    }

    /// Rearranges the first `order.len()` packed positions into `order`.
    ///
    /// # Panics
    /// Panics if the storage has tombstones
    /// or `order` is not a permutation of the entities at those positions.
    pub fn sort_prefix(&mut self, order: &[E]) {
        assert!(self.set.free_list().is_none(), "Cannot sort a storage with tombstones");

        let mut seen = BitVec::<usize>::repeat(false, order.len());
        for &entity in order {
            let pos = self.set.index(entity);
            assert!(
                pos < order.len() && !seen[pos],
                "Sort order is not a permutation of the first {} entities",
                order.len()
            );
            seen.set(pos, true);
        }

        self.set.apply_sort(SortPlan::from_order(order.to_vec()), &mut self.payload);
    }

    /// Rearranges components so that entities shared with `other` follow its iteration order.
    pub fn respect(&mut self, other: &SparseSet<E>) { self.set.respect_with(other, &mut self.payload); }

    /// Rearranges components so that entities in `order` are visited first, in that order.
    pub fn sort_as(&mut self, order: impl IntoIterator<Item = E>) {
        self.set.sort_as_with(order, &mut self.payload);
    }

    /// Iterates over entities and their components in iteration order.
    pub fn iter(&self) -> impl Iterator<Item = (E, &C)> + '_ {
        let payload = &self.payload;
        self.set
            .data()
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, entity)| !entity.is_tombstone())
            // Safety: non-tombstone positions are live.
            .map(move |(pos, &entity)| (entity, unsafe { payload.get(pos) }))
    }

    /// Iterates over the components in iteration order.
    pub fn values(&self) -> impl Iterator<Item = &C> + '_ { self.iter().map(|(_, value)| value) }

    /// Iterates over entities and their components mutably in iteration order.
    #[auto_enums::auto_enum(Iterator)]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (E, &mut C)> + '_ {
        let entities = self.set.data();

        if Payload::<C>::ELIDED {
            entities
                .iter()
                .rev()
                .filter(|entity| !entity.is_tombstone())
                .map(|&entity| (entity, Payload::<C>::elided_mut()))
        } else {
            entities
                .chunks(C::PAGE_SIZE)
                .zip(self.payload.pages_mut().iter_mut())
                .rev()
                .flat_map(|(chunk, page)| chunk.iter().zip(page.iter_mut()).rev())
                .filter(|(entity, _)| !entity.is_tombstone())
                // Safety: non-tombstone positions are live.
                .map(|(&entity, slot)| (entity, unsafe { slot.assume_init_mut() }))
        }
    }
}

/// Type-erased access to a [`Storage`].
pub trait AnyStorage<E: Raw>: 'static {
    /// Upcasts to [`Any`] for downcasting to the concrete storage.
    fn as_any(&self) -> &dyn Any;

    /// Upcasts to [`Any`] for downcasting to the concrete storage.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The underlying sparse set.
    fn as_set(&self) -> &SparseSet<E>;

    /// The name of the component type.
    fn type_name(&self) -> &'static str;

    /// Exchanges the positions of the components of `lhs` and `rhs`.
    fn swap_elements(&mut self, lhs: E, rhs: E);

    /// Rearranges the first `order.len()` packed positions into `order`.
    fn sort_prefix(&mut self, order: &[E]);

    /// Fills the tombstones left by in-place deletion.
    fn compact(&mut self);
}

impl<C: Component, E: Raw> AnyStorage<E> for Storage<C, E> {
    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn as_set(&self) -> &SparseSet<E> { &self.set }

    fn type_name(&self) -> &'static str { any::type_name::<C>() }

    fn swap_elements(&mut self, lhs: E, rhs: E) { self.swap(lhs, rhs) }

    fn sort_prefix(&mut self, order: &[E]) { Storage::sort_prefix(self, order) }

    fn compact(&mut self) { Storage::compact(self) }
}
