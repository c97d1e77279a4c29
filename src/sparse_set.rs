//! Sparse sets map entity identifiers to dense positions.
//!
//! A sparse set keeps two arrays:
//! the *sparse* array, paged and indexed by entity index,
//! holding the packed position of each contained entity (or null),
//! and the *packed* array, holding the contained entities contiguously.
//!
//! Iteration visits the packed array from the back to the front,
//! so a cursor walking positions downwards survives insertions and
//! the removal of the element it points to.

use std::cmp::{self, Ordering};
use std::collections::TryReserveError;
use std::{any, fmt};

use crate::algorithm::{SortAlgorithm, StdSort};
use crate::entity::{Entity, Raw};
use crate::Error;

/// The number of entries in a page of the sparse array.
pub const SPARSE_PAGE: usize = 4096;
static_assertions::const_assert!(SPARSE_PAGE.is_power_of_two());

/// How erased elements leave the packed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeletionPolicy {
    /// The last element is moved into the hole. Does not preserve order.
    #[default]
    SwapAndPop,
    /// The hole is left as a tombstone and reused by later insertions.
    /// Positions of other elements never change until [`SparseSet::compact`] is called.
    InPlace,
}

/// Extension points invoked by the sparse set when it rearranges the packed array.
///
/// Layers storing data parallel to the packed array implement this trait
/// to keep their data aligned with the packed positions.
/// Every method has a no-op default.
pub trait Hooks<E: Raw> {
    /// Called before `entity` at packed position `pos` is removed.
    fn about_to_pop(&mut self, _pos: usize, _entity: E) {}

    /// The elements at `lhs` and `rhs` exchanged positions.
    fn swap_at(&mut self, _lhs: usize, _rhs: usize) {}

    /// The element at `from` moved into the hole at `to`, leaving a hole at `from`.
    fn move_and_pop(&mut self, _from: usize, _to: usize) {}

    /// The element at `pos` was removed and the element at `last` moved into its place.
    /// `pos == last` if the removed element was the last one.
    fn swap_and_pop(&mut self, _pos: usize, _last: usize) {}

    /// The element at `pos` was replaced by a tombstone.
    fn in_place_pop(&mut self, _pos: usize) {}
}

impl<E: Raw> Hooks<E> for () {}

/// A precomputed reordering of a packed prefix, produced by [`SparseSet::sort_plan`].
pub(crate) struct SortPlan<E: Raw> {
    order: Vec<E>,
}

impl<E: Raw> SortPlan<E> {
    /// The target order of the packed prefix.
    pub(crate) fn order(&self) -> &[E] { &self.order }

    /// Wraps an arbitrary order; it must be a permutation of the packed prefix of the same length.
    pub(crate) fn from_order(order: Vec<E>) -> Self { Self { order } }
}

/// A set of entities supporting O(1) insertion, removal, lookup and dense iteration.
#[derive(Clone)]
pub struct SparseSet<E: Raw = Entity> {
    sparse: Vec<Option<Box<[E]>>>,
    packed: Vec<E>,
    /// Head of the free list threaded through tombstones, or `E::INDEX_MASK` if empty.
    head:   usize,
    policy: DeletionPolicy,
}

impl<E: Raw> Default for SparseSet<E> {
    fn default() -> Self { Self::new(DeletionPolicy::default()) }
}

impl<E: Raw> fmt::Debug for SparseSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

fn page_of(index: usize) -> (usize, usize) { (index / SPARSE_PAGE, index % SPARSE_PAGE) }

impl<E: Raw> SparseSet<E> {
    /// Creates an empty sparse set with the given deletion policy.
    pub fn new(policy: DeletionPolicy) -> Self {
        Self { sparse: Vec::new(), packed: Vec::new(), head: E::INDEX_MASK, policy }
    }

    /// Creates an empty sparse set with capacity for `capacity` packed elements.
    pub fn with_capacity(policy: DeletionPolicy, capacity: usize) -> Self {
        let mut set = Self::new(policy);
        set.reserve(capacity);
        set
    }

    /// The deletion policy of this set.
    pub fn policy(&self) -> DeletionPolicy { self.policy }

    /// The length of the packed array, tombstones included.
    pub fn len(&self) -> usize { self.packed.len() }

    /// Whether the packed array is empty.
    pub fn is_empty(&self) -> bool { self.packed.is_empty() }

    /// The capacity of the packed array.
    pub fn capacity(&self) -> usize { self.packed.capacity() }

    /// The number of entity indices addressable without allocating new sparse pages.
    pub fn extent(&self) -> usize { self.sparse.len() * SPARSE_PAGE }

    /// The raw packed array, tombstones included.
    pub fn data(&self) -> &[E] { &self.packed }

    /// The head of the in-place free list, if any tombstone exists.
    pub fn free_list(&self) -> Option<usize> {
        (self.head != E::INDEX_MASK).then_some(self.head)
    }

    /// Reserves packed capacity for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) { self.packed.reserve(additional); }

    /// Fallible version of [`reserve`](Self::reserve).
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.packed.try_reserve(additional)?;
        Ok(())
    }

    /// Releases unused packed capacity.
    pub fn shrink_to_fit(&mut self) { self.packed.shrink_to_fit(); }

    fn sparse_slot(&self, entity: E) -> Option<E> {
        let (page, offset) = page_of(entity.to_index());
        let page = self.sparse.get(page)?.as_ref()?;
        Some(page[offset])
    }

    fn sparse_mut(&mut self, entity: E) -> &mut E {
        let (page, offset) = page_of(entity.to_index());
        let page = self
            .sparse
            .get_mut(page)
            .and_then(Option::as_mut)
            .expect("contained entities have a sparse page");
        &mut page[offset]
    }

    fn try_assure_page(&mut self, index: usize) -> Result<&mut E, TryReserveError> {
        let (page, offset) = page_of(index);

        if self.sparse.len() <= page {
            self.sparse.try_reserve(page + 1 - self.sparse.len())?;
            self.sparse.resize_with(page + 1, || None);
        }

        let slot = &mut self.sparse[page];
        if slot.is_none() {
            let mut fresh = Vec::new();
            fresh.try_reserve_exact(SPARSE_PAGE)?;
            fresh.resize(SPARSE_PAGE, E::null());
            *slot = Some(fresh.into_boxed_slice());
        }

        Ok(&mut slot.as_mut().expect("page was just assured")[offset])
    }

    /// Grows the packed array by a factor of 1.5 when it is full.
    fn try_grow(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let required = self.packed.len() + additional;
        if required > self.packed.capacity() {
            let target = cmp::max(required, self.packed.capacity() + self.packed.capacity() / 2);
            self.packed.try_reserve_exact(target - self.packed.len())?;
        }
        Ok(())
    }

    /// Whether `entity` is in the set with the same version.
    pub fn contains(&self, entity: E) -> bool {
        match self.sparse_slot(entity) {
            Some(slot) => !slot.is_null() && slot.to_version() == entity.to_version(),
            None => false,
        }
    }

    /// Returns the packed position of `entity`.
    ///
    /// # Panics
    /// Panics if `entity` is not in the set.
    /// The version is only checked when precondition checks are enabled.
    pub fn index(&self, entity: E) -> usize {
        match self.sparse_slot(entity) {
            Some(slot) if !slot.is_null() => {
                sparsec_assert!(
                    slot.to_version() == entity.to_version(),
                    "Entity {:?} is not in the sparse set",
                    entity
                );
                slot.to_index()
            }
            _ => panic!("Entity {:?} is not in the sparse set", entity),
        }
    }

    /// Returns the packed position of `entity`, if it is in the set.
    pub fn find(&self, entity: E) -> Option<usize> {
        self.contains(entity).then(|| self.index(entity))
    }

    /// Returns the entity at packed position `pos`, unless it is out of range or a tombstone.
    pub fn at(&self, pos: usize) -> Option<E> {
        self.packed.get(pos).copied().filter(|entity| !entity.is_tombstone())
    }

    /// Returns the version stored for the index of `entity`, regardless of its version.
    pub fn current(&self, entity: E) -> Option<u32> {
        self.sparse_slot(entity).filter(|slot| !slot.is_null()).map(|slot| slot.to_version())
    }

    /// Replaces the stored version of the index of `entity` with the version of `entity`.
    ///
    /// # Panics
    /// Panics if no entity with the same index is in the set.
    pub fn bump(&mut self, entity: E) -> u32 {
        let pos = match self.sparse_slot(entity) {
            Some(slot) if !slot.is_null() => slot.to_index(),
            _ => panic!("Cannot bump entity {:?} absent from the sparse set", entity),
        };

        *self.sparse_mut(entity) = E::construct(pos, entity.to_version());
        self.packed[pos] = entity;
        entity.to_version()
    }

    /// The packed position the next [`emplace`](Self::emplace) call will use.
    pub fn next_position(&self) -> usize {
        if self.head == E::INDEX_MASK {
            self.packed.len()
        } else {
            self.head
        }
    }

    /// Inserts `entity` and returns its packed position.
    ///
    /// Under the in-place policy, the most recently created tombstone is reused if any.
    ///
    /// # Panics
    /// Panics if `entity` is already in the set or memory cannot be allocated.
    pub fn emplace(&mut self, entity: E) -> usize {
        self.try_emplace(entity).unwrap_or_else(|err| panic!("Cannot insert {:?}: {}", entity, err))
    }

    /// Fallible version of [`emplace`](Self::emplace).
    ///
    /// The set is unchanged if an error is returned.
    pub fn try_emplace(&mut self, entity: E) -> Result<usize, Error> {
        self.check_insertable(entity);

        if self.head == E::INDEX_MASK {
            return self.push_back(entity);
        }

        let pos = self.head;
        *self.try_assure_page(entity.to_index())? = E::construct(pos, entity.to_version());
        self.head = self.packed[pos].to_index();
        self.packed[pos] = entity;
        Ok(pos)
    }

    fn check_insertable(&self, entity: E) {
        sparsec_assert!(
            !entity.is_null() && !entity.is_tombstone(),
            "Cannot insert reserved identifier {:?}",
            entity
        );
        sparsec_assert!(
            !self.contains(entity),
            "Entity {:?} is already in the sparse set",
            entity
        );
    }

    fn push_back(&mut self, entity: E) -> Result<usize, Error> {
        let pos = self.packed.len();
        if pos >= E::INDEX_MASK {
            return Err(Error::Exhausted { ty: any::type_name::<E>(), limit: E::INDEX_MASK });
        }

        self.try_grow(1)?;
        *self.try_assure_page(entity.to_index())? = E::construct(pos, entity.to_version());
        self.packed.push(entity);
        Ok(pos)
    }

    /// Appends all `entities` to the end of the packed array, ignoring tombstones.
    pub fn extend(&mut self, entities: impl IntoIterator<Item = E>) {
        let entities = entities.into_iter();
        self.reserve(entities.size_hint().0);

        for entity in entities {
            self.check_insertable(entity);
            if let Err(err) = self.push_back(entity) {
                panic!("Cannot insert {:?}: {}", entity, err);
            }
        }
    }

    /// Removes `entity` from the set.
    ///
    /// # Panics
    /// Panics if `entity` is not in the set.
    pub fn erase(&mut self, entity: E) { self.erase_with(entity, &mut ()) }

    /// Removes `entity` from the set, notifying `hooks`.
    pub fn erase_with(&mut self, entity: E, hooks: &mut impl Hooks<E>) {
        let pos = self.index(entity);
        hooks.about_to_pop(pos, entity);

        match self.policy {
            DeletionPolicy::InPlace => {
                *self.sparse_mut(entity) = E::null();
                self.packed[pos] = E::construct(self.head, E::VERSION_MASK);
                self.head = pos;
                hooks.in_place_pop(pos);
            }
            DeletionPolicy::SwapAndPop => {
                let last = self.packed.len() - 1;
                let moved = self.packed[last];
                self.packed.swap_remove(pos);
                if pos != last {
                    *self.sparse_mut(moved) = E::construct(pos, moved.to_version());
                }
                *self.sparse_mut(entity) = E::null();
                hooks.swap_and_pop(pos, last);
            }
        }
    }

    /// Removes `entity` if it is in the set. Returns whether it was removed.
    pub fn remove(&mut self, entity: E) -> bool { self.remove_with(entity, &mut ()) }

    /// Removes `entity` if it is in the set, notifying `hooks`.
    pub fn remove_with(&mut self, entity: E, hooks: &mut impl Hooks<E>) -> bool {
        let contained = self.contains(entity);
        if contained {
            self.erase_with(entity, hooks);
        }
        contained
    }

    /// Removes every entity of `entities` contained in the set.
    /// Returns the number of entities removed.
    pub fn remove_many(&mut self, entities: impl IntoIterator<Item = E>) -> usize {
        entities.into_iter().filter(|&entity| self.remove(entity)).count()
    }

    /// Removes all entities.
    pub fn clear(&mut self) { self.clear_with(&mut ()) }

    /// Removes all entities, notifying `hooks` with [`Hooks::in_place_pop`] for each of them.
    pub fn clear_with(&mut self, hooks: &mut impl Hooks<E>) {
        self.head = E::INDEX_MASK;

        while let Some(entity) = self.packed.pop() {
            if entity.is_tombstone() {
                continue;
            }

            let pos = self.packed.len();
            hooks.about_to_pop(pos, entity);
            *self.sparse_mut(entity) = E::null();
            hooks.in_place_pop(pos);
        }
    }

    /// Moves live elements into tombstones until the packed array has no holes.
    pub fn compact(&mut self) { self.compact_with(&mut ()) }

    /// Compacts the packed array, notifying `hooks` of each move.
    pub fn compact_with(&mut self, hooks: &mut impl Hooks<E>) {
        if self.head == E::INDEX_MASK {
            return;
        }

        let before = self.packed.len();

        let mut from = self.packed.len();
        while from > 0 && self.packed[from - 1].is_tombstone() {
            from -= 1;
        }

        let mut next = self.head;
        while next != E::INDEX_MASK && from > 0 {
            let to = next;
            next = self.packed[to].to_index();

            if to < from {
                from -= 1;
                hooks.move_and_pop(from, to);

                let moved = self.packed[from];
                self.packed[to] = moved;
                *self.sparse_mut(moved) = E::construct(to, moved.to_version());
                self.packed[from] = E::tombstone();

                while from > 0 && self.packed[from - 1].is_tombstone() {
                    from -= 1;
                }
            }
        }

        self.head = E::INDEX_MASK;
        self.packed.truncate(from);
        log::trace!("Compacted sparse set from {} to {} slots", before, from);
    }

    /// Exchanges the packed positions of `lhs` and `rhs`.
    ///
    /// # Panics
    /// Panics if either entity is not in the set.
    pub fn swap(&mut self, lhs: E, rhs: E) { self.swap_with(lhs, rhs, &mut ()) }

    /// Exchanges the packed positions of `lhs` and `rhs`, notifying `hooks`.
    pub fn swap_with(&mut self, lhs: E, rhs: E, hooks: &mut impl Hooks<E>) {
        let from = self.index(lhs);
        let to = self.index(rhs);

        hooks.swap_at(from, to);
        *self.sparse_mut(lhs) = E::construct(to, lhs.to_version());
        *self.sparse_mut(rhs) = E::construct(from, rhs.to_version());
        self.packed.swap(from, to);
    }

    /// Sorts all entities so that iteration visits them in ascending order of `compare`.
    pub fn sort_by(&mut self, compare: impl FnMut(E, E) -> Ordering) {
        self.compact();
        self.sort_n_by(self.len(), StdSort, compare);
    }

    /// Sorts the first `length` packed entities with `algo`
    /// so that iteration visits them in ascending order of `compare`.
    ///
    /// The set is compacted first; `length` refers to the compacted array.
    /// If `compare` panics, the set is left unchanged.
    pub fn sort_n_by(
        &mut self,
        length: usize,
        algo: impl SortAlgorithm,
        compare: impl FnMut(E, E) -> Ordering,
    ) {
        self.sort_n_by_with(length, algo, compare, &mut ())
    }

    /// Same as [`sort_n_by`](Self::sort_n_by), notifying `hooks` of each swap.
    pub fn sort_n_by_with(
        &mut self,
        length: usize,
        algo: impl SortAlgorithm,
        compare: impl FnMut(E, E) -> Ordering,
        hooks: &mut impl Hooks<E>,
    ) {
        self.compact_with(hooks);
        let plan = self.sort_plan(length, algo, compare);
        self.apply_sort(plan, hooks);
    }

    /// Computes the sorted order of the first `length` packed entities without modifying the set.
    pub(crate) fn sort_plan(
        &self,
        length: usize,
        algo: impl SortAlgorithm,
        mut compare: impl FnMut(E, E) -> Ordering,
    ) -> SortPlan<E> {
        sparsec_assert!(
            length <= self.packed.len(),
            "Cannot sort {} entities in a sparse set of length {}",
            length,
            self.packed.len()
        );
        sparsec_assert!(self.head == E::INDEX_MASK, "Cannot sort a sparse set with tombstones");

        let mut order = self.packed[..length].to_vec();
        order.reverse();
        algo.sort(&mut order, |&lhs, &rhs| compare(lhs, rhs));
        order.reverse();

        log::trace!("Sorting {} entities", length);
        SortPlan { order }
    }

    /// Rearranges the packed prefix into `plan`, following permutation cycles through `hooks`.
    pub(crate) fn apply_sort(&mut self, plan: SortPlan<E>, hooks: &mut impl Hooks<E>) {
        let length = plan.order.len();
        self.packed[..length].copy_from_slice(&plan.order);

        for pos in 0..length {
            let mut curr = pos;
            let mut next = self.index(self.packed[curr]);

            while curr != next {
                let idx = self.index(self.packed[next]);
                let entity = self.packed[curr];

                hooks.swap_at(next, idx);
                *self.sparse_mut(entity) = E::construct(curr, entity.to_version());

                curr = next;
                next = idx;
            }
        }
    }

    /// Rearranges entities so that those appearing in `order` come first in iteration,
    /// in the order they appear in `order`.
    /// Entities not in `order` are visited after them in an unspecified order.
    pub fn sort_as(&mut self, order: impl IntoIterator<Item = E>) {
        self.sort_as_with(order, &mut ())
    }

    /// Same as [`sort_as`](Self::sort_as), notifying `hooks` of each swap.
    pub fn sort_as_with(&mut self, order: impl IntoIterator<Item = E>, hooks: &mut impl Hooks<E>) {
        self.compact_with(hooks);

        let mut pos = self.packed.len();
        for entity in order {
            if pos == 0 {
                break;
            }

            if self.contains(entity) {
                let current = self.packed[pos - 1];
                if current != entity {
                    self.swap_with(current, entity, hooks);
                }
                pos -= 1;
            }
        }
    }

    /// Sorts entities shared with `other` into the iteration order of `other`.
    pub fn respect(&mut self, other: &SparseSet<E>) { self.sort_as(other.iter()) }

    /// Same as [`respect`](Self::respect), notifying `hooks` of each swap.
    pub fn respect_with(&mut self, other: &SparseSet<E>, hooks: &mut impl Hooks<E>) {
        self.sort_as_with(other.iter(), hooks)
    }

    /// Iterates over the entities in iteration order, i.e. the packed array backwards.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = E> + '_ {
        self.packed.iter().rev().copied().filter(|entity| !entity.is_tombstone())
    }
}

#[cfg(test)]
mod tests;
