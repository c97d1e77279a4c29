//! Manages entity identifier allocation and recycling.

use std::any;

use super::Raw;
use crate::Error;

/// Allocates entity identifiers.
///
/// Slot `i` of the allocator holds `i` itself (with the current version) while the index is alive.
/// A released slot instead holds the index of the next released slot
/// together with the version it will be handed out with,
/// so the free list costs no memory beyond the slots themselves.
#[derive(Debug)]
pub struct Ealloc<E: Raw> {
    entities: Vec<E>,
    /// Head of the free list, or `E::INDEX_MASK` if empty.
    free:     usize,
    released: usize,
}

impl<E: Raw> Default for Ealloc<E> {
    fn default() -> Self { Self::new() }
}

impl<E: Raw> Ealloc<E> {
    /// Creates an empty allocator.
    pub fn new() -> Self { Self { entities: Vec::new(), free: E::INDEX_MASK, released: 0 } }

    /// The number of indices ever allocated, alive or released.
    pub fn len(&self) -> usize { self.entities.len() }

    /// Whether no index has ever been allocated.
    pub fn is_empty(&self) -> bool { self.entities.is_empty() }

    /// The number of alive identifiers.
    pub fn alive(&self) -> usize { self.entities.len() - self.released }

    /// Allocates an identifier, recycling a released index if one is available.
    ///
    /// # Panics
    /// Panics if the index space of `E` is exhausted.
    pub fn create(&mut self) -> E {
        self.try_create().unwrap_or_else(|err| panic!("Cannot create entity: {}", err))
    }

    /// Allocates an identifier, recycling a released index if one is available.
    pub fn try_create(&mut self) -> Result<E, Error> {
        if self.free != E::INDEX_MASK {
            let index = self.free;
            let slot = self.entities[index];
            self.free = slot.to_index();
            self.released -= 1;

            let entity = E::construct(index, slot.to_version());
            self.entities[index] = entity;
            log::trace!("Recycled entity {:?}", entity);
            return Ok(entity);
        }

        let index = self.entities.len();
        if index >= E::INDEX_MASK {
            return Err(Error::Exhausted { ty: any::type_name::<E>(), limit: E::INDEX_MASK });
        }
        self.entities.try_reserve(1)?;

        let entity = E::construct(index, 0);
        self.entities.push(entity);
        Ok(entity)
    }

    /// Allocates the identifier `hint` if its index is available,
    /// otherwise falls back to [`create`](Self::create).
    ///
    /// Indices skipped over by a hint beyond the allocated range are released with version 0.
    pub fn create_at(&mut self, hint: E) -> E {
        sparsec_assert!(
            !hint.is_null() && !hint.is_tombstone(),
            "Cannot create entity from reserved identifier {:?}",
            hint
        );

        let index = hint.to_index();

        if index >= self.entities.len() {
            for skipped in self.entities.len()..index {
                self.entities.push(E::construct(self.free, 0));
                self.free = skipped;
                self.released += 1;
            }
            self.entities.push(hint);
            return hint;
        }

        if self.entities[index].to_index() == index {
            return self.create();
        }

        self.unlink(index);
        self.released -= 1;
        self.entities[index] = hint;
        hint
    }

    /// Removes the released `index` from the free list.
    fn unlink(&mut self, index: usize) {
        let next = self.entities[index].to_index();

        if self.free == index {
            self.free = next;
            return;
        }

        let mut cursor = self.free;
        while cursor != E::INDEX_MASK {
            let slot = self.entities[cursor];
            if slot.to_index() == index {
                self.entities[cursor] = E::construct(next, slot.to_version());
                return;
            }
            cursor = slot.to_index();
        }

        panic!("Released index {} is missing from the free list", index);
    }

    /// Whether `entity` is alive with exactly this version.
    pub fn valid(&self, entity: E) -> bool {
        match self.entities.get(entity.to_index()) {
            Some(&slot) => slot == entity,
            None => false,
        }
    }

    /// The version currently associated with the index of `entity`.
    ///
    /// For a released index, this is the version it will be recycled with.
    /// Returns `None` if the index was never allocated.
    pub fn current(&self, entity: E) -> Option<u32> {
        self.entities.get(entity.to_index()).map(|slot| slot.to_version())
    }

    /// Releases `entity` and bumps the version of its index.
    ///
    /// Returns the version the index will be recycled with.
    pub fn release(&mut self, entity: E) -> u32 { self.release_as(entity, entity.next().to_version()) }

    /// Releases `entity`, recycling its index with `version` next time.
    ///
    /// # Panics
    /// Panics if `entity` is not alive or `version` is the tombstone version.
    pub fn release_as(&mut self, entity: E, version: u32) -> u32 {
        sparsec_assert!(self.valid(entity), "Cannot release invalid entity {:?}", entity);
        sparsec_assert!(version != E::VERSION_MASK, "Cannot recycle with the tombstone version");

        let index = entity.to_index();
        self.entities[index] = E::construct(self.free, version);
        self.free = index;
        self.released += 1;
        version
    }

    /// Iterates over alive identifiers in index order.
    pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
        self.entities
            .iter()
            .enumerate()
            .filter(|&(index, slot)| slot.to_index() == index)
            .map(|(_, &slot)| slot)
    }
}
