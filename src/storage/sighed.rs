use std::ops::Deref;

use super::Storage;
use crate::comp::Component;
use crate::entity::{Entity, Raw};
use crate::signal::{Sigh, Sink};

/// A [`Storage`] publishing construction, update and destruction events.
///
/// Construction listeners run after the component is reachable through the storage,
/// update listeners run after the component was patched or replaced,
/// and destruction listeners run while the component is still present.
///
/// Read access goes through [`Deref`].
/// Mutations that do not change membership, such as [`get_mut`](Self::get_mut),
/// are forwarded without publishing.
pub struct Sighed<C: Component, E: Raw = Entity> {
    storage:      Storage<C, E>,
    construction: Sigh<Storage<C, E>, E>,
    update:       Sigh<Storage<C, E>, E>,
    destruction:  Sigh<Storage<C, E>, E>,
}

impl<C: Component, E: Raw> Default for Sighed<C, E> {
    fn default() -> Self { Self::new() }
}

impl<C: Component, E: Raw> Deref for Sighed<C, E> {
    type Target = Storage<C, E>;

    fn deref(&self) -> &Storage<C, E> { &self.storage }
}

impl<C: Component, E: Raw> Sighed<C, E> {
    /// Creates an empty storage without listeners.
    pub fn new() -> Self {
        Self {
            storage:      Storage::new(),
            construction: Sigh::new(),
            update:       Sigh::new(),
            destruction:  Sigh::new(),
        }
    }

    /// Listeners invoked after a component is assigned.
    pub fn on_construct(&mut self) -> Sink<'_, Storage<C, E>, E> { self.construction.sink() }

    /// Listeners invoked after a component is patched or replaced.
    pub fn on_update(&mut self) -> Sink<'_, Storage<C, E>, E> { self.update.sink() }

    /// Listeners invoked before a component is removed.
    pub fn on_destroy(&mut self) -> Sink<'_, Storage<C, E>, E> { self.destruction.sink() }

    /// Mutable access to the undecorated storage, bypassing every listener.
    pub(crate) fn storage_mut(&mut self) -> &mut Storage<C, E> { &mut self.storage }

    /// Assigns `value` to `entity` and publishes construction.
    pub fn emplace(&mut self, entity: E, value: C) -> &mut C {
        self.storage.emplace(entity, value);
        self.construction.publish(&self.storage, entity);
        self.storage.get_mut(entity)
    }

    /// Assigns the value returned by `ctor` to `entity` and publishes construction.
    ///
    /// Nothing is published if `ctor` fails.
    pub fn emplace_with<X>(
        &mut self,
        entity: E,
        ctor: impl FnOnce() -> Result<C, X>,
    ) -> Result<&mut C, X> {
        self.storage.emplace_with(entity, ctor)?;
        self.construction.publish(&self.storage, entity);
        Ok(self.storage.get_mut(entity))
    }

    /// Assigns `value` to `entity`,
    /// publishing update if it already had a component and construction otherwise.
    pub fn emplace_or_replace(&mut self, entity: E, value: C) -> &mut C {
        if self.storage.contains(entity) {
            self.replace(entity, value);
            self.storage.get_mut(entity)
        } else {
            self.emplace(entity, value)
        }
    }

    /// Assigns a clone of `value` to each of `entities`, publishing construction for each.
    pub fn insert(&mut self, entities: impl IntoIterator<Item = E>, value: C)
    where
        C: Clone,
    {
        for entity in entities {
            self.emplace(entity, value.clone());
        }
    }

    /// Assigns the value returned by `ctor` to each of `entities`, publishing construction for each.
    ///
    /// Stops at the first failure.
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

    /// Applies `f` to the component of `entity` and publishes update.
    pub fn patch(&mut self, entity: E, f: impl FnOnce(&mut C)) -> &mut C {
        f(self.storage.get_mut(entity));
        self.update.publish(&self.storage, entity);
        self.storage.get_mut(entity)
    }

    /// Replaces the component of `entity` and publishes update.
    /// Returns the previous value.
    pub fn replace(&mut self, entity: E, value: C) -> C {
        let old = self.storage.replace(entity, value);
        self.update.publish(&self.storage, entity);
        old
    }

    /// Mutable access without publishing update.
    pub fn get_mut(&mut self, entity: E) -> &mut C { self.storage.get_mut(entity) }

    /// Mutable access without publishing update.
    pub fn try_get_mut(&mut self, entity: E) -> Option<&mut C> { self.storage.try_get_mut(entity) }

    /// Mutable iteration without publishing update.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (E, &mut C)> + '_ { self.storage.iter_mut() }

    /// Publishes destruction and removes the component of `entity`.
    ///
    /// # Panics
    /// Panics if `entity` has no component in this storage.
    pub fn erase(&mut self, entity: E) {
        self.destruction.publish(&self.storage, entity);
        self.storage.erase(entity);
    }

    /// Publishes destruction and removes the component of `entity` if it has one.
    /// Returns whether it was removed.
    pub fn remove(&mut self, entity: E) -> bool {
        let contained = self.storage.contains(entity);
        if contained {
            self.erase(entity);
        }
        contained
    }

    /// Publishes destruction for every component, then removes them all.
    pub fn clear(&mut self) {
        if !self.destruction.is_empty() {
            let entities: Vec<E> = self.storage.as_set().iter().collect();
            for entity in entities {
                self.destruction.publish(&self.storage, entity);
            }
        }

        self.storage.clear();
    }

    /// See [`Storage::compact`].
    pub fn compact(&mut self) { self.storage.compact() }

    /// See [`Storage::swap`].
    pub fn swap(&mut self, lhs: E, rhs: E) { self.storage.swap(lhs, rhs) }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::Sighed;
    use crate::entity::{Entity, Raw};
    use crate::test_util::{self, Position};

    fn entity(index: usize) -> Entity { Entity::construct(index, 0) }

    #[test]
    fn test_event_timing() {
        test_util::init();

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut storage = Sighed::<Position>::new();

        {
            let log = Rc::clone(&log);
            storage.on_construct().connect(move |storage, entity| {
                log.borrow_mut().push(format!("construct {} {:?}", entity, storage.try_get(entity)))
            });
        }
        {
            let log = Rc::clone(&log);
            storage.on_update().connect(move |storage, entity| {
                log.borrow_mut().push(format!("update {} {:?}", entity, storage.try_get(entity)))
            });
        }
        {
            let log = Rc::clone(&log);
            storage.on_destroy().connect(move |storage, entity| {
                log.borrow_mut().push(format!("destroy {} {:?}", entity, storage.try_get(entity)))
            });
        }

        storage.emplace(entity(1), Position(1, 1));
        storage.patch(entity(1), |pos| pos.0 = 2);
        storage.get_mut(entity(1)).1 = 3;
        assert_eq!(storage.replace(entity(1), Position(4, 4)), Position(2, 3));
        storage.emplace_or_replace(entity(2), Position(5, 5));
        assert!(storage.remove(entity(1)));
        assert!(!storage.remove(entity(1)));
        storage.clear();

        assert_eq!(*log.borrow(), [
            "construct 1v0 Some(Position(1, 1))",
            "update 1v0 Some(Position(2, 1))",
            "update 1v0 Some(Position(4, 4))",
            "construct 2v0 Some(Position(5, 5))",
            "destroy 1v0 Some(Position(4, 4))",
            "destroy 2v0 Some(Position(5, 5))",
        ]);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_failed_emplace_publishes_nothing() {
        test_util::init();

        let count = Rc::new(RefCell::new(0));
        let mut storage = Sighed::<Position>::new();
        {
            let count = Rc::clone(&count);
            storage.on_construct().connect(move |_, _| *count.borrow_mut() += 1);
        }

        assert_eq!(storage.emplace_with(entity(0), || Err::<Position, _>(())), Err(()));
        assert!(storage.insert_with([entity(1), entity(2)], |_| Ok::<_, ()>(Position(0, 0))).is_ok());
        assert_eq!(*count.borrow(), 2);
    }
}
