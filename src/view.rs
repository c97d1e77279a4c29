//! Views iterate over the entities owning every required component and none of the excluded ones.
//!
//! A view walks the smallest required storage (the *driver*)
//! and checks each candidate against the other storages.
//! Nothing is cached; the intersection is recomputed on every walk.
//!
//! ```
//! use sparsec::{comp, Registry};
//!
//! #[comp]
//! struct Position(i32);
//! #[comp]
//! struct Velocity(i32);
//!
//! let mut registry = Registry::new();
//! for i in 0..10 {
//!     let entity = registry.create();
//!     registry.emplace(entity, Position(i));
//!     if i % 2 == 0 {
//!         registry.emplace(entity, Velocity(1));
//!     }
//! }
//!
//! let mut view = registry.view::<(&mut Position, &Velocity)>();
//! view.each(|_, (position, velocity)| position.0 += velocity.0);
//! assert_eq!(view.iter().count(), 5);
//! ```

use std::any::{self, TypeId};

use itertools::Itertools;

use crate::comp::Component;
use crate::entity::{Entity, Raw};
use crate::registry::{Pools, Registry};
use crate::sparse_set::SparseSet;
use crate::storage::{AnyStorage, Storage};


/// A single element of a [`Query`], borrowing one component type.
///
/// Implemented for `&C` and `&mut C`.
pub trait Fetch<E: Raw> {
    /// The component type fetched.
    type Component: Component;

    /// The reference produced for each entity.
    type Item<'a>;

    /// Fetches the component of `entity`.
    fn fetch(storage: &mut Storage<Self::Component, E>, entity: E) -> Self::Item<'_>;

    /// Fetches the component at packed position `pos`.
    fn fetch_at(storage: &mut Storage<Self::Component, E>, pos: usize) -> Self::Item<'_>;
}

impl<'x, C: Component, E: Raw> Fetch<E> for &'x C {
    type Component = C;
    type Item<'a> = &'a C;

    fn fetch(storage: &mut Storage<C, E>, entity: E) -> &C { storage.get(entity) }

    fn fetch_at(storage: &mut Storage<C, E>, pos: usize) -> &C { storage.get_at(pos) }
}

impl<'x, C: Component, E: Raw> Fetch<E> for &'x mut C {
    type Component = C;
    type Item<'a> = &'a mut C;

    fn fetch(storage: &mut Storage<C, E>, entity: E) -> &mut C { storage.get_mut(entity) }

    fn fetch_at(storage: &mut Storage<C, E>, pos: usize) -> &mut C { storage.get_at_mut(pos) }
}

/// A tuple of [`Fetch`] elements, e.g. `(&Position, &mut Velocity)`.
pub trait Query<E: Raw> {
    /// The storages borrowed for the query.
    type Storages<'r>;

    /// The tuple of references produced for each entity.
    type Items<'a>;

    /// The type indices of the queried components.
    type Indices: AsRef<[usize]>;

    /// The [`TypeId`]s of the queried components.
    type TypeIds: AsRef<[TypeId]>;

    /// The number of component types in the query.
    const LEN: usize;

    /// Returns the [`TypeId`]s of the queried components in declaration order.
    fn type_ids() -> Self::TypeIds;

    /// Creates the pools of every queried component,
    /// returning their type indices in declaration order.
    fn assure(registry: &mut Registry<E>) -> Self::Indices;

    /// Borrows the queried storages at the `indices` returned by [`assure`](Self::assure).
    fn acquire<'r>(pools: &mut Pools<'r, E>, indices: &Self::Indices) -> Self::Storages<'r>;

    /// Type-erased access to the `i`-th storage.
    fn storage<'t>(storages: &'t Self::Storages<'_>, i: usize) -> &'t dyn AnyStorage<E>;

    /// Type-erased mutable access to the `i`-th storage.
    fn storage_mut<'t>(storages: &'t mut Self::Storages<'_>, i: usize) -> &'t mut dyn AnyStorage<E>;

    /// Fetches the components of `entity`.
    fn fetch<'a>(storages: &'a mut Self::Storages<'_>, entity: E) -> Self::Items<'a>;

    /// Fetches the components at packed position `pos` of every storage.
    fn fetch_at<'a>(storages: &'a mut Self::Storages<'_>, pos: usize) -> Self::Items<'a>;
}

/// A tuple of component types, e.g. `(Position, Velocity)`.
pub trait Types<E: Raw> {
    /// The type indices of the listed components.
    type Indices: AsRef<[usize]>;

    /// The [`TypeId`]s of the listed components.
    type TypeIds: AsRef<[TypeId]>;

    /// Returns the [`TypeId`]s of the listed components in declaration order.
    fn type_ids() -> Self::TypeIds;

    /// Creates the pools of every listed component,
    /// returning their type indices in declaration order.
    fn assure(registry: &mut Registry<E>) -> Self::Indices;
}

macro_rules! one {
    ($tt:tt) => {
        1
    };
}

macro_rules! impl_tuple {
    ($($ty:ident $idx:tt),*) => {
        #[allow(unused_variables, clippy::unused_unit)]
        impl<E: Raw, $($ty: Fetch<E>),*> Query<E> for ($($ty,)*) {
            type Storages<'r> = ($(&'r mut Storage<$ty::Component, E>,)*);
            type Items<'a> = ($($ty::Item<'a>,)*);
            type Indices = [usize; 0 $(+ one!($ty))*];
            type TypeIds = [TypeId; 0 $(+ one!($ty))*];

            const LEN: usize = 0 $(+ one!($ty))*;

            fn type_ids() -> Self::TypeIds { [$(TypeId::of::<$ty::Component>()),*] }

            fn assure(registry: &mut Registry<E>) -> Self::Indices {
                [$(registry.assure::<$ty::Component>()),*]
            }

            fn acquire<'r>(pools: &mut Pools<'r, E>, indices: &Self::Indices) -> Self::Storages<'r> {
                ($(pools.take::<$ty::Component>(indices[$idx]),)*)
            }

            fn storage<'t>(storages: &'t Self::Storages<'_>, i: usize) -> &'t dyn AnyStorage<E> {
                match i {
                    $($idx => &*storages.$idx,)*
                    _ => panic!("Query has no component at {}", i),
                }
            }

            fn storage_mut<'t>(storages: &'t mut Self::Storages<'_>, i: usize) -> &'t mut dyn AnyStorage<E> {
                match i {
                    $($idx => &mut *storages.$idx,)*
                    _ => panic!("Query has no component at {}", i),
                }
            }

            fn fetch<'a>(storages: &'a mut Self::Storages<'_>, entity: E) -> Self::Items<'a> {
                ($($ty::fetch(&mut *storages.$idx, entity),)*)
            }

            fn fetch_at<'a>(storages: &'a mut Self::Storages<'_>, pos: usize) -> Self::Items<'a> {
                ($($ty::fetch_at(&mut *storages.$idx, pos),)*)
            }
        }

        #[allow(unused_variables)]
        impl<E: Raw, $($ty: Component),*> Types<E> for ($($ty,)*) {
            type Indices = [usize; 0 $(+ one!($ty))*];
            type TypeIds = [TypeId; 0 $(+ one!($ty))*];

            fn type_ids() -> Self::TypeIds { [$(TypeId::of::<$ty>()),*] }

            fn assure(registry: &mut Registry<E>) -> Self::Indices {
                [$(registry.assure::<$ty>()),*]
            }
        }
    };
}

impl_tuple!();
impl_tuple!(T0 0);
impl_tuple!(T0 0, T1 1);
impl_tuple!(T0 0, T1 1, T2 2);
impl_tuple!(T0 0, T1 1, T2 2, T3 3);
impl_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4);
impl_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);
impl_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6);
impl_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7);
#[cfg(feature = "tuple-impl-12")]
impl_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7, T8 8);
#[cfg(feature = "tuple-impl-12")]
impl_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7, T8 8, T9 9);
#[cfg(feature = "tuple-impl-12")]
impl_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7, T8 8, T9 9, T10 10);
#[cfg(feature = "tuple-impl-12")]
impl_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7, T8 8, T9 9, T10 10, T11 11);

/// Panics if a type index appears twice in `indices`.
pub(crate) fn assert_disjoint<'t>(indices: impl IntoIterator<Item = &'t usize>, what: &str) {
    assert!(indices.into_iter().all_unique(), "A {} cannot mention a component type twice", what);
}

/// The most component types a tuple implementation accepts.
pub(crate) const MAX_ARITY: usize = if cfg!(feature = "tuple-impl-12") { 12 } else { 8 };

/// The sparse sets of the excluded components of a view, stored inline.
pub(crate) type Excluded<'r, E> = [Option<&'r SparseSet<E>>; MAX_ARITY];

/// Iterates over the entities with every component of `Q` and none of the excluded components.
pub struct View<'r, Q: Query<E>, E: Raw = Entity> {
    storages: Q::Storages<'r>,
    excluded: Excluded<'r, E>,
    driver:   Option<usize>,
}

impl<'r, Q: Query<E>, E: Raw> View<'r, Q, E> {
    pub(crate) fn new(storages: Q::Storages<'r>, excluded: Excluded<'r, E>) -> Self {
        Self { storages, excluded, driver: None }
    }

    /// Forces iteration to walk the storage of `C`.
    ///
    /// # Panics
    /// Panics if `C` is not one of the required components.
    pub fn use_driver<C: Component>(mut self) -> Self {
        let id = TypeId::of::<C>();
        let position = Q::type_ids().as_ref().iter().position(|&other| other == id);
        match position {
            Some(position) => self.driver = Some(position),
            None => panic!("Component type {} is not required by the view", any::type_name::<C>()),
        }
        self
    }

    fn driver_index(&self) -> usize {
        match self.driver {
            Some(driver) => driver,
            None => (0..Q::LEN)
                .min_by_key(|&i| Q::storage(&self.storages, i).as_set().len())
                .expect("views require at least one component type"),
        }
    }

    fn driver(&self) -> &SparseSet<E> { Q::storage(&self.storages, self.driver_index()).as_set() }

    /// Whether `entity` has every required component and no excluded component.
    pub fn contains(&self, entity: E) -> bool {
        (0..Q::LEN).all(|i| Q::storage(&self.storages, i).as_set().contains(entity))
            && !self.excluded.iter().flatten().any(|set| set.contains(entity))
    }

    /// An upper bound of the number of entities in the view.
    pub fn size_hint(&self) -> usize { self.driver().len() }

    /// Iterates over the entities in the view in the iteration order of the driver.
    pub fn iter(&self) -> Iter<'_, 'r, Q, E> {
        let driver = self.driver();
        Iter { view: self, driver, front: driver.len(), back: 0 }
    }

    /// The first entity in iteration order.
    pub fn front(&self) -> Option<E> { self.iter().next() }

    /// The last entity in iteration order.
    pub fn back(&self) -> Option<E> { self.iter().next_back() }

    /// The position of `entity` in the driver, if it is in the view.
    pub fn find(&self, entity: E) -> Option<usize> {
        if self.contains(entity) {
            self.driver().find(entity)
        } else {
            None
        }
    }

    /// Whether the view has no entities.
    pub fn is_empty(&self) -> bool { self.front().is_none() }

    /// Fetches the components of `entity` without checking membership of the view.
    ///
    /// # Panics
    /// Panics if `entity` lacks a required component.
    pub fn get(&mut self, entity: E) -> Q::Items<'_> { Q::fetch(&mut self.storages, entity) }

    /// Calls `f` with every entity in the view and its components.
    pub fn each(&mut self, mut f: impl FnMut(E, Q::Items<'_>)) {
        let driver = self.driver_index();
        let mut pos = Q::storage(&self.storages, driver).as_set().len();

        while pos > 0 {
            pos -= 1;

            let entity = match Q::storage(&self.storages, driver).as_set().at(pos) {
                Some(entity) => entity,
                None => continue,
            };

            if self.contains(entity) {
                f(entity, Q::fetch(&mut self.storages, entity));
            }
        }
    }
}

/// Iterator over the entities of a [`View`], returned by [`View::iter`].
pub struct Iter<'v, 'r, Q: Query<E>, E: Raw> {
    view:   &'v View<'r, Q, E>,
    driver: &'v SparseSet<E>,
    /// Positions in `back..front` are not visited yet.
    front:  usize,
    back:   usize,
}

impl<'v, 'r, Q: Query<E>, E: Raw> Iter<'v, 'r, Q, E> {
    fn accept(&self, pos: usize) -> Option<E> {
        let entity = self.driver.at(pos)?;
        self.view.contains(entity).then_some(entity)
    }
}

impl<'v, 'r, Q: Query<E>, E: Raw> Iterator for Iter<'v, 'r, Q, E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        while self.front > self.back {
            self.front -= 1;
            if let Some(entity) = self.accept(self.front) {
                return Some(entity);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) { (0, Some(self.front - self.back)) }
}

impl<'v, 'r, Q: Query<E>, E: Raw> DoubleEndedIterator for Iter<'v, 'r, Q, E> {
    fn next_back(&mut self) -> Option<E> {
        while self.back < self.front {
            let pos = self.back;
            self.back += 1;
            if let Some(entity) = self.accept(pos) {
                return Some(entity);
            }
        }
        None
    }
}

/// A view over a single component type, passing straight through to its storage.
pub struct SingleView<'r, C: Component, E: Raw = Entity> {
    storage: &'r mut Storage<C, E>,
}

impl<'r, C: Component, E: Raw> SingleView<'r, C, E> {
    pub(crate) fn new(storage: &'r mut Storage<C, E>) -> Self { Self { storage } }

    /// The underlying sparse set.
    pub fn as_set(&self) -> &SparseSet<E> { self.storage.as_set() }

    /// The number of packed positions, tombstones included.
    pub fn size_hint(&self) -> usize { self.storage.len() }

    /// Whether the view has no entities.
    pub fn is_empty(&self) -> bool { self.iter().next().is_none() }

    /// Whether `entity` has the component.
    pub fn contains(&self, entity: E) -> bool { self.storage.contains(entity) }

    /// The packed position of `entity`, if it has the component.
    pub fn find(&self, entity: E) -> Option<usize> { self.storage.as_set().find(entity) }

    /// Iterates over the entities in iteration order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = E> + '_ { self.storage.as_set().iter() }

    /// The first entity in iteration order.
    pub fn front(&self) -> Option<E> { self.iter().next() }

    /// The last entity in iteration order.
    pub fn back(&self) -> Option<E> { self.iter().next_back() }

    /// Returns the component of `entity`.
    pub fn get(&self, entity: E) -> &C { self.storage.get(entity) }

    /// Returns the component of `entity` mutably.
    pub fn get_mut(&mut self, entity: E) -> &mut C { self.storage.get_mut(entity) }

    /// Calls `f` with every entity and its component.
    pub fn each(&mut self, mut f: impl FnMut(E, &mut C)) {
        for (entity, value) in self.storage.iter_mut() {
            f(entity, value);
        }
    }

    /// Iterates over entities and their components mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (E, &mut C)> + '_ { self.storage.iter_mut() }
}
