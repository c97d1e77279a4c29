//! The registry owns the entities, one pool per component type, and the groups.
//!
//! Pools are created lazily on first use and indexed by a process-wide [type index](type_index).
//! Each registry caches the indices of the types it has seen,
//! so the process-wide table is only consulted the first time a type is used with a registry.
//! Every insertion and removal performed through the registry keeps the groups up to date.

use std::any::{self, Any, TypeId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::comp::Component;
use crate::entity::{Ealloc, Entity, Raw};
use crate::group::{Group, GroupData};
use crate::signal::Sink;
use crate::sparse_set::{DeletionPolicy, SparseSet};
use crate::storage::{AnyStorage, Sighed, Storage};
use crate::util::Taker;
use crate::view::{self, Excluded, Query, SingleView, Types, View};

#[cfg(test)]
mod tests;

/// Returns the process-wide sequential index of the component type `C`.
///
/// Indices start at zero and are assigned on first request.
pub fn type_index<C: 'static>() -> usize {
    static TYPES: OnceLock<Mutex<IndexSet<TypeId>>> = OnceLock::new();

    let mut types = TYPES.get_or_init(Default::default).lock();
    let (index, inserted) = types.insert_full(TypeId::of::<C>());
    if inserted {
        log::trace!("Assigned type index {} to {}", index, any::type_name::<C>());
    }
    index
}

/// Type-erased access to a signal-decorated storage.
pub(crate) trait AnyPool<E: Raw>: 'static {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn storage(&self) -> &dyn AnyStorage<E>;

    fn storage_mut(&mut self) -> &mut dyn AnyStorage<E>;

    /// Removes the component of `entity` with signals.
    fn remove(&mut self, entity: E) -> bool;
}

impl<C: Component, E: Raw> AnyPool<E> for Sighed<C, E> {
    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn storage(&self) -> &dyn AnyStorage<E> { &**self }

    fn storage_mut(&mut self) -> &mut dyn AnyStorage<E> { Sighed::storage_mut(self) }

    fn remove(&mut self, entity: E) -> bool { Sighed::remove(self, entity) }
}

/// A registry slot, empty until the component type is used.
pub(crate) type Pool<E> = Option<Box<dyn AnyPool<E>>>;

fn downcast<C: Component, E: Raw>(pool: &dyn AnyPool<E>) -> &Sighed<C, E> {
    pool.as_any().downcast_ref().expect("pool type matches its type index")
}

fn downcast_mut<C: Component, E: Raw>(pool: &mut dyn AnyPool<E>) -> &mut Sighed<C, E> {
    pool.as_any_mut().downcast_mut().expect("pool type matches its type index")
}

/// Hands out disjoint borrows of the registry's storages.
pub struct Pools<'r, E: Raw> {
    taker: Taker<'r, Pool<E>>,
}

impl<'r, E: Raw> Pools<'r, E> {
    pub(crate) fn new(pools: &'r mut [Pool<E>]) -> Self { Self { taker: Taker::new(pools) } }

    /// Borrows the storage of `C`, which has the type index `index`.
    ///
    /// # Panics
    /// Panics if the storage was already borrowed or was never created.
    pub fn take<C: Component>(&mut self, index: usize) -> &'r mut Storage<C, E> {
        let pool = self.taker.take(index).unwrap_or_else(|| {
            panic!("Storage of {} is borrowed more than once", any::type_name::<C>())
        });
        let pool = pool.as_mut().expect("pools are assured before borrowing");
        downcast_mut::<C, E>(&mut **pool).storage_mut()
    }

    /// Borrows the sparse set of the pool at `index`.
    pub(crate) fn take_set(&mut self, index: usize) -> &'r SparseSet<E> {
        let pool: &'r Pool<E> = self.taker.take(index).expect("type indices of a query are distinct");
        pool.as_ref().expect("pools are assured before borrowing").storage().as_set()
    }
}

/// Owns entities, their components and the groups over them.
pub struct Registry<E: Raw = Entity> {
    pools:  Vec<Pool<E>>,
    /// The type indices of the pools created in this registry.
    types:  HashMap<TypeId, usize>,
    ealloc: Ealloc<E>,
    /// Sorted by ascending number of mentioned types,
    /// so that a less restrictive group always precedes the groups nested in it.
    groups: Vec<GroupData<E>>,
}

impl<E: Raw> Default for Registry<E> {
    fn default() -> Self {
        Self { pools: Vec::new(), types: HashMap::new(), ealloc: Ealloc::new(), groups: Vec::new() }
    }
}

impl<E: Raw> fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("alive", &self.ealloc.alive())
            .field("pools", &self.types.len())
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry of [`Entity`] identifiers.
    ///
    /// Use [`Registry::default`] for other identifier types.
    pub fn new() -> Self { Self::default() }
}

impl<E: Raw> Registry<E> {
    /// Creates the pool of `C` if it does not exist yet, returning its type index.
    pub(crate) fn assure<C: Component>(&mut self) -> usize {
        if let Some(&index) = self.types.get(&TypeId::of::<C>()) {
            return index;
        }

        let index = type_index::<C>();
        if self.pools.len() <= index {
            self.pools.resize_with(index + 1, || None);
        }

        log::debug!("Creating pool for {}", any::type_name::<C>());
        self.pools[index] = Some(Box::new(Sighed::<C, E>::new()));
        self.types.insert(TypeId::of::<C>(), index);
        index
    }

    /// The type index of `C`, if its pool was created in this registry.
    fn index_of<C: Component>(&self) -> Option<usize> { self.types.get(&TypeId::of::<C>()).copied() }

    fn pool_at(&self, index: usize) -> Option<&dyn AnyPool<E>> {
        self.pools.get(index)?.as_deref()
    }

    fn pool_mut<C: Component>(&mut self, index: usize) -> &mut Sighed<C, E> {
        let pool = self.pools[index].as_deref_mut().expect("pool was assured");
        downcast_mut(pool)
    }

    fn owned_at(&self, index: usize) -> bool { self.groups.iter().any(|group| group.owns(index)) }

    fn involved_at(&self, index: usize) -> bool {
        self.groups.iter().any(|group| group.involves(index))
    }

    /// Updates the groups after `entity` received the component at `index`.
    fn after_insert(&mut self, index: usize, entity: E) {
        for group in &mut self.groups {
            if group.requires(index) {
                group.maybe_valid_if(&mut self.pools, entity, None);
            }
        }
        for group in self.groups.iter_mut().rev() {
            if group.excludes(index) {
                group.discard_if(&mut self.pools, entity);
            }
        }
    }

    /// Updates the groups before `entity` loses the component at `index`.
    fn before_remove(&mut self, index: usize, entity: E) {
        for group in self.groups.iter_mut().rev() {
            if group.requires(index) {
                group.discard_if(&mut self.pools, entity);
            }
        }
        for group in &mut self.groups {
            if group.excludes(index) {
                group.maybe_valid_if(&mut self.pools, entity, Some(index));
            }
        }
    }

    // Entities

    /// Creates a new entity, recycling a released index if possible.
    pub fn create(&mut self) -> E { self.ealloc.create() }

    /// Creates an entity with the index of `hint` if that index is free.
    pub fn create_at(&mut self, hint: E) -> E { self.ealloc.create_at(hint) }

    /// Creates `count` entities.
    pub fn create_many(&mut self, count: usize) -> Vec<E> {
        (0..count).map(|_| self.ealloc.create()).collect()
    }

    /// Whether `entity` is alive.
    pub fn valid(&self, entity: E) -> bool { self.ealloc.valid(entity) }

    /// The current version of the index of `entity`, if the index was ever allocated.
    pub fn current(&self, entity: E) -> Option<u32> { self.ealloc.current(entity) }

    /// The number of alive entities.
    pub fn alive(&self) -> usize { self.ealloc.alive() }

    /// Iterates over the alive entities.
    pub fn entities(&self) -> impl Iterator<Item = E> + '_ { self.ealloc.iter() }

    /// Removes every component of `entity` and releases it. Returns the new version of its index.
    pub fn destroy(&mut self, entity: E) -> u32 {
        let version = entity.next().to_version();
        self.destroy_as(entity, version)
    }

    /// Same as [`destroy`](Self::destroy), assigning `version` to the released index.
    ///
    /// Components are removed in reverse order of type index.
    pub fn destroy_as(&mut self, entity: E, version: u32) -> u32 {
        sparsec_assert!(self.valid(entity), "Cannot destroy invalid entity {:?}", entity);

        for index in (0..self.pools.len()).rev() {
            let contained =
                self.pool_at(index).map_or(false, |pool| pool.storage().as_set().contains(entity));
            if contained {
                self.before_remove(index, entity);
                self.pools[index].as_mut().expect("pool contains the entity").remove(entity);
            }
        }

        self.ealloc.release_as(entity, version)
    }

    /// Whether `entity` has no components.
    pub fn orphan(&self, entity: E) -> bool {
        self.pools.iter().flatten().all(|pool| !pool.storage().as_set().contains(entity))
    }

    /// Destroys every entity.
    pub fn clear(&mut self) {
        let entities: Vec<E> = self.ealloc.iter().collect();
        for entity in entities {
            self.destroy(entity);
        }
    }

    // Components

    /// Assigns `value` to `entity`.
    ///
    /// # Panics
    /// Panics if `entity` already has a `C`.
    pub fn emplace<C: Component>(&mut self, entity: E, value: C) -> &mut C {
        sparsec_assert!(self.valid(entity), "Cannot assign to invalid entity {:?}", entity);

        let index = self.assure::<C>();
        self.pool_mut::<C>(index).emplace(entity, value);
        self.after_insert(index, entity);
        self.pool_mut::<C>(index).get_mut(entity)
    }

    /// Assigns `value` to `entity`, replacing the existing component if any.
    pub fn emplace_or_replace<C: Component>(&mut self, entity: E, value: C) -> &mut C {
        let index = self.assure::<C>();
        if self.pool_mut::<C>(index).contains(entity) {
            self.pool_mut::<C>(index).replace(entity, value);
            self.pool_mut::<C>(index).get_mut(entity)
        } else {
            self.emplace(entity, value)
        }
    }

    /// Assigns a clone of `value` to each of `entities`.
    pub fn insert<C: Component + Clone>(&mut self, entities: impl IntoIterator<Item = E>, value: C) {
        for entity in entities {
            self.emplace(entity, value.clone());
        }
    }

    /// Replaces the component of `entity`, returning the previous value.
    ///
    /// # Panics
    /// Panics if `entity` has no `C`.
    pub fn replace<C: Component>(&mut self, entity: E, value: C) -> C {
        let index = self.assure::<C>();
        self.pool_mut::<C>(index).replace(entity, value)
    }

    /// Applies `f` to the component of `entity` and publishes update.
    pub fn patch<C: Component>(&mut self, entity: E, f: impl FnOnce(&mut C)) -> &mut C {
        let index = self.assure::<C>();
        self.pool_mut::<C>(index).patch(entity, f)
    }

    /// Removes the component of `entity`.
    ///
    /// # Panics
    /// Panics if `entity` has no `C`.
    pub fn erase<C: Component>(&mut self, entity: E) {
        let index = self.assure::<C>();
        assert!(
            self.pool_mut::<C>(index).contains(entity),
            "Entity {:?} has no {}",
            entity,
            any::type_name::<C>()
        );

        self.before_remove(index, entity);
        self.pool_mut::<C>(index).erase(entity);
    }

    /// Removes the component of `entity` if it has one. Returns whether it was removed.
    pub fn remove<C: Component>(&mut self, entity: E) -> bool {
        let index = self.assure::<C>();
        if !self.pool_mut::<C>(index).contains(entity) {
            return false;
        }

        self.before_remove(index, entity);
        self.pool_mut::<C>(index).erase(entity);
        true
    }

    /// Removes every component of type `C`.
    pub fn clear_components<C: Component>(&mut self) {
        let index = self.assure::<C>();
        if !self.involved_at(index) {
            self.pool_mut::<C>(index).clear();
            return;
        }

        let entities: Vec<E> = self.pool_mut::<C>(index).as_set().iter().collect();
        for entity in entities {
            self.before_remove(index, entity);
            self.pool_mut::<C>(index).erase(entity);
        }
    }

    /// Fills the tombstones left in the storage of `C`.
    pub fn compact<C: Component>(&mut self) {
        let index = self.assure::<C>();
        self.pool_mut::<C>(index).compact();
    }

    /// Whether `entity` has every component in `X`.
    pub fn all_of<X: Types<E>>(&self, entity: E) -> bool {
        X::type_ids().as_ref().iter().all(|id| self.has_type(id, entity))
    }

    /// Whether `entity` has any component in `X`.
    pub fn any_of<X: Types<E>>(&self, entity: E) -> bool {
        X::type_ids().as_ref().iter().any(|id| self.has_type(id, entity))
    }

    fn has_type(&self, id: &TypeId, entity: E) -> bool {
        self.types.get(id).map_or(false, |&index| self.has_at(index, entity))
    }

    fn has_at(&self, index: usize, entity: E) -> bool {
        self.pool_at(index).map_or(false, |pool| pool.storage().as_set().contains(entity))
    }

    /// Returns the component of `entity`.
    ///
    /// # Panics
    /// Panics if `entity` has no `C`.
    pub fn get<C: Component>(&self, entity: E) -> &C {
        match self.storage::<C>() {
            Some(storage) => storage.get(entity),
            None => panic!("Entity {:?} has no {}", entity, any::type_name::<C>()),
        }
    }

    /// Returns the component of `entity` mutably without publishing update.
    ///
    /// # Panics
    /// Panics if `entity` has no `C`.
    pub fn get_mut<C: Component>(&mut self, entity: E) -> &mut C {
        let index = self.assure::<C>();
        self.pool_mut::<C>(index).get_mut(entity)
    }

    /// Returns the component of `entity` if it has one.
    pub fn try_get<C: Component>(&self, entity: E) -> Option<&C> {
        self.storage::<C>()?.try_get(entity)
    }

    /// Returns the component of `entity` mutably if it has one.
    pub fn try_get_mut<C: Component>(&mut self, entity: E) -> Option<&mut C> {
        let index = self.index_of::<C>()?;
        let pool = self.pools.get_mut(index)?.as_deref_mut()?;
        downcast_mut::<C, E>(pool).try_get_mut(entity)
    }

    // Storages

    /// The storage of `C`, if any component of type `C` was ever used with this registry.
    pub fn storage<C: Component>(&self) -> Option<&Sighed<C, E>> {
        self.pool_at(self.index_of::<C>()?).map(downcast)
    }

    /// The storage of `C`, created if necessary.
    ///
    /// # Panics
    /// Panics if a group observes `C`,
    /// because changes through the storage bypass group maintenance.
    pub fn storage_mut<C: Component>(&mut self) -> &mut Sighed<C, E> {
        let index = self.assure::<C>();
        assert!(
            !self.involved_at(index),
            "Cannot mutably borrow storage of {} observed by a group",
            any::type_name::<C>()
        );
        self.pool_mut(index)
    }

    /// Listeners invoked after a `C` is assigned.
    pub fn on_construct<C: Component>(&mut self) -> Sink<'_, Storage<C, E>, E> {
        let index = self.assure::<C>();
        self.pool_mut::<C>(index).on_construct()
    }

    /// Listeners invoked after a `C` is patched or replaced.
    pub fn on_update<C: Component>(&mut self) -> Sink<'_, Storage<C, E>, E> {
        let index = self.assure::<C>();
        self.pool_mut::<C>(index).on_update()
    }

    /// Listeners invoked before a `C` is removed.
    pub fn on_destroy<C: Component>(&mut self) -> Sink<'_, Storage<C, E>, E> {
        let index = self.assure::<C>();
        self.pool_mut::<C>(index).on_destroy()
    }

    // Views

    /// A view over the entities with every component in `Q`.
    pub fn view<Q: Query<E>>(&mut self) -> View<'_, Q, E> { self.view_excluding::<Q, ()>() }

    /// A view over the entities with every component in `Q` and no component in `X`.
    ///
    /// # Panics
    /// Panics if `Q` is empty or a component type is mentioned twice.
    pub fn view_excluding<Q: Query<E>, X: Types<E>>(&mut self) -> View<'_, Q, E> {
        assert!(Q::LEN > 0, "A view requires at least one component type");
        let required = Q::assure(self);
        let excluded = X::assure(self);
        view::assert_disjoint(required.as_ref().iter().chain(excluded.as_ref()), "view");

        let mut pools = Pools::new(&mut self.pools);
        let storages = Q::acquire(&mut pools, &required);
        let mut sets: Excluded<'_, E> = [None; view::MAX_ARITY];
        for (slot, &index) in sets.iter_mut().zip(excluded.as_ref()) {
            *slot = Some(pools.take_set(index));
        }
        View::new(storages, sets)
    }

    /// A view over the storage of `C` alone.
    pub fn view_single<C: Component>(&mut self) -> SingleView<'_, C, E> {
        let index = self.assure::<C>();
        SingleView::new(self.pool_mut::<C>(index).storage_mut())
    }

    // Groups

    /// A group owning `O`, observing `G` and excluding `X`.
    ///
    /// The group is created and populated on first request;
    /// later requests with the same types return the same group.
    ///
    /// # Panics
    /// Panics if the group mentions no owned or observed type, mentions a type twice,
    /// owns a type with in-place deletion,
    /// or conflicts with an existing group sharing its owned types.
    pub fn group<O: Query<E>, G: Query<E>, X: Types<E>>(&mut self) -> Group<'_, O, G, E> {
        let owned_indices = O::assure(self);
        let get_indices = G::assure(self);
        let exclude = X::assure(self).as_ref().to_vec();
        let owned = owned_indices.as_ref().to_vec();
        let get = get_indices.as_ref().to_vec();

        assert!(
            !owned.is_empty() || !get.is_empty(),
            "A group requires at least one owned or observed component type"
        );
        view::assert_disjoint(owned.iter().chain(&get).chain(&exclude), "group");

        let position = self.groups.iter().position(|group| group.same_as(&owned, &get, &exclude));
        let position = match position {
            Some(position) => position,
            None => self.create_group(GroupData::new(owned, get, exclude)),
        };
        let sortable = self.sortable(position);

        let mut pools = Pools::new(&mut self.pools);
        let owned = O::acquire(&mut pools, &owned_indices);
        let get = G::acquire(&mut pools, &get_indices);
        Group::new(owned, get, self.groups[position].handler_mut(), sortable)
    }

    fn create_group(&mut self, data: GroupData<E>) -> usize {
        for &index in data.owned() {
            let storage = self.pool_at(index).expect("group pools are assured").storage();
            assert!(
                storage.as_set().policy() == DeletionPolicy::SwapAndPop,
                "Cannot own {} in a group because it uses in-place deletion",
                storage.type_name()
            );
        }

        for other in &self.groups {
            let overlaps = other.owned().iter().any(|&index| data.owns(index));
            assert!(
                !overlaps || data.nests_in(other) || other.nests_in(&data),
                "Conflicting groups: {} and {}",
                data.describe(&self.pools),
                other.describe(&self.pools)
            );
        }

        let position = self
            .groups
            .iter()
            .position(|group| group.size() > data.size())
            .unwrap_or(self.groups.len());
        self.groups.insert(position, data);

        let group = &mut self.groups[position];
        group.populate(&mut self.pools);
        log::debug!("Created group {} with {} entities", group.describe(&self.pools), group.len());

        position
    }

    fn sortable(&self, position: usize) -> bool {
        let group = &self.groups[position];
        !group.is_owning()
            || self.groups.iter().enumerate().all(|(other_position, other)| {
                other_position == position || !other.is_owning() || !group.nests_in(other)
            })
    }

    /// Whether a group owns `C`.
    pub fn owned<C: Component>(&self) -> bool {
        self.index_of::<C>().map_or(false, |index| self.owned_at(index))
    }

    // Sorting

    /// Sorts the storage of `C` so that iteration visits its components in ascending order of `compare`.
    ///
    /// # Panics
    /// Panics if a group owns `C`.
    pub fn sort<C: Component>(&mut self, compare: impl FnMut(&C, &C) -> Ordering) {
        let index = self.assure::<C>();
        assert!(!self.owned_at(index), "Cannot sort {} owned by a group", any::type_name::<C>());
        self.pool_mut::<C>(index).storage_mut().sort_by(compare);
    }

    /// Sorts the storage of `C` so that iteration visits its entities in ascending order of `compare`.
    ///
    /// # Panics
    /// Panics if a group owns `C`.
    pub fn sort_by_entity<C: Component>(&mut self, compare: impl FnMut(E, E) -> Ordering) {
        let index = self.assure::<C>();
        assert!(!self.owned_at(index), "Cannot sort {} owned by a group", any::type_name::<C>());
        self.pool_mut::<C>(index).storage_mut().sort_by_entity(compare);
    }

    /// Sorts the storage of `To` so that entities shared with `From` follow its iteration order.
    ///
    /// # Panics
    /// Panics if a group owns `To` or `To` and `From` are the same type.
    pub fn sort_as<To: Component, From: Component>(&mut self) {
        let to = self.assure::<To>();
        let from = self.assure::<From>();
        assert!(!self.owned_at(to), "Cannot sort {} owned by a group", any::type_name::<To>());
        assert_ne!(to, from, "Cannot sort {} by itself", any::type_name::<To>());

        let mut pools = Pools::new(&mut self.pools);
        let target = pools.take::<To>(to);
        let source = pools.take_set(from);
        target.respect(source);
    }
}
