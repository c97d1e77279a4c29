//! Groups keep the entities matching a predicate together so they can be iterated without checks.
//!
//! A group *owns* some component types, *observes* others and *excludes* the rest.
//! An entity qualifies when it has every owned and observed component and no excluded one.
//!
//! An owning group rearranges the storages of its owned components
//! so that the qualifying entities occupy the same leading positions of every owned storage.
//! A group without owned types keeps a separate sparse set of the qualifying entities instead.
//!
//! Groups are maintained by the [`Registry`](crate::Registry) on every insertion and removal.
//! Groups sharing owned types must nest:
//! each role of the less restrictive group is a subset of the same role of the other.

use std::any;
use std::cmp::Ordering;

use itertools::Itertools;

use crate::algorithm::StdSort;
use crate::comp::Component;
use crate::entity::{Entity, Raw};
use crate::registry::Pool;
use crate::sparse_set::{DeletionPolicy, SortPlan, SparseSet};
use crate::storage::{AnyStorage, Storage};
use crate::view::Query;


/// How a group tracks its qualifying entities.
pub(crate) enum Handler<E: Raw> {
    /// The qualifying entities occupy positions `..len` of every owned storage.
    Owning { len: usize },
    /// The qualifying entities are kept in a separate set.
    NonOwning { set: SparseSet<E> },
}

/// Registry-side bookkeeping of a group.
pub(crate) struct GroupData<E: Raw> {
    /// Type indices in declaration order; the first owned type leads.
    owned:   Vec<usize>,
    get:     Vec<usize>,
    exclude: Vec<usize>,
    handler: Handler<E>,
}

fn pool_storage<E: Raw>(pools: &[Pool<E>], index: usize) -> &dyn AnyStorage<E> {
    pools[index].as_ref().expect("group pools are assured on creation").storage()
}

fn pool_storage_mut<E: Raw>(pools: &mut [Pool<E>], index: usize) -> &mut dyn AnyStorage<E> {
    pools[index].as_mut().expect("group pools are assured on creation").storage_mut()
}

fn subset(sub: &[usize], sup: &[usize]) -> bool { sub.iter().all(|index| sup.contains(index)) }

impl<E: Raw> GroupData<E> {
    pub(crate) fn new(owned: Vec<usize>, get: Vec<usize>, exclude: Vec<usize>) -> Self {
        let handler = if owned.is_empty() {
            Handler::NonOwning { set: SparseSet::new(DeletionPolicy::SwapAndPop) }
        } else {
            Handler::Owning { len: 0 }
        };
        Self { owned, get, exclude, handler }
    }

    pub(crate) fn handler_mut(&mut self) -> &mut Handler<E> { &mut self.handler }

    pub(crate) fn is_owning(&self) -> bool { !self.owned.is_empty() }

    pub(crate) fn owned(&self) -> &[usize] { &self.owned }

    /// The number of types the group mentions.
    pub(crate) fn size(&self) -> usize { self.owned.len() + self.get.len() + self.exclude.len() }

    pub(crate) fn owns(&self, index: usize) -> bool { self.owned.contains(&index) }

    /// Whether `index` is owned or observed.
    pub(crate) fn requires(&self, index: usize) -> bool { self.owns(index) || self.get.contains(&index) }

    pub(crate) fn excludes(&self, index: usize) -> bool { self.exclude.contains(&index) }

    pub(crate) fn involves(&self, index: usize) -> bool { self.requires(index) || self.excludes(index) }

    /// Whether the group describes the same roles, regardless of declaration order.
    pub(crate) fn same_as(&self, owned: &[usize], get: &[usize], exclude: &[usize]) -> bool {
        self.owned.len() == owned.len()
            && self.get.len() == get.len()
            && self.exclude.len() == exclude.len()
            && subset(owned, &self.owned)
            && subset(get, &self.get)
            && subset(exclude, &self.exclude)
    }

    /// Whether every role of `self` is contained in the same role of `other`.
    pub(crate) fn nests_in(&self, other: &Self) -> bool {
        subset(&self.owned, &other.owned)
            && subset(&self.get, &other.get)
            && subset(&self.exclude, &other.exclude)
    }

    /// Formats the roles with component type names.
    pub(crate) fn describe(&self, pools: &[Pool<E>]) -> String {
        let names = |indices: &[usize]| {
            indices.iter().map(|&index| pool_storage(pools, index).type_name()).join(", ")
        };
        format!(
            "owned [{}], observed [{}], excluded [{}]",
            names(&self.owned),
            names(&self.get),
            names(&self.exclude)
        )
    }

    pub(crate) fn len(&self) -> usize {
        match &self.handler {
            Handler::Owning { len } => *len,
            Handler::NonOwning { set } => set.len(),
        }
    }

    fn contains(&self, pools: &[Pool<E>], entity: E) -> bool {
        match &self.handler {
            Handler::Owning { len } => pool_storage(pools, self.owned[0])
                .as_set()
                .find(entity)
                .map_or(false, |pos| pos < *len),
            Handler::NonOwning { set } => set.contains(entity),
        }
    }

    /// Evaluates the predicate, treating the pool of `trigger` as if it lacked `entity`.
    fn qualifies(&self, pools: &[Pool<E>], entity: E, trigger: Option<usize>) -> bool {
        self.owned.iter().chain(&self.get).all(|&index| pool_storage(pools, index).as_set().contains(entity))
            && self.exclude.iter().all(|&index| {
                Some(index) == trigger || !pool_storage(pools, index).as_set().contains(entity)
            })
    }

    /// Admits `entity` if it newly qualifies.
    pub(crate) fn maybe_valid_if(&mut self, pools: &mut [Pool<E>], entity: E, trigger: Option<usize>) {
        if self.contains(pools, entity) || !self.qualifies(pools, entity, trigger) {
            return;
        }

        match &mut self.handler {
            Handler::Owning { len } => {
                for &index in &self.owned {
                    let storage = pool_storage_mut(pools, index);
                    let other = storage.as_set().data()[*len];
                    if other != entity {
                        storage.swap_elements(other, entity);
                    }
                }
                *len += 1;
            }
            Handler::NonOwning { set } => {
                set.emplace(entity);
            }
        }
    }

    /// Evicts `entity` if it is in the group.
    pub(crate) fn discard_if(&mut self, pools: &mut [Pool<E>], entity: E) {
        if !self.contains(pools, entity) {
            return;
        }

        match &mut self.handler {
            Handler::Owning { len } => {
                let last = *len - 1;
                for &index in &self.owned {
                    let storage = pool_storage_mut(pools, index);
                    let other = storage.as_set().data()[last];
                    if other != entity {
                        storage.swap_elements(other, entity);
                    }
                }
                *len = last;
            }
            Handler::NonOwning { set } => set.erase(entity),
        }
    }

    /// Admits every qualifying entity already present in the pools.
    pub(crate) fn populate(&mut self, pools: &mut [Pool<E>]) {
        if self.is_owning() {
            let lead = self.owned[0];
            let mut pos = 0;
            // entities moved forward by an admission were already visited
            while pos < pool_storage(pools, lead).as_set().len() {
                let entity = pool_storage(pools, lead).as_set().data()[pos];
                self.maybe_valid_if(pools, entity, None);
                pos += 1;
            }
        } else {
            let driver = self
                .get
                .iter()
                .copied()
                .min_by_key(|&index| pool_storage(pools, index).as_set().len())
                .expect("groups require at least one component type");
            let candidates: Vec<E> = pool_storage(pools, driver).as_set().iter().collect();
            for entity in candidates {
                self.maybe_valid_if(pools, entity, None);
            }
        }
    }
}

/// A borrowed group, iterating over its owned components `O` and observed components `G`.
pub struct Group<'r, O: Query<E>, G: Query<E>, E: Raw = Entity> {
    owned:    O::Storages<'r>,
    get:      G::Storages<'r>,
    handler:  &'r mut Handler<E>,
    sortable: bool,
}

impl<'r, O: Query<E>, G: Query<E>, E: Raw> Group<'r, O, G, E> {
    pub(crate) fn new(
        owned: O::Storages<'r>,
        get: G::Storages<'r>,
        handler: &'r mut Handler<E>,
        sortable: bool,
    ) -> Self {
        Self { owned, get, handler, sortable }
    }

    fn lead(&self) -> &SparseSet<E> { O::storage(&self.owned, 0).as_set() }

    /// The number of entities in the group.
    pub fn len(&self) -> usize {
        match &*self.handler {
            Handler::Owning { len } => *len,
            Handler::NonOwning { set } => set.len(),
        }
    }

    /// Whether the group has no entities.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Whether `entity` is in the group.
    pub fn contains(&self, entity: E) -> bool { self.find(entity).is_some() }

    /// The position of `entity` in the group.
    ///
    /// For an owning group, this is also its packed position in every owned storage.
    pub fn find(&self, entity: E) -> Option<usize> {
        match &*self.handler {
            Handler::Owning { len } => self.lead().find(entity).filter(|&pos| pos < *len),
            Handler::NonOwning { set } => set.find(entity),
        }
    }

    /// Iterates over the entities of the group.
    #[auto_enums::auto_enum(Iterator)]
    pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
        match &*self.handler {
            Handler::Owning { len } => self.lead().data()[..*len].iter().rev().copied(),
            Handler::NonOwning { set } => set.iter(),
        }
    }

    /// Fetches the components of `entity`.
    ///
    /// # Panics
    /// Panics if `entity` is not in the group.
    pub fn get(&mut self, entity: E) -> (O::Items<'_>, G::Items<'_>) {
        assert!(self.contains(entity), "Entity {:?} is not in the group", entity);
        (O::fetch(&mut self.owned, entity), G::fetch(&mut self.get, entity))
    }

    /// Calls `f` with every entity of the group and its owned and observed components.
    ///
    /// Owned components are read by position without lookup.
    pub fn each(&mut self, mut f: impl FnMut(E, O::Items<'_>, G::Items<'_>)) {
        match &*self.handler {
            Handler::Owning { len } => {
                for pos in (0..*len).rev() {
                    let entity = O::storage(&self.owned, 0).as_set().data()[pos];
                    f(entity, O::fetch_at(&mut self.owned, pos), G::fetch(&mut self.get, entity));
                }
            }
            Handler::NonOwning { set } => {
                for &entity in set.data().iter().rev() {
                    f(entity, O::fetch(&mut self.owned, entity), G::fetch(&mut self.get, entity));
                }
            }
        }
    }

    /// Whether the group can be sorted.
    ///
    /// An owning group can only be sorted if no more restrictive group shares its owned types.
    pub fn sortable(&self) -> bool { self.sortable }

    /// Sorts the group so that iteration visits entities in ascending order of `compare`.
    ///
    /// # Panics
    /// Panics if the group is not [sortable](Self::sortable).
    pub fn sort_by_entity(&mut self, compare: impl FnMut(E, E) -> Ordering) {
        assert!(self.sortable, "Cannot sort a group nested in a more restrictive group");

        let plan = match &*self.handler {
            Handler::Owning { len } => self.lead().sort_plan(*len, StdSort, compare),
            Handler::NonOwning { set } => set.sort_plan(set.len(), StdSort, compare),
        };
        self.apply(plan);
    }

    /// Sorts the group so that iteration visits components of type `C` in ascending order of `compare`.
    ///
    /// # Panics
    /// Panics if the group is not [sortable](Self::sortable)
    /// or `C` is neither owned nor observed by the group.
    pub fn sort_by<C: Component>(&mut self, mut compare: impl FnMut(&C, &C) -> Ordering) {
        assert!(self.sortable, "Cannot sort a group nested in a more restrictive group");

        let storage = self.storage_of::<C>();
        let by_value = |lhs: E, rhs: E| compare(storage.get(lhs), storage.get(rhs));
        let plan = match &*self.handler {
            Handler::Owning { len } => self.lead().sort_plan(*len, StdSort, by_value),
            Handler::NonOwning { set } => set.sort_plan(set.len(), StdSort, by_value),
        };
        self.apply(plan);
    }

    fn storage_of<C: Component>(&self) -> &Storage<C, E> {
        let owned = (0..O::LEN).map(|i| O::storage(&self.owned, i));
        let get = (0..G::LEN).map(|i| G::storage(&self.get, i));
        owned
            .chain(get)
            .find_map(|storage| storage.as_any().downcast_ref::<Storage<C, E>>())
            .unwrap_or_else(|| {
                panic!("Component type {} is not part of the group", any::type_name::<C>())
            })
    }

    fn apply(&mut self, plan: SortPlan<E>) {
        match &mut *self.handler {
            Handler::Owning { .. } => {
                for i in 0..O::LEN {
                    O::storage_mut(&mut self.owned, i).sort_prefix(plan.order());
                }
            }
            Handler::NonOwning { set } => set.apply_sort(plan, &mut ()),
        }
    }
}
