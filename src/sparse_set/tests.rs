use std::panic::{self, AssertUnwindSafe};

use rand::{Rng, SeedableRng};

use super::{DeletionPolicy, Hooks, SparseSet};
use crate::algorithm::InsertionSort;
use crate::entity::{Entity, Raw};
use crate::test_util;

fn entity(index: usize) -> Entity { Entity::construct(index, 0) }

/// Keeps a copy of each entity at its packed position, moved around through the hooks.
#[derive(Default)]
struct Mirror {
    slots:  Vec<Option<Entity>>,
    events: Vec<String>,
}

impl Mirror {
    fn emplace(&mut self, set: &mut SparseSet<Entity>, entity: Entity) {
        let pos = set.emplace(entity);
        if pos == self.slots.len() {
            self.slots.push(Some(entity));
        } else {
            assert_eq!(self.slots[pos], None, "emplace must reuse a tombstone");
            self.slots[pos] = Some(entity);
        }
    }

    fn check(&mut self, set: &SparseSet<Entity>) {
        self.slots.truncate(set.len());
        assert_eq!(self.slots.len(), set.len());
        for pos in 0..set.len() {
            assert_eq!(self.slots[pos], set.at(pos), "payload mismatch at {}", pos);
        }
    }
}

impl Hooks<Entity> for Mirror {
    fn about_to_pop(&mut self, pos: usize, entity: Entity) {
        assert_eq!(self.slots[pos], Some(entity));
        self.events.push(format!("about_to_pop({}, {})", pos, entity));
    }

    fn swap_at(&mut self, lhs: usize, rhs: usize) { self.slots.swap(lhs, rhs); }

    fn move_and_pop(&mut self, from: usize, to: usize) {
        assert_eq!(self.slots[to], None, "move_and_pop must target a hole");
        self.slots[to] = self.slots[from].take();
        self.events.push(format!("move_and_pop({}, {})", from, to));
    }

    fn swap_and_pop(&mut self, pos: usize, last: usize) {
        assert_eq!(last + 1, self.slots.len());
        self.slots.swap_remove(pos);
        self.events.push(format!("swap_and_pop({}, {})", pos, last));
    }

    fn in_place_pop(&mut self, pos: usize) {
        self.slots[pos] = None;
        self.events.push(format!("in_place_pop({})", pos));
    }
}

macro_rules! test_both_policies {
    ($($test:ident)*) => {
        $(
            paste::paste! {
                #[test]
                fn [<$test _swap_and_pop>]() {
                    test_util::init();
                    $test(DeletionPolicy::SwapAndPop);
                }

                #[test]
                fn [<$test _in_place>]() {
                    test_util::init();
                    $test(DeletionPolicy::InPlace);
                }
            }
        )*
    };
}

test_both_policies! {
    check_emplace_contains_index
    check_version_mismatch
    check_remove_idempotent
    check_sort_iterates_ascending
    check_sort_n_prefix
    check_sort_panic_leaves_set
    check_respect
    check_swap
    check_clear
    check_random_workload
    check_bump
}

fn check_emplace_contains_index(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    let entities: Vec<_> = [3, 0, 5000, 12].into_iter().map(entity).collect();

    for (i, &e) in entities.iter().enumerate() {
        assert_eq!(set.emplace(e), i);
    }

    assert_eq!(set.len(), 4);
    assert_eq!(set.extent(), 2 * super::SPARSE_PAGE);
    for (i, &e) in entities.iter().enumerate() {
        assert!(set.contains(e));
        assert_eq!(set.index(e), i);
        assert_eq!(set.find(e), Some(i));
        assert_eq!(set.at(i), Some(e));
        assert!(set.index(e) < set.len());
    }

    assert!(!set.contains(entity(1)));
    assert_eq!(set.find(entity(1)), None);
    assert_eq!(set.at(4), None);
    assert!(!set.contains(Entity::null()));
    assert!(!set.contains(Entity::tombstone()));
}

fn check_version_mismatch(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    set.emplace(Entity::construct(3, 0));

    let stale = Entity::construct(3, 1);
    assert!(!set.contains(stale));
    assert_eq!(set.find(stale), None);
    assert_eq!(set.current(stale), Some(0));
    assert_eq!(set.current(entity(4)), None);
    assert!(!set.remove(stale));
    assert_eq!(set.len(), 1);
}

fn check_remove_idempotent(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    set.emplace(entity(1));
    set.emplace(entity(2));

    assert!(set.remove(entity(1)));
    assert!(!set.remove(entity(1)));
    assert!(!set.contains(entity(1)));
    assert!(set.contains(entity(2)));

    assert_eq!(set.remove_many([entity(1), entity(2), entity(3)]), 1);
    assert_eq!(set.iter().count(), 0);
}

fn check_sort_iterates_ascending(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    let mut mirror = Mirror::default();
    for index in [5, 2, 9, 1, 7, 4] {
        mirror.emplace(&mut set, entity(index));
    }
    set.erase_with(entity(9), &mut mirror);

    set.sort_n_by_with(
        match policy {
            DeletionPolicy::SwapAndPop => set.len(),
            DeletionPolicy::InPlace => set.len() - 1,
        },
        InsertionSort,
        |lhs, rhs| lhs.to_index().cmp(&rhs.to_index()),
        &mut mirror,
    );
    mirror.check(&set);

    let order: Vec<_> = set.iter().map(Entity::to_index).collect();
    assert_eq!(order, [1, 2, 4, 5, 7]);
    for e in set.iter() {
        assert_eq!(set.at(set.index(e)), Some(e));
        assert_eq!(set.find(e).map(|pos| set.data()[pos]), Some(e));
    }
    assert_eq!(set.free_list(), None);
}

fn check_sort_n_prefix(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    for index in [2, 4, 3, 1, 0] {
        set.emplace(entity(index));
    }

    set.sort_n_by(3, crate::algorithm::StdSort, |lhs, rhs| lhs.to_index().cmp(&rhs.to_index()));

    // positions 3 and 4 are untouched; the prefix iterates ascending
    assert_eq!(set.data()[3..], [entity(1), entity(0)]);
    assert_eq!(set.data()[..3], [entity(4), entity(3), entity(2)]);
}

fn check_sort_panic_leaves_set(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    for index in [3, 1, 2] {
        set.emplace(entity(index));
    }
    let before = set.data().to_vec();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        set.sort_by(|_, _| panic!("comparator failure"));
    }));

    assert!(result.is_err());
    assert_eq!(set.data(), &before[..]);
    for (pos, &e) in before.iter().enumerate() {
        assert_eq!(set.index(e), pos);
    }
}

fn check_respect(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    let mut mirror = Mirror::default();
    for index in 1..=5 {
        mirror.emplace(&mut set, entity(index));
    }

    let mut other = SparseSet::new(DeletionPolicy::SwapAndPop);
    for index in [4, 9, 2, 5] {
        other.emplace(entity(index));
    }

    set.respect_with(&other, &mut mirror);
    mirror.check(&set);

    let order: Vec<_> = set.iter().map(Entity::to_index).collect();
    assert_eq!(order[..3], [5, 2, 4]);
    let mut rest = order[3..].to_vec();
    rest.sort_unstable();
    assert_eq!(rest, [1, 3]);
}

fn check_swap(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    let mut mirror = Mirror::default();
    for index in 0..3 {
        mirror.emplace(&mut set, entity(index));
    }

    set.swap_with(entity(0), entity(2), &mut mirror);
    mirror.check(&set);
    assert_eq!(set.index(entity(0)), 2);
    assert_eq!(set.index(entity(2)), 0);
    assert_eq!(set.data(), &[entity(2), entity(1), entity(0)]);
}

fn check_clear(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    let mut mirror = Mirror::default();
    for index in 0..4 {
        mirror.emplace(&mut set, entity(index));
    }
    set.erase_with(entity(1), &mut mirror);
    mirror.events.clear();

    set.clear_with(&mut mirror);
    assert!(set.is_empty());
    assert_eq!(set.free_list(), None);
    assert_eq!(mirror.events.iter().filter(|event| event.starts_with("in_place_pop")).count(), 3);
    assert!((0..4).all(|index| !set.contains(entity(index))));

    assert_eq!(set.emplace(entity(1)), 0);
}

fn check_bump(policy: DeletionPolicy) {
    let mut set = SparseSet::new(policy);
    set.emplace(Entity::construct(2, 0));

    assert_eq!(set.bump(Entity::construct(2, 3)), 3);
    assert!(set.contains(Entity::construct(2, 3)));
    assert!(!set.contains(Entity::construct(2, 0)));
    assert_eq!(set.data(), &[Entity::construct(2, 3)]);
}

fn check_random_workload(policy: DeletionPolicy) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let mut set = SparseSet::new(policy);
    let mut mirror = Mirror::default();
    let mut alive = vec![false; 256];

    for step in 0..4000 {
        let index = rng.gen_range(0..alive.len());
        match rng.gen_range(0..10) {
            0..=4 => {
                if !alive[index] {
                    mirror.emplace(&mut set, entity(index));
                    alive[index] = true;
                }
            }
            5..=7 => {
                assert_eq!(set.remove_with(entity(index), &mut mirror), alive[index]);
                alive[index] = false;
            }
            8 => {
                let other = rng.gen_range(0..alive.len());
                if alive[index] && alive[other] {
                    set.swap_with(entity(index), entity(other), &mut mirror);
                }
            }
            _ => {
                if step % 3 == 0 {
                    set.sort_n_by_with(
                        set.iter().count(),
                        crate::algorithm::StdSort,
                        |lhs, rhs| rhs.to_index().cmp(&lhs.to_index()),
                        &mut mirror,
                    );
                    let order: Vec<_> = set.iter().map(Entity::to_index).collect();
                    assert!(order.windows(2).all(|pair| pair[0] > pair[1]));
                } else {
                    set.compact_with(&mut mirror);
                    assert_eq!(set.len(), set.iter().count());
                }
            }
        }

        mirror.check(&set);
    }

    for (index, &expected) in alive.iter().enumerate() {
        assert_eq!(set.contains(entity(index)), expected);
    }
}

#[test]
fn test_erase_swap_and_pop() {
    test_util::init();

    let mut set = SparseSet::new(DeletionPolicy::SwapAndPop);
    let mut mirror = Mirror::default();
    for index in 0..100 {
        mirror.emplace(&mut set, entity(index));
    }

    let pos = set.index(entity(42));
    let last = *set.data().last().expect("set is not empty");

    set.erase_with(entity(42), &mut mirror);
    mirror.check(&set);

    assert_eq!(set.len(), 99);
    assert_eq!(set.find(entity(42)), None);
    assert_eq!(set.index(last), pos);
    assert_eq!(mirror.events, ["about_to_pop(42, 42v0)", "swap_and_pop(42, 99)"]);
}

#[test]
fn test_erase_in_place_and_compact() {
    test_util::init();

    let mut set = SparseSet::new(DeletionPolicy::InPlace);
    let mut mirror = Mirror::default();
    for index in 0..5 {
        mirror.emplace(&mut set, entity(index));
    }

    set.erase_with(entity(1), &mut mirror);
    set.erase_with(entity(3), &mut mirror);
    mirror.check(&set);

    assert_eq!(set.len(), 5);
    assert!(set.data()[1].is_tombstone());
    assert!(set.data()[3].is_tombstone());
    assert_eq!(set.free_list(), Some(3));
    assert_eq!(set.index(entity(4)), 4, "in-place erasure must not move other elements");

    mirror.events.clear();
    set.compact_with(&mut mirror);
    mirror.check(&set);

    assert_eq!(mirror.events, ["move_and_pop(4, 3)", "move_and_pop(3, 1)"]);
    assert_eq!(set.len(), 3);
    assert_eq!(set.free_list(), None);
    assert_eq!(set.data(), &[entity(0), entity(4), entity(2)]);
}

#[test]
fn test_in_place_reuses_tombstones_lifo() {
    test_util::init();

    let mut set = SparseSet::new(DeletionPolicy::InPlace);
    for index in 0..4 {
        set.emplace(entity(index));
    }
    set.erase(entity(1));
    set.erase(entity(3));

    assert_eq!(set.next_position(), 3);
    assert_eq!(set.emplace(entity(10)), 3);
    assert_eq!(set.emplace(entity(11)), 1);
    assert_eq!(set.emplace(entity(12)), 4);
    assert_eq!(set.free_list(), None);
}

#[test]
fn test_compact_trailing_tombstones() {
    test_util::init();

    let mut set = SparseSet::new(DeletionPolicy::InPlace);
    for index in 0..4 {
        set.emplace(entity(index));
    }
    set.erase(entity(2));
    set.erase(entity(3));
    set.compact();

    assert_eq!(set.data(), &[entity(0), entity(1)]);
}

#[test]
fn test_extend_appends_past_tombstones() {
    test_util::init();

    let mut set = SparseSet::new(DeletionPolicy::InPlace);
    set.extend([entity(0), entity(1)]);
    set.erase(entity(0));
    set.extend([entity(2)]);

    assert_eq!(set.index(entity(2)), 2);
    assert_eq!(set.free_list(), Some(0));
    assert_eq!(set.iter().collect::<Vec<_>>(), [entity(2), entity(1)]);
}

#[test]
fn test_iteration_survives_erasing_current() {
    test_util::init();

    let mut set = SparseSet::new(DeletionPolicy::SwapAndPop);
    for index in 0..10 {
        set.emplace(entity(index));
    }

    let mut visited = Vec::new();
    let mut pos = set.len();
    while pos > 0 {
        pos -= 1;
        let current = set.data()[pos];
        visited.push(current.to_index());
        if current.to_index() % 2 == 0 {
            set.erase(current);
        }
    }

    visited.sort_unstable();
    assert_eq!(visited, (0..10).collect::<Vec<_>>());
    assert_eq!(set.len(), 5);
}

#[test]
#[should_panic = "is not in the sparse set"]
fn test_erase_missing() {
    let mut set = SparseSet::<Entity>::default();
    set.erase(entity(3));
}

#[test]
#[should_panic = "is already in the sparse set"]
#[cfg(any(debug_assertions, feature = "release-assertions"))]
fn test_emplace_twice() {
    let mut set = SparseSet::<Entity>::default();
    set.emplace(entity(3));
    set.emplace(entity(3));
}

#[test]
fn test_try_reserve() {
    let mut set = SparseSet::<Entity>::default();
    set.try_reserve(16).expect("small reservation succeeds");
    assert!(set.capacity() >= 16);
    assert!(set.try_reserve(usize::MAX).is_err());
}
