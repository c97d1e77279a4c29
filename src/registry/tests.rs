use std::any::TypeId;
use std::cell::RefCell;
use std::rc::Rc;

use itertools::Itertools;
use rand::{Rng, SeedableRng};

use super::{type_index, Registry};
use crate::entity::{Entity, Entity64, Raw};
use crate::test_util::{self, Counted, Health, Position, Stable, Tag, Velocity};

#[test]
fn test_type_index_is_stable() {
    test_util::init();

    let position = type_index::<Position>();
    let velocity = type_index::<Velocity>();
    assert_ne!(position, velocity);
    assert_eq!(type_index::<Position>(), position);

    let handle = std::thread::spawn(type_index::<Velocity>);
    assert_eq!(handle.join().expect("thread does not panic"), velocity);
}

#[test]
fn test_type_indices_cached_per_registry() {
    test_util::init();

    let mut first = Registry::new();
    let mut second = Registry::new();
    let entity = first.create();
    first.emplace(entity, Health(1));

    let stranger = second.create();
    assert!(second.storage::<Health>().is_none());
    assert!(second.try_get_mut::<Health>(stranger).is_none());
    assert!(!second.any_of::<(Health,)>(stranger));
    assert!(second.all_of::<()>(stranger));
    assert!(!second.owned::<Health>());
    assert!(second.types.is_empty());
    assert!(format!("{:?}", second).contains("pools: 0"));

    second.emplace(stranger, Health(2));
    second.emplace(stranger, Velocity(0, 0));
    assert_eq!(second.types.len(), 2);
    assert_eq!(second.types[&TypeId::of::<Health>()], first.types[&TypeId::of::<Health>()]);
    assert_eq!(second.types[&TypeId::of::<Health>()], type_index::<Health>());
    assert_eq!(second.types[&TypeId::of::<Velocity>()], type_index::<Velocity>());

    assert_eq!(first.get::<Health>(entity), &Health(1));
    assert_eq!(second.get::<Health>(stranger), &Health(2));
    assert_eq!(second.view::<(&Health, &Velocity)>().iter().collect_vec(), [stranger]);
}

#[test]
fn test_entity_lifecycle() {
    test_util::init();

    let mut registry = Registry::new();
    let entities = registry.create_many(3);
    assert_eq!(entities.iter().map(|e| e.to_index()).collect_vec(), [0, 1, 2]);
    assert_eq!(registry.alive(), 3);

    assert_eq!(registry.destroy(entities[1]), 1);
    assert!(!registry.valid(entities[1]));
    assert_eq!(registry.current(entities[1]), Some(1));
    assert_eq!(registry.alive(), 2);

    let recycled = registry.create();
    assert_eq!(recycled, Entity::construct(1, 1));
    assert!(registry.valid(recycled));
    assert_eq!(registry.entities().count(), 3);

    let hinted = registry.create_at(Entity::construct(7, 3));
    assert_eq!(hinted, Entity::construct(7, 3));
    assert_eq!(registry.create().to_index(), 6);
}

#[test]
fn test_component_lifecycle() {
    test_util::init();

    let mut registry = Registry::new();
    let entity = registry.create();
    assert!(registry.orphan(entity));
    assert_eq!(registry.try_get::<Position>(entity), None);

    registry.emplace(entity, Position(1, 2));
    registry.emplace(entity, Tag);
    assert!(!registry.orphan(entity));
    assert!(registry.all_of::<(Position, Tag)>(entity));
    assert!(!registry.all_of::<(Position, Velocity)>(entity));
    assert!(registry.any_of::<(Velocity, Tag)>(entity));
    assert!(!registry.any_of::<(Velocity, Health)>(entity));

    registry.patch::<Position>(entity, |pos| pos.0 = 5);
    assert_eq!(registry.get::<Position>(entity), &Position(5, 2));
    assert_eq!(registry.replace(entity, Position(0, 0)), Position(5, 2));
    registry.emplace_or_replace(entity, Position(3, 3));
    assert_eq!(registry.get::<Position>(entity), &Position(3, 3));

    registry.get_mut::<Position>(entity).1 = 4;
    assert_eq!(registry.try_get_mut::<Position>(entity), Some(&mut Position(3, 4)));

    assert!(registry.remove::<Position>(entity));
    assert!(!registry.remove::<Position>(entity));
    registry.erase::<Tag>(entity);
    assert!(registry.orphan(entity));
}

#[test]
#[should_panic = "has no"]
fn test_erase_missing_panics() {
    let mut registry = Registry::new();
    let entity = registry.create();
    registry.erase::<Position>(entity);
}

#[test]
fn test_destroy_removes_components() {
    test_util::init();

    let counter = Rc::new(std::cell::Cell::new(0));
    let mut registry = Registry::new();
    let entities = registry.create_many(4);
    for (i, &entity) in entities.iter().enumerate() {
        registry.emplace(entity, Counted::new(i as i32, &counter));
        registry.emplace(entity, Position(i as i32, 0));
    }

    let destroyed = Rc::new(RefCell::new(Vec::new()));
    {
        let destroyed = Rc::clone(&destroyed);
        registry.on_destroy::<Position>().connect(move |storage, entity| {
            destroyed.borrow_mut().push((entity, *storage.get(entity)));
        });
    }

    registry.destroy(entities[2]);
    assert_eq!(counter.get(), 1);
    assert_eq!(*destroyed.borrow(), [(entities[2], Position(2, 0))]);
    assert!(registry.try_get::<Position>(entities[2]).is_none());
    assert_eq!(registry.storage::<Position>().map(|storage| storage.len()), Some(3));

    registry.clear_components::<Counted>();
    assert_eq!(counter.get(), 4);
    assert!(registry.valid(entities[0]));

    registry.clear();
    assert_eq!(registry.alive(), 0);
    assert_eq!(destroyed.borrow().len(), 4);
}

#[test]
fn test_signals_through_registry() {
    test_util::init();

    let log = Rc::new(RefCell::new(Vec::new()));
    let mut registry = Registry::new();
    {
        let log = Rc::clone(&log);
        registry.on_construct::<Health>().connect(move |_, entity| log.borrow_mut().push(("construct", entity)));
    }
    {
        let log = Rc::clone(&log);
        registry.on_update::<Health>().connect(move |_, entity| log.borrow_mut().push(("update", entity)));
    }

    let entity = registry.create();
    registry.emplace(entity, Health(10));
    registry.patch::<Health>(entity, |health| health.0 -= 1);
    registry.get_mut::<Health>(entity).0 -= 1;
    registry.emplace_or_replace(entity, Health(3));

    assert_eq!(*log.borrow(), [("construct", entity), ("update", entity), ("update", entity)]);
}

#[test]
fn test_view_scenario() {
    test_util::init();

    let mut registry = Registry::new();
    for entity in registry.create_many(100) {
        let index = entity.to_index() as i32;
        if index % 2 == 0 {
            registry.emplace(entity, Position(index, 0));
        }
        if index % 3 == 0 {
            registry.emplace(entity, Velocity(index, 0));
        }
    }

    let mut view = registry.view::<(&Position, &Velocity)>();
    assert_eq!(view.size_hint(), 34);

    let found = view.iter().map(|entity| entity.to_index()).sorted().collect_vec();
    assert_eq!(found.len(), 17);
    assert_eq!(found, (0..100).step_by(6).collect_vec());

    let mut visited = 0;
    view.each(|entity, (position, velocity)| {
        assert_eq!(position.0 as usize, entity.to_index());
        assert_eq!(velocity.0, position.0);
        visited += 1;
    });
    assert_eq!(visited, 17);
}

#[test]
fn test_view_correct_regardless_of_driver() {
    test_util::init();

    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    let mut registry = Registry::new();
    let mut expected = Vec::new();

    for entity in registry.create_many(300) {
        let (x, y, z) = (rng.gen_bool(0.6), rng.gen_bool(0.3), rng.gen_bool(0.2));
        if x {
            registry.emplace(entity, Position(0, 0));
        }
        if y {
            registry.emplace(entity, Velocity(0, 0));
        }
        if z {
            registry.emplace(entity, Health(0));
        }
        if x && y && !z {
            expected.push(entity);
        }
    }

    let entities = registry.entities().collect_vec();

    let by_position = registry.view_excluding::<(&Position, &Velocity), (Health,)>().use_driver::<Position>();
    for &entity in &entities {
        assert_eq!(by_position.contains(entity), expected.contains(&entity));
    }
    assert_eq!(by_position.iter().sorted().collect_vec(), expected);

    let by_velocity = registry.view_excluding::<(&Position, &Velocity), (Health,)>().use_driver::<Velocity>();
    for &entity in &entities {
        assert_eq!(by_velocity.contains(entity), expected.contains(&entity));
    }
    assert_eq!(by_velocity.iter().sorted().collect_vec(), expected);
}

#[test]
fn test_sort_and_sort_as() {
    test_util::init();

    let mut registry = Registry::new();
    let entities = registry.create_many(5);
    for (&entity, x) in entities.iter().zip([3, 0, 4, 1, 2]) {
        registry.emplace(entity, Position(x, 0));
        registry.emplace(entity, Velocity(x, 0));
    }

    registry.sort::<Position>(|lhs, rhs| lhs.0.cmp(&rhs.0));
    registry.sort_as::<Velocity, Position>();

    let positions = registry.view_single::<Position>().iter().collect_vec();
    let velocities = registry.view_single::<Velocity>().iter().collect_vec();
    assert_eq!(positions, velocities);
    assert_eq!(
        positions.iter().map(|&entity| registry.get::<Position>(entity).0).collect_vec(),
        [0, 1, 2, 3, 4]
    );

    registry.sort_by_entity::<Velocity>(|lhs, rhs| rhs.cmp(&lhs));
    let velocities = registry.view_single::<Velocity>().iter().collect_vec();
    assert_eq!(velocities, entities.iter().rev().copied().collect_vec());
}

#[test]
fn test_in_place_component_through_registry() {
    test_util::init();

    let mut registry = Registry::new();
    let entities = registry.create_many(3);
    for &entity in &entities {
        registry.emplace(entity, Stable(entity.to_index().to_string()));
    }

    registry.destroy(entities[0]);
    assert_eq!(registry.storage::<Stable>().map(|storage| storage.len()), Some(3));

    registry.compact::<Stable>();
    assert_eq!(registry.storage::<Stable>().map(|storage| storage.len()), Some(2));
    assert_eq!(registry.get::<Stable>(entities[2]), &Stable("2".into()));
}

#[test]
fn test_wide_identifiers() {
    test_util::init();

    let mut registry = Registry::<Entity64>::default();
    let entity = registry.create();
    registry.emplace(entity, Position(1, 1));

    assert_eq!(registry.destroy(entity), 1);
    let recycled = registry.create();
    assert_eq!(recycled, Entity64::construct(0, 1));
    assert!(registry.try_get::<Position>(recycled).is_none());
}

#[test]
fn test_storage_access() {
    test_util::init();

    let mut registry = Registry::new();
    assert!(registry.storage::<Health>().is_none());

    let entity = registry.create();
    registry.storage_mut::<Health>().emplace(entity, Health(1));
    assert_eq!(registry.storage::<Health>().map(|storage| storage.len()), Some(1));
    assert_eq!(registry.get::<Health>(entity), &Health(1));
}
