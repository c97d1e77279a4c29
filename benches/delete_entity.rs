use criterion::*;
use sparsec::test_util::{Health, Position, Tag, Velocity};
use sparsec::Registry;
use xias::Xias;

fn delete_entity(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete entity");

    macro_rules! delete_entity_batch {
        ($num_comps:literal; $($comps:expr),* $(,)?) => {
            for log_entities in (0..=12).step_by(4) {
                let entities = 1 << log_entities;
                group.throughput(Throughput::Elements(entities));
                group.bench_with_input(BenchmarkId::new(format!("{} components", $num_comps), format!("{entities} entities")), &entities, |b, &entities| {
                    b.iter_batched(
                        || {
                            let mut registry = Registry::new();
                            let mut vec = Vec::with_capacity(entities.small_int());
                            for _ in 0..entities {
                                let entity = registry.create();
                                $(registry.emplace(entity, $comps);)*
                                vec.push(entity);
                            }
                            (registry, vec)
                        },
                        |(mut registry, vec)| {
                            for entity in vec {
                                registry.destroy(entity);
                            }
                            registry
                        },
                        BatchSize::SmallInput,
                    );
                });
            }
        }
    }

    delete_entity_batch!(0; );
    delete_entity_batch!(1; Position(1, 1));
    delete_entity_batch!(2; Position(1, 1), Velocity(2, 2));
    delete_entity_batch!(4; Position(1, 1), Velocity(2, 2), Health(3), Tag);
}

criterion_group!(benches, delete_entity);
criterion_main!(benches);
