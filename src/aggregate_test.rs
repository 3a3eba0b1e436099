use approx::assert_relative_eq;
use lin_alg::f64::Vec3;

use crate::aggregate::AggregateHolder;
use crate::quantity::{OrderEnum, QuantityId};
use crate::settings::{AggregateEnum, BodySettings};
use crate::storage::Storage;

fn particle_storage(positions: Vec<Vec3>) -> Storage {
    let mut storage = Storage::with_material(BodySettings::new());
    storage
        .insert(QuantityId::Position, OrderEnum::Second, positions)
        .unwrap();
    storage
        .insert_uniform(QuantityId::Mass, OrderEnum::Zero, 1.)
        .unwrap();
    storage
}

#[test]
fn test_singletons_on_construction() {
    let storage = particle_storage(vec![Vec3::new_zero(); 3]);
    let holder = AggregateHolder::new(&storage, AggregateEnum::Particles);
    assert_eq!(holder.count(), 3);
    for i in 0..3 {
        assert_eq!(holder.aggregate_id(i), i);
        assert_eq!(holder.aggregate_size(i), 1);
    }
}

#[test]
fn test_merge_preserves_lower_id_on_ties() {
    let storage = particle_storage(vec![Vec3::new_zero(); 3]);
    let holder = AggregateHolder::new(&storage, AggregateEnum::Particles);

    holder.merge(0, 1);
    holder.merge(0, 2);

    assert_eq!(holder.count(), 1);
    for p in 0..3 {
        assert_eq!(holder.aggregate_id(p), 0);
    }
}

#[test]
fn test_merge_larger_wins() {
    let storage = particle_storage(vec![Vec3::new_zero(); 4]);
    let holder = AggregateHolder::new(&storage, AggregateEnum::Particles);

    holder.merge(2, 3); // aggregate 2, size 2
    holder.merge(0, 2); // 2 is larger, its id survives
    assert_eq!(holder.aggregate_id(0), 2);
    assert_eq!(holder.aggregate_size(0), 3);
}

#[test]
fn test_merge_same_aggregate_is_noop() {
    let storage = particle_storage(vec![Vec3::new_zero(); 2]);
    let holder = AggregateHolder::new(&storage, AggregateEnum::Particles);
    holder.merge(0, 1);
    let count = holder.count();
    holder.merge(0, 1);
    assert_eq!(holder.count(), count);
    holder.merge(1, 1);
    assert_eq!(holder.count(), count);
}

#[test]
fn test_same_aggregate_is_equivalence_relation() {
    let storage = particle_storage(vec![Vec3::new_zero(); 5]);
    let holder = AggregateHolder::new(&storage, AggregateEnum::Particles);
    holder.merge(0, 1);
    holder.merge(3, 4);

    // reflexive
    for p in 0..5 {
        assert!(holder.same_aggregate(p, p));
    }
    // symmetric
    assert!(holder.same_aggregate(0, 1));
    assert!(holder.same_aggregate(1, 0));
    assert!(!holder.same_aggregate(1, 2));

    // transitive after another merge
    holder.merge(1, 3);
    assert!(holder.same_aggregate(0, 4));
}

#[test]
fn test_materials_source() {
    let mut a = particle_storage(vec![Vec3::new_zero(); 3]);
    let b = particle_storage(vec![Vec3::new_zero(); 2]);
    a.merge(b).unwrap();
    let holder = AggregateHolder::new(&a, AggregateEnum::Materials);
    assert_eq!(holder.count(), 2);
    assert!(holder.same_aggregate(0, 2));
    assert!(!holder.same_aggregate(2, 3));
    assert!(holder.same_aggregate(3, 4));
}

#[test]
fn test_integrate_writes_rigid_velocities() {
    // four equal masses in a square, rigidly rotating about z
    let omega = 0.01;
    let positions = vec![
        Vec3::new(1., 0., 0.),
        Vec3::new(-1., 0., 0.),
        Vec3::new(0., 1., 0.),
        Vec3::new(0., -1., 0.),
    ];
    let spin = Vec3::new(0., 0., omega);
    let mut storage = particle_storage(positions.clone());
    {
        let buffers = storage.positions_mut().unwrap();
        for (i, r) in positions.iter().enumerate() {
            buffers.v[i] = spin.cross(*r);
        }
    }
    let holder = AggregateHolder::new(&storage, AggregateEnum::Particles);
    holder.merge(0, 1);
    holder.merge(0, 2);
    holder.merge(0, 3);
    holder.integrate(&mut storage).unwrap();

    let v = storage.derivative::<Vec3>(QuantityId::Position).unwrap();
    // the rigid velocity field reproduces the input rotation
    for (i, r) in positions.iter().enumerate() {
        let expected = spin.cross(*r);
        assert_relative_eq!(v[i].x, expected.x, epsilon = 1e-10);
        assert_relative_eq!(v[i].y, expected.y, epsilon = 1e-10);
        assert_relative_eq!(v[i].z, expected.z, epsilon = 1e-10);
    }
    // momentum of the aggregate stays zero
    let total = v.iter().fold(Vec3::new_zero(), |acc, &item| acc + item);
    assert_relative_eq!(total.magnitude(), 0., epsilon = 1e-10);
}
