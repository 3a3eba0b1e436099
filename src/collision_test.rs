use approx::assert_relative_eq;
use lin_alg::f64::Vec3;

use crate::collision::{handle_collisions, CollisionConfig};
use crate::quantity::{OrderEnum, QuantityId};
use crate::settings::{BodySettings, CollisionHandlerEnum, OverlapHandlerEnum};
use crate::stats::{Statistics, StatisticsId};
use crate::storage::Storage;

fn sphere_storage(positions: Vec<Vec3>, radius: f64, mass: f64) -> Storage {
    let mut storage = Storage::with_material(BodySettings::new());
    storage
        .insert(QuantityId::Position, OrderEnum::Second, positions)
        .unwrap();
    storage
        .insert_uniform(QuantityId::SmoothingLength, OrderEnum::First, radius)
        .unwrap();
    storage
        .insert_uniform(QuantityId::Mass, OrderEnum::Zero, mass)
        .unwrap();
    storage
}

fn config(handler: CollisionHandlerEnum, overlap: OverlapHandlerEnum) -> CollisionConfig {
    CollisionConfig {
        handler,
        overlap,
        restitution_normal: 0.5,
        restitution_tangent: 1.,
        allowed_overlap: 0.01,
        merging_limit: 1.,
        gravity_constant: 6.6743e-11,
    }
}

#[test]
fn test_repel_overlapping_spheres() {
    // two 1 m spheres at 1.5 m distance
    let mut storage = sphere_storage(
        vec![Vec3::new_zero(), Vec3::new(1.5, 0., 0.)],
        1.,
        1.,
    );
    let com_before = Vec3::new(0.75, 0., 0.);

    let mut stats = Statistics::new();
    handle_collisions(
        &mut storage,
        &mut stats,
        0.01,
        &config(CollisionHandlerEnum::None, OverlapHandlerEnum::Repel),
    )
    .unwrap();

    let r = storage.value::<Vec3>(QuantityId::Position).unwrap();
    let dist = (r[0] - r[1]).magnitude();
    assert!(dist >= 1.98 - 1e-12, "distance after repel: {}", dist);
    // displacement stays on the connecting line, the center of mass is
    // unchanged
    assert_relative_eq!(r[0].y, 0., epsilon = 1e-12);
    assert_relative_eq!(r[1].y, 0., epsilon = 1e-12);
    let com = (r[0] + r[1]) * 0.5;
    assert_relative_eq!(com.x, com_before.x, epsilon = 1e-12);
    assert!(stats.get_int(StatisticsId::OverlapCount).unwrap() > 0);
}

#[test]
fn test_perfect_merging_conserves_mass_and_momentum() {
    let mut storage = sphere_storage(
        vec![Vec3::new_zero(), Vec3::new(1.5, 0., 0.)],
        1.,
        2.,
    );
    {
        let buffers = storage.positions_mut().unwrap();
        buffers.v[0] = Vec3::new(1., 0., 0.);
        buffers.v[1] = Vec3::new(-1., 1., 0.);
    }
    let mass_before: f64 = storage.value::<f64>(QuantityId::Mass).unwrap().iter().sum();
    let momentum_before = Vec3::new(2. * 1. - 2. * 1., 2., 0.);

    let mut stats = Statistics::new();
    handle_collisions(
        &mut storage,
        &mut stats,
        0.01,
        &config(
            CollisionHandlerEnum::PerfectMerging,
            OverlapHandlerEnum::ForceMerge,
        ),
    )
    .unwrap();

    assert_eq!(storage.particle_cnt(), 1);
    let mass_after: f64 = storage.value::<f64>(QuantityId::Mass).unwrap().iter().sum();
    assert_relative_eq!(mass_after, mass_before, epsilon = 1e-12);
    let v = storage.derivative::<Vec3>(QuantityId::Position).unwrap()[0];
    let momentum_after = v * mass_after;
    assert_relative_eq!(momentum_after.x, momentum_before.x, epsilon = 1e-12);
    assert_relative_eq!(momentum_after.y, momentum_before.y, epsilon = 1e-12);
    // volume conservation: h^3 additive
    let h = storage.value::<f64>(QuantityId::SmoothingLength).unwrap()[0];
    assert_relative_eq!(h, 2f64.cbrt(), epsilon = 1e-12);
}

#[test]
fn test_bounce_conserves_momentum() {
    let mut storage = sphere_storage(
        vec![Vec3::new_zero(), Vec3::new(1.9, 0., 0.)],
        1.,
        1.,
    );
    {
        let buffers = storage.positions_mut().unwrap();
        buffers.v[0] = Vec3::new(1., 0., 0.);
        buffers.v[1] = Vec3::new(-1., 0., 0.);
    }
    let mut stats = Statistics::new();
    handle_collisions(
        &mut storage,
        &mut stats,
        0.01,
        &config(
            CollisionHandlerEnum::ElasticBounce,
            OverlapHandlerEnum::Ignore,
        ),
    )
    .unwrap();

    let v = storage.derivative::<Vec3>(QuantityId::Position).unwrap();
    let momentum = v[0] + v[1];
    assert_relative_eq!(momentum.magnitude(), 0., epsilon = 1e-12);
    // approaching pair bounced: velocities reversed and damped by the
    // normal restitution
    assert!(v[0].x < 0.);
    assert!(v[1].x > 0.);
    assert_relative_eq!(v[0].x, -0.5, epsilon = 1e-12);
}

#[test]
fn test_merge_or_bounce_fast_pair_bounces() {
    // relative speed far above the mutual escape speed of kg-scale bodies
    let mut storage = sphere_storage(
        vec![Vec3::new_zero(), Vec3::new(1.9, 0., 0.)],
        1.,
        1.,
    );
    {
        let buffers = storage.positions_mut().unwrap();
        buffers.v[0] = Vec3::new(10., 0., 0.);
        buffers.v[1] = Vec3::new(-10., 0., 0.);
    }
    let mut stats = Statistics::new();
    handle_collisions(
        &mut storage,
        &mut stats,
        0.01,
        &config(
            CollisionHandlerEnum::MergeOrBounce,
            OverlapHandlerEnum::Ignore,
        ),
    )
    .unwrap();
    assert_eq!(storage.particle_cnt(), 2);
}

#[test]
fn test_merge_or_bounce_slow_pair_merges() {
    // planet-mass bodies approaching at a crawl are bound
    let mut storage = sphere_storage(
        vec![Vec3::new_zero(), Vec3::new(1.9, 0., 0.)],
        1.,
        1e20,
    );
    {
        let buffers = storage.positions_mut().unwrap();
        buffers.v[0] = Vec3::new(0.1, 0., 0.);
        buffers.v[1] = Vec3::new(-0.1, 0., 0.);
    }
    let mut stats = Statistics::new();
    handle_collisions(
        &mut storage,
        &mut stats,
        0.01,
        &config(
            CollisionHandlerEnum::MergeOrBounce,
            OverlapHandlerEnum::Ignore,
        ),
    )
    .unwrap();
    assert_eq!(storage.particle_cnt(), 1);
}

#[test]
fn test_non_approaching_pair_is_not_a_collision() {
    let mut storage = sphere_storage(
        vec![Vec3::new_zero(), Vec3::new(1.9, 0., 0.)],
        1.,
        1.,
    );
    {
        let buffers = storage.positions_mut().unwrap();
        // receding
        buffers.v[0] = Vec3::new(-1., 0., 0.);
        buffers.v[1] = Vec3::new(1., 0., 0.);
    }
    let mut stats = Statistics::new();
    handle_collisions(
        &mut storage,
        &mut stats,
        0.01,
        &config(
            CollisionHandlerEnum::PerfectMerging,
            OverlapHandlerEnum::Ignore,
        ),
    )
    .unwrap();
    assert_eq!(storage.particle_cnt(), 2);
}
