use lin_alg::f64::Vec3;

use crate::error::Error;
use crate::quantity::{OrderEnum, QuantityId};
use crate::settings::{BodySettings, BodySettingsId};
use crate::storage::Storage;

fn test_storage(n: usize) -> Storage {
    let mut storage = Storage::with_material(BodySettings::new());
    let positions = (0..n).map(|i| Vec3::new(i as f64, 0., 0.)).collect();
    storage
        .insert(QuantityId::Position, OrderEnum::Second, positions)
        .unwrap();
    storage
        .insert_uniform(QuantityId::Mass, OrderEnum::Zero, 1.)
        .unwrap();
    storage
        .insert_uniform(QuantityId::Density, OrderEnum::First, 2700.)
        .unwrap();
    storage
}

#[test]
fn test_insert_allocates_derivatives() {
    let storage = test_storage(5);
    assert_eq!(storage.particle_cnt(), 5);
    assert_eq!(storage.value::<Vec3>(QuantityId::Position).unwrap().len(), 5);
    assert_eq!(
        storage.derivative::<Vec3>(QuantityId::Position).unwrap().len(),
        5
    );
    assert_eq!(
        storage
            .second_derivative::<Vec3>(QuantityId::Position)
            .unwrap()
            .len(),
        5
    );
    // zero-order quantities have no derivative buffer
    assert!(storage.derivative::<f64>(QuantityId::Mass).unwrap().is_empty());
}

#[test]
fn test_missing_quantity() {
    let storage = test_storage(3);
    assert!(matches!(
        storage.value::<f64>(QuantityId::Pressure),
        Err(Error::MissingQuantity(QuantityId::Pressure))
    ));
}

#[test]
fn test_insert_length_mismatch_fails() {
    let mut storage = test_storage(3);
    let result = storage.insert(QuantityId::Energy, OrderEnum::First, vec![0.; 5]);
    assert!(result.is_err());
}

#[test]
fn test_remove_preserves_survivor_order() {
    let mut storage = test_storage(6);
    storage.remove(&[1, 4]);
    assert_eq!(storage.particle_cnt(), 4);
    let r = storage.value::<Vec3>(QuantityId::Position).unwrap();
    let xs: Vec<f64> = r.iter().map(|p| p.x).collect();
    assert_eq!(xs, vec![0., 2., 3., 5.]);
}

#[test]
fn test_remove_updates_partitions() {
    let mut a = test_storage(4);
    let b = test_storage(4);
    a.merge(b).unwrap();
    assert_eq!(a.material_cnt(), 2);
    assert_eq!(a.material(1).start, 4);
    assert_eq!(a.material(1).end, 8);

    // removing one particle of the first body shifts the second partition
    a.remove(&[2]);
    assert_eq!(a.material(0).end, 3);
    assert_eq!(a.material(1).start, 3);
    assert_eq!(a.material(1).end, 7);
    assert_eq!(a.material_of(3), 1);
    assert_eq!(a.material_of(2), 0);
}

#[test]
fn test_insert_then_remove_restores_count() {
    let mut storage = test_storage(5);
    let before = storage.particle_cnt();
    storage.remove(&[0, 3]);
    assert_eq!(storage.particle_cnt(), before - 2);
    assert!(storage.is_valid());
}

#[test]
fn test_merge_incompatible_fails() {
    let mut a = test_storage(3);
    let mut b = Storage::with_material(BodySettings::new());
    b.insert(
        QuantityId::Position,
        OrderEnum::Second,
        vec![Vec3::new_zero(); 2],
    )
    .unwrap();
    // b misses mass and density
    assert!(matches!(
        a.merge(b),
        Err(Error::IncompatibleStorage(_))
    ));
}

#[test]
fn test_views_after_remove_return_pre_removal_values() {
    let mut storage = test_storage(4);
    let before: Vec<f64> = storage
        .value::<Vec3>(QuantityId::Position)
        .unwrap()
        .iter()
        .map(|p| p.x)
        .collect();
    storage.remove(&[1]);
    let after = storage.value::<Vec3>(QuantityId::Position).unwrap();
    // surviving indices keep the values they had before the removal
    assert_eq!(after[0].x, before[0]);
    assert_eq!(after[1].x, before[2]);
    assert_eq!(after[2].x, before[3]);
}

#[test]
fn test_attractors() {
    let mut storage = test_storage(2);
    storage.add_attractor(Vec3::new(1., 2., 3.), Vec3::new_zero(), 5.97e24, 6.4e6);
    assert_eq!(storage.attractors().len(), 1);
    assert_eq!(storage.attractors()[0].mass, 5.97e24);
}

#[test]
fn test_user_data_slot() {
    let mut storage = test_storage(2);
    assert!(!storage.has_user_data());
    storage.set_user_data(vec![1u32, 2, 3]);
    assert!(storage.has_user_data());
    assert_eq!(storage.user_data::<Vec<u32>>().unwrap().len(), 3);
    let taken = storage.take_user_data::<Vec<u32>>().unwrap();
    assert_eq!(*taken, vec![1, 2, 3]);
    assert!(!storage.has_user_data());
}

#[test]
fn test_material_settings_accessible() {
    let mut body = BodySettings::new();
    body.set(BodySettingsId::Density, 1000.);
    let mut storage = Storage::with_material(body);
    storage
        .insert(QuantityId::Position, OrderEnum::Second, vec![Vec3::new_zero(); 3])
        .unwrap();
    assert_eq!(storage.material(0).start, 0);
    assert_eq!(storage.material(0).end, 3);
    assert_eq!(
        storage
            .material(0)
            .settings
            .get::<f64>(BodySettingsId::Density)
            .unwrap(),
        1000.
    );
}
