use tempfile::TempDir;

use crate::error::Error;
use crate::math::Interval;
use crate::paths::Path;
use crate::settings::{
    BodySettings, BodySettingsId, FlagSet, RunSettings, RunSettingsId, TimeStepCriterionEnum,
    TimesteppingEnum,
};

#[test]
fn test_get_returns_default_without_set() {
    let settings = RunSettings::new();
    let name: String = settings.get(RunSettingsId::RunName).unwrap();
    assert_eq!(name, "unnamed run");
    let courant: f64 = settings.get(RunSettingsId::TimesteppingCourant).unwrap();
    assert_eq!(courant, 0.2);
}

#[test]
fn test_set_then_get() {
    let mut settings = RunSettings::new();
    settings.set(RunSettingsId::DomainRadius, 3.5);
    let radius: f64 = settings.get(RunSettingsId::DomainRadius).unwrap();
    assert_eq!(radius, 3.5);

    settings.set(
        RunSettingsId::TimesteppingIntegrator,
        TimesteppingEnum::Leapfrog,
    );
    let integrator: TimesteppingEnum =
        settings.get(RunSettingsId::TimesteppingIntegrator).unwrap();
    assert_eq!(integrator, TimesteppingEnum::Leapfrog);
}

#[test]
fn test_get_with_wrong_type_fails() {
    let settings = RunSettings::new();
    let result = settings.get::<i64>(RunSettingsId::DomainRadius);
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_has_type() {
    let settings = RunSettings::new();
    assert!(settings.has_type::<f64>(RunSettingsId::DomainRadius));
    assert!(!settings.has_type::<bool>(RunSettingsId::DomainRadius));
}

#[test]
fn test_add_entries_overrides_only_present_keys() {
    let mut a = RunSettings::new();
    a.set(RunSettingsId::DomainRadius, 1.0);
    a.set(RunSettingsId::TimesteppingCourant, 0.5);

    let mut b = RunSettings::new();
    b.set(RunSettingsId::DomainRadius, 2.0);

    a.add_entries(&b);
    assert_eq!(a.get::<f64>(RunSettingsId::DomainRadius).unwrap(), 2.0);
    assert_eq!(a.get::<f64>(RunSettingsId::TimesteppingCourant).unwrap(), 0.5);
}

#[test]
fn test_flags_round_trip() {
    let mut settings = RunSettings::new();
    let flags = FlagSet::of(&[
        TimeStepCriterionEnum::Courant,
        TimeStepCriterionEnum::Acceleration,
    ]);
    settings.set(RunSettingsId::TimesteppingCriterion, flags);
    let loaded: FlagSet<TimeStepCriterionEnum> = settings
        .get_flags(RunSettingsId::TimesteppingCriterion)
        .unwrap();
    assert!(loaded.has(TimeStepCriterionEnum::Courant));
    assert!(loaded.has(TimeStepCriterionEnum::Acceleration));
    assert!(!loaded.has(TimeStepCriterionEnum::Derivatives));
}

#[test]
fn test_save_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = Path::new(&dir.path().join("settings.sph").to_string_lossy());

    let mut settings = RunSettings::new();
    settings.set(RunSettingsId::DomainRadius, 3.5);
    settings.set(RunSettingsId::RunName, "lll".to_string());
    settings.set(
        RunSettingsId::TimesteppingCriterion,
        FlagSet::<TimeStepCriterionEnum>::empty(),
    );
    settings.set(
        RunSettingsId::RunTimeRange,
        Interval::new(0., f64::INFINITY),
    );
    settings.save_to_file(&path).unwrap();

    let mut loaded = RunSettings::new();
    loaded.load_from_file(&path).unwrap();

    assert_eq!(loaded.get::<f64>(RunSettingsId::DomainRadius).unwrap(), 3.5);
    assert_eq!(loaded.get::<String>(RunSettingsId::RunName).unwrap(), "lll");
    let criteria: FlagSet<TimeStepCriterionEnum> = loaded
        .get_flags(RunSettingsId::TimesteppingCriterion)
        .unwrap();
    assert!(criteria.is_empty());
    assert_eq!(
        loaded.get::<Interval>(RunSettingsId::RunTimeRange).unwrap(),
        Interval::new(0., f64::INFINITY)
    );

    // every key of the original produces the same typed value
    for (key, value) in settings.iter() {
        let reloaded = loaded.iter().find(|(k, _)| *k == key).unwrap().1;
        assert_eq!(value, reloaded, "key {:?} does not round-trip", key);
    }
}

#[test]
fn test_load_unknown_key_fails() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("bad.sph");
    std::fs::write(&file, "no.such.key = 42\n").unwrap();
    let mut settings = RunSettings::new();
    let result = settings.load_from_file(&Path::new(&file.to_string_lossy()));
    assert!(matches!(result, Err(Error::UnknownKey(_))));
}

#[test]
fn test_load_malformed_value_fails() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("bad.sph");
    std::fs::write(&file, "domain.radius = banana\n").unwrap();
    let mut settings = RunSettings::new();
    let result = settings.load_from_file(&Path::new(&file.to_string_lossy()));
    assert!(matches!(result, Err(Error::InvalidValue { .. })));
}

#[test]
fn test_body_settings_defaults() {
    let body = BodySettings::new();
    assert_eq!(body.get::<f64>(BodySettingsId::Density).unwrap(), 2700.);
    assert_eq!(body.get::<i64>(BodySettingsId::ParticleCount).unwrap(), 10000);
}
