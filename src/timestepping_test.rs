use approx::assert_relative_eq;
use lin_alg::f64::Vec3;

use crate::error::Result;
use crate::quantity::{OrderEnum, QuantityId};
use crate::settings::{
    BodySettings, FlagSet, RunSettings, RunSettingsId, TimeStepCriterionEnum,
};
use crate::solver::Solver;
use crate::stats::{CriterionId, Statistics, StatisticsId};
use crate::storage::Storage;
use crate::timestepping::{create_timestepping, MultiCriterion};

/// Solver of x'' = -omega^2 x, independent per particle.
struct HarmonicOscillator {
    omega_sq: f64,
}

impl Solver for HarmonicOscillator {
    fn create(&mut self, _storage: &mut Storage) -> Result<()> {
        Ok(())
    }

    fn integrate(&mut self, storage: &mut Storage, _stats: &mut Statistics) -> Result<()> {
        let buffers = storage.positions_mut()?;
        for i in 0..buffers.r.len() {
            buffers.dv[i] = buffers.r[i] * -self.omega_sq;
        }
        Ok(())
    }
}

fn oscillator_storage(amplitude: f64) -> Storage {
    let mut storage = Storage::with_material(BodySettings::new());
    storage
        .insert(
            QuantityId::Position,
            OrderEnum::Second,
            vec![Vec3::new(amplitude, 0., 0.)],
        )
        .unwrap();
    storage
        .insert_uniform(QuantityId::Mass, OrderEnum::Zero, 1.)
        .unwrap();
    storage
        .insert_uniform(QuantityId::SmoothingLength, OrderEnum::First, 1.)
        .unwrap();
    storage
}

/// Settings with a fixed timestep and no adaptive criteria.
fn fixed_dt_settings(dt: f64) -> RunSettings {
    let mut settings = RunSettings::new();
    settings.set(RunSettingsId::TimesteppingInitialTimestep, dt);
    settings.set(RunSettingsId::TimesteppingMaxTimestep, dt);
    settings.set(
        RunSettingsId::TimesteppingCriterion,
        FlagSet::<TimeStepCriterionEnum>::empty(),
    );
    settings
}

#[test]
fn test_predictor_corrector_amplitude_drift() {
    use crate::settings::TimesteppingEnum;
    let mut settings = fixed_dt_settings(0.05);
    settings.set(
        RunSettingsId::TimesteppingIntegrator,
        TimesteppingEnum::PredictorCorrector,
    );
    let mut stepper = create_timestepping(&settings).unwrap();
    let mut solver = HarmonicOscillator { omega_sq: 1. };
    let mut storage = oscillator_storage(1.);
    let mut stats = Statistics::new();

    // 100 periods of the oscillator
    let period = 2. * std::f64::consts::PI;
    let steps = (100. * period / 0.05) as usize;
    let mut max_amplitude: f64 = 0.;
    for _ in 0..steps {
        stepper.step(&mut storage, &mut solver, &mut stats).unwrap();
        let r = storage.value::<Vec3>(QuantityId::Position).unwrap()[0];
        max_amplitude = max_amplitude.max(r.x.abs());
    }
    let r = storage.value::<Vec3>(QuantityId::Position).unwrap()[0];
    let v = storage.derivative::<Vec3>(QuantityId::Position).unwrap()[0];
    let energy = 0.5 * (v.magnitude_squared() + r.magnitude_squared());
    let amplitude = (2. * energy).sqrt();
    assert!(
        (amplitude - 1.).abs() < 0.01,
        "amplitude drifted to {}",
        amplitude
    );
    assert!(max_amplitude < 1.01);
}

#[test]
fn test_leapfrog_conserves_energy() {
    use crate::settings::TimesteppingEnum;
    let mut settings = fixed_dt_settings(0.05);
    settings.set(
        RunSettingsId::TimesteppingIntegrator,
        TimesteppingEnum::Leapfrog,
    );
    let mut stepper = create_timestepping(&settings).unwrap();
    let mut solver = HarmonicOscillator { omega_sq: 1. };
    let mut storage = oscillator_storage(1.);
    let mut stats = Statistics::new();

    for _ in 0..5000 {
        stepper.step(&mut storage, &mut solver, &mut stats).unwrap();
    }
    let r = storage.value::<Vec3>(QuantityId::Position).unwrap()[0];
    let v = storage.derivative::<Vec3>(QuantityId::Position).unwrap()[0];
    let energy = 0.5 * (v.magnitude_squared() + r.magnitude_squared());
    assert_relative_eq!(energy, 0.5, epsilon = 0.005);
}

#[test]
fn test_euler_advances_first_order_quantities() {
    use crate::settings::TimesteppingEnum;

    struct ConstantGrowth;
    impl Solver for ConstantGrowth {
        fn create(&mut self, _storage: &mut Storage) -> Result<()> {
            Ok(())
        }
        fn integrate(&mut self, storage: &mut Storage, _stats: &mut Statistics) -> Result<()> {
            storage
                .derivative_mut::<f64>(QuantityId::Energy)?
                .fill(2.);
            Ok(())
        }
    }

    let mut settings = fixed_dt_settings(0.5);
    settings.set(
        RunSettingsId::TimesteppingIntegrator,
        TimesteppingEnum::EulerExplicit,
    );
    let mut storage = oscillator_storage(0.);
    storage
        .insert_uniform(QuantityId::Energy, OrderEnum::First, 1.)
        .unwrap();
    let mut stepper = create_timestepping(&settings).unwrap();
    let mut stats = Statistics::new();
    stepper
        .step(&mut storage, &mut ConstantGrowth, &mut stats)
        .unwrap();
    let u = storage.value::<f64>(QuantityId::Energy).unwrap()[0];
    assert_relative_eq!(u, 2., epsilon = 1e-12);
}

#[test]
fn test_criterion_selection_records_courant() {
    let mut settings = RunSettings::new();
    settings.set(RunSettingsId::TimesteppingCourant, 0.25);
    settings.set(RunSettingsId::TimesteppingAccelerationFactor, 0.2);
    settings.set(RunSettingsId::TimesteppingMaxTimestep, 10.);
    settings.set(
        RunSettingsId::TimesteppingCriterion,
        FlagSet::of(&[
            TimeStepCriterionEnum::Courant,
            TimeStepCriterionEnum::Acceleration,
        ]),
    );

    let mut storage = Storage::with_material(BodySettings::new());
    storage
        .insert(
            QuantityId::Position,
            OrderEnum::Second,
            vec![Vec3::new_zero()],
        )
        .unwrap();
    storage
        .insert_uniform(QuantityId::SmoothingLength, OrderEnum::First, 100.)
        .unwrap();
    storage
        .insert_uniform(QuantityId::SoundSpeed, OrderEnum::Zero, 1000.)
        .unwrap();
    storage.second_derivative_mut::<Vec3>(QuantityId::Position).unwrap()[0] =
        Vec3::new(400., 0., 0.);

    let criteria = MultiCriterion::from_settings(&settings).unwrap();
    let mut stats = Statistics::new();
    let (dt, id) = criteria.compute(&storage, 10., &mut stats).unwrap();

    // courant: 0.25 * 100 / 1000 = 0.025; acceleration: 0.2 sqrt(100/400) = 0.1
    assert_relative_eq!(dt, 0.025, epsilon = 1e-12);
    assert_eq!(id, CriterionId::Courant);
}

#[test]
fn test_derivative_criterion_records_particle() {
    let mut settings = RunSettings::new();
    settings.set(RunSettingsId::TimesteppingDerivativeFactor, 0.2);
    settings.set(RunSettingsId::TimesteppingMaxTimestep, 1000.);
    settings.set(
        RunSettingsId::TimesteppingCriterion,
        FlagSet::of(&[TimeStepCriterionEnum::Derivatives]),
    );

    let mut storage = Storage::with_material(BodySettings::new());
    storage
        .insert(QuantityId::Energy, OrderEnum::First, vec![100., 100., 100.])
        .unwrap();
    {
        let du = storage.derivative_mut::<f64>(QuantityId::Energy).unwrap();
        du[1] = 50.; // fastest relative change
        du[0] = 1.;
        du[2] = 1.;
    }
    storage
        .set_range(
            QuantityId::Energy,
            crate::math::Interval::new(0., f64::INFINITY),
            1.,
        )
        .unwrap();

    let criteria = MultiCriterion::from_settings(&settings).unwrap();
    let mut stats = Statistics::new();
    let (_, id) = criteria.compute(&storage, 1000., &mut stats).unwrap();
    assert_eq!(id, CriterionId::Derivative);
    assert_eq!(stats.get_int(StatisticsId::LimitingParticleIdx), Some(1));
}

#[test]
fn test_timestep_growth_is_limited() {
    use crate::settings::TimesteppingEnum;
    let mut settings = RunSettings::new();
    settings.set(RunSettingsId::TimesteppingInitialTimestep, 0.01);
    settings.set(RunSettingsId::TimesteppingMaxTimestep, 100.);
    settings.set(RunSettingsId::TimesteppingMaxChange, 2.);
    settings.set(
        RunSettingsId::TimesteppingCriterion,
        FlagSet::<TimeStepCriterionEnum>::empty(),
    );
    settings.set(
        RunSettingsId::TimesteppingIntegrator,
        TimesteppingEnum::EulerExplicit,
    );

    let mut stepper = create_timestepping(&settings).unwrap();
    let mut solver = HarmonicOscillator { omega_sq: 0. };
    let mut storage = oscillator_storage(1.);
    let mut stats = Statistics::new();

    assert_relative_eq!(stepper.current_dt(), 0.01);
    stepper.step(&mut storage, &mut solver, &mut stats).unwrap();
    // without criteria the step would jump to max_dt; the growth limit
    // allows only a factor of two per step
    assert_relative_eq!(stepper.current_dt(), 0.02, epsilon = 1e-12);
    assert_eq!(
        stats.get_criterion(StatisticsId::TimestepCriterion),
        Some(CriterionId::MaxChange)
    );
}
