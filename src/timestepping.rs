//! Integration schemes with adaptive timestep selection.
//!
//! The timestep of the next step is derived from all enabled criteria,
//! combined by minimum (or a generalized power mean), clamped from above
//! by the maximal step and limited in how fast it may grow and shrink.

use lin_alg::f64::Vec3;

use crate::error::Result;
use crate::math::power_mean;
use crate::quantity::{dispatch_arithmetic, Element, OrderEnum, QuantityData, QuantityId};
use crate::settings::{
    FlagSet, RunSettings, RunSettingsId, TimeStepCriterionEnum, TimesteppingEnum,
};
use crate::solver::Solver;
use crate::stats::{CriterionId, StatValue, Statistics, StatisticsId};
use crate::storage::Storage;

/// How much the timestep may shrink from one step to the next.
const SHRINK_RATE: f64 = 10.;

/// Integration scheme advancing the state by one timestep.
pub trait TimeStepping: Send {
    fn step(
        &mut self,
        storage: &mut Storage,
        solver: &mut dyn Solver,
        stats: &mut Statistics,
    ) -> Result<()>;

    fn current_dt(&self) -> f64;

    /// Overrides the current timestep; used when resuming a saved run.
    fn set_dt(&mut self, dt: f64);
}

pub fn create_timestepping(settings: &RunSettings) -> Result<Box<dyn TimeStepping>> {
    let base = TimeStepBase::from_settings(settings)?;
    match settings.get::<TimesteppingEnum>(RunSettingsId::TimesteppingIntegrator)? {
        TimesteppingEnum::EulerExplicit => Ok(Box::new(EulerExplicit { base })),
        TimesteppingEnum::Leapfrog => Ok(Box::new(Leapfrog {
            base,
            initialized: false,
        })),
        TimesteppingEnum::RungeKutta => Ok(Box::new(RungeKutta { base })),
        TimesteppingEnum::PredictorCorrector => Ok(Box::new(PredictorCorrector {
            base,
            initialized: false,
        })),
        TimesteppingEnum::ModifiedMidpoint => Ok(Box::new(ModifiedMidpoint {
            base,
            substeps: settings.get::<i64>(RunSettingsId::TimesteppingMidpointCount)?.max(2)
                as usize,
        })),
        TimesteppingEnum::BulirschStoer => Ok(Box::new(BulirschStoer {
            base,
            substeps: settings.get::<i64>(RunSettingsId::TimesteppingMidpointCount)?.max(2)
                as usize,
        })),
    }
}

/// State shared by all integrators: the current timestep and the criteria
/// deriving the next one.
pub struct TimeStepBase {
    dt: f64,
    max_dt: f64,
    /// Lower bound of the step; shrinks geometrically so the step cannot
    /// collapse faster than [`SHRINK_RATE`] per step.
    min_dt: f64,
    max_change: f64,
    criteria: MultiCriterion,
}

impl TimeStepBase {
    pub fn from_settings(settings: &RunSettings) -> Result<Self> {
        let max_dt = settings.get::<f64>(RunSettingsId::TimesteppingMaxTimestep)?;
        let initial = settings.get::<f64>(RunSettingsId::TimesteppingInitialTimestep)?;
        Ok(Self {
            dt: initial.min(max_dt),
            max_dt,
            min_dt: initial.min(max_dt),
            max_change: settings.get(RunSettingsId::TimesteppingMaxChange)?,
            criteria: MultiCriterion::from_settings(settings)?,
        })
    }

    /// Derives the timestep of the next step from the criteria and records
    /// the limiting criterion in the statistics.
    fn update_dt(&mut self, storage: &Storage, stats: &mut Statistics) -> Result<()> {
        self.min_dt /= SHRINK_RATE;
        let (mut dt, mut criterion) = self.criteria.compute(storage, self.max_dt, stats)?;
        if dt > self.dt * self.max_change {
            dt = self.dt * self.max_change;
            criterion = CriterionId::MaxChange;
        }
        if dt < self.min_dt {
            dt = self.min_dt;
        }
        self.dt = dt;
        stats.set_float(StatisticsId::Timestep, self.dt);
        stats.set(
            StatisticsId::TimestepCriterion,
            StatValue::Criterion(criterion),
        );
        Ok(())
    }
}

/// Semi-implicit Euler: first derivatives advance before the values.
fn advance_values(storage: &mut Storage, dt: f64) {
    let ids: Vec<QuantityId> = storage.ids().collect();
    for id in ids {
        let q = storage.quantity_mut(id).unwrap();
        let order = q.order();
        let range = q.range();
        dispatch_arithmetic!(q.data_mut(), |b| {
            match order {
                OrderEnum::Zero => {}
                OrderEnum::First => {
                    for i in 0..b.values.len() {
                        b.values[i] =
                            (b.values[i] + b.dt[i] * dt).clamp_to(&range);
                    }
                }
                OrderEnum::Second => {
                    for i in 0..b.values.len() {
                        b.dt[i] = b.dt[i] + b.d2t[i] * dt;
                        b.values[i] = (b.values[i] + b.dt[i] * dt).clamp_to(&range);
                    }
                }
            }
        });
    }
}

/// Kick of the leapfrog scheme: advance first derivatives of second-order
/// quantities by half a step.
fn kick(storage: &mut Storage, dt_half: f64) {
    let ids: Vec<QuantityId> = storage.ids().collect();
    for id in ids {
        let q = storage.quantity_mut(id).unwrap();
        if q.order() != OrderEnum::Second {
            continue;
        }
        dispatch_arithmetic!(q.data_mut(), |b| {
            for i in 0..b.values.len() {
                b.dt[i] = b.dt[i] + b.d2t[i] * dt_half;
            }
        });
    }
}

/// Drift of the leapfrog scheme: advance values by a full step.
fn drift(storage: &mut Storage, dt: f64) {
    let ids: Vec<QuantityId> = storage.ids().collect();
    for id in ids {
        let q = storage.quantity_mut(id).unwrap();
        let order = q.order();
        let range = q.range();
        if order == OrderEnum::Zero {
            continue;
        }
        dispatch_arithmetic!(q.data_mut(), |b| {
            for i in 0..b.values.len() {
                b.values[i] = (b.values[i] + b.dt[i] * dt).clamp_to(&range);
            }
        });
    }
}

pub struct EulerExplicit {
    base: TimeStepBase,
}

impl TimeStepping for EulerExplicit {
    fn step(
        &mut self,
        storage: &mut Storage,
        solver: &mut dyn Solver,
        stats: &mut Statistics,
    ) -> Result<()> {
        storage.zero_highest_derivatives();
        solver.integrate(storage, stats)?;
        advance_values(storage, self.base.dt);
        self.base.update_dt(storage, stats)
    }

    fn current_dt(&self) -> f64 {
        self.base.dt
    }

    fn set_dt(&mut self, dt: f64) {
        self.base.dt = dt;
    }
}

/// Kick-drift-kick leapfrog, 2nd order and symplectic for positions.
pub struct Leapfrog {
    base: TimeStepBase,
    initialized: bool,
}

impl TimeStepping for Leapfrog {
    fn step(
        &mut self,
        storage: &mut Storage,
        solver: &mut dyn Solver,
        stats: &mut Statistics,
    ) -> Result<()> {
        let dt = self.base.dt;
        if !self.initialized {
            // accelerations of the very first kick
            storage.zero_highest_derivatives();
            solver.integrate(storage, stats)?;
            self.initialized = true;
        }
        kick(storage, 0.5 * dt);
        drift(storage, dt);
        storage.zero_highest_derivatives();
        solver.integrate(storage, stats)?;
        kick(storage, 0.5 * dt);
        self.base.update_dt(storage, stats)
    }

    fn current_dt(&self) -> f64 {
        self.base.dt
    }

    fn set_dt(&mut self, dt: f64) {
        self.base.dt = dt;
    }
}

/// Classical 4th-order Runge-Kutta. Stages work on duplicated storages;
/// expensive in memory, but robust.
pub struct RungeKutta {
    base: TimeStepBase,
}

impl RungeKutta {
    /// y_stage = y0 + derivatives(source) * factor
    fn make_stage(target: &mut Storage, y0: &Storage, source: &Storage, factor: f64) {
        let ids: Vec<QuantityId> = target.ids().collect();
        for id in ids {
            let order = target.quantity(id).unwrap().order();
            if order == OrderEnum::Zero {
                continue;
            }
            let range = target.quantity(id).unwrap().range();
            let q0 = y0.quantity(id).unwrap().data();
            let qs = source.quantity(id).unwrap().data();
            let qt = target.quantity_mut(id).unwrap().data_mut();
            match (qt, q0, qs) {
                (QuantityData::Scalar(t), QuantityData::Scalar(z), QuantityData::Scalar(s)) => {
                    stage_buffers(t, z, s, order, factor, |v| v.clamp_to(&range));
                }
                (QuantityData::Vector(t), QuantityData::Vector(z), QuantityData::Vector(s)) => {
                    stage_buffers(t, z, s, order, factor, |v| v);
                }
                (QuantityData::Tensor(t), QuantityData::Tensor(z), QuantityData::Tensor(s)) => {
                    stage_buffers(t, z, s, order, factor, |v| v);
                }
                (
                    QuantityData::Traceless(t),
                    QuantityData::Traceless(z),
                    QuantityData::Traceless(s),
                ) => {
                    stage_buffers(t, z, s, order, factor, |v| v);
                }
                _ => {}
            }
        }
    }
}

fn stage_buffers<T, C>(
    target: &mut crate::quantity::Buffers<T>,
    y0: &crate::quantity::Buffers<T>,
    source: &crate::quantity::Buffers<T>,
    order: OrderEnum,
    factor: f64,
    clamp: C,
) where
    T: Copy + std::ops::Add<Output = T> + std::ops::Mul<f64, Output = T>,
    C: Fn(T) -> T,
{
    match order {
        OrderEnum::Zero => {}
        OrderEnum::First => {
            for i in 0..target.values.len() {
                target.values[i] = clamp(y0.values[i] + source.dt[i] * factor);
            }
        }
        OrderEnum::Second => {
            for i in 0..target.values.len() {
                target.values[i] = clamp(y0.values[i] + source.dt[i] * factor);
                target.dt[i] = y0.dt[i] + source.d2t[i] * factor;
            }
        }
    }
}

impl TimeStepping for RungeKutta {
    fn step(
        &mut self,
        storage: &mut Storage,
        solver: &mut dyn Solver,
        stats: &mut Statistics,
    ) -> Result<()> {
        let dt = self.base.dt;
        let y0 = storage.duplicate();

        storage.zero_highest_derivatives();
        solver.integrate(storage, stats)?;
        let k1 = storage.duplicate();

        Self::make_stage(storage, &y0, &k1, 0.5 * dt);
        storage.zero_highest_derivatives();
        solver.integrate(storage, stats)?;
        let k2 = storage.duplicate();

        Self::make_stage(storage, &y0, &k2, 0.5 * dt);
        storage.zero_highest_derivatives();
        solver.integrate(storage, stats)?;
        let k3 = storage.duplicate();

        Self::make_stage(storage, &y0, &k3, dt);
        storage.zero_highest_derivatives();
        solver.integrate(storage, stats)?;
        let k4 = storage.duplicate();

        // y = y0 + dt/6 (k1 + 2 k2 + 2 k3 + k4), done stage by stage
        storage.copy_buffers_from(&y0);
        Self::make_stage(storage, &y0, &k1, dt / 6.);
        let partial = storage.duplicate();
        Self::make_stage(storage, &partial, &k2, dt / 3.);
        let partial = storage.duplicate();
        Self::make_stage(storage, &partial, &k3, dt / 3.);
        let partial = storage.duplicate();
        Self::make_stage(storage, &partial, &k4, dt / 6.);

        self.base.update_dt(storage, stats)
    }

    fn current_dt(&self) -> f64 {
        self.base.dt
    }

    fn set_dt(&mut self, dt: f64) {
        self.base.dt = dt;
    }
}

/// Predictor-corrector: values and first derivatives extrapolate with the
/// second derivatives of the previous step, the solver evaluates the
/// predicted state and the corrector averages the derivatives.
pub struct PredictorCorrector {
    base: TimeStepBase,
    initialized: bool,
}

impl PredictorCorrector {
    fn predict(storage: &mut Storage, dt: f64) {
        let dt2 = 0.5 * dt * dt;
        let ids: Vec<QuantityId> = storage.ids().collect();
        for id in ids {
            let q = storage.quantity_mut(id).unwrap();
            let order = q.order();
            let range = q.range();
            dispatch_arithmetic!(q.data_mut(), |b| {
                match order {
                    OrderEnum::Zero => {}
                    OrderEnum::First => {
                        for i in 0..b.values.len() {
                            b.values[i] = (b.values[i] + b.dt[i] * dt).clamp_to(&range);
                        }
                    }
                    OrderEnum::Second => {
                        for i in 0..b.values.len() {
                            b.values[i] = (b.values[i] + b.dt[i] * dt + b.d2t[i] * dt2)
                                .clamp_to(&range);
                            b.dt[i] = b.dt[i] + b.d2t[i] * dt;
                        }
                    }
                }
            });
        }
    }

    fn correct(
        storage: &mut Storage,
        predictions: &std::collections::BTreeMap<QuantityId, QuantityData>,
        dt: f64,
    ) {
        let dt2 = 0.5 * dt * dt;
        let ids: Vec<QuantityId> = storage.ids().collect();
        for id in ids {
            let Some(predicted) = predictions.get(&id) else {
                continue;
            };
            let q = storage.quantity_mut(id).unwrap();
            let order = q.order();
            let range = q.range();
            match (q.data_mut(), predicted) {
                (QuantityData::Scalar(b), QuantityData::Scalar(p)) => {
                    correct_buffers(b, p, order, dt, dt2, |v| v.clamp_to(&range));
                }
                (QuantityData::Vector(b), QuantityData::Vector(p)) => {
                    correct_buffers(b, p, order, dt, dt2, |v| v);
                }
                (QuantityData::Tensor(b), QuantityData::Tensor(p)) => {
                    correct_buffers(b, p, order, dt, dt2, |v| v);
                }
                (QuantityData::Traceless(b), QuantityData::Traceless(p)) => {
                    correct_buffers(b, p, order, dt, dt2, |v| v);
                }
                _ => {}
            }
        }
    }
}

fn correct_buffers<T, C>(
    buffers: &mut crate::quantity::Buffers<T>,
    predicted: &crate::quantity::Buffers<T>,
    order: OrderEnum,
    dt: f64,
    dt2: f64,
    clamp: C,
) where
    T: Copy
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<f64, Output = T>,
    C: Fn(T) -> T,
{
    match order {
        OrderEnum::Zero => {}
        OrderEnum::First => {
            // trapezoid correction: v += (new_dv - predicted_dv) dt / 2
            for i in 0..buffers.values.len() {
                let delta = buffers.dt[i] - predicted.dt[i];
                buffers.values[i] = clamp(buffers.values[i] + delta * (0.5 * dt));
            }
        }
        OrderEnum::Second => {
            for i in 0..buffers.values.len() {
                let delta = buffers.d2t[i] - predicted.d2t[i];
                buffers.values[i] = clamp(buffers.values[i] + delta * (dt2 / 3.));
                buffers.dt[i] = buffers.dt[i] + delta * (0.5 * dt);
            }
        }
    }
}

impl TimeStepping for PredictorCorrector {
    fn step(
        &mut self,
        storage: &mut Storage,
        solver: &mut dyn Solver,
        stats: &mut Statistics,
    ) -> Result<()> {
        let dt = self.base.dt;
        if !self.initialized {
            // derivatives of the first prediction
            storage.zero_highest_derivatives();
            solver.integrate(storage, stats)?;
            self.initialized = true;
        }
        Self::predict(storage, dt);
        let predictions = storage.clone_highest_derivatives();
        storage.zero_highest_derivatives();
        solver.integrate(storage, stats)?;
        Self::correct(storage, &predictions, dt);
        self.base.update_dt(storage, stats)
    }

    fn current_dt(&self) -> f64 {
        self.base.dt
    }

    fn set_dt(&mut self, dt: f64) {
        self.base.dt = dt;
    }
}

/// Gragg's modified midpoint method with a fixed substep count.
pub struct ModifiedMidpoint {
    base: TimeStepBase,
    substeps: usize,
}

fn midpoint_run(
    storage: &mut Storage,
    solver: &mut dyn Solver,
    stats: &mut Statistics,
    dt: f64,
    substeps: usize,
) -> Result<()> {
    let h = dt / substeps as f64;
    for _ in 0..substeps {
        storage.zero_highest_derivatives();
        solver.integrate(storage, stats)?;
        advance_values(storage, h);
    }
    Ok(())
}

impl TimeStepping for ModifiedMidpoint {
    fn step(
        &mut self,
        storage: &mut Storage,
        solver: &mut dyn Solver,
        stats: &mut Statistics,
    ) -> Result<()> {
        midpoint_run(storage, solver, stats, self.base.dt, self.substeps)?;
        self.base.update_dt(storage, stats)
    }

    fn current_dt(&self) -> f64 {
        self.base.dt
    }

    fn set_dt(&mut self, dt: f64) {
        self.base.dt = dt;
    }
}

/// Bulirsch-Stoer: two midpoint runs with different substep counts,
/// combined by one step of Richardson extrapolation.
pub struct BulirschStoer {
    base: TimeStepBase,
    substeps: usize,
}

impl TimeStepping for BulirschStoer {
    fn step(
        &mut self,
        storage: &mut Storage,
        solver: &mut dyn Solver,
        stats: &mut Statistics,
    ) -> Result<()> {
        let dt = self.base.dt;
        let y0 = storage.duplicate();

        midpoint_run(storage, solver, stats, dt, self.substeps)?;
        let coarse = storage.duplicate();

        storage.copy_buffers_from(&y0);
        midpoint_run(storage, solver, stats, dt, 2 * self.substeps)?;

        // y = (4 y_fine - y_coarse) / 3, eliminating the leading error term
        let ids: Vec<QuantityId> = storage.ids().collect();
        for id in ids {
            let order = storage.quantity(id).unwrap().order();
            if order == OrderEnum::Zero {
                continue;
            }
            let qc = coarse.quantity(id).unwrap().data();
            let qt = storage.quantity_mut(id).unwrap().data_mut();
            match (qt, qc) {
                (QuantityData::Scalar(t), QuantityData::Scalar(c)) => extrapolate(t, c, order),
                (QuantityData::Vector(t), QuantityData::Vector(c)) => extrapolate(t, c, order),
                (QuantityData::Tensor(t), QuantityData::Tensor(c)) => extrapolate(t, c, order),
                (QuantityData::Traceless(t), QuantityData::Traceless(c)) => {
                    extrapolate(t, c, order)
                }
                _ => {}
            }
        }
        self.base.update_dt(storage, stats)
    }

    fn current_dt(&self) -> f64 {
        self.base.dt
    }

    fn set_dt(&mut self, dt: f64) {
        self.base.dt = dt;
    }
}

fn extrapolate<T>(
    fine: &mut crate::quantity::Buffers<T>,
    coarse: &crate::quantity::Buffers<T>,
    order: OrderEnum,
) where
    T: Copy + std::ops::Sub<Output = T> + std::ops::Add<Output = T> + std::ops::Mul<f64, Output = T>,
{
    let combine = |f: T, c: T| (f * 4. - c) * (1. / 3.);
    for i in 0..fine.values.len() {
        fine.values[i] = combine(fine.values[i], coarse.values[i]);
    }
    if order == OrderEnum::Second {
        for i in 0..fine.dt.len() {
            fine.dt[i] = combine(fine.dt[i], coarse.dt[i]);
        }
    }
}

/////////////////////////////////////////////////////////////////////////
// Timestep criteria
/////////////////////////////////////////////////////////////////////////

trait Criterion: Send {
    fn compute(
        &self,
        storage: &Storage,
        max_dt: f64,
        stats: &mut Statistics,
    ) -> Result<(f64, CriterionId)>;
}

/// Courant condition: dt <= C h / cs per particle.
struct CourantCriterion {
    courant: f64,
}

impl Criterion for CourantCriterion {
    fn compute(
        &self,
        storage: &Storage,
        max_dt: f64,
        _stats: &mut Statistics,
    ) -> Result<(f64, CriterionId)> {
        let h = storage.value::<f64>(QuantityId::SmoothingLength)?;
        let cs = storage.value::<f64>(QuantityId::SoundSpeed)?;
        let mut min_step = f64::INFINITY;
        for i in 0..h.len() {
            if cs[i] > 0. {
                min_step = min_step.min(self.courant * h[i] / cs[i]);
            }
        }
        if min_step > max_dt {
            Ok((max_dt, CriterionId::Maximal))
        } else {
            Ok((min_step, CriterionId::Courant))
        }
    }
}

/// dt <= factor |v| / |dv| over all first-order quantities; the minimal
/// scale of each quantity floors the denominator.
struct DerivativeCriterion {
    factor: f64,
}

impl Criterion for DerivativeCriterion {
    fn compute(
        &self,
        storage: &Storage,
        max_dt: f64,
        stats: &mut Statistics,
    ) -> Result<(f64, CriterionId)> {
        let mut min_step = f64::INFINITY;
        let mut limit: Option<(QuantityId, usize)> = None;

        for id in storage.ids() {
            let q = storage.quantity(id).unwrap();
            if q.order() != OrderEnum::First {
                continue;
            }
            let min_value = q.min_value().max(1e-300);
            let (values, derivatives): (Vec<f64>, Vec<f64>) = match q.data() {
                QuantityData::Scalar(b) => (
                    b.values.iter().map(|v| v.abs()).collect(),
                    b.dt.iter().map(|v| v.abs()).collect(),
                ),
                QuantityData::Vector(b) => (
                    b.values.iter().map(|v| v.magnitude()).collect(),
                    b.dt.iter().map(|v| v.magnitude()).collect(),
                ),
                QuantityData::Tensor(b) => (
                    b.values.iter().map(|v| v.ddot(v).sqrt()).collect(),
                    b.dt.iter().map(|v| v.ddot(v).sqrt()).collect(),
                ),
                QuantityData::Traceless(b) => (
                    b.values
                        .iter()
                        .map(|v| (2. * v.second_invariant()).sqrt())
                        .collect(),
                    b.dt
                        .iter()
                        .map(|v| (2. * v.second_invariant()).sqrt())
                        .collect(),
                ),
                QuantityData::Index(_) => continue,
            };
            for i in 0..values.len() {
                if values[i] < min_value {
                    // below the meaningful scale, zero crossings would
                    // produce spuriously small steps
                    continue;
                }
                let step = self.factor * (values[i] + min_value) / (derivatives[i] + 1e-300);
                if step < min_step {
                    min_step = step;
                    limit = Some((id, i));
                }
            }
        }
        if min_step > max_dt {
            return Ok((max_dt, CriterionId::Maximal));
        }
        if let Some((id, particle)) = limit {
            stats.set(StatisticsId::LimitingQuantity, StatValue::Quantity(id));
            stats.set_int(StatisticsId::LimitingParticleIdx, particle as i64);
        }
        Ok((min_step, CriterionId::Derivative))
    }
}

/// dt <= factor sqrt(h / |a|).
struct AccelerationCriterion {
    factor: f64,
}

impl Criterion for AccelerationCriterion {
    fn compute(
        &self,
        storage: &Storage,
        max_dt: f64,
        _stats: &mut Statistics,
    ) -> Result<(f64, CriterionId)> {
        let h = storage.value::<f64>(QuantityId::SmoothingLength)?;
        let a = storage.second_derivative::<Vec3>(QuantityId::Position)?;
        let mut min_step = f64::INFINITY;
        for i in 0..h.len() {
            let accel = a[i].magnitude();
            if accel > 1e-300 {
                min_step = min_step.min(self.factor * (h[i] / accel).sqrt());
            }
        }
        if min_step > max_dt {
            Ok((max_dt, CriterionId::Maximal))
        } else {
            Ok((min_step, CriterionId::Acceleration))
        }
    }
}

/// dt <= factor / |div v|.
struct DivergenceCriterion {
    factor: f64,
}

impl Criterion for DivergenceCriterion {
    fn compute(
        &self,
        storage: &Storage,
        max_dt: f64,
        _stats: &mut Statistics,
    ) -> Result<(f64, CriterionId)> {
        let divv = storage.value::<f64>(QuantityId::VelocityDivergence)?;
        let mut min_step = f64::INFINITY;
        for &d in divv {
            if d.abs() > 1e-300 {
                min_step = min_step.min(self.factor / d.abs());
            }
        }
        if min_step > max_dt {
            Ok((max_dt, CriterionId::Maximal))
        } else {
            Ok((min_step, CriterionId::Divergence))
        }
    }
}

/// All enabled criteria, combined by a generalized mean. The default
/// exponent (negative infinity) selects the plain minimum.
pub struct MultiCriterion {
    criteria: Vec<Box<dyn Criterion>>,
    power: f64,
}

impl MultiCriterion {
    pub fn from_settings(settings: &RunSettings) -> Result<Self> {
        let flags: FlagSet<TimeStepCriterionEnum> =
            settings.get_flags(RunSettingsId::TimesteppingCriterion)?;
        let mut criteria: Vec<Box<dyn Criterion>> = Vec::new();
        if flags.has(TimeStepCriterionEnum::Courant) {
            criteria.push(Box::new(CourantCriterion {
                courant: settings.get(RunSettingsId::TimesteppingCourant)?,
            }));
        }
        if flags.has(TimeStepCriterionEnum::Derivatives) {
            criteria.push(Box::new(DerivativeCriterion {
                factor: settings.get(RunSettingsId::TimesteppingDerivativeFactor)?,
            }));
        }
        if flags.has(TimeStepCriterionEnum::Acceleration) {
            criteria.push(Box::new(AccelerationCriterion {
                factor: settings.get(RunSettingsId::TimesteppingAccelerationFactor)?,
            }));
        }
        if flags.has(TimeStepCriterionEnum::Divergence) {
            criteria.push(Box::new(DivergenceCriterion {
                factor: settings.get(RunSettingsId::TimesteppingDivergenceFactor)?,
            }));
        }
        Ok(Self {
            criteria,
            power: settings.get(RunSettingsId::TimesteppingMeanPower)?,
        })
    }

    pub fn compute(
        &self,
        storage: &Storage,
        max_dt: f64,
        stats: &mut Statistics,
    ) -> Result<(f64, CriterionId)> {
        if self.criteria.is_empty() {
            return Ok((max_dt, CriterionId::Maximal));
        }
        let mut steps = Vec::with_capacity(self.criteria.len());
        let mut min_step = f64::INFINITY;
        let mut min_id = CriterionId::Maximal;
        for criterion in &self.criteria {
            let (step, id) = match criterion.compute(storage, max_dt, stats) {
                Ok(result) => result,
                // a criterion needing a quantity this solver does not
                // carry simply does not restrict the step
                Err(crate::error::Error::MissingQuantity(_)) => (max_dt, CriterionId::Maximal),
                Err(other) => return Err(other),
            };
            steps.push(step);
            if step < min_step {
                min_step = step;
                min_id = id;
            }
        }
        let combined = power_mean(&steps, self.power).min(max_dt);
        Ok((combined, min_id))
    }
}
