//! Derivative solvers: asymmetric and symmetric SPH, the gravity-only
//! N-body solver and the stabilization wrapper.

use std::sync::Arc;

use lin_alg::f64::Vec3;

use crate::aggregate::AggregateHolder;
use crate::collision::{self, CollisionConfig};
use crate::error::Result;
use crate::finder::{create_finder, NeighbourFinder};
use crate::gravity::{create_gravity, Gravity};
use crate::kernel::SphKernel;
use crate::math::{Interval, TracelessTensor};
use crate::physics::{create_eos, yield_reduction, Eos};
use crate::quantity::{OrderEnum, QuantityId};
use crate::scheduler::Scheduler;
use crate::settings::{
    AggregateEnum, ArtificialViscosityEnum, BodySettingsId, DamageEnum, ForceEnum, RunSettings,
    RunSettingsId, SolverEnum, YieldingEnum,
};
use crate::sph::{
    self, external_acceleration, eval_pair, ParticleDerivs, SphConfig, SphInput,
};
use crate::stats::{MinMaxMean, StatValue, Statistics, StatisticsId};
use crate::storage::Storage;

/// Computes time derivatives of all advected quantities from the current
/// values. Deterministic given identical inputs.
pub trait Solver: Send {
    /// Allocates the quantities this solver needs on top of what the
    /// initial conditions created.
    fn create(&mut self, storage: &mut Storage) -> Result<()>;

    fn integrate(&mut self, storage: &mut Storage, stats: &mut Statistics) -> Result<()>;

    /// Optional collision hook, invoked after the state was advanced.
    fn collide(
        &mut self,
        _storage: &mut Storage,
        _stats: &mut Statistics,
        _dt: f64,
    ) -> Result<()> {
        Ok(())
    }
}

/// Creates the solver selected in settings.
pub fn create_solver(settings: &RunSettings, scheduler: Arc<Scheduler>) -> Result<Box<dyn Solver>> {
    match settings.get::<SolverEnum>(RunSettingsId::SolverType)? {
        SolverEnum::Asymmetric => Ok(Box::new(SphSolver::new(settings, scheduler, false)?)),
        SolverEnum::Symmetric => Ok(Box::new(SphSolver::new(settings, scheduler, true)?)),
        SolverEnum::NBody => Ok(Box::new(NBodySolver::new(settings, scheduler)?)),
    }
}

/// SPH solver. In the asymmetric mode each particle accumulates only its
/// own derivatives, making the loop trivially parallel; the symmetric mode
/// evaluates each pair once into per-thread buffers that are merged
/// serially, conserving momentum pairwise.
pub struct SphSolver {
    scheduler: Arc<Scheduler>,
    config: SphConfig,
    kernel: SphKernel,
    finder: Box<dyn NeighbourFinder>,
    gravity: Option<Box<dyn Gravity>>,
    gravity_constant: f64,
    symmetric: bool,
    /// Equation of state per material partition, filled in `create`.
    eos: Vec<Box<dyn Eos>>,
}

impl SphSolver {
    pub fn new(settings: &RunSettings, scheduler: Arc<Scheduler>, symmetric: bool) -> Result<Self> {
        let config = SphConfig::from_settings(settings)?;
        let gravity = if config.forces.has(ForceEnum::SelfGravity) {
            Some(create_gravity(settings)?)
        } else {
            None
        };
        Ok(Self {
            scheduler,
            config,
            kernel: SphKernel::from_settings(settings)?,
            finder: create_finder(settings)?,
            gravity,
            gravity_constant: settings.get(RunSettingsId::GravityConstant)?,
            symmetric,
            eos: Vec::new(),
        })
    }

    fn create_material_quantities(&self, storage: &mut Storage, mat_id: usize) -> Result<()> {
        let mat = storage.material(mat_id);
        let settings = mat.settings.clone();
        let (start, end) = (mat.start, mat.end);

        if self.config.forces.has(ForceEnum::SolidStress) {
            if !storage.has(QuantityId::DeviatoricStress) {
                let initial: TracelessTensor = settings.get(BodySettingsId::StressTensor)?;
                storage.insert_uniform(QuantityId::DeviatoricStress, OrderEnum::First, initial)?;
            }
            let s = storage.value_mut::<TracelessTensor>(QuantityId::DeviatoricStress)?;
            let initial: TracelessTensor = settings.get(BodySettingsId::StressTensor)?;
            for item in s.iter_mut().take(end).skip(start) {
                *item = initial;
            }
            storage.set_range(
                QuantityId::DeviatoricStress,
                Interval::unbounded(),
                settings.get(BodySettingsId::StressTensorMin)?,
            )?;
        }

        let damage_model: DamageEnum = settings.get(BodySettingsId::RheologyDamage)?;
        if damage_model != DamageEnum::None || storage.has(QuantityId::Damage) {
            if !storage.has(QuantityId::Damage) {
                storage.insert_uniform(QuantityId::Damage, OrderEnum::First, 0.)?;
            }
            let initial: f64 = settings.get(BodySettingsId::Damage)?;
            let d = storage.value_mut::<f64>(QuantityId::Damage)?;
            for item in d.iter_mut().take(end).skip(start) {
                *item = initial;
            }
            storage.set_range(
                QuantityId::Damage,
                settings.get(BodySettingsId::DamageRange)?,
                settings.get(BodySettingsId::DamageMin)?,
            )?;
        }

        storage.set_range(
            QuantityId::Density,
            settings.get(BodySettingsId::DensityRange)?,
            settings.get(BodySettingsId::DensityMin)?,
        )?;
        storage.set_range(
            QuantityId::Energy,
            settings.get(BodySettingsId::EnergyRange)?,
            settings.get(BodySettingsId::EnergyMin)?,
        )?;
        Ok(())
    }

    /// Evaluates the equation of state and the rheology for all particles,
    /// producing the effective pressure and stress used by the force loop.
    #[allow(clippy::type_complexity)]
    fn initialize_materials(
        &self,
        storage: &mut Storage,
    ) -> Result<(Vec<f64>, Option<Vec<TracelessTensor>>, Vec<f64>)> {
        let n = storage.particle_cnt();
        let rho = storage.value::<f64>(QuantityId::Density)?.to_vec();
        let u = storage.value::<f64>(QuantityId::Energy)?.to_vec();
        let damage = if storage.has(QuantityId::Damage) {
            storage.value::<f64>(QuantityId::Damage)?.to_vec()
        } else {
            vec![0.; n]
        };
        let stress = if storage.has(QuantityId::DeviatoricStress) {
            Some(storage.value::<TracelessTensor>(QuantityId::DeviatoricStress)?.to_vec())
        } else {
            None
        };

        let mut pressure = vec![0.; n];
        let mut sound_speed = vec![0.; n];
        let mut p_eff = vec![0.; n];
        let mut s_eff = stress.as_ref().map(|_| vec![TracelessTensor::null(); n]);
        let mut shear = vec![0.; n];
        let mut reduction = vec![1.; n];

        for (mat_id, eos) in self.eos.iter().enumerate() {
            let mat = storage.material(mat_id);
            let yielding: YieldingEnum = mat.settings.get(BodySettingsId::RheologyYielding)?;
            let limit: f64 = mat.settings.get(BodySettingsId::ElasticityLimit)?;
            let mu: f64 = mat.settings.get(BodySettingsId::ShearModulus)?;
            for i in mat.start..mat.end {
                let (p, cs) = eos.evaluate(rho[i], u[i]);
                pressure[i] = p;
                sound_speed[i] = cs;
                shear[i] = mu;
                // damage reduces tensile pressure and the deviatoric stress
                p_eff[i] = if p < 0. { p * (1. - damage[i]) } else { p };
                if let (Some(stress), Some(s_eff)) = (&stress, &mut s_eff) {
                    let factor =
                        yield_reduction(yielding, stress[i].second_invariant(), limit, damage[i]);
                    reduction[i] = factor;
                    s_eff[i] = stress[i] * (factor * (1. - damage[i]));
                }
            }
        }

        storage
            .value_mut::<f64>(QuantityId::Pressure)?
            .copy_from_slice(&pressure);
        storage
            .value_mut::<f64>(QuantityId::SoundSpeed)?
            .copy_from_slice(&sound_speed);
        if storage.has(QuantityId::YieldReduction) {
            storage
                .value_mut::<f64>(QuantityId::YieldReduction)?
                .copy_from_slice(&reduction);
        }
        Ok((p_eff, s_eff, shear))
    }
}

impl Solver for SphSolver {
    fn create(&mut self, storage: &mut Storage) -> Result<()> {
        storage.insert_uniform(QuantityId::Pressure, OrderEnum::Zero, 0.)?;
        storage.insert_uniform(QuantityId::SoundSpeed, OrderEnum::Zero, 0.)?;
        storage.insert_uniform(QuantityId::NeighbourCnt, OrderEnum::Zero, 0u32)?;
        storage.insert_uniform(QuantityId::VelocityDivergence, OrderEnum::Zero, 0.)?;
        storage.insert_uniform(QuantityId::VelocityRotation, OrderEnum::Zero, 0.)?;
        storage.insert_uniform(QuantityId::YieldReduction, OrderEnum::Zero, 1.)?;
        if self.config.av_type == ArtificialViscosityEnum::MorrisMonaghan {
            storage.insert_uniform(
                QuantityId::AvAlpha,
                OrderEnum::First,
                self.config.av_alpha_range.upper(),
            )?;
            storage.set_range(QuantityId::AvAlpha, self.config.av_alpha_range, 1e-3)?;
        }

        self.eos.clear();
        for mat_id in 0..storage.material_cnt() {
            self.create_material_quantities(storage, mat_id)?;
            let eos = create_eos(&storage.material(mat_id).settings)?;
            self.eos.push(eos);
        }
        Ok(())
    }

    fn integrate(&mut self, storage: &mut Storage, stats: &mut Statistics) -> Result<()> {
        let n = storage.particle_cnt();
        if n == 0 {
            return Ok(());
        }
        if self.config.forces.has(ForceEnum::SurfaceTension) {
            return Err(crate::error::Error::NotImplemented("surface tension"));
        }

        let (p_eff, s_eff, shear) = self.initialize_materials(storage)?;

        // gravity over the current positions
        if let Some(gravity) = &mut self.gravity {
            let r = storage.value::<Vec3>(QuantityId::Position)?;
            let m = storage.value::<f64>(QuantityId::Mass)?;
            gravity.build(r, m);
        }

        let r_owned = storage.value::<Vec3>(QuantityId::Position)?.to_vec();
        self.finder.build(&r_owned);

        {
            let input = SphInput {
                r: storage.value::<Vec3>(QuantityId::Position)?,
                v: storage.derivative::<Vec3>(QuantityId::Position)?,
                h: storage.value::<f64>(QuantityId::SmoothingLength)?,
                m: storage.value::<f64>(QuantityId::Mass)?,
                rho: storage.value::<f64>(QuantityId::Density)?,
                cs: storage.value::<f64>(QuantityId::SoundSpeed)?,
                p_eff: &p_eff,
                s_eff: s_eff.as_deref(),
                divv_prev: storage.value::<f64>(QuantityId::VelocityDivergence)?,
                rotv_prev: storage.value::<f64>(QuantityId::VelocityRotation)?,
                alpha: if storage.has(QuantityId::AvAlpha) {
                    Some(storage.value::<f64>(QuantityId::AvAlpha)?)
                } else {
                    None
                },
                kernel: self.kernel,
                config: &self.config,
            };

            let h_max = input.h.iter().cloned().fold(0., f64::max);
            let search_radius = self.kernel.radius() * h_max;
            let finder = &*self.finder;
            let gravity = self.gravity.as_deref();
            let abort = self.scheduler.abort_flag();

            let eval_particle = |i: usize, mirror: bool| {
                let mut acc = ParticleDerivs::zero();
                if abort.load(std::sync::atomic::Ordering::Relaxed) {
                    return Vec::new();
                }
                let mut contributions = Vec::new();
                let neighs = finder.find(input.r[i], search_radius);
                for neigh in neighs {
                    let j = neigh.index;
                    if j == i {
                        continue;
                    }
                    if mirror && j > i {
                        // each pair is evaluated once in the symmetric mode
                        continue;
                    }
                    let h_bar = 0.5 * (input.h[i] + input.h[j]);
                    if neigh.dist_sq >= (self.kernel.radius() * h_bar).powi(2) {
                        // within the search radius but not an actual neighbour
                        continue;
                    }
                    let grad = self.kernel.grad_vec(input.r[i] - input.r[j], h_bar);
                    acc.add(&eval_pair(&input, i, j, grad));
                    if mirror {
                        contributions.push((j, eval_pair(&input, j, i, grad * -1.)));
                    }
                }
                contributions.push((i, acc));
                contributions
            };

            let derivs = if self.symmetric {
                // per-thread buffers, merged serially after the loop
                self.scheduler.fold_reduce(
                    n,
                    || vec![ParticleDerivs::zero(); n],
                    |mut buffer, i| {
                        for (k, contribution) in eval_particle(i, true) {
                            buffer[k].add(&contribution);
                        }
                        buffer
                    },
                    |mut a, b| {
                        for (acc, item) in a.iter_mut().zip(&b) {
                            acc.add(item);
                        }
                        a
                    },
                )
            } else {
                self.scheduler.map_collect(n, |i| {
                    eval_particle(i, false)
                        .pop()
                        .map(|(_, acc)| acc)
                        .unwrap_or_else(ParticleDerivs::zero)
                })
            };

            let mut derivs = derivs;
            // external and gravitational accelerations, evaluated per
            // particle outside the pair loop
            for (i, item) in derivs.iter_mut().enumerate() {
                item.dv += external_acceleration(&input, i);
                if let Some(gravity) = gravity {
                    item.dv += gravity.eval(input.r[i], Some(i));
                }
                for attractor in storage.attractors() {
                    let diff = attractor.position - input.r[i];
                    let dist_sq = diff.magnitude_squared();
                    if dist_sq > 0. {
                        item.dv += diff
                            * (self.gravity_constant * attractor.mass
                                / (dist_sq * dist_sq.sqrt()));
                    }
                }
            }

            let dh = (0..n)
                .map(|i| sph::smoothing_length_derivative(&input, i, &derivs[i]))
                .collect::<Vec<_>>();
            let dalpha = input.alpha.is_some().then(|| {
                (0..n)
                    .map(|i| sph::alpha_derivative(&input, i, &derivs[i]))
                    .collect::<Vec<f64>>()
            });

            let mut neigh_stats = MinMaxMean::new();
            for item in &derivs {
                neigh_stats.accumulate(item.neigh_cnt as f64);
            }
            stats.set(StatisticsId::NeighbourCount, StatValue::Means(neigh_stats));

            sph::store_derivatives(storage, &self.config, &derivs, &dh, dalpha.as_deref(), &shear)?;
        }
        Ok(())
    }
}

/// N-body solver: no SPH derivatives, acceleration is purely
/// gravitational. Gravity may be cached and reused for several steps
/// within the configured recomputation period.
pub struct NBodySolver {
    scheduler: Arc<Scheduler>,
    gravity: Box<dyn Gravity>,
    gravity_constant: f64,
    recompute_period: f64,
    cached_accel: Vec<Vec3>,
    last_eval_time: Option<f64>,
    collision_config: CollisionConfig,
    aggregates_enabled: bool,
    aggregates_source: AggregateEnum,
}

impl NBodySolver {
    pub fn new(settings: &RunSettings, scheduler: Arc<Scheduler>) -> Result<Self> {
        Ok(Self {
            scheduler,
            gravity: create_gravity(settings)?,
            gravity_constant: settings.get(RunSettingsId::GravityConstant)?,
            recompute_period: settings.get(RunSettingsId::GravityRecomputationPeriod)?,
            cached_accel: Vec::new(),
            last_eval_time: None,
            collision_config: CollisionConfig::from_settings(settings)?,
            aggregates_enabled: settings.get(RunSettingsId::NbodyAggregatesEnable)?,
            aggregates_source: settings.get(RunSettingsId::NbodyAggregatesSource)?,
        })
    }
}

impl Solver for NBodySolver {
    fn create(&mut self, storage: &mut Storage) -> Result<()> {
        storage.insert_uniform(QuantityId::AngularVelocity, OrderEnum::Zero, Vec3::new_zero())?;
        if self.aggregates_enabled && !storage.has_user_data() {
            let holder = AggregateHolder::new(storage, self.aggregates_source);
            storage.set_user_data(holder);
        }
        Ok(())
    }

    fn integrate(&mut self, storage: &mut Storage, stats: &mut Statistics) -> Result<()> {
        let n = storage.particle_cnt();
        if n == 0 {
            return Ok(());
        }
        let time = stats.get_float(StatisticsId::RunTime).unwrap_or(0.);
        let recompute = match self.last_eval_time {
            Some(last) => {
                self.cached_accel.len() != n
                    || self.recompute_period <= 0.
                    || time - last >= self.recompute_period
            }
            None => true,
        };
        if recompute {
            let r = storage.value::<Vec3>(QuantityId::Position)?;
            let m = storage.value::<f64>(QuantityId::Mass)?;
            self.gravity.build(r, m);
            self.cached_accel = self.gravity.eval_all(&self.scheduler, r);
            // attractors contribute on top of self-gravity
            for (i, acc) in self.cached_accel.iter_mut().enumerate() {
                for attractor in storage.attractors() {
                    let diff = attractor.position - r[i];
                    let dist_sq = diff.magnitude_squared();
                    if dist_sq > 0. {
                        *acc += diff
                            * (self.gravity_constant * attractor.mass
                                / (dist_sq * dist_sq.sqrt()));
                    }
                }
            }
            self.last_eval_time = Some(time);
        }

        let buffers = storage.positions_mut()?;
        buffers.dv.copy_from_slice(&self.cached_accel);

        if self.aggregates_enabled {
            if let Some(holder) = storage.take_user_data::<AggregateHolder>() {
                holder.integrate(storage)?;
                stats.set_int(StatisticsId::AggregateCount, holder.count() as i64);
                storage.set_user_data(*holder);
            }
        }
        Ok(())
    }

    fn collide(&mut self, storage: &mut Storage, stats: &mut Statistics, dt: f64) -> Result<()> {
        collision::handle_collisions(storage, stats, dt, &self.collision_config)?;
        // removal may have invalidated the cached accelerations
        if storage.particle_cnt() != self.cached_accel.len() {
            self.last_eval_time = None;
        }
        Ok(())
    }
}

/// Decorator damping particle velocities towards the rigid-body motion of
/// the whole body; used in the stabilization phase to settle a body into
/// equilibrium before the impact.
pub struct StabilizationSolver {
    inner: Box<dyn Solver>,
    damping: f64,
    time_range: Interval,
}

impl StabilizationSolver {
    pub fn new(inner: Box<dyn Solver>, settings: &RunSettings) -> Result<Self> {
        Ok(Self {
            inner,
            damping: settings.get(RunSettingsId::StabilizationDamping)?,
            time_range: settings.get(RunSettingsId::RunTimeRange)?,
        })
    }
}

impl Solver for StabilizationSolver {
    fn create(&mut self, storage: &mut Storage) -> Result<()> {
        self.inner.create(storage)
    }

    fn integrate(&mut self, storage: &mut Storage, stats: &mut Statistics) -> Result<()> {
        self.inner.integrate(storage, stats)?;

        let time = stats.get_float(StatisticsId::RunTime).unwrap_or(0.);
        let duration = self.time_range.size().max(1e-12);
        let remaining = (self.time_range.upper() - time).clamp(0., duration);
        // decays to 1 as the phase approaches its end
        let factor = (1. - self.damping * remaining / duration).clamp(0., 1.);

        let m = storage.value::<f64>(QuantityId::Mass)?.to_vec();
        {
            let buffers = storage.positions_mut()?;
            let r = &*buffers.r;
            let v = &mut *buffers.v;

            // rigid-body co-moving velocity: translation of the center of
            // mass plus bulk rotation from the angular momentum integral
            let mut m_total = 0.;
            let mut r_com = Vec3::new_zero();
            let mut v_com = Vec3::new_zero();
            for i in 0..m.len() {
                m_total += m[i];
                r_com += r[i] * m[i];
                v_com += v[i] * m[i];
            }
            r_com = r_com / m_total;
            v_com = v_com / m_total;

            let mut angular = Vec3::new_zero();
            let mut inertia = crate::math::SymmetricTensor::null();
            for i in 0..m.len() {
                let dr = r[i] - r_com;
                angular += dr.cross(v[i] - v_com) * m[i];
                inertia += (crate::math::SymmetricTensor::identity() * dr.magnitude_squared()
                    - crate::math::SymmetricTensor::outer(dr))
                    * m[i];
            }
            let omega = if inertia.determinant() != 0. {
                inertia.inverse().apply(angular)
            } else {
                Vec3::new_zero()
            };

            for i in 0..m.len() {
                let rigid = v_com + omega.cross(r[i] - r_com);
                v[i] = rigid + (v[i] - rigid) * factor;
            }
        }

        // the body must stay pristine during stabilization
        if storage.has(QuantityId::Damage) {
            storage.value_mut::<f64>(QuantityId::Damage)?.fill(0.);
            storage
                .derivative_mut::<f64>(QuantityId::Damage)?
                .fill(0.);
        }
        if storage.has(QuantityId::YieldReduction) {
            storage.value_mut::<f64>(QuantityId::YieldReduction)?.fill(1.);
        }
        Ok(())
    }

    fn collide(&mut self, storage: &mut Storage, stats: &mut Statistics, dt: f64) -> Result<()> {
        self.inner.collide(storage, stats, dt)
    }
}
