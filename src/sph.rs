//! Per-particle SPH derivative evaluation: the equation terms shared by
//! the asymmetric and the symmetric solver.

use lin_alg::f64::Vec3;

use crate::error::Result;
use crate::kernel::SphKernel;
use crate::math::{Interval, SymmetricTensor, TracelessTensor};
use crate::quantity::QuantityId;
use crate::settings::{
    ArtificialViscosityEnum, FlagSet, ForceEnum, RunSettings, RunSettingsId, SmoothingLengthEnum,
};
use crate::storage::Storage;

/// Numerical parameters of the SPH evaluation, read once per run.
#[derive(Clone, Debug)]
pub struct SphConfig {
    pub forces: FlagSet<ForceEnum>,
    pub av_type: ArtificialViscosityEnum,
    pub av_alpha: f64,
    pub av_beta: f64,
    pub av_alpha_range: Interval,
    pub balsara: bool,
    pub smoothing_length: FlagSet<SmoothingLengthEnum>,
    pub neighbour_range: Interval,
    pub neighbour_enforcing: f64,
    pub constant_acceleration: Vec3,
    pub frame_frequency: Vec3,
}

impl SphConfig {
    pub fn from_settings(settings: &RunSettings) -> Result<Self> {
        Ok(Self {
            forces: settings.get_flags(RunSettingsId::SolverForces)?,
            av_type: settings.get(RunSettingsId::SphAvType)?,
            av_alpha: settings.get(RunSettingsId::SphAvAlpha)?,
            av_beta: settings.get(RunSettingsId::SphAvBeta)?,
            av_alpha_range: settings.get(RunSettingsId::SphAvAlphaRange)?,
            balsara: settings.get(RunSettingsId::SphAvBalsara)?,
            smoothing_length: settings.get_flags(RunSettingsId::SphSmoothingLength)?,
            neighbour_range: settings.get(RunSettingsId::SphNeighbourRange)?,
            neighbour_enforcing: settings.get(RunSettingsId::SphNeighbourEnforcing)?,
            constant_acceleration: settings.get(RunSettingsId::SolverConstantAcceleration)?,
            frame_frequency: settings.get(RunSettingsId::FrameAngularFrequency)?,
        })
    }
}

/// Immutable particle state the pair evaluation reads. Effective pressure
/// and stress already include damage and yield reduction.
pub struct SphInput<'a> {
    pub r: &'a [Vec3],
    pub v: &'a [Vec3],
    pub h: &'a [f64],
    pub m: &'a [f64],
    pub rho: &'a [f64],
    pub cs: &'a [f64],
    pub p_eff: &'a [f64],
    pub s_eff: Option<&'a [TracelessTensor]>,
    /// Velocity divergence of the previous step, for the Balsara switch
    /// and the Morris-Monaghan source term.
    pub divv_prev: &'a [f64],
    pub rotv_prev: &'a [f64],
    /// Per-particle alpha of the Morris-Monaghan viscosity.
    pub alpha: Option<&'a [f64]>,
    pub kernel: SphKernel,
    pub config: &'a SphConfig,
}

/// Everything one particle accumulates during the interaction loop.
#[derive(Clone, Copy, Debug)]
pub struct ParticleDerivs {
    pub dv: Vec3,
    pub drho: f64,
    pub du: f64,
    pub divv: f64,
    /// Curl of the velocity field; reduced to its magnitude when stored.
    pub rot_v: Vec3,
    /// Symmetrized velocity gradient, feeding Hooke's law.
    pub grad_v: SymmetricTensor,
    pub neigh_cnt: u32,
}

impl ParticleDerivs {
    pub fn zero() -> Self {
        Self {
            dv: Vec3::new_zero(),
            drho: 0.,
            du: 0.,
            divv: 0.,
            rot_v: Vec3::new_zero(),
            grad_v: SymmetricTensor::null(),
            neigh_cnt: 0,
        }
    }

    pub fn add(&mut self, other: &ParticleDerivs) {
        self.dv += other.dv;
        self.drho += other.drho;
        self.du += other.du;
        self.divv += other.divv;
        self.rot_v += other.rot_v;
        self.grad_v += other.grad_v;
        self.neigh_cnt += other.neigh_cnt;
    }
}

/// Artificial viscosity term Pi_ij; zero for receding particles.
fn artificial_viscosity(input: &SphInput<'_>, i: usize, j: usize, dr: Vec3, dvel: Vec3) -> f64 {
    let projection = dvel.dot(dr);
    if projection >= 0. {
        return 0.;
    }
    let h_bar = 0.5 * (input.h[i] + input.h[j]);
    let rho_bar = 0.5 * (input.rho[i] + input.rho[j]);
    let cs_bar = 0.5 * (input.cs[i] + input.cs[j]);
    let config = input.config;

    let balsara_factor = if config.balsara {
        let factor = |k: usize| {
            let divv = input.divv_prev[k].abs();
            let rotv = input.rotv_prev[k].abs();
            divv / (divv + rotv + 1e-4 * input.cs[k] / input.h[k])
        };
        0.5 * (factor(i) + factor(j))
    } else {
        1.
    };

    let pi = match config.av_type {
        ArtificialViscosityEnum::None => 0.,
        ArtificialViscosityEnum::Standard | ArtificialViscosityEnum::MorrisMonaghan => {
            let mu = h_bar * projection / (dr.magnitude_squared() + 0.01 * h_bar * h_bar);
            // Morris-Monaghan evolves alpha per particle, with beta = 2 alpha
            let (alpha, beta) = match (config.av_type, input.alpha) {
                (ArtificialViscosityEnum::MorrisMonaghan, Some(alpha)) => {
                    let mean = 0.5 * (alpha[i] + alpha[j]);
                    (mean, 2. * mean)
                }
                _ => (config.av_alpha, config.av_beta),
            };
            (-alpha * cs_bar * mu + beta * mu * mu) / rho_bar
        }
        ArtificialViscosityEnum::Riemann => {
            // signal-velocity form by Monaghan (1997)
            let w = projection / dr.magnitude();
            let v_sig = input.cs[i] + input.cs[j] - 3. * w;
            -0.5 * config.av_alpha * v_sig * w / rho_bar
        }
    };
    pi * balsara_factor
}

/// Contribution of the pair (i, j) to the derivatives of particle i. The
/// symmetric solver evaluates the mirrored contribution with swapped roles
/// and the negated gradient; the terms are antisymmetric, so the momentum
/// of the pair cancels exactly.
pub fn eval_pair(input: &SphInput<'_>, i: usize, j: usize, grad: Vec3) -> ParticleDerivs {
    let mut out = ParticleDerivs::zero();
    let dr = input.r[i] - input.r[j];
    let dvel = input.v[i] - input.v[j];
    let m_j = input.m[j];
    let config = input.config;

    out.neigh_cnt = 1;

    // continuity equation
    let projection = dvel.dot(grad);
    out.drho = m_j * projection;
    out.divv = -m_j / input.rho[j] * projection;
    out.rot_v = dvel.cross(grad) * (-m_j / input.rho[j]);

    // symmetrized velocity gradient for the stress evolution
    let outer = SymmetricTensor::new(
        [
            dvel.x * grad.x,
            dvel.y * grad.y,
            dvel.z * grad.z,
        ],
        [
            0.5 * (dvel.x * grad.y + dvel.y * grad.x),
            0.5 * (dvel.x * grad.z + dvel.z * grad.x),
            0.5 * (dvel.y * grad.z + dvel.z * grad.y),
        ],
    );
    out.grad_v += outer * (-m_j / input.rho[j]);

    if config.forces.has(ForceEnum::PressureGradient) {
        let p_term = input.p_eff[i] / (input.rho[i] * input.rho[i])
            + input.p_eff[j] / (input.rho[j] * input.rho[j]);
        let pi = artificial_viscosity(input, i, j, dr, dvel);
        out.dv += grad * (-m_j * (p_term + pi));
        // pressure and viscous heating
        out.du += 0.5 * m_j * (p_term + pi) * projection;
    }

    if config.forces.has(ForceEnum::SolidStress) {
        if let Some(s) = input.s_eff {
            let stress_term = s[i].to_symmetric() * (1. / (input.rho[i] * input.rho[i]))
                + s[j].to_symmetric() * (1. / (input.rho[j] * input.rho[j]));
            out.dv += stress_term.apply(grad) * m_j;
        }
    }

    out
}

/// Body accelerations evaluated once per particle: constant acceleration
/// plus the Coriolis and centrifugal terms of a rotating frame.
pub fn external_acceleration(input: &SphInput<'_>, i: usize) -> Vec3 {
    let config = input.config;
    let mut acc = Vec3::new_zero();
    if config.forces.has(ForceEnum::ConstantAcceleration) {
        acc += config.constant_acceleration;
    }
    if config.forces.has(ForceEnum::Inertial) {
        let omega = config.frame_frequency;
        // centrifugal: -omega x (omega x r), Coriolis: -2 omega x v
        acc += omega.cross(omega.cross(input.r[i])) * -1.;
        acc += omega.cross(input.v[i]) * -2.;
    }
    acc
}

/// Time derivative of the smoothing length of particle i.
pub fn smoothing_length_derivative(input: &SphInput<'_>, i: usize, derivs: &ParticleDerivs) -> f64 {
    let config = input.config;
    let mut dh = 0.;
    if config.smoothing_length.has(SmoothingLengthEnum::ContinuityEquation) {
        dh += input.h[i] / 3. * derivs.divv;
    }
    if config.smoothing_length.has(SmoothingLengthEnum::SoundSpeedEnforcing) {
        // steer the neighbour count back into the allowed range
        let n = derivs.neigh_cnt as f64;
        let range = config.neighbour_range;
        if !range.contains(n) {
            let target = range.clamp(n);
            let response = ((target - n) / range.size().max(1.)).clamp(-1., 1.);
            dh += config.neighbour_enforcing * input.cs[i] * response;
        }
    }
    dh
}

/// Source term of the Morris-Monaghan time-dependent viscosity.
pub fn alpha_derivative(input: &SphInput<'_>, i: usize, derivs: &ParticleDerivs) -> f64 {
    let Some(alpha) = input.alpha else {
        return 0.;
    };
    let config = input.config;
    let alpha_min = config.av_alpha_range.lower();
    let alpha_max = config.av_alpha_range.upper();
    let tau = input.h[i] / (0.2 * input.cs[i].max(1e-12));
    let source = (-derivs.divv).max(0.) * (alpha_max - alpha[i]);
    -(alpha[i] - alpha_min) / tau + source
}

/// Writes the accumulated derivatives into the storage buffers. Called
/// once per step, after the interaction loop finished.
pub fn store_derivatives(
    storage: &mut Storage,
    input_config: &SphConfig,
    derivs: &[ParticleDerivs],
    dh: &[f64],
    dalpha: Option<&[f64]>,
    shear_modulus: &[f64],
) -> Result<()> {
    let n = derivs.len();
    {
        let buffers = storage.all_buffers_mut::<Vec3>(QuantityId::Position)?;
        for i in 0..n {
            buffers.d2t[i] += derivs[i].dv;
        }
    }
    {
        let drho = storage.derivative_mut::<f64>(QuantityId::Density)?;
        for i in 0..n {
            drho[i] += derivs[i].drho;
        }
    }
    {
        let du = storage.derivative_mut::<f64>(QuantityId::Energy)?;
        for i in 0..n {
            du[i] += derivs[i].du;
        }
    }
    {
        let dh_out = storage.derivative_mut::<f64>(QuantityId::SmoothingLength)?;
        dh_out.copy_from_slice(dh);
    }
    {
        let divv = storage.value_mut::<f64>(QuantityId::VelocityDivergence)?;
        for i in 0..n {
            divv[i] = derivs[i].divv;
        }
    }
    {
        let rotv = storage.value_mut::<f64>(QuantityId::VelocityRotation)?;
        for i in 0..n {
            rotv[i] = derivs[i].rot_v.magnitude();
        }
    }
    {
        let neigh = storage.value_mut::<u32>(QuantityId::NeighbourCnt)?;
        for i in 0..n {
            neigh[i] = derivs[i].neigh_cnt;
        }
    }
    if input_config.forces.has(ForceEnum::SolidStress) && storage.has(QuantityId::DeviatoricStress)
    {
        // Hooke's law: dS/dt = 2 mu (eps - tr(eps)/3)
        let ds = storage.derivative_mut::<TracelessTensor>(QuantityId::DeviatoricStress)?;
        for i in 0..n {
            let deviatoric = TracelessTensor::from_symmetric(&derivs[i].grad_v);
            ds[i] += deviatoric * (2. * shear_modulus[i]);
        }
    }
    if let Some(dalpha) = dalpha {
        if storage.has(QuantityId::AvAlpha) {
            let out = storage.derivative_mut::<f64>(QuantityId::AvAlpha)?;
            out.copy_from_slice(dalpha);
        }
    }
    Ok(())
}
