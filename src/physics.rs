//! Equations of state and rheology of the material.
//!
//! Only the interface matters to the solver: given density and specific
//! energy, produce pressure and sound speed; given the stress state, yield
//! and damage the material. The concrete models are the usual suspects of
//! impact modelling.

use crate::error::{Error, Result};
use crate::settings::{BodySettings, BodySettingsId, EosEnum, YieldingEnum};

/// Equation of state: maps (density, specific energy) to (pressure, sound
/// speed).
pub trait Eos: Send + Sync {
    fn evaluate(&self, density: f64, energy: f64) -> (f64, f64);
}

/// Ideal gas, p = (gamma - 1) rho u.
pub struct IdealGasEos {
    gamma: f64,
}

impl IdealGasEos {
    pub fn new(gamma: f64) -> Self {
        assert!(gamma > 1.);
        Self { gamma }
    }
}

impl Eos for IdealGasEos {
    fn evaluate(&self, density: f64, energy: f64) -> (f64, f64) {
        let p = (self.gamma - 1.) * density * energy;
        let cs = (self.gamma * p.max(0.) / density).sqrt();
        (p, cs)
    }
}

/// Tillotson (1962) equation of state with the usual compressed, expanded
/// and interpolated regimes.
pub struct TillotsonEos {
    rho0: f64,
    a: f64,
    b: f64,
    big_a: f64,
    big_b: f64,
    alpha: f64,
    beta: f64,
    u0: f64,
    u_iv: f64,
    u_cv: f64,
}

impl TillotsonEos {
    pub fn from_settings(body: &BodySettings) -> Result<Self> {
        Ok(Self {
            rho0: body.get(BodySettingsId::Density)?,
            a: body.get(BodySettingsId::TillotsonSmallA)?,
            b: body.get(BodySettingsId::TillotsonSmallB)?,
            big_a: body.get(BodySettingsId::BulkModulus)?,
            big_b: body.get(BodySettingsId::TillotsonNonlinearB)?,
            alpha: body.get(BodySettingsId::TillotsonAlpha)?,
            beta: body.get(BodySettingsId::TillotsonBeta)?,
            u0: body.get(BodySettingsId::TillotsonEnergy)?,
            u_iv: body.get(BodySettingsId::TillotsonEnergyIv)?,
            u_cv: body.get(BodySettingsId::TillotsonEnergyCv)?,
        })
    }

    fn compressed(&self, density: f64, energy: f64) -> f64 {
        let eta = density / self.rho0;
        let mu = eta - 1.;
        let omega = energy / (self.u0 * eta * eta) + 1.;
        (self.a + self.b / omega) * density * energy + self.big_a * mu + self.big_b * mu * mu
    }

    fn expanded(&self, density: f64, energy: f64) -> f64 {
        let eta = density / self.rho0;
        let mu = eta - 1.;
        let omega = energy / (self.u0 * eta * eta) + 1.;
        let x = self.rho0 / density - 1.;
        self.a * density * energy
            + (self.b * density * energy / omega + self.big_a * mu * (-self.beta * x).exp())
                * (-self.alpha * x * x).exp()
    }
}

impl Eos for TillotsonEos {
    fn evaluate(&self, density: f64, energy: f64) -> (f64, f64) {
        let eta = density / self.rho0;
        let p = if eta >= 1. || energy < self.u_iv {
            self.compressed(density, energy)
        } else if energy > self.u_cv {
            self.expanded(density, energy)
        } else {
            // partial vaporization, interpolate between the regimes
            let pc = self.compressed(density, energy);
            let pe = self.expanded(density, energy);
            (pc * (self.u_cv - energy) + pe * (energy - self.u_iv)) / (self.u_cv - self.u_iv)
        };
        // bulk estimate of the sound speed; floored so the Courant
        // criterion stays finite even deep in tension
        let cs_sq = (self.big_a / self.rho0).max(p.abs() / density);
        (p, cs_sq.sqrt())
    }
}

/// Creates the equation of state selected in the body settings.
pub fn create_eos(body: &BodySettings) -> Result<Box<dyn Eos>> {
    match body.get::<EosEnum>(BodySettingsId::Eos)? {
        EosEnum::IdealGas => Ok(Box::new(IdealGasEos::new(
            body.get(BodySettingsId::AdiabaticIndex)?,
        ))),
        EosEnum::Tillotson => Ok(Box::new(TillotsonEos::from_settings(body)?)),
        EosEnum::Aneos => Err(Error::NotImplemented("ANEOS equation of state")),
    }
}

/// Plastic yielding; returns the factor the deviatoric stress is scaled
/// by, in [0, 1].
pub fn yield_reduction(
    yielding: YieldingEnum,
    stress_invariant: f64,
    elasticity_limit: f64,
    damage: f64,
) -> f64 {
    match yielding {
        YieldingEnum::None => 1.,
        YieldingEnum::VonMises => {
            // von Mises criterion with the yield stress reduced by damage
            let limit = elasticity_limit * (1. - damage).max(0.);
            if limit <= 0. {
                return 0.;
            }
            let j2 = stress_invariant;
            if j2 <= 0. {
                return 1.;
            }
            (limit / (3. * j2).sqrt()).min(1.)
        }
    }
}
