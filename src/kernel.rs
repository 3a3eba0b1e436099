//! SPH smoothing kernels.

use lin_alg::f64::Vec3;

use crate::error::{Error, Result};
use crate::settings::{KernelEnum, RunSettings, RunSettingsId};

/// Radially symmetric smoothing kernel. `value` and `grad` take the
/// distance and the smoothing length; `grad` is the radial derivative
/// dW/dr, always non-positive.
#[derive(Clone, Copy, Debug)]
pub enum SphKernel {
    /// M4 B-spline (piecewise cubic polynomial), support 2h.
    CubicSpline,
    /// M5 B-spline (piecewise 4th-order polynomial), support 2.5h.
    FourthOrderSpline,
}

impl SphKernel {
    pub fn from_settings(settings: &RunSettings) -> Result<Self> {
        match settings.get::<KernelEnum>(RunSettingsId::SphKernel)? {
            KernelEnum::CubicSpline => Ok(Self::CubicSpline),
            KernelEnum::FourthOrderSpline => Ok(Self::FourthOrderSpline),
            KernelEnum::CoreTriangle => Err(Error::NotImplemented("core triangle kernel")),
        }
    }

    /// Dimensionless support radius; the kernel is zero beyond
    /// radius() * h.
    pub fn radius(&self) -> f64 {
        match self {
            Self::CubicSpline => 2.,
            Self::FourthOrderSpline => 2.5,
        }
    }

    pub fn value(&self, r: f64, h: f64) -> f64 {
        debug_assert!(h > 0.);
        let q = r / h;
        let sigma = self.normalization() / (h * h * h);
        sigma * self.shape(q)
    }

    /// Radial derivative dW/dr.
    pub fn grad(&self, r: f64, h: f64) -> f64 {
        debug_assert!(h > 0.);
        let q = r / h;
        let sigma = self.normalization() / (h * h * h * h);
        sigma * self.shape_derivative(q)
    }

    /// Kernel gradient vector at separation `dr` with symmetrized
    /// smoothing length.
    pub fn grad_vec(&self, dr: Vec3, h: f64) -> Vec3 {
        let r = dr.magnitude();
        if r == 0. {
            return Vec3::new_zero();
        }
        dr * (self.grad(r, h) / r)
    }

    fn normalization(&self) -> f64 {
        use std::f64::consts::PI;
        match self {
            Self::CubicSpline => 1. / PI,
            Self::FourthOrderSpline => 96. / (1199. * PI),
        }
    }

    fn shape(&self, q: f64) -> f64 {
        match self {
            Self::CubicSpline => {
                if q < 1. {
                    1. - 1.5 * q * q + 0.75 * q * q * q
                } else if q < 2. {
                    0.25 * (2. - q).powi(3)
                } else {
                    0.
                }
            }
            Self::FourthOrderSpline => {
                // piecewise quartic with knots at 0.5, 1.5 and 2.5
                let v = |x: f64| x.max(0.).powi(4);
                if q < 2.5 {
                    v(2.5 - q) - 5. * v(1.5 - q) + 10. * v(0.5 - q)
                } else {
                    0.
                }
            }
        }
    }

    fn shape_derivative(&self, q: f64) -> f64 {
        match self {
            Self::CubicSpline => {
                if q < 1. {
                    -3. * q + 2.25 * q * q
                } else if q < 2. {
                    -0.75 * (2. - q).powi(2)
                } else {
                    0.
                }
            }
            Self::FourthOrderSpline => {
                let v = |x: f64| x.max(0.).powi(3);
                if q < 2.5 {
                    -4. * (v(2.5 - q) - 5. * v(1.5 - q) + 10. * v(0.5 - q))
                } else {
                    0.
                }
            }
        }
    }
}
