//! Intervals, symmetric tensors and the small amount of linear algebra the
//! engine needs beyond plain vectors.

use bincode::{Decode, Encode};
use lin_alg::f64::Vec3;

/// Closed interval of reals; either bound may be infinite.
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode)]
pub struct Interval {
    lower: f64,
    upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Interval containing all reals. Clamping to it is a no-op.
    pub const fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.max(self.lower).min(self.upper)
    }

    pub fn size(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower == f64::NEG_INFINITY && self.upper == f64::INFINITY
    }
}

/// Symmetric 3x3 tensor, stored as the diagonal and the three independent
/// off-diagonal components (xy, xz, yz).
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode)]
pub struct SymmetricTensor {
    pub diag: [f64; 3],
    pub off: [f64; 3],
}

impl SymmetricTensor {
    pub const fn null() -> Self {
        Self {
            diag: [0.; 3],
            off: [0.; 3],
        }
    }

    pub const fn identity() -> Self {
        Self {
            diag: [1.; 3],
            off: [0.; 3],
        }
    }

    pub fn new(diag: [f64; 3], off: [f64; 3]) -> Self {
        Self { diag, off }
    }

    /// Symmetric outer product v ⊗ v.
    pub fn outer(v: Vec3) -> Self {
        Self {
            diag: [v.x * v.x, v.y * v.y, v.z * v.z],
            off: [v.x * v.y, v.x * v.z, v.y * v.z],
        }
    }

    /// Component at row i, column j; the tensor is symmetric, so the order
    /// of the indices does not matter.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        match (i.min(j), i.max(j)) {
            (0, 0) => self.diag[0],
            (1, 1) => self.diag[1],
            (2, 2) => self.diag[2],
            (0, 1) => self.off[0],
            (0, 2) => self.off[1],
            (1, 2) => self.off[2],
            _ => panic!("tensor index out of range"),
        }
    }

    pub fn trace(&self) -> f64 {
        self.diag[0] + self.diag[1] + self.diag[2]
    }

    pub fn determinant(&self) -> f64 {
        let [xx, yy, zz] = self.diag;
        let [xy, xz, yz] = self.off;
        xx * (yy * zz - yz * yz) - xy * (xy * zz - yz * xz) + xz * (xy * yz - yy * xz)
    }

    /// Inverse of the tensor; the caller must check the determinant is
    /// nonzero first.
    pub fn inverse(&self) -> Self {
        let det = self.determinant();
        assert!(det != 0., "inverting a singular tensor");
        let [xx, yy, zz] = self.diag;
        let [xy, xz, yz] = self.off;
        let inv = 1. / det;
        Self {
            diag: [
                (yy * zz - yz * yz) * inv,
                (xx * zz - xz * xz) * inv,
                (xx * yy - xy * xy) * inv,
            ],
            off: [
                (xz * yz - xy * zz) * inv,
                (xy * yz - xz * yy) * inv,
                (xy * xz - xx * yz) * inv,
            ],
        }
    }

    /// Matrix-vector product.
    pub fn apply(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.diag[0] * v.x + self.off[0] * v.y + self.off[1] * v.z,
            self.off[0] * v.x + self.diag[1] * v.y + self.off[2] * v.z,
            self.off[1] * v.x + self.off[2] * v.y + self.diag[2] * v.z,
        )
    }

    /// Double-dot product A : B.
    pub fn ddot(&self, other: &Self) -> f64 {
        self.diag[0] * other.diag[0]
            + self.diag[1] * other.diag[1]
            + self.diag[2] * other.diag[2]
            + 2. * (self.off[0] * other.off[0]
                + self.off[1] * other.off[1]
                + self.off[2] * other.off[2])
    }
}

impl std::ops::Add for SymmetricTensor {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self {
            diag: [
                self.diag[0] + o.diag[0],
                self.diag[1] + o.diag[1],
                self.diag[2] + o.diag[2],
            ],
            off: [
                self.off[0] + o.off[0],
                self.off[1] + o.off[1],
                self.off[2] + o.off[2],
            ],
        }
    }
}

impl std::ops::AddAssign for SymmetricTensor {
    fn add_assign(&mut self, o: Self) {
        *self = *self + o;
    }
}

impl std::ops::Sub for SymmetricTensor {
    type Output = Self;
    fn sub(self, o: Self) -> Self {
        self + o * -1.
    }
}

impl std::ops::Mul<f64> for SymmetricTensor {
    type Output = Self;
    fn mul(self, s: f64) -> Self {
        Self {
            diag: [self.diag[0] * s, self.diag[1] * s, self.diag[2] * s],
            off: [self.off[0] * s, self.off[1] * s, self.off[2] * s],
        }
    }
}

/// Traceless symmetric 3x3 tensor; zz is implied by -(xx + yy). Used for
/// the deviatoric part of the stress tensor.
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode)]
pub struct TracelessTensor {
    pub xx: f64,
    pub yy: f64,
    pub xy: f64,
    pub xz: f64,
    pub yz: f64,
}

impl TracelessTensor {
    pub const fn null() -> Self {
        Self {
            xx: 0.,
            yy: 0.,
            xy: 0.,
            xz: 0.,
            yz: 0.,
        }
    }

    pub fn new(xx: f64, yy: f64, xy: f64, xz: f64, yz: f64) -> Self {
        Self { xx, yy, xy, xz, yz }
    }

    pub fn zz(&self) -> f64 {
        -(self.xx + self.yy)
    }

    /// Removes the trace of a general symmetric tensor.
    pub fn from_symmetric(t: &SymmetricTensor) -> Self {
        let third = t.trace() / 3.;
        Self {
            xx: t.diag[0] - third,
            yy: t.diag[1] - third,
            xy: t.off[0],
            xz: t.off[1],
            yz: t.off[2],
        }
    }

    pub fn to_symmetric(&self) -> SymmetricTensor {
        SymmetricTensor {
            diag: [self.xx, self.yy, self.zz()],
            off: [self.xy, self.xz, self.yz],
        }
    }

    pub fn apply(&self, v: Vec3) -> Vec3 {
        self.to_symmetric().apply(v)
    }

    /// Second invariant J2 = S : S / 2, used by the von Mises criterion.
    pub fn second_invariant(&self) -> f64 {
        let s = self.to_symmetric();
        0.5 * s.ddot(&s)
    }
}

impl std::ops::Add for TracelessTensor {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self {
            xx: self.xx + o.xx,
            yy: self.yy + o.yy,
            xy: self.xy + o.xy,
            xz: self.xz + o.xz,
            yz: self.yz + o.yz,
        }
    }
}

impl std::ops::AddAssign for TracelessTensor {
    fn add_assign(&mut self, o: Self) {
        *self = *self + o;
    }
}

impl std::ops::Sub for TracelessTensor {
    type Output = Self;
    fn sub(self, o: Self) -> Self {
        self + o * -1.
    }
}

impl std::ops::Mul<f64> for TracelessTensor {
    type Output = Self;
    fn mul(self, s: f64) -> Self {
        Self {
            xx: self.xx * s,
            yy: self.yy * s,
            xy: self.xy * s,
            xz: self.xz * s,
            yz: self.yz * s,
        }
    }
}

/// Result of the eigendecomposition of a symmetric tensor.
pub struct Eigen {
    /// Eigenvalues, unordered.
    pub values: [f64; 3],
    /// Corresponding unit eigenvectors; together they form the rotation
    /// into the principal frame.
    pub vectors: [Vec3; 3],
}

/// Cyclic Jacobi iteration for a symmetric 3x3 matrix. Converges in a
/// handful of sweeps for anything well-conditioned; we cap the sweep count
/// rather than loop on the off-diagonal norm.
pub fn eigen_decomposition(t: &SymmetricTensor) -> Eigen {
    let mut a = [
        [t.diag[0], t.off[0], t.off[1]],
        [t.off[0], t.diag[1], t.off[2]],
        [t.off[1], t.off[2], t.diag[2]],
    ];
    let mut v = [[1., 0., 0.], [0., 1., 0.], [0., 0., 1.]];

    for _sweep in 0..24 {
        let off_norm = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off_norm < 1e-28 {
            break;
        }
        for p in 0..2 {
            for q in (p + 1)..3 {
                if a[p][q].abs() < 1e-300 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2. * a[p][q]);
                let tan = theta.signum() / (theta.abs() + (theta * theta + 1.).sqrt());
                let cos = 1. / (tan * tan + 1.).sqrt();
                let sin = tan * cos;

                for k in 0..3 {
                    let akp = a[k][p];
                    let akq = a[k][q];
                    a[k][p] = cos * akp - sin * akq;
                    a[k][q] = sin * akp + cos * akq;
                }
                for k in 0..3 {
                    let apk = a[p][k];
                    let aqk = a[q][k];
                    a[p][k] = cos * apk - sin * aqk;
                    a[q][k] = sin * apk + cos * aqk;
                }
                for k in 0..3 {
                    let vkp = v[k][p];
                    let vkq = v[k][q];
                    v[k][p] = cos * vkp - sin * vkq;
                    v[k][q] = sin * vkp + cos * vkq;
                }
            }
        }
    }

    Eigen {
        values: [a[0][0], a[1][1], a[2][2]],
        vectors: [
            Vec3::new(v[0][0], v[1][0], v[2][0]),
            Vec3::new(v[0][1], v[1][1], v[2][1]),
            Vec3::new(v[0][2], v[1][2], v[2][2]),
        ],
    }
}

/// Componentwise clamp of a vector to the cube [-limit, limit]^3.
pub fn clamp_vector(v: Vec3, limit: f64) -> Vec3 {
    Vec3::new(
        v.x.clamp(-limit, limit),
        v.y.clamp(-limit, limit),
        v.z.clamp(-limit, limit),
    )
}

/// Generalized p-mean of a set of positive values. The exponent -inf
/// degenerates to the minimum, +inf to the maximum, 1 to the arithmetic
/// mean and -1 to the harmonic mean.
pub fn power_mean(values: &[f64], exponent: f64) -> f64 {
    assert!(!values.is_empty());
    if exponent == f64::NEG_INFINITY {
        return values.iter().cloned().fold(f64::INFINITY, f64::min);
    }
    if exponent == f64::INFINITY {
        return values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    }
    let sum: f64 = values.iter().map(|v| v.powf(exponent)).sum();
    (sum / values.len() as f64).powf(1. / exponent)
}
