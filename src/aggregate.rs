//! Rigid aggregates of particles.
//!
//! Particles bound by gravity (or glued by slow collisions) are grouped
//! into aggregates that move as rigid bodies. Every particle belongs to
//! exactly one aggregate; a lone particle forms an aggregate of size 1.
//! Aggregates only grow by merging, the core never splits them.

#![allow(non_snake_case)]

use std::sync::RwLock;

use lin_alg::f64::Vec3;

use crate::error::Result;
use crate::math::{clamp_vector, eigen_decomposition, SymmetricTensor};
use crate::quantity::QuantityId;
use crate::settings::AggregateEnum;
use crate::storage::Storage;

/// Upper bound on the spin components, protecting the integration against
/// unresolved close encounters.
const MAX_SPIN: f64 = 0.1;

/// An ordered set of particle indices moving as one rigid body.
#[derive(Clone, Debug, Default)]
pub struct Aggregate {
    idxs: Vec<usize>,
    /// Stable identifier, preserved when the aggregate survives a merge.
    persistent_id: usize,
}

impl Aggregate {
    fn single(particle: usize) -> Self {
        Self {
            idxs: vec![particle],
            persistent_id: particle,
        }
    }

    fn from_range(start: usize, end: usize) -> Self {
        Self {
            idxs: (start..end).collect(),
            persistent_id: start,
        }
    }

    pub fn id(&self) -> usize {
        self.persistent_id
    }

    pub fn size(&self) -> usize {
        self.idxs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idxs.is_empty()
    }

    pub fn particles(&self) -> &[usize] {
        &self.idxs
    }
}

struct Inner {
    aggregates: Vec<Aggregate>,
    /// Index into `aggregates` of the aggregate containing each particle.
    particle_to_agg: Vec<usize>,
}

/// Holds all aggregates of a storage. Multiple-reader, single-writer; the
/// lock makes concurrent merges from collision handlers safe while keeping
/// lookups cheap.
pub struct AggregateHolder {
    inner: RwLock<Inner>,
}

impl AggregateHolder {
    /// Creates the initial aggregates, either one per particle or one per
    /// material partition.
    pub fn new(storage: &Storage, source: AggregateEnum) -> Self {
        let n = storage.particle_cnt();
        let mut aggregates = Vec::with_capacity(n);
        let mut particle_to_agg = vec![0; n];
        match source {
            AggregateEnum::Particles => {
                for i in 0..n {
                    aggregates.push(Aggregate::single(i));
                    particle_to_agg[i] = i;
                }
            }
            AggregateEnum::Materials => {
                for mat in storage.materials() {
                    let agg_idx = aggregates.len();
                    aggregates.push(Aggregate::from_range(mat.start, mat.end));
                    for i in mat.start..mat.end {
                        particle_to_agg[i] = agg_idx;
                    }
                }
            }
        }
        Self {
            inner: RwLock::new(Inner {
                aggregates,
                particle_to_agg,
            }),
        }
    }

    /// Persistent id of the aggregate holding the given particle.
    pub fn aggregate_id(&self, particle: usize) -> usize {
        let inner = self.inner.read().unwrap();
        inner.aggregates[inner.particle_to_agg[particle]].id()
    }

    /// Size of the aggregate holding the given particle.
    pub fn aggregate_size(&self, particle: usize) -> usize {
        let inner = self.inner.read().unwrap();
        inner.aggregates[inner.particle_to_agg[particle]].size()
    }

    /// Number of non-empty aggregates.
    pub fn count(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.aggregates.iter().filter(|a| !a.is_empty()).count()
    }

    /// True if both particles belong to the same aggregate.
    pub fn same_aggregate(&self, a: usize, b: usize) -> bool {
        let inner = self.inner.read().unwrap();
        inner.particle_to_agg[a] == inner.particle_to_agg[b]
    }

    /// Merges the aggregates holding particles `a` and `b`. The members of
    /// the smaller aggregate migrate into the larger one, whose persistent
    /// id survives; equal sizes keep the lower id. Merging an aggregate
    /// with itself is a no-op. The drained record stays in place,
    /// empty-but-valid, so aggregate indices remain stable.
    pub fn merge(&self, a: usize, b: usize) {
        let mut inner = self.inner.write().unwrap();
        let agg_a = inner.particle_to_agg[a];
        let agg_b = inner.particle_to_agg[b];
        if agg_a == agg_b {
            return;
        }
        let size_a = inner.aggregates[agg_a].size();
        let size_b = inner.aggregates[agg_b].size();
        let id_a = inner.aggregates[agg_a].id();
        let id_b = inner.aggregates[agg_b].id();
        let (winner, loser) = if size_a > size_b
            || (size_a == size_b && id_a < id_b)
        {
            (agg_a, agg_b)
        } else {
            (agg_b, agg_a)
        };
        let migrated = std::mem::take(&mut inner.aggregates[loser].idxs);
        for &p in &migrated {
            inner.particle_to_agg[p] = winner;
        }
        inner.aggregates[winner].idxs.extend(migrated);
    }

    /// Runs the provided closure on every non-empty multi-particle
    /// aggregate.
    pub fn for_each_aggregate<F: FnMut(&Aggregate)>(&self, mut func: F) {
        let inner = self.inner.read().unwrap();
        for agg in &inner.aggregates {
            if agg.size() > 1 {
                func(agg);
            }
        }
    }

    /// Advances the rigid-body state of all aggregates and writes the
    /// rigid velocities and accelerations back to the particles.
    ///
    /// For each aggregate, the total mass, center of mass, momentum,
    /// world-frame inertia tensor and net torque are integrated over the
    /// members; the inertia tensor is diagonalized to obtain the principal
    /// frame, the angular velocity advances by Euler's rigid-body
    /// equations, and the particle state becomes
    /// v = v_com + omega x (r - r_com) plus the corresponding rigid
    /// acceleration.
    pub fn integrate(&self, storage: &mut Storage) -> Result<()> {
        let m = storage.value::<f64>(QuantityId::Mass)?.to_vec();
        let has_spin = storage.has(QuantityId::AngularVelocity);
        let mut spins: Vec<(usize, Vec3)> = Vec::new();

        let inner = self.inner.read().unwrap();
        let buffers = storage.positions_mut()?;
        let r = &mut *buffers.r;
        let v = &mut *buffers.v;
        let dv = &mut *buffers.dv;

        for agg in &inner.aggregates {
            if agg.size() <= 1 {
                continue;
            }
            let mut m_ag = 0.;
            let mut r_com = Vec3::new_zero();
            let mut v_com = Vec3::new_zero();
            let mut dv_com = Vec3::new_zero();
            for &i in &agg.idxs {
                m_ag += m[i];
                r_com += r[i] * m[i];
                v_com += v[i] * m[i];
                dv_com += dv[i] * m[i];
            }
            r_com = r_com / m_ag;
            v_com = v_com / m_ag;
            dv_com = dv_com / m_ag;

            // angular momentum, world-frame inertia tensor and net torque
            let mut L = Vec3::new_zero();
            let mut I = SymmetricTensor::null();
            let mut tau = Vec3::new_zero();
            for &i in &agg.idxs {
                let dr = r[i] - r_com;
                L += dr.cross(v[i] - v_com) * m[i];
                I += (SymmetricTensor::identity() * dr.magnitude_squared()
                    - SymmetricTensor::outer(dr))
                    * m[i];
                tau += dr.cross(dv[i] - dv_com) * m[i];
            }

            let (omega, domega) = if I.determinant() != 0. {
                let omega = clamp_vector(I.inverse().apply(L), MAX_SPIN);

                // principal frame: Euler's equations with a diagonal
                // inertia tensor
                let eigen = eigen_decomposition(&I);
                let to_local = |w: Vec3| {
                    Vec3::new(
                        eigen.vectors[0].dot(w),
                        eigen.vectors[1].dot(w),
                        eigen.vectors[2].dot(w),
                    )
                };
                let w_loc = to_local(omega);
                let tau_loc = to_local(tau);
                let Iw = Vec3::new(
                    eigen.values[0] * w_loc.x,
                    eigen.values[1] * w_loc.y,
                    eigen.values[2] * w_loc.z,
                );
                let rhs = tau_loc - w_loc.cross(Iw);
                let dw_loc = Vec3::new(
                    rhs.x / eigen.values[0].max(1e-300),
                    rhs.y / eigen.values[1].max(1e-300),
                    rhs.z / eigen.values[2].max(1e-300),
                );
                let dw = eigen.vectors[0] * dw_loc.x
                    + eigen.vectors[1] * dw_loc.y
                    + eigen.vectors[2] * dw_loc.z;
                (omega, dw)
            } else {
                (Vec3::new_zero(), Vec3::new_zero())
            };

            for &i in &agg.idxs {
                let dr = r[i] - r_com;
                v[i] = v_com + omega.cross(dr);
                dv[i] = dv_com + domega.cross(dr) + omega.cross(omega.cross(dr));
                if has_spin {
                    spins.push((i, omega));
                }
            }
        }
        drop(inner);

        if has_spin {
            let w = storage.value_mut::<Vec3>(QuantityId::AngularVelocity)?;
            for (i, omega) in spins {
                w[i] = omega;
            }
        }
        Ok(())
    }
}
