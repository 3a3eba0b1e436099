//! Collision and overlap handling of the N-body phases.
//!
//! Two-phase design: the overlap pass resolves interpenetrating pairs
//! (repelling, merging or bouncing them), then the collision pass
//! dispatches actual contacts to the configured collision handler. Pairs
//! are processed in ascending (min, max) order and the effect of each pair
//! is committed before the next pair is inspected, making the outcome
//! deterministic.

use std::collections::BTreeSet;

use lin_alg::f64::Vec3;

use crate::aggregate::AggregateHolder;
use crate::error::Result;
use crate::finder::{KdTreeFinder, NeighbourFinder};
use crate::quantity::QuantityId;
use crate::settings::{
    AggregateEnum, CollisionHandlerEnum, OverlapHandlerEnum, RunSettings, RunSettingsId,
};
use crate::stats::{Statistics, StatisticsId};
use crate::storage::Storage;

#[derive(Clone, Debug)]
pub struct CollisionConfig {
    pub handler: CollisionHandlerEnum,
    pub overlap: OverlapHandlerEnum,
    pub restitution_normal: f64,
    pub restitution_tangent: f64,
    pub allowed_overlap: f64,
    pub merging_limit: f64,
    pub gravity_constant: f64,
}

impl CollisionConfig {
    pub fn from_settings(settings: &RunSettings) -> Result<Self> {
        Ok(Self {
            handler: settings.get(RunSettingsId::CollisionHandler)?,
            overlap: settings.get(RunSettingsId::CollisionOverlap)?,
            restitution_normal: settings.get(RunSettingsId::CollisionRestitutionNormal)?,
            restitution_tangent: settings.get(RunSettingsId::CollisionRestitutionTangent)?,
            allowed_overlap: settings.get(RunSettingsId::CollisionAllowedOverlap)?,
            merging_limit: settings.get(RunSettingsId::CollisionMergingLimit)?,
            gravity_constant: settings.get(RunSettingsId::GravityConstant)?,
        })
    }
}

struct ContactState<'a> {
    r: &'a mut [Vec3],
    v: &'a mut [Vec3],
    h: &'a mut [f64],
    m: &'a mut [f64],
    removed: BTreeSet<usize>,
    mergers: usize,
    bounces: usize,
}

impl ContactState<'_> {
    fn is_removed(&self, i: usize) -> bool {
        self.removed.contains(&i)
    }

    /// Perfect merging: the i-th particle becomes the merger, the j-th is
    /// scheduled for removal. Conserves mass, momentum and volume.
    fn merge(&mut self, i: usize, j: usize) {
        let m_total = self.m[i] + self.m[j];
        debug_assert!(m_total > 0.);
        self.r[i] = (self.r[i] * self.m[i] + self.r[j] * self.m[j]) / m_total;
        self.v[i] = (self.v[i] * self.m[i] + self.v[j] * self.m[j]) / m_total;
        self.h[i] = (self.h[i].powi(3) + self.h[j].powi(3)).cbrt();
        self.m[i] = m_total;
        self.removed.insert(j);
        self.mergers += 1;
    }

    /// Elastic bounce about the line connecting the centers, with normal
    /// and tangential restitution.
    fn bounce(&mut self, i: usize, j: usize, restitution_n: f64, restitution_t: f64) {
        let dir = self.r[i] - self.r[j];
        let dist = dir.magnitude();
        if dist == 0. {
            return;
        }
        let dir = dir / dist;
        // work in the center-of-mass frame so momentum stays conserved
        let m_total = self.m[i] + self.m[j];
        let v_com = (self.v[i] * self.m[i] + self.v[j] * self.m[j]) / m_total;
        for k in [i, j] {
            let rel = self.v[k] - v_com;
            let normal = dir * rel.dot(dir);
            let tangent = rel - normal;
            self.v[k] = v_com + tangent * restitution_t - normal * restitution_n;
        }
        self.bounces += 1;
    }

    /// Shifts the pair apart along the connecting line to the target
    /// separation, keeping the center of mass fixed.
    fn repel(&mut self, i: usize, j: usize, target: f64) {
        let dir = self.r[i] - self.r[j];
        let dist = dir.magnitude();
        if dist == 0. || dist >= target {
            return;
        }
        let dir = dir / dist;
        let delta = target - dist;
        let m_total = self.m[i] + self.m[j];
        self.r[i] += dir * (delta * self.m[j] / m_total);
        self.r[j] -= dir * (delta * self.m[i] / m_total);
    }

    /// True if the pair is gravitationally bound: the relative speed is
    /// below the mutual escape speed scaled by the merging limit.
    fn is_bound(&self, i: usize, j: usize, config: &CollisionConfig) -> bool {
        let dist = (self.r[i] - self.r[j]).magnitude().max(1e-300);
        let v_rel = (self.v[i] - self.v[j]).magnitude();
        let v_esc =
            (2. * config.gravity_constant * (self.m[i] + self.m[j]) / dist).sqrt();
        v_rel < config.merging_limit * v_esc
    }
}

/// Runs the overlap pass and the collision pass over the current state.
/// Invoked by the N-body solver after the positions were advanced; pairs
/// currently in contact collided during the last step.
pub fn handle_collisions(
    storage: &mut Storage,
    stats: &mut Statistics,
    _dt: f64,
    config: &CollisionConfig,
) -> Result<()> {
    let n = storage.particle_cnt();
    if n < 2
        || (config.handler == CollisionHandlerEnum::None
            && config.overlap == OverlapHandlerEnum::Ignore)
    {
        return Ok(());
    }

    let holder = storage.take_user_data::<AggregateHolder>();

    #[cfg(debug_assertions)]
    let total_mass_before: f64 = storage.value::<f64>(QuantityId::Mass)?.iter().sum();

    let mut overlaps = 0i64;
    let mut collisions = 0i64;
    let (removed, mergers, bounces);
    {
        let mut h_owned = storage.value::<f64>(QuantityId::SmoothingLength)?.to_vec();
        let mut m_owned = storage.value::<f64>(QuantityId::Mass)?.to_vec();
        let buffers = storage.positions_mut()?;
        let mut state = ContactState {
            r: buffers.r,
            v: buffers.v,
            h: &mut h_owned,
            m: &mut m_owned,
            removed: BTreeSet::new(),
            mergers: 0,
            bounces: 0,
        };

        let max_radius = state.h.iter().cloned().fold(0., f64::max);
        let mut finder = KdTreeFinder::new(25);
        finder.build(state.r);

        // candidate pairs in ascending (min, max) order
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for i in 0..n {
            for neigh in finder.find(state.r[i], state.h[i] + max_radius) {
                let j = neigh.index;
                if j > i && neigh.dist_sq < (state.h[i] + state.h[j]).powi(2) {
                    pairs.push((i, j));
                }
            }
        }
        pairs.sort_unstable();

        // overlap pass
        for &(i, j) in &pairs {
            if state.is_removed(i) || state.is_removed(j) {
                continue;
            }
            let sum = state.h[i] + state.h[j];
            let dist = (state.r[i] - state.r[j]).magnitude();
            if dist >= sum * (1. - config.allowed_overlap) {
                continue;
            }
            overlaps += 1;
            let target = sum * (1. - config.allowed_overlap);
            match config.overlap {
                OverlapHandlerEnum::Ignore => {}
                OverlapHandlerEnum::ForceMerge => state.merge(i, j),
                OverlapHandlerEnum::Repel => state.repel(i, j, target),
                OverlapHandlerEnum::RepelOrMerge => {
                    if state.is_bound(i, j, config) {
                        state.merge(i, j);
                    } else {
                        state.repel(i, j, target);
                    }
                }
                OverlapHandlerEnum::InternalBounce => {
                    state.bounce(i, j, config.restitution_normal, config.restitution_tangent);
                }
                OverlapHandlerEnum::PassOrMerge => {
                    if state.is_bound(i, j, config) {
                        state.merge(i, j);
                    }
                }
            }
        }

        // collision pass: pairs at contact and approaching
        for &(i, j) in &pairs {
            if state.is_removed(i) || state.is_removed(j) {
                continue;
            }
            let dr = state.r[i] - state.r[j];
            let dist = dr.magnitude();
            if dist >= state.h[i] + state.h[j] {
                continue;
            }
            let approaching = (state.v[i] - state.v[j]).dot(dr) < 0.;
            if !approaching {
                continue;
            }
            collisions += 1;
            match config.handler {
                CollisionHandlerEnum::None => {}
                CollisionHandlerEnum::PerfectMerging => state.merge(i, j),
                CollisionHandlerEnum::ElasticBounce => {
                    state.bounce(i, j, config.restitution_normal, config.restitution_tangent);
                }
                CollisionHandlerEnum::MergeOrBounce => {
                    if state.is_bound(i, j, config) {
                        state.merge(i, j);
                    } else {
                        state.bounce(i, j, config.restitution_normal, config.restitution_tangent);
                    }
                }
                CollisionHandlerEnum::Aggregates => {
                    if let Some(holder) = &holder {
                        holder.merge(i, j);
                        // kill the normal component of the relative motion,
                        // the rigid-body integration takes over from here
                        state.bounce(i, j, 0., 1.);
                    }
                }
            }
        }

        removed = state.removed.iter().copied().collect::<Vec<usize>>();
        mergers = state.mergers;
        bounces = state.bounces;

        storage
            .value_mut::<f64>(QuantityId::SmoothingLength)?
            .copy_from_slice(&h_owned);
        storage
            .value_mut::<f64>(QuantityId::Mass)?
            .copy_from_slice(&m_owned);
    }

    if !removed.is_empty() {
        storage.remove(&removed);
    }

    #[cfg(debug_assertions)]
    {
        // mergers move mass into the survivor before the removal, so the
        // total must come out unchanged
        let total_mass_after: f64 = storage.value::<f64>(QuantityId::Mass)?.iter().sum();
        debug_assert!(
            (total_mass_after - total_mass_before).abs()
                <= 1e-10 * total_mass_before.abs().max(1e-300),
            "collision handling changed the total mass"
        );
    }

    match holder {
        Some(holder) if !removed.is_empty() => {
            // particle indices shifted; rebuild the aggregates
            let rebuilt = AggregateHolder::new(storage, AggregateEnum::Particles);
            storage.set_user_data(rebuilt);
            drop(holder);
        }
        Some(holder) => storage.set_user_data(*holder),
        None => {}
    }

    stats.set_int(StatisticsId::OverlapCount, overlaps);
    stats.set_int(StatisticsId::CollisionCount, collisions);
    stats.increment(StatisticsId::MergerCount, mergers as i64);
    stats.increment(StatisticsId::BounceCount, bounces as i64);
    Ok(())
}
