//! Self-gravity evaluation.
//!
//! Either brute-force summation over all pairs, a Barnes-Hut octree with
//! monopole or quadrupole moments, or a fixed spherical potential.

use lin_alg::f64::Vec3;

use crate::error::Result;
use crate::math::SymmetricTensor;
use crate::scheduler::Scheduler;
use crate::settings::{GravityEnum, RunSettings, RunSettingsId};

/// Gravity evaluator. `build` is called whenever particles moved; `eval`
/// returns the gravitational acceleration at the given position.
pub trait Gravity: Send + Sync {
    fn build(&mut self, positions: &[Vec3], masses: &[f64]);

    /// Acceleration at `position`; `exclude` skips the self-contribution
    /// of the particle being evaluated.
    fn eval(&self, position: Vec3, exclude: Option<usize>) -> Vec3;

    /// Evaluates accelerations of all indexed points in parallel.
    fn eval_all(&self, scheduler: &Scheduler, positions: &[Vec3]) -> Vec<Vec3> {
        scheduler.map_collect(positions.len(), |i| self.eval(positions[i], Some(i)))
    }
}

pub fn create_gravity(settings: &RunSettings) -> Result<Box<dyn Gravity>> {
    let constant = settings.get::<f64>(RunSettingsId::GravityConstant)?;
    match settings.get::<GravityEnum>(RunSettingsId::GravitySolver)? {
        GravityEnum::BruteForce => Ok(Box::new(BruteForceGravity::new(constant))),
        GravityEnum::BarnesHut => Ok(Box::new(BarnesHutGravity::new(
            constant,
            settings.get::<f64>(RunSettingsId::GravityOpeningAngle)?,
            settings.get::<i64>(RunSettingsId::GravityMultipoleOrder)?,
            settings.get::<i64>(RunSettingsId::GravityLeafSize)?.max(1) as usize,
        ))),
        GravityEnum::SphericalPotential => Ok(Box::new(SphericalPotential::new(
            constant,
            settings.get::<Vec3>(RunSettingsId::DomainCenter)?,
        ))),
    }
}

/// Instantaneous O(N^2) summation over all source particles.
pub struct BruteForceGravity {
    constant: f64,
    positions: Vec<Vec3>,
    masses: Vec<f64>,
}

impl BruteForceGravity {
    pub fn new(constant: f64) -> Self {
        Self {
            constant,
            positions: Vec::new(),
            masses: Vec::new(),
        }
    }
}

impl Gravity for BruteForceGravity {
    fn build(&mut self, positions: &[Vec3], masses: &[f64]) {
        self.positions = positions.to_vec();
        self.masses = masses.to_vec();
    }

    fn eval(&self, position: Vec3, exclude: Option<usize>) -> Vec3 {
        let mut acc = Vec3::new_zero();
        for (i, (r, m)) in self.positions.iter().zip(&self.masses).enumerate() {
            if exclude == Some(i) {
                continue;
            }
            let diff = *r - position;
            let dist_sq = diff.magnitude_squared();
            if dist_sq == 0. {
                continue;
            }
            acc += diff * (self.constant * m / (dist_sq * dist_sq.sqrt()));
        }
        acc
    }
}

/// Fixed potential of a point mass in the center; particles do not
/// attract each other. The central mass is the total mass of the build
/// input.
pub struct SphericalPotential {
    constant: f64,
    center: Vec3,
    mass: f64,
}

impl SphericalPotential {
    pub fn new(constant: f64, center: Vec3) -> Self {
        Self {
            constant,
            center,
            mass: 0.,
        }
    }
}

impl Gravity for SphericalPotential {
    fn build(&mut self, _positions: &[Vec3], masses: &[f64]) {
        self.mass = masses.iter().sum();
    }

    fn eval(&self, position: Vec3, _exclude: Option<usize>) -> Vec3 {
        let diff = self.center - position;
        let dist_sq = diff.magnitude_squared();
        if dist_sq == 0. {
            return Vec3::new_zero();
        }
        diff * (self.constant * self.mass / (dist_sq * dist_sq.sqrt()))
    }
}

struct BhNode {
    center: Vec3,
    half: f64,
    mass: f64,
    com: Vec3,
    /// Traceless quadrupole moment around the center of mass.
    quadrupole: SymmetricTensor,
    /// Index of the first of eight children, or None for leaves.
    children: Option<usize>,
    /// Particle indices of a leaf node.
    particles: Vec<usize>,
}

/// Barnes & Hut (1986) approximative gravity with an octree and
/// configurable multipole order.
pub struct BarnesHutGravity {
    constant: f64,
    opening_angle: f64,
    multipole_order: i64,
    leaf_size: usize,
    positions: Vec<Vec3>,
    masses: Vec<f64>,
    nodes: Vec<BhNode>,
}

impl BarnesHutGravity {
    pub fn new(constant: f64, opening_angle: f64, multipole_order: i64, leaf_size: usize) -> Self {
        Self {
            constant,
            opening_angle,
            multipole_order,
            leaf_size,
            positions: Vec::new(),
            masses: Vec::new(),
            nodes: Vec::new(),
        }
    }

    fn build_node(&mut self, node: usize, indices: Vec<usize>) {
        // moments around the center of mass
        let mut mass = 0.;
        let mut com = Vec3::new_zero();
        for &i in &indices {
            mass += self.masses[i];
            com += self.positions[i] * self.masses[i];
        }
        if mass > 0. {
            com = com / mass;
        } else {
            com = self.nodes[node].center;
        }
        let mut quadrupole = SymmetricTensor::null();
        if self.multipole_order >= 2 {
            for &i in &indices {
                let d = self.positions[i] - com;
                let d_sq = d.magnitude_squared();
                let outer = SymmetricTensor::outer(d);
                quadrupole += (outer * 3. - SymmetricTensor::identity() * d_sq) * self.masses[i];
            }
        }
        self.nodes[node].mass = mass;
        self.nodes[node].com = com;
        self.nodes[node].quadrupole = quadrupole;

        if indices.len() <= self.leaf_size {
            self.nodes[node].particles = indices;
            return;
        }

        let center = self.nodes[node].center;
        let half = self.nodes[node].half * 0.5;
        let first_child = self.nodes.len();
        self.nodes[node].children = Some(first_child);
        let mut buckets: [Vec<usize>; 8] = Default::default();
        for &i in &indices {
            let p = self.positions[i];
            let octant = (p.x > center.x) as usize
                | ((p.y > center.y) as usize) << 1
                | ((p.z > center.z) as usize) << 2;
            buckets[octant].push(i);
        }
        for octant in 0..8 {
            let offset = Vec3::new(
                if octant & 1 != 0 { half } else { -half },
                if octant & 2 != 0 { half } else { -half },
                if octant & 4 != 0 { half } else { -half },
            );
            self.nodes.push(BhNode {
                center: center + offset,
                half,
                mass: 0.,
                com: Vec3::new_zero(),
                quadrupole: SymmetricTensor::null(),
                children: None,
                particles: Vec::new(),
            });
        }
        for (octant, bucket) in buckets.into_iter().enumerate() {
            if !bucket.is_empty() {
                self.build_node(first_child + octant, bucket);
            }
        }
    }

    fn node_acceleration(&self, node: &BhNode, position: Vec3) -> Vec3 {
        let diff = node.com - position;
        let dist_sq = diff.magnitude_squared();
        if dist_sq == 0. {
            return Vec3::new_zero();
        }
        let dist = dist_sq.sqrt();
        let mut acc = diff * (self.constant * node.mass / (dist_sq * dist));
        if self.multipole_order >= 2 {
            // a = G/2 (2 Q R / r^5 - 5 (R.Q.R) R / r^7) with R = -diff
            let r5 = dist_sq * dist_sq * dist;
            let r7 = r5 * dist_sq;
            let qr = node.quadrupole.apply(diff);
            let rqr = qr.dot(diff);
            acc += (diff * (5. * rqr / r7) - qr * (2. / r5)) * (0.5 * self.constant);
        }
        acc
    }
}

impl Gravity for BarnesHutGravity {
    fn build(&mut self, positions: &[Vec3], masses: &[f64]) {
        self.positions = positions.to_vec();
        self.masses = masses.to_vec();
        self.nodes.clear();
        if positions.is_empty() {
            return;
        }
        let mut lower = positions[0];
        let mut upper = positions[0];
        for p in positions {
            lower = Vec3::new(lower.x.min(p.x), lower.y.min(p.y), lower.z.min(p.z));
            upper = Vec3::new(upper.x.max(p.x), upper.y.max(p.y), upper.z.max(p.z));
        }
        let center = (lower + upper) * 0.5;
        let extent = upper - lower;
        let half = 0.5 * extent.x.max(extent.y).max(extent.z).max(1e-12);
        self.nodes.push(BhNode {
            center,
            half,
            mass: 0.,
            com: Vec3::new_zero(),
            quadrupole: SymmetricTensor::null(),
            children: None,
            particles: Vec::new(),
        });
        let indices: Vec<usize> = (0..positions.len()).collect();
        self.build_node(0, indices);
    }

    fn eval(&self, position: Vec3, exclude: Option<usize>) -> Vec3 {
        if self.nodes.is_empty() {
            return Vec3::new_zero();
        }
        let mut acc = Vec3::new_zero();
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.mass == 0. {
                continue;
            }
            let dist_sq = (node.com - position).magnitude_squared();
            let opened = match node.children {
                Some(first_child) => {
                    // opening criterion: node size over distance
                    if 4. * node.half * node.half
                        > self.opening_angle * self.opening_angle * dist_sq
                    {
                        for child in first_child..first_child + 8 {
                            stack.push(child);
                        }
                        true
                    } else {
                        false
                    }
                }
                None => {
                    // leaf: always evaluate particles directly
                    for &i in &node.particles {
                        if exclude == Some(i) {
                            continue;
                        }
                        let diff = self.positions[i] - position;
                        let d_sq = diff.magnitude_squared();
                        if d_sq == 0. {
                            continue;
                        }
                        acc += diff * (self.constant * self.masses[i] / (d_sq * d_sq.sqrt()));
                    }
                    true
                }
            };
            if !opened {
                acc += self.node_acceleration(node, position);
            }
        }
        acc
    }
}
