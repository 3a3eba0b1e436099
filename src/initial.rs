//! Initial conditions: particle distributions and body setup.

use lin_alg::f64::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::quantity::{OrderEnum, QuantityId};
use crate::settings::{BodySettings, BodySettingsId, DistributionEnum};
use crate::storage::Storage;

/// Generates approximately `count` positions inside the domain.
pub fn distribute(
    kind: DistributionEnum,
    domain: &Domain,
    count: usize,
    seed: u64,
) -> Vec<Vec3> {
    match kind {
        DistributionEnum::Hexagonal => hexagonal_packing(domain, count),
        DistributionEnum::Cubic => cubic_packing(domain, count),
        DistributionEnum::Random => random_distribution(domain, count, seed),
        DistributionEnum::Linear => linear_distribution(domain, count),
    }
}

/// Hexagonally close packing; the densest regular arrangement, used as
/// the default since it minimizes the initial density error.
fn hexagonal_packing(domain: &Domain, count: usize) -> Vec<Vec3> {
    // lattice constant from the HCP volume per site, V_site = a^3 / sqrt(2)
    let a = (domain.volume() * std::f64::consts::SQRT_2 / count.max(1) as f64).cbrt();
    let dx = a;
    let dy = a * 3f64.sqrt() / 2.;
    let dz = a * (6f64).sqrt() / 3.;

    let (lower, upper) = domain.bounding_box();
    let mut positions = Vec::with_capacity(count);
    let mut iz = 0;
    let mut z = lower.z;
    while z <= upper.z {
        let mut iy = 0;
        let mut y = lower.y;
        while y <= upper.y {
            let x_offset = (iy % 2) as f64 * 0.5 * dx + (iz % 3) as f64 * dx / 3.;
            let mut x = lower.x + x_offset;
            while x <= upper.x {
                let point = Vec3::new(x, y + (iz % 3) as f64 * dy / 3., z);
                if domain.contains(point) {
                    positions.push(point);
                }
                x += dx;
            }
            y += dy;
            iy += 1;
        }
        z += dz;
        iz += 1;
    }
    positions
}

/// Cubic close packing on a regular grid.
fn cubic_packing(domain: &Domain, count: usize) -> Vec<Vec3> {
    let a = (domain.volume() / count.max(1) as f64).cbrt();
    let (lower, upper) = domain.bounding_box();
    let mut positions = Vec::with_capacity(count);
    let mut z = lower.z + 0.5 * a;
    while z <= upper.z {
        let mut y = lower.y + 0.5 * a;
        while y <= upper.y {
            let mut x = lower.x + 0.5 * a;
            while x <= upper.x {
                let point = Vec3::new(x, y, z);
                if domain.contains(point) {
                    positions.push(point);
                }
                x += a;
            }
            y += a;
        }
        z += a;
    }
    positions
}

/// Uniform random positions, rejection-sampled from the bounding box.
/// Seeded, so runs are reproducible.
fn random_distribution(domain: &Domain, count: usize, seed: u64) -> Vec<Vec3> {
    let mut rng = ChaChaRng::seed_from_u64(seed);
    let (lower, upper) = domain.bounding_box();
    let mut positions = Vec::with_capacity(count);
    while positions.len() < count {
        let point = Vec3::new(
            rng.random_range(lower.x..=upper.x),
            rng.random_range(lower.y..=upper.y),
            rng.random_range(lower.z..=upper.z),
        );
        if domain.contains(point) {
            positions.push(point);
        }
    }
    positions
}

/// Particles uniformly on a line through the domain center, along x.
fn linear_distribution(domain: &Domain, count: usize) -> Vec<Vec3> {
    let (lower, upper) = domain.bounding_box();
    let center = domain.center();
    let n = count.max(2);
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            Vec3::new(lower.x + t * (upper.x - lower.x), center.y, center.z)
        })
        .collect()
}

/// Creates the particles of a monolithic body inside the domain and
/// merges them into the storage as a new material partition.
pub fn add_monolithic_body(
    storage: &mut Storage,
    domain: &Domain,
    body: BodySettings,
    eta: f64,
    seed: u64,
) -> Result<usize> {
    let count = body.get::<i64>(BodySettingsId::ParticleCount)?;
    if count <= 0 {
        return Err(Error::InvalidSetup(
            "particle count of a body must be positive".to_string(),
        ));
    }
    let distribution: DistributionEnum = body.get(BodySettingsId::InitialDistribution)?;
    let positions = distribute(distribution, domain, count as usize, seed);
    if positions.is_empty() {
        return Err(Error::InvalidSetup(
            "distribution produced no particles; domain too small?".to_string(),
        ));
    }
    let n = positions.len();

    let rho0: f64 = body.get(BodySettingsId::Density)?;
    let u0: f64 = body.get(BodySettingsId::Energy)?;
    let volume_per_particle = domain.volume() / n as f64;
    let mass = rho0 * volume_per_particle;
    // smoothing length from the particle concentration, h = eta n^(-1/3)
    let h = eta * volume_per_particle.cbrt();

    let mut body_storage = Storage::with_material(body);
    body_storage.insert(QuantityId::Position, OrderEnum::Second, positions)?;
    body_storage.insert_uniform(QuantityId::SmoothingLength, OrderEnum::First, h)?;
    body_storage.insert_uniform(QuantityId::Mass, OrderEnum::Zero, mass)?;
    body_storage.insert_uniform(QuantityId::Density, OrderEnum::First, rho0)?;
    body_storage.insert_uniform(QuantityId::Energy, OrderEnum::First, u0)?;

    storage.merge(body_storage)?;
    Ok(n)
}

/// Applies a bulk velocity and spin to the last `count` particles of the
/// storage (the body just added).
pub fn set_body_motion(
    storage: &mut Storage,
    count: usize,
    velocity: Vec3,
    spin: Vec3,
) -> Result<()> {
    let total = storage.particle_cnt();
    let start = total - count;

    let center = {
        let r = storage.value::<Vec3>(QuantityId::Position)?;
        let mut com = Vec3::new_zero();
        for p in &r[start..] {
            com += *p;
        }
        com / count.max(1) as f64
    };

    let buffers = storage.positions_mut()?;
    for i in start..total {
        buffers.v[i] += velocity + spin.cross(buffers.r[i] - center);
    }
    Ok(())
}
