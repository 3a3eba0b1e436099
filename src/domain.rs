//! Computational domains bounding the initial particle distributions.

use lin_alg::f64::Vec3;

use crate::error::{Error, Result};
use crate::settings::{DomainEnum, RunSettings, RunSettingsId};

/// Closed region of space particles are distributed into.
#[derive(Clone, Debug)]
pub enum Domain {
    Spherical { center: Vec3, radius: f64 },
    Block { center: Vec3, size: Vec3 },
    Cylinder { center: Vec3, radius: f64, height: f64 },
}

impl Domain {
    pub fn sphere(center: Vec3, radius: f64) -> Self {
        Self::Spherical { center, radius }
    }

    pub fn from_settings(settings: &RunSettings) -> Result<Option<Self>> {
        let center = settings.get::<Vec3>(RunSettingsId::DomainCenter)?;
        match settings.get::<DomainEnum>(RunSettingsId::DomainType)? {
            DomainEnum::None => Ok(None),
            DomainEnum::Spherical => Ok(Some(Self::Spherical {
                center,
                radius: settings.get(RunSettingsId::DomainRadius)?,
            })),
            DomainEnum::Block => Ok(Some(Self::Block {
                center,
                size: settings.get(RunSettingsId::DomainSize)?,
            })),
            DomainEnum::Cylinder => Ok(Some(Self::Cylinder {
                center,
                radius: settings.get(RunSettingsId::DomainRadius)?,
                height: settings.get(RunSettingsId::DomainHeight)?,
            })),
        }
    }

    pub fn center(&self) -> Vec3 {
        match self {
            Self::Spherical { center, .. }
            | Self::Block { center, .. }
            | Self::Cylinder { center, .. } => *center,
        }
    }

    pub fn volume(&self) -> f64 {
        match self {
            Self::Spherical { radius, .. } => 4. / 3. * std::f64::consts::PI * radius.powi(3),
            Self::Block { size, .. } => size.x * size.y * size.z,
            Self::Cylinder { radius, height, .. } => {
                std::f64::consts::PI * radius * radius * height
            }
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        match self {
            Self::Spherical { center, radius } => {
                (point - *center).magnitude_squared() <= radius * radius
            }
            Self::Block { center, size } => {
                let d = point - *center;
                d.x.abs() <= 0.5 * size.x && d.y.abs() <= 0.5 * size.y && d.z.abs() <= 0.5 * size.z
            }
            Self::Cylinder {
                center,
                radius,
                height,
            } => {
                let d = point - *center;
                d.x * d.x + d.y * d.y <= radius * radius && d.z.abs() <= 0.5 * height
            }
        }
    }

    /// Axis-aligned bounding box as (lower, upper) corners.
    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        match self {
            Self::Spherical { center, radius } => {
                let r = Vec3::new(*radius, *radius, *radius);
                (*center - r, *center + r)
            }
            Self::Block { center, size } => {
                let half = *size * 0.5;
                (*center - half, *center + half)
            }
            Self::Cylinder {
                center,
                radius,
                height,
            } => {
                let half = Vec3::new(*radius, *radius, 0.5 * height);
                (*center - half, *center + half)
            }
        }
    }
}

/// Fails with invalid-setup when a domain is required but disabled.
pub fn require_domain(domain: Option<Domain>) -> Result<Domain> {
    domain.ok_or_else(|| Error::InvalidSetup("this job requires a domain".to_string()))
}
