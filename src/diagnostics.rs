//! Periodic sanity checks of the particle state.
//!
//! Non-finite values or derivatives are reported as warnings through the
//! logger; they never kill the run by themselves.

use lin_alg::f64::Vec3;

use crate::logger::Logger;
use crate::quantity::{QuantityData, QuantityId};
use crate::storage::Storage;

fn finite_vec(v: &Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Scans all values and derivatives for non-finite entries; returns the
/// number of offending particles per quantity.
pub fn check_finite(storage: &Storage) -> Vec<(QuantityId, usize)> {
    let mut report = Vec::new();
    for id in storage.ids() {
        let q = storage.quantity(id).unwrap();
        let bad = match q.data() {
            QuantityData::Scalar(b) => b
                .values
                .iter()
                .chain(&b.dt)
                .chain(&b.d2t)
                .filter(|v| !v.is_finite())
                .count(),
            QuantityData::Vector(b) => b
                .values
                .iter()
                .chain(&b.dt)
                .chain(&b.d2t)
                .filter(|v| !finite_vec(v))
                .count(),
            QuantityData::Tensor(b) => b
                .values
                .iter()
                .chain(&b.dt)
                .chain(&b.d2t)
                .filter(|t| t.diag.iter().chain(&t.off).any(|c| !c.is_finite()))
                .count(),
            QuantityData::Traceless(b) => b
                .values
                .iter()
                .chain(&b.dt)
                .chain(&b.d2t)
                .filter(|t| {
                    !(t.xx.is_finite()
                        && t.yy.is_finite()
                        && t.xy.is_finite()
                        && t.xz.is_finite()
                        && t.yz.is_finite())
                })
                .count(),
            QuantityData::Index(_) => 0,
        };
        if bad > 0 {
            report.push((id, bad));
        }
    }
    report
}

/// Runs the diagnostics and logs a warning for every offending quantity.
pub fn run_diagnostics(storage: &Storage, logger: &dyn Logger) {
    for (id, count) in check_finite(storage) {
        logger.warning(&format!(
            "quantity '{}' has {} non-finite entries",
            id.name(),
            count
        ));
    }
}
