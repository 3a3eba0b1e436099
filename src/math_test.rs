use approx::assert_relative_eq;
use lin_alg::f64::Vec3;

use crate::math::{eigen_decomposition, power_mean, Interval, SymmetricTensor, TracelessTensor};

#[test]
fn test_interval_clamp() {
    let interval = Interval::new(1., 5.);
    assert_eq!(interval.clamp(0.), 1.);
    assert_eq!(interval.clamp(3.), 3.);
    assert_eq!(interval.clamp(10.), 5.);
    assert!(Interval::unbounded().contains(1e300));
}

#[test]
fn test_tensor_apply() {
    let t = SymmetricTensor::new([1., 2., 3.], [0., 0., 0.]);
    let v = t.apply(Vec3::new(1., 1., 1.));
    assert_eq!(v.x, 1.);
    assert_eq!(v.y, 2.);
    assert_eq!(v.z, 3.);
}

#[test]
fn test_tensor_inverse() {
    let t = SymmetricTensor::new([2., 3., 4.], [0.5, 0.2, 0.1]);
    let inv = t.inverse();
    // T * T^-1 applied to a vector recovers the vector
    let v = Vec3::new(1., -2., 0.5);
    let result = t.apply(inv.apply(v));
    assert_relative_eq!(result.x, v.x, epsilon = 1e-12);
    assert_relative_eq!(result.y, v.y, epsilon = 1e-12);
    assert_relative_eq!(result.z, v.z, epsilon = 1e-12);
}

#[test]
fn test_traceless_tensor_has_zero_trace() {
    let t = TracelessTensor::new(1., 2., 0.5, 0.1, 0.2);
    assert_relative_eq!(t.to_symmetric().trace(), 0., epsilon = 1e-15);
}

#[test]
fn test_traceless_from_symmetric() {
    let s = SymmetricTensor::new([3., 4., 5.], [1., 2., 3.]);
    let t = TracelessTensor::from_symmetric(&s);
    assert_relative_eq!(t.to_symmetric().trace(), 0., epsilon = 1e-12);
    assert_eq!(t.xy, 1.);
}

#[test]
fn test_eigen_decomposition_diagonal() {
    let t = SymmetricTensor::new([3., 1., 2.], [0., 0., 0.]);
    let eigen = eigen_decomposition(&t);
    let mut values = eigen.values;
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_relative_eq!(values[0], 1., epsilon = 1e-10);
    assert_relative_eq!(values[1], 2., epsilon = 1e-10);
    assert_relative_eq!(values[2], 3., epsilon = 1e-10);
}

#[test]
fn test_eigen_decomposition_recomposes() {
    let t = SymmetricTensor::new([2., 5., 3.], [1., -0.5, 0.7]);
    let eigen = eigen_decomposition(&t);
    // A v_k = lambda_k v_k for every eigenpair
    for k in 0..3 {
        let av = t.apply(eigen.vectors[k]);
        let lv = eigen.vectors[k] * eigen.values[k];
        assert_relative_eq!(av.x, lv.x, epsilon = 1e-8);
        assert_relative_eq!(av.y, lv.y, epsilon = 1e-8);
        assert_relative_eq!(av.z, lv.z, epsilon = 1e-8);
    }
}

#[test]
fn test_power_mean_limits() {
    let values = [1., 2., 4.];
    assert_eq!(power_mean(&values, f64::NEG_INFINITY), 1.);
    assert_eq!(power_mean(&values, f64::INFINITY), 4.);
    assert_relative_eq!(power_mean(&values, 1.), 7. / 3., epsilon = 1e-12);
}
