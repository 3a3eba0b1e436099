use lin_alg::f64::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

use crate::finder::{
    BruteForceFinder, HashMapFinder, KdTreeFinder, LinkedListFinder, NeighbourFinder,
    NeighbourRecord, UniformGridFinder,
};

fn random_points(n: usize, seed: u64) -> Vec<Vec3> {
    let mut rng = ChaChaRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Vec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            )
        })
        .collect()
}

fn sorted(mut records: Vec<NeighbourRecord>) -> Vec<usize> {
    records.sort_by_key(|r| r.index);
    records.iter().map(|r| r.index).collect()
}

/// All finders must return the identical neighbour set, modulo ordering.
#[test]
fn test_finders_agree() {
    let points = random_points(500, 42);
    let queries = random_points(20, 43);
    let radius = 0.3;

    let mut brute = BruteForceFinder::default();
    brute.build(&points);

    let mut others: Vec<Box<dyn NeighbourFinder>> = vec![
        Box::new(UniformGridFinder::new(16)),
        Box::new(KdTreeFinder::new(16)),
        Box::new(LinkedListFinder::new(16)),
        Box::new(HashMapFinder::new(16)),
    ];

    for finder in &mut others {
        finder.build(&points);
    }

    for q in &queries {
        let expected = sorted(brute.find(*q, radius));
        for finder in &others {
            let result = sorted(finder.find(*q, radius));
            assert_eq!(result, expected);
        }
    }
}

#[test]
fn test_find_contains_self() {
    let points = random_points(50, 7);
    let mut finder = KdTreeFinder::new(8);
    finder.build(&points);
    for (i, p) in points.iter().enumerate() {
        let result = finder.find(*p, 1e-12);
        assert!(result.iter().any(|r| r.index == i));
    }
}

#[test]
fn test_find_distances_are_squared() {
    let points = vec![Vec3::new_zero(), Vec3::new(2., 0., 0.)];
    let mut finder = BruteForceFinder::default();
    finder.build(&points);
    let result = finder.find(Vec3::new_zero(), 3.);
    let far = result.iter().find(|r| r.index == 1).unwrap();
    assert_eq!(far.dist_sq, 4.);
}

#[test]
fn test_empty_finder() {
    let mut finder = UniformGridFinder::new(8);
    finder.build(&[]);
    assert!(finder.find(Vec3::new_zero(), 1.).is_empty());
}

#[test]
fn test_rebuild_after_motion() {
    let mut points = random_points(100, 11);
    let mut finder = LinkedListFinder::new(8);
    finder.build(&points);
    for p in &mut points {
        *p += Vec3::new(0.01, 0., 0.);
    }
    finder.rebuild(&points);

    let mut brute = BruteForceFinder::default();
    brute.build(&points);
    let q = points[3];
    assert_eq!(sorted(finder.find(q, 0.25)), sorted(brute.find(q, 0.25)));
}
