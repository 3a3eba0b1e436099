//! Spatial indices for neighbour queries.
//!
//! All finders answer the same question: which indexed points lie within a
//! given radius of a position. Results always contain every true neighbour
//! (no false negatives), may contain the queried point itself, and carry
//! no ordering guarantee.

use std::collections::HashMap;

use lin_alg::f64::Vec3;

use crate::error::{Error, Result};
use crate::settings::{FinderEnum, RunSettings, RunSettingsId};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighbourRecord {
    pub index: usize,
    pub dist_sq: f64,
}

pub trait NeighbourFinder: Send + Sync {
    /// Constructs the index over the given points.
    fn build(&mut self, points: &[Vec3]);

    /// Appends all points within `radius` of `position` to `out`.
    fn find_into(&self, position: Vec3, radius: f64, out: &mut Vec<NeighbourRecord>);

    /// Cheap refresh after points moved slightly; by default a full build.
    fn rebuild(&mut self, points: &[Vec3]) {
        self.build(points);
    }

    fn find(&self, position: Vec3, radius: f64) -> Vec<NeighbourRecord> {
        let mut out = Vec::new();
        self.find_into(position, radius, &mut out);
        out
    }
}

/// Creates the finder selected in settings.
pub fn create_finder(settings: &RunSettings) -> Result<Box<dyn NeighbourFinder>> {
    let leaf_size = settings.get::<i64>(RunSettingsId::SphFinderLeafSize)?.max(1) as usize;
    match settings.get::<FinderEnum>(RunSettingsId::SphFinder)? {
        FinderEnum::BruteForce => Ok(Box::new(BruteForceFinder::default())),
        FinderEnum::UniformGrid => Ok(Box::new(UniformGridFinder::new(leaf_size))),
        FinderEnum::KdTree => Ok(Box::new(KdTreeFinder::new(leaf_size))),
        FinderEnum::LinkedList => Ok(Box::new(LinkedListFinder::new(leaf_size))),
        FinderEnum::HashMap => Ok(Box::new(HashMapFinder::new(leaf_size))),
        FinderEnum::Octree => Err(Error::NotImplemented("octree finder")),
    }
}

fn dist_sq(a: Vec3, b: Vec3) -> f64 {
    (a - b).magnitude_squared()
}

/// O(N^2) search through every pair of points.
#[derive(Default)]
pub struct BruteForceFinder {
    points: Vec<Vec3>,
}

impl NeighbourFinder for BruteForceFinder {
    fn build(&mut self, points: &[Vec3]) {
        self.points = points.to_vec();
    }

    fn find_into(&self, position: Vec3, radius: f64, out: &mut Vec<NeighbourRecord>) {
        let radius_sq = radius * radius;
        for (index, point) in self.points.iter().enumerate() {
            let d = dist_sq(position, *point);
            if d <= radius_sq {
                out.push(NeighbourRecord { index, dist_sq: d });
            }
        }
    }
}

/// Helper selecting a cubic cell size so that cells hold roughly
/// `leaf_size` points each.
fn cell_size(points: &[Vec3], lower: Vec3, upper: Vec3, leaf_size: usize) -> f64 {
    let extent = upper - lower;
    let volume = (extent.x.max(1e-12)) * (extent.y.max(1e-12)) * (extent.z.max(1e-12));
    (volume * leaf_size as f64 / points.len().max(1) as f64).cbrt()
}

fn bounding_box(points: &[Vec3]) -> (Vec3, Vec3) {
    let mut lower = Vec3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut upper = Vec3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        lower = Vec3::new(lower.x.min(p.x), lower.y.min(p.y), lower.z.min(p.z));
        upper = Vec3::new(upper.x.max(p.x), upper.y.max(p.y), upper.z.max(p.z));
    }
    (lower, upper)
}

/// Dense uniform grid over the bounding box of the points.
pub struct UniformGridFinder {
    leaf_size: usize,
    points: Vec<Vec3>,
    lower: Vec3,
    cell: f64,
    dims: [usize; 3],
    cells: Vec<Vec<usize>>,
}

impl UniformGridFinder {
    pub fn new(leaf_size: usize) -> Self {
        Self {
            leaf_size,
            points: Vec::new(),
            lower: Vec3::new_zero(),
            cell: 1.,
            dims: [0; 3],
            cells: Vec::new(),
        }
    }

    fn cell_index(&self, p: Vec3) -> [usize; 3] {
        let clamp = |x: f64, dim: usize| (x.max(0.) as usize).min(dim.saturating_sub(1));
        [
            clamp((p.x - self.lower.x) / self.cell, self.dims[0]),
            clamp((p.y - self.lower.y) / self.cell, self.dims[1]),
            clamp((p.z - self.lower.z) / self.cell, self.dims[2]),
        ]
    }

    fn flat(&self, idx: [usize; 3]) -> usize {
        (idx[2] * self.dims[1] + idx[1]) * self.dims[0] + idx[0]
    }
}

impl NeighbourFinder for UniformGridFinder {
    fn build(&mut self, points: &[Vec3]) {
        self.points = points.to_vec();
        if points.is_empty() {
            self.cells.clear();
            self.dims = [0; 3];
            return;
        }
        let (lower, upper) = bounding_box(points);
        self.lower = lower;
        self.cell = cell_size(points, lower, upper, self.leaf_size).max(1e-12);
        let extent = upper - lower;
        self.dims = [
            (extent.x / self.cell) as usize + 1,
            (extent.y / self.cell) as usize + 1,
            (extent.z / self.cell) as usize + 1,
        ];
        self.cells = vec![Vec::new(); self.dims[0] * self.dims[1] * self.dims[2]];
        for (i, p) in points.iter().enumerate() {
            let idx = self.cell_index(*p);
            let flat = self.flat(idx);
            self.cells[flat].push(i);
        }
    }

    fn find_into(&self, position: Vec3, radius: f64, out: &mut Vec<NeighbourRecord>) {
        if self.cells.is_empty() {
            return;
        }
        let radius_sq = radius * radius;
        let span = (radius / self.cell).ceil() as i64 + 1;
        let center = self.cell_index(position);
        for dz in -span..=span {
            for dy in -span..=span {
                for dx in -span..=span {
                    let x = center[0] as i64 + dx;
                    let y = center[1] as i64 + dy;
                    let z = center[2] as i64 + dz;
                    if x < 0
                        || y < 0
                        || z < 0
                        || x >= self.dims[0] as i64
                        || y >= self.dims[1] as i64
                        || z >= self.dims[2] as i64
                    {
                        continue;
                    }
                    let flat = self.flat([x as usize, y as usize, z as usize]);
                    for &index in &self.cells[flat] {
                        let d = dist_sq(position, self.points[index]);
                        if d <= radius_sq {
                            out.push(NeighbourRecord { index, dist_sq: d });
                        }
                    }
                }
            }
        }
    }
}

/// Median-split k-d tree with arena-allocated nodes.
pub struct KdTreeFinder {
    leaf_size: usize,
    points: Vec<Vec3>,
    nodes: Vec<KdNode>,
}

enum KdNode {
    Inner {
        axis: usize,
        split: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        indices: Vec<usize>,
    },
}

impl KdTreeFinder {
    pub fn new(leaf_size: usize) -> Self {
        Self {
            leaf_size,
            points: Vec::new(),
            nodes: Vec::new(),
        }
    }

    fn build_node(&mut self, mut indices: Vec<usize>) -> usize {
        if indices.len() <= self.leaf_size {
            self.nodes.push(KdNode::Leaf { indices });
            return self.nodes.len() - 1;
        }
        // split along the longest axis of the point set
        let subset: Vec<Vec3> = indices.iter().map(|&i| self.points[i]).collect();
        let (lower, upper) = bounding_box(&subset);
        let extent = upper - lower;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        let component = |p: Vec3| match axis {
            0 => p.x,
            1 => p.y,
            _ => p.z,
        };
        indices.sort_unstable_by(|&a, &b| {
            component(self.points[a])
                .partial_cmp(&component(self.points[b]))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = indices.len() / 2;
        let split = component(self.points[indices[mid]]);
        let right_indices = indices.split_off(mid);

        let placeholder = self.nodes.len();
        self.nodes.push(KdNode::Inner {
            axis,
            split,
            left: 0,
            right: 0,
        });
        let left = self.build_node(indices);
        let right = self.build_node(right_indices);
        if let KdNode::Inner {
            left: l, right: r, ..
        } = &mut self.nodes[placeholder]
        {
            *l = left;
            *r = right;
        }
        placeholder
    }
}

impl NeighbourFinder for KdTreeFinder {
    fn build(&mut self, points: &[Vec3]) {
        self.points = points.to_vec();
        self.nodes.clear();
        if points.is_empty() {
            return;
        }
        let indices: Vec<usize> = (0..points.len()).collect();
        self.build_node(indices);
    }

    fn find_into(&self, position: Vec3, radius: f64, out: &mut Vec<NeighbourRecord>) {
        if self.nodes.is_empty() {
            return;
        }
        let radius_sq = radius * radius;
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            match &self.nodes[node] {
                KdNode::Leaf { indices } => {
                    for &index in indices {
                        let d = dist_sq(position, self.points[index]);
                        if d <= radius_sq {
                            out.push(NeighbourRecord { index, dist_sq: d });
                        }
                    }
                }
                KdNode::Inner {
                    axis,
                    split,
                    left,
                    right,
                } => {
                    let coord = match axis {
                        0 => position.x,
                        1 => position.y,
                        _ => position.z,
                    };
                    if coord - radius <= *split {
                        stack.push(*left);
                    }
                    if coord + radius >= *split {
                        stack.push(*right);
                    }
                }
            }
        }
    }
}

/// Cell-linked-list: a head index per grid cell plus a `next` chain
/// through the particles.
pub struct LinkedListFinder {
    leaf_size: usize,
    points: Vec<Vec3>,
    lower: Vec3,
    cell: f64,
    dims: [usize; 3],
    heads: Vec<i64>,
    next: Vec<i64>,
}

impl LinkedListFinder {
    pub fn new(leaf_size: usize) -> Self {
        Self {
            leaf_size,
            points: Vec::new(),
            lower: Vec3::new_zero(),
            cell: 1.,
            dims: [0; 3],
            heads: Vec::new(),
            next: Vec::new(),
        }
    }

    fn cell_of(&self, p: Vec3) -> [i64; 3] {
        [
            ((p.x - self.lower.x) / self.cell) as i64,
            ((p.y - self.lower.y) / self.cell) as i64,
            ((p.z - self.lower.z) / self.cell) as i64,
        ]
    }

    fn flat(&self, idx: [i64; 3]) -> Option<usize> {
        if idx.iter().any(|&c| c < 0)
            || idx[0] >= self.dims[0] as i64
            || idx[1] >= self.dims[1] as i64
            || idx[2] >= self.dims[2] as i64
        {
            return None;
        }
        Some((idx[2] as usize * self.dims[1] + idx[1] as usize) * self.dims[0] + idx[0] as usize)
    }
}

impl NeighbourFinder for LinkedListFinder {
    fn build(&mut self, points: &[Vec3]) {
        self.points = points.to_vec();
        if points.is_empty() {
            self.heads.clear();
            self.next.clear();
            self.dims = [0; 3];
            return;
        }
        let (lower, upper) = bounding_box(points);
        self.lower = lower;
        self.cell = cell_size(points, lower, upper, self.leaf_size).max(1e-12);
        let extent = upper - lower;
        self.dims = [
            (extent.x / self.cell) as usize + 1,
            (extent.y / self.cell) as usize + 1,
            (extent.z / self.cell) as usize + 1,
        ];
        self.heads = vec![-1; self.dims[0] * self.dims[1] * self.dims[2]];
        self.next = vec![-1; points.len()];
        for (i, p) in points.iter().enumerate() {
            let idx = self.cell_of(*p);
            let flat = self.flat(idx).expect("point outside its own bounding box");
            self.next[i] = self.heads[flat];
            self.heads[flat] = i as i64;
        }
    }

    fn find_into(&self, position: Vec3, radius: f64, out: &mut Vec<NeighbourRecord>) {
        if self.heads.is_empty() {
            return;
        }
        let radius_sq = radius * radius;
        let span = (radius / self.cell).ceil() as i64 + 1;
        let center = self.cell_of(position);
        for dz in -span..=span {
            for dy in -span..=span {
                for dx in -span..=span {
                    let Some(flat) =
                        self.flat([center[0] + dx, center[1] + dy, center[2] + dz])
                    else {
                        continue;
                    };
                    let mut i = self.heads[flat];
                    while i >= 0 {
                        let index = i as usize;
                        let d = dist_sq(position, self.points[index]);
                        if d <= radius_sq {
                            out.push(NeighbourRecord { index, dist_sq: d });
                        }
                        i = self.next[index];
                    }
                }
            }
        }
    }
}

/// Sparse grid keyed by integer cell coordinates; useful when the point
/// cloud is sparse and a dense grid would mostly hold empty cells.
pub struct HashMapFinder {
    leaf_size: usize,
    points: Vec<Vec3>,
    cell: f64,
    cells: HashMap<(i64, i64, i64), Vec<usize>>,
}

impl HashMapFinder {
    pub fn new(leaf_size: usize) -> Self {
        Self {
            leaf_size,
            points: Vec::new(),
            cell: 1.,
            cells: HashMap::new(),
        }
    }

    fn key(&self, p: Vec3) -> (i64, i64, i64) {
        (
            (p.x / self.cell).floor() as i64,
            (p.y / self.cell).floor() as i64,
            (p.z / self.cell).floor() as i64,
        )
    }
}

impl NeighbourFinder for HashMapFinder {
    fn build(&mut self, points: &[Vec3]) {
        self.points = points.to_vec();
        self.cells.clear();
        if points.is_empty() {
            return;
        }
        let (lower, upper) = bounding_box(points);
        self.cell = cell_size(points, lower, upper, self.leaf_size).max(1e-12);
        for (i, p) in points.iter().enumerate() {
            self.cells.entry(self.key(*p)).or_default().push(i);
        }
    }

    fn find_into(&self, position: Vec3, radius: f64, out: &mut Vec<NeighbourRecord>) {
        if self.cells.is_empty() {
            return;
        }
        let radius_sq = radius * radius;
        let span = (radius / self.cell).ceil() as i64 + 1;
        let center = self.key(position);
        for dz in -span..=span {
            for dy in -span..=span {
                for dx in -span..=span {
                    let key = (center.0 + dx, center.1 + dy, center.2 + dz);
                    let Some(indices) = self.cells.get(&key) else {
                        continue;
                    };
                    for &index in indices {
                        let d = dist_sq(position, self.points[index]);
                        if d <= radius_sq {
                            out.push(NeighbourRecord { index, dist_sq: d });
                        }
                    }
                }
            }
        }
    }
}
