// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounding volume hierarchy over axis-aligned boxes

use nalgebra::Point3;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Box around a set of points
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let mut min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Point3::new(f64::MIN, f64::MIN, f64::MIN);
        for p in points {
            min = min.inf(p);
            max = max.sup(p);
        }
        Self { min, max }
    }

    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Boxes overlap, touching counts
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Grow by `margin` on every side
    #[inline]
    pub fn expanded(&self, margin: f64) -> Aabb {
        Aabb {
            min: self.min.map(|c| c - margin),
            max: self.max.map(|c| c + margin),
        }
    }

    #[inline]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bounds: Aabb,
    left: u32,
    right: u32,
    start: u32,
    count: u32,
}

impl BvhNode {
    const fn leaf(bounds: Aabb, start: u32, count: u32) -> Self {
        Self {
            bounds,
            left: u32::MAX,
            right: u32::MAX,
            start,
            count,
        }
    }

    const fn inner(bounds: Aabb, left: u32, right: u32) -> Self {
        Self {
            bounds,
            left,
            right,
            start: 0,
            count: 0,
        }
    }

    #[inline]
    const fn is_leaf(&self) -> bool {
        self.count != 0
    }
}

/// Median-split hierarchy over primitive boxes
#[derive(Debug, Clone)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    primitives: Vec<u32>,
}

impl Bvh {
    pub const DEFAULT_LEAF_SIZE: usize = 4;

    /// Build with the default leaf size, `None` for no primitives
    pub fn build(boxes: &[Aabb]) -> Option<Self> {
        Self::build_with_leaf_size(boxes, Self::DEFAULT_LEAF_SIZE)
    }

    pub fn build_with_leaf_size(boxes: &[Aabb], leaf_size: usize) -> Option<Self> {
        if boxes.is_empty() {
            return None;
        }

        let leaf_size = leaf_size.clamp(1, 64);
        let mut bvh = Self {
            nodes: Vec::with_capacity(boxes.len().saturating_mul(2)),
            primitives: (0..boxes.len() as u32).collect(),
        };
        bvh.build_node(boxes, 0, boxes.len(), leaf_size);
        Some(bvh)
    }

    fn build_node(&mut self, boxes: &[Aabb], start: usize, end: usize, leaf_size: usize) -> u32 {
        let node_index = self.nodes.len() as u32;
        let bounds = self.range_bounds(boxes, start, end);
        self.nodes.push(BvhNode::leaf(bounds, start as u32, (end - start) as u32));

        let count = end - start;
        if count <= leaf_size {
            return node_index;
        }

        let axis = self.split_axis(boxes, start, end);
        let mid = start + count / 2;
        self.primitives[start..end].select_nth_unstable_by(mid - start, |a, b| {
            let ca = boxes[*a as usize].center()[axis];
            let cb = boxes[*b as usize].center()[axis];
            ca.total_cmp(&cb)
        });

        let left = self.build_node(boxes, start, mid, leaf_size);
        let right = self.build_node(boxes, mid, end, leaf_size);
        self.nodes[node_index as usize] = BvhNode::inner(bounds, left, right);
        node_index
    }

    fn range_bounds(&self, boxes: &[Aabb], start: usize, end: usize) -> Aabb {
        self.primitives[start + 1..end]
            .iter()
            .fold(boxes[self.primitives[start] as usize], |acc, &i| {
                acc.union(&boxes[i as usize])
            })
    }

    /// Axis with the widest centroid spread
    fn split_axis(&self, boxes: &[Aabb], start: usize, end: usize) -> usize {
        let centers: Vec<Point3<f64>> = self.primitives[start..end]
            .iter()
            .map(|&i| boxes[i as usize].center())
            .collect();
        let extent = Aabb::from_points(&centers);
        let size = extent.max - extent.min;
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    /// Visit every primitive whose box overlaps `query`
    pub fn query<F>(&self, query: &Aabb, mut visit: F)
    where
        F: FnMut(usize),
    {
        let mut stack = vec![0u32];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.bounds.intersects(query) {
                continue;
            }
            if node.is_leaf() {
                let start = node.start as usize;
                for &prim in &self.primitives[start..start + node.count as usize] {
                    visit(prim as usize);
                }
                continue;
            }
            stack.push(node.left);
            stack.push(node.right);
        }
    }

    /// Number of primitives
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}
