//! Binary AABB tree used by the broad phase.
//!
//! The tree is built by median split over primitive centroids and kept alive
//! across frames: bounds changes are absorbed by `refit`, structural changes
//! (insertions, large kill batches) by a rebuild.

use crate::core::geometry::{Aabb, Ray};
use crate::utils::simd::{aabb_intersects_batch4, AabbBatch4};

/// Payload stored at the leaves. The broad phase keeps one entry per body
/// with that body's cached AABB.
pub trait BvhPrimitive {
    fn bounds(&self) -> Aabb;
}

/// Internal nodes hold child indices; leaves hold a primitive range
/// (`count > 0`). Children are always allocated after their parent, which
/// makes the bottom-up refit a single reverse scan.
#[derive(Debug, Clone, Copy)]
pub struct BvhNode {
    pub bounds: Aabb,
    pub left: u32,
    pub right: u32,
    pub start: u32,
    pub count: u32,
}

impl BvhNode {
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Fixed traversal stack depth; enough for any tree this crate can address.
const TRAVERSAL_STACK: usize = 64;

pub struct Bvh<P> {
    pub nodes: Vec<BvhNode>,
    pub primitives: Vec<P>,
    leaf_size: usize,
}

impl<P: BvhPrimitive> Bvh<P> {
    pub fn new(leaf_size: usize) -> Self {
        Self {
            nodes: Vec::new(),
            primitives: Vec::new(),
            leaf_size: leaf_size.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Direct access for the parallel bounds-update pass; workers write
    /// disjoint index ranges.
    pub fn primitives_mut(&mut self) -> &mut [P] {
        &mut self.primitives
    }

    /// Rebuilds the tree from scratch over the given primitives.
    pub fn build(&mut self, primitives: Vec<P>) {
        self.primitives = primitives;
        self.nodes.clear();
        if self.primitives.is_empty() {
            return;
        }
        let count = self.primitives.len();
        self.build_range(0, count);
    }

    fn build_range(&mut self, start: usize, count: usize) -> u32 {
        let node_index = self.nodes.len() as u32;
        let mut bounds = Aabb::empty();
        for primitive in &self.primitives[start..start + count] {
            bounds = bounds.union(&primitive.bounds());
        }

        if count <= self.leaf_size {
            self.nodes.push(BvhNode {
                bounds,
                left: 0,
                right: 0,
                start: start as u32,
                count: count as u32,
            });
            return node_index;
        }

        // Median split along the longest centroid axis.
        let extent = bounds.max - bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        let mid = count / 2;
        self.primitives[start..start + count].select_nth_unstable_by(mid, |a, b| {
            let ca = a.bounds().center()[axis];
            let cb = b.bounds().center()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        self.nodes.push(BvhNode {
            bounds,
            left: 0,
            right: 0,
            start: 0,
            count: 0,
        });
        let left = self.build_range(start, mid);
        let right = self.build_range(start + mid, count - mid);
        self.nodes[node_index as usize].left = left;
        self.nodes[node_index as usize].right = right;
        node_index
    }

    /// Recomputes node bounds from current primitive bounds without
    /// restructuring. Children live at higher indices than their parent, so
    /// one reverse scan suffices.
    pub fn refit(&mut self) {
        for index in (0..self.nodes.len()).rev() {
            let node = self.nodes[index];
            let bounds = if node.is_leaf() {
                let start = node.start as usize;
                let end = start + node.count as usize;
                let mut bounds = Aabb::empty();
                for primitive in &self.primitives[start..end] {
                    bounds = bounds.union(&primitive.bounds());
                }
                bounds
            } else {
                self.nodes[node.left as usize]
                    .bounds
                    .union(&self.nodes[node.right as usize].bounds)
            };
            self.nodes[index].bounds = bounds;
        }
    }

    /// Collects the indices of primitives whose bounds intersect `query`,
    /// using an iterative traversal over a fixed 64-entry stack. Bounds
    /// enclose the underlying shapes, so this is a superset of the truly
    /// intersecting set; the caller's narrow test decides exactness.
    pub fn query_aabb_fast(&self, query: &Aabb, out: &mut Vec<u32>) {
        if self.nodes.is_empty() {
            return;
        }

        let query_batch = AabbBatch4::splat(*query);
        let mut stack = [0u32; TRAVERSAL_STACK];
        let mut top = 0usize;
        stack[top] = 0;
        top += 1;

        while top > 0 {
            top -= 1;
            let node = &self.nodes[stack[top] as usize];
            if !node.bounds.intersects(query) {
                continue;
            }

            if node.is_leaf() {
                self.test_leaf(node, &query_batch, query, out);
            } else {
                debug_assert!(top + 2 <= TRAVERSAL_STACK, "bvh traversal stack overflow");
                stack[top] = node.left;
                stack[top + 1] = node.right;
                top += 2;
            }
        }
    }

    fn test_leaf(&self, node: &BvhNode, query_batch: &AabbBatch4, query: &Aabb, out: &mut Vec<u32>) {
        let start = node.start as usize;
        let count = node.count as usize;

        let mut offset = 0;
        while offset + 4 <= count {
            let base = start + offset;
            let batch = AabbBatch4::from_aabbs([
                self.primitives[base].bounds(),
                self.primitives[base + 1].bounds(),
                self.primitives[base + 2].bounds(),
                self.primitives[base + 3].bounds(),
            ]);
            let mut mask = aabb_intersects_batch4(query_batch, &batch);
            while mask != 0 {
                let lane = mask.trailing_zeros();
                out.push((base as u32) + lane);
                mask &= mask - 1;
            }
            offset += 4;
        }
        for i in offset..count {
            let index = start + i;
            if self.primitives[index].bounds().intersects(query) {
                out.push(index as u32);
            }
        }
    }

    /// Collects primitives whose bounds the ray enters within `max_dist`.
    pub fn query_ray_fast(&self, ray: &Ray, max_dist: f32, out: &mut Vec<u32>) {
        if self.nodes.is_empty() {
            return;
        }

        let mut stack = [0u32; TRAVERSAL_STACK];
        let mut top = 0usize;
        stack[top] = 0;
        top += 1;

        while top > 0 {
            top -= 1;
            let node = &self.nodes[stack[top] as usize];
            match node.bounds.ray_intersect(ray) {
                Some((t_near, t_far)) if t_near <= max_dist && t_far >= 0.0 => {}
                _ => continue,
            }

            if node.is_leaf() {
                let start = node.start as usize;
                let end = start + node.count as usize;
                for index in start..end {
                    match self.primitives[index].bounds().ray_intersect(ray) {
                        Some((t_near, t_far)) if t_near <= max_dist && t_far >= 0.0 => {
                            out.push(index as u32)
                        }
                        _ => {}
                    }
                }
            } else {
                debug_assert!(top + 2 <= TRAVERSAL_STACK, "bvh traversal stack overflow");
                stack[top] = node.left;
                stack[top + 1] = node.right;
                top += 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[derive(Clone)]
    struct TestEntry {
        bounds: Aabb,
    }

    impl BvhPrimitive for TestEntry {
        fn bounds(&self) -> Aabb {
            self.bounds
        }
    }

    fn grid_entries(n: usize) -> Vec<TestEntry> {
        // n³ unit boxes on a 2-unit grid.
        let mut entries = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    let center = Vec3::new(x as f32, y as f32, z as f32) * 2.0;
                    entries.push(TestEntry {
                        bounds: Aabb::from_center_half_extents(center, Vec3::splat(0.5)),
                    });
                }
            }
        }
        entries
    }

    #[test]
    fn aabb_query_matches_brute_force() {
        let entries = grid_entries(5);
        let mut bvh = Bvh::new(4);
        bvh.build(entries.clone());

        let query = Aabb::new(Vec3::splat(1.0), Vec3::splat(5.0));
        let mut hits = Vec::new();
        bvh.query_aabb_fast(&query, &mut hits);

        let mut expected: Vec<u32> = bvh
            .primitives
            .iter()
            .enumerate()
            .filter(|(_, e)| e.bounds.intersects(&query))
            .map(|(i, _)| i as u32)
            .collect();
        hits.sort_unstable();
        expected.sort_unstable();
        assert_eq!(hits, expected);
        assert!(!hits.is_empty());
    }

    #[test]
    fn refit_tracks_moved_primitive() {
        let entries = grid_entries(3);
        let mut bvh = Bvh::new(2);
        bvh.build(entries);

        let far = Aabb::from_center_half_extents(Vec3::splat(100.0), Vec3::splat(0.5));
        bvh.primitives_mut()[0].bounds = far;
        bvh.refit();

        let mut hits = Vec::new();
        bvh.query_aabb_fast(&far, &mut hits);
        assert_eq!(hits, vec![0]);
        assert!(bvh.nodes[0].bounds.max.x >= 100.0);
    }

    #[test]
    fn ray_query_reaches_boxes_along_the_ray() {
        let entries = grid_entries(4);
        let mut bvh = Bvh::new(4);
        bvh.build(entries);

        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        let mut hits = Vec::new();
        bvh.query_ray_fast(&ray, 100.0, &mut hits);

        // Every box whose bounds straddle the X axis row at y=z=0.
        let expected = bvh
            .primitives
            .iter()
            .filter(|e| e.bounds.min.y <= 0.0 && e.bounds.max.y >= 0.0 && e.bounds.min.z <= 0.0 && e.bounds.max.z >= 0.0)
            .count();
        assert_eq!(hits.len(), expected);
    }

    #[test]
    fn ray_query_respects_max_distance() {
        let entries = grid_entries(4);
        let mut bvh = Bvh::new(4);
        bvh.build(entries);

        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        let mut hits = Vec::new();
        bvh.query_ray_fast(&ray, 5.0, &mut hits);
        // Only the first box of the row is entered within 5 units.
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_tree_yields_no_hits() {
        let bvh: Bvh<TestEntry> = Bvh::new(4);
        let mut hits = Vec::new();
        bvh.query_aabb_fast(&Aabb::new(Vec3::ZERO, Vec3::ONE), &mut hits);
        assert!(hits.is_empty());
    }
}
