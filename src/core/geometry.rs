//! Bounding volumes and the shared separating-axis routines.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Inverted box that unions into any other box.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn translated(&self, offset: Vec3) -> Aabb {
        Aabb {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    pub fn expanded(&self, margin: Vec3) -> Aabb {
        Aabb {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }

    /// Slab intersection. Returns `(t_near, t_far)` along the ray direction,
    /// or `None` when the ray misses. `t_near` may be negative when the
    /// origin is inside the box.
    pub fn ray_intersect(&self, ray: &Ray) -> Option<(f32, f32)> {
        let mut t_near = f32::MIN;
        let mut t_far = f32::MAX;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.dir[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if dir.abs() < 1e-12 {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let mut t0 = (lo - origin) * inv;
            let mut t1 = (hi - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_near = t_near.max(t0);
            t_far = t_far.min(t1);
            if t_near > t_far {
                return None;
            }
        }

        Some((t_near, t_far))
    }
}

/// Ray with unnormalised direction allowed; `t` values are in units of
/// `dir`'s length.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self { origin, dir }
    }

    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Oriented bounding box.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Obb {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub rotation: Quat,
}

impl Obb {
    pub fn new(center: Vec3, half_extents: Vec3, rotation: Quat) -> Self {
        Self {
            center,
            half_extents,
            rotation,
        }
    }

    /// Local axes in world space.
    pub fn axes(&self) -> [Vec3; 3] {
        [
            self.rotation * Vec3::X,
            self.rotation * Vec3::Y,
            self.rotation * Vec3::Z,
        ]
    }

    /// Enclosing AABB via the column-wise absolute rotation matrix:
    /// extent along each world axis is `|R| · half_extents`.
    pub fn aabb(&self) -> Aabb {
        let [x, y, z] = self.axes();
        let extent = Vec3::new(
            x.x.abs() * self.half_extents.x
                + y.x.abs() * self.half_extents.y
                + z.x.abs() * self.half_extents.z,
            x.y.abs() * self.half_extents.x
                + y.y.abs() * self.half_extents.y
                + z.y.abs() * self.half_extents.z,
            x.z.abs() * self.half_extents.x
                + y.z.abs() * self.half_extents.y
                + z.z.abs() * self.half_extents.z,
        );
        Aabb::from_center_half_extents(self.center, extent)
    }

    /// Extent of the box projected onto a world-space axis.
    pub fn projected_radius(&self, axis: Vec3) -> f32 {
        let [x, y, z] = self.axes();
        x.dot(axis).abs() * self.half_extents.x
            + y.dot(axis).abs() * self.half_extents.y
            + z.dot(axis).abs() * self.half_extents.z
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let local = self.rotation.conjugate() * (point - self.center);
        let clamped = local.clamp(-self.half_extents, self.half_extents);
        self.center + self.rotation * clamped
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        let local = self.rotation.conjugate() * (point - self.center);
        local.abs().cmple(self.half_extents + Vec3::splat(1e-6)).all()
    }

    /// 15-axis separating-axis test against another OBB. Returns the minimum
    /// overlap and its axis oriented from `self` toward `other`, or `None`
    /// when a separating axis exists.
    pub fn separating_axis_overlap(&self, other: &Obb) -> Option<(Vec3, f32)> {
        let relative = other.center - self.center;
        let axes_a = self.axes();
        let axes_b = other.axes();

        let mut min_overlap = f32::MAX;
        let mut min_axis = Vec3::ZERO;

        let mut test = |axis: Vec3| -> bool {
            let len_sq = axis.length_squared();
            if len_sq < 1e-8 {
                // Cross product of near-parallel edges; skip.
                return true;
            }
            let axis = axis / len_sq.sqrt();
            let projection = relative.dot(axis);
            let overlap =
                self.projected_radius(axis) + other.projected_radius(axis) - projection.abs();
            if overlap <= 0.0 {
                return false;
            }
            if overlap < min_overlap {
                min_overlap = overlap;
                min_axis = if projection < 0.0 { -axis } else { axis };
            }
            true
        };

        for axis in axes_a {
            if !test(axis) {
                return None;
            }
        }
        for axis in axes_b {
            if !test(axis) {
                return None;
            }
        }
        for a in axes_a {
            for b in axes_b {
                if !test(a.cross(b)) {
                    return None;
                }
            }
        }

        Some((min_axis, min_overlap))
    }

    /// Approximate OBB-cylinder intersection: the cylinder (Y-up in its own
    /// frame) is treated as an OBB of half extents `(r, h/2, r)` for the
    /// axis test, then the deepest point is clamped back onto the cylinder
    /// mantle. Returns `(point, normal, depth)` with the normal pointing
    /// from the box toward the cylinder.
    pub fn intersect_cylinder(
        &self,
        cylinder_center: Vec3,
        cylinder_rotation: Quat,
        radius: f32,
        height: f32,
    ) -> Option<(Vec3, Vec3, f32)> {
        let cylinder_box = Obb::new(
            cylinder_center,
            Vec3::new(radius, height * 0.5, radius),
            cylinder_rotation,
        );
        let (normal, depth) = self.separating_axis_overlap(&cylinder_box)?;

        // Deepest box point along the contact normal, pulled onto the
        // cylinder's radial surface when it escapes the mantle.
        let support = self.center + normal * (self.projected_radius(normal) - depth * 0.5);
        let local = cylinder_rotation.conjugate() * (support - cylinder_center);
        let radial = Vec3::new(local.x, 0.0, local.z);
        let clamped_radial = if radial.length_squared() > radius * radius {
            radial * (radius / radial.length())
        } else {
            radial
        };
        let clamped = Vec3::new(
            clamped_radial.x,
            local.y.clamp(-height * 0.5, height * 0.5),
            clamped_radial.z,
        );
        let point = cylinder_center + cylinder_rotation * clamped;

        Some((point, normal, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn aabb_union_and_intersection() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(2.0));
        let c = Aabb::new(Vec3::splat(3.0), Vec3::splat(4.0));

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let u = a.union(&c);
        assert_eq!(u.min, Vec3::ZERO);
        assert_eq!(u.max, Vec3::splat(4.0));
    }

    #[test]
    fn ray_slab_hits_front_face() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        let (t_near, t_far) = aabb.ray_intersect(&ray).unwrap();
        assert_relative_eq!(t_near, 4.0, epsilon = 1e-5);
        assert_relative_eq!(t_far, 6.0, epsilon = 1e-5);
    }

    #[test]
    fn ray_slab_misses_offset_box() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let ray = Ray::new(Vec3::new(-5.0, 3.0, 0.0), Vec3::X);
        assert!(aabb.ray_intersect(&ray).is_none());
    }

    #[test]
    fn obb_aabb_matches_unrotated_box() {
        let obb = Obb::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.5, 1.0, 1.5), Quat::IDENTITY);
        let aabb = obb.aabb();
        assert_relative_eq!(aabb.min.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(aabb.max.y, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn obb_aabb_grows_under_rotation() {
        let obb = Obb::new(
            Vec3::ZERO,
            Vec3::splat(1.0),
            Quat::from_rotation_z(FRAC_PI_4),
        );
        let aabb = obb.aabb();
        // A unit cube rotated 45° about Z spans sqrt(2) in X and Y.
        assert_relative_eq!(aabb.max.x, 2f32.sqrt(), epsilon = 1e-5);
        assert_relative_eq!(aabb.max.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn sat_reports_minimum_axis_for_face_overlap() {
        let a = Obb::new(Vec3::ZERO, Vec3::splat(1.0), Quat::IDENTITY);
        let b = Obb::new(Vec3::new(1.8, 0.0, 0.0), Vec3::splat(1.0), Quat::IDENTITY);

        let (axis, overlap) = a.separating_axis_overlap(&b).unwrap();
        assert_relative_eq!(overlap, 0.2, epsilon = 1e-5);
        assert_relative_eq!(axis.dot(Vec3::X), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn sat_finds_separation_for_rotated_boxes() {
        let a = Obb::new(Vec3::ZERO, Vec3::splat(1.0), Quat::IDENTITY);
        let b = Obb::new(
            Vec3::new(2.9, 0.0, 0.0),
            Vec3::splat(1.0),
            Quat::from_rotation_z(FRAC_PI_4),
        );
        // Rotated cube reaches sqrt(2) ≈ 1.414 toward A, so they are apart.
        assert!(a.separating_axis_overlap(&b).is_none());

        let closer = Obb::new(
            Vec3::new(2.3, 0.0, 0.0),
            Vec3::splat(1.0),
            Quat::from_rotation_z(FRAC_PI_4),
        );
        assert!(a.separating_axis_overlap(&closer).is_some());
    }

    #[test]
    fn obb_cylinder_overlap_produces_surface_point() {
        let obb = Obb::new(Vec3::ZERO, Vec3::splat(1.0), Quat::IDENTITY);
        let (point, normal, depth) = obb
            .intersect_cylinder(Vec3::new(1.5, 0.0, 0.0), Quat::IDENTITY, 1.0, 2.0)
            .unwrap();
        assert!(depth > 0.0);
        assert!(normal.x > 0.9);
        assert!(point.x <= 1.5);
    }
}
