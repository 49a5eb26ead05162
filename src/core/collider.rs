use std::f32::consts::PI;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::geometry::{Aabb, Obb};

/// Enumeration of supported collider geometries. Cylinders and fans are
/// Y-up in their local frame; a fan is a cylinder sector of the given
/// central angle (radians) opening symmetrically around local +X.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    Cylinder { radius: f32, height: f32 },
    Fan { radius: f32, height: f32, angle: f32 },
}

/// Collider embedded in a rigid body: the shape plus the precomputed mean
/// cross-sectional area consumed by the drag model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub shape: Shape,
    pub cross_sectional_area: f32,
}

impl Collider {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            cross_sectional_area: cross_sectional_area(&shape),
        }
    }

    pub fn sphere(radius: f32) -> Self {
        Self::new(Shape::Sphere { radius })
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::new(Shape::Box { half_extents })
    }

    pub fn cylinder(radius: f32, height: f32) -> Self {
        Self::new(Shape::Cylinder { radius, height })
    }

    pub fn fan(radius: f32, height: f32, angle: f32) -> Self {
        Self::new(Shape::Fan {
            radius,
            height,
            angle,
        })
    }

    /// World-space AABB of the collider at the given pose. Spheres are
    /// rotation-invariant; everything else goes through the OBB conversion.
    pub fn aabb(&self, position: Vec3, rotation: Quat) -> Aabb {
        match self.shape {
            Shape::Sphere { radius } => {
                Aabb::from_center_half_extents(position, Vec3::splat(radius))
            }
            _ => self.obb(position, rotation).aabb(),
        }
    }

    /// Equivalent oriented box: exact for boxes, the enclosing `(r, h/2, r)`
    /// box for cylinders and fans.
    pub fn obb(&self, position: Vec3, rotation: Quat) -> Obb {
        Obb::new(position, self.equivalent_half_extents(), rotation)
    }

    pub fn equivalent_half_extents(&self) -> Vec3 {
        match self.shape {
            Shape::Sphere { radius } => Vec3::splat(radius),
            Shape::Box { half_extents } => half_extents,
            Shape::Cylinder { radius, height } | Shape::Fan { radius, height, .. } => {
                Vec3::new(radius, height * 0.5, radius)
            }
        }
    }

    /// Radius of the bounding sphere used by the narrowphase pre-filter.
    pub fn bounding_radius(&self) -> f32 {
        match self.shape {
            Shape::Sphere { radius } => radius,
            Shape::Box { half_extents } => half_extents.length(),
            Shape::Cylinder { radius, height } | Shape::Fan { radius, height, .. } => {
                (radius * radius + height * height * 0.25).sqrt()
            }
        }
    }

    /// Smallest full dimension; CCD uses this as the tunnelling threshold
    /// length.
    pub fn min_extent(&self) -> f32 {
        match self.shape {
            Shape::Sphere { radius } => 2.0 * radius,
            Shape::Box { half_extents } => 2.0 * half_extents.min_element(),
            Shape::Cylinder { radius, height } | Shape::Fan { radius, height, .. } => {
                height.min(2.0 * radius)
            }
        }
    }

    pub fn is_fan(&self) -> bool {
        matches!(self.shape, Shape::Fan { .. })
    }
}

fn cross_sectional_area(shape: &Shape) -> f32 {
    match *shape {
        Shape::Sphere { radius } => PI * radius * radius,
        Shape::Box { half_extents } => {
            let Vec3 { x, y, z } = half_extents;
            (x * y + y * z + x * z) * 4.0 / 3.0
        }
        Shape::Cylinder { radius, height } | Shape::Fan { radius, height, .. } => {
            PI * radius * radius + radius * height
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cross_sections_match_shape_formulas() {
        let sphere = Collider::sphere(2.0);
        assert_relative_eq!(sphere.cross_sectional_area, PI * 4.0, epsilon = 1e-5);

        let cuboid = Collider::cuboid(Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(
            cuboid.cross_sectional_area,
            (2.0 + 6.0 + 3.0) * 4.0 / 3.0,
            epsilon = 1e-5
        );

        let cylinder = Collider::cylinder(1.0, 4.0);
        assert_relative_eq!(cylinder.cross_sectional_area, PI + 4.0, epsilon = 1e-5);
    }

    #[test]
    fn sphere_aabb_ignores_rotation() {
        let collider = Collider::sphere(1.5);
        let aabb = collider.aabb(Vec3::new(1.0, 0.0, 0.0), Quat::from_rotation_x(1.0));
        assert_eq!(aabb.min, Vec3::new(-0.5, -1.5, -1.5));
        assert_eq!(aabb.max, Vec3::new(2.5, 1.5, 1.5));
    }

    #[test]
    fn min_extent_picks_smallest_dimension() {
        assert_relative_eq!(
            Collider::cuboid(Vec3::new(0.5, 5.0, 5.0)).min_extent(),
            1.0
        );
        assert_relative_eq!(Collider::cylinder(3.0, 1.0).min_extent(), 1.0);
        assert_relative_eq!(Collider::sphere(0.1).min_extent(), 0.2);
    }
}
