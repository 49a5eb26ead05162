//! Closed-form primitive pair tests and the shape dispatcher.
//!
//! Every test returns the contact in the A→B convention: the normal points
//! from the first operand toward the second, penetration is non-negative.
//! Symmetric pairs run the canonical routine with operands swapped and the
//! normal negated on the way out.

use glam::{Quat, Vec3};

use crate::collision::gjk;
use crate::core::collider::Shape;
use crate::core::geometry::{Aabb, Obb};

/// Raw geometric contact produced by the narrow phase, before the solver
/// attaches mass and material data.
#[derive(Debug, Clone, Copy)]
pub struct ContactGeometry {
    pub point: Vec3,
    pub normal: Vec3,
    pub penetration: f32,
}

/// A rotation close enough to identity that the axis-aligned fast paths
/// apply.
fn is_axis_aligned(rotation: Quat) -> bool {
    rotation.w.abs() > 1.0 - 1e-6
}

/// Dispatches on the shape tag pair. Fans are sensor geometry and never
/// produce solver contacts. `gjk_fallback` routes pairs without an exact
/// closed form through GJK+EPA instead of the conservative approximations.
pub fn collide(
    shape_a: &Shape,
    pos_a: Vec3,
    rot_a: Quat,
    shape_b: &Shape,
    pos_b: Vec3,
    rot_b: Quat,
    gjk_fallback: bool,
) -> Option<ContactGeometry> {
    use Shape::*;

    match (shape_a, shape_b) {
        (Fan { .. }, _) | (_, Fan { .. }) => None,
        (Sphere { radius: ra }, Sphere { radius: rb }) => {
            sphere_sphere(pos_a, *ra, pos_b, *rb)
        }
        (Box { half_extents: ha }, Box { half_extents: hb }) => {
            if is_axis_aligned(rot_a) && is_axis_aligned(rot_b) {
                aligned_box_box(pos_a, *ha, pos_b, *hb)
            } else {
                obb_box_box(pos_a, *ha, rot_a, pos_b, *hb, rot_b)
            }
        }
        (Box { half_extents }, Sphere { radius }) => {
            box_sphere(pos_a, *half_extents, rot_a, pos_b, *radius)
        }
        (Sphere { radius }, Box { half_extents }) => {
            box_sphere(pos_b, *half_extents, rot_b, pos_a, *radius).map(flip)
        }
        (Sphere { radius }, Cylinder { radius: cr, height }) => {
            sphere_cylinder(pos_a, *radius, pos_b, rot_b, *cr, *height)
        }
        (Cylinder { radius: cr, height }, Sphere { radius }) => {
            sphere_cylinder(pos_b, *radius, pos_a, rot_a, *cr, *height).map(flip)
        }
        (Box { half_extents }, Cylinder { radius, height }) => {
            box_cylinder(pos_a, *half_extents, rot_a, pos_b, rot_b, *radius, *height)
        }
        (Cylinder { radius, height }, Box { half_extents }) => {
            box_cylinder(pos_b, *half_extents, rot_b, pos_a, rot_a, *radius, *height).map(flip)
        }
        (
            Cylinder {
                radius: ra,
                height: ha,
            },
            Cylinder {
                radius: rb,
                height: hb,
            },
        ) => cylinder_cylinder(
            pos_a, rot_a, *ra, *ha, pos_b, rot_b, *rb, *hb, shape_a, shape_b, gjk_fallback,
        ),
    }
}

fn flip(mut contact: ContactGeometry) -> ContactGeometry {
    contact.normal = -contact.normal;
    contact
}

/// Distance compare between centres; contact point sits midway between the
/// two surfaces along the centre axis.
pub fn sphere_sphere(
    pos_a: Vec3,
    radius_a: f32,
    pos_b: Vec3,
    radius_b: f32,
) -> Option<ContactGeometry> {
    let delta = pos_b - pos_a;
    let combined = radius_a + radius_b;
    let dist_sq = delta.length_squared();
    if dist_sq > combined * combined {
        return None;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > 1e-6 { delta / dist } else { Vec3::X };
    let penetration = combined - dist;
    let point = pos_a + normal * (radius_a - penetration * 0.5);

    Some(ContactGeometry {
        point,
        normal,
        penetration,
    })
}

/// Fast path for two unrotated boxes: SAT on the three world axes, smallest
/// overlap wins, contact point at the centre of the overlap region.
pub fn aligned_box_box(
    pos_a: Vec3,
    half_a: Vec3,
    pos_b: Vec3,
    half_b: Vec3,
) -> Option<ContactGeometry> {
    let delta = pos_b - pos_a;
    let overlap = half_a + half_b - delta.abs();
    if overlap.x <= 0.0 || overlap.y <= 0.0 || overlap.z <= 0.0 {
        return None;
    }

    let axis = if overlap.x <= overlap.y && overlap.x <= overlap.z {
        0
    } else if overlap.y <= overlap.z {
        1
    } else {
        2
    };

    let mut normal = Vec3::ZERO;
    normal[axis] = 1.0f32.copysign(delta[axis]);

    let a = Aabb::from_center_half_extents(pos_a, half_a);
    let b = Aabb::from_center_half_extents(pos_b, half_b);
    let point = (a.min.max(b.min) + a.max.min(b.max)) * 0.5;

    Some(ContactGeometry {
        point,
        normal,
        penetration: overlap[axis],
    })
}

/// Full 15-axis SAT through the shared OBB routine.
pub fn obb_box_box(
    pos_a: Vec3,
    half_a: Vec3,
    rot_a: Quat,
    pos_b: Vec3,
    half_b: Vec3,
    rot_b: Quat,
) -> Option<ContactGeometry> {
    let obb_a = Obb::new(pos_a, half_a, rot_a);
    let obb_b = Obb::new(pos_b, half_b, rot_b);
    let (normal, penetration) = obb_a.separating_axis_overlap(&obb_b)?;

    // Support point of A along the contact axis, pulled back half the
    // overlap.
    let point = pos_a + normal * (obb_a.projected_radius(normal) - penetration * 0.5);

    Some(ContactGeometry {
        point,
        normal,
        penetration,
    })
}

/// Clamps the sphere centre into the box (axis-aligned or local frame) and
/// compares the residual against the radius. Handles centres inside the box
/// by escaping through the nearest face.
pub fn box_sphere(
    box_pos: Vec3,
    half_extents: Vec3,
    box_rot: Quat,
    sphere_pos: Vec3,
    radius: f32,
) -> Option<ContactGeometry> {
    // Work in the box's local frame; the axis-aligned case is the identity
    // transform.
    let local_center = if is_axis_aligned(box_rot) {
        sphere_pos - box_pos
    } else {
        box_rot.conjugate() * (sphere_pos - box_pos)
    };

    let clamped = local_center.clamp(-half_extents, half_extents);
    let delta = local_center - clamped;
    let dist_sq = delta.length_squared();

    if dist_sq > radius * radius {
        return None;
    }

    let (local_normal, penetration, local_point) = if dist_sq > 1e-12 {
        // Centre outside the box: push along the surface residual.
        let dist = dist_sq.sqrt();
        (delta / dist, radius - dist, clamped)
    } else {
        // Centre inside: escape through the face with the least clearance.
        let clearance = half_extents - local_center.abs();
        let axis = if clearance.x <= clearance.y && clearance.x <= clearance.z {
            0
        } else if clearance.y <= clearance.z {
            1
        } else {
            2
        };
        let mut normal = Vec3::ZERO;
        normal[axis] = 1.0f32.copysign(local_center[axis]);
        let mut surface = local_center;
        surface[axis] = half_extents[axis].copysign(local_center[axis]);
        (normal, clearance[axis] + radius, surface)
    };

    // Normal points from the box (A) toward the sphere (B).
    let world_normal = if is_axis_aligned(box_rot) {
        local_normal
    } else {
        box_rot * local_normal
    };
    let world_point = if is_axis_aligned(box_rot) {
        box_pos + local_point
    } else {
        box_pos + box_rot * local_point
    };

    Some(ContactGeometry {
        point: world_point,
        normal: world_normal,
        penetration,
    })
}

/// Sphere against a Y-up cylinder, classified in the cylinder's local frame
/// into cap, side, and interior regions. The returned normal points from
/// the sphere (A) toward the cylinder (B).
pub fn sphere_cylinder(
    sphere_pos: Vec3,
    sphere_radius: f32,
    cyl_pos: Vec3,
    cyl_rot: Quat,
    cyl_radius: f32,
    cyl_height: f32,
) -> Option<ContactGeometry> {
    let local = cyl_rot.conjugate() * (sphere_pos - cyl_pos);
    let half_height = cyl_height * 0.5;
    let radial = Vec3::new(local.x, 0.0, local.z);
    let radial_dist = radial.length();

    let inside_axially = local.y.abs() <= half_height;
    let inside_radially = radial_dist <= cyl_radius;

    let (escape_dir, penetration, local_surface) = if inside_axially && inside_radially {
        // Interior: take the cheaper of the side and cap escapes.
        let radial_dir = if radial_dist > 1e-6 {
            radial / radial_dist
        } else {
            Vec3::X
        };
        let side_pen = cyl_radius - radial_dist + sphere_radius;
        let cap_pen = half_height - local.y.abs() + sphere_radius;
        if side_pen <= cap_pen {
            (
                radial_dir,
                side_pen,
                radial_dir * cyl_radius + Vec3::new(0.0, local.y, 0.0),
            )
        } else {
            let dir = Vec3::new(0.0, 1.0f32.copysign(local.y), 0.0);
            (
                dir,
                cap_pen,
                Vec3::new(local.x, half_height.copysign(local.y), local.z),
            )
        }
    } else {
        // Exterior: closest point on the capped cylinder surface.
        let clamped_radial = if radial_dist > cyl_radius {
            radial * (cyl_radius / radial_dist)
        } else {
            radial
        };
        let closest = Vec3::new(
            clamped_radial.x,
            local.y.clamp(-half_height, half_height),
            clamped_radial.z,
        );
        let delta = local - closest;
        let dist_sq = delta.length_squared();
        if dist_sq > sphere_radius * sphere_radius {
            return None;
        }
        let dist = dist_sq.sqrt();
        let dir = if dist > 1e-6 { delta / dist } else { Vec3::Y };
        (dir, sphere_radius - dist, closest)
    };

    // escape_dir points from cylinder toward sphere; flip for A→B.
    let normal = cyl_rot * -escape_dir;
    let point = cyl_pos + cyl_rot * local_surface;

    Some(ContactGeometry {
        point,
        normal,
        penetration,
    })
}

/// Box against cylinder through the shared OBB-cylinder routine. Normal
/// points from the box (A) toward the cylinder (B).
#[allow(clippy::too_many_arguments)]
pub fn box_cylinder(
    box_pos: Vec3,
    half_extents: Vec3,
    box_rot: Quat,
    cyl_pos: Vec3,
    cyl_rot: Quat,
    cyl_radius: f32,
    cyl_height: f32,
) -> Option<ContactGeometry> {
    let obb = Obb::new(box_pos, half_extents, box_rot);
    let (point, normal, penetration) =
        obb.intersect_cylinder(cyl_pos, cyl_rot, cyl_radius, cyl_height)?;
    Some(ContactGeometry {
        point,
        normal,
        penetration,
    })
}

/// Parallel-axis cylinders reduce to a 2D disk test plus an interval
/// overlap; skewed pairs fall back to bounding spheres (or GJK+EPA when
/// enabled).
#[allow(clippy::too_many_arguments)]
fn cylinder_cylinder(
    pos_a: Vec3,
    rot_a: Quat,
    radius_a: f32,
    height_a: f32,
    pos_b: Vec3,
    rot_b: Quat,
    radius_b: f32,
    height_b: f32,
    shape_a: &Shape,
    shape_b: &Shape,
    gjk_fallback: bool,
) -> Option<ContactGeometry> {
    let axis_a = rot_a * Vec3::Y;
    let axis_b = rot_b * Vec3::Y;

    if axis_a.dot(axis_b).abs() > 0.999 {
        // Shared axis frame: solve in A's local space.
        let local_b = rot_a.conjugate() * (pos_b - pos_a);
        let radial = Vec3::new(local_b.x, 0.0, local_b.z);
        let radial_dist = radial.length();

        let radial_pen = radius_a + radius_b - radial_dist;
        let axial_pen = (height_a + height_b) * 0.5 - local_b.y.abs();
        if radial_pen <= 0.0 || axial_pen <= 0.0 {
            return None;
        }

        let (local_normal, penetration) = if radial_pen <= axial_pen {
            let dir = if radial_dist > 1e-6 {
                radial / radial_dist
            } else {
                Vec3::X
            };
            (dir, radial_pen)
        } else {
            (Vec3::new(0.0, 1.0f32.copysign(local_b.y), 0.0), axial_pen)
        };

        let surface = local_normal * radius_a + Vec3::new(0.0, local_b.y.clamp(-height_a * 0.5, height_a * 0.5), 0.0);
        return Some(ContactGeometry {
            point: pos_a + rot_a * (surface - local_normal * (penetration * 0.5)),
            normal: rot_a * local_normal,
            penetration,
        });
    }

    if gjk_fallback {
        let (point, normal, penetration) =
            gjk::contact(shape_a, pos_a, rot_a, shape_b, pos_b, rot_b)?;
        return Some(ContactGeometry {
            point,
            normal,
            penetration,
        });
    }

    bounding_sphere_contact(
        pos_a,
        (radius_a * radius_a + height_a * height_a * 0.25).sqrt(),
        pos_b,
        (radius_b * radius_b + height_b * height_b * 0.25).sqrt(),
    )
}

/// Conservative fallback treating both shapes as their bounding spheres.
pub fn bounding_sphere_contact(
    pos_a: Vec3,
    radius_a: f32,
    pos_b: Vec3,
    radius_b: f32,
) -> Option<ContactGeometry> {
    sphere_sphere(pos_a, radius_a, pos_b, radius_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn sphere_sphere_head_on() {
        let contact = sphere_sphere(Vec3::ZERO, 1.0, Vec3::new(1.5, 0.0, 0.0), 1.0).unwrap();
        assert_relative_eq!(contact.penetration, 0.5, epsilon = 1e-5);
        assert_relative_eq!(contact.normal.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(contact.point.x, 0.75, epsilon = 1e-5);

        assert!(sphere_sphere(Vec3::ZERO, 1.0, Vec3::new(2.5, 0.0, 0.0), 1.0).is_none());
    }

    #[test]
    fn coincident_spheres_pick_fallback_normal() {
        let contact = sphere_sphere(Vec3::ZERO, 1.0, Vec3::ZERO, 1.0).unwrap();
        assert_eq!(contact.normal, Vec3::X);
        assert_relative_eq!(contact.penetration, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn aligned_boxes_pick_smallest_axis() {
        let contact = aligned_box_box(
            Vec3::ZERO,
            Vec3::splat(1.0),
            Vec3::new(1.7, 0.5, 0.0),
            Vec3::splat(1.0),
        )
        .unwrap();
        assert_relative_eq!(contact.penetration, 0.3, epsilon = 1e-5);
        assert_relative_eq!(contact.normal.x, 1.0, epsilon = 1e-5);

        assert!(aligned_box_box(
            Vec3::ZERO,
            Vec3::splat(1.0),
            Vec3::new(2.5, 0.0, 0.0),
            Vec3::splat(1.0),
        )
        .is_none());
    }

    #[test]
    fn rotated_boxes_dispatch_to_full_sat() {
        let contact = collide(
            &Shape::Box {
                half_extents: Vec3::splat(1.0),
            },
            Vec3::ZERO,
            Quat::IDENTITY,
            &Shape::Box {
                half_extents: Vec3::splat(1.0),
            },
            Vec3::new(2.2, 0.0, 0.0),
            Quat::from_rotation_z(FRAC_PI_4),
            false,
        )
        .unwrap();
        assert!(contact.penetration > 0.0);
        assert!(contact.normal.x > 0.9);
    }

    #[test]
    fn box_sphere_outside_face() {
        let contact = box_sphere(
            Vec3::ZERO,
            Vec3::splat(1.0),
            Quat::IDENTITY,
            Vec3::new(1.8, 0.0, 0.0),
            1.0,
        )
        .unwrap();
        assert_relative_eq!(contact.penetration, 0.2, epsilon = 1e-5);
        assert_relative_eq!(contact.normal.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(contact.point.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn box_sphere_center_inside_escapes_nearest_face() {
        let contact = box_sphere(
            Vec3::ZERO,
            Vec3::splat(1.0),
            Quat::IDENTITY,
            Vec3::new(0.9, 0.0, 0.0),
            0.5,
        )
        .unwrap();
        assert_relative_eq!(contact.normal.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(contact.penetration, 0.6, epsilon = 1e-5);
    }

    #[test]
    fn sphere_box_swap_negates_normal() {
        let contact = collide(
            &Shape::Sphere { radius: 1.0 },
            Vec3::new(1.8, 0.0, 0.0),
            Quat::IDENTITY,
            &Shape::Box {
                half_extents: Vec3::splat(1.0),
            },
            Vec3::ZERO,
            Quat::IDENTITY,
            false,
        )
        .unwrap();
        // A is the sphere on +X; the normal must point back toward the box.
        assert_relative_eq!(contact.normal.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn sphere_cylinder_side_contact() {
        let contact = sphere_cylinder(
            Vec3::new(1.8, 0.0, 0.0),
            1.0,
            Vec3::ZERO,
            Quat::IDENTITY,
            1.0,
            2.0,
        )
        .unwrap();
        assert_relative_eq!(contact.penetration, 0.2, epsilon = 1e-5);
        // From sphere toward cylinder.
        assert_relative_eq!(contact.normal.x, -1.0, epsilon = 1e-5);
        assert_relative_eq!(contact.point.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn sphere_cylinder_cap_contact() {
        let contact = sphere_cylinder(
            Vec3::new(0.0, 1.7, 0.0),
            1.0,
            Vec3::ZERO,
            Quat::IDENTITY,
            1.0,
            2.0,
        )
        .unwrap();
        assert_relative_eq!(contact.penetration, 0.3, epsilon = 1e-5);
        assert_relative_eq!(contact.normal.y, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn sphere_cylinder_interior_escapes_side() {
        let contact = sphere_cylinder(
            Vec3::new(0.8, 0.0, 0.0),
            0.2,
            Vec3::ZERO,
            Quat::IDENTITY,
            1.0,
            4.0,
        )
        .unwrap();
        assert!(contact.normal.x < -0.9, "expected side escape");
        assert!(contact.penetration > 0.2);
    }

    #[test]
    fn parallel_cylinders_overlap_radially() {
        let contact = collide(
            &Shape::Cylinder {
                radius: 1.0,
                height: 2.0,
            },
            Vec3::ZERO,
            Quat::IDENTITY,
            &Shape::Cylinder {
                radius: 1.0,
                height: 2.0,
            },
            Vec3::new(1.8, 0.5, 0.0),
            Quat::IDENTITY,
            false,
        )
        .unwrap();
        assert_relative_eq!(contact.penetration, 0.2, epsilon = 1e-5);
        assert_relative_eq!(contact.normal.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn fan_never_produces_contacts() {
        let contact = collide(
            &Shape::Fan {
                radius: 2.0,
                height: 1.0,
                angle: 1.0,
            },
            Vec3::ZERO,
            Quat::IDENTITY,
            &Shape::Sphere { radius: 1.0 },
            Vec3::new(0.5, 0.0, 0.0),
            Quat::IDENTITY,
            true,
        );
        assert!(contact.is_none());
    }

    #[test]
    fn box_cylinder_side_overlap() {
        let contact = collide(
            &Shape::Box {
                half_extents: Vec3::splat(1.0),
            },
            Vec3::ZERO,
            Quat::IDENTITY,
            &Shape::Cylinder {
                radius: 1.0,
                height: 2.0,
            },
            Vec3::new(1.7, 0.0, 0.0),
            Quat::IDENTITY,
            false,
        )
        .unwrap();
        assert!(contact.penetration > 0.0);
        assert!(contact.normal.x > 0.9);
    }
}
