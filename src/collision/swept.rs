//! Time-of-impact tests for continuous collision detection.
//!
//! `swept_test` sweeps shape A along a displacement (the body's motion over
//! the whole step) against a stationary shape B and reports the earliest
//! impact fraction in `[0, 1]` plus the surface normal of B at the impact,
//! oriented against the incoming motion. Pairs without an exact sweep use
//! the conservative bounding-sphere approximation: reported TOIs are never
//! late, only early.

use glam::{Quat, Vec3};

use crate::core::collider::Shape;
use crate::core::geometry::Aabb;

#[derive(Debug, Clone, Copy)]
pub struct SweptHit {
    pub toi: f32,
    pub normal: Vec3,
}

/// Dispatches the pair to its sweep routine. `displacement` is A's motion
/// over the step, relative to B.
pub fn swept_test(
    shape_a: &Shape,
    pos_a: Vec3,
    rot_a: Quat,
    displacement: Vec3,
    shape_b: &Shape,
    pos_b: Vec3,
    rot_b: Quat,
) -> Option<SweptHit> {
    use Shape::*;

    match (shape_a, shape_b) {
        (Sphere { radius: ra }, Sphere { radius: rb }) => {
            swept_sphere_sphere(pos_a, *ra, displacement, pos_b, *rb)
        }
        (Sphere { radius }, Box { half_extents }) => {
            swept_sphere_box(pos_a, *radius, displacement, pos_b, *half_extents, rot_b)
        }
        (Box { half_extents }, Sphere { radius }) => {
            // Swap roles: sweep the sphere backwards through the box.
            swept_sphere_box(pos_b, *radius, -displacement, pos_a, *half_extents, rot_a)
                .map(|hit| SweptHit {
                    toi: hit.toi,
                    normal: -hit.normal,
                })
        }
        (Box { half_extents: ha }, Box { half_extents: hb })
            if is_axis_aligned(rot_a) && is_axis_aligned(rot_b) =>
        {
            swept_aligned_box_box(pos_a, *ha, displacement, pos_b, *hb)
        }
        _ => swept_bounding_spheres(
            pos_a,
            bounding_radius(shape_a),
            displacement,
            pos_b,
            bounding_radius(shape_b),
        ),
    }
}

fn is_axis_aligned(rotation: Quat) -> bool {
    rotation.w.abs() > 1.0 - 1e-6
}

fn bounding_radius(shape: &Shape) -> f32 {
    match *shape {
        Shape::Sphere { radius } => radius,
        Shape::Box { half_extents } => half_extents.length(),
        Shape::Cylinder { radius, height } | Shape::Fan { radius, height, .. } => {
            (radius * radius + height * height * 0.25).sqrt()
        }
    }
}

/// Earlier non-negative root of `|(A + t·d) − B|² = (rₐ+r_b)²`. Already
/// overlapping pairs report `t = 0`.
pub fn swept_sphere_sphere(
    pos_a: Vec3,
    radius_a: f32,
    displacement: Vec3,
    pos_b: Vec3,
    radius_b: f32,
) -> Option<SweptHit> {
    let combined = radius_a + radius_b;
    let offset = pos_a - pos_b;

    if offset.length_squared() <= combined * combined {
        return Some(SweptHit {
            toi: 0.0,
            normal: offset.normalize_or_zero(),
        });
    }

    let a = displacement.length_squared();
    if a < 1e-12 {
        return None;
    }
    let b = 2.0 * offset.dot(displacement);
    let c = offset.length_squared() - combined * combined;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }

    let toi = (-b - discriminant.sqrt()) / (2.0 * a);
    if !(0.0..=1.0).contains(&toi) {
        return None;
    }

    let normal = (offset + displacement * toi).normalize_or_zero();
    Some(SweptHit { toi, normal })
}

/// Slab test of the sphere centre against the box expanded by the sphere
/// radius, in the box's local frame. The normal comes from the axis of the
/// last `t_near` update, signed against the incoming motion.
pub fn swept_sphere_box(
    sphere_pos: Vec3,
    radius: f32,
    displacement: Vec3,
    box_pos: Vec3,
    half_extents: Vec3,
    box_rot: Quat,
) -> Option<SweptHit> {
    let inv = box_rot.conjugate();
    let local_origin = inv * (sphere_pos - box_pos);
    let local_disp = inv * displacement;
    let expanded = Aabb::from_center_half_extents(Vec3::ZERO, half_extents + Vec3::splat(radius));

    let (toi, local_normal) = sweep_point_aabb(local_origin, local_disp, &expanded)?;
    Some(SweptHit {
        toi,
        normal: box_rot * local_normal,
    })
}

/// Minkowski-sum reduction: A's centre as a moving point against B inflated
/// by the sum of half extents.
pub fn swept_aligned_box_box(
    pos_a: Vec3,
    half_a: Vec3,
    displacement: Vec3,
    pos_b: Vec3,
    half_b: Vec3,
) -> Option<SweptHit> {
    let inflated = Aabb::from_center_half_extents(pos_b, half_a + half_b);
    let (toi, normal) = sweep_point_aabb(pos_a, displacement, &inflated)?;
    Some(SweptHit { toi, normal })
}

/// Conservative sweep treating both shapes as their bounding spheres.
pub fn swept_bounding_spheres(
    pos_a: Vec3,
    radius_a: f32,
    displacement: Vec3,
    pos_b: Vec3,
    radius_b: f32,
) -> Option<SweptHit> {
    swept_sphere_sphere(pos_a, radius_a, displacement, pos_b, radius_b)
}

/// Slab method for a point swept through an AABB. Returns `(t, face_normal)`
/// with `t` clamped into `[0, 1]`.
fn sweep_point_aabb(origin: Vec3, displacement: Vec3, aabb: &Aabb) -> Option<(f32, Vec3)> {
    let mut t_near = f32::MIN;
    let mut t_far = f32::MAX;
    let mut near_axis = 0;

    for axis in 0..3 {
        let o = origin[axis];
        let d = displacement[axis];
        let (lo, hi) = (aabb.min[axis], aabb.max[axis]);

        if d.abs() < 1e-12 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }

        let inv = 1.0 / d;
        let mut t0 = (lo - o) * inv;
        let mut t1 = (hi - o) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > t_near {
            t_near = t0;
            near_axis = axis;
        }
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }

    if t_near > 1.0 || t_far < 0.0 {
        return None;
    }

    let mut normal = Vec3::ZERO;
    normal[near_axis] = -1.0f32.copysign(displacement[near_axis]);
    Some((t_near.max(0.0), normal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sphere_sphere_toi_matches_analytic_solution() {
        // A unit sphere at x=-5 moving 10 units toward a unit sphere at the
        // origin touches when the centres are 2 apart: after 3 units, t=0.3.
        let hit = swept_sphere_sphere(
            Vec3::new(-5.0, 0.0, 0.0),
            1.0,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ZERO,
            1.0,
        )
        .unwrap();
        assert_relative_eq!(hit.toi, 0.3, epsilon = 1e-5);
        assert!(hit.normal.x < -0.99);
    }

    #[test]
    fn overlapping_spheres_report_immediate_impact() {
        let hit = swept_sphere_sphere(
            Vec3::new(1.0, 0.0, 0.0),
            1.0,
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::ZERO,
            1.5,
        )
        .unwrap();
        assert_eq!(hit.toi, 0.0);
        assert!(hit.normal.x > 0.99);
    }

    #[test]
    fn receding_spheres_never_hit() {
        assert!(swept_sphere_sphere(
            Vec3::new(5.0, 0.0, 0.0),
            1.0,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ZERO,
            1.0,
        )
        .is_none());
    }

    #[test]
    fn sphere_box_sweep_hits_expanded_face() {
        // Sphere of radius 0.1 at x=-5 sweeping +10 into a slab of
        // half-width 0.5: contact at x=-0.6, i.e. t=0.44.
        let hit = swept_sphere_box(
            Vec3::new(-5.0, 0.0, 0.0),
            0.1,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ZERO,
            Vec3::new(0.5, 5.0, 5.0),
            Quat::IDENTITY,
        )
        .unwrap();
        assert_relative_eq!(hit.toi, 0.44, epsilon = 1e-4);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn sphere_box_sweep_misses_offset_path() {
        assert!(swept_sphere_box(
            Vec3::new(-5.0, 10.0, 0.0),
            0.1,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ZERO,
            Vec3::new(0.5, 5.0, 5.0),
            Quat::IDENTITY,
        )
        .is_none());
    }

    #[test]
    fn aligned_box_box_sweep_uses_minkowski_sum() {
        // Unit cubes: surfaces meet when the centres are 1 apart; moving
        // from x=-3 by 4 units → t = (3-1)/4 = 0.5.
        let hit = swept_aligned_box_box(
            Vec3::new(-3.0, 0.0, 0.0),
            Vec3::splat(0.5),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::ZERO,
            Vec3::splat(0.5),
        )
        .unwrap();
        assert_relative_eq!(hit.toi, 0.5, epsilon = 1e-5);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn skewed_pairs_fall_back_to_bounding_spheres() {
        let hit = swept_test(
            &Shape::Cylinder {
                radius: 0.5,
                height: 1.0,
            },
            Vec3::new(-4.0, 0.0, 0.0),
            Quat::from_rotation_z(0.5),
            Vec3::new(8.0, 0.0, 0.0),
            &Shape::Cylinder {
                radius: 0.5,
                height: 1.0,
            },
            Vec3::ZERO,
            Quat::IDENTITY,
        );
        // The conservative sweep must report an impact no later than the
        // exact one would.
        let hit = hit.unwrap();
        assert!(hit.toi > 0.0 && hit.toi < 0.5);
    }

    #[test]
    fn toi_outside_step_window_is_rejected() {
        assert!(swept_sphere_sphere(
            Vec3::new(-50.0, 0.0, 0.0),
            1.0,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ZERO,
            1.0,
        )
        .is_none());
    }
}
