//! Gilbert-Johnson-Keerthi overlap test with EPA penetration extraction.
//!
//! This is the fallback path behind the closed-form narrowphase tests and
//! the exact test used for trigger overlaps, where any shape can meet any
//! other.

use std::cell::RefCell;

use glam::{Quat, Vec3};
use log::debug;

use crate::core::collider::Shape;

const MAX_GJK_ITERATIONS: usize = 32;
const MAX_EPA_ITERATIONS: usize = 48;
const MAX_EPA_VERTICES: usize = 64;
const MAX_EPA_FACES: usize = 128;
const EPSILON: f32 = 1e-6;

/// EPA cannot expand a flat or collinear simplex; callers treat this as
/// "no contact".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpaFailure {
    Degenerate,
}

/// Furthest point of a shape at the given pose along a world-space
/// direction. Closed form per shape.
pub fn furthest(shape: &Shape, position: Vec3, rotation: Quat, direction: Vec3) -> Vec3 {
    match *shape {
        Shape::Sphere { radius } => position + direction.normalize_or_zero() * radius,
        Shape::Box { half_extents } => {
            let local = rotation.conjugate() * direction;
            let corner = Vec3::new(
                half_extents.x.copysign(local.x),
                half_extents.y.copysign(local.y),
                half_extents.z.copysign(local.z),
            );
            position + rotation * corner
        }
        Shape::Cylinder { radius, height } => {
            let local = rotation.conjugate() * direction;
            let radial = Vec3::new(local.x, 0.0, local.z).normalize_or_zero() * radius;
            let axial = Vec3::new(0.0, (height * 0.5).copysign(local.y), 0.0);
            position + rotation * (radial + axial)
        }
        Shape::Fan {
            radius,
            height,
            angle,
        } => {
            // Sector of a cylinder, opening symmetrically around local +X.
            let local = rotation.conjugate() * direction;
            let half_angle = angle * 0.5;
            let theta = local.z.atan2(local.x).clamp(-half_angle, half_angle);
            let rim = Vec3::new(theta.cos() * radius, 0.0, theta.sin() * radius);
            // The apex (axis line) belongs to the sector too.
            let radial = if rim.dot(local) >= 0.0 { rim } else { Vec3::ZERO };
            let axial = Vec3::new(0.0, (height * 0.5).copysign(local.y), 0.0);
            position + rotation * (radial + axial)
        }
    }
}

fn support(
    shape_a: &Shape,
    pos_a: Vec3,
    rot_a: Quat,
    shape_b: &Shape,
    pos_b: Vec3,
    rot_b: Quat,
    direction: Vec3,
) -> Vec3 {
    furthest(shape_a, pos_a, rot_a, direction) - furthest(shape_b, pos_b, rot_b, -direction)
}

/// Simplex of at most four Minkowski-difference points.
#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    points: [Vec3; 4],
    len: usize,
}

impl Simplex {
    fn push(&mut self, point: Vec3) {
        debug_assert!(self.len < 4);
        self.points[self.len] = point;
        self.len += 1;
    }

    fn remove(&mut self, index: usize) {
        debug_assert!(index < self.len);
        for i in index..self.len - 1 {
            self.points[i] = self.points[i + 1];
        }
        self.len -= 1;
    }
}

/// Boolean overlap test; the cheap half of the pair used by trigger
/// detection.
pub fn overlaps(
    shape_a: &Shape,
    pos_a: Vec3,
    rot_a: Quat,
    shape_b: &Shape,
    pos_b: Vec3,
    rot_b: Quat,
) -> bool {
    run_gjk(shape_a, pos_a, rot_a, shape_b, pos_b, rot_b).is_some()
}

/// Full contact fallback: GJK for the overlap decision, EPA for depth and
/// normal. Returns `(point, normal, penetration)` with the normal pointing
/// from A toward B, or `None` when the shapes are apart or the polytope
/// degenerates.
pub fn contact(
    shape_a: &Shape,
    pos_a: Vec3,
    rot_a: Quat,
    shape_b: &Shape,
    pos_b: Vec3,
    rot_b: Quat,
) -> Option<(Vec3, Vec3, f32)> {
    let simplex = run_gjk(shape_a, pos_a, rot_a, shape_b, pos_b, rot_b)?;

    let (mut normal, depth) =
        match expand_polytope(&simplex, shape_a, pos_a, rot_a, shape_b, pos_b, rot_b) {
            Ok(result) => result,
            Err(EpaFailure::Degenerate) => {
                debug!("epa: degenerate simplex, dropping contact");
                return None;
            }
        };

    // Enforce the A→B convention.
    let relative = pos_b - pos_a;
    if normal.dot(relative) < 0.0 {
        normal = -normal;
    }

    let point = furthest(shape_a, pos_a, rot_a, normal) - normal * depth * 0.5;
    Some((point, normal, depth))
}

fn run_gjk(
    shape_a: &Shape,
    pos_a: Vec3,
    rot_a: Quat,
    shape_b: &Shape,
    pos_b: Vec3,
    rot_b: Quat,
) -> Option<Simplex> {
    let mut direction = pos_b - pos_a;
    if direction.length_squared() < EPSILON {
        direction = Vec3::X;
    }

    let mut simplex = Simplex::default();

    for _ in 0..MAX_GJK_ITERATIONS {
        let point = support(shape_a, pos_a, rot_a, shape_b, pos_b, rot_b, direction);
        if point.dot(direction) < 0.0 {
            return None;
        }

        simplex.push(point);
        if evolve_simplex(&mut simplex, &mut direction) {
            return Some(simplex);
        }
    }

    None
}

/// One step of the 1→2→3→4 simplex evolution. Returns true when the
/// tetrahedron encloses the origin.
fn evolve_simplex(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    match simplex.len {
        1 => {
            *direction = -simplex.points[0];
            false
        }
        2 => {
            let a = simplex.points[1];
            let b = simplex.points[0];
            let ab = b - a;
            let ao = -a;

            let dir = ab.cross(ao).cross(ab);
            if dir.length_squared() < EPSILON {
                // Origin on the line; pick any perpendicular.
                let axis = if ab.x.abs() < 0.1 { Vec3::X } else { Vec3::Y };
                *direction = ab.cross(axis);
            } else {
                *direction = dir;
            }
            false
        }
        3 => {
            let a = simplex.points[2];
            let b = simplex.points[1];
            let c = simplex.points[0];
            let ab = b - a;
            let ac = c - a;
            let ao = -a;
            let abc = ab.cross(ac);

            if abc.cross(ac).dot(ao) > 0.0 {
                simplex.remove(1);
                *direction = ac.cross(ao).cross(ac);
                false
            } else if ab.cross(abc).dot(ao) > 0.0 {
                simplex.remove(0);
                *direction = ab.cross(ao).cross(ab);
                false
            } else {
                if abc.length_squared() < EPSILON {
                    *direction = Vec3::Y;
                } else if abc.dot(ao) > 0.0 {
                    *direction = abc;
                } else {
                    *direction = -abc;
                }
                false
            }
        }
        4 => {
            let a = simplex.points[3];
            let b = simplex.points[2];
            let c = simplex.points[1];
            let d = simplex.points[0];
            let ab = b - a;
            let ac = c - a;
            let ad = d - a;
            let ao = -a;
            let abc = ab.cross(ac);
            let acd = ac.cross(ad);
            let adb = ad.cross(ab);

            if abc.dot(ao) > 0.0 {
                simplex.remove(0);
                *direction = abc;
                false
            } else if acd.dot(ao) > 0.0 {
                simplex.remove(2);
                *direction = acd;
                false
            } else if adb.dot(ao) > 0.0 {
                simplex.remove(1);
                *direction = adb;
                false
            } else {
                true
            }
        }
        _ => false,
    }
}

/// Scratch storage for the polytope, reused per thread and reset at entry.
#[derive(Default)]
struct EpaScratch {
    vertices: Vec<Vec3>,
    faces: Vec<[u16; 3]>,
    edges: Vec<(u16, u16)>,
}

thread_local! {
    static EPA_SCRATCH: RefCell<EpaScratch> = RefCell::new(EpaScratch::default());
}

#[allow(clippy::too_many_arguments)]
fn expand_polytope(
    simplex: &Simplex,
    shape_a: &Shape,
    pos_a: Vec3,
    rot_a: Quat,
    shape_b: &Shape,
    pos_b: Vec3,
    rot_b: Quat,
) -> Result<(Vec3, f32), EpaFailure> {
    if simplex.len < 4 {
        return Err(EpaFailure::Degenerate);
    }

    EPA_SCRATCH.with(|scratch| {
        let scratch = &mut *scratch.borrow_mut();
        scratch.vertices.clear();
        scratch.faces.clear();
        scratch.edges.clear();

        // Seed vertices, dropping coincident ones. Fewer than four distinct
        // vertices means the simplex is flat or collinear.
        for &point in &simplex.points[..4] {
            if scratch
                .vertices
                .iter()
                .all(|v| v.distance_squared(point) > EPSILON)
            {
                scratch.vertices.push(point);
            }
        }
        if scratch.vertices.len() < 4 {
            return Err(EpaFailure::Degenerate);
        }

        scratch
            .faces
            .extend_from_slice(&[[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]]);
        // Orient every face outward from the origin inside the polytope.
        for face in scratch.faces.iter_mut() {
            let ab = scratch.vertices[face[1] as usize] - scratch.vertices[face[0] as usize];
            let ac = scratch.vertices[face[2] as usize] - scratch.vertices[face[0] as usize];
            if scratch.vertices[face[0] as usize].dot(ab.cross(ac)) < 0.0 {
                face.swap(1, 2);
            }
        }

        for _ in 0..MAX_EPA_ITERATIONS {
            let (min_dist, min_normal) = closest_face(&scratch.vertices, &scratch.faces)?;
            if min_dist < EPSILON {
                return Ok((min_normal, EPSILON));
            }

            let new_point = support(shape_a, pos_a, rot_a, shape_b, pos_b, rot_b, min_normal);
            let distance = new_point.dot(min_normal);
            if distance - min_dist < EPSILON {
                return Ok((min_normal, min_dist + EPSILON));
            }

            if scratch.vertices.len() >= MAX_EPA_VERTICES
                || scratch.faces.len() >= MAX_EPA_FACES
            {
                return Ok((min_normal, min_dist + EPSILON));
            }

            insert_vertex(scratch, new_point);
        }

        let (min_dist, min_normal) = closest_face(&scratch.vertices, &scratch.faces)?;
        Ok((min_normal, min_dist + EPSILON))
    })
}

fn closest_face(vertices: &[Vec3], faces: &[[u16; 3]]) -> Result<(f32, Vec3), EpaFailure> {
    let mut min_dist = f32::MAX;
    let mut min_normal = Vec3::ZERO;

    for face in faces {
        let a = vertices[face[0] as usize];
        let ab = vertices[face[1] as usize] - a;
        let ac = vertices[face[2] as usize] - a;
        let normal = ab.cross(ac).normalize_or_zero();
        if normal == Vec3::ZERO {
            continue;
        }
        let dist = a.dot(normal);
        if dist < min_dist {
            min_dist = dist;
            min_normal = normal;
        }
    }

    if min_normal == Vec3::ZERO {
        Err(EpaFailure::Degenerate)
    } else {
        Ok((min_dist, min_normal))
    }
}

/// Removes every face visible from the new vertex and retriangulates the
/// silhouette boundary against it.
fn insert_vertex(scratch: &mut EpaScratch, point: Vec3) {
    let new_index = scratch.vertices.len() as u16;
    scratch.vertices.push(point);
    scratch.edges.clear();

    let mut i = 0;
    while i < scratch.faces.len() {
        let [a, b, c] = scratch.faces[i];
        let va = scratch.vertices[a as usize];
        let ab = scratch.vertices[b as usize] - va;
        let ac = scratch.vertices[c as usize] - va;
        let normal = ab.cross(ac).normalize_or_zero();

        if normal.dot(point - va) > 0.0 {
            for edge in [(a, b), (b, c), (c, a)] {
                // An edge shared with another visible face cancels out,
                // leaving only the silhouette.
                if let Some(pos) = scratch
                    .edges
                    .iter()
                    .position(|&(u, v)| (u, v) == (edge.1, edge.0))
                {
                    scratch.edges.swap_remove(pos);
                } else {
                    scratch.edges.push(edge);
                }
            }
            scratch.faces.swap_remove(i);
        } else {
            i += 1;
        }
    }

    let edges = std::mem::take(&mut scratch.edges);
    for &(u, v) in &edges {
        if scratch.faces.len() < MAX_EPA_FACES {
            scratch.faces.push([u, v, new_index]);
        }
    }
    scratch.edges = edges;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn overlapping_spheres_report_contact_with_depth() {
        let a = Shape::Sphere { radius: 1.0 };
        let b = Shape::Sphere { radius: 1.0 };
        let (point, normal, depth) = contact(
            &a,
            Vec3::ZERO,
            Quat::IDENTITY,
            &b,
            Vec3::new(1.5, 0.0, 0.0),
            Quat::IDENTITY,
        )
        .expect("overlapping spheres must collide");

        assert!(depth > 0.3 && depth < 0.7, "depth {depth} out of range");
        assert!(normal.x > 0.9);
        assert!(point.x > 0.0 && point.x < 1.5);
    }

    #[test]
    fn separated_shapes_do_not_collide() {
        let a = Shape::Sphere { radius: 1.0 };
        let b = Shape::Box {
            half_extents: Vec3::splat(1.0),
        };
        assert!(contact(
            &a,
            Vec3::ZERO,
            Quat::IDENTITY,
            &b,
            Vec3::new(5.0, 0.0, 0.0),
            Quat::IDENTITY,
        )
        .is_none());
        assert!(!overlaps(
            &a,
            Vec3::ZERO,
            Quat::IDENTITY,
            &b,
            Vec3::new(5.0, 0.0, 0.0),
            Quat::IDENTITY,
        ));
    }

    #[test]
    fn box_cylinder_overlap_detected() {
        let a = Shape::Box {
            half_extents: Vec3::splat(1.0),
        };
        let b = Shape::Cylinder {
            radius: 1.0,
            height: 2.0,
        };
        assert!(overlaps(
            &a,
            Vec3::ZERO,
            Quat::IDENTITY,
            &b,
            Vec3::new(1.5, 0.0, 0.0),
            Quat::IDENTITY,
        ));
    }

    #[test]
    fn fan_support_stays_inside_sector() {
        let fan = Shape::Fan {
            radius: 2.0,
            height: 1.0,
            angle: std::f32::consts::FRAC_PI_2,
        };
        // Support opposite the sector opening collapses to the axis.
        let behind = furthest(&fan, Vec3::ZERO, Quat::IDENTITY, Vec3::new(-1.0, 0.0, 0.0));
        assert_relative_eq!(behind.x, 0.0, epsilon = 1e-5);

        // Support into the opening reaches the rim.
        let ahead = furthest(&fan, Vec3::ZERO, Quat::IDENTITY, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(ahead.x, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn fan_overlaps_only_within_its_sector() {
        let fan = Shape::Fan {
            radius: 2.0,
            height: 1.0,
            angle: std::f32::consts::FRAC_PI_2,
        };
        let probe = Shape::Sphere { radius: 0.25 };

        assert!(overlaps(
            &fan,
            Vec3::ZERO,
            Quat::IDENTITY,
            &probe,
            Vec3::new(1.5, 0.0, 0.0),
            Quat::IDENTITY,
        ));
        assert!(!overlaps(
            &fan,
            Vec3::ZERO,
            Quat::IDENTITY,
            &probe,
            Vec3::new(-1.5, 0.0, 0.0),
            Quat::IDENTITY,
        ));
    }

    #[test]
    fn touching_spheres_resolve_along_center_axis() {
        let a = Shape::Sphere { radius: 1.0 };
        let b = Shape::Sphere { radius: 1.0 };
        if let Some((_, normal, depth)) = contact(
            &a,
            Vec3::ZERO,
            Quat::IDENTITY,
            &b,
            Vec3::new(1.999, 0.0, 0.0),
            Quat::IDENTITY,
        ) {
            assert!(normal.x > 0.7, "normal {normal} not along centers");
            assert!(depth < 0.1);
        }
    }
}
