//! Ray casts and volume overlap queries against the world's bodies.
//!
//! Rays test spheres analytically and axis-aligned boxes by the slab
//! method with face-normal recovery; rotated and curved colliders fall back
//! to their world AABB, which is exact enough for picking and sensors.
//! Misses produce empty results, never errors.

use glam::{Quat, Vec3};

use crate::collision::broadphase::{DynamicProxy, StaticProxy};
use crate::collision::bvh::Bvh;
use crate::collision::{gjk, narrowphase};
use crate::core::body::{BodyCore, DynamicBody, StaticBody, TriggerBody};
use crate::core::collider::Shape;
use crate::core::geometry::Ray;
use crate::utils::allocator::{Handle, Pool};

/// Body referenced by a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitBody {
    Dynamic(Handle<DynamicBody>),
    Static(Handle<StaticBody>),
}

#[derive(Debug, Clone, Copy)]
pub struct RaycastHit {
    pub body: HitBody,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerRaycastHit {
    pub trigger: Handle<TriggerBody>,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RaycastQuery {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

impl RaycastQuery {
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance,
        }
    }

    fn ray(&self) -> Ray {
        Ray::new(self.origin, self.direction)
    }
}

/// All hits across both trees, closest first.
pub fn raycast(
    query: &RaycastQuery,
    dynamic_bodies: &Pool<DynamicBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bodies: &Pool<StaticBody>,
    static_bvh: &Bvh<StaticProxy>,
) -> Vec<RaycastHit> {
    let mut hits = Vec::new();
    let ray = query.ray();
    let mut candidates = Vec::new();

    dynamic_bvh.query_ray_fast(&ray, query.max_distance, &mut candidates);
    for &primitive in &candidates {
        let handle = dynamic_bvh.primitives[primitive as usize].handle;
        let Some(body) = dynamic_bodies.get(handle) else {
            continue;
        };
        if body.is_killed {
            continue;
        }
        if let Some((point, normal, distance)) = ray_core_test(query, &body.core) {
            hits.push(RaycastHit {
                body: HitBody::Dynamic(handle),
                point,
                normal,
                distance,
            });
        }
    }

    candidates.clear();
    static_bvh.query_ray_fast(&ray, query.max_distance, &mut candidates);
    for &primitive in &candidates {
        let handle = static_bvh.primitives[primitive as usize].handle;
        let Some(body) = static_bodies.get(handle) else {
            continue;
        };
        if let Some((point, normal, distance)) = ray_core_test(query, &body.core) {
            hits.push(RaycastHit {
                body: HitBody::Static(handle),
                point,
                normal,
                distance,
            });
        }
    }

    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

/// Closest hit only.
pub fn raycast_single(
    query: &RaycastQuery,
    dynamic_bodies: &Pool<DynamicBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bodies: &Pool<StaticBody>,
    static_bvh: &Bvh<StaticProxy>,
) -> Option<RaycastHit> {
    raycast(query, dynamic_bodies, dynamic_bvh, static_bodies, static_bvh)
        .into_iter()
        .next()
}

/// Ray against the trigger pool. Triggers are few and have no tree; a
/// linear scan is the fast path.
pub fn raycast_trigger(
    query: &RaycastQuery,
    triggers: &Pool<TriggerBody>,
) -> Vec<TriggerRaycastHit> {
    let mut hits = Vec::new();
    for (handle, trigger) in triggers.iter_with_handles() {
        if let Some((point, normal, distance)) = ray_core_test(query, &trigger.core) {
            hits.push(TriggerRaycastHit {
                trigger: handle,
                point,
                normal,
                distance,
            });
        }
    }
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

fn ray_core_test(query: &RaycastQuery, core: &BodyCore) -> Option<(Vec3, Vec3, f32)> {
    match core.collider.shape {
        Shape::Sphere { radius } => ray_sphere(query, core.position, radius),
        Shape::Box { half_extents } if core.rotation.w.abs() > 1.0 - 1e-6 => {
            ray_aabb(query, core.position - half_extents, core.position + half_extents)
        }
        _ => {
            // OBB → AABB approximation through the cached bounds.
            ray_aabb(query, core.aabb.min, core.aabb.max)
        }
    }
}

fn ray_sphere(query: &RaycastQuery, center: Vec3, radius: f32) -> Option<(Vec3, Vec3, f32)> {
    let offset = query.origin - center;
    let b = offset.dot(query.direction);
    let c = offset.length_squared() - radius * radius;
    // Origin outside and pointing away: no hit.
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }

    let distance = (-b - discriminant.sqrt()).max(0.0);
    if distance > query.max_distance {
        return None;
    }
    let point = query.origin + query.direction * distance;
    Some((point, (point - center).normalize_or_zero(), distance))
}

fn ray_aabb(query: &RaycastQuery, min: Vec3, max: Vec3) -> Option<(Vec3, Vec3, f32)> {
    let aabb = crate::core::geometry::Aabb::new(min, max);
    let (t_near, t_far) = aabb.ray_intersect(&query.ray())?;
    if t_near > query.max_distance || t_far < 0.0 {
        return None;
    }

    let distance = t_near.max(0.0);
    let point = query.origin + query.direction * distance;

    // Face normal from the dominant axis of the entry point.
    let center = aabb.center();
    let half = aabb.half_extents();
    let local = (point - center) / half.max(Vec3::splat(1e-6));
    let abs = local.abs();
    let mut normal = Vec3::ZERO;
    if abs.x >= abs.y && abs.x >= abs.z {
        normal.x = 1.0f32.copysign(local.x);
    } else if abs.y >= abs.z {
        normal.y = 1.0f32.copysign(local.y);
    } else {
        normal.z = 1.0f32.copysign(local.z);
    }
    Some((point, normal, distance))
}

/// Exact overlap of a probe shape (at identity-or-given rotation) against a
/// body: closed form where one exists, GJK otherwise.
fn core_overlaps_probe(core: &BodyCore, probe: &Shape, probe_pos: Vec3, probe_rot: Quat) -> bool {
    match (probe, &core.collider.shape) {
        (_, Shape::Fan { .. }) | (Shape::Fan { .. }, _) => gjk::overlaps(
            probe,
            probe_pos,
            probe_rot,
            &core.collider.shape,
            core.position,
            core.rotation,
        ),
        _ => narrowphase::collide(
            probe,
            probe_pos,
            probe_rot,
            &core.collider.shape,
            core.position,
            core.rotation,
            true,
        )
        .is_some(),
    }
}

/// Bodies overlapping a world-space sphere.
pub fn query_sphere(
    center: Vec3,
    radius: f32,
    dynamic_bodies: &Pool<DynamicBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bodies: &Pool<StaticBody>,
    static_bvh: &Bvh<StaticProxy>,
) -> Vec<HitBody> {
    let probe = Shape::Sphere { radius };
    let query =
        crate::core::geometry::Aabb::from_center_half_extents(center, Vec3::splat(radius));
    let mut results = Vec::new();
    let mut candidates = Vec::new();

    dynamic_bvh.query_aabb_fast(&query, &mut candidates);
    for &primitive in &candidates {
        let handle = dynamic_bvh.primitives[primitive as usize].handle;
        if let Some(body) = dynamic_bodies.get(handle) {
            if !body.is_killed
                && core_overlaps_probe(&body.core, &probe, center, Quat::IDENTITY)
            {
                results.push(HitBody::Dynamic(handle));
            }
        }
    }

    candidates.clear();
    static_bvh.query_aabb_fast(&query, &mut candidates);
    for &primitive in &candidates {
        let handle = static_bvh.primitives[primitive as usize].handle;
        if let Some(body) = static_bodies.get(handle) {
            if core_overlaps_probe(&body.core, &probe, center, Quat::IDENTITY) {
                results.push(HitBody::Static(handle));
            }
        }
    }

    results
}

/// Bodies overlapping a world-space axis-aligned box.
pub fn query_box(
    center: Vec3,
    half_extents: Vec3,
    dynamic_bodies: &Pool<DynamicBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bodies: &Pool<StaticBody>,
    static_bvh: &Bvh<StaticProxy>,
) -> Vec<HitBody> {
    let probe = Shape::Box { half_extents };
    let query = crate::core::geometry::Aabb::from_center_half_extents(center, half_extents);
    let mut results = Vec::new();
    let mut candidates = Vec::new();

    dynamic_bvh.query_aabb_fast(&query, &mut candidates);
    for &primitive in &candidates {
        let handle = dynamic_bvh.primitives[primitive as usize].handle;
        if let Some(body) = dynamic_bodies.get(handle) {
            if !body.is_killed
                && core_overlaps_probe(&body.core, &probe, center, Quat::IDENTITY)
            {
                results.push(HitBody::Dynamic(handle));
            }
        }
    }

    candidates.clear();
    static_bvh.query_aabb_fast(&query, &mut candidates);
    for &primitive in &candidates {
        let handle = static_bvh.primitives[primitive as usize].handle;
        if let Some(body) = static_bodies.get(handle) {
            if core_overlaps_probe(&body.core, &probe, center, Quat::IDENTITY) {
                results.push(HitBody::Static(handle));
            }
        }
    }

    results
}

/// Trigger volumes whose colliders overlap a world-space sphere.
pub fn query_triggers_in_sphere(
    center: Vec3,
    radius: f32,
    triggers: &Pool<TriggerBody>,
) -> Vec<Handle<TriggerBody>> {
    let probe = Shape::Sphere { radius };
    triggers
        .iter_with_handles()
        .filter(|(_, trigger)| {
            core_overlaps_probe(&trigger.core, &probe, center, Quat::IDENTITY)
        })
        .map(|(handle, _)| handle)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collider::Collider;

    fn build_world_bits() -> (
        Pool<DynamicBody>,
        Bvh<DynamicProxy>,
        Pool<StaticBody>,
        Bvh<StaticProxy>,
    ) {
        let mut dynamics = Pool::new();
        let mut statics = Pool::new();

        let sphere = DynamicBody::new(
            Collider::sphere(1.0),
            Vec3::new(5.0, 0.0, 0.0),
            Quat::IDENTITY,
            1.0,
        );
        let dyn_handle = dynamics.insert(sphere);

        let slab = StaticBody::new(
            Collider::cuboid(Vec3::new(1.0, 2.0, 2.0)),
            Vec3::new(10.0, 0.0, 0.0),
            Quat::IDENTITY,
        );
        let stat_handle = statics.insert(slab);

        let mut dynamic_bvh = Bvh::new(4);
        dynamic_bvh.build(vec![DynamicProxy {
            handle: dyn_handle,
            bounds: dynamics.get(dyn_handle).unwrap().core.aabb,
        }]);
        let mut static_bvh = Bvh::new(4);
        static_bvh.build(vec![StaticProxy {
            handle: stat_handle,
            bounds: statics.get(stat_handle).unwrap().core.aabb,
        }]);

        (dynamics, dynamic_bvh, statics, static_bvh)
    }

    #[test]
    fn raycast_orders_hits_near_to_far() {
        let (dynamics, dynamic_bvh, statics, static_bvh) = build_world_bits();
        let query = RaycastQuery::new(Vec3::ZERO, Vec3::X, 100.0);
        let hits = raycast(&query, &dynamics, &dynamic_bvh, &statics, &static_bvh);

        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance < hits[1].distance);
        assert!(matches!(hits[0].body, HitBody::Dynamic(_)));
        assert!((hits[0].distance - 4.0).abs() < 1e-4);
        assert!((hits[0].normal.x + 1.0).abs() < 1e-4);
    }

    #[test]
    fn raycast_single_returns_closest() {
        let (dynamics, dynamic_bvh, statics, static_bvh) = build_world_bits();
        let query = RaycastQuery::new(Vec3::ZERO, Vec3::X, 100.0);
        let hit = raycast_single(&query, &dynamics, &dynamic_bvh, &statics, &static_bvh).unwrap();
        assert!((hit.distance - 4.0).abs() < 1e-4);
    }

    #[test]
    fn raycast_respects_max_distance() {
        let (dynamics, dynamic_bvh, statics, static_bvh) = build_world_bits();
        let query = RaycastQuery::new(Vec3::ZERO, Vec3::X, 2.0);
        assert!(raycast(&query, &dynamics, &dynamic_bvh, &statics, &static_bvh).is_empty());
    }

    #[test]
    fn box_face_normal_recovered_on_entry_face() {
        let (dynamics, dynamic_bvh, statics, static_bvh) = build_world_bits();
        let query = RaycastQuery::new(Vec3::new(10.0, 10.0, 0.0), Vec3::NEG_Y, 100.0);
        let hits = raycast(&query, &dynamics, &dynamic_bvh, &statics, &static_bvh);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].normal.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn sphere_query_finds_only_nearby_bodies() {
        let (dynamics, dynamic_bvh, statics, static_bvh) = build_world_bits();

        let near = query_sphere(
            Vec3::new(4.0, 0.0, 0.0),
            1.5,
            &dynamics,
            &dynamic_bvh,
            &statics,
            &static_bvh,
        );
        assert_eq!(near.len(), 1);
        assert!(matches!(near[0], HitBody::Dynamic(_)));

        let nothing = query_sphere(
            Vec3::new(-20.0, 0.0, 0.0),
            1.0,
            &dynamics,
            &dynamic_bvh,
            &statics,
            &static_bvh,
        );
        assert!(nothing.is_empty());
    }

    #[test]
    fn box_query_reaches_static_bodies() {
        let (dynamics, dynamic_bvh, statics, static_bvh) = build_world_bits();
        let results = query_box(
            Vec3::new(9.0, 0.0, 0.0),
            Vec3::splat(1.0),
            &dynamics,
            &dynamic_bvh,
            &statics,
            &static_bvh,
        );
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], HitBody::Static(_)));
    }

    #[test]
    fn triggers_in_sphere_scan_the_trigger_pool() {
        let mut triggers = Pool::new();
        let handle = triggers.insert(TriggerBody::new(
            Collider::sphere(1.0),
            Vec3::new(3.0, 0.0, 0.0),
            Quat::IDENTITY,
        ));
        triggers.insert(TriggerBody::new(
            Collider::sphere(1.0),
            Vec3::new(30.0, 0.0, 0.0),
            Quat::IDENTITY,
        ));

        let found = query_triggers_in_sphere(Vec3::new(2.0, 0.0, 0.0), 1.0, &triggers);
        assert_eq!(found, vec![handle]);
    }
}
