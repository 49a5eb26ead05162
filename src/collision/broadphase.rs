//! Broad phase over the twin BVHs.
//!
//! One proxy per body mirrors that body's cached AABB into the tree. Each
//! awake dynamic body queries the dynamic tree (deduplicating pairs by slot
//! index, except against sleeping partners, which never query for
//! themselves) and the static tree (always). Survivors of the
//! bounding-sphere pre-filter go to the narrow phase.

use glam::Vec3;

use crate::collision::bvh::BvhPrimitive;
use crate::collision::{gjk, narrowphase};
use crate::core::body::{BodyCore, DynamicBody, StaticBody};
use crate::core::geometry::Aabb;
use crate::dynamics::solver::{DynamicContact, StaticContact};
use crate::utils::allocator::Handle;

/// BVH payload for a dynamic body.
#[derive(Debug, Clone, Copy)]
pub struct DynamicProxy {
    pub handle: Handle<DynamicBody>,
    pub bounds: Aabb,
}

impl BvhPrimitive for DynamicProxy {
    fn bounds(&self) -> Aabb {
        self.bounds
    }
}

/// BVH payload for a static body.
#[derive(Debug, Clone, Copy)]
pub struct StaticProxy {
    pub handle: Handle<StaticBody>,
    pub bounds: Aabb,
}

impl BvhPrimitive for StaticProxy {
    fn bounds(&self) -> Aabb {
        self.bounds
    }
}

/// Cheap sphere-sphere rejection on the cached bounding spheres.
pub fn bounding_spheres_overlap(a: &BodyCore, b: &BodyCore) -> bool {
    let combined = a.sphere_radius + b.sphere_radius;
    a.sphere_center.distance_squared(b.sphere_center) <= combined * combined
}

fn material_pair(a: &BodyCore, b: &BodyCore) -> (f32, f32) {
    (
        0.5 * (a.restitution + b.restitution),
        0.5 * (a.friction + b.friction),
    )
}

/// Narrow test for a dynamic-dynamic candidate pair that already passed the
/// broadphase. Returns the prepared-for-solving contact skeleton.
pub fn test_dynamic_pair(
    handle_a: Handle<DynamicBody>,
    body_a: &DynamicBody,
    handle_b: Handle<DynamicBody>,
    body_b: &DynamicBody,
    gjk_fallback: bool,
) -> Option<DynamicContact> {
    if body_a.core.trigger_only || body_b.core.trigger_only {
        return None;
    }
    if !bounding_spheres_overlap(&body_a.core, &body_b.core) {
        return None;
    }

    let geometry = narrowphase::collide(
        &body_a.core.collider.shape,
        body_a.core.position,
        body_a.core.rotation,
        &body_b.core.collider.shape,
        body_b.core.position,
        body_b.core.rotation,
        gjk_fallback,
    )?;

    let (restitution, friction) = material_pair(&body_a.core, &body_b.core);
    Some(DynamicContact::new(
        handle_a, handle_b, geometry, restitution, friction,
    ))
}

/// Narrow test for a dynamic-static candidate pair.
pub fn test_static_pair(
    handle_a: Handle<DynamicBody>,
    body_a: &DynamicBody,
    handle_b: Handle<StaticBody>,
    body_b: &StaticBody,
    gjk_fallback: bool,
) -> Option<StaticContact> {
    if body_a.core.trigger_only || body_b.core.trigger_only {
        return None;
    }
    if !bounding_spheres_overlap(&body_a.core, &body_b.core) {
        return None;
    }

    let geometry = narrowphase::collide(
        &body_a.core.collider.shape,
        body_a.core.position,
        body_a.core.rotation,
        &body_b.core.collider.shape,
        body_b.core.position,
        body_b.core.rotation,
        gjk_fallback,
    )?;

    let (restitution, friction) = material_pair(&body_a.core, &body_b.core);
    Some(StaticContact::new(
        handle_a, handle_b, geometry, restitution, friction,
    ))
}

/// Dedup rule for dynamic pairs found by A's query: keep ascending slot
/// order between two awake bodies; a sleeping partner never runs its own
/// query, so A keeps the pair regardless of order.
pub fn keep_dynamic_pair(index_a: u32, index_b: u32, partner_sleeping: bool) -> bool {
    index_a < index_b || partner_sleeping
}

/// Exact overlap test used for trigger volumes: bounding-sphere pre-filter,
/// then GJK. Any shape combination is allowed here, fans included.
pub fn trigger_overlap(trigger: &BodyCore, other: &BodyCore) -> bool {
    if !bounding_spheres_overlap(trigger, other) {
        return false;
    }
    gjk::overlaps(
        &trigger.collider.shape,
        trigger.position,
        trigger.rotation,
        &other.collider.shape,
        other.position,
        other.rotation,
    )
}

/// Conservative AABB the swept body covers over the step; CCD queries the
/// trees with this.
pub fn swept_aabb(core: &BodyCore, displacement: Vec3) -> Aabb {
    core.aabb.union(&core.aabb.translated(displacement))
}
