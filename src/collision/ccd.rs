//! Continuous collision detection for fast movers.
//!
//! Bodies above the CCD speed threshold sweep their collider along the
//! step's displacement against both trees before the substep loop runs.
//! The earliest impact inside the `(0.01, 0.99)` window advances the body
//! to just short of its time of impact and reflects its velocity, so the
//! discrete solver never sees a tunnelled state.

use glam::Vec3;

use crate::collision::broadphase::{swept_aabb, DynamicProxy, StaticProxy};
use crate::collision::bvh::Bvh;
use crate::collision::swept::{swept_test, SweptHit};
use crate::config::CCD_THRESHOLD;
use crate::core::body::{DynamicBody, StaticBody};

/// TOI window: impacts essentially at the start of the step are already
/// discrete contacts, impacts at the very end will be caught next frame.
const TOI_MIN: f32 = 0.01;
const TOI_MAX: f32 = 0.99;

/// Fraction of the TOI actually advanced, leaving a skin of separation.
const TOI_ADVANCE: f32 = 0.98;

/// Tangential damping factor per unit of averaged friction.
const TANGENTIAL_FRICTION_SCALE: f32 = 0.5;

/// Earliest impact found for a swept body.
#[derive(Debug, Clone, Copy)]
pub struct CcdImpact {
    pub toi: f32,
    pub normal: Vec3,
    pub restitution: f32,
    pub friction: f32,
}

/// Counters surfaced in the per-step log line. The coarse fixed-chunk
/// driver guards one instance with a mutex; the work-stealing driver keeps
/// one per worker and merges.
#[derive(Debug, Default, Clone, Copy)]
pub struct CcdStats {
    pub swept_bodies: usize,
    pub tested_pairs: usize,
    pub impacts: usize,
}

impl CcdStats {
    pub fn merge(&mut self, other: &CcdStats) {
        self.swept_bodies += other.swept_bodies;
        self.tested_pairs += other.tested_pairs;
        self.impacts += other.impacts;
    }
}

/// Whether the body moves fast enough (relative to its own size) to risk
/// tunnelling this step.
pub fn needs_ccd(body: &DynamicBody, dt: f32) -> bool {
    if body.is_sleeping || body.is_killed || body.core.trigger_only {
        return false;
    }
    if body.velocity.length_squared() < CCD_THRESHOLD * CCD_THRESHOLD {
        return false;
    }
    // Displacements shorter than the collider's thinnest dimension cannot
    // skip over anything the discrete pass would miss.
    let travel = body.velocity.length() * dt;
    travel >= body.core.collider.min_extent() * 0.5
}

/// Sweeps one body against both trees and returns the earliest impact in
/// the TOI window. Pure read phase: candidates come from the trees, partner
/// state from the pool slots.
#[allow(clippy::too_many_arguments)]
pub fn detect_impact(
    body: &DynamicBody,
    self_index: u32,
    dt: f32,
    dynamic_bvh: &Bvh<DynamicProxy>,
    dynamic_slots: &[Option<DynamicBody>],
    static_bvh: &Bvh<StaticProxy>,
    static_slots: &[Option<StaticBody>],
    candidates: &mut Vec<u32>,
    stats: &mut CcdStats,
) -> Option<CcdImpact> {
    let displacement = body.velocity * dt;
    let query = swept_aabb(&body.core, displacement);
    stats.swept_bodies += 1;

    let mut best: Option<CcdImpact> = None;
    let mut consider = |hit: SweptHit, restitution: f32, friction: f32| {
        if hit.toi <= TOI_MIN || hit.toi >= TOI_MAX {
            return;
        }
        if best.map_or(true, |b| hit.toi < b.toi) {
            best = Some(CcdImpact {
                toi: hit.toi,
                normal: hit.normal,
                restitution,
                friction,
            });
        }
    };

    candidates.clear();
    dynamic_bvh.query_aabb_fast(&query, candidates);
    for &primitive in candidates.iter() {
        let proxy = &dynamic_bvh.primitives[primitive as usize];
        if proxy.handle.index() == self_index {
            continue;
        }
        let Some(other) = dynamic_slots
            .get(proxy.handle.index() as usize)
            .and_then(|slot| slot.as_ref())
        else {
            continue;
        };
        if other.is_killed || other.core.trigger_only {
            continue;
        }

        stats.tested_pairs += 1;
        let relative = (body.velocity - other.velocity) * dt;
        if let Some(hit) = swept_test(
            &body.core.collider.shape,
            body.core.position,
            body.core.rotation,
            relative,
            &other.core.collider.shape,
            other.core.position,
            other.core.rotation,
        ) {
            consider(
                hit,
                0.5 * (body.core.restitution + other.core.restitution),
                0.5 * (body.core.friction + other.core.friction),
            );
        }
    }

    candidates.clear();
    static_bvh.query_aabb_fast(&query, candidates);
    for &primitive in candidates.iter() {
        let proxy = &static_bvh.primitives[primitive as usize];
        let Some(other) = static_slots
            .get(proxy.handle.index() as usize)
            .and_then(|slot| slot.as_ref())
        else {
            continue;
        };
        if other.core.trigger_only {
            continue;
        }

        stats.tested_pairs += 1;
        if let Some(hit) = swept_test(
            &body.core.collider.shape,
            body.core.position,
            body.core.rotation,
            displacement,
            &other.core.collider.shape,
            other.core.position,
            other.core.rotation,
        ) {
            consider(
                hit,
                0.5 * (body.core.restitution + other.core.restitution),
                0.5 * (body.core.friction + other.core.friction),
            );
        }
    }

    if best.is_some() {
        stats.impacts += 1;
    }
    best
}

/// Write phase: advances the body to just before its impact, reflects the
/// normal velocity with the averaged restitution, damps the tangential
/// component by half the averaged friction, and flags the body as handled.
pub fn apply_impact(body: &mut DynamicBody, impact: &CcdImpact, dt: f32) {
    let advance = TOI_ADVANCE * impact.toi;
    body.core.position += body.velocity * dt * advance;
    body.core.refresh_bounds();

    let vn = body.velocity.dot(impact.normal);
    if vn < 0.0 {
        let normal_component = impact.normal * vn;
        let tangential = body.velocity - normal_component;
        body.velocity = tangential * (1.0 - TANGENTIAL_FRICTION_SCALE * impact.friction)
            - normal_component * impact.restitution;
    }

    body.ccd_handled = true;
    body.wake_up();
}
