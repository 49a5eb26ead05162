//! Sequential-impulse contact solver.
//!
//! Contacts are prepared once per substep (effective masses, Baumgarte and
//! restitution bias, tangent basis), warmstarted from the previous frame's
//! cached impulses on the first substep, then iterated with accumulated
//! clamped impulses: the normal impulse stays non-negative, the two tangent
//! impulses stay inside the Coulomb box `±μ·jn`.

use std::collections::HashMap;

use glam::Vec3;

use crate::collision::narrowphase::ContactGeometry;
use crate::config::{
    BAUMGARTE_BETA, PENETRATION_SLOP, RESTITUTION_VELOCITY_THRESHOLD, WARMSTART_COEF,
};
use crate::core::body::{DynamicBody, StaticBody};
use crate::utils::allocator::{Handle, Pool};

/// Contact between two dynamic bodies. Normal points from A toward B.
#[derive(Debug, Clone)]
pub struct DynamicContact {
    pub body_a: Handle<DynamicBody>,
    pub body_b: Handle<DynamicBody>,
    pub point: Vec3,
    pub normal: Vec3,
    pub penetration: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: [f32; 2],
    pub normal_mass: f32,
    pub tangent_mass: [f32; 2],
    pub bias: f32,
    pub r_a: Vec3,
    pub r_b: Vec3,
    pub tangent1: Vec3,
    pub tangent2: Vec3,
    pub restitution: f32,
    pub friction: f32,
}

impl DynamicContact {
    pub fn new(
        body_a: Handle<DynamicBody>,
        body_b: Handle<DynamicBody>,
        geometry: ContactGeometry,
        restitution: f32,
        friction: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            point: geometry.point,
            normal: geometry.normal,
            penetration: geometry.penetration,
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
            normal_mass: 0.0,
            tangent_mass: [0.0; 2],
            bias: 0.0,
            r_a: Vec3::ZERO,
            r_b: Vec3::ZERO,
            tangent1: Vec3::ZERO,
            tangent2: Vec3::ZERO,
            restitution,
            friction,
        }
    }
}

/// Contact between a dynamic body (always A) and a static body. Statics
/// carry no velocity state, so the relative velocity is `-v_a(point)` and
/// only `r_a` exists.
#[derive(Debug, Clone)]
pub struct StaticContact {
    pub body_a: Handle<DynamicBody>,
    pub body_b: Handle<StaticBody>,
    pub point: Vec3,
    pub normal: Vec3,
    pub penetration: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: [f32; 2],
    pub normal_mass: f32,
    pub tangent_mass: [f32; 2],
    pub bias: f32,
    pub r_a: Vec3,
    pub tangent1: Vec3,
    pub tangent2: Vec3,
    pub restitution: f32,
    pub friction: f32,
}

impl StaticContact {
    pub fn new(
        body_a: Handle<DynamicBody>,
        body_b: Handle<StaticBody>,
        geometry: ContactGeometry,
        restitution: f32,
        friction: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            point: geometry.point,
            normal: geometry.normal,
            penetration: geometry.penetration,
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
            normal_mass: 0.0,
            tangent_mass: [0.0; 2],
            bias: 0.0,
            r_a: Vec3::ZERO,
            tangent1: Vec3::ZERO,
            tangent2: Vec3::ZERO,
            restitution,
            friction,
        }
    }
}

/// Impulses carried across frames for warmstarting, keyed by pair hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedImpulse {
    pub normal: f32,
    pub tangent: [f32; 2],
}

/// Symmetric key for a dynamic-dynamic pair: low slot index in the low
/// word.
pub fn dynamic_pair_key(a: u32, b: u32) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    ((hi as u64) << 32) | lo as u64
}

/// Key for a dynamic-static pair; the static index carries a top-bit flag
/// so it can never collide with a dynamic index.
pub fn static_pair_key(dynamic_index: u32, static_index: u32) -> u64 {
    ((dynamic_index as u64) << 32) | (static_index | 0x8000_0000) as u64
}

/// Carries last frame's impulses into this frame's contacts, scaled by the
/// warmstart coefficient.
pub fn seed_contacts_from_cache(
    dynamic_contacts: &mut [DynamicContact],
    static_contacts: &mut [StaticContact],
    prev_dynamic: &HashMap<u64, CachedImpulse>,
    prev_static: &HashMap<u64, CachedImpulse>,
) {
    for contact in dynamic_contacts.iter_mut() {
        let key = dynamic_pair_key(contact.body_a.index(), contact.body_b.index());
        if let Some(cached) = prev_dynamic.get(&key) {
            contact.normal_impulse = cached.normal * WARMSTART_COEF;
            contact.tangent_impulse = [
                cached.tangent[0] * WARMSTART_COEF,
                cached.tangent[1] * WARMSTART_COEF,
            ];
        }
    }
    for contact in static_contacts.iter_mut() {
        let key = static_pair_key(contact.body_a.index(), contact.body_b.index());
        if let Some(cached) = prev_static.get(&key) {
            contact.normal_impulse = cached.normal * WARMSTART_COEF;
            contact.tangent_impulse = [
                cached.tangent[0] * WARMSTART_COEF,
                cached.tangent[1] * WARMSTART_COEF,
            ];
        }
    }
}

/// Angular part of the effective mass along `axis`, zero for bodies with
/// rotation locked.
fn angular_mass_term(body: &DynamicBody, r: Vec3, axis: Vec3) -> f32 {
    if !body.enable_rotation {
        return 0.0;
    }
    let rxa = r.cross(axis);
    rxa.dot(body.inv_inertia * rxa)
}

fn contact_bias(penetration: f32, approach_speed: f32, restitution: f32, dt: f32) -> f32 {
    let mut bias = (BAUMGARTE_BETA / dt) * (penetration - PENETRATION_SLOP).max(0.0);
    if approach_speed < RESTITUTION_VELOCITY_THRESHOLD {
        bias += -restitution * approach_speed;
    }
    bias
}

/// Computes lever arms, tangent basis, effective masses, and bias for a
/// dynamic-dynamic contact.
pub fn prepare_dynamic_contact(
    bodies: &mut Pool<DynamicBody>,
    contact: &mut DynamicContact,
    dt: f32,
) {
    debug_assert!(contact.penetration >= 0.0);
    let Some((body_a, body_b)) = bodies.get2_mut(contact.body_a, contact.body_b) else {
        contact.normal_mass = 0.0;
        contact.tangent_mass = [0.0; 2];
        return;
    };

    contact.r_a = contact.point - body_a.core.position;
    contact.r_b = contact.point - body_b.core.position;
    let (tangent1, tangent2) = contact.normal.any_orthonormal_pair();
    contact.tangent1 = tangent1;
    contact.tangent2 = tangent2;

    let inv_mass_sum = body_a.inv_mass + body_b.inv_mass;
    let normal_k = inv_mass_sum
        + angular_mass_term(body_a, contact.r_a, contact.normal)
        + angular_mass_term(body_b, contact.r_b, contact.normal);
    contact.normal_mass = safe_inverse(normal_k);

    for (slot, tangent) in [tangent1, tangent2].into_iter().enumerate() {
        let k = inv_mass_sum
            + angular_mass_term(body_a, contact.r_a, tangent)
            + angular_mass_term(body_b, contact.r_b, tangent);
        contact.tangent_mass[slot] = safe_inverse(k);
    }

    let v_rel = body_b.velocity_at_point(contact.point) - body_a.velocity_at_point(contact.point);
    contact.bias = contact_bias(
        contact.penetration,
        v_rel.dot(contact.normal),
        contact.restitution,
        dt,
    );
}

/// Static specialisation: body B contributes no mass and no velocity.
pub fn prepare_static_contact(
    bodies: &mut Pool<DynamicBody>,
    contact: &mut StaticContact,
    dt: f32,
) {
    debug_assert!(contact.penetration >= 0.0);
    let Some(body_a) = bodies.get_mut(contact.body_a) else {
        contact.normal_mass = 0.0;
        contact.tangent_mass = [0.0; 2];
        return;
    };

    contact.r_a = contact.point - body_a.core.position;
    let (tangent1, tangent2) = contact.normal.any_orthonormal_pair();
    contact.tangent1 = tangent1;
    contact.tangent2 = tangent2;

    contact.normal_mass = safe_inverse(
        body_a.inv_mass + angular_mass_term(body_a, contact.r_a, contact.normal),
    );
    for (slot, tangent) in [tangent1, tangent2].into_iter().enumerate() {
        contact.tangent_mass[slot] =
            safe_inverse(body_a.inv_mass + angular_mass_term(body_a, contact.r_a, tangent));
    }

    let v_rel = -body_a.velocity_at_point(contact.point);
    contact.bias = contact_bias(
        contact.penetration,
        v_rel.dot(contact.normal),
        contact.restitution,
        dt,
    );
}

/// Re-applies the cached impulses as real impulses at the contact point.
/// Runs on the first substep only.
pub fn warmstart_dynamic_contact(bodies: &mut Pool<DynamicBody>, contact: &DynamicContact) {
    let Some((body_a, body_b)) = bodies.get2_mut(contact.body_a, contact.body_b) else {
        return;
    };
    let impulse = contact.normal * contact.normal_impulse
        + contact.tangent1 * contact.tangent_impulse[0]
        + contact.tangent2 * contact.tangent_impulse[1];
    if impulse.length_squared() <= f32::EPSILON {
        return;
    }
    body_a.apply_impulse_at_point_quiet(-impulse, contact.point);
    body_b.apply_impulse_at_point_quiet(impulse, contact.point);
}

pub fn warmstart_static_contact(bodies: &mut Pool<DynamicBody>, contact: &StaticContact) {
    let Some(body_a) = bodies.get_mut(contact.body_a) else {
        return;
    };
    let impulse = contact.normal * contact.normal_impulse
        + contact.tangent1 * contact.tangent_impulse[0]
        + contact.tangent2 * contact.tangent_impulse[1];
    if impulse.length_squared() <= f32::EPSILON {
        return;
    }
    body_a.apply_impulse_at_point_quiet(-impulse, contact.point);
}

/// One sequential-impulse iteration on a dynamic-dynamic contact.
/// `with_bias = false` is the stabilization variant: same clamping, no
/// positional or restitution feed.
pub fn resolve_dynamic_contact(
    bodies: &mut Pool<DynamicBody>,
    contact: &mut DynamicContact,
    with_bias: bool,
) {
    let Some((body_a, body_b)) = bodies.get2_mut(contact.body_a, contact.body_b) else {
        return;
    };

    // Normal impulse, accumulated and clamped to stay repulsive.
    let v_rel =
        body_b.velocity_at_point(contact.point) - body_a.velocity_at_point(contact.point);
    let vn = v_rel.dot(contact.normal);
    // The stabilization variant only converges still-approaching contacts;
    // clawing back separating velocity here would cancel the bias and
    // restitution the main pass just injected.
    if !with_bias && vn >= 0.0 {
        return;
    }
    let target = if with_bias { -vn + contact.bias } else { -vn };
    let new_impulse = (contact.normal_impulse + contact.normal_mass * target).max(0.0);
    let delta = new_impulse - contact.normal_impulse;
    contact.normal_impulse = new_impulse;

    let impulse = contact.normal * delta;
    body_a.apply_impulse_at_point_quiet(-impulse, contact.point);
    body_b.apply_impulse_at_point_quiet(impulse, contact.point);

    // Coulomb friction along both tangents, clamped to the current normal
    // impulse.
    let limit = contact.friction * contact.normal_impulse;
    for (slot, tangent) in [contact.tangent1, contact.tangent2].into_iter().enumerate() {
        let v_rel =
            body_b.velocity_at_point(contact.point) - body_a.velocity_at_point(contact.point);
        let vt = v_rel.dot(tangent);
        let new_tangent =
            (contact.tangent_impulse[slot] - contact.tangent_mass[slot] * vt).clamp(-limit, limit);
        let delta = new_tangent - contact.tangent_impulse[slot];
        contact.tangent_impulse[slot] = new_tangent;

        let impulse = tangent * delta;
        body_a.apply_impulse_at_point_quiet(-impulse, contact.point);
        body_b.apply_impulse_at_point_quiet(impulse, contact.point);
    }
}

/// One iteration on a dynamic-static contact.
pub fn resolve_static_contact(
    bodies: &mut Pool<DynamicBody>,
    contact: &mut StaticContact,
    with_bias: bool,
) {
    let Some(body_a) = bodies.get_mut(contact.body_a) else {
        return;
    };

    let v_rel = -body_a.velocity_at_point(contact.point);
    let vn = v_rel.dot(contact.normal);
    if !with_bias && vn >= 0.0 {
        return;
    }
    let target = if with_bias { -vn + contact.bias } else { -vn };
    let new_impulse = (contact.normal_impulse + contact.normal_mass * target).max(0.0);
    let delta = new_impulse - contact.normal_impulse;
    contact.normal_impulse = new_impulse;

    body_a.apply_impulse_at_point_quiet(-(contact.normal * delta), contact.point);

    let limit = contact.friction * contact.normal_impulse;
    for (slot, tangent) in [contact.tangent1, contact.tangent2].into_iter().enumerate() {
        let v_rel = -body_a.velocity_at_point(contact.point);
        let vt = v_rel.dot(tangent);
        let new_tangent =
            (contact.tangent_impulse[slot] - contact.tangent_mass[slot] * vt).clamp(-limit, limit);
        let delta = new_tangent - contact.tangent_impulse[slot];
        contact.tangent_impulse[slot] = new_tangent;

        body_a.apply_impulse_at_point_quiet(-(tangent * delta), contact.point);
    }
}

/// Rolled-up impulse totals for the per-step log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolverMetrics {
    pub dynamic_contacts: usize,
    pub static_contacts: usize,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum: f32,
}

impl SolverMetrics {
    pub fn record(
        &mut self,
        dynamic_contacts: &[DynamicContact],
        static_contacts: &[StaticContact],
    ) {
        self.dynamic_contacts += dynamic_contacts.len();
        self.static_contacts += static_contacts.len();
        for contact in dynamic_contacts {
            self.normal_impulse_sum += contact.normal_impulse.abs();
            self.tangent_impulse_sum +=
                contact.tangent_impulse[0].abs() + contact.tangent_impulse[1].abs();
        }
        for contact in static_contacts {
            self.normal_impulse_sum += contact.normal_impulse.abs();
            self.tangent_impulse_sum +=
                contact.tangent_impulse[0].abs() + contact.tangent_impulse[1].abs();
        }
    }
}

fn safe_inverse(value: f32) -> f32 {
    if value.abs() < 1e-9 {
        0.0
    } else {
        1.0 / value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collider::Collider;
    use approx::assert_relative_eq;
    use glam::Quat;

    fn make_pair(
        mass_a: f32,
        vel_a: Vec3,
        mass_b: f32,
        vel_b: Vec3,
    ) -> (Pool<DynamicBody>, Handle<DynamicBody>, Handle<DynamicBody>) {
        let mut pool = Pool::new();
        let mut a = DynamicBody::new(Collider::sphere(1.0), Vec3::ZERO, Quat::IDENTITY, mass_a);
        a.velocity = vel_a;
        let mut b = DynamicBody::new(
            Collider::sphere(1.0),
            Vec3::new(1.9, 0.0, 0.0),
            Quat::IDENTITY,
            mass_b,
        );
        b.velocity = vel_b;
        let ha = pool.insert(a);
        let hb = pool.insert(b);
        (pool, ha, hb)
    }

    fn head_on_contact(
        ha: Handle<DynamicBody>,
        hb: Handle<DynamicBody>,
        restitution: f32,
        friction: f32,
        penetration: f32,
    ) -> DynamicContact {
        DynamicContact::new(
            ha,
            hb,
            ContactGeometry {
                point: Vec3::new(0.95, 0.0, 0.0),
                normal: Vec3::X,
                penetration,
            },
            restitution,
            friction,
        )
    }

    #[test]
    fn momentum_is_conserved_across_resolution() {
        // Masses 2 and 3, restitution 0, friction 0, penetration 0.1.
        let (mut pool, ha, hb) =
            make_pair(2.0, Vec3::new(5.0, 0.0, 0.0), 3.0, Vec3::new(-3.0, 0.0, 0.0));
        let mut contact = head_on_contact(ha, hb, 0.0, 0.0, 0.1);

        prepare_dynamic_contact(&mut pool, &mut contact, 1.0 / 60.0);
        resolve_dynamic_contact(&mut pool, &mut contact, true);

        let a = pool.get(ha).unwrap();
        let b = pool.get(hb).unwrap();
        let momentum = 2.0 * a.velocity + 3.0 * b.velocity;
        assert_relative_eq!(momentum.x, 2.0 * 5.0 + 3.0 * -3.0, epsilon = 1e-3);
        assert_relative_eq!(momentum.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(momentum.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn normal_impulse_never_goes_negative() {
        let (mut pool, ha, hb) =
            make_pair(1.0, Vec3::new(-5.0, 0.0, 0.0), 1.0, Vec3::new(5.0, 0.0, 0.0));
        // Bodies already separating: the solver must not pull them together.
        let mut contact = head_on_contact(ha, hb, 0.5, 0.3, 0.05);

        prepare_dynamic_contact(&mut pool, &mut contact, 1.0 / 60.0);
        for _ in 0..8 {
            resolve_dynamic_contact(&mut pool, &mut contact, true);
            assert!(contact.normal_impulse >= 0.0);
        }
    }

    #[test]
    fn frictionless_restitution_zero_leaves_no_approach_velocity() {
        let (mut pool, ha, hb) =
            make_pair(1.0, Vec3::new(10.0, 0.0, 0.0), 1.0, Vec3::new(-10.0, 0.0, 0.0));
        let mut contact = head_on_contact(ha, hb, 0.0, 0.0, 0.0);

        prepare_dynamic_contact(&mut pool, &mut contact, 1.0 / 60.0);
        for _ in 0..4 {
            resolve_dynamic_contact(&mut pool, &mut contact, true);
        }

        let a = pool.get(ha).unwrap();
        let b = pool.get(hb).unwrap();
        let approach = (b.velocity - a.velocity).dot(Vec3::X);
        assert!(approach >= -1e-4, "still approaching: {approach}");
    }

    #[test]
    fn tangent_impulse_respects_coulomb_limit() {
        let (mut pool, ha, hb) = make_pair(
            1.0,
            Vec3::new(2.0, 8.0, 0.0),
            1.0,
            Vec3::new(-2.0, 0.0, 0.0),
        );
        let mut contact = head_on_contact(ha, hb, 0.0, 0.4, 0.0);

        prepare_dynamic_contact(&mut pool, &mut contact, 1.0 / 60.0);
        for _ in 0..6 {
            resolve_dynamic_contact(&mut pool, &mut contact, true);
            let limit = contact.friction * contact.normal_impulse + 1e-5;
            assert!(contact.tangent_impulse[0].abs() <= limit);
            assert!(contact.tangent_impulse[1].abs() <= limit);
        }
    }

    #[test]
    fn static_contact_stops_incoming_body() {
        let mut dynamics = Pool::new();
        let mut statics = Pool::new();
        let mut body = DynamicBody::new(
            Collider::sphere(1.0),
            Vec3::new(1.5, 0.0, 0.0),
            Quat::IDENTITY,
            1.0,
        );
        body.velocity = Vec3::new(-10.0, 0.0, 0.0);
        let ha = dynamics.insert(body);
        let hs = statics.insert(StaticBody::new(
            Collider::cuboid(Vec3::splat(1.0)),
            Vec3::ZERO,
            Quat::IDENTITY,
        ));

        let mut contact = StaticContact::new(
            ha,
            hs,
            ContactGeometry {
                point: Vec3::new(1.0, 0.0, 0.0),
                // From the dynamic body toward the static one.
                normal: Vec3::new(-1.0, 0.0, 0.0),
                penetration: 0.0,
            },
            0.0,
            0.0,
        );

        prepare_static_contact(&mut dynamics, &mut contact, 1.0 / 60.0);
        for _ in 0..4 {
            resolve_static_contact(&mut dynamics, &mut contact, true);
        }

        let body = dynamics.get(ha).unwrap();
        assert!(body.velocity.x > -10.0, "impact must slow the body");
        assert!(contact.normal_impulse > 0.0);
    }

    #[test]
    fn pair_keys_are_symmetric_and_disjoint() {
        assert_eq!(dynamic_pair_key(3, 7), dynamic_pair_key(7, 3));
        assert_ne!(dynamic_pair_key(3, 7), dynamic_pair_key(3, 8));
        // A static pair can never alias a dynamic pair with the same raw
        // indices.
        assert_ne!(static_pair_key(3, 7), dynamic_pair_key(3, 7));
    }

    #[test]
    fn warmstart_seed_scales_cached_impulses() {
        let (_, ha, hb) = make_pair(1.0, Vec3::ZERO, 1.0, Vec3::ZERO);
        let mut contacts = vec![head_on_contact(ha, hb, 0.0, 0.3, 0.01)];
        let mut prev = HashMap::new();
        prev.insert(
            dynamic_pair_key(ha.index(), hb.index()),
            CachedImpulse {
                normal: 1.0,
                tangent: [0.5, -0.25],
            },
        );

        seed_contacts_from_cache(&mut contacts, &mut [], &prev, &HashMap::new());
        assert_relative_eq!(contacts[0].normal_impulse, WARMSTART_COEF, epsilon = 1e-6);
        assert_relative_eq!(
            contacts[0].tangent_impulse[1],
            -0.25 * WARMSTART_COEF,
            epsilon = 1e-6
        );
    }
}
