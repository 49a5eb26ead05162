use glam::Vec3;
use log::warn;

use crate::config::{DRAG_COEFFICIENT, MAX_DRAG_GRAVITY_RATIO};
use crate::core::body::DynamicBody;
use crate::utils::allocator::{Handle, Pool};

/// Applies weight to every live body: `F += g · m · gravity_scale`.
pub fn apply_gravity(bodies: &mut Pool<DynamicBody>, gravity: Vec3) {
    for body in bodies.iter_mut() {
        if body.is_sleeping || body.is_killed || body.core.trigger_only {
            continue;
        }
        body.force += gravity * body.mass * body.gravity_scale;
    }
}

/// Quadratic air drag: `F = −½ · ρ · |v|² · C_d · A · v̂`, using each
/// collider's precomputed cross-section. The resulting acceleration is
/// clamped to a multiple of gravity so a feather-light body with a huge
/// collider cannot explode the integration.
pub fn apply_air_drag(bodies: &mut Pool<DynamicBody>, air_density: f32, gravity_magnitude: f32) {
    let max_acceleration = MAX_DRAG_GRAVITY_RATIO * gravity_magnitude;

    for body in bodies.iter_mut() {
        if body.is_sleeping || body.is_killed || body.core.trigger_only {
            continue;
        }

        let speed_sq = body.velocity.length_squared();
        if speed_sq <= 1e-6 {
            continue;
        }

        let speed = speed_sq.sqrt();
        let direction = body.velocity / speed;
        let mut magnitude = 0.5
            * air_density
            * speed_sq
            * DRAG_COEFFICIENT
            * body.core.collider.cross_sectional_area;

        let acceleration = magnitude * body.inv_mass;
        if acceleration > max_acceleration && max_acceleration > 0.0 {
            warn!(
                "drag saturated: {:.1} m/s² clamped to {:.1} m/s²",
                acceleration, max_acceleration
            );
            magnitude = max_acceleration * body.mass;
        }

        body.force -= direction * magnitude;
    }
}

/// User-supplied external force, run once per step after gravity and drag.
pub trait ForceGenerator: Send + Sync {
    fn apply(&self, body: &mut DynamicBody, dt: f32);
}

/// Hookean spring anchored to a fixed world point.
pub struct SpringForce {
    pub anchor: Vec3,
    pub rest_length: f32,
    pub spring_constant: f32,
    pub damping: f32,
}

impl ForceGenerator for SpringForce {
    fn apply(&self, body: &mut DynamicBody, _dt: f32) {
        let displacement = body.core.position - self.anchor;
        let distance = displacement.length();
        if distance < 1e-6 {
            return;
        }

        let extension = distance - self.rest_length;
        let spring_force = -self.spring_constant * extension * (displacement / distance);
        let damping_force = -self.damping * body.velocity;
        body.force += spring_force + damping_force;
    }
}

/// Collection of registered force generators applied each frame.
#[derive(Default)]
pub struct ForceRegistry {
    forces: Vec<Box<dyn ForceGenerator>>,
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self { forces: Vec::new() }
    }

    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.forces.push(Box::new(force));
    }

    pub fn clear(&mut self) {
        self.forces.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    pub fn apply_all(&self, bodies: &mut Pool<DynamicBody>, dt: f32) {
        for force in &self.forces {
            for body in bodies.iter_mut() {
                if body.is_sleeping || body.is_killed || body.core.trigger_only {
                    continue;
                }
                force.apply(body, dt);
            }
        }
    }

    pub fn apply_force_to(&self, bodies: &mut Pool<DynamicBody>, handle: Handle<DynamicBody>, dt: f32) {
        if let Some(body) = bodies.get_mut(handle) {
            for force in &self.forces {
                force.apply(body, dt);
            }
        }
    }
}
