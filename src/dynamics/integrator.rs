use glam::Quat;

use crate::core::body::DynamicBody;
use crate::utils::allocator::Pool;

/// Velocity half of the semi-implicit Euler step, once per frame before the
/// substep loop.
pub fn integrate_velocities(bodies: &mut Pool<DynamicBody>, dt: f32) {
    for body in bodies.iter_mut() {
        body.integrate_velocity(dt);
    }
}

/// Position half, once per substep after the solver. Bodies CCD already
/// advanced this frame have consumed their motion and hold still.
pub fn integrate_positions(bodies: &mut Pool<DynamicBody>, dt: f32) {
    for body in bodies.iter_mut() {
        integrate_body_position(body, dt);
    }
}

pub fn integrate_body_position(body: &mut DynamicBody, dt: f32) {
    if body.is_sleeping || body.is_killed || body.core.trigger_only || body.ccd_handled {
        return;
    }

    body.core.position += body.velocity * dt;

    if body.enable_rotation {
        let omega = body.angular_velocity;
        if omega.length_squared() >= 1e-12 {
            // q ← normalize(q + ½·dt·ω̂·q), ω̂ the pure quaternion (0, ω).
            let spin = Quat::from_xyzw(omega.x, omega.y, omega.z, 0.0) * body.core.rotation;
            let q = body.core.rotation;
            body.core.rotation = Quat::from_xyzw(
                q.x + 0.5 * dt * spin.x,
                q.y + 0.5 * dt * spin.y,
                q.z + 0.5 * dt * spin.z,
                q.w + 0.5 * dt * spin.w,
            )
            .normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collider::Collider;
    use approx::assert_relative_eq;
    use glam::Vec3;

    fn body_with(velocity: Vec3, angular: Vec3) -> DynamicBody {
        let mut body = DynamicBody::new(Collider::sphere(1.0), Vec3::ZERO, Quat::IDENTITY, 1.0);
        body.velocity = velocity;
        body.angular_velocity = angular;
        body
    }

    #[test]
    fn position_advances_linearly() {
        let mut body = body_with(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO);
        integrate_body_position(&mut body, 0.5);
        assert_relative_eq!(body.core.position.x, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn quaternion_integration_approximates_axis_angle() {
        let omega = Vec3::new(0.0, 2.0, 0.0);
        let mut body = body_with(Vec3::ZERO, omega);
        let dt = 1.0 / 60.0;
        integrate_body_position(&mut body, dt);

        let expected = Quat::from_axis_angle(Vec3::Y, omega.y * dt);
        let dot = body.core.rotation.dot(expected).abs();
        assert!(dot > 0.9999, "rotation diverged, dot = {dot}");
        assert_relative_eq!(body.core.rotation.length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn rotation_lock_freezes_orientation() {
        let mut body = body_with(Vec3::ZERO, Vec3::new(0.0, 5.0, 0.0));
        body.enable_rotation = false;
        integrate_body_position(&mut body, 0.1);
        assert_eq!(body.core.rotation, Quat::IDENTITY);
    }

    #[test]
    fn ccd_handled_bodies_hold_position() {
        let mut body = body_with(Vec3::new(100.0, 0.0, 0.0), Vec3::ZERO);
        body.ccd_handled = true;
        integrate_body_position(&mut body, 0.1);
        assert_eq!(body.core.position, Vec3::ZERO);
    }
}
