use glam::{Quat, Vec3};

use super::collider::{Collider, Shape};
use super::geometry::Aabb;
use crate::config::{DEFAULT_ANGULAR_DAMPING, DEFAULT_LINEAR_DAMPING};

/// State shared by every body class: pose, collider, material coefficients,
/// and the bounds caches the broadphase reads.
#[derive(Debug, Clone)]
pub struct BodyCore {
    pub position: Vec3,
    pub rotation: Quat,
    pub collider: Collider,
    pub restitution: f32,
    pub friction: f32,
    /// Detects overlaps but never resolves impulses. Always set for fans.
    pub trigger_only: bool,
    pub aabb: Aabb,
    pub sphere_center: Vec3,
    pub sphere_radius: f32,
}

impl BodyCore {
    pub fn new(collider: Collider, position: Vec3, rotation: Quat) -> Self {
        let mut core = Self {
            position,
            rotation,
            trigger_only: collider.is_fan(),
            collider,
            restitution: 0.1,
            friction: 0.5,
            aabb: Aabb::empty(),
            sphere_center: position,
            sphere_radius: 0.0,
        };
        core.refresh_bounds();
        core
    }

    /// Recomputes the cached AABB and bounding sphere from the current pose.
    /// Must run before any broadphase query observes the body.
    pub fn refresh_bounds(&mut self) {
        self.aabb = self.collider.aabb(self.position, self.rotation);
        self.sphere_center = self.position;
        self.sphere_radius = self.collider.bounding_radius();
    }
}

/// Rigid body integrated by the simulation.
#[derive(Debug, Clone)]
pub struct DynamicBody {
    pub core: BodyCore,
    pub mass: f32,
    pub inv_mass: f32,
    /// Diagonal of the inverse inertia tensor in the body's principal frame.
    pub inv_inertia: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force: Vec3,
    pub torque: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub enable_rotation: bool,
    pub sleep_timer: f32,
    pub is_sleeping: bool,
    pub is_killed: bool,
    /// Set when CCD already advanced this body to its time of impact this
    /// step; position integration skips it for the remaining substeps.
    pub ccd_handled: bool,
}

impl DynamicBody {
    pub fn new(collider: Collider, position: Vec3, rotation: Quat, mass: f32) -> Self {
        let mass = mass.max(f32::EPSILON);
        let mut body = Self {
            core: BodyCore::new(collider, position, rotation),
            mass,
            inv_mass: 1.0 / mass,
            inv_inertia: Vec3::ONE,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            gravity_scale: 1.0,
            enable_rotation: true,
            sleep_timer: 0.0,
            is_sleeping: false,
            is_killed: false,
            ccd_handled: false,
        };
        body.set_shape_inertia();
        body
    }

    /// Assigns the inverse inertia matching the collider shape at the
    /// current mass.
    pub fn set_shape_inertia(&mut self) {
        match self.core.collider.shape {
            Shape::Sphere { radius } => self.set_sphere_inertia(radius),
            Shape::Box { half_extents } => self.set_box_inertia(half_extents),
            Shape::Cylinder { radius, height } | Shape::Fan { radius, height, .. } => {
                self.set_cylinder_inertia(radius, height)
            }
        }
    }

    pub fn set_sphere_inertia(&mut self, radius: f32) {
        let inertia = 0.4 * self.mass * radius * radius;
        self.inv_inertia = Vec3::splat(safe_inverse(inertia));
    }

    pub fn set_box_inertia(&mut self, half_extents: Vec3) {
        let lx = half_extents.x * 2.0;
        let ly = half_extents.y * 2.0;
        let lz = half_extents.z * 2.0;
        let factor = self.mass / 12.0;
        self.inv_inertia = Vec3::new(
            safe_inverse(factor * (ly * ly + lz * lz)),
            safe_inverse(factor * (lx * lx + lz * lz)),
            safe_inverse(factor * (lx * lx + ly * ly)),
        );
    }

    pub fn set_cylinder_inertia(&mut self, radius: f32, height: f32) {
        let lateral = (1.0 / 12.0) * self.mass * (3.0 * radius * radius + height * height);
        let axial = 0.5 * self.mass * radius * radius;
        self.inv_inertia = Vec3::new(
            safe_inverse(lateral),
            safe_inverse(axial),
            safe_inverse(lateral),
        );
    }

    /// Changes the mass, rescaling the inverse inertia so the shape's tensor
    /// stays consistent (inertia is proportional to mass).
    pub fn set_mass(&mut self, mass: f32) {
        let mass = mass.max(f32::EPSILON);
        let ratio = self.mass / mass;
        self.inv_inertia *= ratio;
        self.mass = mass;
        self.inv_mass = 1.0 / mass;
    }

    pub fn apply_force(&mut self, force: Vec3) {
        self.force += force;
        self.wake_up();
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.torque += torque;
        self.wake_up();
    }

    pub fn apply_force_at_point(&mut self, force: Vec3, point: Vec3) {
        self.force += force;
        self.torque += (point - self.core.position).cross(force);
        self.wake_up();
    }

    pub fn apply_impulse(&mut self, impulse: Vec3) {
        self.velocity += impulse * self.inv_mass;
        self.wake_up();
    }

    pub fn apply_impulse_at_point(&mut self, impulse: Vec3, point: Vec3) {
        self.velocity += impulse * self.inv_mass;
        if self.enable_rotation {
            let torque = (point - self.core.position).cross(impulse);
            self.angular_velocity += self.inv_inertia * torque;
        }
        self.wake_up();
    }

    /// Impulse application without the wake side effect; the solver calls
    /// this per iteration on bodies it has already woken.
    pub(crate) fn apply_impulse_at_point_quiet(&mut self, impulse: Vec3, point: Vec3) {
        self.velocity += impulse * self.inv_mass;
        if self.enable_rotation {
            let torque = (point - self.core.position).cross(impulse);
            self.angular_velocity += self.inv_inertia * torque;
        }
    }

    /// Velocity at a world-space point on the body.
    pub fn velocity_at_point(&self, point: Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(point - self.core.position)
    }

    /// Velocity half of the integration: accumulators into velocities, then
    /// exponential damping. Sleeping, killed, and trigger bodies hold still.
    pub fn integrate_velocity(&mut self, dt: f32) {
        if self.is_sleeping || self.is_killed || self.core.trigger_only {
            self.force = Vec3::ZERO;
            self.torque = Vec3::ZERO;
            return;
        }

        self.velocity += self.force * self.inv_mass * dt;
        if self.enable_rotation {
            self.angular_velocity += self.inv_inertia * self.torque * dt;
        }

        self.velocity *= (1.0 - self.linear_damping).powf(dt);
        self.angular_velocity *= (1.0 - self.angular_damping).powf(dt);

        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    pub fn wake_up(&mut self) {
        self.is_sleeping = false;
        self.sleep_timer = 0.0;
    }

    /// Participates in collision detection and solving this frame.
    pub fn is_active(&self) -> bool {
        !self.is_killed && !self.is_sleeping
    }
}

/// Immovable body: collision geometry only, no kinematic state. Contacts
/// against statics assume zero velocity by construction.
#[derive(Debug, Clone)]
pub struct StaticBody {
    pub core: BodyCore,
}

impl StaticBody {
    pub fn new(collider: Collider, position: Vec3, rotation: Quat) -> Self {
        Self {
            core: BodyCore::new(collider, position, rotation),
        }
    }
}

/// Sensor volume: reported through the overlap lists, never solved.
#[derive(Debug, Clone)]
pub struct TriggerBody {
    pub core: BodyCore,
}

impl TriggerBody {
    pub fn new(collider: Collider, position: Vec3, rotation: Quat) -> Self {
        let mut body = Self {
            core: BodyCore::new(collider, position, rotation),
        };
        body.core.trigger_only = true;
        body
    }

    pub fn set_transform(&mut self, position: Vec3, rotation: Quat) {
        self.core.position = position;
        self.core.rotation = rotation;
        self.core.refresh_bounds();
    }
}

fn safe_inverse(value: f32) -> f32 {
    if value.abs() < f32::EPSILON {
        0.0
    } else {
        1.0 / value
    }
}
