//! Rigid Reactor – real-time rigid-body physics for Rust.
//!
//! The crate simulates dynamic, static, and trigger bodies with primitive
//! colliders through a substepped sequential-impulse pipeline: twin-BVH
//! broad phase, closed-form narrow phase with a GJK+EPA fallback, swept
//! continuous collision detection for fast movers, and an optional
//! persistent worker pool for the parallel phases.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Quat, Vec3};

pub use collision::{
    CcdStats, ContactGeometry, HitBody, RaycastHit, RaycastQuery, SweptHit, TriggerRaycastHit,
};
pub use self::core::{
    Aabb, BodyCore, Collider, DynamicBody, Obb, Ray, Shape, StaticBody, TriggerBody,
};
pub use dynamics::{
    DynamicContact, ForceGenerator, ForceRegistry, SolverMetrics, SpringForce, StaticContact,
};
pub use utils::{Handle, Pool, SimdLevel, WorkerPool};
pub use world::{
    DynamicBodyHandle, StaticBodyHandle, TriggerBodyHandle, TriggerOverlap, TriggerStaticOverlap,
    World, WorldBuilder,
};
