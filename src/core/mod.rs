//! Core types describing physics entities: geometry, colliders, and bodies.

pub mod body;
pub mod collider;
pub mod geometry;

pub use body::{BodyCore, DynamicBody, StaticBody, TriggerBody};
pub use collider::{Collider, Shape};
pub use geometry::{Aabb, Obb, Ray};
