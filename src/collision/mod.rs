//! Collision detection: the BVH broad phase, closed-form and GJK narrow
//! phase, swept tests, CCD, and spatial queries.

pub mod broadphase;
pub mod bvh;
pub mod ccd;
pub mod gjk;
pub mod narrowphase;
pub mod queries;
pub mod swept;

pub use broadphase::{DynamicProxy, StaticProxy};
pub use bvh::{Bvh, BvhNode, BvhPrimitive};
pub use ccd::{CcdImpact, CcdStats};
pub use gjk::EpaFailure;
pub use narrowphase::ContactGeometry;
pub use queries::{HitBody, RaycastHit, RaycastQuery, TriggerRaycastHit};
pub use swept::{swept_test, SweptHit};
