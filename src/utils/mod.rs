//! Utility layer: the generational allocator, SIMD batch kernels, worker
//! pool, and logging helpers.

pub mod allocator;
pub mod logging;
pub mod profiling;
pub mod simd;
pub mod worker;

pub use allocator::{Handle, Pool};
pub use profiling::StepProfiler;
pub use simd::SimdLevel;
pub use worker::{BatchQueue, WorkerPool};
