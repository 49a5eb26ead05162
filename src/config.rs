//! Global tuning constants for the Rigid Reactor engine.

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Physics substeps performed per `step`.
pub const NUM_SUBSTEPS: u32 = 2;

/// Iterations of the biased sequential-impulse solve per substep.
pub const CONSTRAINT_SOLVER_ITERS: u32 = 4;

/// Bias-free solve passes per substep, run after the biased iterations to
/// bleed off positional-correction velocity before integration.
pub const STABILIZATION_ITERS: u32 = 2;

/// Linear speed below which a body accrues sleep time.
pub const SLEEP_LINEAR_THRESHOLD: f32 = 0.05;

/// Angular speed below which a body accrues sleep time.
pub const SLEEP_ANGULAR_THRESHOLD: f32 = 0.05;

/// Seconds below both sleep thresholds before a body is put to sleep.
pub const SLEEP_TIME_THRESHOLD: f32 = 0.5;

/// Speed above which continuous collision detection kicks in.
pub const CCD_THRESHOLD: f32 = 25.0;

/// Bodies falling below this world-space Y are marked killed.
pub const KILL_Y: f32 = -50.0;

/// Killed-body count that forces a dynamic BVH rebuild (and slot reclaim).
pub const BVH_REBUILD_THRESHOLD: usize = 512;

/// Maximum primitives per BVH leaf.
pub const BVH_LEAF_SIZE: usize = 4;

/// Fraction of last frame's cached impulses re-applied as the warmstart.
pub const WARMSTART_COEF: f32 = 0.8;

/// Baumgarte positional-correction factor.
pub const BAUMGARTE_BETA: f32 = 0.4;

/// Penetration slop tolerated without positional correction.
pub const PENETRATION_SLOP: f32 = 0.002;

/// Approach speed below which restitution feeds the contact bias.
pub const RESTITUTION_VELOCITY_THRESHOLD: f32 = -0.5;

/// Default damping applied to linear velocity.
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.02;

/// Default damping applied to angular velocity.
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.02;

/// Default atmospheric density used by the quadratic drag model (kg/m³).
pub const DEFAULT_AIR_DENSITY: f32 = 1.225;

/// Dimensionless drag coefficient scaling the per-shape cross-section.
pub const DRAG_COEFFICIENT: f32 = 1.0;

/// Drag acceleration is clamped to this multiple of gravity magnitude.
pub const MAX_DRAG_GRAVITY_RATIO: f32 = 30.0;

/// SoA batch width for the SIMD kernels (4 on SSE2, 8 on AVX2 where offered).
pub const SIMD_WIDTH: usize = 4;

/// Index batch handed to a worker per claim during parallel collision
/// detection.
pub const COLLISION_BATCH_SIZE: usize = 256;

/// Index batch handed to a worker per claim during parallel CCD.
pub const CCD_BATCH_SIZE: usize = 32;

/// Selects the work-stealing CCD driver; the fixed-chunk variant is kept
/// for comparison runs.
pub const CCD_WORK_STEALING: bool = true;

/// Upper bound on worker threads when sizing from available parallelism.
pub const MAX_WORKER_THREADS: usize = 16;

/// Sleep interval of the main thread while spin-waiting on a parallel phase.
pub const SPIN_WAIT_MICROS: u64 = 100;
