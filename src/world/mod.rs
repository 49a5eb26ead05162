//! Central simulation container and the fixed step pipeline.
//!
//! A `step(dt)` runs: warmstart cache rotation → sleep update → forces →
//! velocity integration → CCD for fast movers → BVH maintenance → the
//! substep loop (refit, broadphase, narrowphase, prepare, warmstart, solve,
//! stabilize, integrate, bounds refresh) → trigger overlaps → kill pass.

pub(crate) mod parallel;

use std::collections::HashMap;
use std::time::Instant;

use glam::{Quat, Vec3};

use crate::collision::broadphase::{self, DynamicProxy, StaticProxy};
use crate::collision::bvh::Bvh;
use crate::collision::ccd::CcdStats;
use crate::collision::queries::{
    self, HitBody, RaycastHit, RaycastQuery, TriggerRaycastHit,
};
use crate::config::{
    BVH_LEAF_SIZE, BVH_REBUILD_THRESHOLD, CCD_WORK_STEALING, CONSTRAINT_SOLVER_ITERS,
    DEFAULT_AIR_DENSITY, DEFAULT_GRAVITY, KILL_Y, NUM_SUBSTEPS, SLEEP_ANGULAR_THRESHOLD,
    SLEEP_LINEAR_THRESHOLD, SLEEP_TIME_THRESHOLD, STABILIZATION_ITERS,
};
use crate::core::body::{DynamicBody, StaticBody, TriggerBody};
use crate::core::collider::Collider;
use crate::dynamics::forces::{self, ForceRegistry};
use crate::dynamics::integrator;
use crate::dynamics::solver::{
    self, CachedImpulse, DynamicContact, SolverMetrics, StaticContact,
};
use crate::utils::allocator::{Handle, Pool};
use crate::utils::logging::{self, PhaseTimer};
use crate::utils::profiling::StepProfiler;
use crate::utils::simd::SimdLevel;
use crate::utils::worker::WorkerPool;

pub type DynamicBodyHandle = Handle<DynamicBody>;
pub type StaticBodyHandle = Handle<StaticBody>;
pub type TriggerBodyHandle = Handle<TriggerBody>;

/// Trigger volume overlapping a dynamic body, reported after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOverlap {
    pub trigger: TriggerBodyHandle,
    pub body: DynamicBodyHandle,
}

/// Trigger volume overlapping a static body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerStaticOverlap {
    pub trigger: TriggerBodyHandle,
    pub body: StaticBodyHandle,
}

/// Central simulation container owning every pool, both trees, the contact
/// arrays, and the worker pool.
pub struct World {
    pub dynamic_bodies: Pool<DynamicBody>,
    pub static_bodies: Pool<StaticBody>,
    pub trigger_bodies: Pool<TriggerBody>,

    dynamic_bvh: Bvh<DynamicProxy>,
    static_bvh: Bvh<StaticProxy>,

    pub dynamic_contacts: Vec<DynamicContact>,
    pub static_contacts: Vec<StaticContact>,
    prev_dynamic_impulses: HashMap<u64, CachedImpulse>,
    prev_static_impulses: HashMap<u64, CachedImpulse>,

    pub trigger_overlaps: Vec<TriggerOverlap>,
    pub trigger_static_overlaps: Vec<TriggerStaticOverlap>,

    pub gravity: Vec3,
    gravity_magnitude: f32,
    pub air_density: f32,
    pub enable_air_resistance: bool,
    gjk_fallback: bool,

    killed_body_count: usize,
    last_dynamic_count: usize,
    last_static_count: usize,
    dynamic_dirty: bool,
    static_dirty: bool,

    pub force_registry: ForceRegistry,
    worker_pool: Option<WorkerPool>,
    simd_level: SimdLevel,

    pub profiler: StepProfiler,
    pub last_ccd_stats: CcdStats,
    pub last_solver_metrics: SolverMetrics,
    frame_index: u64,
}

pub struct WorldBuilder {
    gravity: Vec3,
    enable_parallel: bool,
    thread_count: Option<usize>,
    enable_air_resistance: bool,
    air_density: f32,
    gjk_fallback: bool,
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self {
            gravity: Vec3::from_slice(&DEFAULT_GRAVITY),
            enable_parallel: false,
            thread_count: None,
            enable_air_resistance: false,
            air_density: DEFAULT_AIR_DENSITY,
            gjk_fallback: true,
        }
    }

    pub fn gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.enable_parallel = enabled;
        self
    }

    pub fn thread_count(mut self, count: usize) -> Self {
        self.thread_count = Some(count);
        self
    }

    pub fn air_resistance(mut self, enabled: bool) -> Self {
        self.enable_air_resistance = enabled;
        self
    }

    pub fn air_density(mut self, density: f32) -> Self {
        self.air_density = density;
        self
    }

    pub fn gjk_fallback(mut self, enabled: bool) -> Self {
        self.gjk_fallback = enabled;
        self
    }

    pub fn build(self) -> World {
        let worker_pool = if self.enable_parallel {
            let threads = self
                .thread_count
                .unwrap_or_else(WorkerPool::default_thread_count);
            Some(WorkerPool::new(threads))
        } else {
            None
        };

        World {
            dynamic_bodies: Pool::new(),
            static_bodies: Pool::new(),
            trigger_bodies: Pool::new(),
            dynamic_bvh: Bvh::new(BVH_LEAF_SIZE),
            static_bvh: Bvh::new(BVH_LEAF_SIZE),
            dynamic_contacts: Vec::new(),
            static_contacts: Vec::new(),
            prev_dynamic_impulses: HashMap::new(),
            prev_static_impulses: HashMap::new(),
            trigger_overlaps: Vec::new(),
            trigger_static_overlaps: Vec::new(),
            gravity: self.gravity,
            gravity_magnitude: self.gravity.length(),
            air_density: self.air_density,
            enable_air_resistance: self.enable_air_resistance,
            gjk_fallback: self.gjk_fallback,
            killed_body_count: 0,
            last_dynamic_count: 0,
            last_static_count: 0,
            dynamic_dirty: false,
            static_dirty: false,
            force_registry: ForceRegistry::new(),
            worker_pool,
            // Probe once here so no query pays for CPU detection later.
            simd_level: SimdLevel::cached(),
            profiler: StepProfiler::default(),
            last_ccd_stats: CcdStats::default(),
            last_solver_metrics: SolverMetrics::default(),
            frame_index: 0,
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Convenience constructor matching the common entry point.
    pub fn with_gravity(gravity: Vec3, enable_parallel: bool) -> Self {
        Self::builder().gravity(gravity).parallel(enable_parallel).build()
    }

    pub fn builder() -> WorldBuilder {
        WorldBuilder::new()
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
        self.gravity_magnitude = gravity.length();
    }

    pub fn parallel_enabled(&self) -> bool {
        self.worker_pool.is_some()
    }

    pub fn simd_level(&self) -> SimdLevel {
        self.simd_level
    }

    // -- body creation ------------------------------------------------------

    pub fn add_dynamic_body(&mut self, body: DynamicBody) -> DynamicBodyHandle {
        self.dynamic_dirty = true;
        self.dynamic_bodies.insert(body)
    }

    pub fn add_static_body(&mut self, body: StaticBody) -> StaticBodyHandle {
        self.static_dirty = true;
        self.static_bodies.insert(body)
    }

    pub fn add_trigger_body(&mut self, body: TriggerBody) -> TriggerBodyHandle {
        self.trigger_bodies.insert(body)
    }

    pub fn create_dynamic_sphere(
        &mut self,
        radius: f32,
        position: Vec3,
        rotation: Quat,
        mass: f32,
    ) -> DynamicBodyHandle {
        self.add_dynamic_body(DynamicBody::new(
            Collider::sphere(radius),
            position,
            rotation,
            mass,
        ))
    }

    pub fn create_dynamic_box(
        &mut self,
        half_extents: Vec3,
        position: Vec3,
        rotation: Quat,
        mass: f32,
    ) -> DynamicBodyHandle {
        self.add_dynamic_body(DynamicBody::new(
            Collider::cuboid(half_extents),
            position,
            rotation,
            mass,
        ))
    }

    pub fn create_dynamic_cylinder(
        &mut self,
        radius: f32,
        height: f32,
        position: Vec3,
        rotation: Quat,
        mass: f32,
    ) -> DynamicBodyHandle {
        self.add_dynamic_body(DynamicBody::new(
            Collider::cylinder(radius, height),
            position,
            rotation,
            mass,
        ))
    }

    pub fn create_dynamic_fan(
        &mut self,
        radius: f32,
        height: f32,
        angle: f32,
        position: Vec3,
        rotation: Quat,
        mass: f32,
    ) -> DynamicBodyHandle {
        self.add_dynamic_body(DynamicBody::new(
            Collider::fan(radius, height, angle),
            position,
            rotation,
            mass,
        ))
    }

    pub fn create_static_sphere(
        &mut self,
        radius: f32,
        position: Vec3,
        rotation: Quat,
    ) -> StaticBodyHandle {
        self.add_static_body(StaticBody::new(Collider::sphere(radius), position, rotation))
    }

    pub fn create_static_box(
        &mut self,
        half_extents: Vec3,
        position: Vec3,
        rotation: Quat,
    ) -> StaticBodyHandle {
        self.add_static_body(StaticBody::new(
            Collider::cuboid(half_extents),
            position,
            rotation,
        ))
    }

    pub fn create_static_cylinder(
        &mut self,
        radius: f32,
        height: f32,
        position: Vec3,
        rotation: Quat,
    ) -> StaticBodyHandle {
        self.add_static_body(StaticBody::new(
            Collider::cylinder(radius, height),
            position,
            rotation,
        ))
    }

    pub fn create_static_fan(
        &mut self,
        radius: f32,
        height: f32,
        angle: f32,
        position: Vec3,
        rotation: Quat,
    ) -> StaticBodyHandle {
        self.add_static_body(StaticBody::new(
            Collider::fan(radius, height, angle),
            position,
            rotation,
        ))
    }

    pub fn create_trigger_sphere(
        &mut self,
        radius: f32,
        position: Vec3,
        rotation: Quat,
    ) -> TriggerBodyHandle {
        self.add_trigger_body(TriggerBody::new(Collider::sphere(radius), position, rotation))
    }

    pub fn create_trigger_box(
        &mut self,
        half_extents: Vec3,
        position: Vec3,
        rotation: Quat,
    ) -> TriggerBodyHandle {
        self.add_trigger_body(TriggerBody::new(
            Collider::cuboid(half_extents),
            position,
            rotation,
        ))
    }

    pub fn create_trigger_cylinder(
        &mut self,
        radius: f32,
        height: f32,
        position: Vec3,
        rotation: Quat,
    ) -> TriggerBodyHandle {
        self.add_trigger_body(TriggerBody::new(
            Collider::cylinder(radius, height),
            position,
            rotation,
        ))
    }

    pub fn create_trigger_fan(
        &mut self,
        radius: f32,
        height: f32,
        angle: f32,
        position: Vec3,
        rotation: Quat,
    ) -> TriggerBodyHandle {
        self.add_trigger_body(TriggerBody::new(
            Collider::fan(radius, height, angle),
            position,
            rotation,
        ))
    }

    // -- body destruction ---------------------------------------------------

    /// Marks the body killed; its slot is reclaimed at the next dynamic BVH
    /// rebuild.
    pub fn destroy_dynamic_body(&mut self, handle: DynamicBodyHandle) {
        if let Some(body) = self.dynamic_bodies.get_mut(handle) {
            if !body.is_killed {
                body.is_killed = true;
                self.killed_body_count += 1;
            }
        }
    }

    pub fn destroy_static_body(&mut self, handle: StaticBodyHandle) {
        if self.static_bodies.remove(handle).is_some() {
            self.static_dirty = true;
        }
    }

    pub fn destroy_trigger_body(&mut self, handle: TriggerBodyHandle) {
        self.trigger_bodies.remove(handle);
    }

    // -- accessors ----------------------------------------------------------

    pub fn dynamic_body(&self, handle: DynamicBodyHandle) -> Option<&DynamicBody> {
        self.dynamic_bodies.get(handle)
    }

    pub fn dynamic_body_mut(&mut self, handle: DynamicBodyHandle) -> Option<&mut DynamicBody> {
        self.dynamic_bodies.get_mut(handle)
    }

    pub fn static_body(&self, handle: StaticBodyHandle) -> Option<&StaticBody> {
        self.static_bodies.get(handle)
    }

    pub fn static_body_mut(&mut self, handle: StaticBodyHandle) -> Option<&mut StaticBody> {
        self.static_bodies.get_mut(handle)
    }

    pub fn trigger_body(&self, handle: TriggerBodyHandle) -> Option<&TriggerBody> {
        self.trigger_bodies.get(handle)
    }

    pub fn trigger_body_mut(&mut self, handle: TriggerBodyHandle) -> Option<&mut TriggerBody> {
        self.trigger_bodies.get_mut(handle)
    }

    // -- per-body convenience ops ------------------------------------------

    pub fn apply_force(&mut self, handle: DynamicBodyHandle, force: Vec3) {
        if let Some(body) = self.dynamic_bodies.get_mut(handle) {
            body.apply_force(force);
        }
    }

    pub fn apply_force_at_point(&mut self, handle: DynamicBodyHandle, force: Vec3, point: Vec3) {
        if let Some(body) = self.dynamic_bodies.get_mut(handle) {
            body.apply_force_at_point(force, point);
        }
    }

    pub fn apply_impulse(&mut self, handle: DynamicBodyHandle, impulse: Vec3) {
        if let Some(body) = self.dynamic_bodies.get_mut(handle) {
            body.apply_impulse(impulse);
        }
    }

    pub fn apply_impulse_at_point(
        &mut self,
        handle: DynamicBodyHandle,
        impulse: Vec3,
        point: Vec3,
    ) {
        if let Some(body) = self.dynamic_bodies.get_mut(handle) {
            body.apply_impulse_at_point(impulse, point);
        }
    }

    pub fn set_mass(&mut self, handle: DynamicBodyHandle, mass: f32) {
        if let Some(body) = self.dynamic_bodies.get_mut(handle) {
            body.set_mass(mass);
        }
    }

    pub fn set_sphere_inertia(&mut self, handle: DynamicBodyHandle, radius: f32) {
        if let Some(body) = self.dynamic_bodies.get_mut(handle) {
            body.set_sphere_inertia(radius);
        }
    }

    pub fn set_box_inertia(&mut self, handle: DynamicBodyHandle, half_extents: Vec3) {
        if let Some(body) = self.dynamic_bodies.get_mut(handle) {
            body.set_box_inertia(half_extents);
        }
    }

    pub fn set_cylinder_inertia(&mut self, handle: DynamicBodyHandle, radius: f32, height: f32) {
        if let Some(body) = self.dynamic_bodies.get_mut(handle) {
            body.set_cylinder_inertia(radius, height);
        }
    }

    pub fn set_trigger_transform(
        &mut self,
        handle: TriggerBodyHandle,
        position: Vec3,
        rotation: Quat,
    ) {
        if let Some(trigger) = self.trigger_bodies.get_mut(handle) {
            trigger.set_transform(position, rotation);
        }
    }

    // -- simulation ---------------------------------------------------------

    /// Advances the world by `dt` seconds. A non-positive `dt` leaves every
    /// body untouched.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        let step_start = Instant::now();
        self.profiler.reset();
        self.frame_index = self.frame_index.wrapping_add(1);

        self.store_previous_impulses();
        self.update_sleep(dt);

        let force_start = Instant::now();
        forces::apply_gravity(&mut self.dynamic_bodies, self.gravity);
        if self.enable_air_resistance {
            forces::apply_air_drag(
                &mut self.dynamic_bodies,
                self.air_density,
                self.gravity_magnitude,
            );
        }
        {
            let Self {
                force_registry,
                dynamic_bodies,
                ..
            } = self;
            force_registry.apply_all(dynamic_bodies, dt);
        }
        self.profiler.force_time = force_start.elapsed();

        integrator::integrate_velocities(&mut self.dynamic_bodies, dt);
        for body in self.dynamic_bodies.iter_mut() {
            body.ccd_handled = false;
        }

        // Bodies added since the last step must be queryable before CCD
        // sweeps against the trees; the post-CCD maintenance below is then
        // a no-op unless the kill threshold tripped.
        self.maintain_bvhs();

        let ccd_start = Instant::now();
        self.last_ccd_stats = self.run_ccd_phase(dt);
        self.profiler.ccd_time = ccd_start.elapsed();
        self.profiler.ccd_impact_count = self.last_ccd_stats.impacts;

        self.maintain_bvhs();

        let substep_dt = dt / NUM_SUBSTEPS as f32;
        for substep in 0..NUM_SUBSTEPS {
            self.run_substep(substep == 0, substep_dt);
        }

        let mut metrics = SolverMetrics::default();
        metrics.record(&self.dynamic_contacts, &self.static_contacts);
        self.last_solver_metrics = metrics;

        self.detect_trigger_overlaps();
        self.kill_pass();

        self.profiler.dynamic_body_count = self.dynamic_bodies.len();
        self.profiler.static_body_count = self.static_bodies.len();
        self.profiler.dynamic_contact_count = self.dynamic_contacts.len();
        self.profiler.static_contact_count = self.static_contacts.len();
        self.profiler.trigger_overlap_count =
            self.trigger_overlaps.len() + self.trigger_static_overlaps.len();
        self.profiler.total_step_time = step_start.elapsed();
        self.profiler.log_step(dt);
        logging::warn_if_step_fell_behind(self.profiler.total_step_time, dt);
    }

    fn store_previous_impulses(&mut self) {
        self.prev_dynamic_impulses.clear();
        for contact in &self.dynamic_contacts {
            self.prev_dynamic_impulses.insert(
                solver::dynamic_pair_key(contact.body_a.index(), contact.body_b.index()),
                CachedImpulse {
                    normal: contact.normal_impulse,
                    tangent: contact.tangent_impulse,
                },
            );
        }
        self.prev_static_impulses.clear();
        for contact in &self.static_contacts {
            self.prev_static_impulses.insert(
                solver::static_pair_key(contact.body_a.index(), contact.body_b.index()),
                CachedImpulse {
                    normal: contact.normal_impulse,
                    tangent: contact.tangent_impulse,
                },
            );
        }
    }

    fn update_sleep(&mut self, dt: f32) {
        for body in self.dynamic_bodies.iter_mut() {
            if body.is_killed || body.core.trigger_only || body.is_sleeping {
                continue;
            }

            let slow = body.velocity.length_squared()
                < SLEEP_LINEAR_THRESHOLD * SLEEP_LINEAR_THRESHOLD
                && body.angular_velocity.length_squared()
                    < SLEEP_ANGULAR_THRESHOLD * SLEEP_ANGULAR_THRESHOLD;

            if slow {
                body.sleep_timer += dt;
                if body.sleep_timer >= SLEEP_TIME_THRESHOLD {
                    body.velocity = Vec3::ZERO;
                    body.angular_velocity = Vec3::ZERO;
                    body.is_sleeping = true;
                }
            } else {
                body.sleep_timer = 0.0;
            }
        }
    }

    fn run_ccd_phase(&mut self, dt: f32) -> CcdStats {
        let Self {
            dynamic_bodies,
            static_bodies,
            dynamic_bvh,
            static_bvh,
            worker_pool,
            ..
        } = self;

        match worker_pool {
            Some(pool) if CCD_WORK_STEALING => parallel::ccd_pass_parallel(
                pool,
                dynamic_bodies,
                static_bodies,
                dynamic_bvh,
                static_bvh,
                dt,
            ),
            Some(pool) => parallel::ccd_pass_coarse(
                pool,
                dynamic_bodies,
                static_bodies,
                dynamic_bvh,
                static_bvh,
                dt,
            ),
            None => parallel::ccd_pass_sequential(
                dynamic_bodies,
                static_bodies,
                dynamic_bvh,
                static_bvh,
                dt,
            ),
        }
    }

    fn maintain_bvhs(&mut self) {
        let dynamic_count = self.dynamic_bodies.len();
        if self.dynamic_dirty
            || dynamic_count > self.last_dynamic_count
            || self.killed_body_count >= BVH_REBUILD_THRESHOLD
        {
            self.rebuild_dynamic_bvh();
        }

        let static_count = self.static_bodies.len();
        if self.static_dirty || static_count != self.last_static_count {
            self.rebuild_static_bvh();
        }
    }

    /// Rebuild reclaims killed slots: this is the only place dynamic
    /// storage is actually freed.
    fn rebuild_dynamic_bvh(&mut self) {
        let _span = PhaseTimer::begin("bvh_rebuild");
        let killed: Vec<u32> = self
            .dynamic_bodies
            .iter_with_handles()
            .filter(|(_, body)| body.is_killed)
            .map(|(handle, _)| handle.index())
            .collect();
        for index in killed {
            self.dynamic_bodies.remove_at(index);
        }
        self.killed_body_count = 0;

        let proxies = self
            .dynamic_bodies
            .iter_with_handles()
            .map(|(handle, body)| DynamicProxy {
                handle,
                bounds: body.core.aabb,
            })
            .collect();
        self.dynamic_bvh.build(proxies);

        self.last_dynamic_count = self.dynamic_bodies.len();
        self.dynamic_dirty = false;
    }

    fn rebuild_static_bvh(&mut self) {
        let proxies = self
            .static_bodies
            .iter_with_handles()
            .map(|(handle, body)| StaticProxy {
                handle,
                bounds: body.core.aabb,
            })
            .collect();
        self.static_bvh.build(proxies);

        self.last_static_count = self.static_bodies.len();
        self.static_dirty = false;
    }

    fn run_substep(&mut self, first_substep: bool, dt: f32) {
        let broad_start = Instant::now();
        {
            let Self {
                dynamic_bodies,
                dynamic_bvh,
                worker_pool,
                ..
            } = self;
            match worker_pool {
                Some(pool) => parallel::refit_proxies_parallel(pool, dynamic_bvh, dynamic_bodies),
                None => parallel::refit_proxies_sequential(dynamic_bvh, dynamic_bodies),
            }
        }

        self.dynamic_contacts.clear();
        self.static_contacts.clear();
        let gjk_fallback = self.gjk_fallback;
        {
            let Self {
                dynamic_bodies,
                static_bodies,
                dynamic_bvh,
                static_bvh,
                dynamic_contacts,
                static_contacts,
                worker_pool,
                ..
            } = self;
            match worker_pool {
                Some(pool) => parallel::detect_collisions_parallel(
                    pool,
                    dynamic_bodies,
                    static_bodies,
                    dynamic_bvh,
                    static_bvh,
                    gjk_fallback,
                    dynamic_contacts,
                    static_contacts,
                ),
                None => parallel::detect_collisions_sequential(
                    dynamic_bodies,
                    static_bodies,
                    dynamic_bvh,
                    static_bvh,
                    gjk_fallback,
                    dynamic_contacts,
                    static_contacts,
                ),
            }
        }
        self.profiler.broad_phase_time += broad_start.elapsed();

        self.wake_contacted_bodies();
        solver::seed_contacts_from_cache(
            &mut self.dynamic_contacts,
            &mut self.static_contacts,
            &self.prev_dynamic_impulses,
            &self.prev_static_impulses,
        );

        let solve_start = Instant::now();
        {
            let Self {
                dynamic_bodies,
                dynamic_contacts,
                static_contacts,
                ..
            } = self;

            for contact in dynamic_contacts.iter_mut() {
                solver::prepare_dynamic_contact(dynamic_bodies, contact, dt);
            }
            for contact in static_contacts.iter_mut() {
                solver::prepare_static_contact(dynamic_bodies, contact, dt);
            }

            if first_substep {
                for contact in dynamic_contacts.iter() {
                    solver::warmstart_dynamic_contact(dynamic_bodies, contact);
                }
                for contact in static_contacts.iter() {
                    solver::warmstart_static_contact(dynamic_bodies, contact);
                }
            }

            for _ in 0..CONSTRAINT_SOLVER_ITERS {
                for contact in dynamic_contacts.iter_mut() {
                    solver::resolve_dynamic_contact(dynamic_bodies, contact, true);
                }
                for contact in static_contacts.iter_mut() {
                    solver::resolve_static_contact(dynamic_bodies, contact, true);
                }
            }
            for _ in 0..STABILIZATION_ITERS {
                for contact in dynamic_contacts.iter_mut() {
                    solver::resolve_dynamic_contact(dynamic_bodies, contact, false);
                }
                for contact in static_contacts.iter_mut() {
                    solver::resolve_static_contact(dynamic_bodies, contact, false);
                }
            }
        }
        self.profiler.solver_time += solve_start.elapsed();

        let integrate_start = Instant::now();
        integrator::integrate_positions(&mut self.dynamic_bodies, dt);
        {
            let Self {
                dynamic_bodies,
                worker_pool,
                ..
            } = self;
            match worker_pool {
                Some(pool) => parallel::refresh_bounds_parallel(pool, dynamic_bodies),
                None => parallel::refresh_bounds_sequential(dynamic_bodies),
            }
        }
        self.profiler.integrate_time += integrate_start.elapsed();
    }

    fn wake_contacted_bodies(&mut self) {
        let Self {
            dynamic_bodies,
            dynamic_contacts,
            static_contacts,
            ..
        } = self;

        for contact in dynamic_contacts.iter() {
            if let Some((body_a, body_b)) =
                dynamic_bodies.get2_mut(contact.body_a, contact.body_b)
            {
                if body_a.is_sleeping {
                    body_a.wake_up();
                }
                if body_b.is_sleeping {
                    body_b.wake_up();
                }
            }
        }
        for contact in static_contacts.iter() {
            if let Some(body) = dynamic_bodies.get_mut(contact.body_a) {
                if body.is_sleeping {
                    body.wake_up();
                }
            }
        }
    }

    fn detect_trigger_overlaps(&mut self) {
        let _span = PhaseTimer::begin("triggers");
        self.trigger_overlaps.clear();
        self.trigger_static_overlaps.clear();

        for trigger in self.trigger_bodies.iter_mut() {
            trigger.core.refresh_bounds();
        }

        let Self {
            trigger_bodies,
            dynamic_bodies,
            static_bodies,
            dynamic_bvh,
            static_bvh,
            trigger_overlaps,
            trigger_static_overlaps,
            ..
        } = self;

        let mut candidates = Vec::new();
        for (trigger_handle, trigger) in trigger_bodies.iter_with_handles() {
            candidates.clear();
            dynamic_bvh.query_aabb_fast(&trigger.core.aabb, &mut candidates);
            for &candidate in &candidates {
                let proxy = dynamic_bvh.primitives[candidate as usize];
                let Some(body) = dynamic_bodies.get(proxy.handle) else {
                    continue;
                };
                if body.is_killed {
                    continue;
                }
                if broadphase::trigger_overlap(&trigger.core, &body.core) {
                    trigger_overlaps.push(TriggerOverlap {
                        trigger: trigger_handle,
                        body: proxy.handle,
                    });
                }
            }

            candidates.clear();
            static_bvh.query_aabb_fast(&trigger.core.aabb, &mut candidates);
            for &candidate in &candidates {
                let proxy = static_bvh.primitives[candidate as usize];
                let Some(body) = static_bodies.get(proxy.handle) else {
                    continue;
                };
                if broadphase::trigger_overlap(&trigger.core, &body.core) {
                    trigger_static_overlaps.push(TriggerStaticOverlap {
                        trigger: trigger_handle,
                        body: proxy.handle,
                    });
                }
            }
        }
    }

    fn kill_pass(&mut self) {
        let Self {
            dynamic_bodies,
            killed_body_count,
            ..
        } = self;
        for body in dynamic_bodies.iter_mut() {
            if !body.is_killed && body.core.position.y < KILL_Y {
                body.is_killed = true;
                *killed_body_count += 1;
            }
        }
    }

    // -- queries ------------------------------------------------------------

    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Vec<RaycastHit> {
        let query = RaycastQuery::new(origin, direction, max_distance);
        queries::raycast(
            &query,
            &self.dynamic_bodies,
            &self.dynamic_bvh,
            &self.static_bodies,
            &self.static_bvh,
        )
    }

    pub fn raycast_single(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<RaycastHit> {
        let query = RaycastQuery::new(origin, direction, max_distance);
        queries::raycast_single(
            &query,
            &self.dynamic_bodies,
            &self.dynamic_bvh,
            &self.static_bodies,
            &self.static_bvh,
        )
    }

    pub fn raycast_trigger(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Vec<TriggerRaycastHit> {
        let query = RaycastQuery::new(origin, direction, max_distance);
        queries::raycast_trigger(&query, &self.trigger_bodies)
    }

    pub fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<HitBody> {
        queries::query_sphere(
            center,
            radius,
            &self.dynamic_bodies,
            &self.dynamic_bvh,
            &self.static_bodies,
            &self.static_bvh,
        )
    }

    pub fn query_box(&self, center: Vec3, half_extents: Vec3) -> Vec<HitBody> {
        queries::query_box(
            center,
            half_extents,
            &self.dynamic_bodies,
            &self.dynamic_bvh,
            &self.static_bodies,
            &self.static_bvh,
        )
    }

    /// On-demand overlap scan for one trigger against dynamic bodies.
    pub fn query_trigger(&self, handle: TriggerBodyHandle) -> Vec<DynamicBodyHandle> {
        let Some(trigger) = self.trigger_bodies.get(handle) else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        self.dynamic_bvh
            .query_aabb_fast(&trigger.core.aabb, &mut candidates);

        let mut overlaps = Vec::new();
        for candidate in candidates {
            let proxy = self.dynamic_bvh.primitives[candidate as usize];
            let Some(body) = self.dynamic_bodies.get(proxy.handle) else {
                continue;
            };
            if !body.is_killed && broadphase::trigger_overlap(&trigger.core, &body.core) {
                overlaps.push(proxy.handle);
            }
        }
        overlaps
    }

    /// On-demand overlap scan for one trigger against static bodies.
    pub fn query_trigger_static(&self, handle: TriggerBodyHandle) -> Vec<StaticBodyHandle> {
        let Some(trigger) = self.trigger_bodies.get(handle) else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        self.static_bvh
            .query_aabb_fast(&trigger.core.aabb, &mut candidates);

        let mut overlaps = Vec::new();
        for candidate in candidates {
            let proxy = self.static_bvh.primitives[candidate as usize];
            let Some(body) = self.static_bodies.get(proxy.handle) else {
                continue;
            };
            if broadphase::trigger_overlap(&trigger.core, &body.core) {
                overlaps.push(proxy.handle);
            }
        }
        overlaps
    }

    pub fn query_triggers_in_sphere(&self, center: Vec3, radius: f32) -> Vec<TriggerBodyHandle> {
        queries::query_triggers_in_sphere(center, radius, &self.trigger_bodies)
    }
}
