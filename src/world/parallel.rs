//! Phase drivers shared by the sequential and worker-pool step paths.
//!
//! Safety discipline for the parallel variants: a phase either partitions
//! its writes so no two workers touch the same element (proxy refit, bounds
//! refresh, the per-worker result buffers), or it reads an immutable
//! frame-start snapshot and defers all pool writes until after the join
//! (CCD). The main thread blocks in `WorkerPool::run` until a phase
//! drains, so borrowed storage outlives every worker's use.

use std::ops::Range;

use parking_lot::Mutex;

use crate::collision::broadphase::{self, DynamicProxy, StaticProxy};
use crate::collision::bvh::Bvh;
use crate::collision::ccd::{self, CcdStats};
use crate::config::{CCD_BATCH_SIZE, COLLISION_BATCH_SIZE, SIMD_WIDTH};
use crate::core::body::{DynamicBody, StaticBody};
use crate::core::collider::Shape;
use crate::dynamics::solver::{DynamicContact, StaticContact};
use crate::utils::allocator::Pool;
use crate::utils::simd::{obb_to_aabb_batch4, obb_to_aabb_batch8, QuatBatch4, Vec3Batch4};
use crate::utils::worker::{BatchQueue, WorkerPool};

/// Raw pointer workers index with disjoint ranges. Send/Sync are sound
/// under the partition-and-join discipline described in the module docs.
struct SharedPtr<T>(*mut T);

impl<T> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for SharedPtr<T> {}

unsafe impl<T> Send for SharedPtr<T> {}
unsafe impl<T> Sync for SharedPtr<T> {}

/// Fixed chunk of `len` assigned to `worker` out of `workers`.
fn chunk_range(len: usize, workers: usize, worker: usize) -> Range<usize> {
    let per_worker = len.div_ceil(workers);
    let start = (worker * per_worker).min(len);
    let end = ((worker + 1) * per_worker).min(len);
    start..end
}

// ---------------------------------------------------------------------------
// BVH proxy refit (primitive side)
// ---------------------------------------------------------------------------

fn refit_proxy(proxy: &mut DynamicProxy, bodies: &Pool<DynamicBody>) {
    if let Some(body) = bodies.get(proxy.handle) {
        proxy.bounds = body.core.aabb;
    }
}

pub(crate) fn refit_proxies_sequential(bvh: &mut Bvh<DynamicProxy>, bodies: &Pool<DynamicBody>) {
    for proxy in bvh.primitives_mut() {
        refit_proxy(proxy, bodies);
    }
    bvh.refit();
}

pub(crate) fn refit_proxies_parallel(
    workers: &mut WorkerPool,
    bvh: &mut Bvh<DynamicProxy>,
    bodies: &Pool<DynamicBody>,
) {
    let primitives = bvh.primitives_mut();
    let len = primitives.len();
    if len == 0 {
        return;
    }

    let worker_count = workers.thread_count().max(1);
    let ptr = SharedPtr(primitives.as_mut_ptr());
    workers.run(|worker| {
        let ptr = ptr;
        for index in chunk_range(len, worker_count, worker) {
            let proxy = unsafe { &mut *ptr.0.add(index) };
            refit_proxy(proxy, bodies);
        }
    });

    // Node pass stays single-threaded: parents read child bounds.
    bvh.refit();
}

// ---------------------------------------------------------------------------
// Cached AABB / bounding sphere refresh
// ---------------------------------------------------------------------------

/// Refreshes the bounds caches for a run of pool slots, converting rotated
/// colliders through the SIMD kernels `SIMD_WIDTH` at a time.
fn refresh_slots(slots: &mut [Option<DynamicBody>]) {
    let width = SIMD_WIDTH.clamp(4, 8);
    let mut pending: [usize; 8] = [0; 8];
    let mut pending_count = 0;

    for index in 0..slots.len() {
        let Some(body) = slots[index].as_ref() else {
            continue;
        };
        if body.is_killed {
            continue;
        }
        match body.core.collider.shape {
            Shape::Sphere { .. } => {
                // Rotation-invariant; cheaper than the batch detour.
                slots[index].as_mut().unwrap().core.refresh_bounds();
            }
            _ => {
                pending[pending_count] = index;
                pending_count += 1;
                if pending_count == width {
                    flush_pending(slots, &pending[..width]);
                    pending_count = 0;
                }
            }
        }
    }

    for &index in &pending[..pending_count] {
        slots[index].as_mut().unwrap().core.refresh_bounds();
    }
}

/// Batch-converts a full group of rotated colliders. Indices are relative
/// to `slots` and always point at occupied entries.
fn flush_pending(slots: &mut [Option<DynamicBody>], pending: &[usize]) {
    let gather = |slots: &[Option<DynamicBody>], lane: usize| {
        let body = slots[pending[lane]].as_ref().unwrap();
        (
            body.core.position,
            body.core.collider.equivalent_half_extents(),
            body.core.rotation,
        )
    };

    let mut boxes = [crate::core::geometry::Aabb::empty(); 8];
    if pending.len() == 8 {
        let mut centers = [glam::Vec3::ZERO; 8];
        let mut halves = [glam::Vec3::ZERO; 8];
        let mut rotations = [glam::Quat::IDENTITY; 8];
        for lane in 0..8 {
            (centers[lane], halves[lane], rotations[lane]) = gather(slots, lane);
        }
        boxes = obb_to_aabb_batch8(&centers, &halves, &rotations);
    } else {
        let mut centers = [glam::Vec3::ZERO; 4];
        let mut halves = [glam::Vec3::ZERO; 4];
        let mut rotations = [glam::Quat::IDENTITY; 4];
        for lane in 0..4 {
            (centers[lane], halves[lane], rotations[lane]) = gather(slots, lane);
        }
        let batch = obb_to_aabb_batch4(
            &Vec3Batch4::from_vecs(centers),
            &Vec3Batch4::from_vecs(halves),
            &QuatBatch4::from_quats(rotations),
        );
        for lane in 0..4 {
            boxes[lane] = batch.lane(lane);
        }
    }

    for (lane, &index) in pending.iter().enumerate() {
        let body = slots[index].as_mut().unwrap();
        body.core.aabb = boxes[lane];
        body.core.sphere_center = body.core.position;
        body.core.sphere_radius = body.core.collider.bounding_radius();
    }
}

pub(crate) fn refresh_bounds_sequential(bodies: &mut Pool<DynamicBody>) {
    refresh_slots(bodies.slots_mut());
}

pub(crate) fn refresh_bounds_parallel(workers: &mut WorkerPool, bodies: &mut Pool<DynamicBody>) {
    let slots = bodies.slots_mut();
    let len = slots.len();
    if len == 0 {
        return;
    }

    let worker_count = workers.thread_count().max(1);
    let ptr = SharedPtr(slots.as_mut_ptr());
    workers.run(|worker| {
        let ptr = ptr;
        let range = chunk_range(len, worker_count, worker);
        if range.is_empty() {
            return;
        }
        let chunk =
            unsafe { std::slice::from_raw_parts_mut(ptr.0.add(range.start), range.len()) };
        refresh_slots(chunk);
    });
}

// ---------------------------------------------------------------------------
// Broad + narrow collision detection
// ---------------------------------------------------------------------------

/// Runs the broadphase queries and narrow tests for one dynamic primitive,
/// appending surviving contacts. Shared by the sequential loop and every
/// worker.
#[allow(clippy::too_many_arguments)]
pub(crate) fn collect_primitive_contacts(
    primitive: usize,
    dynamic_bodies: &Pool<DynamicBody>,
    static_bodies: &Pool<StaticBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bvh: &Bvh<StaticProxy>,
    gjk_fallback: bool,
    candidates: &mut Vec<u32>,
    dynamic_out: &mut Vec<DynamicContact>,
    static_out: &mut Vec<StaticContact>,
) {
    let proxy = dynamic_bvh.primitives[primitive];
    let Some(body) = dynamic_bodies.get(proxy.handle) else {
        return;
    };
    // Sleeping bodies never initiate queries; their awake partners find
    // the pair instead.
    if !body.is_active() || body.core.trigger_only {
        return;
    }
    let index_a = proxy.handle.index();

    candidates.clear();
    dynamic_bvh.query_aabb_fast(&proxy.bounds, candidates);
    for &candidate in candidates.iter() {
        let other_proxy = dynamic_bvh.primitives[candidate as usize];
        if other_proxy.handle.index() == index_a {
            continue;
        }
        let Some(other) = dynamic_bodies.get(other_proxy.handle) else {
            continue;
        };
        if other.is_killed {
            continue;
        }
        if !broadphase::keep_dynamic_pair(index_a, other_proxy.handle.index(), other.is_sleeping)
        {
            continue;
        }
        if let Some(contact) =
            broadphase::test_dynamic_pair(proxy.handle, body, other_proxy.handle, other, gjk_fallback)
        {
            dynamic_out.push(contact);
        }
    }

    candidates.clear();
    static_bvh.query_aabb_fast(&proxy.bounds, candidates);
    for &candidate in candidates.iter() {
        let static_proxy = static_bvh.primitives[candidate as usize];
        let Some(other) = static_bodies.get(static_proxy.handle) else {
            continue;
        };
        if let Some(contact) =
            broadphase::test_static_pair(proxy.handle, body, static_proxy.handle, other, gjk_fallback)
        {
            static_out.push(contact);
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn detect_collisions_sequential(
    dynamic_bodies: &Pool<DynamicBody>,
    static_bodies: &Pool<StaticBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bvh: &Bvh<StaticProxy>,
    gjk_fallback: bool,
    dynamic_out: &mut Vec<DynamicContact>,
    static_out: &mut Vec<StaticContact>,
) {
    let mut candidates = Vec::new();
    for primitive in 0..dynamic_bvh.primitive_count() {
        collect_primitive_contacts(
            primitive,
            dynamic_bodies,
            static_bodies,
            dynamic_bvh,
            static_bvh,
            gjk_fallback,
            &mut candidates,
            dynamic_out,
            static_out,
        );
    }
}

#[derive(Default)]
struct ContactBuffers {
    dynamic: Vec<DynamicContact>,
    static_: Vec<StaticContact>,
}

/// Work-stealing collision detection: workers claim primitive batches from
/// a shared atomic cursor and append into per-thread buffers, concatenated
/// after the join. Contact order is therefore implementation-defined.
#[allow(clippy::too_many_arguments)]
pub(crate) fn detect_collisions_parallel(
    workers: &mut WorkerPool,
    dynamic_bodies: &Pool<DynamicBody>,
    static_bodies: &Pool<StaticBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bvh: &Bvh<StaticProxy>,
    gjk_fallback: bool,
    dynamic_out: &mut Vec<DynamicContact>,
    static_out: &mut Vec<StaticContact>,
) {
    let primitive_count = dynamic_bvh.primitive_count();
    if primitive_count == 0 {
        return;
    }

    let worker_count = workers.thread_count().max(1);
    let queue = BatchQueue::new(primitive_count, COLLISION_BATCH_SIZE);
    let mut buffers: Vec<ContactBuffers> = Vec::new();
    buffers.resize_with(worker_count, ContactBuffers::default);
    let buffers_ptr = SharedPtr(buffers.as_mut_ptr());

    workers.run(|worker| {
        let buffers_ptr = buffers_ptr;
        let local = unsafe { &mut *buffers_ptr.0.add(worker) };
        let mut candidates = Vec::new();
        while let Some(batch) = queue.next_batch() {
            for primitive in batch {
                collect_primitive_contacts(
                    primitive,
                    dynamic_bodies,
                    static_bodies,
                    dynamic_bvh,
                    static_bvh,
                    gjk_fallback,
                    &mut candidates,
                    &mut local.dynamic,
                    &mut local.static_,
                );
            }
        }
    });

    for buffer in &mut buffers {
        dynamic_out.append(&mut buffer.dynamic);
        static_out.append(&mut buffer.static_);
    }
}

// ---------------------------------------------------------------------------
// CCD
// ---------------------------------------------------------------------------

/// Read-only sweep of one slot. Callers record the impact and defer the
/// write-back until no sweep is still reading body state.
fn ccd_sweep_slot(
    index: usize,
    slots: &[Option<DynamicBody>],
    static_bodies: &Pool<StaticBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bvh: &Bvh<StaticProxy>,
    dt: f32,
    candidates: &mut Vec<u32>,
    stats: &mut CcdStats,
) -> Option<ccd::CcdImpact> {
    let body = slots.get(index)?.as_ref()?;
    if !ccd::needs_ccd(body, dt) {
        return None;
    }

    ccd::detect_impact(
        body,
        index as u32,
        dt,
        dynamic_bvh,
        slots,
        static_bvh,
        static_bodies.slots(),
        candidates,
        stats,
    )
}

fn apply_impacts(
    dynamic_bodies: &mut Pool<DynamicBody>,
    impacts: &[(usize, ccd::CcdImpact)],
    dt: f32,
) {
    for &(index, impact) in impacts {
        if let Some(body) = dynamic_bodies.slots_mut()[index].as_mut() {
            ccd::apply_impact(body, &impact, dt);
        }
    }
}

pub(crate) fn ccd_pass_sequential(
    dynamic_bodies: &mut Pool<DynamicBody>,
    static_bodies: &Pool<StaticBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bvh: &Bvh<StaticProxy>,
    dt: f32,
) -> CcdStats {
    let mut stats = CcdStats::default();
    let mut candidates = Vec::new();
    let mut impacts = Vec::new();

    // Detect against frame-start state for every body, then resolve; this
    // keeps the sequential and parallel paths observing the same world.
    for index in 0..dynamic_bodies.slot_count() {
        if let Some(impact) = ccd_sweep_slot(
            index,
            dynamic_bodies.slots(),
            static_bodies,
            dynamic_bvh,
            static_bvh,
            dt,
            &mut candidates,
            &mut stats,
        ) {
            impacts.push((index, impact));
        }
    }

    apply_impacts(dynamic_bodies, &impacts, dt);
    stats
}

#[derive(Default)]
struct CcdBuffers {
    impacts: Vec<(usize, ccd::CcdImpact)>,
    stats: CcdStats,
}

/// Work-stealing CCD: workers sweep an immutable frame-start snapshot of
/// the dynamic slots in batches of 32, recording impacts and stats into
/// per-thread buffers. The pool itself is written only after the join.
pub(crate) fn ccd_pass_parallel(
    workers: &mut WorkerPool,
    dynamic_bodies: &mut Pool<DynamicBody>,
    static_bodies: &Pool<StaticBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bvh: &Bvh<StaticProxy>,
    dt: f32,
) -> CcdStats {
    let slot_count = dynamic_bodies.slot_count();
    if slot_count == 0 {
        return CcdStats::default();
    }

    let snapshot = dynamic_bodies.slots().to_vec();
    let worker_count = workers.thread_count().max(1);
    let queue = BatchQueue::new(slot_count, CCD_BATCH_SIZE);
    let mut buffers: Vec<CcdBuffers> = Vec::new();
    buffers.resize_with(worker_count, CcdBuffers::default);
    let buffers_ptr = SharedPtr(buffers.as_mut_ptr());

    workers.run(|worker| {
        let buffers_ptr = buffers_ptr;
        let local = unsafe { &mut *buffers_ptr.0.add(worker) };
        let mut candidates = Vec::new();
        while let Some(batch) = queue.next_batch() {
            for index in batch {
                if let Some(impact) = ccd_sweep_slot(
                    index,
                    &snapshot,
                    static_bodies,
                    dynamic_bvh,
                    static_bvh,
                    dt,
                    &mut candidates,
                    &mut local.stats,
                ) {
                    local.impacts.push((index, impact));
                }
            }
        }
    });

    let mut stats = CcdStats::default();
    for buffer in &buffers {
        stats.merge(&buffer.stats);
        apply_impacts(dynamic_bodies, &buffer.impacts, dt);
    }
    stats
}

/// Fixed-chunk CCD variant kept selectable for comparison; a mutex guards
/// the shared stats and result list instead of per-thread buffers.
pub(crate) fn ccd_pass_coarse(
    workers: &mut WorkerPool,
    dynamic_bodies: &mut Pool<DynamicBody>,
    static_bodies: &Pool<StaticBody>,
    dynamic_bvh: &Bvh<DynamicProxy>,
    static_bvh: &Bvh<StaticProxy>,
    dt: f32,
) -> CcdStats {
    let slot_count = dynamic_bodies.slot_count();
    if slot_count == 0 {
        return CcdStats::default();
    }

    let snapshot = dynamic_bodies.slots().to_vec();
    let worker_count = workers.thread_count().max(1);
    let shared_stats = Mutex::new(CcdStats::default());
    let shared_impacts: Mutex<Vec<(usize, ccd::CcdImpact)>> = Mutex::new(Vec::new());

    workers.run(|worker| {
        let mut local_stats = CcdStats::default();
        let mut local_impacts = Vec::new();
        let mut candidates = Vec::new();

        for index in chunk_range(slot_count, worker_count, worker) {
            if let Some(impact) = ccd_sweep_slot(
                index,
                &snapshot,
                static_bodies,
                dynamic_bvh,
                static_bvh,
                dt,
                &mut candidates,
                &mut local_stats,
            ) {
                local_impacts.push((index, impact));
            }
        }

        shared_stats.lock().merge(&local_stats);
        shared_impacts.lock().append(&mut local_impacts);
    });

    apply_impacts(dynamic_bodies, &shared_impacts.into_inner(), dt);
    shared_stats.into_inner()
}
