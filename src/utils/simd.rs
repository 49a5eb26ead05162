//! SoA batch kernels for the hot bounds paths.
//!
//! Each kernel transposes stack-local lanes into structure-of-arrays form,
//! runs 4-wide arithmetic (8-wide for the AABB conversion on AVX2), and
//! transposes back. The CPU level is probed once and cached; the scalar
//! fallback uses the same formula ordering so both paths agree to well under
//! the documented 1e-5 tolerance.

use std::sync::OnceLock;

use glam::{Quat, Vec3};

use crate::core::geometry::Aabb;

/// Instruction set selected for the batch kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    Scalar,
    Sse2,
    Avx2,
}

static LEVEL: OnceLock<SimdLevel> = OnceLock::new();

impl SimdLevel {
    /// Probes CPU features. Called once per process; `World::new` forces the
    /// probe so no query pays for detection mid-frame.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if std::is_x86_feature_detected!("avx2") {
                return SimdLevel::Avx2;
            }
            if std::is_x86_feature_detected!("sse2") {
                return SimdLevel::Sse2;
            }
        }
        SimdLevel::Scalar
    }

    pub fn cached() -> Self {
        *LEVEL.get_or_init(Self::detect)
    }
}

/// Four 3-vectors in structure-of-arrays layout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3Batch4 {
    pub x: [f32; 4],
    pub y: [f32; 4],
    pub z: [f32; 4],
}

impl Vec3Batch4 {
    pub fn from_vecs(v: [Vec3; 4]) -> Self {
        Self {
            x: [v[0].x, v[1].x, v[2].x, v[3].x],
            y: [v[0].y, v[1].y, v[2].y, v[3].y],
            z: [v[0].z, v[1].z, v[2].z, v[3].z],
        }
    }

    pub fn splat(v: Vec3) -> Self {
        Self::from_vecs([v; 4])
    }

    pub fn lane(&self, i: usize) -> Vec3 {
        Vec3::new(self.x[i], self.y[i], self.z[i])
    }

    pub fn to_vecs(&self) -> [Vec3; 4] {
        [self.lane(0), self.lane(1), self.lane(2), self.lane(3)]
    }
}

/// Four quaternions in structure-of-arrays layout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuatBatch4 {
    pub x: [f32; 4],
    pub y: [f32; 4],
    pub z: [f32; 4],
    pub w: [f32; 4],
}

impl QuatBatch4 {
    pub fn from_quats(q: [Quat; 4]) -> Self {
        Self {
            x: [q[0].x, q[1].x, q[2].x, q[3].x],
            y: [q[0].y, q[1].y, q[2].y, q[3].y],
            z: [q[0].z, q[1].z, q[2].z, q[3].z],
            w: [q[0].w, q[1].w, q[2].w, q[3].w],
        }
    }
}

/// Four AABBs in structure-of-arrays layout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AabbBatch4 {
    pub min: Vec3Batch4,
    pub max: Vec3Batch4,
}

impl AabbBatch4 {
    pub fn from_aabbs(boxes: [Aabb; 4]) -> Self {
        Self {
            min: Vec3Batch4::from_vecs([boxes[0].min, boxes[1].min, boxes[2].min, boxes[3].min]),
            max: Vec3Batch4::from_vecs([boxes[0].max, boxes[1].max, boxes[2].max, boxes[3].max]),
        }
    }

    pub fn splat(aabb: Aabb) -> Self {
        Self {
            min: Vec3Batch4::splat(aabb.min),
            max: Vec3Batch4::splat(aabb.max),
        }
    }

    pub fn lane(&self, i: usize) -> Aabb {
        Aabb::new(self.min.lane(i), self.max.lane(i))
    }
}

/// Per-lane dot products.
pub fn vector_dot3_batch4(a: &Vec3Batch4, b: &Vec3Batch4) -> [f32; 4] {
    #[cfg(target_arch = "x86_64")]
    if SimdLevel::cached() != SimdLevel::Scalar {
        return unsafe { x86::dot3(a, b) };
    }
    scalar::dot3(a, b)
}

/// Per-lane cross products.
pub fn vector_cross3_batch4(a: &Vec3Batch4, b: &Vec3Batch4) -> Vec3Batch4 {
    #[cfg(target_arch = "x86_64")]
    if SimdLevel::cached() != SimdLevel::Scalar {
        return unsafe { x86::cross3(a, b) };
    }
    scalar::cross3(a, b)
}

/// Per-lane Euclidean lengths.
pub fn vector_length3_batch4(a: &Vec3Batch4) -> [f32; 4] {
    #[cfg(target_arch = "x86_64")]
    if SimdLevel::cached() != SimdLevel::Scalar {
        return unsafe { x86::length3(a) };
    }
    scalar::length3(a)
}

/// Per-lane normalisation; zero-length lanes come back zero.
pub fn vector_normalize3_batch4(a: &Vec3Batch4) -> Vec3Batch4 {
    #[cfg(target_arch = "x86_64")]
    if SimdLevel::cached() != SimdLevel::Scalar {
        return unsafe { x86::normalize3(a) };
    }
    scalar::normalize3(a)
}

/// Rotates four vectors by four quaternions.
pub fn quaternion_mul_vector3_batch4(q: &QuatBatch4, v: &Vec3Batch4) -> Vec3Batch4 {
    #[cfg(target_arch = "x86_64")]
    if SimdLevel::cached() != SimdLevel::Scalar {
        return unsafe { x86::quat_mul_vec3(q, v) };
    }
    scalar::quat_mul_vec3(q, v)
}

/// Converts four OBBs to their enclosing AABBs via the absolute rotation
/// matrix rows.
pub fn obb_to_aabb_batch4(
    centers: &Vec3Batch4,
    half_extents: &Vec3Batch4,
    rotations: &QuatBatch4,
) -> AabbBatch4 {
    #[cfg(target_arch = "x86_64")]
    if SimdLevel::cached() != SimdLevel::Scalar {
        return unsafe { x86::obb_to_aabb(centers, half_extents, rotations) };
    }
    scalar::obb_to_aabb(centers, half_extents, rotations)
}

/// Pairwise AABB overlap tests; bit `i` of the result is lane `i`.
pub fn aabb_intersects_batch4(a: &AabbBatch4, b: &AabbBatch4) -> u32 {
    #[cfg(target_arch = "x86_64")]
    if SimdLevel::cached() != SimdLevel::Scalar {
        return unsafe { x86::aabb_intersects(a, b) };
    }
    scalar::aabb_intersects(a, b)
}

/// 8-wide OBB→AABB conversion. Runs a single AVX2 pass where available and
/// otherwise splits into two 4-wide batches.
pub fn obb_to_aabb_batch8(
    centers: &[Vec3; 8],
    half_extents: &[Vec3; 8],
    rotations: &[Quat; 8],
) -> [Aabb; 8] {
    #[cfg(target_arch = "x86_64")]
    if SimdLevel::cached() == SimdLevel::Avx2 {
        return unsafe { x86::obb_to_aabb_8(centers, half_extents, rotations) };
    }

    let mut out = [Aabb::empty(); 8];
    for half in 0..2 {
        let o = half * 4;
        let batch = obb_to_aabb_batch4(
            &Vec3Batch4::from_vecs([
                centers[o],
                centers[o + 1],
                centers[o + 2],
                centers[o + 3],
            ]),
            &Vec3Batch4::from_vecs([
                half_extents[o],
                half_extents[o + 1],
                half_extents[o + 2],
                half_extents[o + 3],
            ]),
            &QuatBatch4::from_quats([
                rotations[o],
                rotations[o + 1],
                rotations[o + 2],
                rotations[o + 3],
            ]),
        );
        for lane in 0..4 {
            out[o + lane] = batch.lane(lane);
        }
    }
    out
}

mod scalar {
    use super::*;

    pub fn dot3(a: &Vec3Batch4, b: &Vec3Batch4) -> [f32; 4] {
        std::array::from_fn(|i| a.x[i] * b.x[i] + a.y[i] * b.y[i] + a.z[i] * b.z[i])
    }

    pub fn cross3(a: &Vec3Batch4, b: &Vec3Batch4) -> Vec3Batch4 {
        Vec3Batch4 {
            x: std::array::from_fn(|i| a.y[i] * b.z[i] - a.z[i] * b.y[i]),
            y: std::array::from_fn(|i| a.z[i] * b.x[i] - a.x[i] * b.z[i]),
            z: std::array::from_fn(|i| a.x[i] * b.y[i] - a.y[i] * b.x[i]),
        }
    }

    pub fn length3(a: &Vec3Batch4) -> [f32; 4] {
        let d = dot3(a, a);
        std::array::from_fn(|i| d[i].sqrt())
    }

    pub fn normalize3(a: &Vec3Batch4) -> Vec3Batch4 {
        let len = length3(a);
        let inv: [f32; 4] = std::array::from_fn(|i| if len[i] > 1e-12 { 1.0 / len[i] } else { 0.0 });
        Vec3Batch4 {
            x: std::array::from_fn(|i| a.x[i] * inv[i]),
            y: std::array::from_fn(|i| a.y[i] * inv[i]),
            z: std::array::from_fn(|i| a.z[i] * inv[i]),
        }
    }

    pub fn quat_mul_vec3(q: &QuatBatch4, v: &Vec3Batch4) -> Vec3Batch4 {
        // v' = v + w·t + q×t with t = 2·(q×v).
        let qv = Vec3Batch4 {
            x: q.x,
            y: q.y,
            z: q.z,
        };
        let mut t = cross3(&qv, v);
        for i in 0..4 {
            t.x[i] *= 2.0;
            t.y[i] *= 2.0;
            t.z[i] *= 2.0;
        }
        let qt = cross3(&qv, &t);
        Vec3Batch4 {
            x: std::array::from_fn(|i| v.x[i] + q.w[i] * t.x[i] + qt.x[i]),
            y: std::array::from_fn(|i| v.y[i] + q.w[i] * t.y[i] + qt.y[i]),
            z: std::array::from_fn(|i| v.z[i] + q.w[i] * t.z[i] + qt.z[i]),
        }
    }

    pub fn obb_to_aabb(
        centers: &Vec3Batch4,
        half_extents: &Vec3Batch4,
        rotations: &QuatBatch4,
    ) -> AabbBatch4 {
        let mut out = AabbBatch4::default();
        for i in 0..4 {
            let (qx, qy, qz, qw) = (rotations.x[i], rotations.y[i], rotations.z[i], rotations.w[i]);
            // Absolute rows of the rotation matrix.
            let r00 = (1.0 - 2.0 * (qy * qy + qz * qz)).abs();
            let r01 = (2.0 * (qx * qy - qw * qz)).abs();
            let r02 = (2.0 * (qx * qz + qw * qy)).abs();
            let r10 = (2.0 * (qx * qy + qw * qz)).abs();
            let r11 = (1.0 - 2.0 * (qx * qx + qz * qz)).abs();
            let r12 = (2.0 * (qy * qz - qw * qx)).abs();
            let r20 = (2.0 * (qx * qz - qw * qy)).abs();
            let r21 = (2.0 * (qy * qz + qw * qx)).abs();
            let r22 = (1.0 - 2.0 * (qx * qx + qy * qy)).abs();

            let (hx, hy, hz) = (half_extents.x[i], half_extents.y[i], half_extents.z[i]);
            let ex = r00 * hx + r01 * hy + r02 * hz;
            let ey = r10 * hx + r11 * hy + r12 * hz;
            let ez = r20 * hx + r21 * hy + r22 * hz;

            out.min.x[i] = centers.x[i] - ex;
            out.min.y[i] = centers.y[i] - ey;
            out.min.z[i] = centers.z[i] - ez;
            out.max.x[i] = centers.x[i] + ex;
            out.max.y[i] = centers.y[i] + ey;
            out.max.z[i] = centers.z[i] + ez;
        }
        out
    }

    pub fn aabb_intersects(a: &AabbBatch4, b: &AabbBatch4) -> u32 {
        let mut mask = 0;
        for i in 0..4 {
            let hit = a.min.x[i] <= b.max.x[i]
                && a.max.x[i] >= b.min.x[i]
                && a.min.y[i] <= b.max.y[i]
                && a.max.y[i] >= b.min.y[i]
                && a.min.z[i] <= b.max.z[i]
                && a.max.z[i] >= b.min.z[i];
            if hit {
                mask |= 1 << i;
            }
        }
        mask
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::*;
    use std::arch::x86_64::*;

    #[inline]
    #[target_feature(enable = "sse2")]
    unsafe fn load(a: &[f32; 4]) -> __m128 {
        _mm_loadu_ps(a.as_ptr())
    }

    #[inline]
    #[target_feature(enable = "sse2")]
    unsafe fn store(v: __m128) -> [f32; 4] {
        let mut out = [0.0f32; 4];
        _mm_storeu_ps(out.as_mut_ptr(), v);
        out
    }

    #[inline]
    #[target_feature(enable = "sse2")]
    unsafe fn abs(v: __m128) -> __m128 {
        _mm_andnot_ps(_mm_set1_ps(-0.0), v)
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn dot3(a: &Vec3Batch4, b: &Vec3Batch4) -> [f32; 4] {
        let x = _mm_mul_ps(load(&a.x), load(&b.x));
        let y = _mm_mul_ps(load(&a.y), load(&b.y));
        let z = _mm_mul_ps(load(&a.z), load(&b.z));
        store(_mm_add_ps(_mm_add_ps(x, y), z))
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn cross3(a: &Vec3Batch4, b: &Vec3Batch4) -> Vec3Batch4 {
        let (ax, ay, az) = (load(&a.x), load(&a.y), load(&a.z));
        let (bx, by, bz) = (load(&b.x), load(&b.y), load(&b.z));
        Vec3Batch4 {
            x: store(_mm_sub_ps(_mm_mul_ps(ay, bz), _mm_mul_ps(az, by))),
            y: store(_mm_sub_ps(_mm_mul_ps(az, bx), _mm_mul_ps(ax, bz))),
            z: store(_mm_sub_ps(_mm_mul_ps(ax, by), _mm_mul_ps(ay, bx))),
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn length3(a: &Vec3Batch4) -> [f32; 4] {
        let x = load(&a.x);
        let y = load(&a.y);
        let z = load(&a.z);
        let sq = _mm_add_ps(
            _mm_add_ps(_mm_mul_ps(x, x), _mm_mul_ps(y, y)),
            _mm_mul_ps(z, z),
        );
        store(_mm_sqrt_ps(sq))
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn normalize3(a: &Vec3Batch4) -> Vec3Batch4 {
        let x = load(&a.x);
        let y = load(&a.y);
        let z = load(&a.z);
        let sq = _mm_add_ps(
            _mm_add_ps(_mm_mul_ps(x, x), _mm_mul_ps(y, y)),
            _mm_mul_ps(z, z),
        );
        let len = _mm_sqrt_ps(sq);
        let valid = _mm_cmpgt_ps(len, _mm_set1_ps(1e-12));
        // Avoid dividing by zero lanes, then mask them out.
        let safe_len = _mm_or_ps(
            _mm_and_ps(valid, len),
            _mm_andnot_ps(valid, _mm_set1_ps(1.0)),
        );
        let inv = _mm_div_ps(_mm_set1_ps(1.0), safe_len);
        let inv = _mm_and_ps(valid, inv);
        Vec3Batch4 {
            x: store(_mm_mul_ps(x, inv)),
            y: store(_mm_mul_ps(y, inv)),
            z: store(_mm_mul_ps(z, inv)),
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn quat_mul_vec3(q: &QuatBatch4, v: &Vec3Batch4) -> Vec3Batch4 {
        let (qx, qy, qz, qw) = (load(&q.x), load(&q.y), load(&q.z), load(&q.w));
        let (vx, vy, vz) = (load(&v.x), load(&v.y), load(&v.z));
        let two = _mm_set1_ps(2.0);

        // t = 2·(q×v)
        let tx = _mm_mul_ps(two, _mm_sub_ps(_mm_mul_ps(qy, vz), _mm_mul_ps(qz, vy)));
        let ty = _mm_mul_ps(two, _mm_sub_ps(_mm_mul_ps(qz, vx), _mm_mul_ps(qx, vz)));
        let tz = _mm_mul_ps(two, _mm_sub_ps(_mm_mul_ps(qx, vy), _mm_mul_ps(qy, vx)));

        // q×t
        let cx = _mm_sub_ps(_mm_mul_ps(qy, tz), _mm_mul_ps(qz, ty));
        let cy = _mm_sub_ps(_mm_mul_ps(qz, tx), _mm_mul_ps(qx, tz));
        let cz = _mm_sub_ps(_mm_mul_ps(qx, ty), _mm_mul_ps(qy, tx));

        Vec3Batch4 {
            x: store(_mm_add_ps(vx, _mm_add_ps(_mm_mul_ps(qw, tx), cx))),
            y: store(_mm_add_ps(vy, _mm_add_ps(_mm_mul_ps(qw, ty), cy))),
            z: store(_mm_add_ps(vz, _mm_add_ps(_mm_mul_ps(qw, tz), cz))),
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn obb_to_aabb(
        centers: &Vec3Batch4,
        half_extents: &Vec3Batch4,
        rotations: &QuatBatch4,
    ) -> AabbBatch4 {
        let (qx, qy, qz, qw) = (
            load(&rotations.x),
            load(&rotations.y),
            load(&rotations.z),
            load(&rotations.w),
        );
        let one = _mm_set1_ps(1.0);
        let two = _mm_set1_ps(2.0);

        let xx = _mm_mul_ps(qx, qx);
        let yy = _mm_mul_ps(qy, qy);
        let zz = _mm_mul_ps(qz, qz);
        let xy = _mm_mul_ps(qx, qy);
        let xz = _mm_mul_ps(qx, qz);
        let yz = _mm_mul_ps(qy, qz);
        let wx = _mm_mul_ps(qw, qx);
        let wy = _mm_mul_ps(qw, qy);
        let wz = _mm_mul_ps(qw, qz);

        let r00 = abs(_mm_sub_ps(one, _mm_mul_ps(two, _mm_add_ps(yy, zz))));
        let r01 = abs(_mm_mul_ps(two, _mm_sub_ps(xy, wz)));
        let r02 = abs(_mm_mul_ps(two, _mm_add_ps(xz, wy)));
        let r10 = abs(_mm_mul_ps(two, _mm_add_ps(xy, wz)));
        let r11 = abs(_mm_sub_ps(one, _mm_mul_ps(two, _mm_add_ps(xx, zz))));
        let r12 = abs(_mm_mul_ps(two, _mm_sub_ps(yz, wx)));
        let r20 = abs(_mm_mul_ps(two, _mm_sub_ps(xz, wy)));
        let r21 = abs(_mm_mul_ps(two, _mm_add_ps(yz, wx)));
        let r22 = abs(_mm_sub_ps(one, _mm_mul_ps(two, _mm_add_ps(xx, yy))));

        let hx = load(&half_extents.x);
        let hy = load(&half_extents.y);
        let hz = load(&half_extents.z);

        let ex = _mm_add_ps(
            _mm_add_ps(_mm_mul_ps(r00, hx), _mm_mul_ps(r01, hy)),
            _mm_mul_ps(r02, hz),
        );
        let ey = _mm_add_ps(
            _mm_add_ps(_mm_mul_ps(r10, hx), _mm_mul_ps(r11, hy)),
            _mm_mul_ps(r12, hz),
        );
        let ez = _mm_add_ps(
            _mm_add_ps(_mm_mul_ps(r20, hx), _mm_mul_ps(r21, hy)),
            _mm_mul_ps(r22, hz),
        );

        let cx = load(&centers.x);
        let cy = load(&centers.y);
        let cz = load(&centers.z);

        AabbBatch4 {
            min: Vec3Batch4 {
                x: store(_mm_sub_ps(cx, ex)),
                y: store(_mm_sub_ps(cy, ey)),
                z: store(_mm_sub_ps(cz, ez)),
            },
            max: Vec3Batch4 {
                x: store(_mm_add_ps(cx, ex)),
                y: store(_mm_add_ps(cy, ey)),
                z: store(_mm_add_ps(cz, ez)),
            },
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn aabb_intersects(a: &AabbBatch4, b: &AabbBatch4) -> u32 {
        let mut hit = _mm_and_ps(
            _mm_cmple_ps(load(&a.min.x), load(&b.max.x)),
            _mm_cmpge_ps(load(&a.max.x), load(&b.min.x)),
        );
        hit = _mm_and_ps(
            hit,
            _mm_and_ps(
                _mm_cmple_ps(load(&a.min.y), load(&b.max.y)),
                _mm_cmpge_ps(load(&a.max.y), load(&b.min.y)),
            ),
        );
        hit = _mm_and_ps(
            hit,
            _mm_and_ps(
                _mm_cmple_ps(load(&a.min.z), load(&b.max.z)),
                _mm_cmpge_ps(load(&a.max.z), load(&b.min.z)),
            ),
        );
        _mm_movemask_ps(hit) as u32
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn obb_to_aabb_8(
        centers: &[Vec3; 8],
        half_extents: &[Vec3; 8],
        rotations: &[Quat; 8],
    ) -> [Aabb; 8] {
        #[inline]
        #[target_feature(enable = "avx2")]
        unsafe fn gather(src: &[f32; 8]) -> __m256 {
            _mm256_loadu_ps(src.as_ptr())
        }
        #[inline]
        #[target_feature(enable = "avx2")]
        unsafe fn spill(v: __m256) -> [f32; 8] {
            let mut out = [0.0f32; 8];
            _mm256_storeu_ps(out.as_mut_ptr(), v);
            out
        }
        #[inline]
        #[target_feature(enable = "avx2")]
        unsafe fn abs8(v: __m256) -> __m256 {
            _mm256_andnot_ps(_mm256_set1_ps(-0.0), v)
        }

        let qx = gather(&std::array::from_fn(|i| rotations[i].x));
        let qy = gather(&std::array::from_fn(|i| rotations[i].y));
        let qz = gather(&std::array::from_fn(|i| rotations[i].z));
        let qw = gather(&std::array::from_fn(|i| rotations[i].w));

        let one = _mm256_set1_ps(1.0);
        let two = _mm256_set1_ps(2.0);

        let xx = _mm256_mul_ps(qx, qx);
        let yy = _mm256_mul_ps(qy, qy);
        let zz = _mm256_mul_ps(qz, qz);
        let xy = _mm256_mul_ps(qx, qy);
        let xz = _mm256_mul_ps(qx, qz);
        let yz = _mm256_mul_ps(qy, qz);
        let wx = _mm256_mul_ps(qw, qx);
        let wy = _mm256_mul_ps(qw, qy);
        let wz = _mm256_mul_ps(qw, qz);

        let r00 = abs8(_mm256_sub_ps(one, _mm256_mul_ps(two, _mm256_add_ps(yy, zz))));
        let r01 = abs8(_mm256_mul_ps(two, _mm256_sub_ps(xy, wz)));
        let r02 = abs8(_mm256_mul_ps(two, _mm256_add_ps(xz, wy)));
        let r10 = abs8(_mm256_mul_ps(two, _mm256_add_ps(xy, wz)));
        let r11 = abs8(_mm256_sub_ps(one, _mm256_mul_ps(two, _mm256_add_ps(xx, zz))));
        let r12 = abs8(_mm256_mul_ps(two, _mm256_sub_ps(yz, wx)));
        let r20 = abs8(_mm256_mul_ps(two, _mm256_sub_ps(xz, wy)));
        let r21 = abs8(_mm256_mul_ps(two, _mm256_add_ps(yz, wx)));
        let r22 = abs8(_mm256_sub_ps(one, _mm256_mul_ps(two, _mm256_add_ps(xx, yy))));

        let hx = gather(&std::array::from_fn(|i| half_extents[i].x));
        let hy = gather(&std::array::from_fn(|i| half_extents[i].y));
        let hz = gather(&std::array::from_fn(|i| half_extents[i].z));

        let ex = _mm256_add_ps(
            _mm256_add_ps(_mm256_mul_ps(r00, hx), _mm256_mul_ps(r01, hy)),
            _mm256_mul_ps(r02, hz),
        );
        let ey = _mm256_add_ps(
            _mm256_add_ps(_mm256_mul_ps(r10, hx), _mm256_mul_ps(r11, hy)),
            _mm256_mul_ps(r12, hz),
        );
        let ez = _mm256_add_ps(
            _mm256_add_ps(_mm256_mul_ps(r20, hx), _mm256_mul_ps(r21, hy)),
            _mm256_mul_ps(r22, hz),
        );

        let cx = gather(&std::array::from_fn(|i| centers[i].x));
        let cy = gather(&std::array::from_fn(|i| centers[i].y));
        let cz = gather(&std::array::from_fn(|i| centers[i].z));

        let min_x = spill(_mm256_sub_ps(cx, ex));
        let min_y = spill(_mm256_sub_ps(cy, ey));
        let min_z = spill(_mm256_sub_ps(cz, ez));
        let max_x = spill(_mm256_add_ps(cx, ex));
        let max_y = spill(_mm256_add_ps(cy, ey));
        let max_z = spill(_mm256_add_ps(cz, ez));

        std::array::from_fn(|i| {
            Aabb::new(
                Vec3::new(min_x[i], min_y[i], min_z[i]),
                Vec3::new(max_x[i], max_y[i], max_z[i]),
            )
        })
    }
}
