//! Vector kernels used by the linear scans.
//!
//! With the `simd` feature the dot product and squared distance run eight lanes at a time
//! through `wide`; otherwise a scalar loop is used. Both return identical results up to
//! floating point reassociation.

#[cfg(feature = "simd")]
use wide::f32x8;

#[cfg(feature = "simd")]
#[inline]
fn load8(chunk: &[f32]) -> f32x8 {
    let mut lanes = [0.0f32; 8];
    lanes.copy_from_slice(chunk);
    f32x8::from(lanes)
}

/// Inner product of two equally long slices.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    #[cfg(feature = "simd")]
    {
        let mut acc = f32x8::ZERO;
        let a_chunks = a.chunks_exact(8);
        let b_chunks = b.chunks_exact(8);
        let tail: f32 = a_chunks
            .remainder()
            .iter()
            .zip(b_chunks.remainder())
            .map(|(x, y)| x * y)
            .sum();
        for (ca, cb) in a_chunks.zip(b_chunks) {
            acc += load8(ca) * load8(cb);
        }
        acc.reduce_add() + tail
    }
    #[cfg(not(feature = "simd"))]
    {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }
}

/// Squared Euclidean distance of two equally long slices.
#[inline]
#[must_use]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    #[cfg(feature = "simd")]
    {
        let mut acc = f32x8::ZERO;
        let a_chunks = a.chunks_exact(8);
        let b_chunks = b.chunks_exact(8);
        let tail: f32 = a_chunks
            .remainder()
            .iter()
            .zip(b_chunks.remainder())
            .map(|(x, y)| (x - y) * (x - y))
            .sum();
        for (ca, cb) in a_chunks.zip(b_chunks) {
            let d = load8(ca) - load8(cb);
            acc += d * d;
        }
        acc.reduce_add() + tail
    }
    #[cfg(not(feature = "simd"))]
    {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }
}

#[inline]
#[must_use]
pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Scales `v` to unit length in place; zero vectors are left untouched.
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_handles_tails() {
        let a: Vec<f32> = (0..19).map(|i| i as f32).collect();
        let b = vec![1.0f32; 19];
        assert!((dot(&a, &b) - 171.0).abs() < 1e-4);
    }

    #[test]
    fn squared_l2_matches_scalar() {
        let a: Vec<f32> = (0..11).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..11).map(|i| i as f32 * 0.25).collect();
        let expected: f32 = a.iter().zip(&b).map(|(x, y)| (x - y) * (x - y)).sum();
        assert!((squared_l2(&a, &b) - expected).abs() < 1e-4);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut zero = vec![0.0f32; 4];
        normalize_in_place(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
        let mut v = vec![3.0f32, 4.0];
        normalize_in_place(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }
}
