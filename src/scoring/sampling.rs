//! Score-proportional sampling for exploratory displays.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::types::{FrameId, ScoreArray, score::descending};

/// Draws up to `count` distinct frames with probability proportional to their score.
///
/// Uses one exponential key `ln(u) / w` per frame and keeps the largest keys, which equals
/// sequential weighted sampling without replacement. Frames with a non-positive score are
/// only returned once every positive frame has been taken, in ascending id order.
#[must_use]
pub fn weighted_sample(scores: &ScoreArray, count: usize, seed: u64) -> Vec<FrameId> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let mut keyed: Vec<(FrameId, f32)> = scores
        .iter()
        .map(|(id, weight)| {
            let u: f32 = rng.gen_range(f32::EPSILON..1.0);
            let key = if weight > 0.0 && weight.is_finite() {
                u.ln() / weight
            } else {
                f32::NEG_INFINITY
            };
            (id, key)
        })
        .collect();
    keyed.sort_by(|a, b| descending(a.1, b.1).then(a.0.cmp(&b.0)));
    keyed.truncate(count);
    keyed.into_iter().map(|(id, _)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_deterministic_per_seed() {
        let scores = ScoreArray::from_pairs((0..50).map(|i| (i, 1.0 + i as f32)));
        let a = weighted_sample(&scores, 10, 7);
        let b = weighted_sample(&scores, 10, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        let mut unique = a.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn zero_weights_come_last() {
        let scores = ScoreArray::from_pairs([(0, 0.0), (1, 0.5), (2, 0.0), (3, 2.0)]);
        let sample = weighted_sample(&scores, 4, 1);
        assert_eq!(&sample[2..], &[0, 2]);
    }

    #[test]
    fn heavy_frames_dominate() {
        let mut pairs: Vec<(FrameId, f32)> = (0..100).map(|i| (i, 0.01)).collect();
        pairs.push((100, 1000.0));
        let scores = ScoreArray::from_pairs(pairs);
        let hits = (0..20)
            .filter(|seed| weighted_sample(&scores, 1, *seed)[0] == 100)
            .count();
        assert!(hits >= 18);
    }
}
