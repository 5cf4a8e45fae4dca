//! Classic online SOM training on a rectangular grid.

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rayon::prelude::*;

use crate::config::SomConfig;
use crate::simd::squared_l2;

/// Trained codebook: `units × dim` values, row-major by unit.
#[derive(Debug, Clone)]
pub(crate) struct Codebook {
    pub dim: usize,
    pub units: Vec<f32>,
    pub iterations: usize,
}

impl Codebook {
    pub fn unit(&self, idx: usize) -> &[f32] {
        &self.units[idx * self.dim..(idx + 1) * self.dim]
    }

    pub fn len(&self) -> usize {
        self.units.len() / self.dim
    }

    /// Index of the unit closest to `point`; ties go to the lowest index.
    pub fn best_matching_unit(&self, point: &[f32]) -> usize {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for idx in 0..self.len() {
            let d = squared_l2(point, self.unit(idx));
            if d < best_dist {
                best = idx;
                best_dist = d;
            }
        }
        best
    }
}

enum Sampler {
    Uniform(usize),
    Weighted(WeightedIndex<f32>),
}

impl Sampler {
    fn new(len: usize, weights: Option<&[f32]>) -> Self {
        weights
            .filter(|w| w.len() == len)
            .and_then(|w| WeightedIndex::new(w.iter().map(|x| x.max(0.0))).ok())
            .map_or(Self::Uniform(len), Self::Weighted)
    }

    fn sample(&self, rng: &mut Pcg64Mcg) -> usize {
        match self {
            Self::Uniform(len) => rng.gen_range(0..*len),
            Self::Weighted(dist) => dist.sample(rng),
        }
    }
}

/// Trains a `width × height` map on `points`, sampling proportionally to `weights` when given.
///
/// Learning rate and radius decay exponentially from their start to their end values over the
/// iteration budget. Units within Manhattan grid distance `radius` of the best-matching unit move
/// towards the sample by `alpha · exp(-d² / 2r²)`. Training stops early when the mean unit
/// movement over one epoch (`max(points, units)` iterations) drops below the threshold.
///
/// `should_stop` is polled at every epoch boundary; `None` means training was abandoned.
pub(crate) fn train(
    points: &[&[f32]],
    weights: Option<&[f32]>,
    config: &SomConfig,
    should_stop: impl Fn() -> bool,
) -> Option<Codebook> {
    let dim = points[0].len();
    let units = config.units();
    let mut rng = Pcg64Mcg::seed_from_u64(config.seed);
    let sampler = Sampler::new(points.len(), weights);

    let mut codebook: Vec<f32> = Vec::with_capacity(units * dim);
    for _ in 0..units {
        codebook.extend_from_slice(points[rng.gen_range(0..points.len())]);
    }
    let mut map = Codebook {
        dim,
        units: codebook,
        iterations: 0,
    };

    let width = config.width;
    let (a0, a1) = (config.alpha_start, config.alpha_end);
    let (r0, r1) = (config.initial_radius(), config.radius_end);
    let epoch = points.len().max(units);
    let budget = config.iterations as f32;
    let mut movement = 0.0f32;

    for iter in 0..config.iterations {
        if iter % epoch == 0 && should_stop() {
            tracing::debug!(
                target = "framehunter::som",
                iterations = iter,
                "som training abandoned"
            );
            return None;
        }
        let t = iter as f32 / budget;
        let alpha = a0 * (a1 / a0).powf(t);
        let radius = r0 * (r1 / r0).powf(t);
        let sample = points[sampler.sample(&mut rng)];
        let bmu = map.best_matching_unit(sample);
        let (bx, by) = ((bmu % width) as i64, (bmu / width) as i64);

        for unit in 0..units {
            let (ux, uy) = ((unit % width) as i64, (unit / width) as i64);
            let d = ((ux - bx).abs() + (uy - by).abs()) as f32;
            if d > radius {
                continue;
            }
            let h = alpha * (-(d * d) / (2.0 * radius * radius)).exp();
            let row = &mut map.units[unit * dim..(unit + 1) * dim];
            let mut step = 0.0f32;
            for (w, x) in row.iter_mut().zip(sample) {
                let delta = h * (x - *w);
                *w += delta;
                step += delta * delta;
            }
            movement += step.sqrt();
        }
        map.iterations = iter + 1;

        if (iter + 1) % epoch == 0 {
            let mean = movement / epoch as f32;
            if mean < config.convergence_threshold {
                tracing::debug!(
                    target = "framehunter::som",
                    iterations = iter + 1,
                    mean_movement = mean,
                    "som converged early"
                );
                break;
            }
            movement = 0.0;
        }
    }
    Some(map)
}

/// Best-matching unit for every point.
pub(crate) fn assign(points: &[&[f32]], map: &Codebook) -> Vec<usize> {
    points
        .par_iter()
        .map(|point| map.best_matching_unit(point))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn config(width: usize, height: usize, iterations: usize) -> SomConfig {
        SomConfig {
            width,
            height,
            iterations,
            ..SomConfig::default()
        }
    }

    #[test]
    fn separated_clusters_map_to_different_units() {
        let raw: Vec<Vec<f32>> = (0..40)
            .map(|i| {
                let jitter = (i % 5) as f32 * 0.01;
                if i < 20 {
                    vec![1.0 + jitter, 0.0]
                } else {
                    vec![0.0, 1.0 + jitter]
                }
            })
            .collect();
        let points: Vec<&[f32]> = raw.iter().map(Vec::as_slice).collect();
        let map = train(&points, None, &config(2, 2, 2000), || false).expect("trained");
        let units = assign(&points, &map);
        assert!(units[..20].iter().all(|u| !units[20..].contains(u)));
    }

    #[test]
    fn training_is_deterministic_for_seed() {
        let raw: Vec<Vec<f32>> = (0..30).map(|i| vec![i as f32 / 30.0, 1.0]).collect();
        let points: Vec<&[f32]> = raw.iter().map(Vec::as_slice).collect();
        let a = train(&points, None, &config(3, 3, 500), || false).expect("trained");
        let b = train(&points, None, &config(3, 3, 500), || false).expect("trained");
        assert_eq!(a.units, b.units);
    }

    #[test]
    fn identical_points_converge_early() {
        let raw = vec![vec![0.5f32, 0.5]; 10];
        let points: Vec<&[f32]> = raw.iter().map(Vec::as_slice).collect();
        let map = train(&points, None, &config(2, 2, 10_000), || false).expect("trained");
        assert!(map.iterations < 10_000);
    }

    #[test]
    fn stop_request_abandons_training_at_epoch_boundary() {
        let raw: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, 1.0]).collect();
        let points: Vec<&[f32]> = raw.iter().map(Vec::as_slice).collect();
        let polls = Cell::new(0usize);
        let mut slow = config(2, 2, 1_000_000);
        slow.convergence_threshold = 0.0;
        let stopped = train(&points, None, &slow, || {
            polls.set(polls.get() + 1);
            polls.get() > 3
        });
        assert!(stopped.is_none());
        assert_eq!(polls.get(), 4);
    }
}
