//! Bayesian relevance feedback from liked and ignored frames.

use std::borrow::Cow;
use std::collections::BTreeSet;

use rayon::prelude::*;

use crate::config::FeedbackConfig;
use crate::constants::{MINIMAL_SCORE, PARALLEL_SCAN_MIN_ROWS};
use crate::error::{FrameHunterError, Result};
use crate::rankers::EmbeddingRanker;
use crate::simd::dot;
use crate::types::{FrameId, ScoreArray};

/// Reweights `scores` towards the liked frames and away from frames shown but not liked.
///
/// Every score is multiplied by `L / (L + O)` where `L = Σ exp(-d(f, like) / σ)` and
/// `O = Σ exp(-d(f, other) / σ)` with `d = (1 - dot) / 2`; the result is rescaled so the best
/// frame scores 1. At most `max_others` ignored frames (lowest ids first) are considered.
/// Rows are read through `vectors`, so a configured projection applies here too.
pub(crate) fn apply_feedback(
    vectors: &EmbeddingRanker,
    scores: &ScoreArray,
    likes: &[FrameId],
    shown: &[FrameId],
    config: &FeedbackConfig,
) -> Result<ScoreArray> {
    let liked: BTreeSet<FrameId> = likes.iter().copied().collect();
    if liked.is_empty() {
        return Ok(scores.clone());
    }
    for &frame_id in liked.iter().chain(shown) {
        if !vectors.store().contains(frame_id) {
            return Err(FrameHunterError::UnknownFrame { frame_id });
        }
    }
    let others: Vec<FrameId> = shown
        .iter()
        .copied()
        .filter(|id| !liked.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(config.max_others)
        .collect();

    let like_rows: Vec<Cow<'_, [f32]>> = liked
        .iter()
        .map(|id| vectors.stored_row(*id))
        .collect::<Result<_>>()?;
    let other_rows: Vec<Cow<'_, [f32]>> = others
        .iter()
        .map(|id| vectors.stored_row(*id))
        .collect::<Result<_>>()?;
    let sigma = config.sigma;
    let kernel = |row: &[f32], refs: &[Cow<'_, [f32]>]| -> f32 {
        refs.iter()
            .map(|r| (-(1.0 - dot(row, r)) / 2.0 / sigma).exp())
            .sum()
    };
    let reweight = |(id, score): (FrameId, f32)| -> Result<f32> {
        let row = vectors.stored_row(id)?;
        let like = kernel(&row, &like_rows);
        let other = kernel(&row, &other_rows);
        let total = like + other;
        Ok(if total > 0.0 { score * like / total } else { score })
    };

    let pairs: Vec<(FrameId, f32)> = scores.iter().collect();
    let mut updated: Vec<f32> = if pairs.len() >= PARALLEL_SCAN_MIN_ROWS {
        pairs.par_iter().map(|p| reweight(*p)).collect::<Result<_>>()?
    } else {
        pairs.iter().map(|p| reweight(*p)).collect::<Result<_>>()?
    };
    let max = updated.iter().copied().fold(0.0f32, f32::max);
    if max > MINIMAL_SCORE {
        for s in &mut updated {
            *s /= max;
        }
    }
    tracing::debug!(
        target = "framehunter::feedback",
        likes = liked.len(),
        others = others.len(),
        candidates = pairs.len(),
        "relevance feedback applied"
    );
    Ok(ScoreArray::from_parts(scores.ids().to_vec(), updated))
}
