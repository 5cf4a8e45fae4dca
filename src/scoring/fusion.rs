//! Normalization and weighted fusion of ranker outputs over one candidate set.

use std::collections::BTreeMap;

use crate::error::{FrameHunterError, Result};
use crate::filters::FilterSet;
use crate::store::FeatureStore;
use crate::types::{FrameId, Normalization, RankerContribution, RankerKind, ScoreArray};

/// Ranker outputs of one query stage, keyed (and therefore ordered) by ranker kind.
pub type RankerOutputs = BTreeMap<RankerKind, ScoreArray>;

/// Fusion weight per ranker kind; missing kinds weigh 1.0.
pub type Weights = BTreeMap<RankerKind, f32>;

pub(crate) fn weight_of(weights: &Weights, kind: RankerKind) -> f32 {
    weights.get(&kind).copied().unwrap_or(1.0)
}

/// Normalizes each output and sums them per frame with their weights.
///
/// The candidate set is every frame scored by at least one ranker that passes `filters`;
/// a ranker that did not score a candidate contributes nothing for it. Without any outputs
/// every frame passing `filters` scores 1.0.
pub(crate) fn fuse_stage(
    store: &FeatureStore,
    stage: usize,
    outputs: &RankerOutputs,
    weights: &Weights,
    normalization: Normalization,
    filters: &FilterSet,
) -> Result<(ScoreArray, Vec<RankerContribution>)> {
    let mask = filters.candidate_mask(store);
    if outputs.is_empty() {
        let ids: Vec<FrameId> = mask.ids().collect();
        let scores = vec![1.0; ids.len()];
        return Ok((ScoreArray::from_parts(ids, scores), Vec::new()));
    }

    let mut fused: BTreeMap<FrameId, f32> = BTreeMap::new();
    let mut contributions = Vec::with_capacity(outputs.len());
    for (kind, raw) in outputs {
        if let Some(frame_id) = raw.first_non_finite() {
            return Err(FrameHunterError::NonFiniteScore {
                frame_id,
                ranker: *kind,
            });
        }
        if let Some(&frame_id) = raw.ids().last() {
            if !store.contains(frame_id) {
                return Err(FrameHunterError::UnknownFrame { frame_id });
            }
        }
        let weight = weight_of(weights, *kind);
        let normalized = raw.normalized(normalization);
        for (frame_id, score) in normalized.iter() {
            if mask.contains(frame_id) {
                *fused.entry(frame_id).or_insert(0.0) += weight * score;
            }
        }
        contributions.push(RankerContribution {
            stage,
            kind: *kind,
            weight,
            candidates: raw.len(),
        });
    }
    let fused = ScoreArray::from_pairs(fused);
    if let Some(frame_id) = fused.first_non_finite() {
        let ranker = outputs.keys().next().copied().unwrap_or(RankerKind::Embedding);
        return Err(FrameHunterError::NonFiniteScore { frame_id, ranker });
    }
    Ok((fused, contributions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureSpace, FrameMeta};

    fn store(n: u32) -> FeatureStore {
        FeatureStore::builder()
            .frames((0..n).map(|i| FrameMeta::new(0, i, i64::from(i))).collect())
            .space(FeatureSpace::Primary, 1, vec![0.0; n as usize])
            .build()
            .expect("store")
    }

    #[test]
    fn weighted_sum_of_normalized_outputs() {
        let store = store(3);
        let mut outputs = RankerOutputs::new();
        outputs.insert(
            RankerKind::Embedding,
            ScoreArray::from_pairs([(0, 2.0), (1, 0.0), (2, 1.0)]),
        );
        outputs.insert(
            RankerKind::Keyword,
            ScoreArray::from_pairs([(0, 0.0), (1, 10.0), (2, 5.0)]),
        );
        let weights = Weights::from([(RankerKind::Keyword, 2.0)]);
        let (fused, contributions) = fuse_stage(
            &store,
            0,
            &outputs,
            &weights,
            Normalization::MinMax,
            &FilterSet::default(),
        )
        .expect("fuse");
        assert_eq!(fused.scores(), &[1.0, 2.0, 1.5]);
        assert_eq!(contributions.len(), 2);
        assert_eq!(contributions[1].weight, 2.0);
    }

    #[test]
    fn non_finite_input_names_ranker() {
        let store = store(2);
        let outputs = RankerOutputs::from([(
            RankerKind::Canvas,
            ScoreArray::from_pairs([(0, f32::NAN), (1, 0.0)]),
        )]);
        let err = fuse_stage(
            &store,
            0,
            &outputs,
            &Weights::new(),
            Normalization::Raw,
            &FilterSet::default(),
        )
        .expect_err("nan");
        assert!(matches!(
            err,
            FrameHunterError::NonFiniteScore {
                frame_id: 0,
                ranker: RankerKind::Canvas
            }
        ));
    }

    #[test]
    fn foreign_frame_is_unknown() {
        let store = store(2);
        let outputs =
            RankerOutputs::from([(RankerKind::Embedding, ScoreArray::from_pairs([(5, 1.0)]))]);
        let err = fuse_stage(
            &store,
            0,
            &outputs,
            &Weights::new(),
            Normalization::MinMax,
            &FilterSet::default(),
        )
        .expect_err("unknown");
        assert!(matches!(err, FrameHunterError::UnknownFrame { frame_id: 5 }));
    }

    #[test]
    fn insertion_order_does_not_change_the_fusion() {
        let store = store(4);
        let embedding = ScoreArray::from_pairs([(0, 0.3), (1, 0.9), (3, 0.1)]);
        let canvas = ScoreArray::from_pairs([(1, 0.2), (2, 0.8), (3, 0.5)]);
        let weights = Weights::from([(RankerKind::Canvas, 0.5)]);

        let mut forward = RankerOutputs::new();
        forward.insert(RankerKind::Embedding, embedding.clone());
        forward.insert(RankerKind::Canvas, canvas.clone());
        let mut backward = RankerOutputs::new();
        backward.insert(RankerKind::Canvas, canvas);
        backward.insert(RankerKind::Embedding, embedding);

        let fuse = |outputs: &RankerOutputs| {
            fuse_stage(
                &store,
                0,
                outputs,
                &weights,
                Normalization::MinMax,
                &FilterSet::default(),
            )
            .expect("fuse")
        };
        let (a, contributions_a) = fuse(&forward);
        let (b, contributions_b) = fuse(&backward);
        assert_eq!(a.ids(), b.ids());
        assert_eq!(a.scores(), b.scores());
        let kinds = |c: &[RankerContribution]| c.iter().map(|c| c.kind).collect::<Vec<_>>();
        assert_eq!(kinds(&contributions_a), kinds(&contributions_b));
    }
}
