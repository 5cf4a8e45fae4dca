//! Score model: fusion of ranker outputs into the final ranking.
//!
//! A rescore runs in three phases. Each stage's ranker outputs are normalized and summed
//! with their weights over the filtered candidate set ([`fusion`]). With more than one stage,
//! the per-stage scores are aligned onto consecutive frames of a video ([`temporal`]).
//! Finally the scores are sorted (score descending, frame id ascending), capped per video
//! and shot, and truncated to top-K.

pub mod feedback;
pub mod fusion;
pub mod sampling;
pub mod temporal;

use std::collections::BTreeMap;
use std::time::Instant;

use smallvec::SmallVec;

use crate::config::{EngineConfig, FeedbackConfig, FusionConfig, TemporalConfig};
use crate::error::{FrameHunterError, Result};
use crate::filters::FilterSet;
use crate::rankers::EmbeddingRanker;
use crate::store::FeatureStore;
use crate::types::{
    FrameId, RankedFrame, RankerKind, RescoreMetadata, RescoreResult, ResultStatus,
    ScoreArray, ShotId, VideoId, score::descending,
};

pub use fusion::{RankerOutputs, Weights};
pub use sampling::weighted_sample;

/// Fused scores before sorting and truncation.
#[derive(Debug, Clone, Default)]
pub struct FusedScores {
    pub scores: ScoreArray,
    /// Frames matched to the later temporal stages, per anchor frame.
    pub chains: BTreeMap<FrameId, SmallVec<[FrameId; 4]>>,
    pub metadata: Option<RescoreMetadata>,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreModel {
    fusion: FusionConfig,
    temporal: TemporalConfig,
    feedback: FeedbackConfig,
}

impl ScoreModel {
    #[must_use]
    pub fn new(fusion: FusionConfig, temporal: TemporalConfig, feedback: FeedbackConfig) -> Self {
        Self {
            fusion,
            temporal,
            feedback,
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.fusion.clone(),
            config.temporal.clone(),
            config.feedback.clone(),
        )
    }

    #[must_use]
    pub fn fusion_config(&self) -> &FusionConfig {
        &self.fusion
    }

    /// Fuses `outputs` (the first stage) and any later temporal stages into a ranked result.
    ///
    /// Frames rejected by `filters` are removed. When the filters leave nothing to rank the
    /// result is empty with [`ResultStatus::NoCandidates`].
    pub fn fuse(
        &self,
        store: &FeatureStore,
        outputs: &RankerOutputs,
        weights: &Weights,
        filters: &FilterSet,
        temporal_stages: Option<&[RankerOutputs]>,
    ) -> Result<RescoreResult> {
        let mut stages = vec![outputs.clone()];
        stages.extend(temporal_stages.unwrap_or_default().iter().cloned());
        let fused = self.fuse_stages(store, &stages, weights, filters)?;
        Ok(self.finalize(store, fused))
    }

    /// Fuses every stage and aligns them when there is more than one.
    pub fn fuse_stages(
        &self,
        store: &FeatureStore,
        stages: &[RankerOutputs],
        weights: &Weights,
        filters: &FilterSet,
    ) -> Result<FusedScores> {
        let started = Instant::now();
        let mut metadata =
            RescoreMetadata::new(self.fusion.normalization, filters.clone(), self.fusion.top_k);
        metadata.stage_count = stages.len();

        let empty = RankerOutputs::new();
        let stage_list: Vec<&RankerOutputs> = if stages.is_empty() {
            vec![&empty]
        } else {
            stages.iter().collect()
        };

        let mut per_stage = Vec::with_capacity(stage_list.len());
        for (idx, outputs) in stage_list.iter().enumerate() {
            let (scores, contributions) = fusion::fuse_stage(
                store,
                idx,
                outputs,
                weights,
                self.fusion.normalization,
                filters,
            )?;
            metadata.contributions.extend(contributions);
            per_stage.push(scores);
        }

        let fused = if per_stage.len() > 1 {
            let alignment = temporal::align(store, &per_stage, self.temporal.window);
            metadata.video_scores = alignment.video_scores;
            FusedScores {
                scores: alignment.scores,
                chains: alignment.chains,
                metadata: None,
            }
        } else {
            FusedScores {
                scores: per_stage.pop().unwrap_or_default(),
                chains: BTreeMap::new(),
                metadata: None,
            }
        };
        metadata.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(FusedScores {
            metadata: Some(metadata),
            ..fused
        })
    }

    /// Reweights fused scores with liked and ignored frames.
    pub fn apply_feedback(
        &self,
        vectors: &EmbeddingRanker,
        mut fused: FusedScores,
        likes: &[FrameId],
        shown: &[FrameId],
    ) -> Result<FusedScores> {
        if likes.is_empty() {
            return Ok(fused);
        }
        fused.scores =
            feedback::apply_feedback(vectors, &fused.scores, likes, shown, &self.feedback)?;
        if let Some(metadata) = fused.metadata.as_mut() {
            metadata.feedback_likes = likes.to_vec();
        }
        Ok(fused)
    }

    /// Sorts, caps and truncates fused scores into the final result.
    #[must_use]
    pub fn finalize(&self, store: &FeatureStore, fused: FusedScores) -> RescoreResult {
        let FusedScores {
            scores,
            mut chains,
            metadata,
        } = fused;
        let metadata = metadata.unwrap_or_else(|| {
            RescoreMetadata::new(
                self.fusion.normalization,
                FilterSet::default(),
                self.fusion.top_k,
            )
        });
        if scores.is_empty() {
            return RescoreResult::no_candidates(metadata);
        }

        let mut order: Vec<(FrameId, f32)> = scores.iter().collect();
        order.sort_by(|a, b| descending(a.1, b.1).then(a.0.cmp(&b.0)));

        let mut per_video: BTreeMap<VideoId, usize> = BTreeMap::new();
        let mut per_shot: BTreeMap<(VideoId, ShotId), usize> = BTreeMap::new();
        let mut items = Vec::with_capacity(order.len().min(self.fusion.top_k));
        for (frame_id, score) in order {
            if items.len() == self.fusion.top_k {
                break;
            }
            if let Some(meta) = store.frames().get(frame_id as usize) {
                if self.fusion.per_video_limit > 0 {
                    let seen = per_video.entry(meta.video_id).or_default();
                    if *seen >= self.fusion.per_video_limit {
                        continue;
                    }
                    *seen += 1;
                }
                if self.fusion.per_shot_limit > 0 {
                    let seen = per_shot.entry((meta.video_id, meta.shot_id)).or_default();
                    if *seen >= self.fusion.per_shot_limit {
                        continue;
                    }
                    *seen += 1;
                }
            }
            items.push(RankedFrame {
                frame_id,
                score,
                aligned: chains.remove(&frame_id).unwrap_or_default(),
            });
        }
        RescoreResult {
            status: ResultStatus::Ranked,
            items,
            candidates: scores.len(),
            metadata,
        }
    }

    /// Checks a result for scores that must never appear.
    pub fn ensure_finite(result: &RescoreResult, ranker: RankerKind) -> Result<()> {
        match result.items.iter().find(|item| !item.score.is_finite()) {
            Some(item) => Err(FrameHunterError::NonFiniteScore {
                frame_id: item.frame_id,
                ranker,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureSpace, FrameMeta, Normalization};

    fn store() -> FeatureStore {
        // video 0: frames 0..4 (shots 0,0,1,1), video 1: frames 4..6
        let frames = vec![
            FrameMeta::new(0, 0, 0),
            FrameMeta::new(0, 1, 1),
            FrameMeta::new(0, 2, 2).with_shot(1),
            FrameMeta::new(0, 3, 3).with_shot(1),
            FrameMeta::new(1, 0, 0),
            FrameMeta::new(1, 1, 1),
        ];
        FeatureStore::builder()
            .frames(frames)
            .space(FeatureSpace::Primary, 1, vec![1.0; 6])
            .build()
            .expect("store")
    }

    fn outputs(pairs: &[(FrameId, f32)]) -> RankerOutputs {
        RankerOutputs::from([(
            RankerKind::Embedding,
            ScoreArray::from_pairs(pairs.iter().copied()),
        )])
    }

    #[test]
    fn ties_break_by_frame_id() {
        let store = store();
        let model = ScoreModel::default();
        let out = outputs(&[(5, 0.5), (1, 0.5), (3, 1.0), (0, 0.0)]);
        let result = model
            .fuse(&store, &out, &Weights::new(), &FilterSet::default(), None)
            .expect("fuse");
        assert_eq!(result.frame_ids(), vec![3, 1, 5, 0]);
    }

    #[test]
    fn filters_remove_frames() {
        let store = store();
        let model = ScoreModel::default();
        let filters = FilterSet::builder().videos([1]).build();
        let out = outputs(&[(0, 1.0), (4, 0.2), (5, 0.4)]);
        let result = model
            .fuse(&store, &out, &Weights::new(), &filters, None)
            .expect("fuse");
        assert_eq!(result.frame_ids(), vec![5, 4]);
        assert_eq!(result.candidates, 2);
    }

    #[test]
    fn all_filtered_is_no_candidates() {
        let store = store();
        let model = ScoreModel::default();
        let filters = FilterSet::builder().include([]).build();
        let result = model
            .fuse(&store, &outputs(&[(0, 1.0)]), &Weights::new(), &filters, None)
            .expect("empty result is not an error");
        assert_eq!(result.status, ResultStatus::NoCandidates);
        assert!(result.is_empty());
    }

    #[test]
    fn per_video_and_shot_caps() {
        let store = store();
        let mut fusion = FusionConfig::default();
        fusion.per_shot_limit = 1;
        fusion.normalization = Normalization::Raw;
        let model = ScoreModel::new(fusion, TemporalConfig::default(), FeedbackConfig::default());
        let out = outputs(&[(0, 0.9), (1, 0.8), (2, 0.7), (3, 0.6), (4, 0.5), (5, 0.4)]);
        let result = model
            .fuse(&store, &out, &Weights::new(), &FilterSet::default(), None)
            .expect("fuse");
        assert_eq!(result.frame_ids(), vec![0, 2, 4]);

        let mut fusion = FusionConfig::default();
        fusion.per_video_limit = 1;
        fusion.top_k = 1;
        let model = ScoreModel::new(fusion, TemporalConfig::default(), FeedbackConfig::default());
        let result = model
            .fuse(&store, &out, &Weights::new(), &FilterSet::default(), None)
            .expect("fuse");
        assert_eq!(result.frame_ids(), vec![0]);
        assert_eq!(result.candidates, 6);
    }

    #[test]
    fn temporal_stages_produce_aligned_chains() {
        let store = store();
        let model = ScoreModel::default();
        let first = outputs(&[(0, 1.0), (4, 0.0)]);
        let second = outputs(&[(2, 1.0), (5, 0.0)]);
        let result = model
            .fuse(
                &store,
                &first,
                &Weights::new(),
                &FilterSet::default(),
                Some(std::slice::from_ref(&second)),
            )
            .expect("fuse");
        assert_eq!(result.frame_ids(), vec![0, 4]);
        assert_eq!(result.items[0].aligned.as_slice(), &[2]);
        assert_eq!(result.items[0].score, 1.0);
        assert_eq!(result.metadata.stage_count, 2);
        assert_eq!(result.metadata.video_scores.len(), 2);
    }

    #[test]
    fn stageless_fusion_scores_uniformly() {
        let store = store();
        let model = ScoreModel::default();
        let fused = model
            .fuse_stages(&store, &[], &Weights::new(), &FilterSet::default())
            .expect("fuse");
        let result = model.finalize(&store, fused);
        assert_eq!(result.frame_ids(), vec![0, 1, 2, 3, 4, 5]);
        assert!(result.items.iter().all(|item| item.score == 1.0));
    }
}
