//! Score arrays produced by rankers and the fused, ranked result.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use super::common::{FrameId, RankerKind, VideoId};
use super::query::Query;
use crate::filters::FilterSet;

/// Scale applied to every ranker output before the weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `(s - min) / (max - min)`; a constant array maps to 1.0.
    MinMax,
    /// `1 - position / (n - 1)` in descending score order; tied scores share a value.
    Rank,
    /// Scores are summed as produced.
    Raw,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::MinMax
    }
}

/// Dense scores over one candidate set, frame ids strictly ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreArray {
    ids: Vec<FrameId>,
    scores: Vec<f32>,
}

impl ScoreArray {
    /// Pairs ids with scores; `ids` must be strictly ascending and as long as `scores`.
    pub(crate) fn from_parts(ids: Vec<FrameId>, scores: Vec<f32>) -> Self {
        debug_assert_eq!(ids.len(), scores.len());
        debug_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        Self { ids, scores }
    }

    /// Builds an array from unordered `(frame, score)` pairs; later duplicates win.
    #[must_use]
    pub fn from_pairs<I: IntoIterator<Item = (FrameId, f32)>>(pairs: I) -> Self {
        let sorted: BTreeMap<FrameId, f32> = pairs.into_iter().collect();
        let (ids, scores) = sorted.into_iter().unzip();
        Self { ids, scores }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> &[FrameId] {
        &self.ids
    }

    #[must_use]
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameId, f32)> + '_ {
        self.ids.iter().copied().zip(self.scores.iter().copied())
    }

    #[must_use]
    pub fn get(&self, frame_id: FrameId) -> Option<f32> {
        self.ids
            .binary_search(&frame_id)
            .ok()
            .map(|idx| self.scores[idx])
    }

    #[must_use]
    pub fn max(&self) -> Option<f32> {
        self.scores.iter().copied().reduce(f32::max)
    }

    #[must_use]
    pub fn min(&self) -> Option<f32> {
        self.scores.iter().copied().reduce(f32::min)
    }

    /// First frame whose score is NaN or infinite.
    #[must_use]
    pub fn first_non_finite(&self) -> Option<FrameId> {
        self.iter().find(|(_, s)| !s.is_finite()).map(|(id, _)| id)
    }

    /// Rescales the array onto the common fusion scale.
    #[must_use]
    pub fn normalized(&self, method: Normalization) -> Self {
        let scores = match method {
            Normalization::Raw => self.scores.clone(),
            Normalization::MinMax => {
                let (Some(min), Some(max)) = (self.min(), self.max()) else {
                    return self.clone();
                };
                let range = max - min;
                if range > 0.0 {
                    self.scores.iter().map(|s| (s - min) / range).collect()
                } else {
                    vec![1.0; self.scores.len()]
                }
            }
            Normalization::Rank => self.rank_scores(),
        };
        Self {
            ids: self.ids.clone(),
            scores,
        }
    }

    fn rank_scores(&self) -> Vec<f32> {
        let n = self.scores.len();
        let mut out = vec![1.0; n];
        if n < 2 {
            return out;
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| descending(self.scores[a], self.scores[b]).then(a.cmp(&b)));
        let denom = (n - 1) as f32;
        let mut group_pos = 0usize;
        for (pos, &idx) in order.iter().enumerate() {
            if pos > 0 && self.scores[order[pos - 1]].total_cmp(&self.scores[idx]).is_ne() {
                group_pos = pos;
            }
            out[idx] = 1.0 - group_pos as f32 / denom;
        }
        out
    }
}

/// Descending order on scores with a total order over floats.
pub(crate) fn descending(a: f32, b: f32) -> Ordering {
    b.total_cmp(&a)
}

/// Final ranking entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFrame {
    pub frame_id: FrameId,
    pub score: f32,
    /// Frames matched to the second and later temporal stages, in stage order.
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub aligned: SmallVec<[FrameId; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Ranked,
    /// Filters removed every frame; the result is empty but valid.
    NoCandidates,
}

/// One ranker output that took part in fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankerContribution {
    pub stage: usize,
    pub kind: RankerKind,
    pub weight: f32,
    pub candidates: usize,
}

/// Bookkeeping kept alongside a result so it can be explained or replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescoreMetadata {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default)]
    pub contributions: Vec<RankerContribution>,
    pub normalization: Normalization,
    #[serde(default)]
    pub filters: FilterSet,
    pub stage_count: usize,
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedback_likes: Vec<FrameId>,
    /// Best temporal alignment score per video.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub video_scores: BTreeMap<VideoId, f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub som_generation: Option<u64>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl RescoreMetadata {
    pub(crate) fn new(normalization: Normalization, filters: FilterSet, top_k: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            query: None,
            contributions: Vec::new(),
            normalization,
            filters,
            stage_count: 0,
            top_k,
            feedback_likes: Vec::new(),
            video_scores: BTreeMap::new(),
            som_generation: None,
            elapsed_ms: 0,
        }
    }
}

/// Ordered result of a rescore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescoreResult {
    pub status: ResultStatus,
    pub items: Vec<RankedFrame>,
    /// Candidate frames left after filtering, before top-K truncation.
    pub candidates: usize,
    pub metadata: RescoreMetadata,
}

impl RescoreResult {
    pub(crate) fn no_candidates(metadata: RescoreMetadata) -> Self {
        Self {
            status: ResultStatus::NoCandidates,
            items: Vec::new(),
            candidates: 0,
            metadata,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn frame_ids(&self) -> Vec<FrameId> {
        self.items.iter().map(|item| item.frame_id).collect()
    }

    /// Zero-based position of a frame in the ranking.
    #[must_use]
    pub fn frame_rank(&self, frame_id: FrameId) -> Option<usize> {
        self.items.iter().position(|item| item.frame_id == frame_id)
    }

    #[must_use]
    pub fn score_of(&self, frame_id: FrameId) -> Option<f32> {
        self.items
            .iter()
            .find(|item| item.frame_id == frame_id)
            .map(|item| item.score)
    }

    /// Scores of the ranked frames as a lookup array.
    #[must_use]
    pub fn to_score_array(&self) -> ScoreArray {
        ScoreArray::from_pairs(self.items.iter().map(|item| (item.frame_id, item.score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_maps_onto_unit_interval() {
        let arr = ScoreArray::from_pairs([(0, 2.0), (1, -2.0), (2, 0.0)]);
        let norm = arr.normalized(Normalization::MinMax);
        assert_eq!(norm.scores(), &[1.0, 0.0, 0.5]);
    }

    #[test]
    fn constant_array_normalizes_to_one() {
        let arr = ScoreArray::from_pairs([(4, 0.3), (9, 0.3)]);
        let norm = arr.normalized(Normalization::MinMax);
        assert_eq!(norm.scores(), &[1.0, 1.0]);
    }

    #[test]
    fn rank_normalization_shares_tied_positions() {
        let arr = ScoreArray::from_pairs([(0, 0.9), (1, 0.5), (2, 0.9), (3, 0.1), (4, 0.0)]);
        let norm = arr.normalized(Normalization::Rank);
        assert_eq!(norm.scores(), &[1.0, 0.5, 1.0, 0.25, 0.0]);
    }

    #[test]
    fn lookup_uses_frame_ids() {
        let arr = ScoreArray::from_pairs([(10, 0.1), (3, 0.7)]);
        assert_eq!(arr.ids(), &[3, 10]);
        assert_eq!(arr.get(10), Some(0.1));
        assert_eq!(arr.get(4), None);
    }
}
