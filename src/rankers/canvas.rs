//! Canvas ranker: positioned bitmap and text sub-queries combined into one score.
//!
//! Each sub-query is ranked on its own and the per-frame sub-scores are blended with
//! weights from [`canvas_weights`]. The weight of a rectangle is its area, reduced by
//! `overlap_penalty` times the share of that area covered by the other rectangles; weights
//! are then normalized to sum to one. Two disjoint rectangles covering 75% and 25% of the
//! canvas therefore weigh exactly 3:1.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use super::Ranker;
use super::embedding::EmbeddingRanker;
use super::keyword::KeywordRanker;
use super::keyword_clip::KeywordClipRanker;
use crate::config::CanvasConfig;
use crate::error::{FrameHunterError, Result};
use crate::extractor::{Extractor, ExtractorInput, embed_checked};
use crate::filters::CandidateMask;
use crate::types::{
    CanvasPayload, CanvasQuery, CanvasSubquery, RankerKind, RelativeRect, ScoreArray,
};

/// Normalized blend weights for a list of canvas rectangles.
#[must_use]
pub fn canvas_weights(rects: &[RelativeRect], overlap_penalty: f32) -> Vec<f32> {
    if rects.is_empty() {
        return Vec::new();
    }
    let raw: Vec<f32> = rects
        .iter()
        .enumerate()
        .map(|(i, rect)| {
            let area = rect.area();
            if area <= 0.0 {
                return 0.0;
            }
            let covered: f32 = rects
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, other)| rect.intersection_area(other))
                .sum();
            let covered_fraction = (covered / area).min(1.0);
            area * (1.0 - overlap_penalty * covered_fraction)
        })
        .collect();
    let total: f32 = raw.iter().sum();
    if total > 0.0 {
        raw.iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / rects.len() as f32; rects.len()]
    }
}

#[derive(Clone)]
pub struct CanvasQueryRanker {
    extractor: Arc<dyn Extractor>,
    config: CanvasConfig,
    image: Option<EmbeddingRanker>,
    keyword: Option<KeywordRanker>,
    clip: Option<KeywordClipRanker>,
    regions: Vec<(RelativeRect, EmbeddingRanker)>,
}

impl std::fmt::Debug for CanvasQueryRanker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasQueryRanker")
            .field("config", &self.config)
            .field("image", &self.image.is_some())
            .field("keyword", &self.keyword.is_some())
            .field("clip", &self.clip.is_some())
            .field("regions", &self.regions.len())
            .finish_non_exhaustive()
    }
}

impl CanvasQueryRanker {
    #[must_use]
    pub fn new(extractor: Arc<dyn Extractor>, config: CanvasConfig) -> Self {
        Self {
            extractor,
            config,
            image: None,
            keyword: None,
            clip: None,
            regions: Vec::new(),
        }
    }

    /// Ranker for bitmap sub-queries; bitmaps are embedded into its space by the extractor.
    #[must_use]
    pub fn with_image_ranker(mut self, ranker: EmbeddingRanker) -> Self {
        self.image = Some(ranker.with_kind(RankerKind::Canvas));
        self
    }

    #[must_use]
    pub fn with_keyword_ranker(mut self, ranker: KeywordRanker) -> Self {
        self.keyword = Some(ranker);
        self
    }

    #[must_use]
    pub fn with_clip_ranker(mut self, ranker: KeywordClipRanker) -> Self {
        self.clip = Some(ranker);
        self
    }

    /// Region-of-interest features used for keyword text placed near `rect`.
    #[must_use]
    pub fn with_region(mut self, rect: RelativeRect, ranker: EmbeddingRanker) -> Self {
        self.regions.push((rect, ranker.with_kind(RankerKind::Canvas)));
        self
    }

    fn best_region(&self, rect: &RelativeRect, dim: usize) -> Option<&EmbeddingRanker> {
        self.regions
            .iter()
            .filter(|(_, ranker)| ranker.query_dim() == dim)
            .map(|(region, ranker)| (region.iou(rect), ranker))
            .filter(|(iou, _)| *iou > 0.0)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, ranker)| ranker)
    }

    fn rank_subquery(
        &self,
        sub: &CanvasSubquery,
        mask: Option<&CandidateMask>,
    ) -> Result<ScoreArray> {
        match &sub.payload {
            CanvasPayload::Bitmap(bitmap) => {
                let ranker = self.image.as_ref().ok_or(FrameHunterError::RankerUnavailable {
                    kind: RankerKind::Canvas,
                })?;
                let query = embed_checked(
                    self.extractor.as_ref(),
                    ExtractorInput::Image(bitmap),
                    ranker.space(),
                    ranker.query_dim(),
                )?;
                ranker.rank(&query, mask)
            }
            CanvasPayload::Text(text) => {
                if let Some(keyword) = &self.keyword {
                    let query = keyword.model().embed_text(text)?;
                    let ranker = self
                        .best_region(&sub.rect, query.len())
                        .unwrap_or_else(|| keyword.embedding_ranker());
                    return ranker.rank(&query, mask);
                }
                match &self.clip {
                    Some(clip) => clip.rank(text, mask),
                    None => Err(FrameHunterError::RankerUnavailable {
                        kind: RankerKind::Keyword,
                    }),
                }
            }
        }
    }
}

impl Ranker for CanvasQueryRanker {
    type Query = CanvasQuery;

    fn kind(&self) -> RankerKind {
        RankerKind::Canvas
    }

    fn rank(&self, query: &CanvasQuery, mask: Option<&CandidateMask>) -> Result<ScoreArray> {
        query.validate()?;
        let started = Instant::now();
        let rects: Vec<RelativeRect> = query.subqueries.iter().map(|s| s.rect).collect();
        let weights = canvas_weights(&rects, self.config.overlap_penalty);

        let parallel = query.subqueries.len() >= self.config.parallel_threshold;
        let sub_scores: Vec<ScoreArray> = if parallel {
            query
                .subqueries
                .par_iter()
                .map(|sub| self.rank_subquery(sub, mask))
                .collect::<Result<_>>()?
        } else {
            query
                .subqueries
                .iter()
                .map(|sub| self.rank_subquery(sub, mask))
                .collect::<Result<_>>()?
        };

        let ids = sub_scores[0].ids().to_vec();
        let mut combined = vec![0.0f32; ids.len()];
        for (sub, weight) in sub_scores.iter().zip(&weights) {
            if sub.ids() != ids.as_slice() {
                return Err(FrameHunterError::InvalidQuery {
                    reason: "canvas sub-queries ranked different candidate sets".to_string(),
                });
            }
            for (acc, s) in combined.iter_mut().zip(sub.scores()) {
                *acc += weight * s;
            }
        }
        let scores = ScoreArray::from_parts(ids, combined);
        if let Some(frame_id) = scores.first_non_finite() {
            return Err(FrameHunterError::NonFiniteScore {
                frame_id,
                ranker: RankerKind::Canvas,
            });
        }
        tracing::debug!(
            target = "framehunter::rank",
            subqueries = query.subqueries.len(),
            parallel,
            candidates = scores.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "canvas query ranked"
        );
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpaceConfig;
    use crate::extractor::PrecomputedExtractor;
    use crate::rankers::keyword::{Keyword, KeywordModel};
    use crate::rankers::projection::Projection;
    use crate::store::FeatureStore;
    use crate::types::{CanvasBitmap, FeatureSpace, FrameMeta};

    #[test]
    fn disjoint_rects_weigh_by_area() {
        let weights = canvas_weights(
            &[
                RelativeRect::new(0.0, 0.0, 0.75, 1.0),
                RelativeRect::new(0.75, 0.0, 1.0, 1.0),
            ],
            0.5,
        );
        assert!((weights[0] - 0.75).abs() < 1e-6);
        assert!((weights[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn covered_rect_loses_weight() {
        let big = RelativeRect::new(0.0, 0.0, 0.5, 0.5);
        let inner = RelativeRect::new(0.0, 0.0, 0.25, 0.25);
        let weights = canvas_weights(&[big, inner], 0.5);
        // big: 0.25 * (1 - 0.5 * 0.25) = 0.21875, inner: 0.0625 * 0.5 = 0.03125
        assert!((weights[0] - 0.875).abs() < 1e-6);
        assert!((weights[1] - 0.125).abs() < 1e-6);
    }

    #[test]
    fn degenerate_rects_fall_back_to_uniform() {
        let line = RelativeRect::new(0.2, 0.2, 0.2, 0.8);
        assert_eq!(canvas_weights(&[line, line], 0.5), vec![0.5, 0.5]);
    }

    fn bitmap(seed: u8) -> CanvasBitmap {
        CanvasBitmap {
            width: 1,
            height: 1,
            channels: 3,
            pixels: vec![seed, seed, seed],
        }
    }

    fn store() -> Arc<FeatureStore> {
        Arc::new(
            FeatureStore::builder()
                .frames((0..3).map(|i| FrameMeta::new(0, i, i64::from(i))).collect())
                .space_rows(
                    FeatureSpace::Primary,
                    &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]],
                )
                .space_rows(
                    FeatureSpace::Secondary,
                    &[vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]],
                )
                .space_rows(
                    FeatureSpace::Region(0),
                    &[vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]],
                )
                .build()
                .expect("store"),
        )
    }

    fn image_ranker(store: &Arc<FeatureStore>) -> EmbeddingRanker {
        EmbeddingRanker::new(store.clone(), &SpaceConfig::new(FeatureSpace::Primary, 2))
            .expect("image ranker")
    }

    #[test]
    fn blends_bitmap_subscores_by_area() {
        let store = store();
        let extractor = PrecomputedExtractor::new()
            .with_image(FeatureSpace::Primary, bitmap(1), vec![1.0, 0.0])
            .with_image(FeatureSpace::Primary, bitmap(2), vec![0.0, 1.0]);
        let ranker = CanvasQueryRanker::new(Arc::new(extractor), CanvasConfig::default())
            .with_image_ranker(image_ranker(&store));
        let query = CanvasQuery::new(vec![
            CanvasSubquery::bitmap(RelativeRect::new(0.0, 0.0, 0.75, 1.0), bitmap(1)),
            CanvasSubquery::bitmap(RelativeRect::new(0.75, 0.0, 1.0, 1.0), bitmap(2)),
        ]);
        let scores = ranker.rank(&query, None).expect("rank");
        // frame 0: s1 = 1, s2 = 0; frame 1: s1 = 0, s2 = 1; frame 2: s1 = 0.6, s2 = 0.8
        assert!((scores.get(0).expect("0") - 0.75).abs() < 1e-6);
        assert!((scores.get(1).expect("1") - 0.25).abs() < 1e-6);
        assert!((scores.get(2).expect("2") - 0.65).abs() < 1e-6);
    }

    #[test]
    fn keyword_text_uses_best_region() {
        let store = store();
        let model = KeywordModel::new(
            vec![Keyword {
                id: 1,
                synonyms: vec!["sky".to_string()],
                description: String::new(),
            }],
            2,
            vec![1.0, 0.0],
            vec![0.0, 0.0],
            Projection::default(),
        )
        .expect("model");
        let secondary =
            EmbeddingRanker::new(store.clone(), &SpaceConfig::new(FeatureSpace::Secondary, 2))
                .expect("secondary");
        let region =
            EmbeddingRanker::new(store.clone(), &SpaceConfig::new(FeatureSpace::Region(0), 2))
                .expect("region");
        let keyword = KeywordRanker::new(secondary, Arc::new(model)).expect("keyword");
        let ranker = CanvasQueryRanker::new(Arc::new(PrecomputedExtractor::new()), CanvasConfig::default())
            .with_keyword_ranker(keyword)
            .with_region(RelativeRect::new(0.0, 0.0, 1.0, 0.5), region);

        let top = CanvasQuery::new(vec![CanvasSubquery::text(
            RelativeRect::new(0.0, 0.0, 1.0, 0.4),
            "sky",
        )]);
        let scores = ranker.rank(&top, None).expect("rank");
        assert!(scores.get(0).expect("0") > 0.99 && scores.get(2).expect("2") < 0.01);

        let bottom = CanvasQuery::new(vec![CanvasSubquery::text(
            RelativeRect::new(0.0, 0.6, 1.0, 1.0),
            "sky",
        )]);
        let scores = ranker.rank(&bottom, None).expect("rank");
        assert!(scores.get(1).expect("1") > 0.99 && scores.get(0).expect("0") < 0.01);
    }

    #[test]
    fn bitmap_without_image_ranker_is_unavailable() {
        let ranker = CanvasQueryRanker::new(Arc::new(PrecomputedExtractor::new()), CanvasConfig::default());
        let query = CanvasQuery::new(vec![CanvasSubquery::bitmap(RelativeRect::full(), bitmap(1))]);
        assert!(matches!(
            ranker.rank(&query, None),
            Err(FrameHunterError::RankerUnavailable { .. })
        ));
    }

    #[test]
    fn empty_canvas_is_rejected() {
        let ranker = CanvasQueryRanker::new(Arc::new(PrecomputedExtractor::new()), CanvasConfig::default());
        assert!(matches!(
            ranker.rank(&CanvasQuery::default(), None),
            Err(FrameHunterError::EmptyCanvas)
        ));
    }
}
