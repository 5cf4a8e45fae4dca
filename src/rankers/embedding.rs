//! Linear-scan ranker over one feature space.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use super::Ranker;
use super::projection::Projection;
use crate::config::{ProjectionTiming, SpaceConfig};
use crate::constants::PARALLEL_SCAN_MIN_ROWS;
use crate::error::{FrameHunterError, Result};
use crate::filters::CandidateMask;
use crate::simd::{dot, squared_l2};
use crate::store::{FeatureMatrix, FeatureStore};
use crate::types::{FeatureSpace, FrameId, RankerKind, ScoreArray, Similarity};

/// Scores every candidate frame against a query vector of one feature space.
#[derive(Debug, Clone)]
pub struct EmbeddingRanker {
    store: Arc<FeatureStore>,
    space: FeatureSpace,
    kind: RankerKind,
    similarity: Similarity,
    projection: Option<Arc<Projection>>,
    /// Stored rows already passed through `projection`.
    projected: Option<Arc<FeatureMatrix>>,
    query_dim: usize,
}

impl EmbeddingRanker {
    pub fn new(store: Arc<FeatureStore>, config: &SpaceConfig) -> Result<Self> {
        let matrix = store.matrix(config.space)?;
        if matrix.dim() != config.dim {
            return Err(FrameHunterError::InvalidConfig {
                reason: format!(
                    "{} configured with {} dimensions, store holds {}",
                    config.space,
                    config.dim,
                    matrix.dim()
                ),
            });
        }
        let projection = match &config.projection {
            Some(p) => {
                p.validate(config.dim)
                    .map_err(|reason| FrameHunterError::InvalidConfig { reason })?;
                Some(Arc::new(p.clone()))
            }
            None => None,
        };
        let projected = match (&projection, config.projection_timing) {
            (Some(p), ProjectionTiming::AtLoad) => Some(Arc::new(project_matrix(matrix, p))),
            _ => None,
        };
        Ok(Self {
            space: config.space,
            kind: RankerKind::Embedding,
            similarity: config.similarity,
            query_dim: config.query_dim(),
            projection,
            projected,
            store,
        })
    }

    /// Reports outputs under a different ranker kind.
    #[must_use]
    pub fn with_kind(mut self, kind: RankerKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn space(&self) -> FeatureSpace {
        self.space
    }

    #[must_use]
    pub fn query_dim(&self) -> usize {
        self.query_dim
    }

    #[must_use]
    pub fn store(&self) -> &Arc<FeatureStore> {
        &self.store
    }

    pub fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.query_dim {
            return Err(FrameHunterError::DimensionMismatch {
                space: self.space,
                expected: self.query_dim,
                actual: query.len(),
            });
        }
        Ok(())
    }

    /// A frame's stored vector as seen by this ranker, after any projection.
    pub fn stored_vector(&self, frame_id: FrameId) -> Result<Vec<f32>> {
        self.stored_row(frame_id).map(Cow::into_owned)
    }

    /// Like [`Self::stored_vector`], borrowing the row when no projection runs per query.
    pub(crate) fn stored_row(&self, frame_id: FrameId) -> Result<Cow<'_, [f32]>> {
        let raw = self.store.vector(self.space, frame_id)?;
        Ok(match (&self.projected, &self.projection) {
            (Some(projected), _) => Cow::Borrowed(projected.row(frame_id as usize)),
            (None, Some(projection)) => Cow::Owned(projection.apply(raw)),
            (None, None) => Cow::Borrowed(raw),
        })
    }

    fn check_mask(&self, mask: Option<&CandidateMask>) -> Result<()> {
        match mask {
            Some(mask) if mask.len() != self.store.len() => Err(FrameHunterError::InvalidQuery {
                reason: format!(
                    "candidate mask covers {} frames, store holds {}",
                    mask.len(),
                    self.store.len()
                ),
            }),
            _ => Ok(()),
        }
    }
}

impl Ranker for EmbeddingRanker {
    type Query = [f32];

    fn kind(&self) -> RankerKind {
        self.kind
    }

    fn rank(&self, query: &[f32], mask: Option<&CandidateMask>) -> Result<ScoreArray> {
        self.check_query(query)?;
        self.check_mask(mask)?;
        let started = Instant::now();
        let total = self.store.len();
        let scores = match (&self.projected, &self.projection) {
            (Some(projected), _) => scan_rows(projected, query, self.similarity, mask, total),
            (None, Some(projection)) => {
                let matrix = self.store.matrix(self.space)?;
                let similarity = self.similarity;
                scan_with(mask, total, |idx| {
                    score(similarity, query, &projection.apply(matrix.row(idx)))
                })
            }
            (None, None) => {
                let matrix = self.store.matrix(self.space)?;
                scan_rows(matrix, query, self.similarity, mask, total)
            }
        };
        if let Some(frame_id) = scores.first_non_finite() {
            return Err(FrameHunterError::NonFiniteScore {
                frame_id,
                ranker: self.kind,
            });
        }
        tracing::debug!(
            target = "framehunter::rank",
            ranker = %self.kind,
            space = %self.space,
            candidates = scores.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embedding scan finished"
        );
        Ok(scores)
    }
}

#[inline]
fn score(similarity: Similarity, query: &[f32], row: &[f32]) -> f32 {
    match similarity {
        Similarity::Dot => dot(query, row),
        Similarity::NegSquaredEuclidean => -squared_l2(query, row),
    }
}

/// Scores the candidate rows of `matrix` against `query`.
pub(crate) fn scan_rows(
    matrix: &FeatureMatrix,
    query: &[f32],
    similarity: Similarity,
    mask: Option<&CandidateMask>,
    total: usize,
) -> ScoreArray {
    scan_with(mask, total, |idx| score(similarity, query, matrix.row(idx)))
}

/// Evaluates `score_of` for every candidate row, in parallel above a size threshold.
fn scan_with<F>(mask: Option<&CandidateMask>, total: usize, score_of: F) -> ScoreArray
where
    F: Fn(usize) -> f32 + Sync,
{
    let ids: Vec<FrameId> = match mask {
        Some(mask) => mask.ids().collect(),
        None => (0..total).map(|idx| idx as FrameId).collect(),
    };
    let scores: Vec<f32> = if ids.len() >= PARALLEL_SCAN_MIN_ROWS {
        ids.par_iter().map(|id| score_of(*id as usize)).collect()
    } else {
        ids.iter().map(|id| score_of(*id as usize)).collect()
    };
    ScoreArray::from_parts(ids, scores)
}

fn project_matrix(matrix: &FeatureMatrix, projection: &Projection) -> FeatureMatrix {
    let dim = projection.output_dim_for(matrix.dim());
    let data: Vec<f32> = (0..matrix.len())
        .into_par_iter()
        .flat_map_iter(|idx| projection.apply(matrix.row(idx)))
        .collect();
    FeatureMatrix::new(dim, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameMeta;

    fn store() -> Arc<FeatureStore> {
        Arc::new(
            FeatureStore::builder()
                .frames((0..3).map(|i| FrameMeta::new(0, i, i64::from(i))).collect())
                .space_rows(
                    FeatureSpace::Primary,
                    &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
                )
                .build()
                .expect("store"),
        )
    }

    fn ranker(store: Arc<FeatureStore>) -> EmbeddingRanker {
        EmbeddingRanker::new(store, &SpaceConfig::new(FeatureSpace::Primary, 2)).expect("ranker")
    }

    #[test]
    fn dot_scores_every_frame() {
        let scores = ranker(store()).rank(&[1.0, 0.0], None).expect("rank");
        assert_eq!(scores.ids(), &[0, 1, 2]);
        assert_eq!(scores.scores(), &[1.0, 0.0, 0.7]);
    }

    #[test]
    fn mask_limits_output() {
        let store = store();
        let mask = CandidateMask::from_ids(store.len(), [0, 2]);
        let scores = ranker(store).rank(&[0.0, 1.0], Some(&mask)).expect("rank");
        assert_eq!(scores.len(), mask.count());
        assert_eq!(scores.ids(), &[0, 2]);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let err = ranker(store()).rank(&[1.0, 0.0, 0.0], None).expect_err("dims");
        assert!(matches!(
            err,
            FrameHunterError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn mask_of_other_store_is_rejected() {
        let mask = CandidateMask::all(10);
        let err = ranker(store()).rank(&[1.0, 0.0], Some(&mask)).expect_err("mask");
        assert!(matches!(err, FrameHunterError::InvalidQuery { .. }));
    }

    #[test]
    fn negative_distance_prefers_nearest() {
        let mut config = SpaceConfig::new(FeatureSpace::Primary, 2);
        config.similarity = Similarity::NegSquaredEuclidean;
        let ranker = EmbeddingRanker::new(store(), &config).expect("ranker");
        let scores = ranker.rank(&[0.7, 0.7], None).expect("rank");
        assert_eq!(scores.get(2), Some(0.0));
        assert!(scores.get(0).expect("frame 0") < 0.0);
    }

    #[test]
    fn projection_timing_does_not_change_scores() {
        let projection = Projection {
            bias: Some(vec![0.1, -0.2]),
            mean: Some(vec![0.05, 0.05]),
            components: Some(vec![vec![0.6, 0.8], vec![-0.8, 0.6], vec![1.0, 1.0]]),
        };
        let mut at_load = SpaceConfig::new(FeatureSpace::Primary, 2);
        at_load.projection = Some(projection);
        let mut per_query = at_load.clone();
        per_query.projection_timing = ProjectionTiming::PerQuery;

        let store = store();
        let a = EmbeddingRanker::new(store.clone(), &at_load).expect("at load");
        let b = EmbeddingRanker::new(store, &per_query).expect("per query");
        assert_eq!(a.query_dim(), 3);
        let query = [0.2, 0.3, 0.9];
        let sa = a.rank(&query, None).expect("rank");
        let sb = b.rank(&query, None).expect("rank");
        for (x, y) in sa.scores().iter().zip(sb.scores()) {
            assert!((x - y).abs() < 1e-6);
        }
        assert_eq!(a.stored_vector(1).expect("row"), b.stored_vector(1).expect("row"));
    }
}
