use super::Ranker;
use super::embedding::EmbeddingRanker;
use crate::constants::TOP_KNN_LIMIT;
use crate::error::Result;
use crate::filters::CandidateMask;
use crate::types::{FrameId, RankerKind, ScoreArray, score::descending};

/// "More like this": ranks against the stored vector of an anchor frame.
#[derive(Debug, Clone)]
pub struct RelocationRanker {
    inner: EmbeddingRanker,
}

impl RelocationRanker {
    #[must_use]
    pub fn new(inner: EmbeddingRanker) -> Self {
        Self {
            inner: inner.with_kind(RankerKind::Relocation),
        }
    }

    /// The underlying space; feedback measures distances between these rows.
    #[must_use]
    pub fn vectors(&self) -> &EmbeddingRanker {
        &self.inner
    }

    /// The `k` frames closest to `anchor`, excluding the anchor itself.
    ///
    /// `k` is capped at [`TOP_KNN_LIMIT`]; ties are broken by ascending frame id.
    pub fn nearest(&self, anchor: FrameId, k: usize) -> Result<Vec<(FrameId, f32)>> {
        let scores = self.rank(&anchor, None)?;
        let mut hits: Vec<(FrameId, f32)> = scores.iter().filter(|(id, _)| *id != anchor).collect();
        hits.sort_by(|a, b| descending(a.1, b.1).then(a.0.cmp(&b.0)));
        hits.truncate(k.min(TOP_KNN_LIMIT));
        Ok(hits)
    }
}

impl Ranker for RelocationRanker {
    type Query = FrameId;

    fn kind(&self) -> RankerKind {
        RankerKind::Relocation
    }

    fn rank(&self, anchor: &FrameId, mask: Option<&CandidateMask>) -> Result<ScoreArray> {
        let query = self.inner.stored_vector(*anchor)?;
        self.inner.rank(&query, mask)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SpaceConfig;
    use crate::error::FrameHunterError;
    use crate::store::FeatureStore;
    use crate::types::{FeatureSpace, FrameMeta};

    fn ranker() -> RelocationRanker {
        let rows = [
            vec![1.0, 0.0, 0.0],
            vec![0.0, 0.6, 0.8],
            vec![0.6, 0.8, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let store = FeatureStore::builder()
            .frames((0..4).map(|i| FrameMeta::new(1, i, i64::from(i))).collect())
            .space_rows(FeatureSpace::Primary, &rows)
            .build()
            .expect("store");
        let inner = EmbeddingRanker::new(Arc::new(store), &SpaceConfig::new(FeatureSpace::Primary, 3))
            .expect("ranker");
        RelocationRanker::new(inner)
    }

    #[test]
    fn anchor_scores_highest() {
        let ranker = ranker();
        for anchor in 0..4 {
            let scores = ranker.rank(&anchor, None).expect("rank");
            let own = scores.get(anchor).expect("anchor scored");
            assert!(scores.scores().iter().all(|s| *s <= own + 1e-6));
        }
    }

    #[test]
    fn unknown_anchor_is_reported() {
        let err = ranker().rank(&42, None).expect_err("unknown");
        assert!(matches!(err, FrameHunterError::UnknownFrame { frame_id: 42 }));
    }
}
