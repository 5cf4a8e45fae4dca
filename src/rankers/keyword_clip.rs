use std::sync::Arc;

use super::Ranker;
use super::embedding::EmbeddingRanker;
use crate::error::Result;
use crate::extractor::{Extractor, ExtractorInput, embed_checked};
use crate::filters::CandidateMask;
use crate::types::{RankerKind, ScoreArray};

/// Free text embedded by the extractor and scored in the joint text/image space.
#[derive(Clone)]
pub struct KeywordClipRanker {
    inner: EmbeddingRanker,
    extractor: Arc<dyn Extractor>,
}

impl std::fmt::Debug for KeywordClipRanker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordClipRanker")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl KeywordClipRanker {
    #[must_use]
    pub fn new(inner: EmbeddingRanker, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            inner: inner.with_kind(RankerKind::KeywordClip),
            extractor,
        }
    }

    /// Query vector the extractor produces for `text`.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        embed_checked(
            self.extractor.as_ref(),
            ExtractorInput::Text(text),
            self.inner.space(),
            self.inner.query_dim(),
        )
    }

    #[must_use]
    pub fn embedding_ranker(&self) -> &EmbeddingRanker {
        &self.inner
    }
}

impl Ranker for KeywordClipRanker {
    type Query = str;

    fn kind(&self) -> RankerKind {
        RankerKind::KeywordClip
    }

    fn rank(&self, text: &str, mask: Option<&CandidateMask>) -> Result<ScoreArray> {
        let query = self.embed_text(text)?;
        self.inner.rank(&query, mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpaceConfig;
    use crate::error::FrameHunterError;
    use crate::extractor::{NoExtractor, PrecomputedExtractor};
    use crate::store::FeatureStore;
    use crate::types::{FeatureSpace, FrameMeta};

    fn inner() -> EmbeddingRanker {
        let store = FeatureStore::builder()
            .frames(vec![FrameMeta::new(0, 0, 0), FrameMeta::new(0, 1, 1)])
            .space_rows(FeatureSpace::Primary, &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .build()
            .expect("store");
        EmbeddingRanker::new(Arc::new(store), &SpaceConfig::new(FeatureSpace::Primary, 2))
            .expect("ranker")
    }

    #[test]
    fn ranks_with_extracted_text() {
        let extractor =
            PrecomputedExtractor::new().with_text(FeatureSpace::Primary, "a dog", vec![0.0, 1.0]);
        let ranker = KeywordClipRanker::new(inner(), Arc::new(extractor));
        let scores = ranker.rank("a dog", None).expect("rank");
        assert_eq!(scores.scores(), &[0.0, 1.0]);
    }

    #[test]
    fn extractor_failure_is_propagated() {
        let ranker = KeywordClipRanker::new(inner(), Arc::new(NoExtractor));
        let err = ranker.rank("a dog", None).expect_err("unavailable");
        assert!(matches!(err, FrameHunterError::EmbeddingUnavailable { .. }));
    }
}
