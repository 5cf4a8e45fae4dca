//! Boundary to the service that embeds live queries.
//!
//! The core never talks to the network itself: callers hand it an [`Extractor`]
//! and every failure surfaces unchanged as [`FrameHunterError::EmbeddingUnavailable`].

use std::collections::HashMap;

use thiserror::Error;

use crate::error::{FrameHunterError, Result};
use crate::types::{CanvasBitmap, FeatureSpace};

/// Raw query content to embed.
#[derive(Debug, Clone, Copy)]
pub enum ExtractorInput<'a> {
    Text(&'a str),
    Image(&'a CanvasBitmap),
}

impl ExtractorInput<'_> {
    fn describe(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
        }
    }
}

/// Failure reported by an extractor implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExtractorError {
    message: String,
}

impl ExtractorError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Turns text or images into vectors of a feature space.
pub trait Extractor: Send + Sync {
    fn embed(
        &self,
        input: ExtractorInput<'_>,
        space: FeatureSpace,
    ) -> std::result::Result<Vec<f32>, ExtractorError>;
}

/// Embeds through `extractor` and checks the returned dimensionality.
pub(crate) fn embed_checked(
    extractor: &dyn Extractor,
    input: ExtractorInput<'_>,
    space: FeatureSpace,
    expected_dim: usize,
) -> Result<Vec<f32>> {
    let vector = extractor.embed(input, space).map_err(|err| {
        tracing::warn!(
            target = "framehunter::extractor",
            %space,
            input = input.describe(),
            error = %err,
            "embedding request failed"
        );
        FrameHunterError::EmbeddingUnavailable {
            space,
            reason: err.to_string(),
        }
    })?;
    if vector.len() != expected_dim {
        return Err(FrameHunterError::DimensionMismatch {
            space,
            expected: expected_dim,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(FrameHunterError::EmbeddingUnavailable {
            space,
            reason: "extractor returned non-finite values".to_string(),
        });
    }
    Ok(vector)
}

/// Extractor for deployments without an embedding service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtractor;

impl Extractor for NoExtractor {
    fn embed(
        &self,
        input: ExtractorInput<'_>,
        space: FeatureSpace,
    ) -> std::result::Result<Vec<f32>, ExtractorError> {
        Err(ExtractorError::new(format!(
            "no extractor configured for {} queries in {space}",
            input.describe()
        )))
    }
}

/// Serves embeddings computed ahead of time, keyed by the exact query content.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedExtractor {
    texts: HashMap<(FeatureSpace, String), Vec<f32>>,
    images: Vec<(FeatureSpace, CanvasBitmap, Vec<f32>)>,
}

impl PrecomputedExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_text(mut self, space: FeatureSpace, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.texts.insert((space, text.into()), vector);
        self
    }

    #[must_use]
    pub fn with_image(mut self, space: FeatureSpace, bitmap: CanvasBitmap, vector: Vec<f32>) -> Self {
        self.images.push((space, bitmap, vector));
        self
    }
}

impl Extractor for PrecomputedExtractor {
    fn embed(
        &self,
        input: ExtractorInput<'_>,
        space: FeatureSpace,
    ) -> std::result::Result<Vec<f32>, ExtractorError> {
        let hit = match input {
            ExtractorInput::Text(text) => self.texts.get(&(space, text.to_string())).cloned(),
            ExtractorInput::Image(bitmap) => self
                .images
                .iter()
                .find(|(s, b, _)| *s == space && b == bitmap)
                .map(|(_, _, v)| v.clone()),
        };
        hit.ok_or_else(|| {
            ExtractorError::new(format!("no precomputed {} embedding in {space}", input.describe()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_become_embedding_unavailable() {
        let err = embed_checked(&NoExtractor, ExtractorInput::Text("cat"), FeatureSpace::Primary, 2)
            .expect_err("no extractor");
        assert!(matches!(
            err,
            FrameHunterError::EmbeddingUnavailable {
                space: FeatureSpace::Primary,
                ..
            }
        ));
    }

    #[test]
    fn wrong_size_is_dimension_mismatch() {
        let extractor =
            PrecomputedExtractor::new().with_text(FeatureSpace::Primary, "cat", vec![1.0; 3]);
        let err = embed_checked(&extractor, ExtractorInput::Text("cat"), FeatureSpace::Primary, 2)
            .expect_err("dims");
        assert!(matches!(err, FrameHunterError::DimensionMismatch { .. }));
    }

    #[test]
    fn precomputed_lookup_is_per_space() {
        let extractor =
            PrecomputedExtractor::new().with_text(FeatureSpace::Primary, "cat", vec![1.0, 0.0]);
        assert!(extractor.embed(ExtractorInput::Text("cat"), FeatureSpace::Primary).is_ok());
        assert!(extractor.embed(ExtractorInput::Text("cat"), FeatureSpace::Secondary).is_err());
    }
}
