//! Composite user query and its fluent builder.

use serde::{Deserialize, Serialize};

use super::canvas::CanvasQuery;
use super::common::FrameId;
use crate::error::{FrameHunterError, Result};
use crate::filters::{Filter, FilterSet};

/// Which text ranker(s) score the free-text fragment of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextModel {
    /// Extractor text embedding in the primary space.
    Clip,
    /// Keyword vocabulary embedding in the secondary space.
    Keyword,
    /// Both, fused with the configured weights.
    Both,
}

impl Default for TextModel {
    fn default() -> Self {
        Self::Clip
    }
}

/// One temporal stage: every present fragment contributes a ranker output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasQuery>,
    /// Anchor frame for a relocation ("more like this") search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<FrameId>,
    /// Embedding already computed for the primary space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl StageQuery {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn embedding(embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn anchor(frame_id: FrameId) -> Self {
        Self {
            anchor: Some(frame_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn canvas(canvas: CanvasQuery) -> Self {
        Self {
            canvas: Some(canvas),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(|t| t.trim().is_empty())
            && self.canvas.is_none()
            && self.anchor.is_none()
            && self.embedding.is_none()
    }
}

/// A rescore request. Stages are listed in required temporal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub stages: Vec<StageQuery>,
    #[serde(default)]
    pub filters: FilterSet,
    #[serde(default)]
    pub text_model: TextModel,
    /// Frames the user marked as relevant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub likes: Vec<FrameId>,
    /// Frames displayed to the user since the previous rescore.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shown: Vec<FrameId>,
}

impl Query {
    #[must_use]
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// Rejects malformed compositions before any ranker runs.
    pub fn validate(&self) -> Result<()> {
        for (idx, stage) in self.stages.iter().enumerate() {
            if stage.is_empty() {
                return Err(FrameHunterError::InvalidQuery {
                    reason: format!("temporal stage {idx} has no query fragment"),
                });
            }
            if let Some(canvas) = &stage.canvas {
                canvas.validate()?;
            }
            let non_finite = stage
                .embedding
                .as_ref()
                .is_some_and(|e| e.iter().any(|v| !v.is_finite()));
            if non_finite {
                return Err(FrameHunterError::InvalidQuery {
                    reason: format!("embedding of stage {idx} contains non-finite values"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    inner: Query,
}

impl QueryBuilder {
    #[must_use]
    pub fn stage(mut self, stage: StageQuery) -> Self {
        self.inner.stages.push(stage);
        self
    }

    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.stage(StageQuery::text(text))
    }

    #[must_use]
    pub fn embedding(self, embedding: Vec<f32>) -> Self {
        self.stage(StageQuery::embedding(embedding))
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.inner.filters.push(filter);
        self
    }

    #[must_use]
    pub fn filters(mut self, filters: FilterSet) -> Self {
        self.inner.filters = filters;
        self
    }

    #[must_use]
    pub fn text_model(mut self, model: TextModel) -> Self {
        self.inner.text_model = model;
        self
    }

    #[must_use]
    pub fn likes<I: IntoIterator<Item = FrameId>>(mut self, likes: I) -> Self {
        self.inner.likes.extend(likes);
        self
    }

    #[must_use]
    pub fn shown<I: IntoIterator<Item = FrameId>>(mut self, shown: I) -> Self {
        self.inner.shown.extend(shown);
        self
    }

    #[must_use]
    pub fn build(self) -> Query {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_stage_is_rejected() {
        let query = Query::builder().text("   ").build();
        assert!(matches!(
            query.validate(),
            Err(FrameHunterError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn stageless_query_is_valid() {
        Query::default().validate().expect("browse query");
    }

    #[test]
    fn query_roundtrips_through_json() {
        let query = Query::builder()
            .text("red car")
            .embedding(vec![0.5, 0.5])
            .likes([3, 7])
            .build();
        let json = serde_json::to_string(&query).expect("serialize");
        let back: Query = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, query);
    }
}
