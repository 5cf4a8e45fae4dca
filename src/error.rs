//! Error types surfaced by the ranking core.

use thiserror::Error;

use crate::types::{FeatureSpace, FrameId, RankerKind};

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FrameHunterError>;

/// Every failure a ranking, fusion or layout request can report.
///
/// An empty candidate set is not an error: it is reported through
/// [`crate::ResultStatus::NoCandidates`] on an otherwise empty result.
#[derive(Debug, Error)]
pub enum FrameHunterError {
    #[error("query embedding for {space} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        space: FeatureSpace,
        expected: usize,
        actual: usize,
    },

    #[error("frame {frame_id} is not present in the feature store")]
    UnknownFrame { frame_id: FrameId },

    #[error("canvas query has no sub-queries")]
    EmptyCanvas,

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("embedding for {space} unavailable: {reason}")]
    EmbeddingUnavailable { space: FeatureSpace, reason: String },

    #[error("non-finite score for frame {frame_id} produced by {ranker}")]
    NonFiniteScore { frame_id: FrameId, ranker: RankerKind },

    #[error("invalid dataset: {reason}")]
    InvalidDataset { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("feature space {space} is not loaded")]
    MissingFeatureSpace { space: FeatureSpace },

    #[error("ranker {kind} is not configured")]
    RankerUnavailable { kind: RankerKind },

    #[error("submission failed: {reason}")]
    Submission { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl FrameHunterError {
    /// True for conditions caused by the request itself rather than the engine state.
    #[must_use]
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. }
                | Self::UnknownFrame { .. }
                | Self::EmptyCanvas
                | Self::InvalidQuery { .. }
        )
    }
}
