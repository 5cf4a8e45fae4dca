use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a frame in the feature store's frame table.
pub type FrameId = u32;
/// Identifier of the video a frame was sampled from.
pub type VideoId = u32;
/// Identifier of the shot (within its video) a frame belongs to.
pub type ShotId = u32;

/// Named embedding domain with its own fixed dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSpace {
    /// CLIP-like joint visual/text space.
    Primary,
    /// Keyword space after PCA reduction.
    Secondary,
    /// Secondary-space features pooled over one canvas region of interest.
    Region(u16),
}

impl Default for FeatureSpace {
    fn default() -> Self {
        Self::Primary
    }
}

impl fmt::Display for FeatureSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
            Self::Region(idx) => write!(f, "region[{idx}]"),
        }
    }
}

/// Kind of ranker whose output takes part in fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankerKind {
    /// Precomputed query embedding scored against the primary space.
    Embedding,
    /// Keyword vocabulary embedding scored against the secondary space.
    Keyword,
    /// Extractor text embedding scored against the primary space.
    KeywordClip,
    /// Stored vector of an anchor frame.
    Relocation,
    /// Positioned canvas sub-queries.
    Canvas,
}

impl RankerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Keyword => "keyword",
            Self::KeywordClip => "keyword_clip",
            Self::Relocation => "relocation",
            Self::Canvas => "canvas",
        }
    }
}

impl fmt::Display for RankerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Similarity measure between a query vector and a stored vector; higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    Dot,
    NegSquaredEuclidean,
}

impl Default for Similarity {
    fn default() -> Self {
        Self::Dot
    }
}
