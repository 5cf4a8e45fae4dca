//! Ranker family: every ranker turns one query fragment into a [`ScoreArray`].

pub mod canvas;
pub mod embedding;
pub mod keyword;
pub mod keyword_clip;
pub mod projection;
pub mod relocation;

use crate::error::Result;
use crate::filters::CandidateMask;
use crate::types::{RankerKind, ScoreArray};

pub use canvas::{CanvasQueryRanker, canvas_weights};
pub use embedding::EmbeddingRanker;
pub use keyword::{Keyword, KeywordMatch, KeywordModel, KeywordRanker};
pub use keyword_clip::KeywordClipRanker;
pub use projection::Projection;
pub use relocation::RelocationRanker;

/// Shared capability of all rankers.
///
/// Implementations are pure over the shared feature store: calling `rank` concurrently or
/// repeatedly is safe and yields identical arrays. The output covers exactly the frames
/// admitted by `mask` (all frames when `None`), in ascending frame id order.
pub trait Ranker: Send + Sync {
    type Query: ?Sized;

    fn kind(&self) -> RankerKind;

    fn rank(&self, query: &Self::Query, mask: Option<&CandidateMask>) -> Result<ScoreArray>;
}
