//! Public value types exposed by the `framehunter-core` crate.

pub mod canvas;
pub mod common;
pub mod frame;
pub mod query;
pub mod score;

pub use canvas::{CanvasBitmap, CanvasPayload, CanvasQuery, CanvasSubquery, RelativeRect};
pub use common::{FeatureSpace, FrameId, RankerKind, ShotId, Similarity, VideoId};
pub use frame::{CaptureCalendar, FrameMeta};
pub use query::{Query, QueryBuilder, StageQuery, TextModel};
pub use score::{
    Normalization, RankedFrame, RankerContribution, RescoreMetadata, RescoreResult, ResultStatus,
    ScoreArray,
};
