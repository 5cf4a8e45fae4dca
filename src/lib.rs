#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Strategic lint exceptions - these are allowed project-wide for pragmatic reasons:
//
// Documentation lints: Many internal/self-documenting functions don't need extensive docs.
// Public APIs should still have proper documentation.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Casts: frame ids are u32 by construction and grid coordinates are small, so
// numeric casts between indices, ids and float scores stay in range.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
// Style/complexity: ranking pipelines read best as one function per phase.
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)]
// e.g., frame_id, video_id, shot_id
//
// Pattern matching: These pedantic lints often suggest changes that reduce clarity.
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::if_same_then_else)]
#![allow(clippy::collapsible_match)]
//
// Performance/ergonomics trade-offs that are acceptable for this codebase:
#![allow(clippy::needless_pass_by_value)] // Many builders take owned values intentionally
#![allow(clippy::return_self_not_must_use)] // Builder patterns don't need must_use on every method
#![allow(clippy::assigning_clones)] // clone_from() often less readable
//
// Low-value pedantic lints that add noise:
#![allow(clippy::needless_continue)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::field_reassign_with_default)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::manual_clamp)]
#![allow(clippy::len_without_is_empty)] // Many index types don't need is_empty()
#![allow(clippy::large_enum_variant)]
#![allow(clippy::ptr_arg)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::incompatible_msrv)]
#![allow(clippy::should_implement_trait)] // Some method names are clearer than trait names
#![allow(clippy::duplicated_attributes)]
//
// Return value wrapping: ranker entry points share a Result signature.
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::unused_self)] // Some trait impls or future extensibility

/// The framehunter-core crate version (matches `Cargo.toml`).
pub const FRAMEHUNTER_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod filters;
pub mod rankers;
pub mod scoring;
pub mod store;
pub mod submit;
pub mod types;

// SIMD-accelerated similarity kernels
pub mod simd;

// Self-organizing map layout computed on a background thread
pub mod som;

pub use config::{
    CanvasConfig, EngineConfig, FeedbackConfig, FusionConfig, ProjectionTiming, SomConfig,
    SpaceConfig, TemporalConfig,
};
pub use constants::*;
pub use engine::FrameHunter;
pub use error::{FrameHunterError, Result};
pub use extractor::{
    Extractor, ExtractorError, ExtractorInput, NoExtractor, PrecomputedExtractor,
};
pub use filters::{CandidateMask, Filter, FilterSet, FilterSetBuilder, WeekdaySet};
pub use rankers::{
    CanvasQueryRanker, EmbeddingRanker, Keyword, KeywordClipRanker, KeywordMatch, KeywordModel,
    KeywordRanker, Projection, Ranker, RelocationRanker, canvas_weights,
};
pub use scoring::{FusedScores, RankerOutputs, ScoreModel, Weights, weighted_sample};
pub use som::{AsyncSom, GridPos, SomState, SomStatus};
pub use store::{FeatureMatrix, FeatureStore, FeatureStoreBuilder};
pub use submit::{SubmissionItem, SubmissionSink, SubmissionVerdict};
pub use types::{
    CanvasBitmap, CanvasPayload, CanvasQuery, CanvasSubquery, CaptureCalendar, FeatureSpace,
    FrameId, FrameMeta, Normalization, Query, QueryBuilder, RankedFrame, RankerContribution,
    RankerKind, RelativeRect, RescoreMetadata, RescoreResult, ResultStatus, ScoreArray, ShotId,
    Similarity, StageQuery, TextModel, VideoId,
};
