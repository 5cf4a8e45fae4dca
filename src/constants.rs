//! Engine-wide defaults.

/// Default cap on the number of ranked frames returned by a rescore.
pub const DEFAULT_TOP_K: usize = 20_000;

/// Upper bound for nearest-neighbour lookups.
pub const TOP_KNN_LIMIT: usize = 10_000;

/// Number of successor frames a temporal stage may be placed after its predecessor.
pub const DEFAULT_TEMPORAL_WINDOW: usize = 5;

/// Bandwidth of the relevance feedback kernel.
pub const DEFAULT_FEEDBACK_SIGMA: f32 = 0.1;

/// Maximum number of shown-but-not-liked frames considered by relevance feedback.
pub const DEFAULT_FEEDBACK_MAX_OTHERS: usize = 64;

/// Floor applied when rescaling feedback scores so nothing collapses to exactly zero.
pub const MINIMAL_SCORE: f32 = 1e-18;

pub const DEFAULT_SOM_WIDTH: usize = 8;
pub const DEFAULT_SOM_HEIGHT: usize = 8;
pub const DEFAULT_SOM_ITERATIONS: usize = 30_000;
pub const DEFAULT_SOM_ALPHA_START: f32 = 0.3;
pub const DEFAULT_SOM_ALPHA_END: f32 = 0.1;
pub const DEFAULT_SOM_RADIUS_END: f32 = 0.1;
pub const DEFAULT_SOM_CONVERGENCE: f32 = 1e-6;
pub const DEFAULT_SOM_SEED: u64 = 0x5eed_f4a3_e001;

/// Candidate rows below which the linear scan stays on the calling thread.
pub const PARALLEL_SCAN_MIN_ROWS: usize = 16_384;

/// Sub-query count from which canvas sub-queries are ranked concurrently.
pub const DEFAULT_CANVAS_PARALLEL_THRESHOLD: usize = 2;

/// Weight reduction applied to canvas rectangles fully covered by other rectangles.
pub const DEFAULT_CANVAS_OVERLAP_PENALTY: f32 = 0.5;

/// Characters stripped from keyword queries before tokenization.
pub const KEYWORD_SEPARATORS: &[char] = &['\\', '/', '?', '!', ',', '.', '\'', '"'];

/// Maximum keyword candidates returned by autocomplete.
pub const DEFAULT_AUTOCOMPLETE_LIMIT: usize = 10;
