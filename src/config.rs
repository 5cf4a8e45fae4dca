//! Engine configuration, loadable from JSON.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CANVAS_OVERLAP_PENALTY, DEFAULT_CANVAS_PARALLEL_THRESHOLD, DEFAULT_FEEDBACK_MAX_OTHERS,
    DEFAULT_FEEDBACK_SIGMA, DEFAULT_SOM_ALPHA_END, DEFAULT_SOM_ALPHA_START,
    DEFAULT_SOM_CONVERGENCE, DEFAULT_SOM_HEIGHT, DEFAULT_SOM_ITERATIONS, DEFAULT_SOM_RADIUS_END,
    DEFAULT_SOM_SEED, DEFAULT_SOM_WIDTH, DEFAULT_TEMPORAL_WINDOW, DEFAULT_TOP_K,
};
use crate::error::{FrameHunterError, Result};
use crate::rankers::projection::Projection;
use crate::store::FeatureStore;
use crate::types::{FeatureSpace, Normalization, RankerKind, RelativeRect, Similarity};

/// When a configured projection is applied to the stored vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionTiming {
    /// Project every stored row once when the ranker is built.
    AtLoad,
    /// Project rows on the fly during each scan.
    PerQuery,
}

impl Default for ProjectionTiming {
    fn default() -> Self {
        Self::AtLoad
    }
}

/// Per feature space settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceConfig {
    pub space: FeatureSpace,
    /// Dimensionality of the stored vectors.
    pub dim: usize,
    #[serde(default)]
    pub similarity: Similarity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
    #[serde(default)]
    pub projection_timing: ProjectionTiming,
}

impl SpaceConfig {
    #[must_use]
    pub fn new(space: FeatureSpace, dim: usize) -> Self {
        Self {
            space,
            dim,
            similarity: Similarity::Dot,
            projection: None,
            projection_timing: ProjectionTiming::AtLoad,
        }
    }

    /// Dimensionality query vectors must have.
    #[must_use]
    pub fn query_dim(&self) -> usize {
        self.projection
            .as_ref()
            .map_or(self.dim, |p| p.output_dim_for(self.dim))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Weight per ranker kind; unlisted kinds weigh 1.0.
    pub weights: BTreeMap<RankerKind, f32>,
    pub normalization: Normalization,
    pub top_k: usize,
    /// Maximum frames of one video in the result, 0 for no limit.
    pub per_video_limit: usize,
    /// Maximum frames of one shot in the result, 0 for no limit.
    pub per_shot_limit: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            normalization: Normalization::MinMax,
            top_k: DEFAULT_TOP_K,
            per_video_limit: 0,
            per_shot_limit: 0,
        }
    }
}

impl FusionConfig {
    #[must_use]
    pub fn weight(&self, kind: RankerKind) -> f32 {
        self.weights.get(&kind).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// How many following frames of the same video may hold the next stage.
    pub window: usize,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_TEMPORAL_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Regions of interest backing the `region` feature spaces, by index.
    pub regions: Vec<RelativeRect>,
    /// Share of weight a rectangle loses when fully covered by other rectangles.
    pub overlap_penalty: f32,
    pub parallel_threshold: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            overlap_penalty: DEFAULT_CANVAS_OVERLAP_PENALTY,
            parallel_threshold: DEFAULT_CANVAS_PARALLEL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub sigma: f32,
    pub max_others: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_FEEDBACK_SIGMA,
            max_others: DEFAULT_FEEDBACK_MAX_OTHERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SomConfig {
    pub enabled: bool,
    pub space: FeatureSpace,
    pub width: usize,
    pub height: usize,
    pub iterations: usize,
    pub alpha_start: f32,
    pub alpha_end: f32,
    /// Starting neighbourhood radius in grid steps; `(width + height) / 3` when unset.
    pub radius_start: Option<f32>,
    pub radius_end: f32,
    /// Training stops once the mean unit movement over an epoch falls below this.
    pub convergence_threshold: f32,
    pub seed: u64,
    /// Highest-ranked frames handed to the layout, 0 for every candidate.
    pub max_points: usize,
}

impl Default for SomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            space: FeatureSpace::Primary,
            width: DEFAULT_SOM_WIDTH,
            height: DEFAULT_SOM_HEIGHT,
            iterations: DEFAULT_SOM_ITERATIONS,
            alpha_start: DEFAULT_SOM_ALPHA_START,
            alpha_end: DEFAULT_SOM_ALPHA_END,
            radius_start: None,
            radius_end: DEFAULT_SOM_RADIUS_END,
            convergence_threshold: DEFAULT_SOM_CONVERGENCE,
            seed: DEFAULT_SOM_SEED,
            max_points: 0,
        }
    }
}

impl SomConfig {
    #[must_use]
    pub fn initial_radius(&self) -> f32 {
        self.radius_start
            .unwrap_or((self.width + self.height) as f32 / 3.0)
    }

    #[must_use]
    pub fn units(&self) -> usize {
        self.width * self.height
    }
}

/// Everything the ranking core reads from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub spaces: Vec<SpaceConfig>,
    pub fusion: FusionConfig,
    pub temporal: TemporalConfig,
    pub canvas: CanvasConfig,
    pub feedback: FeedbackConfig,
    pub som: SomConfig,
    /// Space used for relocation, relevance feedback and nearest-neighbour lookups.
    pub relocation_space: FeatureSpace,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&raw)?;
        tracing::debug!(
            target = "framehunter::config",
            path = %path.as_ref().display(),
            spaces = config.spaces.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Settings for one space; unconfigured spaces use the stored dimensionality and a dot product.
    #[must_use]
    pub fn space(&self, space: FeatureSpace, store: &FeatureStore) -> Option<SpaceConfig> {
        if let Some(cfg) = self.spaces.iter().find(|cfg| cfg.space == space) {
            return Some(cfg.clone());
        }
        store.dim(space).ok().map(|dim| SpaceConfig::new(space, dim))
    }

    /// Internal consistency checks that need no dataset.
    pub fn validate(&self) -> Result<()> {
        for (kind, weight) in &self.fusion.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(invalid(format!("weight of {kind} must be finite and >= 0")));
            }
        }
        if self.fusion.top_k == 0 {
            return Err(invalid("fusion.top_k must be positive"));
        }
        if self.temporal.window == 0 {
            return Err(invalid("temporal.window must be positive"));
        }
        if !(0.0..=1.0).contains(&self.canvas.overlap_penalty) {
            return Err(invalid("canvas.overlap_penalty must lie in [0, 1]"));
        }
        for rect in &self.canvas.regions {
            rect.validate().map_err(|err| invalid(err.to_string()))?;
        }
        if !positive(self.feedback.sigma) {
            return Err(invalid("feedback.sigma must be positive"));
        }
        let som = &self.som;
        if som.width == 0 || som.height == 0 {
            return Err(invalid("som grid must have at least one unit"));
        }
        if som.iterations == 0 {
            return Err(invalid("som.iterations must be positive"));
        }
        if !positive(som.alpha_start) || !positive(som.alpha_end) {
            return Err(invalid("som learning rates must be positive"));
        }
        if !positive(som.initial_radius()) || !positive(som.radius_end) {
            return Err(invalid("som radii must be positive"));
        }
        for (idx, space) in self.spaces.iter().enumerate() {
            if self.spaces[..idx].iter().any(|s| s.space == space.space) {
                return Err(invalid(format!("{} configured twice", space.space)));
            }
            if space.dim == 0 {
                return Err(invalid(format!("{} has zero dimensionality", space.space)));
            }
            if let Some(projection) = &space.projection {
                projection
                    .validate(space.dim)
                    .map_err(|err| invalid(format!("{}: {err}", space.space)))?;
            }
        }
        Ok(())
    }

    /// Checks the configured dimensionalities against a loaded store.
    pub fn validate_against(&self, store: &FeatureStore) -> Result<()> {
        self.validate()?;
        for space in &self.spaces {
            let stored = store.dim(space.space)?;
            if stored != space.dim {
                return Err(invalid(format!(
                    "{} configured with {} dimensions, store holds {stored}",
                    space.space, space.dim
                )));
            }
        }
        for idx in 0..self.canvas.regions.len() {
            let space = FeatureSpace::Region(idx as u16);
            if !store.has_space(space) {
                tracing::warn!(
                    target = "framehunter::config",
                    %space,
                    "canvas region configured without features; whole-frame features will be used"
                );
            }
        }
        Ok(())
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(reason: impl Into<String>) -> FrameHunterError {
    FrameHunterError::InvalidConfig {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().expect("defaults");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "fusion": { "weights": { "keyword": 2.0 }, "normalization": "rank" },
                "temporal": { "window": 3 },
                "spaces": [ { "space": "primary", "dim": 4 } ]
            }"#,
        )
        .expect("config");
        assert_eq!(config.fusion.weight(RankerKind::Keyword), 2.0);
        assert_eq!(config.fusion.weight(RankerKind::Canvas), 1.0);
        assert_eq!(config.fusion.normalization, Normalization::Rank);
        assert_eq!(config.fusion.top_k, DEFAULT_TOP_K);
        assert_eq!(config.temporal.window, 3);
        assert_eq!(config.spaces[0].query_dim(), 4);
        assert_eq!(config.som.initial_radius(), 16.0 / 3.0);
    }

    #[test]
    fn negative_weight_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "fusion": { "weights": { "canvas": -1.0 } } }"#)
            .expect_err("negative weight");
        assert!(matches!(err, FrameHunterError::InvalidConfig { .. }));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "som": { "width": 5, "height": 5 } }"#).expect("write");
        let config = EngineConfig::from_json_file(&path).expect("config");
        assert_eq!(config.som.units(), 25);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = EngineConfig::from_json_file(dir.path().join("absent.json")).expect_err("missing");
        assert!(matches!(err, FrameHunterError::Io { .. }));
    }
}
