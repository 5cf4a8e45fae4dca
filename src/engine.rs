//! `FrameHunter`: the ranking core behind one loaded dataset.
//!
//! The engine owns one ranker per query fragment kind, the score model and the background
//! SOM worker. Rankers only read the shared [`FeatureStore`], so `rescore` takes `&self`
//! and may run from several threads at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::constants::DEFAULT_AUTOCOMPLETE_LIMIT;
use crate::error::{FrameHunterError, Result};
use crate::extractor::Extractor;
use crate::filters::CandidateMask;
use crate::rankers::{
    CanvasQueryRanker, EmbeddingRanker, KeywordClipRanker, KeywordMatch, KeywordModel,
    KeywordRanker, Ranker, RelocationRanker,
};
use crate::scoring::{RankerOutputs, ScoreModel, weighted_sample};
use crate::som::{AsyncSom, SomState, SomStatus};
use crate::store::FeatureStore;
use crate::submit::{SubmissionItem, SubmissionSink, SubmissionVerdict};
use crate::types::{
    FeatureSpace, FrameId, Query, RankerKind, RelativeRect, RescoreMetadata, RescoreResult,
    StageQuery, TextModel,
};

pub struct FrameHunter {
    store: Arc<FeatureStore>,
    config: EngineConfig,
    embedding: EmbeddingRanker,
    clip: KeywordClipRanker,
    relocation: RelocationRanker,
    keyword: Option<KeywordRanker>,
    canvas: CanvasQueryRanker,
    model: ScoreModel,
    som: Option<AsyncSom>,
    generation: AtomicU64,
}

impl std::fmt::Debug for FrameHunter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHunter")
            .field("frames", &self.store.len())
            .field("keyword", &self.keyword.is_some())
            .field("som", &self.som.is_some())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl FrameHunter {
    /// Builds the rankers over `store`. The primary space is required; canvas regions are
    /// wired up for every configured rectangle whose region features are loaded.
    pub fn new(
        store: Arc<FeatureStore>,
        config: EngineConfig,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        config.validate_against(&store)?;

        let primary = config
            .space(FeatureSpace::Primary, &store)
            .ok_or(FrameHunterError::MissingFeatureSpace {
                space: FeatureSpace::Primary,
            })?;
        let embedding = EmbeddingRanker::new(Arc::clone(&store), &primary)?;
        let clip = KeywordClipRanker::new(embedding.clone(), Arc::clone(&extractor));

        let relocation_space = config.space(config.relocation_space, &store).ok_or(
            FrameHunterError::MissingFeatureSpace {
                space: config.relocation_space,
            },
        )?;
        let relocation =
            RelocationRanker::new(EmbeddingRanker::new(Arc::clone(&store), &relocation_space)?);

        let mut canvas = CanvasQueryRanker::new(Arc::clone(&extractor), config.canvas.clone())
            .with_image_ranker(embedding.clone())
            .with_clip_ranker(clip.clone());
        for (idx, rect) in config.canvas.regions.iter().enumerate() {
            let space = FeatureSpace::Region(idx as u16);
            if let Some(region) = config.space(space, &store) {
                canvas = canvas.with_region(*rect, EmbeddingRanker::new(Arc::clone(&store), &region)?);
            }
        }

        let som = if config.som.enabled && store.has_space(config.som.space) {
            Some(AsyncSom::new(Arc::clone(&store), config.som.clone())?)
        } else {
            None
        };

        tracing::debug!(
            target = "framehunter::engine",
            frames = store.len(),
            videos = store.video_count(),
            regions = config.canvas.regions.len(),
            som = som.is_some(),
            "engine ready"
        );
        Ok(Self {
            model: ScoreModel::from_config(&config),
            store,
            config,
            embedding,
            clip,
            relocation,
            keyword: None,
            canvas,
            som,
            generation: AtomicU64::new(0),
        })
    }

    /// Enables the keyword ranker over the secondary space.
    pub fn with_keyword_model(mut self, model: KeywordModel) -> Result<Self> {
        let secondary = self
            .config
            .space(FeatureSpace::Secondary, &self.store)
            .ok_or(FrameHunterError::MissingFeatureSpace {
                space: FeatureSpace::Secondary,
            })?;
        let inner = EmbeddingRanker::new(Arc::clone(&self.store), &secondary)?;
        let keyword = KeywordRanker::new(inner, Arc::new(model))?;
        self.canvas = self.canvas.with_keyword_ranker(keyword.clone());
        self.keyword = Some(keyword);
        Ok(self)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<FeatureStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn score_model(&self) -> &ScoreModel {
        &self.model
    }

    /// Ranks every candidate for `query` and queues a SOM layout of the result.
    pub fn rescore(&self, query: &Query) -> Result<RescoreResult> {
        let mut result = self.rank(query)?;
        result.metadata.som_generation = self.request_layout(&result);
        Ok(result)
    }

    /// Runs the query recorded in `metadata` again against the current state.
    pub fn replay(&self, metadata: &RescoreMetadata) -> Result<RescoreResult> {
        let query = metadata
            .query
            .as_ref()
            .ok_or_else(|| FrameHunterError::InvalidQuery {
                reason: format!("rescore {} carries no recorded query", metadata.id),
            })?;
        let result = self.rank(query)?;
        tracing::debug!(
            target = "framehunter::engine",
            original = %metadata.id,
            replay = %result.metadata.id,
            items = result.len(),
            "rescore replayed"
        );
        Ok(result)
    }

    fn rank(&self, query: &Query) -> Result<RescoreResult> {
        let started = Instant::now();
        query.validate()?;

        let mask = query.filters.candidate_mask(&self.store);
        if mask.is_empty() {
            let mut metadata = RescoreMetadata::new(
                self.config.fusion.normalization,
                query.filters.clone(),
                self.config.fusion.top_k,
            );
            metadata.stage_count = query.stages.len();
            metadata.query = Some(query.clone());
            tracing::debug!(
                target = "framehunter::engine",
                "filters rejected every frame"
            );
            return Ok(RescoreResult::no_candidates(metadata));
        }

        let stages = query
            .stages
            .iter()
            .map(|stage| self.stage_outputs(stage, query.text_model, &mask))
            .collect::<Result<Vec<_>>>()?;
        let fused = self.model.fuse_stages(
            &self.store,
            &stages,
            &self.config.fusion.weights,
            &query.filters,
        )?;
        let fused = self.model.apply_feedback(
            self.relocation.vectors(),
            fused,
            &query.likes,
            &query.shown,
        )?;
        let mut result = self.model.finalize(&self.store, fused);
        let ranker = result
            .metadata
            .contributions
            .first()
            .map_or(RankerKind::Embedding, |c| c.kind);
        ScoreModel::ensure_finite(&result, ranker)?;

        result.metadata.query = Some(query.clone());
        result.metadata.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            target = "framehunter::engine",
            id = %result.metadata.id,
            stages = query.stages.len(),
            candidates = result.candidates,
            items = result.len(),
            elapsed_ms = result.metadata.elapsed_ms,
            "rescore finished"
        );
        Ok(result)
    }

    fn stage_outputs(
        &self,
        stage: &StageQuery,
        text_model: TextModel,
        mask: &CandidateMask,
    ) -> Result<RankerOutputs> {
        let mut outputs = RankerOutputs::new();
        if let Some(text) = stage.text.as_deref().filter(|t| !t.trim().is_empty()) {
            if matches!(text_model, TextModel::Clip | TextModel::Both) {
                outputs.insert(RankerKind::KeywordClip, self.clip.rank(text, Some(mask))?);
            }
            if matches!(text_model, TextModel::Keyword | TextModel::Both) {
                let keyword = self
                    .keyword
                    .as_ref()
                    .ok_or(FrameHunterError::RankerUnavailable {
                        kind: RankerKind::Keyword,
                    })?;
                outputs.insert(RankerKind::Keyword, keyword.rank(text, Some(mask))?);
            }
        }
        if let Some(canvas) = &stage.canvas {
            outputs.insert(RankerKind::Canvas, self.canvas.rank(canvas, Some(mask))?);
        }
        if let Some(anchor) = stage.anchor {
            outputs.insert(
                RankerKind::Relocation,
                self.relocation.rank(&anchor, Some(mask))?,
            );
        }
        if let Some(embedding) = &stage.embedding {
            outputs.insert(
                RankerKind::Embedding,
                self.embedding.rank(embedding, Some(mask))?,
            );
        }
        Ok(outputs)
    }

    fn request_layout(&self, result: &RescoreResult) -> Option<u64> {
        let som = self.som.as_ref()?;
        if result.is_empty() {
            return None;
        }
        let limit = match self.config.som.max_points {
            0 => result.len(),
            n => n.min(result.len()),
        };
        let items = &result.items[..limit];
        let frame_ids = items.iter().map(|item| item.frame_id).collect();
        let weights = items.iter().map(|item| item.score).collect();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        som.request_layout(frame_ids, Some(weights), generation)
            .then_some(generation)
    }

    /// Nearest stored neighbours of a frame in the relocation space.
    pub fn top_knn(&self, frame_id: FrameId, k: usize) -> Result<Vec<(FrameId, f32)>> {
        self.relocation.nearest(frame_id, k)
    }

    /// Keyword suggestions for a typed prefix; empty without a keyword model.
    #[must_use]
    pub fn keyword_autocomplete(&self, prefix: &str, limit: Option<usize>) -> Vec<KeywordMatch> {
        self.keyword.as_ref().map_or_else(Vec::new, |keyword| {
            keyword
                .model()
                .find(prefix, limit.unwrap_or(DEFAULT_AUTOCOMPLETE_LIMIT))
        })
    }

    /// Latest published SOM layout.
    #[must_use]
    pub fn som_layout(&self) -> Option<Arc<SomState>> {
        self.som.as_ref().and_then(AsyncSom::current_layout)
    }

    #[must_use]
    pub fn som_status(&self) -> SomStatus {
        self.som.as_ref().map_or(SomStatus::Idle, AsyncSom::status)
    }

    /// Waits for the layout of a given rescore, see [`AsyncSom::wait_for_generation`].
    #[must_use]
    pub fn wait_for_layout(&self, generation: u64, timeout: Duration) -> Option<Arc<SomState>> {
        self.som
            .as_ref()
            .and_then(|som| som.wait_for_generation(generation, timeout))
    }

    /// One representative frame per SOM cell for `result`, row-major.
    #[must_use]
    pub fn som_display(&self, result: &RescoreResult) -> Option<Vec<Option<FrameId>>> {
        self.som_layout()
            .map(|layout| layout.display(&result.to_score_array()))
    }

    /// Score-proportional sample of ranked frames for exploratory display.
    #[must_use]
    pub fn sample_display(&self, result: &RescoreResult, count: usize, seed: u64) -> Vec<FrameId> {
        weighted_sample(&result.to_score_array(), count, seed)
    }

    /// Bounding rectangles of the configured canvas regions.
    #[must_use]
    pub fn canvas_regions(&self) -> &[RelativeRect] {
        &self.config.canvas.regions
    }

    pub fn submission_item(&self, frame_id: FrameId) -> Result<SubmissionItem> {
        let meta = self.store.frame(frame_id)?;
        Ok(SubmissionItem::from_meta(frame_id, meta))
    }

    /// Hands a frame to an evaluation-server transport and reports its verdict.
    pub fn submit(&self, frame_id: FrameId, sink: &dyn SubmissionSink) -> Result<SubmissionVerdict> {
        let item = self.submission_item(frame_id)?;
        let verdict = sink.submit(&item)?;
        tracing::info!(
            target = "framehunter::submit",
            frame_id,
            video = %item.padded_video_id(),
            frame_number = item.frame_number,
            ?verdict,
            "frame submitted"
        );
        Ok(verdict)
    }
}
