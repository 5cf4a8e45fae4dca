//! Shared, read-only frame table and per-space feature matrices.
//!
//! A [`FeatureStore`] is assembled once from already parsed arrays and then shared behind an
//! `Arc` by every ranker, the score model and the SOM worker. Each feature space is one flat
//! row-major allocation with one row per frame; rankers borrow rows and never copy a matrix.

use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Instant;

use crate::constants::TOP_KNN_LIMIT;
use crate::error::{FrameHunterError, Result};
use crate::filters::CandidateMask;
use crate::rankers::embedding::scan_rows;
use crate::types::{FeatureSpace, FrameId, FrameMeta, Similarity, VideoId, score::descending};

/// Row-major matrix of one feature space.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    pub(crate) fn new(dim: usize, data: Vec<f32>) -> Self {
        Self { dim, data }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    #[must_use]
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.dim;
        &self.data[start..start + self.dim]
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

#[derive(Debug)]
pub struct FeatureStore {
    frames: Vec<FrameMeta>,
    spaces: BTreeMap<FeatureSpace, FeatureMatrix>,
    videos: BTreeMap<VideoId, Range<FrameId>>,
}

impl FeatureStore {
    #[must_use]
    pub fn builder() -> FeatureStoreBuilder {
        FeatureStoreBuilder::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn contains(&self, frame_id: FrameId) -> bool {
        (frame_id as usize) < self.frames.len()
    }

    pub fn frame(&self, frame_id: FrameId) -> Result<&FrameMeta> {
        self.frames
            .get(frame_id as usize)
            .ok_or(FrameHunterError::UnknownFrame { frame_id })
    }

    #[must_use]
    pub fn frames(&self) -> &[FrameMeta] {
        &self.frames
    }

    #[must_use]
    pub fn has_space(&self, space: FeatureSpace) -> bool {
        self.spaces.contains_key(&space)
    }

    pub fn spaces(&self) -> impl Iterator<Item = FeatureSpace> + '_ {
        self.spaces.keys().copied()
    }

    pub fn matrix(&self, space: FeatureSpace) -> Result<&FeatureMatrix> {
        self.spaces
            .get(&space)
            .ok_or(FrameHunterError::MissingFeatureSpace { space })
    }

    pub fn dim(&self, space: FeatureSpace) -> Result<usize> {
        self.matrix(space).map(FeatureMatrix::dim)
    }

    pub fn vector(&self, space: FeatureSpace, frame_id: FrameId) -> Result<&[f32]> {
        let matrix = self.matrix(space)?;
        if !self.contains(frame_id) {
            return Err(FrameHunterError::UnknownFrame { frame_id });
        }
        Ok(matrix.row(frame_id as usize))
    }

    /// Contiguous frame id range of a video.
    #[must_use]
    pub fn video_frames(&self, video_id: VideoId) -> Option<Range<FrameId>> {
        self.videos.get(&video_id).cloned()
    }

    #[must_use]
    pub fn video_count(&self) -> usize {
        self.videos.len()
    }

    /// True when both frames belong to the same video.
    #[must_use]
    pub fn same_video(&self, a: FrameId, b: FrameId) -> bool {
        match (self.frames.get(a as usize), self.frames.get(b as usize)) {
            (Some(fa), Some(fb)) => fa.video_id == fb.video_id,
            _ => false,
        }
    }

    /// Nearest neighbours of a stored frame, excluding the frame itself.
    ///
    /// `k` is capped at [`TOP_KNN_LIMIT`]; ties are broken by ascending frame id.
    pub fn top_knn(
        &self,
        space: FeatureSpace,
        similarity: Similarity,
        frame_id: FrameId,
        k: usize,
        mask: Option<&CandidateMask>,
    ) -> Result<Vec<(FrameId, f32)>> {
        let query = self.vector(space, frame_id)?;
        let matrix = self.matrix(space)?;
        let scores = scan_rows(matrix, query, similarity, mask, self.len());
        let mut hits: Vec<(FrameId, f32)> = scores.iter().filter(|(id, _)| *id != frame_id).collect();
        hits.sort_by(|a, b| descending(a.1, b.1).then(a.0.cmp(&b.0)));
        hits.truncate(k.min(TOP_KNN_LIMIT));
        Ok(hits)
    }
}

/// Assembles a [`FeatureStore`] from parsed frame metadata and feature arrays.
#[derive(Debug, Default)]
pub struct FeatureStoreBuilder {
    frames: Vec<FrameMeta>,
    spaces: Vec<(FeatureSpace, usize, Vec<f32>)>,
}

impl FeatureStoreBuilder {
    #[must_use]
    pub fn frames(mut self, frames: Vec<FrameMeta>) -> Self {
        self.frames = frames;
        self
    }

    #[must_use]
    pub fn frame(mut self, frame: FrameMeta) -> Self {
        self.frames.push(frame);
        self
    }

    /// Adds a feature space as a flat row-major array of `frames × dim` values.
    #[must_use]
    pub fn space(mut self, space: FeatureSpace, dim: usize, data: Vec<f32>) -> Self {
        self.spaces.push((space, dim, data));
        self
    }

    /// Adds a feature space from one vector per frame.
    #[must_use]
    pub fn space_rows(self, space: FeatureSpace, rows: &[Vec<f32>]) -> Self {
        let dim = rows.first().map_or(0, Vec::len);
        let data = rows.iter().flatten().copied().collect();
        self.space(space, dim, data)
    }

    pub fn build(self) -> Result<FeatureStore> {
        let started = Instant::now();
        if self.frames.is_empty() {
            return Err(invalid("frame table is empty"));
        }
        if FrameId::try_from(self.frames.len()).is_err() {
            return Err(invalid(format!(
                "{} frames exceed the frame id range",
                self.frames.len()
            )));
        }
        let videos = index_videos(&self.frames)?;

        let mut spaces = BTreeMap::new();
        for (space, dim, data) in self.spaces {
            if dim == 0 {
                return Err(invalid(format!("{space} has zero dimensionality")));
            }
            if data.len() != dim * self.frames.len() {
                return Err(invalid(format!(
                    "{space} holds {} values, expected {} frames x {dim}",
                    data.len(),
                    self.frames.len()
                )));
            }
            if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
                return Err(invalid(format!(
                    "{space} has a non-finite value in row {}",
                    pos / dim
                )));
            }
            if spaces.insert(space, FeatureMatrix::new(dim, data)).is_some() {
                return Err(invalid(format!("{space} supplied twice")));
            }
        }

        log::info!(
            "feature store ready: {} frames, {} videos, {} spaces in {} ms",
            self.frames.len(),
            videos.len(),
            spaces.len(),
            started.elapsed().as_millis()
        );
        Ok(FeatureStore {
            frames: self.frames,
            spaces,
            videos,
        })
    }
}

fn invalid(reason: impl Into<String>) -> FrameHunterError {
    FrameHunterError::InvalidDataset {
        reason: reason.into(),
    }
}

/// Checks that videos are contiguous and time ordered, returning each video's id range.
fn index_videos(frames: &[FrameMeta]) -> Result<BTreeMap<VideoId, Range<FrameId>>> {
    let mut videos: BTreeMap<VideoId, Range<FrameId>> = BTreeMap::new();
    let mut start = 0usize;
    for idx in 1..=frames.len() {
        let boundary = idx == frames.len() || frames[idx].video_id != frames[start].video_id;
        if !boundary {
            if frames[idx].timestamp < frames[idx - 1].timestamp {
                return Err(invalid(format!(
                    "frame {idx} of video {} goes back in time",
                    frames[idx].video_id
                )));
            }
            continue;
        }
        let video_id = frames[start].video_id;
        let range = start as FrameId..idx as FrameId;
        if videos.insert(video_id, range).is_some() {
            return Err(invalid(format!("frames of video {video_id} are not contiguous")));
        }
        start = idx;
    }
    Ok(videos)
}
