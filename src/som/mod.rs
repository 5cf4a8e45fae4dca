//! Self-organizing map layout of the current result set for spatial browsing.

mod train;
pub mod worker;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::simd::squared_l2;
use crate::types::{FrameId, ScoreArray, score::descending};

pub use worker::{AsyncSom, SomStatus};

/// Cell of the SOM grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub x: u32,
    pub y: u32,
}

/// One published layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SomState {
    pub generation: u64,
    pub width: usize,
    pub height: usize,
    /// Cell of every laid out frame.
    pub coordinates: BTreeMap<FrameId, GridPos>,
    /// Frames per cell, row-major, each list in ascending frame id order.
    pub clusters: Vec<Vec<FrameId>>,
    /// Iterations the training actually ran.
    pub iterations: usize,
    dim: usize,
    codebook: Vec<f32>,
}

impl SomState {
    #[must_use]
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    #[must_use]
    pub fn position(&self, frame_id: FrameId) -> Option<GridPos> {
        self.coordinates.get(&frame_id).copied()
    }

    #[must_use]
    pub fn cluster(&self, pos: GridPos) -> &[FrameId] {
        let idx = pos.y as usize * self.width + pos.x as usize;
        self.clusters.get(idx).map(Vec::as_slice).unwrap_or_default()
    }

    fn unit(&self, idx: usize) -> &[f32] {
        &self.codebook[idx * self.dim..(idx + 1) * self.dim]
    }

    /// One representative per cell, row-major: the best scored frame of the cell.
    ///
    /// Frames missing from `scores` rank below every scored frame. An empty cell borrows the
    /// best not yet displayed frame of the nearest cell (by codebook distance) holding at least
    /// two frames; it stays `None` when there is none.
    #[must_use]
    pub fn display(&self, scores: &ScoreArray) -> Vec<Option<FrameId>> {
        let score = |id: FrameId| scores.get(id).unwrap_or(f32::NEG_INFINITY);
        let ranked: Vec<Vec<FrameId>> = self
            .clusters
            .iter()
            .map(|members| {
                let mut sorted = members.clone();
                sorted.sort_by(|a, b| descending(score(*a), score(*b)).then(a.cmp(b)));
                sorted
            })
            .collect();

        let mut shown: BTreeSet<FrameId> = BTreeSet::new();
        let mut grid: Vec<Option<FrameId>> = ranked
            .iter()
            .map(|members| {
                let first = members.first().copied();
                if let Some(id) = first {
                    shown.insert(id);
                }
                first
            })
            .collect();

        for cell in 0..grid.len() {
            if grid[cell].is_some() {
                continue;
            }
            let mut donors: Vec<(f32, usize)> = (0..ranked.len())
                .filter(|donor| ranked[*donor].len() >= 2)
                .map(|donor| (squared_l2(self.unit(cell), self.unit(donor)), donor))
                .collect();
            donors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let borrowed = donors.iter().find_map(|(_, donor)| {
                ranked[*donor].iter().copied().find(|id| !shown.contains(id))
            });
            if let Some(id) = borrowed {
                shown.insert(id);
                grid[cell] = Some(id);
            }
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SomState {
        // 2x1 grid, every frame in cell 0
        SomState {
            generation: 1,
            width: 2,
            height: 1,
            coordinates: [(1, GridPos { x: 0, y: 0 }), (4, GridPos { x: 0, y: 0 })]
                .into_iter()
                .collect(),
            clusters: vec![vec![1, 4], vec![]],
            iterations: 10,
            dim: 1,
            codebook: vec![0.0, 1.0],
        }
    }

    #[test]
    fn display_picks_best_and_fills_empty_cells() {
        let scores = ScoreArray::from_pairs([(1, 0.2), (4, 0.9)]);
        let grid = state().display(&scores);
        assert_eq!(grid, vec![Some(4), Some(1)]);
    }

    #[test]
    fn cluster_lookup_by_position() {
        let state = state();
        assert_eq!(state.cluster(GridPos { x: 0, y: 0 }), &[1, 4]);
        assert!(state.cluster(GridPos { x: 1, y: 0 }).is_empty());
        assert_eq!(state.position(4), Some(GridPos { x: 0, y: 0 }));
    }
}
