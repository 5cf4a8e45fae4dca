//! Alignment of consecutive query stages onto consecutive frames of one video.
//!
//! Stage `k + 1` must be matched to a frame of the same video that follows the frame matched
//! to stage `k` by at most `window` positions. For every frame `j` the best chain is found by
//! dynamic programming from the last stage backwards:
//!
//! `best_last(j) = s_last(j)`, `best_k(j) = s_k(j) + max { best_k+1(j') : j < j' <= j + window }`
//!
//! and the alignment score of a chain anchored at `j` is `best_0(j) / stages`.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::store::FeatureStore;
use crate::types::{FrameId, ScoreArray, VideoId};

const NO_LINK: FrameId = FrameId::MAX;

/// Outcome of aligning all stages.
#[derive(Debug, Clone, Default)]
pub(crate) struct Alignment {
    /// Alignment score per anchoring frame; frames anchoring no complete chain are absent.
    pub scores: ScoreArray,
    /// Frames matched to stages 1.. for each anchor.
    pub chains: BTreeMap<FrameId, SmallVec<[FrameId; 4]>>,
    /// Best alignment score per video.
    pub video_scores: BTreeMap<VideoId, f32>,
}

pub(crate) fn align(store: &FeatureStore, stages: &[ScoreArray], window: usize) -> Alignment {
    let Some(last) = stages.last() else {
        return Alignment::default();
    };
    let n = store.len();
    let mut best: Vec<Option<f32>> = vec![None; n];
    for (id, score) in last.iter() {
        best[id as usize] = Some(score);
    }

    // links[k][j] = frame chosen for stage k + 1 when stage k sits on j
    let mut links: Vec<Vec<FrameId>> = vec![Vec::new(); stages.len().saturating_sub(1)];
    for k in (0..stages.len().saturating_sub(1)).rev() {
        let mut current: Vec<Option<f32>> = vec![None; n];
        let mut link = vec![NO_LINK; n];
        for (id, score) in stages[k].iter() {
            let Some(successor) = best_successor(store, &best, id, window) else {
                continue;
            };
            if let Some(tail) = best[successor as usize] {
                current[id as usize] = Some(score + tail);
                link[id as usize] = successor;
            }
        }
        links[k] = link;
        best = current;
    }

    let stage_count = stages.len() as f32;
    let mut pairs = Vec::new();
    let mut chains = BTreeMap::new();
    let mut video_scores: BTreeMap<VideoId, f32> = BTreeMap::new();
    for id in stages[0].ids() {
        let Some(total) = best[*id as usize] else {
            continue;
        };
        let score = total / stage_count;
        pairs.push((*id, score));

        let mut chain = SmallVec::new();
        let mut at = *id;
        for link in &links {
            at = link[at as usize];
            chain.push(at);
        }
        chains.insert(*id, chain);

        let video = store.frames()[*id as usize].video_id;
        let entry = video_scores.entry(video).or_insert(score);
        if score > *entry {
            *entry = score;
        }
    }
    Alignment {
        scores: ScoreArray::from_pairs(pairs),
        chains,
        video_scores,
    }
}

/// Highest scoring frame in `(id, id + window]` of the same video; ties go to the earliest.
fn best_successor(
    store: &FeatureStore,
    best: &[Option<f32>],
    id: FrameId,
    window: usize,
) -> Option<FrameId> {
    let video = store.frames().get(id as usize)?.video_id;
    let range = store.video_frames(video)?;
    let start = id as usize + 1;
    let end = (id as usize)
        .saturating_add(window)
        .min(range.end as usize - 1);
    let mut chosen: Option<(FrameId, f32)> = None;
    for next in start..=end {
        if let Some(score) = best[next] {
            if chosen.is_none_or(|(_, s)| score > s) {
                chosen = Some((next as FrameId, score));
            }
        }
    }
    chosen.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureSpace, FrameMeta};

    // video 0: frames 0..6, video 1: frames 6..10
    fn store() -> FeatureStore {
        let frames = (0..10)
            .map(|i| FrameMeta::new(u32::from(i >= 6), i, i64::from(i)))
            .collect();
        FeatureStore::builder()
            .frames(frames)
            .space(FeatureSpace::Primary, 1, vec![0.0; 10])
            .build()
            .expect("store")
    }

    fn scores(pairs: &[(FrameId, f32)]) -> ScoreArray {
        ScoreArray::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn two_stage_alignment_within_window() {
        let store = store();
        let first = scores(&[(0, 1.0), (1, 0.2), (5, 0.9), (6, 0.8)]);
        let second = scores(&[(2, 0.6), (3, 1.0), (7, 0.5), (9, 0.1)]);
        let alignment = align(&store, &[first, second], 3);

        // 0 -> 3 (1.0 + 1.0), 1 -> 3, 5 has no successor in its video, 6 -> 7
        assert_eq!(alignment.scores.ids(), &[0, 1, 6]);
        assert_eq!(alignment.scores.get(0), Some(1.0));
        assert_eq!(alignment.chains[&0].as_slice(), &[3]);
        assert_eq!(alignment.chains[&6].as_slice(), &[7]);
        assert_eq!(alignment.video_scores[&0], 1.0);
        assert!((alignment.video_scores[&1] - 0.65).abs() < 1e-6);
    }

    #[test]
    fn successor_outside_window_is_ignored() {
        let store = store();
        let first = scores(&[(0, 1.0)]);
        let second = scores(&[(4, 1.0)]);
        let alignment = align(&store, &[first.clone(), second.clone()], 3);
        assert!(alignment.scores.is_empty());
        let wider = align(&store, &[first, second], 4);
        assert_eq!(wider.scores.ids(), &[0]);
    }

    #[test]
    fn chains_span_three_stages() {
        let store = store();
        let a = scores(&[(0, 0.9)]);
        let b = scores(&[(1, 0.3), (2, 0.6)]);
        let c = scores(&[(3, 0.6), (4, 0.9)]);
        let alignment = align(&store, &[a, b, c], 2);
        // 0 -> 2 -> 4
        assert_eq!(alignment.chains[&0].as_slice(), &[2, 4]);
        assert!((alignment.scores.get(0).expect("anchor") - 0.8).abs() < 1e-6);
    }

    #[test]
    fn stage_order_matters() {
        let store = store();
        let early = scores(&[(0, 1.0)]);
        let late = scores(&[(2, 1.0)]);
        assert!(!align(&store, &[early.clone(), late.clone()], 5).scores.is_empty());
        assert!(align(&store, &[late, early], 5).scores.is_empty());
    }

    #[test]
    fn unbounded_window_reaches_end_of_video() {
        let store = store();
        let first = scores(&[(0, 1.0), (6, 0.5)]);
        let second = scores(&[(5, 1.0), (9, 1.0)]);
        let alignment = align(&store, &[first, second], usize::MAX);
        assert_eq!(alignment.scores.ids(), &[0, 6]);
        assert_eq!(alignment.chains[&0].as_slice(), &[5]);
        assert_eq!(alignment.chains[&6].as_slice(), &[9]);
    }
}
