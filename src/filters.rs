//! Attribute filters over frame metadata and the candidate masks they produce.
//!
//! Every [`Filter`] is a pure predicate over one frame; a [`FilterSet`] is their conjunction,
//! so the order filters are declared or applied in never changes the candidate set.

use std::collections::BTreeSet;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::store::FeatureStore;
use crate::types::{FrameId, FrameMeta, VideoId};

/// Set of weekdays stored as a 7-bit mask, Monday in bit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const ALL: Self = Self(0b111_1111);
    pub const WORKDAYS: Self = Self(0b001_1111);
    pub const WEEKEND: Self = Self(0b110_0000);

    #[must_use]
    pub const fn from_mask(mask: u8) -> Self {
        Self(mask & 0b111_1111)
    }

    #[must_use]
    pub fn from_days<I: IntoIterator<Item = Weekday>>(days: I) -> Self {
        Self(
            days.into_iter()
                .fold(0u8, |acc, day| acc | (1 << day.num_days_from_monday())),
        )
    }

    #[must_use]
    pub const fn mask(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }
}

/// A single predicate over frame metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    /// Capture year within `[from, to]`; equality when both are the same.
    Years { from: i32, to: i32 },
    Weekdays { days: WeekdaySet },
    /// Capture hour within `[from_hour, to_hour]`, wrapping past midnight when `from_hour > to_hour`.
    TimeOfDay { from_hour: u8, to_hour: u8 },
    /// Only these frames.
    Include { frames: BTreeSet<FrameId> },
    /// Never these frames.
    Exclude { frames: BTreeSet<FrameId> },
    /// Only frames of these videos.
    Videos { videos: BTreeSet<VideoId> },
}

impl Filter {
    #[must_use]
    pub fn year(year: i32) -> Self {
        Self::Years {
            from: year,
            to: year,
        }
    }

    #[must_use]
    pub fn matches(&self, frame_id: FrameId, meta: &FrameMeta) -> bool {
        match self {
            Self::Years { from, to } => meta
                .calendar()
                .is_some_and(|cal| (*from..=*to).contains(&cal.year)),
            Self::Weekdays { days } => meta.calendar().is_some_and(|cal| days.contains(cal.weekday)),
            Self::TimeOfDay { from_hour, to_hour } => meta.calendar().is_some_and(|cal| {
                if from_hour <= to_hour {
                    (*from_hour..=*to_hour).contains(&cal.hour)
                } else {
                    cal.hour >= *from_hour || cal.hour <= *to_hour
                }
            }),
            Self::Include { frames } => frames.contains(&frame_id),
            Self::Exclude { frames } => !frames.contains(&frame_id),
            Self::Videos { videos } => videos.contains(&meta.video_id),
        }
    }
}

/// Conjunction of filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    #[must_use]
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    #[must_use]
    pub fn builder() -> FilterSetBuilder {
        FilterSetBuilder::default()
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    #[must_use]
    pub fn matches(&self, frame_id: FrameId, meta: &FrameMeta) -> bool {
        self.filters.iter().all(|f| f.matches(frame_id, meta))
    }

    /// Candidate mask over the whole store.
    #[must_use]
    pub fn candidate_mask(&self, store: &FeatureStore) -> CandidateMask {
        let mut mask = CandidateMask::all(store.len());
        self.apply(store, &mut mask);
        mask
    }

    /// Narrows an existing mask; applying the same set again changes nothing.
    pub fn apply(&self, store: &FeatureStore, mask: &mut CandidateMask) {
        if self.filters.is_empty() {
            return;
        }
        for (idx, meta) in store.frames().iter().enumerate() {
            if mask.bits.get(idx).copied().unwrap_or(false)
                && !self.matches(idx as FrameId, meta)
            {
                mask.bits[idx] = false;
                mask.count -= 1;
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterSetBuilder {
    inner: FilterSet,
}

impl FilterSetBuilder {
    #[must_use]
    pub fn years(mut self, from: i32, to: i32) -> Self {
        self.inner.push(Filter::Years { from, to });
        self
    }

    #[must_use]
    pub fn weekdays(mut self, days: WeekdaySet) -> Self {
        self.inner.push(Filter::Weekdays { days });
        self
    }

    #[must_use]
    pub fn time_of_day(mut self, from_hour: u8, to_hour: u8) -> Self {
        self.inner.push(Filter::TimeOfDay { from_hour, to_hour });
        self
    }

    #[must_use]
    pub fn include<I: IntoIterator<Item = FrameId>>(mut self, frames: I) -> Self {
        self.inner.push(Filter::Include {
            frames: frames.into_iter().collect(),
        });
        self
    }

    #[must_use]
    pub fn exclude<I: IntoIterator<Item = FrameId>>(mut self, frames: I) -> Self {
        self.inner.push(Filter::Exclude {
            frames: frames.into_iter().collect(),
        });
        self
    }

    #[must_use]
    pub fn videos<I: IntoIterator<Item = VideoId>>(mut self, videos: I) -> Self {
        self.inner.push(Filter::Videos {
            videos: videos.into_iter().collect(),
        });
        self
    }

    #[must_use]
    pub fn build(self) -> FilterSet {
        self.inner
    }
}

/// Dense eligibility flags over the frame table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMask {
    bits: Vec<bool>,
    count: usize,
}

impl CandidateMask {
    #[must_use]
    pub fn all(len: usize) -> Self {
        Self {
            bits: vec![true; len],
            count: len,
        }
    }

    #[must_use]
    pub fn none(len: usize) -> Self {
        Self {
            bits: vec![false; len],
            count: 0,
        }
    }

    /// Mask admitting only `ids`; ids beyond `len` are ignored.
    #[must_use]
    pub fn from_ids<I: IntoIterator<Item = FrameId>>(len: usize, ids: I) -> Self {
        let mut mask = Self::none(len);
        for id in ids {
            if let Some(bit) = mask.bits.get_mut(id as usize) {
                if !*bit {
                    *bit = true;
                    mask.count += 1;
                }
            }
        }
        mask
    }

    /// Size of the frame table the mask was built for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Number of admitted frames.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn contains(&self, frame_id: FrameId) -> bool {
        self.bits.get(frame_id as usize).copied().unwrap_or(false)
    }

    pub fn ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, bit)| **bit)
            .map(|(idx, _)| idx as FrameId)
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let bits: Vec<bool> = self
            .bits
            .iter()
            .zip(&other.bits)
            .map(|(a, b)| *a && *b)
            .collect();
        let count = bits.iter().filter(|b| **b).count();
        Self { bits, count }
    }
}
