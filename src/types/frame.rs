//! Frame metadata held in the feature store's frame table.

use chrono::{DateTime, Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use super::common::{ShotId, VideoId};

/// Immutable identity and capture information of a single frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMeta {
    pub video_id: VideoId,
    #[serde(default)]
    pub shot_id: ShotId,
    /// Position of the frame inside its video.
    pub frame_number: u32,
    /// Capture time in seconds since the epoch, expressed in capture-local time.
    pub timestamp: i64,
    /// Lifelog image identifier, when the collection provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsc_id: Option<String>,
}

impl FrameMeta {
    #[must_use]
    pub fn new(video_id: VideoId, frame_number: u32, timestamp: i64) -> Self {
        Self {
            video_id,
            shot_id: 0,
            frame_number,
            timestamp,
            lsc_id: None,
        }
    }

    #[must_use]
    pub fn with_shot(mut self, shot_id: ShotId) -> Self {
        self.shot_id = shot_id;
        self
    }

    #[must_use]
    pub fn with_lsc_id(mut self, lsc_id: impl Into<String>) -> Self {
        self.lsc_id = Some(lsc_id.into());
        self
    }

    /// Calendar fields of the capture time, `None` when the timestamp is out of range.
    #[must_use]
    pub fn calendar(&self) -> Option<CaptureCalendar> {
        let naive = DateTime::from_timestamp(self.timestamp, 0)?.naive_utc();
        Some(CaptureCalendar {
            year: naive.year(),
            weekday: naive.weekday(),
            hour: naive.hour() as u8,
        })
    }
}

/// Calendar view of a capture timestamp used by the attribute filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureCalendar {
    pub year: i32,
    pub weekday: Weekday,
    pub hour: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_fields_follow_timestamp() {
        // 2019-03-05 14:20:00, a Tuesday
        let meta = FrameMeta::new(0, 0, 1_551_795_600);
        let cal = meta.calendar().expect("timestamp in range");
        assert_eq!(cal.year, 2019);
        assert_eq!(cal.weekday, Weekday::Tue);
        assert_eq!(cal.hour, 14);
    }

    #[test]
    fn out_of_range_timestamp_has_no_calendar() {
        let meta = FrameMeta::new(0, 0, i64::MAX);
        assert!(meta.calendar().is_none());
    }
}
