//! Submission payload handed to evaluation-server transports.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{FrameId, FrameMeta, VideoId};

/// The minimal triple an evaluation server needs to judge an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionItem {
    pub frame_id: FrameId,
    pub video_id: VideoId,
    /// Frame index within the video.
    pub frame_number: u32,
    /// Capture time in seconds since the Unix epoch.
    pub timestamp: i64,
    /// Lifelog image identifier, when the dataset has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsc_id: Option<String>,
}

impl SubmissionItem {
    #[must_use]
    pub fn from_meta(frame_id: FrameId, meta: &FrameMeta) -> Self {
        Self {
            frame_id,
            video_id: meta.video_id,
            frame_number: meta.frame_number,
            timestamp: meta.timestamp,
            lsc_id: meta.lsc_id.clone(),
        }
    }

    /// One-based video id padded to five digits, as evaluation servers name videos.
    #[must_use]
    pub fn padded_video_id(&self) -> String {
        format!("{:05}", u64::from(self.video_id) + 1)
    }
}

/// Server judgement of a submitted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SubmissionVerdict {
    Correct,
    Wrong,
    /// Already submitted or otherwise not judged again.
    Indeterminate,
    /// Transport-specific answer the core does not interpret.
    Other { message: String },
}

impl SubmissionVerdict {
    #[must_use]
    pub fn is_correct(&self) -> bool {
        matches!(self, Self::Correct)
    }
}

/// Transport to an evaluation server.
pub trait SubmissionSink: Send + Sync {
    fn submit(&self, item: &SubmissionItem) -> Result<SubmissionVerdict>;
}
