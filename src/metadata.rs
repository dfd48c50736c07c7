//! Buffer metadata types.

use crate::format::VideoInfo;
use std::time::Duration;

/// Flags indicating buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Buffer is a keyframe or otherwise independently decodable.
    pub sync_point: bool,
    /// Buffer follows a gap in the stream (e.g. a dropped packet upstream).
    pub discont: bool,
    /// Buffer should be decoded but not emitted.
    pub decode_only: bool,
}

/// Metadata associated with a buffer.
///
/// Timing plus, for raw video, the frame description the payload follows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Presentation timestamp, as running time since the source started.
    pub pts: Option<Duration>,

    /// Duration of this buffer's content.
    pub duration: Option<Duration>,

    /// Monotonic sequence number within the track.
    pub sequence: u64,

    /// Frame layout when the payload is raw video.
    pub video: Option<VideoInfo>,

    /// Buffer flags.
    pub flags: BufferFlags,
}

impl Metadata {
    /// Create new metadata with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn with_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Attach a raw video description.
    pub fn with_video(mut self, info: VideoInfo) -> Self {
        self.video = Some(info);
        self
    }
}
