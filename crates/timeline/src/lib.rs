use std::fmt;
use thiserror::Error;

mod packing;
pub use packing::*;
mod progress;
pub use progress::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
    #[error("invalid span: end {end} is not after start {start}")]
    InvalidSpan { start: Frame, end: Frame },
}

pub type Frame = i64; // project time base units, negatives allowed (xmeml uses -1)

/// Which kind of media a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Video, MediaKind::Audio];

    /// Element name of this kind's section inside `<media>`.
    pub fn section_tag(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// Half-open `[start, end)` interval on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpan {
    pub start: Frame,
    pub end: Frame,
}

impl FrameSpan {
    pub fn new(start: Frame, end: Frame) -> Result<Self, TimelineError> {
        if end <= start {
            return Err(TimelineError::InvalidSpan { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Frame {
        self.end - self.start
    }

    /// Two spans overlap unless one ends at or before the other starts.
    pub fn overlaps(&self, other: &FrameSpan) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }
}
