//! Greedy first-fit track packing.
//!
//! Clips are sorted by start (stable, so extraction order breaks ties) and each
//! one lands on the first existing track where it overlaps no member; otherwise
//! a new track is opened. This is not the optimal interval colouring, and the
//! resulting clip-to-track assignment is part of the observable output.

use tracing::debug;

use crate::{Frame, FrameSpan, ProgressSink};

/// A clip's owned content together with its timeline bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSpan<T> {
    pub content: T,
    pub span: FrameSpan,
}

impl<T> ClipSpan<T> {
    pub fn new(content: T, span: FrameSpan) -> Self {
        Self { content, span }
    }

    pub fn start(&self) -> Frame {
        self.span.start
    }

    pub fn end(&self) -> Frame {
        self.span.end
    }
}

/// One output lane: clips that are pairwise non-overlapping, ordered by start.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedTrack<T> {
    clips: Vec<ClipSpan<T>>,
}

impl<T> PackedTrack<T> {
    fn with_clip(clip: ClipSpan<T>) -> Self {
        Self { clips: vec![clip] }
    }

    /// True when `span` overlaps none of the clips already on this track.
    pub fn accepts(&self, span: &FrameSpan) -> bool {
        self.clips.iter().all(|existing| !existing.span.overlaps(span))
    }

    fn insert(&mut self, clip: ClipSpan<T>) {
        // Equal starts keep insertion order
        let at = self.clips.partition_point(|c| c.start() <= clip.start());
        self.clips.insert(at, clip);
    }

    pub fn clips(&self) -> &[ClipSpan<T>] {
        &self.clips
    }

    pub fn into_contents(self) -> impl Iterator<Item = T> {
        self.clips.into_iter().map(|c| c.content)
    }
}

/// Partition `clips` into non-overlapping tracks.
///
/// `progress` receives `(i + 1) / total * 100` once after each clip is placed.
/// An empty input yields no tracks and no progress calls.
pub fn pack_tracks<T>(
    mut clips: Vec<ClipSpan<T>>,
    progress: &mut dyn ProgressSink,
) -> Vec<PackedTrack<T>> {
    clips.sort_by_key(|c| c.start());

    let total = clips.len();
    let mut tracks: Vec<PackedTrack<T>> = Vec::new();

    for (index, clip) in clips.into_iter().enumerate() {
        match tracks.iter_mut().find(|t| t.accepts(&clip.span)) {
            Some(track) => track.insert(clip),
            None => {
                debug!(
                    "Opening track {} for clip [{}, {})",
                    tracks.len() + 1,
                    clip.start(),
                    clip.end()
                );
                tracks.push(PackedTrack::with_clip(clip));
            }
        }

        progress.report((index + 1) as f64 / total as f64 * 100.0);
    }

    tracks
}
