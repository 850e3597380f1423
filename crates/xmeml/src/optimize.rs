//! Track optimization driver: extract, pack and rebuild each requested media
//! section, then write the document back out.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use timeline::{pack_tracks, MediaKind, ProgressBand, ProgressSink};
use tracing::{info, warn};

use crate::section::{media_mut, section_mut};
use crate::tracks::{extract_clips, rebuild_tracks};
use crate::{Document, Element, Result, XmemlError};

/// Share of the overall progress scale given to each media kind.
const KIND_SPAN: f64 = 40.0;
/// Reported once all sections are rebuilt, just before the file is written.
const BEFORE_WRITE: f64 = 90.0;
const DONE: f64 = 100.0;

/// Which media sections to repack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OptimizeOptions {
    pub video: bool,
    pub audio: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

impl OptimizeOptions {
    pub fn includes(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Video => self.video,
            MediaKind::Audio => self.audio,
        }
    }

    /// Enabled kinds, video first.
    pub fn kinds(&self) -> impl Iterator<Item = MediaKind> + '_ {
        MediaKind::ALL.into_iter().filter(|kind| self.includes(*kind))
    }

    pub fn is_empty(&self) -> bool {
        !self.video && !self.audio
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackCounts {
    pub original: usize,
    pub optimized: usize,
    pub skipped_clips: usize,
}

/// Before/after track counts. Kinds that were not processed stay at zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptimizeReport {
    pub video: TrackCounts,
    pub audio: TrackCounts,
}

impl OptimizeReport {
    pub fn counts(&self, kind: MediaKind) -> &TrackCounts {
        match kind {
            MediaKind::Video => &self.video,
            MediaKind::Audio => &self.audio,
        }
    }

    fn counts_mut(&mut self, kind: MediaKind) -> &mut TrackCounts {
        match kind {
            MediaKind::Video => &mut self.video,
            MediaKind::Audio => &mut self.audio,
        }
    }
}

/// Repack one media section in place.
///
/// `progress` sees the packer's own 0–100 signal.
pub fn optimize_section(
    section: &mut Element,
    kind: MediaKind,
    progress: &mut dyn ProgressSink,
) -> TrackCounts {
    let extraction = extract_clips(section, kind);
    if extraction.clips.is_empty() {
        warn!("No {} clips to optimize", kind.section_tag());
    }

    let packed = pack_tracks(extraction.clips, progress);
    let optimized = rebuild_tracks(section, packed);

    TrackCounts {
        original: extraction.original_tracks,
        optimized,
        skipped_clips: extraction.skipped,
    }
}

/// Repack every requested section of `document`.
///
/// Each kind reports into its own 40-point band of `progress`, video first.
/// Fails without touching any section when `sequence/media` is absent.
pub fn optimize_document(
    document: &mut Document,
    options: OptimizeOptions,
    progress: &mut dyn ProgressSink,
) -> Result<OptimizeReport> {
    let media = media_mut(&mut document.root)?;
    let mut report = OptimizeReport::default();
    let mut band = ProgressBand::new(0.0, KIND_SPAN);

    for kind in options.kinds() {
        info!("Optimizing {} tracks...", kind.section_tag());

        let counts = match section_mut(media, kind) {
            Some(section) => optimize_section(section, kind, &mut band.scope(progress)),
            None => {
                warn!("'{}' section not found, skipping", kind.section_tag());
                TrackCounts::default()
            }
        };

        info!(
            "{}: {} original tracks, {} optimized",
            kind, counts.original, counts.optimized
        );
        *report.counts_mut(kind) = counts;
        band = ProgressBand::new(band.end(), KIND_SPAN);
    }

    Ok(report)
}

/// Read `input`, repack the requested sections and write the result to
/// `output`.
///
/// Progress ends at exactly 100 once the file is written. On any failure the
/// last value reported is 0. Nothing is written until every section has been
/// rebuilt and the whole document serialized.
pub fn process(
    input: &Path,
    output: &Path,
    options: OptimizeOptions,
    progress: &mut dyn ProgressSink,
) -> Result<OptimizeReport> {
    match run(input, output, options, &mut *progress) {
        Ok(report) => Ok(report),
        Err(e) => {
            progress.report(0.0);
            Err(e)
        }
    }
}

fn run(
    input: &Path,
    output: &Path,
    options: OptimizeOptions,
    progress: &mut dyn ProgressSink,
) -> Result<OptimizeReport> {
    let raw = fs::read(input).map_err(|source| XmemlError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let mut document = Document::parse_bytes(&raw)?;

    let report = optimize_document(&mut document, options, &mut *progress)?;

    progress.report(BEFORE_WRITE);
    let bytes = document.to_bytes()?;
    fs::write(output, bytes).map_err(|source| XmemlError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    progress.report(DONE);

    info!("Optimized timeline written to {}", output.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline::NoProgress;

    const TIMELINE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE xmeml>
<xmeml version="5">
  <sequence>
    <media>
      <video>
        <track>
          <clipitem id="v1"><start>0</start><end>10</end></clipitem>
        </track>
        <track>
          <clipitem id="v2"><start>10</start><end>20</end></clipitem>
        </track>
      </video>
      <audio>
        <track>
          <clipitem id="a1"><start>0</start><end>10</end></clipitem>
          <clipitem id="a3"><start>20</start><end>30</end></clipitem>
        </track>
        <track>
          <clipitem id="a2"><start>5</start><end>15</end></clipitem>
        </track>
        <track/>
      </audio>
    </media>
  </sequence>
</xmeml>
"#;

    fn optimize(options: OptimizeOptions) -> (Document, OptimizeReport, Vec<f64>) {
        let mut doc = Document::parse_str(TIMELINE).unwrap();
        let mut seen = Vec::new();
        let report = optimize_document(&mut doc, options, &mut |p: f64| seen.push(p)).unwrap();
        (doc, report, seen)
    }

    #[test]
    fn test_both_kinds() {
        let (_, report, seen) = optimize(OptimizeOptions::default());
        assert_eq!(
            report.video,
            TrackCounts {
                original: 2,
                optimized: 1,
                skipped_clips: 0
            }
        );
        assert_eq!(report.audio.original, 3);
        assert_eq!(report.audio.optimized, 2);
        // Video clips fill [0,40], audio clips [40,80]
        assert_eq!(seen.len(), 5);
        assert_eq!(&seen[..2], &[20.0, 40.0]);
        assert!((seen[2] - (40.0 + 40.0 / 3.0)).abs() < 1e-9);
        assert!((seen[3] - (40.0 + 80.0 / 3.0)).abs() < 1e-9);
        assert_eq!(seen[4], 80.0);
    }

    #[test]
    fn test_audio_only_uses_first_band() {
        let (mut doc, report, seen) = optimize(OptimizeOptions {
            video: false,
            audio: true,
        });
        assert_eq!(report.video, TrackCounts::default());
        assert_eq!(seen.last(), Some(&40.0));

        // Video section left exactly as it was
        let media = media_mut(&mut doc.root).unwrap();
        assert_eq!(media.child("video").unwrap().children_named("track").count(), 2);
    }

    #[test]
    fn test_nothing_selected_changes_nothing() {
        let original = Document::parse_str(TIMELINE).unwrap();
        let (doc, report, seen) = optimize(OptimizeOptions {
            video: false,
            audio: false,
        });
        assert_eq!(report, OptimizeReport::default());
        assert!(seen.is_empty());
        assert_eq!(doc, original);
    }

    #[test]
    fn test_missing_section_is_skipped() {
        let mut doc =
            Document::parse_str("<xmeml><sequence><media><video/></media></sequence></xmeml>")
                .unwrap();
        let report =
            optimize_document(&mut doc, OptimizeOptions::default(), &mut NoProgress).unwrap();
        assert_eq!(report, OptimizeReport::default());
    }

    #[test]
    fn test_missing_media_fails_before_changes() {
        let mut doc = Document::parse_str("<xmeml><sequence><video><track/></video></sequence></xmeml>")
            .unwrap();
        let before = doc.clone();
        let err = optimize_document(&mut doc, OptimizeOptions::default(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, XmemlError::MissingElement { .. }));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_options_kinds_order() {
        let kinds: Vec<_> = OptimizeOptions::default().kinds().collect();
        assert_eq!(kinds, vec![MediaKind::Video, MediaKind::Audio]);
        assert!(OptimizeOptions {
            video: false,
            audio: false
        }
        .is_empty());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: OptimizeOptions = serde_json::from_str(r#"{"audio": false}"#).unwrap();
        assert_eq!(
            options,
            OptimizeOptions {
                video: true,
                audio: false
            }
        );
    }
}
