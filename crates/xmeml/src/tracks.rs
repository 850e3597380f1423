use thiserror::Error;
use timeline::{ClipSpan, FrameSpan, MediaKind, PackedTrack, TimelineError};
use tracing::warn;

use crate::{Element, XmemlError};

const TRACK: &str = "track";
const CLIPITEM: &str = "clipitem";

/// A `<clipitem>` moved out of its original track, with its bounds.
pub type ClipItem = ClipSpan<Element>;

#[derive(Debug)]
pub struct Extraction {
    pub original_tracks: usize,
    pub clips: Vec<ClipItem>,
    pub skipped: usize,
}

/// Why a clip item could not be placed on the timeline.
#[derive(Debug, Error)]
pub enum ClipBoundsError {
    #[error("missing <{0}>")]
    Missing(&'static str),
    #[error("<{field}> is not an integer: {value:?}")]
    NotAnInteger { field: &'static str, value: String },
    #[error("unreadable <{field}>: {source}")]
    Unreadable {
        field: &'static str,
        source: XmemlError,
    },
    #[error(transparent)]
    Span(#[from] TimelineError),
}

/// Detach every track from `section` and pull out its clip items.
///
/// Clip items whose bounds cannot be read are logged and dropped along with
/// the rest of their original track.
pub fn extract_clips(section: &mut Element, kind: MediaKind) -> Extraction {
    let tracks = section.take_children_named(TRACK);
    let original_tracks = tracks.len();
    let mut clips = Vec::new();
    let mut skipped = 0;

    for track in tracks {
        for clipitem in track.into_children_named(CLIPITEM) {
            match clip_bounds(&clipitem) {
                Ok(span) => clips.push(ClipSpan::new(clipitem, span)),
                Err(e) => {
                    warn!(
                        "Skipping {} clip '{}': {}",
                        kind.section_tag(),
                        clip_label(&clipitem),
                        e
                    );
                    skipped += 1;
                }
            }
        }
    }

    Extraction {
        original_tracks,
        clips,
        skipped,
    }
}

/// Read `<start>` and `<end>` of a clip item.
pub fn clip_bounds(clipitem: &Element) -> Result<FrameSpan, ClipBoundsError> {
    let start = frame_field(clipitem, "start")?;
    let end = frame_field(clipitem, "end")?;
    Ok(FrameSpan::new(start, end)?)
}

fn frame_field(clipitem: &Element, field: &'static str) -> Result<i64, ClipBoundsError> {
    let text = clipitem
        .child_text(field)
        .ok_or(ClipBoundsError::Missing(field))?
        .map_err(|source| ClipBoundsError::Unreadable { field, source })?;
    let trimmed = text.trim();
    trimmed
        .parse::<i64>()
        .map_err(|_| ClipBoundsError::NotAnInteger {
            field,
            value: trimmed.to_string(),
        })
}

fn clip_label(clipitem: &Element) -> String {
    clipitem
        .child_text("name")
        .and_then(|name| name.ok())
        .or_else(|| clipitem.attribute("id"))
        .unwrap_or_else(|| "<unnamed>".to_string())
}

/// Replace the section's tracks with one fresh track per packed group.
///
/// New tracks carry `enabled=TRUE` and `locked=FALSE`; nothing is inherited
/// from the tracks they replace. Returns the number of tracks written.
pub fn rebuild_tracks(section: &mut Element, packed: Vec<PackedTrack<Element>>) -> usize {
    section.take_children_named(TRACK);

    let count = packed.len();
    for group in packed {
        let mut track = Element::new(TRACK);
        track.push_element(Element::with_text("enabled", "TRUE"));
        track.push_element(Element::with_text("locked", "FALSE"));
        for clipitem in group.into_contents() {
            track.push_element(clipitem);
        }
        section.push_element(track);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;
    use timeline::{pack_tracks, NoProgress};

    fn section(xml: &str) -> Element {
        Document::parse_str(xml).unwrap().root
    }

    fn ids(element: &Element) -> Vec<String> {
        element
            .children_named(CLIPITEM)
            .filter_map(|c| c.attribute("id"))
            .collect()
    }

    #[test]
    fn test_extract_flattens_tracks_in_order() {
        let mut video = section(
            r#"<video>
                <format/>
                <track>
                    <enabled>FALSE</enabled>
                    <clipitem id="a"><start>0</start><end>10</end></clipitem>
                    <clipitem id="c"><start> 20 </start><end>30</end></clipitem>
                </track>
                <track>
                    <clipitem id="b"><start>5</start><end>15</end></clipitem>
                </track>
            </video>"#,
        );

        let extraction = extract_clips(&mut video, MediaKind::Video);
        assert_eq!(extraction.original_tracks, 2);
        assert_eq!(extraction.skipped, 0);
        let found: Vec<_> = extraction
            .clips
            .iter()
            .map(|c| (c.content.attribute("id").unwrap(), c.start(), c.end()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("a".to_string(), 0, 10),
                ("c".to_string(), 20, 30),
                ("b".to_string(), 5, 15)
            ]
        );
        assert!(video.child(TRACK).is_none());
        assert!(video.child("format").is_some());
    }

    #[test]
    fn test_bad_bounds_are_skipped() {
        let mut audio = section(
            r#"<audio><track>
                <clipitem id="no-end"><start>0</start></clipitem>
                <clipitem id="no-start"><end>5</end></clipitem>
                <clipitem id="text"><name>Voice</name><start>zero</start><end>5</end></clipitem>
                <clipitem id="empty"><start>7</start><end>7</end></clipitem>
                <clipitem id="reversed"><start>9</start><end>3</end></clipitem>
                <clipitem id="ok"><start>-1</start><end>40</end></clipitem>
                <transitionitem><start>30</start><end>40</end></transitionitem>
            </track></audio>"#,
        );

        let extraction = extract_clips(&mut audio, MediaKind::Audio);
        assert_eq!(extraction.original_tracks, 1);
        assert_eq!(extraction.skipped, 5);
        assert_eq!(extraction.clips.len(), 1);
        assert_eq!(extraction.clips[0].span, FrameSpan { start: -1, end: 40 });
    }

    #[test]
    fn test_clip_bounds_errors() {
        let clip = section("<clipitem><start>1</start></clipitem>");
        assert!(matches!(clip_bounds(&clip), Err(ClipBoundsError::Missing("end"))));

        let clip = section("<clipitem><start>1.5</start><end>3</end></clipitem>");
        let err = clip_bounds(&clip).unwrap_err();
        assert_eq!(err.to_string(), "<start> is not an integer: \"1.5\"");
    }

    #[test]
    fn test_clip_label_fallbacks() {
        assert_eq!(clip_label(&section("<clipitem><name>Intro</name></clipitem>")), "Intro");
        assert_eq!(clip_label(&section(r#"<clipitem id="clip-7"/>"#)), "clip-7");
        assert_eq!(clip_label(&section("<clipitem/>")), "<unnamed>");
    }

    #[test]
    fn test_rebuild_writes_fresh_tracks() {
        let mut video = section(
            r#"<video><track><locked>TRUE</locked>
                <clipitem id="a"><start>0</start><end>10</end><filter><effect/></filter></clipitem>
                <clipitem id="c"><start>20</start><end>30</end></clipitem>
            </track><track>
                <clipitem id="b"><start>5</start><end>15</end></clipitem>
            </track></video>"#,
        );
        let original_a = video.elements().next().unwrap().child(CLIPITEM).unwrap().clone();

        let extraction = extract_clips(&mut video, MediaKind::Video);
        let packed = pack_tracks(extraction.clips, &mut NoProgress);
        assert_eq!(rebuild_tracks(&mut video, packed), 2);

        let tracks: Vec<&Element> = video.children_named(TRACK).collect();
        assert_eq!(tracks.len(), 2);
        assert_eq!(ids(tracks[0]), vec!["a", "c"]);
        assert_eq!(ids(tracks[1]), vec!["b"]);

        for track in &tracks {
            let names: Vec<&str> = track.elements().map(|e| e.name.as_str()).take(2).collect();
            assert_eq!(names, vec!["enabled", "locked"]);
            assert_eq!(track.child_text("enabled").unwrap().unwrap(), "TRUE");
            assert_eq!(track.child_text("locked").unwrap().unwrap(), "FALSE");
        }

        // Clip content travels untouched
        assert_eq!(tracks[0].child(CLIPITEM).unwrap(), &original_a);
    }

    #[test]
    fn test_rebuild_with_nothing_clears_section() {
        let mut audio = section("<audio><track><enabled>TRUE</enabled></track><track/></audio>");
        let extraction = extract_clips(&mut audio, MediaKind::Audio);
        assert_eq!(extraction.original_tracks, 2);
        assert!(extraction.clips.is_empty());

        let packed = pack_tracks(extraction.clips, &mut NoProgress);
        assert_eq!(rebuild_tracks(&mut audio, packed), 0);
        assert!(audio.children.is_empty());
    }
}
