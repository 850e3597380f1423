//! Locating `sequence/media/{video,audio}` inside an xmeml document.

use timeline::MediaKind;

use crate::{Element, Result, XmemlError};

/// The sequence is normally a direct child of `<xmeml>`; project exports nest
/// it under `project/children`.
pub fn sequence_mut(root: &mut Element) -> Result<&mut Element> {
    let sequence = if root.child("sequence").is_some() {
        root.child_mut("sequence")
    } else {
        root.child_mut("project")
            .and_then(|project| project.child_mut("children"))
            .and_then(|children| children.child_mut("sequence"))
    };
    sequence.ok_or(XmemlError::MissingElement { path: "sequence" })
}

pub fn media_mut(root: &mut Element) -> Result<&mut Element> {
    sequence_mut(root)?
        .child_mut("media")
        .ok_or(XmemlError::MissingElement {
            path: "sequence/media",
        })
}

/// A missing section is not an error; the caller decides what to do.
pub fn section_mut(media: &mut Element, kind: MediaKind) -> Option<&mut Element> {
    media.child_mut(kind.section_tag())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;

    #[test]
    fn test_direct_sequence() {
        let mut doc =
            Document::parse_str("<xmeml><sequence><media><video/></media></sequence></xmeml>")
                .unwrap();
        let media = media_mut(&mut doc.root).unwrap();
        assert!(section_mut(media, MediaKind::Video).is_some());
        assert!(section_mut(media, MediaKind::Audio).is_none());
    }

    #[test]
    fn test_sequence_inside_project() {
        let mut doc = Document::parse_str(
            "<xmeml><project><children><sequence><media><audio/></media></sequence></children></project></xmeml>",
        )
        .unwrap();
        let media = media_mut(&mut doc.root).unwrap();
        assert!(section_mut(media, MediaKind::Audio).is_some());
    }

    #[test]
    fn test_missing_anchors() {
        let mut doc = Document::parse_str("<xmeml><project/></xmeml>").unwrap();
        assert!(matches!(
            sequence_mut(&mut doc.root),
            Err(XmemlError::MissingElement { path: "sequence" })
        ));

        let mut doc = Document::parse_str("<xmeml><sequence><name>x</name></sequence></xmeml>")
            .unwrap();
        let err = media_mut(&mut doc.root).unwrap_err();
        assert_eq!(err.to_string(), "'sequence/media' element not found");
    }
}
