use quick_xml::escape::EscapeError;
use quick_xml::events::attributes::AttrError;
use std::path::PathBuf;
use thiserror::Error;

pub mod document;
pub mod optimize;
pub mod section;
pub mod tracks;

pub use document::{detect_encoding, Declaration, Document, Element, Node};
pub use optimize::{optimize_document, optimize_section, process, OptimizeOptions, OptimizeReport, TrackCounts};
pub use section::{media_mut, section_mut, sequence_mut};
pub use tracks::{extract_clips, rebuild_tracks, ClipBoundsError, ClipItem, Extraction};

#[derive(Debug, Error)]
pub enum XmemlError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error at byte {position}: {source}")]
    Parse {
        position: u64,
        source: quick_xml::Error,
    },
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML attribute error: {0}")]
    Attribute(#[from] AttrError),
    #[error("XML escape error: {0}")]
    Escape(#[from] EscapeError),
    #[error("unsupported document encoding '{0}'")]
    UnsupportedEncoding(String),
    #[error("document is not valid {encoding}")]
    Decode { encoding: &'static str },
    #[error("invalid UTF-8 in document: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("document has no root element")]
    MissingRoot,
    #[error("document has more than one root element: <{0}>")]
    MultipleRoots(String),
    #[error("document ended inside <{0}>")]
    UnexpectedEof(String),
    #[error("'{path}' element not found")]
    MissingElement { path: &'static str },
}

pub type Result<T> = std::result::Result<T, XmemlError>;
