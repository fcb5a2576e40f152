//! Image values (C5): one backing file of one extent.

use std::fmt;
use uuid::Uuid;

/// PHDI's two on-disk image representations. "Compressed" is PHDI's name
/// for the sparse/BAT-backed format (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Plain,
    Compressed,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Plain => write!(f, "Plain"),
            ImageKind::Compressed => write!(f, "Compressed"),
        }
    }
}

/// One `<Image>` element: identifier, type, and the file it names.
#[derive(Debug, Clone)]
pub struct Image {
    pub identifier: Uuid,
    pub kind: ImageKind,
    /// Path relative to the directory containing the descriptor.
    pub filename: String,
}

impl Image {
    pub fn new(identifier: Uuid, kind: ImageKind, filename: String) -> Self {
        Image {
            identifier,
            kind,
            filename,
        }
    }
}
