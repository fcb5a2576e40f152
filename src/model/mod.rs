//! Typed records parsed out of the disk descriptor: images (C5), snapshots
//! (C6), and the disk-descriptor model itself (C7).

pub mod descriptor;
pub mod image;
pub mod snapshot;

pub use descriptor::{DiskDescriptor, DiskGeometry};
pub use image::{Image, ImageKind};
pub use snapshot::Snapshot;

use uuid::Uuid;

/// Parses a `{8-4-4-4-12}`-form GUID string as it appears in descriptor XML.
/// Treated as the external primitive spec.md §9 names (`guid_from_string`).
pub fn parse_guid(text: &str) -> crate::error::Result<Uuid> {
    let trimmed = text.trim();
    Uuid::parse_str(trimmed).map_err(|e| {
        crate::error::PhdiError::MalformedDescriptor(format!("invalid GUID '{trimmed}': {e}"))
    })
}
