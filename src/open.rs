//! Disk-image opener (C12): turns a path to a `.phdi`/`.hdd` descriptor file
//! into a fully resolved [`ReadHandle`] (spec.md §4.9).

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{PhdiError, Result};
use crate::io::handle::{ReadHandle, ResolvedImage, SparseState};
use crate::io::{BlockCache, FilePool};
use crate::model::{DiskDescriptor, ImageKind};
use crate::sparse::{Bat, SparseHeader};
use crate::storage::ExtentTable;

/// Upper bound on the descriptor file itself; the descriptor is metadata, not
/// payload, so anything larger almost certainly isn't one (spec.md §4.9).
const MAX_DESCRIPTOR_BYTES: u64 = 16 * 1024 * 1024;

/// Tunables for a single open, carried on the handle rather than configured
/// globally (spec.md §5).
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub file_pool_capacity: usize,
    pub cache_capacity_blocks: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            file_pool_capacity: crate::io::pool::DEFAULT_CAPACITY,
            cache_capacity_blocks: crate::io::cache::DEFAULT_CAPACITY,
        }
    }
}

/// Opens the descriptor at `descriptor_path` and resolves every extent's
/// image chain into a ready-to-read [`ReadHandle`].
pub fn open(descriptor_path: &Path, options: &OpenOptions) -> Result<ReadHandle> {
    let descriptor_dir = descriptor_path.parent().unwrap_or_else(|| Path::new("."));
    let name_fallback = descriptor_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("disk");

    let xml_text = read_descriptor_text(descriptor_path)?;
    let mut descriptor = DiskDescriptor::parse(&xml_text, name_fallback)?;
    let extents = ExtentTable::build(&descriptor)?;

    let mut chains = Vec::with_capacity(extents.len());
    for extent in extents.iter() {
        chains.push(resolve_image_chain(descriptor_dir, &extent.image_chain)?);
    }

    let mut snapshots: Vec<_> = descriptor.snapshots.drain().map(|(_, s)| s).collect();
    snapshots.sort_by_key(|s| s.identifier);

    debug!(
        "opened '{}': {} bytes, {} extent(s), {} snapshot(s)",
        descriptor.name,
        descriptor.media_size,
        extents.len(),
        snapshots.len()
    );

    Ok(ReadHandle::new(
        descriptor.name,
        descriptor.media_size,
        extents,
        chains,
        snapshots,
        FilePool::new(options.file_pool_capacity),
        BlockCache::new(options.cache_capacity_blocks),
    ))
}

/// The literal signature spec.md §4.9/§8 names: the descriptor's first 5
/// bytes must equal this exactly, or `open` fails with `UnsupportedFormat`
/// before any parsing is attempted.
const XML_SIGNATURE: &[u8; 5] = b"<?xml";

fn read_descriptor_text(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;

    let mut probe = [0u8; 5];
    let probed = file.read(&mut probe)?;
    if &probe[..probed] != XML_SIGNATURE.as_slice() {
        return Err(PhdiError::UnsupportedFormat(
            "descriptor file does not begin with the '<?xml' signature".into(),
        ));
    }

    let len = file.metadata()?.len();
    if len > MAX_DESCRIPTOR_BYTES {
        return Err(PhdiError::CorruptImage(format!(
            "descriptor exceeds the {MAX_DESCRIPTOR_BYTES}-byte bound"
        )));
    }

    let mut text = String::new();
    File::open(path)?.read_to_string(&mut text).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            PhdiError::MalformedXml {
                offset: 0,
                detail: "descriptor is not valid UTF-8".into(),
            }
        } else {
            PhdiError::Io(e)
        }
    })?;
    Ok(text)
}

fn resolve_image_chain(
    descriptor_dir: &Path,
    chain: &[crate::model::Image],
) -> Result<Vec<ResolvedImage>> {
    let mut resolved = Vec::with_capacity(chain.len());
    for image in chain {
        let path: PathBuf = descriptor_dir.join(&image.filename);
        let resolved_image = match image.kind {
            ImageKind::Plain => {
                let size_bytes = std::fs::metadata(&path)?.len();
                ResolvedImage {
                    path,
                    kind: ImageKind::Plain,
                    size_bytes,
                    sparse: None,
                }
            }
            ImageKind::Compressed => {
                let mut file = File::open(&path)?;
                let header = SparseHeader::read_from(&mut file)?;
                let file_size = file.metadata()?.len();
                let bat = Bat::load(&mut file, &header, file_size)?;
                ResolvedImage {
                    path,
                    kind: ImageKind::Compressed,
                    size_bytes: header.image_size_bytes(),
                    sparse: Some(SparseState { bat }),
                }
            }
        };
        resolved.push(resolved_image);
    }

    // Invariant 2 (spec.md §3): each ancestor must be at least as large as
    // the child whose holes it may be asked to fill.
    for pair in resolved.windows(2) {
        if pair[1].size_bytes < pair[0].size_bytes {
            return Err(PhdiError::CorruptImage(format!(
                "parent image '{}' ({} bytes) is smaller than child '{}' ({} bytes)",
                pair[1].path.display(),
                pair[1].size_bytes,
                pair[0].path.display(),
                pair[0].size_bytes
            )));
        }
    }

    Ok(resolved)
}
