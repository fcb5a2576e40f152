//! Logical-to-physical read pipeline (C11): the component that actually
//! turns a logical byte offset into bytes, walking extents and snapshot
//! chains and filling sparse holes with zero as it goes (spec.md §4.8).

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::{PhdiError, Result};
use crate::model::{ImageKind, Snapshot};
use crate::sparse::Bat;
use crate::storage::ExtentTable;

use super::{BlockCache, FilePool, ImageId};

/// A sparse image's loaded header-derived state: just the BAT, since the
/// header itself only exists to produce it and `block_bytes()`.
pub struct SparseState {
    pub bat: Bat,
}

/// One resolved link in an extent's image chain: where its bytes live and,
/// if it is a sparse image, its block allocation table.
pub struct ResolvedImage {
    pub path: PathBuf,
    pub kind: ImageKind,
    pub size_bytes: u64,
    pub sparse: Option<SparseState>,
}

/// The read pipeline for one open disk image. Built once by [`crate::open`]
/// and shared (read-only) for the handle's lifetime.
pub struct ReadHandle {
    name: String,
    media_size: u64,
    extents: ExtentTable,
    /// `chains[extent_index][chain_index]`, aligned with
    /// `extents.get(extent_index).image_chain`.
    chains: Vec<Vec<ResolvedImage>>,
    /// Every `<Shot>` in the descriptor, ordered by identifier for a stable
    /// enumeration order regardless of the XML document order or the
    /// snapshot hash map's iteration order (spec.md §4.10).
    snapshots: Vec<Snapshot>,
    pool: FilePool,
    cache: BlockCache,
    current_offset: Mutex<u64>,
    aborted: AtomicBool,
}

impl ReadHandle {
    pub fn new(
        name: String,
        media_size: u64,
        extents: ExtentTable,
        chains: Vec<Vec<ResolvedImage>>,
        snapshots: Vec<Snapshot>,
        pool: FilePool,
        cache: BlockCache,
    ) -> Self {
        ReadHandle {
            name,
            media_size,
            extents,
            chains,
            snapshots,
            pool,
            cache,
            current_offset: Mutex::new(0),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_size(&self) -> u64 {
        self.media_size
    }

    pub fn extents(&self) -> &ExtentTable {
        &self.extents
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// The image chain's element `image_idx` for `extent_idx`, matching
    /// `extents().get(extent_idx).image_chain[image_idx]` but validated as a
    /// single bounds-checked accessor (spec.md §4.10 `image_descriptor`).
    pub fn image_descriptor(&self, extent_idx: usize, image_idx: usize) -> Option<&crate::model::Image> {
        self.extents
            .get(extent_idx)?
            .image_chain
            .get(image_idx)
    }

    pub fn signal_abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn offset(&self) -> u64 {
        *self.current_offset.lock().expect("offset mutex poisoned")
    }

    /// Moves the handle's current offset. Seeking past the end of the media
    /// is legal (a subsequent `read` simply returns zero bytes); seeking
    /// before its start is `InvalidArgument`.
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        let mut offset = self.current_offset.lock().expect("offset mutex poisoned");
        let base: i128 = match pos {
            SeekFrom::Start(o) => o as i128,
            SeekFrom::Current(delta) => *offset as i128 + delta as i128,
            SeekFrom::End(delta) => self.media_size as i128 + delta as i128,
        };
        if base < 0 {
            return Err(PhdiError::InvalidArgument(
                "seek would move before the start of the media".into(),
            ));
        }
        *offset = base as u64;
        Ok(*offset)
    }

    /// Reads at the handle's current offset and advances it by the number of
    /// bytes actually read. Serialised on the offset mutex so that the
    /// fetch-read-advance sequence is atomic with respect to concurrent
    /// callers of `read` (spec.md §5); does not block `read_at_offset`.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = self.current_offset.lock().expect("offset mutex poisoned");
        let n = self.read_at_offset(*offset, buf)?;
        *offset += n as u64;
        Ok(n)
    }

    /// Positional read that never touches the handle's current offset, so it
    /// may run concurrently with other positional reads and with `read`.
    pub fn read_at_offset(&self, logical_offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || logical_offset >= self.media_size {
            return Ok(0);
        }

        let want = buf.len().min((self.media_size - logical_offset) as usize);
        let buf = &mut buf[..want];

        let mut produced = 0usize;
        while produced < buf.len() {
            if self.aborted.load(Ordering::Acquire) {
                if produced == 0 {
                    return Err(PhdiError::Aborted);
                }
                break;
            }

            let offset = logical_offset + produced as u64;
            let extent_index = self.extents.find_index(offset).ok_or_else(|| {
                PhdiError::CorruptImage(format!("no extent covers logical offset {offset}"))
            })?;
            let extent = self.extents.get(extent_index).expect("index from find_index");
            let local = offset - extent.start_offset as u64;
            let remaining_in_extent = (extent.size - local) as usize;
            let segment = &mut buf[produced..];
            let segment = &mut segment[..segment.len().min(remaining_in_extent)];

            let n = self.read_segment(extent_index, local, segment)?;
            if n == 0 {
                break;
            }
            produced += n;
        }

        Ok(produced)
    }

    /// Reads one contiguous run of bytes that share a single resolution
    /// (spec.md §4.8 steps 4-6): the first image in the chain that exposes
    /// `local`, and within it, the remainder of its current block (or, for a
    /// plain image, the remainder of the image).
    fn read_segment(&self, extent_index: usize, local: u64, buf: &mut [u8]) -> Result<usize> {
        let chain = &self.chains[extent_index];

        for (chain_index, image) in chain.iter().enumerate() {
            if local >= image.size_bytes {
                continue;
            }

            match &image.sparse {
                None => {
                    let avail = (image.size_bytes - local) as usize;
                    let n = buf.len().min(avail);
                    self.pool.read_at(&image.path, local, &mut buf[..n])?;
                    return Ok(n);
                }
                Some(sparse) => {
                    let block_bytes = sparse.bat.block_bytes();
                    let block_index = (local / block_bytes) as u32;
                    let block_offset = (local % block_bytes) as usize;
                    let avail_in_block = block_bytes as usize - block_offset;
                    let n = buf.len().min(avail_in_block);

                    match sparse.bat.get(block_index) {
                        Some(sector) => {
                            let id: ImageId = (extent_index, chain_index);
                            let block = self.load_block(id, image, sparse, block_index, sector)?;
                            buf[..n].copy_from_slice(&block[block_offset..block_offset + n]);
                            return Ok(n);
                        }
                        None if chain_index + 1 == chain.len() => {
                            buf[..n].iter_mut().for_each(|b| *b = 0);
                            return Ok(n);
                        }
                        None => continue,
                    }
                }
            }
        }

        // No image in the chain exposes this byte at all (spec.md §4.8 step 7).
        buf.iter_mut().for_each(|b| *b = 0);
        Ok(buf.len())
    }

    fn load_block(
        &self,
        id: ImageId,
        image: &ResolvedImage,
        sparse: &SparseState,
        block_index: u32,
        sector: u32,
    ) -> Result<Arc<[u8]>> {
        let key = (id, block_index);
        if let Some(block) = self.cache.get(key) {
            return Ok(block);
        }

        let block_bytes = sparse.bat.block_bytes() as usize;
        let mut raw = vec![0u8; block_bytes];
        self.pool
            .read_at(&image.path, sector as u64 * crate::sparse::SECTOR_SIZE, &mut raw)?;
        debug!("cache miss: loaded block {block_index} of {}", image.path.display());

        let block: Arc<[u8]> = Arc::from(raw);
        self.cache.insert(key, block.clone());
        Ok(block)
    }
}
