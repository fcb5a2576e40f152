//! Public handle facade (C13): the one type applications hold. Wraps the
//! read pipeline behind a single `RwLock` so that opening/closing excludes
//! concurrent reads, while reads themselves proceed without blocking each
//! other (spec.md §5 - coarse locking in place of the source's many
//! per-object locks, noted as a deliberate simplification).

use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{PhdiError, Result};
use crate::io::handle::ReadHandle;
use crate::model::{Image, Snapshot};
use crate::open::{self, OpenOptions};
use crate::storage::{Extent, ExtentTable};

/// A PHDI disk image. Closed handles hold no file descriptors and answer
/// every accessor with `PhdiError::InvalidArgument`.
pub struct PhdiHandle {
    inner: RwLock<Option<ReadHandle>>,
    aborted: Arc<AtomicBool>,
}

impl PhdiHandle {
    /// Creates a handle with nothing open yet.
    pub fn new() -> Self {
        PhdiHandle {
            inner: RwLock::new(None),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Opens `descriptor_path` with default pool/cache capacities, replacing
    /// whatever was previously open.
    pub fn open(&self, descriptor_path: &Path) -> Result<()> {
        self.open_with(descriptor_path, &OpenOptions::default())
    }

    /// Opens `descriptor_path` with explicit pool/cache capacities, replacing
    /// whatever was previously open.
    pub fn open_with(&self, descriptor_path: &Path, options: &OpenOptions) -> Result<()> {
        let read_handle = open::open(descriptor_path, options)?;
        if self.aborted.load(Ordering::Acquire) {
            read_handle.signal_abort();
        }
        let mut slot = self.inner.write().expect("handle lock poisoned");
        *slot = Some(read_handle);
        Ok(())
    }

    /// Releases the open image, dropping the file pool and block cache.
    pub fn close(&self) {
        let mut slot = self.inner.write().expect("handle lock poisoned");
        *slot = None;
        self.aborted.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.inner.read().expect("handle lock poisoned").is_some()
    }

    pub fn name(&self) -> Result<String> {
        self.with_open(|h| Ok(h.name().to_string()))
    }

    pub fn media_size(&self) -> Result<u64> {
        self.with_open(|h| Ok(h.media_size()))
    }

    pub fn extent_count(&self) -> Result<usize> {
        self.with_open(|h| Ok(h.extents().len()))
    }

    pub fn offset(&self) -> Result<u64> {
        self.with_open(|h| Ok(h.offset()))
    }

    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        self.with_open(|h| h.seek(pos))
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_open(|h| h.read(buf))
    }

    pub fn read_at_offset(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.with_open(|h| h.read_at_offset(offset, buf))
    }

    pub fn extents(&self) -> Result<ExtentTable> {
        self.with_open(|h| Ok(h.extents().clone()))
    }

    /// The extent at `index` (spec.md §4.10 `extent_descriptor`).
    pub fn extent_descriptor(&self, index: usize) -> Result<Extent> {
        self.with_open(|h| {
            h.extents()
                .get(index)
                .cloned()
                .ok_or_else(|| PhdiError::InvalidArgument(format!("no extent at index {index}")))
        })
    }

    /// The `image_idx`th image in `extent_idx`'s chain, leaf-first (spec.md
    /// §4.10 `image_descriptor`).
    pub fn image_descriptor(&self, extent_idx: usize, image_idx: usize) -> Result<Image> {
        self.with_open(|h| {
            h.image_descriptor(extent_idx, image_idx).cloned().ok_or_else(|| {
                PhdiError::InvalidArgument(format!(
                    "no image at extent {extent_idx}, chain position {image_idx}"
                ))
            })
        })
    }

    pub fn snapshots_count(&self) -> Result<usize> {
        self.with_open(|h| Ok(h.snapshots().len()))
    }

    /// The snapshot at `index`, ordered by identifier (spec.md §4.10 `snapshot`).
    pub fn snapshot(&self, index: usize) -> Result<Snapshot> {
        self.with_open(|h| {
            h.snapshots()
                .get(index)
                .cloned()
                .ok_or_else(|| PhdiError::InvalidArgument(format!("no snapshot at index {index}")))
        })
    }

    /// Requests that any in-flight or future read return early. Takes the
    /// write lock, per spec.md §4.10 ("`open`, `close`, `signal_abort`
    /// acquire the write lock"): it excludes concurrent readers rather than
    /// racing them, the same as `open`/`close`.
    pub fn signal_abort(&self) {
        self.aborted.store(true, Ordering::Release);
        let guard = self.inner.write().expect("handle lock poisoned");
        if let Some(h) = guard.as_ref() {
            h.signal_abort();
        }
    }

    fn with_open<T>(&self, f: impl FnOnce(&ReadHandle) -> Result<T>) -> Result<T> {
        let guard = self.inner.read().expect("handle lock poisoned");
        match guard.as_ref() {
            Some(h) => f(h),
            None => Err(PhdiError::InvalidArgument("no image is open".into())),
        }
    }
}

impl Default for PhdiHandle {
    fn default() -> Self {
        Self::new()
    }
}
