//! File-IO handle pool (C9): opens backing image files lazily and keeps a
//! bounded, LRU-evicted set of open descriptors.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::Result;

pub const DEFAULT_CAPACITY: usize = 16;

struct Inner {
    files: HashMap<PathBuf, Arc<Mutex<File>>>,
    // Back = most recently used.
    recency: VecDeque<PathBuf>,
}

/// A bounded map from filename to an open readable file (spec.md §4.6).
/// Internally synchronised: `read_at` is safe to call from any thread.
pub struct FilePool {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl FilePool {
    pub fn new(capacity: usize) -> Self {
        FilePool {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                files: HashMap::new(),
                recency: VecDeque::new(),
            }),
        }
    }

    fn handle_for(&self, path: &Path) -> Result<Arc<Mutex<File>>> {
        let mut inner = self.inner.lock().expect("file pool mutex poisoned");

        if let Some(existing) = inner.files.get(path).cloned() {
            touch(&mut inner.recency, path);
            return Ok(existing);
        }

        let file = File::open(path)?;
        let handle = Arc::new(Mutex::new(file));
        inner.files.insert(path.to_path_buf(), handle.clone());
        inner.recency.push_back(path.to_path_buf());
        evict_excess(&mut inner, self.capacity);

        Ok(handle)
    }

    /// Positional read: opens `path` on miss, moves it to MRU on hit.
    pub fn read_at(&self, path: &Path, offset: u64, buf: &mut [u8]) -> Result<()> {
        let handle = self.handle_for(path)?;
        let mut file = handle.lock().expect("file handle mutex poisoned");
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Length in bytes of the file at `path`, opening it if necessary.
    pub fn file_len(&self, path: &Path) -> Result<u64> {
        let handle = self.handle_for(path)?;
        let file = handle.lock().expect("file handle mutex poisoned");
        Ok(file.metadata()?.len())
    }

    /// Releases every open descriptor.
    pub fn close_all(&self) {
        let mut inner = self.inner.lock().expect("file pool mutex poisoned");
        inner.files.clear();
        inner.recency.clear();
    }

    #[cfg(test)]
    fn open_count(&self) -> usize {
        self.inner.lock().unwrap().files.len()
    }
}

fn touch(recency: &mut VecDeque<PathBuf>, path: &Path) {
    if let Some(pos) = recency.iter().position(|p| p == path) {
        let entry = recency.remove(pos).unwrap();
        recency.push_back(entry);
    }
}

fn evict_excess(inner: &mut Inner, capacity: usize) {
    while inner.files.len() > capacity {
        if let Some(lru) = inner.recency.pop_front() {
            inner.files.remove(&lru);
        } else {
            break;
        }
    }
}
