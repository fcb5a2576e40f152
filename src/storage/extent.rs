//! Extent table construction (C8): for each `<Storage>` block, walk the
//! snapshot chain from the top image down to its root, leaf-first.

use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{PhdiError, Result};
use crate::model::{DiskDescriptor, Image};

/// A contiguous logical byte range backed by a resolved image chain, leaf
/// (top image) first (spec.md §3).
#[derive(Debug, Clone)]
pub struct Extent {
    pub start_offset: i64,
    pub size: u64,
    pub image_chain: Vec<Image>,
}

impl Extent {
    pub fn contains(&self, logical_offset: u64) -> bool {
        let start = self.start_offset as u64;
        logical_offset >= start && logical_offset < start + self.size
    }
}

/// The disk's full, chain-resolved extent list, ordered by `start_offset`.
#[derive(Debug, Clone)]
pub struct ExtentTable {
    extents: Vec<Extent>,
}

impl ExtentTable {
    pub fn build(descriptor: &DiskDescriptor) -> Result<Self> {
        let mut extents = Vec::with_capacity(descriptor.storage.len());
        for block in &descriptor.storage {
            let image_chain = resolve_chain(descriptor, &block.images)?;
            extents.push(Extent {
                start_offset: block.start_offset as i64,
                size: block.size,
                image_chain,
            });
        }
        Ok(ExtentTable { extents })
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.extents.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Extent> {
        self.extents.get(index)
    }

    /// Binary-searches the extent containing `logical_offset` (spec.md §4.8
    /// step 3). Extents are ordered and non-overlapping, so this is a
    /// straightforward partition-point search.
    pub fn find(&self, logical_offset: u64) -> Option<&Extent> {
        self.find_index(logical_offset).map(|idx| &self.extents[idx])
    }

    pub fn find_index(&self, logical_offset: u64) -> Option<usize> {
        let idx = self
            .extents
            .partition_point(|e| (e.start_offset as u64) + e.size <= logical_offset);
        if self.extents.get(idx).is_some_and(|e| e.contains(logical_offset)) {
            Some(idx)
        } else {
            None
        }
    }
}

fn resolve_chain(descriptor: &DiskDescriptor, images: &[Image]) -> Result<Vec<Image>> {
    let mut current = match descriptor.top_snapshot_identifier {
        Some(guid) => guid,
        None => {
            if images.len() != 1 {
                return Err(PhdiError::MalformedDescriptor(
                    "extent has multiple images but no snapshot chain to order them".into(),
                ));
            }
            return Ok(vec![images[0].clone()]);
        }
    };

    let mut chain = Vec::new();
    let mut visited = HashSet::new();

    loop {
        if !visited.insert(current) {
            return Err(PhdiError::CycleDetected {
                guid: current.to_string(),
            });
        }

        let image = images
            .iter()
            .find(|img| img.identifier == current)
            .ok_or_else(|| PhdiError::DanglingReference {
                guid: current.to_string(),
            })?;
        chain.push(image.clone());

        match descriptor.snapshots.get(&current) {
            Some(snapshot) => match snapshot.parent_identifier {
                Some(parent) => current = parent,
                None => break,
            },
            None => break,
        }
    }

    Ok(chain)
}
