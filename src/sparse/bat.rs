//! Block allocation table (C4): the array of 32-bit sector offsets that
//! follows the sparse image header.

use std::io::{Read, Seek, SeekFrom};

use super::{header::HEADER_SIZE, SparseHeader, SECTOR_SIZE};
use crate::error::{PhdiError, Result};

/// A loaded, validated block allocation table.
#[derive(Debug, Clone)]
pub struct Bat {
    entries: Vec<u32>,
    block_bytes: u64,
}

impl Bat {
    /// Loads the BAT immediately following `header` and validates every
    /// entry against `file_size` (spec.md §3 invariant 3).
    pub fn load<R: Read + Seek>(reader: &mut R, header: &SparseHeader, file_size: u64) -> Result<Self> {
        let entry_count = header.bat_entry_count as usize;
        let byte_len = entry_count
            .checked_mul(4)
            .ok_or_else(|| PhdiError::CorruptImage("BAT entry count overflow".into()))?;

        reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        let mut raw = vec![0u8; byte_len];
        reader.read_exact(&mut raw)?;

        let block_bytes = header.block_size_bytes();
        let mut entries = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let sector = crate::bytes::read_u32_le(&raw, i * 4)?;
            if sector != 0 {
                if (sector as u64) < header.data_start_sector as u64 {
                    return Err(PhdiError::CorruptImage(format!(
                        "BAT entry {sector} precedes data_start_sector {}",
                        header.data_start_sector
                    )));
                }
                let block_end = sector as u64 * SECTOR_SIZE + block_bytes;
                if block_end > file_size {
                    return Err(PhdiError::CorruptImage(format!(
                        "BAT entry {sector} block extends past end of file ({file_size} bytes)"
                    )));
                }
            }
            entries.push(sector);
        }

        let min_size = HEADER_SIZE as u64
            + byte_len as u64
            + header.data_start_sector as u64 * SECTOR_SIZE;
        if file_size < min_size {
            return Err(PhdiError::CorruptImage(format!(
                "sparse image file is smaller than header+BAT+data_start ({min_size} bytes)"
            )));
        }

        Ok(Bat { entries, block_bytes })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn block_bytes(&self) -> u64 {
        self.block_bytes
    }

    /// Starting sector of `block_index`, or `None` if the block is a hole.
    pub fn get(&self, block_index: u32) -> Option<u32> {
        match self.entries.get(block_index as usize) {
            Some(&0) | None => None,
            Some(&sector) => Some(sector),
        }
    }

    /// Iterates `(block_index, sector)` pairs for every allocated block, in
    /// index order. Used by the CLI's verbose occupancy report.
    pub fn iter_allocated(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, &sector)| sector != 0)
            .map(|(i, &sector)| (i as u32, sector))
    }
}

/// Lets other modules' tests (the read pipeline) build a `Bat` directly from
/// sector entries without constructing a full on-disk sparse image.
#[cfg(test)]
pub(crate) mod test_support {
    use super::Bat;

    pub fn from_entries(entries: Vec<u32>, block_bytes: u64) -> Bat {
        Bat { entries, block_bytes }
    }
}
