//! Sparse image header (C3): the fixed 64-byte header at the start of every
//! `.hds` compressed image file.

use nom::{
    bytes::complete::{tag, take},
    combinator::map,
    number::complete::{le_u32, le_u64},
    sequence::tuple,
    Finish, IResult,
};
use std::io::Read;

use super::SECTOR_SIZE;
use crate::error::{PhdiError, Result};

pub const HEADER_SIZE: usize = 64;
pub const SIGNATURE: &[u8; 16] = b"WithoutFreeSpace";
const EXTENDED_SIGNATURE: &[u8; 16] = b"WithouFreSpacExt";
const SUPPORTED_FORMAT_VERSION: u32 = 2;

/// Parsed and validated sparse image header (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseHeader {
    pub format_version: u32,
    pub block_size: u32,
    pub bat_entry_count: u32,
    pub sector_count: u64,
    pub data_start_sector: u32,
}

impl SparseHeader {
    /// Block size in bytes (`block_size` sectors × 512).
    pub fn block_size_bytes(&self) -> u64 {
        self.block_size as u64 * SECTOR_SIZE
    }

    /// Total image size in bytes as declared by the header.
    pub fn image_size_bytes(&self) -> u64 {
        self.sector_count * SECTOR_SIZE
    }

    /// Reads and validates the header from `reader` at its current position
    /// (the caller is expected to have already seeked to offset 0).
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buffer)?;
        Self::parse(&buffer)
    }

    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 16 {
            return Err(PhdiError::CorruptImage("sparse header truncated".into()));
        }
        if buffer[..16] == *EXTENDED_SIGNATURE {
            // Reserved variant; layout is not specified (spec.md §9 open question).
            return Err(PhdiError::UnsupportedFormat(
                "WithouFreSpacExt sparse images are not supported".into(),
            ));
        }

        let (_, header) = parse_header(buffer)
            .finish()
            .map_err(|e| PhdiError::CorruptImage(format!("sparse header: {e}")))?;

        if header.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(PhdiError::UnsupportedFormat(format!(
                "sparse image format version {} is not supported",
                header.format_version
            )));
        }
        if header.block_size == 0 {
            return Err(PhdiError::CorruptImage(
                "sparse image block size is zero".into(),
            ));
        }
        Ok(header)
    }
}

fn parse_header(buffer: &[u8]) -> IResult<&[u8], SparseHeader> {
    let (rest, _) = tag(SIGNATURE.as_slice())(buffer)?;

    map(
        tuple((
            le_u32, // format_version
            take(4usize), // number_of_heads (informational)
            take(4usize), // number_of_cylinders (informational)
            le_u32, // block_size
            le_u32, // bat_entry_count
            le_u64, // sector_count
            take(4usize), // in_use (informational)
            le_u32, // data_start_sector
            take(12usize), // reserved
        )),
        |(format_version, _, _, block_size, bat_entry_count, sector_count, _, data_start_sector, _)| {
            SparseHeader {
                format_version,
                block_size,
                bat_entry_count,
                sector_count,
                data_start_sector,
            }
        },
    )(rest)
}
