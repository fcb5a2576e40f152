//! Byte-stream primitives (C1): little-endian integer decode and bounded
//! slicing helpers shared by the sparse header, BAT, and any other
//! fixed-layout binary structure.

use crate::error::PhdiError;

/// Reads a little-endian `u32` out of `buf` at `offset`, bounds-checked.
pub fn read_u32_le(buf: &[u8], offset: usize) -> crate::error::Result<u32> {
    let bytes = read_fixed::<4>(buf, offset)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Reads a little-endian `u64` out of `buf` at `offset`, bounds-checked.
pub fn read_u64_le(buf: &[u8], offset: usize) -> crate::error::Result<u64> {
    let bytes = read_fixed::<8>(buf, offset)?;
    Ok(u64::from_le_bytes(bytes))
}

/// Copies `N` bytes out of `buf` starting at `offset`.
pub fn read_fixed<const N: usize>(buf: &[u8], offset: usize) -> crate::error::Result<[u8; N]> {
    let end = offset
        .checked_add(N)
        .ok_or_else(|| PhdiError::InvalidArgument("offset overflow".into()))?;
    if end > buf.len() {
        return Err(PhdiError::CorruptImage(format!(
            "buffer too short: need {end} bytes, have {}",
            buf.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..end]);
    Ok(out)
}

/// Returns a sub-slice `buf[offset..offset+len]`, bounds-checked.
pub fn slice(buf: &[u8], offset: usize, len: usize) -> crate::error::Result<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| PhdiError::InvalidArgument("offset overflow".into()))?;
    buf.get(offset..end)
        .ok_or_else(|| PhdiError::CorruptImage(format!("buffer too short for range {offset}..{end}")))
}
