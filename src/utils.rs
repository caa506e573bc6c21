//! Utility functions for binary parsing, offsets and caller buffers.

use crate::error::{RegistryError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use std::io::Cursor;

/// Offset where hive bins start (after base block)
pub const HBIN_START_OFFSET: u32 = 0x1000;

/// Offset value used on disk for "no cell".
pub const INVALID_OFFSET: u32 = 0xFFFF_FFFF;

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01.
const FILETIME_UNIX_DIFF: i64 = 11_644_473_600;

fn truncated(data: &[u8], offset: usize, expected: usize) -> RegistryError {
    RegistryError::TruncatedData {
        offset: offset as u64,
        expected,
        actual: data.len().saturating_sub(offset),
    }
}

/// Reads a u16 from a byte slice at the given offset.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = data
        .get(offset..offset.saturating_add(2))
        .ok_or_else(|| truncated(data, offset, 2))?;
    Ok(Cursor::new(bytes).read_u16::<LittleEndian>()?)
}

/// Reads a u32 from a byte slice at the given offset.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = data
        .get(offset..offset.saturating_add(4))
        .ok_or_else(|| truncated(data, offset, 4))?;
    Ok(Cursor::new(bytes).read_u32::<LittleEndian>()?)
}

/// Reads an i32 from a byte slice at the given offset.
pub fn read_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    let bytes = data
        .get(offset..offset.saturating_add(4))
        .ok_or_else(|| truncated(data, offset, 4))?;
    Ok(Cursor::new(bytes).read_i32::<LittleEndian>()?)
}

/// Reads a u64 from a byte slice at the given offset.
pub fn read_u64_le(data: &[u8], offset: usize) -> Result<u64> {
    let bytes = data
        .get(offset..offset.saturating_add(8))
        .ok_or_else(|| truncated(data, offset, 8))?;
    Ok(Cursor::new(bytes).read_u64::<LittleEndian>()?)
}

/// Calculates XOR checksum for the first 508 bytes of the base block.
///
/// The on-disk format reserves two results: 0 is stored as 1 and
/// 0xFFFFFFFF as 0xFFFFFFFE.
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut checksum: u32 = 0;

    // XOR all DWORDs except the checksum field itself (at offset 0x1FC)
    for i in (0..0x1FC).step_by(4) {
        if let Ok(dword) = read_u32_le(data, i) {
            checksum ^= dword;
        }
    }

    match checksum {
        0 => 1,
        0xFFFF_FFFF => 0xFFFF_FFFE,
        other => other,
    }
}

/// Converts a relative cell offset to an absolute hive offset.
///
/// Cell offsets in the registry are relative to the first hbin (at 0x1000).
#[inline]
pub fn cell_offset_to_absolute(cell_offset: u32) -> u64 {
    u64::from(cell_offset) + u64::from(HBIN_START_OFFSET)
}

/// Converts an absolute hive offset to a relative cell offset.
///
/// # Errors
///
/// Returns `RegistryError::OffsetOutOfBounds` if the offset is before the
/// first hbin or does not fit a relative offset.
#[inline]
pub fn absolute_to_cell_offset(absolute_offset: u64) -> Result<u32> {
    absolute_offset
        .checked_sub(u64::from(HBIN_START_OFFSET))
        .and_then(|relative| u32::try_from(relative).ok())
        .ok_or(RegistryError::OffsetOutOfBounds {
            offset: absolute_offset.min(u64::from(u32::MAX)) as u32,
            bins_size: 0,
        })
}

/// Returns true if an on-disk pointer field means "no cell".
///
/// Only `0xFFFF_FFFF` is absent. Offset 0 lies inside the first bin header
/// and is followed like any other offset, so it surfaces as corruption.
#[inline]
pub fn is_absent(offset: u32) -> bool {
    offset == INVALID_OFFSET
}

/// Converts a Windows FILETIME to a UTC date time.
///
/// Returns `None` when the timestamp does not fit the chrono range.
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    let seconds = (filetime / 10_000_000) as i64 - FILETIME_UNIX_DIFF;
    let nanos = ((filetime % 10_000_000) * 100) as u32;

    DateTime::from_timestamp(seconds, nanos)
}

/// Copies `source` into the start of `buffer`.
///
/// Fails with `BufferTooSmall` without touching `buffer` when it cannot hold
/// all of `source`. Returns the number of elements written.
pub fn fill_buffer<T: Copy>(source: &[T], buffer: &mut [T]) -> Result<usize> {
    if buffer.len() < source.len() {
        return Err(RegistryError::BufferTooSmall {
            required: source.len(),
            provided: buffer.len(),
        });
    }
    buffer[..source.len()].copy_from_slice(source);
    Ok(source.len())
}
