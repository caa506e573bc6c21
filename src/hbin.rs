//! Hive bin (hbin) parsing and cell resolution.
//!
//! Hive bins are 4KB-aligned blocks that follow the base block. Each bin has
//! a 32-byte header followed by size-prefixed cells. A negative size marks
//! an allocated cell, a positive size a free one.
//!
//! [`BinsIndex`] scans the bin headers once and then resolves relative
//! offsets into validated cells.

use crate::cell::CellType;
use crate::error::{RegistryError, Result};
use crate::header::BASE_BLOCK_SIZE;
use crate::source::ByteSource;
use crate::utils::{cell_offset_to_absolute, read_i32_le, read_u32_le, read_u64_le};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Expected signature for hive bins ("hbin").
pub const HBIN_SIGNATURE: &[u8; 4] = b"hbin";

/// Size of an hbin header.
pub const HBIN_HEADER_SIZE: usize = 0x20;

/// Bins are sized in multiples of this.
pub const HBIN_ALIGNMENT: u32 = 0x1000;

/// Smallest possible cell (size field plus a 4-byte payload).
const MIN_CELL_SIZE: u32 = 8;

/// Hive bin header structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HbinHeader {
    /// Offset of this hbin relative to the start of the hive bins.
    pub offset: u32,

    /// Size of this hbin in bytes (including header).
    pub size: u32,

    /// Timestamp (Windows FILETIME), only meaningful for the first bin.
    pub timestamp: u64,
}

impl HbinHeader {
    /// Parses an hbin header from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is too small, the signature is invalid,
    /// the stored offset does not match `expected_offset`, or the size is not
    /// a positive multiple of 4096.
    pub fn parse(data: &[u8], expected_offset: u32) -> Result<Self> {
        if data.len() < HBIN_HEADER_SIZE {
            return Err(RegistryError::TruncatedData {
                offset: u64::from(expected_offset),
                expected: HBIN_HEADER_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..4] != HBIN_SIGNATURE {
            return Err(RegistryError::invalid_signature(HBIN_SIGNATURE, &data[0..4]));
        }

        let offset = read_u32_le(data, 0x04)?;
        let size = read_u32_le(data, 0x08)?;

        if offset != expected_offset {
            return Err(RegistryError::malformed(
                expected_offset,
                format!("hbin offset mismatch: found {:#x}", offset),
            ));
        }

        if size == 0 || size % HBIN_ALIGNMENT != 0 {
            return Err(RegistryError::malformed(
                expected_offset,
                format!("hbin size {:#x} is not a multiple of {:#x}", size, HBIN_ALIGNMENT),
            ));
        }

        Ok(HbinHeader {
            offset,
            size,
            timestamp: read_u64_le(data, 0x14)?,
        })
    }

    /// Offset one past the last byte of this bin.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }

    /// Returns true if `offset` lies inside this bin (header included).
    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.offset && u64::from(offset) < self.end()
    }
}

/// A validated cell.
#[derive(Debug, Clone)]
pub struct CellView {
    /// Offset of this cell relative to the first hbin.
    pub offset: u32,

    /// Size of the cell including the size field.
    pub size: u32,

    /// False for free cells (positive size field).
    pub is_allocated: bool,

    /// Cell data (excluding the size field).
    pub data: Vec<u8>,
}

impl CellView {
    /// Returns the cell type from the first two data bytes, if recognized.
    pub fn cell_type(&self) -> Option<CellType> {
        CellType::from_cell_data(&self.data)
    }
}

/// Index of the hive bins, resolving offsets to cells.
pub struct BinsIndex {
    source: Arc<dyn ByteSource>,
    bins: Vec<HbinHeader>,
}

impl fmt::Debug for BinsIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinsIndex")
            .field("source_len", &self.source.len())
            .field("bins", &self.bins.len())
            .finish()
    }
}

/// Number of bytes after the base block that may hold bins.
///
/// Relative offsets are 32-bit, so nothing past `u32::MAX` is addressable
/// even when the file is larger.
fn scan_limit(declared_size: u32, available: u64) -> u64 {
    let limit = if declared_size == 0 || u64::from(declared_size) > available {
        warn!(
            declared = declared_size,
            available, "Declared hive bins size does not match the file, using file size"
        );
        available
    } else {
        u64::from(declared_size)
    };
    limit.min(u64::from(u32::MAX))
}

impl BinsIndex {
    /// Scans the bin headers of a hive.
    ///
    /// Scanning covers `declared_size` bytes after the base block, or the
    /// rest of the source when the declared size is zero or too large. It
    /// stops at the first bin that fails validation; cells past that point
    /// are reported as out of bounds.
    pub fn scan(source: Arc<dyn ByteSource>, declared_size: u32) -> Result<Self> {
        let available = source.len().saturating_sub(BASE_BLOCK_SIZE as u64);
        let limit = scan_limit(declared_size, available);

        let mut bins = Vec::new();
        let mut position: u64 = 0;

        while position + HBIN_HEADER_SIZE as u64 <= limit {
            let expected_offset = position as u32;
            let header_data =
                source.read_at(cell_offset_to_absolute(expected_offset), HBIN_HEADER_SIZE)?;

            let header = match HbinHeader::parse(&header_data, expected_offset) {
                Ok(header) => header,
                Err(err) => {
                    warn!(offset = %format!("{:#x}", expected_offset), error = %err, "Stopping bin scan");
                    break;
                }
            };

            if header.end() > available {
                warn!(offset = %format!("{:#x}", expected_offset), "Hive bin extends past end of file");
                break;
            }

            position = header.end();
            bins.push(header);
        }

        debug!(bins = bins.len(), size = position, "Scanned hive bins");

        Ok(Self { source, bins })
    }

    /// The byte source this index reads from.
    pub fn source(&self) -> &Arc<dyn ByteSource> {
        &self.source
    }

    /// All bins found by the scan, in file order.
    pub fn bins(&self) -> &[HbinHeader] {
        &self.bins
    }

    /// Size of the scanned bins data area.
    pub fn data_size(&self) -> u64 {
        self.bins.last().map(HbinHeader::end).unwrap_or(0)
    }

    /// Finds the bin containing a relative offset.
    pub fn bin_for(&self, offset: u32) -> Option<&HbinHeader> {
        let index = self.bins.partition_point(|bin| bin.offset <= offset);
        index
            .checked_sub(1)
            .and_then(|i| self.bins.get(i))
            .filter(|bin| bin.contains(offset))
    }

    /// Resolves a relative offset to a cell, free or allocated.
    ///
    /// # Errors
    ///
    /// - `OffsetOutOfBounds` if the offset is in no bin, points into a bin
    ///   header, or is not 8-byte aligned.
    /// - `CellSizeInvalid` if the cell is smaller than 8 bytes, not a
    ///   multiple of 8, or crosses the end of its bin.
    /// - `Io`/`TruncatedData` if the byte source cannot supply the bytes.
    pub fn resolve_cell(&self, offset: u32) -> Result<CellView> {
        let out_of_bounds = || RegistryError::OffsetOutOfBounds {
            offset,
            bins_size: self.data_size(),
        };

        let bin = self.bin_for(offset).ok_or_else(out_of_bounds)?;
        if offset - bin.offset < HBIN_HEADER_SIZE as u32 || offset % 8 != 0 {
            return Err(out_of_bounds());
        }

        let absolute = cell_offset_to_absolute(offset);
        let raw_size = read_i32_le(&self.source.read_at(absolute, 4)?, 0)?;

        let size = raw_size.unsigned_abs();
        if size < MIN_CELL_SIZE || size % 8 != 0 || u64::from(offset) + u64::from(size) > bin.end() {
            return Err(RegistryError::CellSizeInvalid {
                size: raw_size,
                offset,
            });
        }

        let data = self.source.read_at(absolute + 4, size as usize - 4)?;

        Ok(CellView {
            offset,
            size,
            is_allocated: raw_size < 0,
            data,
        })
    }

    /// Resolves a relative offset to an allocated cell.
    ///
    /// Same checks as [`BinsIndex::resolve_cell`]; a free cell is reported
    /// as `CellSizeInvalid`, since live records never point at one.
    pub fn read_cell(&self, offset: u32) -> Result<CellView> {
        let cell = self.resolve_cell(offset)?;
        if !cell.is_allocated {
            return Err(RegistryError::CellSizeInvalid {
                size: cell.size as i32,
                offset,
            });
        }
        Ok(cell)
    }
}
