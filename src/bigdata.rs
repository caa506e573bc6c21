//! Big data block (db) decoding.
//!
//! Registry values larger than 16,344 bytes are stored in big data blocks,
//! which consist of a header cell, a segment list cell, and the segments.

use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le};

/// Largest value payload stored in a single cell; bigger ones use `db`.
pub const MAX_DIRECT_DATA_SIZE: u32 = 16344;

/// Big data block header structure.
///
/// Format:
/// ```text
/// Offset  Size  Description
/// 0x00    2     Signature ("db")
/// 0x02    2     Number of segments
/// 0x04    4     Offset to segment list
/// ```
#[derive(Debug, Clone)]
pub struct BigDataBlock {
    /// Number of data segments
    pub segment_count: u16,

    /// Offset to the list of segment offsets
    pub segment_list_offset: u32,
}

impl BigDataBlock {
    /// Minimum size of a big data block header
    const MIN_SIZE: usize = 8;

    /// Decodes a big data block header from cell data.
    pub fn decode(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..2] != b"db" {
            return Err(RegistryError::malformed(offset, "expected 'db' big data block"));
        }

        Ok(BigDataBlock {
            segment_count: read_u16_le(data, 0x02)?,
            segment_list_offset: read_u32_le(data, 0x04)?,
        })
    }

    /// Decodes the segment list cell referenced by this block.
    pub fn decode_segments(&self, data: &[u8], offset: u32) -> Result<Vec<u32>> {
        let count = self.segment_count as usize;
        if data.len() / 4 < count {
            return Err(RegistryError::malformed(
                offset,
                format!("segment list holds {} entries, need {}", data.len() / 4, count),
            ));
        }
        (0..count).map(|i| read_u32_le(data, i * 4)).collect()
    }
}
