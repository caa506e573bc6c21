//! The `regf` base block.
//!
//! Occupies the first 0x1000 bytes of a hive file. Holds the format version,
//! the sequence numbers used to detect an interrupted write, the root key
//! offset and the size of the bins area that follows.

use crate::error::{RegistryError, Result};
use crate::utils::{calculate_checksum, filetime_to_datetime, read_u32_le, read_u64_le};
use encoding_rs::UTF_16LE;
#[cfg(feature = "serde")]
use serde::Serialize;
use std::fmt;

/// Size of the base block in bytes.
pub const BASE_BLOCK_SIZE: usize = 4096;

/// Expected signature for a valid registry hive ("regf").
pub const REGF_SIGNATURE: &[u8; 4] = b"regf";

/// Offset of the embedded file name in the base block.
const FILE_NAME_OFFSET: usize = 0x30;

/// Length of the file name field (32 UTF-16LE characters = 64 bytes).
const FILE_NAME_LENGTH: usize = 64;

/// Offset of the checksum field in the base block.
const CHECKSUM_OFFSET: usize = 0x1FC;

/// Highest supported minor version of format 1.
const MAX_MINOR_VERSION: u32 = 6;

/// Registry hive base block header.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BaseBlock {
    /// Primary sequence number.
    pub primary_sequence: u32,

    /// Secondary sequence number.
    pub secondary_sequence: u32,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Major version of the hive format.
    pub major_version: u32,

    /// Minor version of the hive format.
    pub minor_version: u32,

    /// File type (0 = primary file).
    pub file_type: u32,

    /// Offset to root key cell (relative to first hbin).
    pub root_cell_offset: u32,

    /// Size of the hive bins data in bytes.
    pub hive_bins_size: u32,

    /// Embedded file name (tail of the hive path, may be empty).
    pub file_name: String,

    /// Checksum stored in the header.
    pub checksum: u32,

    /// Checksum computed over the first 508 bytes.
    pub calculated_checksum: u32,
}

impl BaseBlock {
    /// Parses a base block from raw bytes.
    ///
    /// The checksum is computed but not enforced; see
    /// [`BaseBlock::is_checksum_valid`].
    ///
    /// # Errors
    ///
    /// Returns an error if the data is smaller than a base block, the
    /// signature is not `regf`, or the format version is unsupported.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: data.len() as u64,
                minimum: BASE_BLOCK_SIZE as u64,
            });
        }

        if &data[0..4] != REGF_SIGNATURE {
            return Err(RegistryError::invalid_signature(REGF_SIGNATURE, &data[0..4]));
        }

        let major_version = read_u32_le(data, 0x14)?;
        let minor_version = read_u32_le(data, 0x18)?;
        if major_version != 1 || minor_version > MAX_MINOR_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let file_name_bytes = &data[FILE_NAME_OFFSET..FILE_NAME_OFFSET + FILE_NAME_LENGTH];
        let (file_name, _) = UTF_16LE.decode_without_bom_handling(file_name_bytes);

        Ok(BaseBlock {
            primary_sequence: read_u32_le(data, 0x04)?,
            secondary_sequence: read_u32_le(data, 0x08)?,
            last_written: read_u64_le(data, 0x0C)?,
            major_version,
            minor_version,
            file_type: read_u32_le(data, 0x1C)?,
            root_cell_offset: read_u32_le(data, 0x24)?,
            hive_bins_size: read_u32_le(data, 0x28)?,
            file_name: file_name.trim_end_matches('\0').to_string(),
            checksum: read_u32_le(data, CHECKSUM_OFFSET)?,
            calculated_checksum: calculate_checksum(data),
        })
    }

    /// Returns true if the stored checksum matches the computed one.
    pub fn is_checksum_valid(&self) -> bool {
        self.checksum == self.calculated_checksum
    }

    /// Returns true if the hive is in a consistent state.
    ///
    /// The hive is consistent when primary and secondary sequence numbers match.
    pub fn is_consistent(&self) -> bool {
        self.primary_sequence == self.secondary_sequence
    }

    /// Returns true if the hive may contain big data (`db`) cells.
    pub fn supports_big_data(&self) -> bool {
        self.minor_version >= 4
    }

    /// Last written time as a UTC datetime.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        filetime_to_datetime(self.last_written)
    }
}

impl fmt::Display for BaseBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "regf {}.{} root={:#x} bins={:#x}",
            self.major_version, self.minor_version, self.root_cell_offset, self.hive_bins_size
        )?;
        if !self.file_name.is_empty() {
            write!(f, " ({})", self.file_name)?;
        }
        Ok(())
    }
}
