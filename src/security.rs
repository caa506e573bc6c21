//! Security key (sk) decoding.
//!
//! Security keys hold a self-relative security descriptor shared by every
//! key node that references the cell. The descriptor itself is returned as
//! opaque bytes.

use crate::error::{RegistryError, Result};
use crate::utils::read_u32_le;

/// Size of the security key header, up to the descriptor.
const SECURITY_KEY_HEADER_SIZE: usize = 0x14;

/// Decoded security key (sk).
#[derive(Debug, Clone)]
pub struct SecurityKey {
    /// Offset of the previous security key in the hive's list.
    pub previous_offset: u32,

    /// Offset of the next security key in the hive's list.
    pub next_offset: u32,

    /// Number of key nodes referencing this cell.
    pub reference_count: u32,

    /// Raw security descriptor.
    pub descriptor: Vec<u8>,
}

impl SecurityKey {
    /// Decodes a security key from cell data.
    pub fn decode(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < SECURITY_KEY_HEADER_SIZE || &data[0..2] != b"sk" {
            return Err(RegistryError::malformed(offset, "expected 'sk' security key"));
        }

        let descriptor_size = read_u32_le(data, 0x10)? as usize;
        let descriptor = data
            .get(SECURITY_KEY_HEADER_SIZE..SECURITY_KEY_HEADER_SIZE.saturating_add(descriptor_size))
            .ok_or_else(|| {
                RegistryError::malformed(
                    offset,
                    format!("security descriptor of {} bytes exceeds cell", descriptor_size),
                )
            })?;

        Ok(SecurityKey {
            previous_offset: read_u32_le(data, 0x04)?,
            next_offset: read_u32_le(data, 0x08)?,
            reference_count: read_u32_le(data, 0x0C)?,
            descriptor: descriptor.to_vec(),
        })
    }
}
