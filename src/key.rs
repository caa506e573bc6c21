//! Registry key node (nk) decoding.

use crate::cell::KeyNodeFlags;
use crate::error::{RegistryError, Result};
use crate::name::{EncodedName, NameEncoding};
use crate::utils::{is_absent, read_u16_le, read_u32_le, read_u64_le};

/// Size of the fixed part of a key node, up to the name.
pub const KEY_NODE_HEADER_SIZE: usize = 0x4C;

/// Decoded key node (nk).
///
/// A snapshot of the cell at read time. Pointer fields are relative offsets
/// that are validated again whenever they are followed.
#[derive(Debug, Clone)]
pub struct KeyItem {
    /// Offset of the key node cell.
    pub offset: u32,

    /// Flags for this key.
    pub flags: KeyNodeFlags,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Offset to parent key node.
    pub parent_offset: u32,

    /// Number of (stable) subkeys.
    pub number_of_sub_keys: u32,

    /// Offset to the subkey list.
    pub sub_keys_list_offset: u32,

    /// Number of values.
    pub number_of_values: u32,

    /// Offset to the value list.
    pub values_list_offset: u32,

    /// Offset to the security key cell.
    pub security_offset: u32,

    /// Offset to the class name cell.
    pub class_name_offset: u32,

    /// Size of the class name in bytes.
    pub class_name_size: u16,

    /// Key name as stored.
    pub name: EncodedName,
}

impl KeyItem {
    /// Decodes a key node from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field, starting with "nk" signature).
    /// * `offset` - Offset of this cell for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if the signature is wrong or the name runs
    /// past the end of the cell.
    pub fn decode(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < KEY_NODE_HEADER_SIZE {
            return Err(RegistryError::malformed(
                offset,
                format!("key node is {} bytes, need {}", data.len(), KEY_NODE_HEADER_SIZE),
            ));
        }

        if &data[0..2] != b"nk" {
            return Err(RegistryError::malformed(offset, "expected 'nk' signature"));
        }

        let flags = KeyNodeFlags::new(read_u16_le(data, 0x02)?);
        let name_size = read_u16_le(data, 0x48)? as usize;

        let name_end = KEY_NODE_HEADER_SIZE + name_size;
        let name_bytes = data.get(KEY_NODE_HEADER_SIZE..name_end).ok_or_else(|| {
            RegistryError::malformed(
                offset,
                format!("name of {} bytes runs past the end of the cell", name_size),
            )
        })?;

        let encoding = if flags.is_compressed() {
            NameEncoding::Ascii
        } else {
            NameEncoding::Utf16Le
        };

        Ok(KeyItem {
            offset,
            flags,
            last_written: read_u64_le(data, 0x04)?,
            parent_offset: read_u32_le(data, 0x10)?,
            number_of_sub_keys: read_u32_le(data, 0x14)?,
            sub_keys_list_offset: read_u32_le(data, 0x1C)?,
            number_of_values: read_u32_le(data, 0x24)?,
            values_list_offset: read_u32_le(data, 0x28)?,
            security_offset: read_u32_le(data, 0x2C)?,
            class_name_offset: read_u32_le(data, 0x30)?,
            class_name_size: read_u16_le(data, 0x4A)?,
            name: EncodedName::new(name_bytes.to_vec(), encoding),
        })
    }

    /// Returns true if this key has subkeys to resolve.
    pub fn has_sub_keys(&self) -> bool {
        self.number_of_sub_keys > 0 && !is_absent(self.sub_keys_list_offset)
    }

    /// Returns true if this key has a value list to resolve.
    pub fn has_values(&self) -> bool {
        self.number_of_values > 0 && !is_absent(self.values_list_offset)
    }

    /// Returns true if this key has a class name.
    pub fn has_class_name(&self) -> bool {
        self.class_name_size > 0 && !is_absent(self.class_name_offset)
    }

    /// Returns true if this key references a security key cell.
    pub fn has_security_descriptor(&self) -> bool {
        !is_absent(self.security_offset)
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.flags.is_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_node(flags: u16, name: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; KEY_NODE_HEADER_SIZE + name.len()];
        data[0..2].copy_from_slice(b"nk");
        data[0x02..0x04].copy_from_slice(&flags.to_le_bytes());
        data[0x04..0x0C].copy_from_slice(&0x01D0_0000_0000_0000u64.to_le_bytes());
        data[0x10..0x14].copy_from_slice(&0x20u32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&2u32.to_le_bytes());
        data[0x1C..0x20].copy_from_slice(&0x100u32.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&1u32.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&0x200u32.to_le_bytes());
        data[0x2C..0x30].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        data[0x30..0x34].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        data[0x48..0x4A].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data[KEY_NODE_HEADER_SIZE..].copy_from_slice(name);
        data
    }

    #[test]
    fn test_decode_ascii_name() {
        let item = KeyItem::decode(&key_node(KeyNodeFlags::COMP_NAME, b"Software"), 0x80).unwrap();
        assert_eq!(item.offset, 0x80);
        assert_eq!(item.name.as_bytes(), b"Software");
        assert_eq!(item.name.encoding(), NameEncoding::Ascii);
        assert_eq!(item.last_written, 0x01D0_0000_0000_0000);
        assert_eq!(item.parent_offset, 0x20);
        assert!(item.has_sub_keys());
        assert!(item.has_values());
        assert!(!item.has_class_name());
        assert!(!item.has_security_descriptor());
    }

    #[test]
    fn test_decode_utf16_name() {
        let name: Vec<u8> = "K\u{e9}y".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let item = KeyItem::decode(&key_node(0, &name), 0).unwrap();
        assert_eq!(item.name.encoding(), NameEncoding::Utf16Le);
        assert_eq!(item.name.as_bytes().len(), 6);
    }

    #[test]
    fn test_key_node_minimum_size() {
        let data = vec![0u8; KEY_NODE_HEADER_SIZE - 1];
        assert!(matches!(
            KeyItem::decode(&data, 0),
            Err(RegistryError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_key_node_invalid_signature() {
        let mut data = key_node(0, b"");
        data[0..2].copy_from_slice(b"XX");
        assert!(KeyItem::decode(&data, 0).is_err());
    }

    #[test]
    fn test_name_past_cell_end() {
        let mut data = key_node(KeyNodeFlags::COMP_NAME, b"abc");
        data[0x48..0x4A].copy_from_slice(&10u16.to_le_bytes());
        let err = KeyItem::decode(&data, 0x40).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedRecord { offset: 0x40, .. }));
    }

    #[test]
    fn test_zero_list_offsets_are_followed() {
        let mut data = key_node(KeyNodeFlags::COMP_NAME, b"Broken");
        for field in [0x1C, 0x28, 0x2C, 0x30] {
            data[field..field + 4].copy_from_slice(&0u32.to_le_bytes());
        }
        data[0x4A..0x4C].copy_from_slice(&8u16.to_le_bytes());

        let item = KeyItem::decode(&data, 0x80).unwrap();
        assert!(item.has_sub_keys());
        assert!(item.has_values());
        assert!(item.has_class_name());
        assert!(item.has_security_descriptor());
    }
}
