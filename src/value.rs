//! Registry value key (vk) and value list decoding.

use crate::cell::{ValueKeyFlags, ValueType};
use crate::error::{RegistryError, Result};
use crate::name::{EncodedName, NameEncoding};
use crate::utils::{is_absent, read_u16_le, read_u32_le};

/// Size of the fixed part of a value key, up to the name.
pub const VALUE_KEY_HEADER_SIZE: usize = 0x14;

/// High bit of the data size: data is stored in the offset field.
const DATA_INLINE_FLAG: u32 = 0x8000_0000;

/// Data stored in the offset field holds at most this many bytes.
pub const MAX_INLINE_DATA_SIZE: u32 = 4;

/// Decoded value key (vk).
#[derive(Debug, Clone)]
pub struct ValueItem {
    /// Offset of the value key cell.
    pub offset: u32,

    /// Value name as stored. Empty for the default value.
    pub name: EncodedName,

    /// Raw data type number.
    pub raw_type: u32,

    /// Size of the data in bytes (inline flag removed).
    pub data_size: u32,

    /// Data cell offset, or the data itself for inline values.
    pub data_offset: u32,

    /// True if the data lives in the offset field.
    pub is_inline: bool,

    /// Value flags.
    pub flags: ValueKeyFlags,
}

impl ValueItem {
    /// Decodes a value key from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field, starting with "vk" signature).
    /// * `offset` - Offset of this cell for error reporting.
    pub fn decode(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < VALUE_KEY_HEADER_SIZE {
            return Err(RegistryError::malformed(
                offset,
                format!("value key is {} bytes, need {}", data.len(), VALUE_KEY_HEADER_SIZE),
            ));
        }

        if &data[0..2] != b"vk" {
            return Err(RegistryError::malformed(offset, "expected 'vk' signature"));
        }

        let name_size = read_u16_le(data, 0x02)? as usize;
        let raw_data_size = read_u32_le(data, 0x04)?;
        let flags = ValueKeyFlags(read_u16_le(data, 0x10)?);

        let name_end = VALUE_KEY_HEADER_SIZE + name_size;
        let name_bytes = data.get(VALUE_KEY_HEADER_SIZE..name_end).ok_or_else(|| {
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

        Ok(ValueItem {
            offset,
            name: EncodedName::new(name_bytes.to_vec(), encoding),
            raw_type: read_u32_le(data, 0x0C)?,
            data_size: raw_data_size & !DATA_INLINE_FLAG,
            data_offset: read_u32_le(data, 0x08)?,
            is_inline: raw_data_size & DATA_INLINE_FLAG != 0,
            flags,
        })
    }

    /// Declared value type.
    pub fn value_type(&self) -> ValueType {
        ValueType::from(self.raw_type)
    }

    /// Returns true if there is no data to read.
    pub fn is_empty(&self) -> bool {
        self.data_size == 0 || (!self.is_inline && is_absent(self.data_offset))
    }

    /// Extracts inline data.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if an inline value claims more than four bytes.
    pub fn inline_data(&self) -> Result<Vec<u8>> {
        if self.data_size > MAX_INLINE_DATA_SIZE {
            return Err(RegistryError::malformed(
                self.offset,
                format!("inline value data of {} bytes", self.data_size),
            ));
        }
        let bytes = self.data_offset.to_le_bytes();
        Ok(bytes[..self.data_size as usize].to_vec())
    }
}

/// Decodes a value list cell: `count` little-endian value key offsets.
pub fn decode_value_list(data: &[u8], count: u32, offset: u32) -> Result<Vec<u32>> {
    let count = count as usize;
    if data.len() / 4 < count {
        return Err(RegistryError::malformed(
            offset,
            format!("value list holds {} entries, key declares {}", data.len() / 4, count),
        ));
    }

    (0..count).map(|i| read_u32_le(data, i * 4)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_key(name: &[u8], data_size: u32, data_offset: u32, flags: u16) -> Vec<u8> {
        let mut data = vec![0u8; VALUE_KEY_HEADER_SIZE + name.len()];
        data[0..2].copy_from_slice(b"vk");
        data[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data[0x04..0x08].copy_from_slice(&data_size.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
        data[0x0C..0x10].copy_from_slice(&4u32.to_le_bytes());
        data[0x10..0x12].copy_from_slice(&flags.to_le_bytes());
        data[VALUE_KEY_HEADER_SIZE..].copy_from_slice(name);
        data
    }

    #[test]
    fn test_value_key_minimum_size() {
        let data = vec![0u8; VALUE_KEY_HEADER_SIZE - 1];
        assert!(ValueItem::decode(&data, 0).is_err());
    }

    #[test]
    fn test_value_key_invalid_signature() {
        let mut data = value_key(b"", 0, 0, 0);
        data[0..2].copy_from_slice(b"XX");
        assert!(ValueItem::decode(&data, 0).is_err());
    }

    #[test]
    fn test_inline_data() {
        let data = value_key(b"Start", 0x8000_0004, 0x0403_0201, 1);
        let vk = ValueItem::decode(&data, 0x60).unwrap();
        assert!(vk.is_inline);
        assert_eq!(vk.data_size, 4);
        assert_eq!(vk.value_type(), ValueType::Dword);
        assert_eq!(vk.name.encoding(), NameEncoding::Ascii);
        assert_eq!(vk.inline_data().unwrap(), vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_short_inline_data() {
        let data = value_key(b"", 0x8000_0002, 0xBEEF_4241, 0);
        let vk = ValueItem::decode(&data, 0).unwrap();
        assert!(vk.name.is_empty());
        assert_eq!(vk.inline_data().unwrap(), b"AB".to_vec());
    }

    #[test]
    fn test_oversized_inline_data() {
        let data = value_key(b"", 0x8000_0010, 0, 0);
        let vk = ValueItem::decode(&data, 0).unwrap();
        assert!(vk.inline_data().is_err());
    }

    #[test]
    fn test_empty_data() {
        let vk = ValueItem::decode(&value_key(b"x", 0, 0xFFFF_FFFF, 1), 0).unwrap();
        assert!(vk.is_empty());
    }

    #[test]
    fn test_value_list() {
        let mut data = Vec::new();
        for offset in [0x100u32, 0x200, 0x300] {
            data.extend_from_slice(&offset.to_le_bytes());
        }
        assert_eq!(decode_value_list(&data, 2, 0).unwrap(), vec![0x100, 0x200]);
        assert_eq!(decode_value_list(&data, 3, 0).unwrap().len(), 3);
        assert!(matches!(
            decode_value_list(&data, 4, 0x80),
            Err(RegistryError::MalformedRecord { offset: 0x80, .. })
        ));
    }
}
