//! Subkey list decoding (lf, lh, li, ri).
//!
//! A key's subkeys are listed either in a single leaf (`li`, `lf`, `lh`) or,
//! for large keys, in an index root (`ri`) whose entries point at leaves.

use crate::cell::CellType;
use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le};

/// Subkey list entry (for lf/lh lists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubkeyListEntry {
    /// Offset to the key node.
    pub key_offset: u32,

    /// Name hint (first 4 chars for lf, hash for lh).
    pub name_hint: u32,
}

/// Decoded subkey list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubkeyList {
    /// Index leaf - simple list of key offsets.
    IndexLeaf(Vec<u32>),

    /// Fast leaf - key offsets with name prefixes.
    FastLeaf(Vec<SubkeyListEntry>),

    /// Hash leaf - key offsets with name hashes.
    HashLeaf(Vec<SubkeyListEntry>),

    /// Index root - offsets of leaf lists.
    IndexRoot(Vec<u32>),
}

impl SubkeyList {
    /// Decodes a subkey list from cell data.
    ///
    /// The list kind comes from the cell's own signature.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field).
    /// * `offset` - Offset of this cell for error reporting.
    pub fn decode(data: &[u8], offset: u32) -> Result<Self> {
        let list_type = CellType::from_cell_data(data)
            .filter(CellType::is_subkey_list)
            .ok_or_else(|| RegistryError::malformed(offset, "expected a subkey list signature"))?;

        let count = read_u16_le(data, 0x02)
            .map_err(|_| RegistryError::malformed(offset, "subkey list header truncated"))?
            as usize;

        let entry_size = match list_type {
            CellType::FastLeaf | CellType::HashLeaf => 8,
            _ => 4,
        };

        // signature (2) + count (2) + entries
        let expected_size = 4 + count * entry_size;
        if data.len() < expected_size {
            return Err(RegistryError::malformed(
                offset,
                format!(
                    "{} entries need {} bytes, cell holds {}",
                    count,
                    expected_size,
                    data.len()
                ),
            ));
        }

        let offsets = || -> Result<Vec<u32>> {
            (0..count)
                .map(|i| read_u32_le(data, 4 + i * entry_size))
                .collect()
        };
        let entries = || -> Result<Vec<SubkeyListEntry>> {
            (0..count)
                .map(|i| {
                    let position = 4 + i * entry_size;
                    Ok(SubkeyListEntry {
                        key_offset: read_u32_le(data, position)?,
                        name_hint: read_u32_le(data, position + 4)?,
                    })
                })
                .collect()
        };

        Ok(match list_type {
            CellType::IndexLeaf => SubkeyList::IndexLeaf(offsets()?),
            CellType::FastLeaf => SubkeyList::FastLeaf(entries()?),
            CellType::HashLeaf => SubkeyList::HashLeaf(entries()?),
            _ => SubkeyList::IndexRoot(offsets()?),
        })
    }

    /// Returns an iterator over the offsets held by this list.
    ///
    /// For index roots these are leaf list offsets, not key offsets.
    pub fn offsets(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            SubkeyList::IndexLeaf(offsets) | SubkeyList::IndexRoot(offsets) => {
                Box::new(offsets.iter().copied())
            }
            SubkeyList::FastLeaf(entries) | SubkeyList::HashLeaf(entries) => {
                Box::new(entries.iter().map(|e| e.key_offset))
            }
        }
    }

    /// Returns the number of entries in this list.
    pub fn len(&self) -> usize {
        match self {
            SubkeyList::IndexLeaf(offsets) | SubkeyList::IndexRoot(offsets) => offsets.len(),
            SubkeyList::FastLeaf(entries) | SubkeyList::HashLeaf(entries) => entries.len(),
        }
    }

    /// Returns true if this list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if this is an index root (contains sublists).
    pub fn is_index_root(&self) -> bool {
        matches!(self, SubkeyList::IndexRoot(_))
    }
}
