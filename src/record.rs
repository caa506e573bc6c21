//! Typed decoding of hive cells.
//!
//! Each cell is decoded once into a [`Record`], discriminated by its on-disk
//! signature. Decoding is local to one cell: pointer fields are returned as
//! offsets and never followed here.

use crate::bigdata::BigDataBlock;
use crate::cell::CellType;
use crate::error::{RegistryError, Result};
use crate::hbin::CellView;
use crate::key::KeyItem;
use crate::security::SecurityKey;
use crate::subkey_list::SubkeyList;
use crate::value::{decode_value_list, ValueItem};

/// The record a caller expects to find in a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Key node (`nk`).
    KeyNode,
    /// Value key (`vk`).
    ValueKey,
    /// Any subkey list form (`li`, `lf`, `lh`, `ri`).
    SubkeyList,
    /// Security key (`sk`).
    Security,
    /// Big data header (`db`).
    BigData,
    /// Value list; it has no signature, so the owning key supplies the count.
    ValueList {
        /// Number of entries declared by the key node.
        count: u32,
    },
}

/// A decoded cell.
#[derive(Debug, Clone)]
pub enum Record {
    /// Key node.
    KeyNode(KeyItem),
    /// Value key.
    ValueKey(ValueItem),
    /// Subkey list.
    SubkeyList(SubkeyList),
    /// Security key.
    Security(SecurityKey),
    /// Big data header.
    BigData(BigDataBlock),
    /// Value key offsets.
    ValueList(Vec<u32>),
}

impl Record {
    /// Signature-bearing cell type of this record, if any.
    pub fn cell_type(&self) -> Option<CellType> {
        match self {
            Record::KeyNode(_) => Some(CellType::KeyNode),
            Record::ValueKey(_) => Some(CellType::ValueKey),
            Record::SubkeyList(SubkeyList::IndexLeaf(_)) => Some(CellType::IndexLeaf),
            Record::SubkeyList(SubkeyList::FastLeaf(_)) => Some(CellType::FastLeaf),
            Record::SubkeyList(SubkeyList::HashLeaf(_)) => Some(CellType::HashLeaf),
            Record::SubkeyList(SubkeyList::IndexRoot(_)) => Some(CellType::IndexRoot),
            Record::Security(_) => Some(CellType::Security),
            Record::BigData(_) => Some(CellType::DataBlock),
            Record::ValueList(_) => None,
        }
    }
}

/// Decodes a cell as the expected kind of record.
///
/// # Errors
///
/// Returns `MalformedRecord` if the cell's signature does not match `kind`
/// or the record is inconsistent with the cell's bounds.
pub fn decode(cell: &CellView, kind: RecordKind) -> Result<Record> {
    let (data, offset) = (cell.data.as_slice(), cell.offset);

    match kind {
        RecordKind::KeyNode => KeyItem::decode(data, offset).map(Record::KeyNode),
        RecordKind::ValueKey => ValueItem::decode(data, offset).map(Record::ValueKey),
        RecordKind::SubkeyList => SubkeyList::decode(data, offset).map(Record::SubkeyList),
        RecordKind::Security => SecurityKey::decode(data, offset).map(Record::Security),
        RecordKind::BigData => BigDataBlock::decode(data, offset).map(Record::BigData),
        RecordKind::ValueList { count } => {
            decode_value_list(data, count, offset).map(Record::ValueList)
        }
    }
}

fn unexpected(offset: u32, record: &Record) -> RegistryError {
    RegistryError::malformed(offset, format!("unexpected record {:?}", record.cell_type()))
}

/// Decodes a key node cell.
pub fn decode_key_node(cell: &CellView) -> Result<KeyItem> {
    match decode(cell, RecordKind::KeyNode)? {
        Record::KeyNode(item) => Ok(item),
        other => Err(unexpected(cell.offset, &other)),
    }
}

/// Decodes a value key cell.
pub fn decode_value_key(cell: &CellView) -> Result<ValueItem> {
    match decode(cell, RecordKind::ValueKey)? {
        Record::ValueKey(item) => Ok(item),
        other => Err(unexpected(cell.offset, &other)),
    }
}

/// Decodes a subkey list cell of any form.
pub fn decode_subkey_list(cell: &CellView) -> Result<SubkeyList> {
    match decode(cell, RecordKind::SubkeyList)? {
        Record::SubkeyList(list) => Ok(list),
        other => Err(unexpected(cell.offset, &other)),
    }
}

/// Decodes a security key cell.
pub fn decode_security_key(cell: &CellView) -> Result<SecurityKey> {
    match decode(cell, RecordKind::Security)? {
        Record::Security(key) => Ok(key),
        other => Err(unexpected(cell.offset, &other)),
    }
}

/// Decodes a big data header cell.
pub fn decode_big_data(cell: &CellView) -> Result<BigDataBlock> {
    match decode(cell, RecordKind::BigData)? {
        Record::BigData(block) => Ok(block),
        other => Err(unexpected(cell.offset, &other)),
    }
}

/// Decodes a value list cell holding `count` entries.
pub fn decode_values_list(cell: &CellView, count: u32) -> Result<Vec<u32>> {
    match decode(cell, RecordKind::ValueList { count })? {
        Record::ValueList(offsets) => Ok(offsets),
        other => Err(unexpected(cell.offset, &other)),
    }
}
