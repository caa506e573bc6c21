//! Lazily resolved value handles.

use crate::bigdata::MAX_DIRECT_DATA_SIZE;
use crate::cell::{CellType, ValueType};
use crate::error::{RegistryError, Result};
use crate::guard::LazySlot;
use crate::hbin::CellView;
use crate::hive::HiveContext;
use crate::name::RegString;
use crate::record::{decode_big_data, decode_value_key};
use crate::utils::fill_buffer;
use crate::value::ValueItem;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A handle to one value key.
///
/// Like [`crate::RegistryKey`], a value reads its cells only when asked and
/// caches what it decoded. The data is returned as raw bytes; interpreting
/// them according to [`RegistryValue::value_type`] is left to the caller.
pub struct RegistryValue {
    context: Arc<HiveContext>,
    offset: u32,
    item: LazySlot<Arc<ValueItem>>,
    data: LazySlot<Arc<[u8]>>,
    corrupted: AtomicBool,
}

impl Clone for RegistryValue {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            offset: self.offset,
            item: self.item.clone(),
            data: self.data.clone(),
            corrupted: AtomicBool::new(self.corrupted.load(Ordering::Acquire)),
        }
    }
}

impl fmt::Debug for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryValue")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("corrupted", &self.corrupted.load(Ordering::Acquire))
            .finish()
    }
}

impl RegistryValue {
    pub(crate) fn new(context: Arc<HiveContext>, offset: u32) -> Self {
        Self {
            context,
            offset,
            item: LazySlot::new(),
            data: LazySlot::new(),
            corrupted: AtomicBool::new(false),
        }
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_corruption() {
                self.corrupted.store(true, Ordering::Release);
            }
        }
        result
    }

    pub(crate) fn item(&self) -> Result<Arc<ValueItem>> {
        self.track(self.item.get_or_resolve(|| {
            debug!(offset = %format!("{:#x}", self.offset), "Resolving value key");
            let cell = self.context.read_cell(self.offset)?;
            decode_value_key(&cell).map(Arc::new)
        }))
    }

    pub(crate) fn resolve(&self) -> Result<()> {
        self.item().map(|_| ())
    }

    /// Relative offset of the value key cell.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Returns true if structural corruption was found through this value.
    pub fn is_corrupted(&self) -> Result<bool> {
        match self.item() {
            Ok(_) => Ok(self.corrupted.load(Ordering::Acquire)),
            Err(err) if err.is_corruption() => Ok(true),
            Err(err) => Err(err),
        }
    }

    fn name_string(&self) -> Result<RegString> {
        let item = self.item()?;
        Ok(self.context.reg_string(item.name.clone(), item.offset))
    }

    /// Value name as a `String`; empty for the default value.
    pub fn name(&self) -> Result<String> {
        self.name_string()?.to_utf8()
    }

    /// Value name as UTF-16 code units.
    pub fn utf16_name(&self) -> Result<Vec<u16>> {
        self.name_string()?.to_utf16()
    }

    /// Value name bytes exactly as stored.
    pub fn raw_name(&self) -> Result<Vec<u8>> {
        Ok(self.item()?.name.as_bytes().to_vec())
    }

    /// Size of the stored name in bytes.
    pub fn name_size(&self) -> Result<usize> {
        Ok(self.name_string()?.raw_size())
    }

    /// Copies the stored name bytes into `buffer`.
    pub fn get_name(&self, buffer: &mut [u8]) -> Result<usize> {
        self.name_string()?.copy_raw(buffer)
    }

    /// Size of the UTF-8 name in bytes.
    pub fn utf8_name_size(&self) -> Result<usize> {
        self.name_string()?.utf8_size()
    }

    /// Copies the UTF-8 name into `buffer`.
    pub fn get_utf8_name(&self, buffer: &mut [u8]) -> Result<usize> {
        self.name_string()?.copy_utf8(buffer)
    }

    /// Size of the UTF-16 name in code units.
    pub fn utf16_name_size(&self) -> Result<usize> {
        self.name_string()?.utf16_size()
    }

    /// Copies the UTF-16 name into `buffer`.
    pub fn get_utf16_name(&self, buffer: &mut [u16]) -> Result<usize> {
        self.name_string()?.copy_utf16(buffer)
    }

    /// Value type.
    pub fn value_type(&self) -> Result<ValueType> {
        Ok(self.item()?.value_type())
    }

    /// Value type as stored.
    pub fn raw_value_type(&self) -> Result<u32> {
        Ok(self.item()?.raw_type)
    }

    /// Data size declared by the value key, in bytes.
    pub fn data_size(&self) -> Result<usize> {
        let item = self.item()?;
        if item.is_empty() {
            return Ok(0);
        }
        Ok(item.data_size as usize)
    }

    fn data_bytes(&self) -> Result<Arc<[u8]>> {
        let item = self.item()?;
        self.track(self.data.get_or_resolve(|| self.read_data(&item).map(Arc::from)))
    }

    /// Raw value data.
    ///
    /// Small values stored in the value key itself, values in a single cell,
    /// and values split across a big data block are all returned as one
    /// contiguous buffer of exactly [`Self::data_size`] bytes.
    pub fn data(&self) -> Result<Vec<u8>> {
        Ok(self.data_bytes()?.to_vec())
    }

    /// Copies the value data into `buffer`.
    pub fn get_data(&self, buffer: &mut [u8]) -> Result<usize> {
        fill_buffer(&self.data_bytes()?, buffer)
    }

    fn read_data(&self, item: &ValueItem) -> Result<Vec<u8>> {
        if item.is_inline {
            return item.inline_data();
        }
        if item.is_empty() {
            return Ok(Vec::new());
        }

        let size = item.data_size as usize;
        let cell = self.context.read_cell(item.data_offset)?;

        if item.data_size > MAX_DIRECT_DATA_SIZE
            && self.context.base_block.supports_big_data()
            && cell.cell_type() == Some(CellType::DataBlock)
        {
            return self.read_big_data(&cell, size);
        }

        cell.data.get(..size).map(<[u8]>::to_vec).ok_or_else(|| {
            RegistryError::malformed(
                cell.offset,
                format!("value data of {} bytes exceeds its cell of {}", size, cell.data.len()),
            )
        })
    }

    /// Concatenates the segments of a big data block.
    fn read_big_data(&self, header: &CellView, size: usize) -> Result<Vec<u8>> {
        let block = decode_big_data(header)?;
        debug!(
            offset = %format!("{:#x}", header.offset),
            segments = block.segment_count,
            size,
            "Reading big data block"
        );

        let list = self.context.read_cell(block.segment_list_offset)?;
        let segments = block.decode_segments(&list.data, list.offset)?;

        let mut data = Vec::with_capacity(size);
        for segment_offset in segments {
            if data.len() >= size {
                break;
            }
            let segment = self.context.read_cell(segment_offset)?;
            let take = (size - data.len())
                .min(MAX_DIRECT_DATA_SIZE as usize)
                .min(segment.data.len());
            data.extend_from_slice(&segment.data[..take]);
        }

        if data.len() < size {
            return Err(RegistryError::malformed(
                header.offset,
                format!("big data segments hold {} bytes, value declares {}", data.len(), size),
            ));
        }
        Ok(data)
    }
}
