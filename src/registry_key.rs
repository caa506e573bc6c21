//! Lazily resolved key handles.

use crate::cell::KeyNodeFlags;
use crate::error::{RegistryError, Result};
use crate::guard::LazySlot;
use crate::hive::HiveContext;
use crate::key::KeyItem;
use crate::name::{EncodedName, NameEncoding, RegString};
use crate::record::{decode_key_node, decode_security_key, decode_subkey_list, decode_values_list};
use crate::registry_value::RegistryValue;
use crate::subkey_list::SubkeyList;
use crate::utils::{fill_buffer, filetime_to_datetime, is_absent};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A handle to one key node.
///
/// Creating a handle reads nothing. Each accessor resolves the cells it
/// needs the first time it is called and caches the result, so repeated
/// queries cost no further reads. Handles are cheap to clone and keep the
/// hive's byte source alive.
///
/// Structural corruption found while following an edge of this key (its
/// own cell, its lists, or a child it had to inspect) marks the key as
/// corrupted. Other accessors keep working.
pub struct RegistryKey {
    context: Arc<HiveContext>,
    offset: u32,
    item: LazySlot<Arc<KeyItem>>,
    sub_keys: LazySlot<Arc<[u32]>>,
    values: LazySlot<Arc<[u32]>>,
    class_name: LazySlot<Arc<EncodedName>>,
    security_descriptor: LazySlot<Arc<[u8]>>,
    corrupted: AtomicBool,
}

impl Clone for RegistryKey {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            offset: self.offset,
            item: self.item.clone(),
            sub_keys: self.sub_keys.clone(),
            values: self.values.clone(),
            class_name: self.class_name.clone(),
            security_descriptor: self.security_descriptor.clone(),
            corrupted: AtomicBool::new(self.corrupted.load(Ordering::Acquire)),
        }
    }
}

impl fmt::Debug for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryKey")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("corrupted", &self.corrupted.load(Ordering::Acquire))
            .finish()
    }
}

impl RegistryKey {
    pub(crate) fn new(context: Arc<HiveContext>, offset: u32) -> Self {
        Self {
            context,
            offset,
            item: LazySlot::new(),
            sub_keys: LazySlot::new(),
            values: LazySlot::new(),
            class_name: LazySlot::new(),
            security_descriptor: LazySlot::new(),
            corrupted: AtomicBool::new(false),
        }
    }

    /// Records structural corruption seen through this handle.
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_corruption() {
                self.corrupted.store(true, Ordering::Release);
            }
        }
        result
    }

    fn item(&self) -> Result<Arc<KeyItem>> {
        self.track(self.item.get_or_resolve(|| {
            debug!(offset = %format!("{:#x}", self.offset), "Resolving key node");
            let cell = self.context.read_cell(self.offset)?;
            decode_key_node(&cell).map(Arc::new)
        }))
    }

    /// Reads and decodes the key node cell if it has not been read yet.
    pub(crate) fn resolve(&self) -> Result<()> {
        self.item().map(|_| ())
    }

    /// Relative offset of the key node cell.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Returns true if structural corruption was found through this key.
    ///
    /// Resolves the key node first. A key whose own cell cannot be decoded
    /// is reported as corrupted rather than as an error; only I/O failures
    /// are returned as errors.
    pub fn is_corrupted(&self) -> Result<bool> {
        match self.item() {
            Ok(_) => Ok(self.corrupted.load(Ordering::Acquire)),
            Err(err) if err.is_corruption() => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// Key node flags.
    pub fn flags(&self) -> Result<KeyNodeFlags> {
        Ok(self.item()?.flags)
    }

    /// Last written time as a raw FILETIME.
    pub fn last_written_time(&self) -> Result<u64> {
        Ok(self.item()?.last_written)
    }

    /// Last written time as a UTC date time.
    pub fn last_written_datetime(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(filetime_to_datetime(self.item()?.last_written))
    }

    fn name_string(&self) -> Result<RegString> {
        let item = self.item()?;
        Ok(self.context.reg_string(item.name.clone(), item.offset))
    }

    /// Key name as a `String`.
    pub fn name(&self) -> Result<String> {
        self.name_string()?.to_utf8()
    }

    /// Key name as UTF-16 code units.
    pub fn utf16_name(&self) -> Result<Vec<u16>> {
        self.name_string()?.to_utf16()
    }

    /// Key name bytes exactly as stored.
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

    fn class_name_string(&self) -> Result<RegString> {
        let item = self.item()?;
        if !item.has_class_name() {
            return Ok(self.context.reg_string(EncodedName::empty(), item.offset));
        }

        let name = self.track(self.class_name.get_or_resolve(|| {
            debug!(offset = %format!("{:#x}", item.class_name_offset), "Resolving class name");
            let cell = self.context.read_cell(item.class_name_offset)?;
            let size = usize::from(item.class_name_size);
            let bytes = cell.data.get(..size).ok_or_else(|| {
                RegistryError::malformed(
                    cell.offset,
                    format!("class name of {} bytes exceeds its cell", size),
                )
            })?;
            Ok(Arc::new(EncodedName::new(bytes.to_vec(), NameEncoding::Utf16Le)))
        }))?;

        Ok(self
            .context
            .reg_string(name.as_ref().clone(), item.class_name_offset))
    }

    /// Class name as a `String`; empty if the key has none.
    pub fn class_name(&self) -> Result<String> {
        self.class_name_string()?.to_utf8()
    }

    /// Size of the stored class name in bytes.
    pub fn class_name_size(&self) -> Result<usize> {
        Ok(self.class_name_string()?.raw_size())
    }

    /// Copies the stored class name bytes into `buffer`.
    pub fn get_class_name(&self, buffer: &mut [u8]) -> Result<usize> {
        self.class_name_string()?.copy_raw(buffer)
    }

    /// Size of the UTF-8 class name in bytes.
    pub fn utf8_class_name_size(&self) -> Result<usize> {
        self.class_name_string()?.utf8_size()
    }

    /// Copies the UTF-8 class name into `buffer`.
    pub fn get_utf8_class_name(&self, buffer: &mut [u8]) -> Result<usize> {
        self.class_name_string()?.copy_utf8(buffer)
    }

    /// Size of the UTF-16 class name in code units.
    pub fn utf16_class_name_size(&self) -> Result<usize> {
        self.class_name_string()?.utf16_size()
    }

    /// Copies the UTF-16 class name into `buffer`.
    pub fn get_utf16_class_name(&self, buffer: &mut [u16]) -> Result<usize> {
        self.class_name_string()?.copy_utf16(buffer)
    }

    fn security_descriptor_bytes(&self) -> Result<Arc<[u8]>> {
        let item = self.item()?;
        if !item.has_security_descriptor() {
            return Ok(Arc::from(Vec::new()));
        }

        self.track(self.security_descriptor.get_or_resolve(|| {
            debug!(offset = %format!("{:#x}", item.security_offset), "Resolving security key");
            let cell = self.context.read_cell(item.security_offset)?;
            Ok(Arc::from(decode_security_key(&cell)?.descriptor))
        }))
    }

    /// Raw self-relative security descriptor; empty if the key has none.
    pub fn security_descriptor(&self) -> Result<Vec<u8>> {
        Ok(self.security_descriptor_bytes()?.to_vec())
    }

    /// Size of the security descriptor in bytes.
    pub fn security_descriptor_size(&self) -> Result<usize> {
        Ok(self.security_descriptor_bytes()?.len())
    }

    /// Copies the security descriptor into `buffer`.
    pub fn get_security_descriptor(&self, buffer: &mut [u8]) -> Result<usize> {
        fill_buffer(&self.security_descriptor_bytes()?, buffer)
    }

    fn value_offsets(&self) -> Result<Arc<[u32]>> {
        let item = self.item()?;
        if !item.has_values() {
            return Ok(Arc::from(Vec::new()));
        }

        self.track(self.values.get_or_resolve(|| {
            debug!(
                offset = %format!("{:#x}", item.values_list_offset),
                count = item.number_of_values,
                "Resolving value list"
            );
            let cell = self.context.read_cell(item.values_list_offset)?;
            Ok(Arc::from(decode_values_list(&cell, item.number_of_values)?))
        }))
    }

    /// Number of values declared by the key node.
    pub fn number_of_values(&self) -> Result<usize> {
        let item = self.item()?;
        if item.has_values() {
            Ok(item.number_of_values as usize)
        } else {
            Ok(0)
        }
    }

    /// Returns the value at `index`, in on-disk order.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` if `index` is not below [`Self::number_of_values`];
    /// a corruption error if the value list or the value cell is broken.
    pub fn value(&self, index: usize) -> Result<RegistryValue> {
        let count = self.number_of_values()?;
        if index >= count {
            return Err(RegistryError::IndexOutOfBounds { index, count });
        }

        let offsets = self.value_offsets()?;
        let offset = *offsets
            .get(index)
            .ok_or(RegistryError::IndexOutOfBounds { index, count })?;

        let value = RegistryValue::new(self.context.clone(), offset);
        self.track(value.resolve())?;
        Ok(value)
    }

    /// Iterates over all values in on-disk order.
    pub fn values(&self) -> Result<impl Iterator<Item = Result<RegistryValue>> + '_> {
        let count = self.number_of_values()?;
        Ok((0..count).map(move |index| self.value(index)))
    }

    /// Finds a value by exact name; an empty name finds the default value.
    ///
    /// Value cells that cannot be decoded are skipped and mark this key as
    /// corrupted. When names repeat, the first match in list order wins.
    pub fn value_by_name(&self, name: &str) -> Result<RegistryValue> {
        let codepage = self.context.options.ascii_codepage;
        self.find_value(name, |stored| stored.matches_exact(name, codepage))
    }

    /// Finds a value by exact UTF-16 name.
    pub fn value_by_utf16_name(&self, name: &[u16]) -> Result<RegistryValue> {
        let codepage = self.context.options.ascii_codepage;
        let display = String::from_utf16_lossy(name);
        self.find_value(&display, |stored| stored.matches_exact_utf16(name, codepage))
    }

    fn find_value<F>(&self, display: &str, matches: F) -> Result<RegistryValue>
    where
        F: Fn(&EncodedName) -> bool,
    {
        for &offset in self.value_offsets()?.iter() {
            let value = RegistryValue::new(self.context.clone(), offset);
            match value.item() {
                Ok(item) if matches(&item.name) => return Ok(value),
                Ok(_) => {}
                Err(err) if err.is_corruption() => {
                    warn!(offset = %format!("{:#x}", offset), error = %err, "Skipping unreadable value");
                    self.corrupted.store(true, Ordering::Release);
                }
                Err(err) => return Err(err),
            }
        }

        Err(RegistryError::not_found("value", display))
    }

    fn sub_key_offsets(&self) -> Result<Arc<[u32]>> {
        let item = self.item()?;
        if !item.has_sub_keys() {
            return Ok(Arc::from(Vec::new()));
        }

        self.track(self.sub_keys.get_or_resolve(|| {
            debug!(offset = %format!("{:#x}", item.sub_keys_list_offset), "Resolving subkey list");
            let offsets = self.flatten_sub_key_list(item.sub_keys_list_offset)?;

            if offsets.len() != item.number_of_sub_keys as usize {
                warn!(
                    offset = %format!("{:#x}", self.offset),
                    declared = item.number_of_sub_keys,
                    found = offsets.len(),
                    "Subkey count does not match subkey list"
                );
            }
            Ok(Arc::from(offsets))
        }))
    }

    /// Reads a subkey list, expanding one level of index root.
    fn flatten_sub_key_list(&self, offset: u32) -> Result<Vec<u32>> {
        let cell = self.context.read_cell(offset)?;
        let list = decode_subkey_list(&cell)?;

        let leaves = match list {
            SubkeyList::IndexRoot(leaves) => leaves,
            leaf => return Ok(leaf.offsets().collect()),
        };

        let mut offsets = Vec::new();
        for leaf_offset in leaves {
            let leaf_cell = self.context.read_cell(leaf_offset)?;
            let leaf = decode_subkey_list(&leaf_cell)?;
            if leaf.is_index_root() {
                return Err(RegistryError::malformed(
                    leaf_offset,
                    "index root refers to another index root",
                ));
            }
            offsets.extend(leaf.offsets());
        }
        Ok(offsets)
    }

    /// Number of sub keys found in the subkey list.
    ///
    /// Resolves the subkey list, expanding index roots.
    pub fn number_of_sub_keys(&self) -> Result<usize> {
        Ok(self.sub_key_offsets()?.len())
    }

    /// Returns the sub key at `index`, in list order.
    ///
    /// The returned handle has not read its key node yet.
    pub fn sub_key(&self, index: usize) -> Result<RegistryKey> {
        let offsets = self.sub_key_offsets()?;
        let offset = *offsets.get(index).ok_or(RegistryError::IndexOutOfBounds {
            index,
            count: offsets.len(),
        })?;
        Ok(RegistryKey::new(self.context.clone(), offset))
    }

    /// Iterates over all sub keys in list order.
    pub fn sub_keys(&self) -> Result<impl Iterator<Item = RegistryKey>> {
        let offsets = self.sub_key_offsets()?;
        let context = self.context.clone();
        Ok((0..offsets.len()).map(move |i| RegistryKey::new(context.clone(), offsets[i])))
    }

    /// Finds a direct sub key by name, ignoring case.
    ///
    /// The returned handle has its key node resolved. Sub keys whose cells
    /// cannot be decoded are skipped and mark this key as corrupted.
    pub fn sub_key_by_name(&self, name: &str) -> Result<RegistryKey> {
        let query: Vec<u16> = name.encode_utf16().collect();
        self.find_sub_key(&query, name)
    }

    /// Finds a direct sub key by UTF-16 name, ignoring case.
    pub fn sub_key_by_utf16_name(&self, name: &[u16]) -> Result<RegistryKey> {
        self.find_sub_key(name, &String::from_utf16_lossy(name))
    }

    fn find_sub_key(&self, query: &[u16], display: &str) -> Result<RegistryKey> {
        let codepage = self.context.options.ascii_codepage;

        for &offset in self.sub_key_offsets()?.iter() {
            let child = RegistryKey::new(self.context.clone(), offset);
            match child.item() {
                Ok(item) if item.name.matches_ignore_case(query, codepage) => return Ok(child),
                Ok(_) => {}
                Err(err) if err.is_corruption() => {
                    warn!(offset = %format!("{:#x}", offset), error = %err, "Skipping unreadable sub key");
                    self.corrupted.store(true, Ordering::Release);
                }
                Err(err) => return Err(err),
            }
        }

        Err(RegistryError::not_found("key", display))
    }

    /// Resolves a separator-delimited path relative to this key.
    ///
    /// Components match like [`Self::sub_key_by_name`]. One leading and one
    /// trailing separator are ignored, so an empty path (or a lone
    /// separator) returns this key. An empty component anywhere else, as in
    /// `a\\b`, is `NotFound`, as is the first component that names no
    /// sub key.
    pub fn sub_key_by_path(&self, path: &str, separator: char) -> Result<RegistryKey> {
        let trimmed = path.strip_prefix(separator).unwrap_or(path);
        let trimmed = trimmed.strip_suffix(separator).unwrap_or(trimmed);

        let mut current = self.clone();
        if trimmed.is_empty() {
            return Ok(current);
        }
        for component in trimmed.split(separator) {
            if component.is_empty() {
                return Err(RegistryError::not_found("key", path));
            }
            current = current.sub_key_by_name(component)?;
        }
        Ok(current)
    }

    /// Resolves a UTF-16 path relative to this key.
    ///
    /// Separators are handled as in [`Self::sub_key_by_path`].
    pub fn sub_key_by_utf16_path(&self, path: &[u16], separator: u16) -> Result<RegistryKey> {
        let trimmed = path.strip_prefix(&[separator]).unwrap_or(path);
        let trimmed = trimmed.strip_suffix(&[separator]).unwrap_or(trimmed);

        let mut current = self.clone();
        if trimmed.is_empty() {
            return Ok(current);
        }
        for component in trimmed.split(|&unit| unit == separator) {
            if component.is_empty() {
                return Err(RegistryError::not_found("key", &String::from_utf16_lossy(path)));
            }
            current = current.sub_key_by_utf16_name(component)?;
        }
        Ok(current)
    }

    /// Returns the parent key, or `None` for the root key.
    pub fn parent(&self) -> Result<Option<RegistryKey>> {
        let item = self.item()?;
        if item.is_root() || is_absent(item.parent_offset) {
            return Ok(None);
        }
        Ok(Some(RegistryKey::new(self.context.clone(), item.parent_offset)))
    }
}
