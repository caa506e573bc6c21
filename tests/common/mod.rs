//! Synthetic hive images for tests and benches.
//!
//! [`KeyDef`] describes a tree of keys and values; [`build_hive`] lays it
//! out in bins and records where every cell landed so tests can corrupt
//! specific records.

#![allow(dead_code)]

use regf_nav::{ByteSource, MemorySource, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const BASE_BLOCK_SIZE: usize = 0x1000;
pub const HBIN_SIZE: usize = 0x1000;
pub const NO_CELL: u32 = 0xFFFF_FFFF;

const KEY_COMP_NAME: u16 = 0x0020;
const KEY_ROOT: u16 = 0x0004;
const VALUE_COMP_NAME: u16 = 0x0001;
const BIG_DATA_SEGMENT: usize = 16344;

/// Fixed FILETIME used for every key (2020-01-01T00:00:00Z).
pub const TIMESTAMP: u64 = 132_223_104_000_000_000;

/// Security descriptor shared by all keys.
pub const SECURITY_DESCRIPTOR: [u8; 20] = [
    0x01, 0x00, 0x04, 0x80, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Installs a test-writer subscriber; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// How a key's sub keys are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    IndexLeaf,
    FastLeaf,
    HashLeaf,
    /// An `ri` over `lh` leaves holding at most this many entries each.
    IndexRoot(usize),
}

#[derive(Debug, Clone)]
pub struct ValueDef {
    pub name: String,
    pub value_type: u32,
    pub data: Vec<u8>,
}

impl ValueDef {
    pub fn new(name: &str, value_type: u32, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            data: data.to_vec(),
        }
    }

    pub fn string(name: &str, text: &str) -> Self {
        let mut data: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        data.extend_from_slice(&[0, 0]);
        Self::new(name, 1, &data)
    }

    pub fn dword(name: &str, value: u32) -> Self {
        Self::new(name, 4, &value.to_le_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct KeyDef {
    pub name: String,
    pub class_name: Option<String>,
    pub values: Vec<ValueDef>,
    pub children: Vec<KeyDef>,
    pub list_kind: ListKind,
}

impl KeyDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            class_name: None,
            values: Vec::new(),
            children: Vec::new(),
            list_kind: ListKind::HashLeaf,
        }
    }

    pub fn class(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    pub fn value(mut self, value: ValueDef) -> Self {
        self.values.push(value);
        self
    }

    pub fn child(mut self, child: KeyDef) -> Self {
        self.children.push(child);
        self
    }

    pub fn list(mut self, kind: ListKind) -> Self {
        self.list_kind = kind;
        self
    }
}

/// A laid-out hive image and the offsets of its records.
#[derive(Debug, Clone)]
pub struct BuiltHive {
    pub bytes: Vec<u8>,
    /// Key node offset by path; the root is `""`, children are `A\B`.
    pub keys: BTreeMap<String, u32>,
    /// Sub key list offset by key path.
    pub sub_key_lists: BTreeMap<String, u32>,
    /// Value list offset by key path.
    pub value_lists: BTreeMap<String, u32>,
    /// Value key offsets by key path, in list order.
    pub values: BTreeMap<String, Vec<u32>>,
}

impl BuiltHive {
    pub fn key(&self, path: &str) -> u32 {
        self.keys[path]
    }

    fn absolute(offset: u32) -> usize {
        BASE_BLOCK_SIZE + offset as usize
    }

    /// Overwrites bytes inside the data of the cell at `offset`.
    pub fn patch(&mut self, offset: u32, field: usize, bytes: &[u8]) {
        let start = Self::absolute(offset) + 4 + field;
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Replaces the two-byte signature of the cell at `offset`.
    pub fn break_signature(&mut self, offset: u32) {
        self.patch(offset, 0, b"zz");
    }

    /// Marks the cell at `offset` as free.
    pub fn free_cell(&mut self, offset: u32) {
        let start = Self::absolute(offset);
        let size = i32::from_le_bytes(self.bytes[start..start + 4].try_into().unwrap());
        self.bytes[start..start + 4].copy_from_slice(&size.abs().to_le_bytes());
    }

    /// Reads a little-endian u32 from the data of the cell at `offset`.
    pub fn read_u32(&self, offset: u32, field: usize) -> u32 {
        let start = Self::absolute(offset) + 4 + field;
        u32::from_le_bytes(self.bytes[start..start + 4].try_into().unwrap())
    }

    /// Recomputes the base block checksum after the header was edited.
    pub fn update_checksum(&mut self) {
        let value = checksum(&self.bytes[..BASE_BLOCK_SIZE]);
        self.bytes[0x1FC..0x200].copy_from_slice(&value.to_le_bytes());
    }

    pub fn source(&self) -> Arc<MemorySource> {
        Arc::new(MemorySource::new(self.bytes.clone()))
    }
}

struct Layout {
    data: Vec<u8>,
    bin_start: usize,
    bin_end: usize,
    minor_version: u32,
    security_offset: u32,
    built: BuiltHive,
}

impl Layout {
    fn new(minor_version: u32) -> Self {
        let mut layout = Self {
            data: vec![0u8; BASE_BLOCK_SIZE],
            bin_start: BASE_BLOCK_SIZE,
            bin_end: BASE_BLOCK_SIZE,
            minor_version,
            security_offset: NO_CELL,
            built: BuiltHive {
                bytes: Vec::new(),
                keys: BTreeMap::new(),
                sub_key_lists: BTreeMap::new(),
                value_lists: BTreeMap::new(),
                values: BTreeMap::new(),
            },
        };
        layout.open_bin(HBIN_SIZE);
        layout
    }

    fn open_bin(&mut self, size: usize) {
        self.close_bin();
        let start = self.data.len();
        self.data.resize(start + size, 0);
        let header = &mut self.data[start..start + 0x20];
        header[0..4].copy_from_slice(b"hbin");
        header[0x04..0x08].copy_from_slice(&((start - BASE_BLOCK_SIZE) as u32).to_le_bytes());
        header[0x08..0x0C].copy_from_slice(&(size as u32).to_le_bytes());
        header[0x14..0x1C].copy_from_slice(&TIMESTAMP.to_le_bytes());
        self.bin_start = start + 0x20;
        self.bin_end = start + size;
    }

    /// Turns the unused tail of the current bin into one free cell.
    fn close_bin(&mut self) {
        let remaining = self.bin_end - self.bin_start;
        if remaining >= 8 {
            let at = self.bin_start;
            self.data[at..at + 4].copy_from_slice(&(remaining as i32).to_le_bytes());
        }
        self.bin_start = self.bin_end;
    }

    fn alloc(&mut self, payload: &[u8]) -> u32 {
        let size = (payload.len() + 4 + 7) / 8 * 8;
        if self.bin_end - self.bin_start < size {
            let bin_size = (size + 0x20 + HBIN_SIZE - 1) / HBIN_SIZE * HBIN_SIZE;
            self.open_bin(bin_size);
        }

        let at = self.bin_start;
        self.data[at..at + 4].copy_from_slice(&(-(size as i32)).to_le_bytes());
        self.data[at + 4..at + 4 + payload.len()].copy_from_slice(payload);
        self.bin_start += size;
        (at - BASE_BLOCK_SIZE) as u32
    }

    fn patch_u32(&mut self, offset: u32, field: usize, value: u32) {
        let at = BASE_BLOCK_SIZE + offset as usize + 4 + field;
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn patch_u16(&mut self, offset: u32, field: usize, value: u16) {
        let at = BASE_BLOCK_SIZE + offset as usize + 4 + field;
        self.data[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn security(&mut self) -> u32 {
        if self.security_offset == NO_CELL {
            let mut sk = vec![0u8; 0x14];
            sk[0..2].copy_from_slice(b"sk");
            sk[0x0C..0x10].copy_from_slice(&1u32.to_le_bytes());
            sk[0x10..0x14].copy_from_slice(&(SECURITY_DESCRIPTOR.len() as u32).to_le_bytes());
            sk.extend_from_slice(&SECURITY_DESCRIPTOR);
            let offset = self.alloc(&sk);
            self.patch_u32(offset, 0x04, offset);
            self.patch_u32(offset, 0x08, offset);
            self.security_offset = offset;
        }
        self.security_offset
    }

    fn key(&mut self, def: &KeyDef, parent: u32, path: &str, is_root: bool) -> u32 {
        let (name, mut flags) = encode_name(&def.name, KEY_COMP_NAME);
        if is_root {
            flags |= KEY_ROOT;
        }

        let mut nk = vec![0u8; 0x4C];
        nk[0..2].copy_from_slice(b"nk");
        nk[0x02..0x04].copy_from_slice(&flags.to_le_bytes());
        nk[0x04..0x0C].copy_from_slice(&TIMESTAMP.to_le_bytes());
        nk[0x10..0x14].copy_from_slice(&parent.to_le_bytes());
        for field in [0x1C, 0x20, 0x28, 0x30] {
            nk[field..field + 4].copy_from_slice(&NO_CELL.to_le_bytes());
        }
        nk[0x48..0x4A].copy_from_slice(&(name.len() as u16).to_le_bytes());
        nk.extend_from_slice(&name);

        let offset = self.alloc(&nk);
        self.built.keys.insert(path.to_string(), offset);

        let security = self.security();
        self.patch_u32(offset, 0x2C, security);

        if !def.children.is_empty() {
            let children: Vec<(u32, &str)> = def
                .children
                .iter()
                .map(|child| {
                    let child_path = if path.is_empty() {
                        child.name.clone()
                    } else {
                        format!("{}\\{}", path, child.name)
                    };
                    (self.key(child, offset, &child_path, false), child.name.as_str())
                })
                .collect();

            let list = self.sub_key_list(&children, def.list_kind);
            self.built.sub_key_lists.insert(path.to_string(), list);
            self.patch_u32(offset, 0x14, children.len() as u32);
            self.patch_u32(offset, 0x1C, list);
        }

        if !def.values.is_empty() {
            let offsets: Vec<u32> = def.values.iter().map(|value| self.value(value)).collect();
            let list: Vec<u8> = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
            let list_offset = self.alloc(&list);
            self.built.value_lists.insert(path.to_string(), list_offset);
            self.built.values.insert(path.to_string(), offsets.clone());
            self.patch_u32(offset, 0x24, offsets.len() as u32);
            self.patch_u32(offset, 0x28, list_offset);
        }

        if let Some(class_name) = &def.class_name {
            let bytes: Vec<u8> = class_name.encode_utf16().flat_map(u16::to_le_bytes).collect();
            let class_offset = self.alloc(&bytes);
            self.patch_u32(offset, 0x30, class_offset);
            self.patch_u16(offset, 0x4A, bytes.len() as u16);
        }

        offset
    }

    fn leaf(&mut self, signature: &[u8; 2], entries: &[(u32, &str)]) -> u32 {
        let mut list = Vec::new();
        list.extend_from_slice(signature);
        list.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (offset, name) in entries {
            list.extend_from_slice(&offset.to_le_bytes());
            match signature {
                b"lf" => {
                    let mut hint = [0u8; 4];
                    for (slot, byte) in hint.iter_mut().zip(name.bytes()) {
                        *slot = byte;
                    }
                    list.extend_from_slice(&hint);
                }
                b"lh" => list.extend_from_slice(&name_hash(name).to_le_bytes()),
                _ => {}
            }
        }
        self.alloc(&list)
    }

    fn sub_key_list(&mut self, children: &[(u32, &str)], kind: ListKind) -> u32 {
        match kind {
            ListKind::IndexLeaf => self.leaf(b"li", children),
            ListKind::FastLeaf => self.leaf(b"lf", children),
            ListKind::HashLeaf => self.leaf(b"lh", children),
            ListKind::IndexRoot(chunk) => {
                let leaves: Vec<u32> = children
                    .chunks(chunk.max(1))
                    .map(|entries| self.leaf(b"lh", entries))
                    .collect();
                let mut ri = Vec::new();
                ri.extend_from_slice(b"ri");
                ri.extend_from_slice(&(leaves.len() as u16).to_le_bytes());
                for leaf in leaves {
                    ri.extend_from_slice(&leaf.to_le_bytes());
                }
                self.alloc(&ri)
            }
        }
    }

    fn value(&mut self, def: &ValueDef) -> u32 {
        let (name, flags) = encode_name(&def.name, VALUE_COMP_NAME);
        let size = def.data.len() as u32;

        let (stored_size, data_offset) = if def.data.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..def.data.len()].copy_from_slice(&def.data);
            (size | 0x8000_0000, u32::from_le_bytes(inline))
        } else if def.data.len() > BIG_DATA_SEGMENT && self.minor_version >= 4 {
            (size, self.big_data(&def.data))
        } else {
            (size, self.alloc(&def.data))
        };

        let mut vk = vec![0u8; 0x14];
        vk[0..2].copy_from_slice(b"vk");
        vk[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
        vk[0x04..0x08].copy_from_slice(&stored_size.to_le_bytes());
        vk[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
        vk[0x0C..0x10].copy_from_slice(&def.value_type.to_le_bytes());
        vk[0x10..0x12].copy_from_slice(&flags.to_le_bytes());
        vk.extend_from_slice(&name);
        self.alloc(&vk)
    }

    fn big_data(&mut self, data: &[u8]) -> u32 {
        let segments: Vec<u32> = data
            .chunks(BIG_DATA_SEGMENT)
            .map(|chunk| self.alloc(chunk))
            .collect();
        let list: Vec<u8> = segments.iter().flat_map(|o| o.to_le_bytes()).collect();
        let list_offset = self.alloc(&list);

        let mut db = Vec::new();
        db.extend_from_slice(b"db");
        db.extend_from_slice(&(segments.len() as u16).to_le_bytes());
        db.extend_from_slice(&list_offset.to_le_bytes());
        self.alloc(&db)
    }

    fn finish(mut self, root: u32) -> BuiltHive {
        self.close_bin();
        let bins_size = (self.data.len() - BASE_BLOCK_SIZE) as u32;

        let header = &mut self.data[..BASE_BLOCK_SIZE];
        header[0..4].copy_from_slice(b"regf");
        header[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());
        header[0x08..0x0C].copy_from_slice(&1u32.to_le_bytes());
        header[0x0C..0x14].copy_from_slice(&TIMESTAMP.to_le_bytes());
        header[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        header[0x18..0x1C].copy_from_slice(&self.minor_version.to_le_bytes());
        header[0x20..0x24].copy_from_slice(&1u32.to_le_bytes());
        header[0x24..0x28].copy_from_slice(&root.to_le_bytes());
        header[0x28..0x2C].copy_from_slice(&bins_size.to_le_bytes());
        header[0x2C..0x30].copy_from_slice(&1u32.to_le_bytes());
        for (i, unit) in "\\test\\hive".encode_utf16().enumerate() {
            header[0x30 + i * 2..0x32 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        let checksum = checksum(header);
        header[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        let mut built = self.built;
        built.bytes = self.data;
        built
    }
}

fn encode_name(name: &str, compressed_flag: u16) -> (Vec<u8>, u16) {
    if name.chars().all(|c| (c as u32) < 0x80) {
        (name.as_bytes().to_vec(), compressed_flag)
    } else {
        (name.encode_utf16().flat_map(u16::to_le_bytes).collect(), 0)
    }
}

fn name_hash(name: &str) -> u32 {
    name.to_uppercase()
        .encode_utf16()
        .fold(0u32, |hash, unit| hash.wrapping_mul(37).wrapping_add(u32::from(unit)))
}

fn checksum(header: &[u8]) -> u32 {
    let value = header[..0x1FC]
        .chunks_exact(4)
        .fold(0u32, |acc, dword| acc ^ u32::from_le_bytes(dword.try_into().unwrap()));
    match value {
        0 => 1,
        0xFFFF_FFFF => 0xFFFF_FFFE,
        other => other,
    }
}

/// Lays out `root` as a version 1.5 hive.
pub fn build_hive(root: &KeyDef) -> BuiltHive {
    build_hive_with_version(root, 5)
}

pub fn build_hive_with_version(root: &KeyDef, minor_version: u32) -> BuiltHive {
    let mut layout = Layout::new(minor_version);
    let offset = layout.key(root, NO_CELL, "", true);
    layout.finish(offset)
}

/// A small tree exercising every list form and value storage.
pub fn sample_tree() -> KeyDef {
    KeyDef::new("ROOT")
        .class("RootClass")
        .value(ValueDef::string("", "default"))
        .child(
            KeyDef::new("Software")
                .list(ListKind::FastLeaf)
                .child(
                    KeyDef::new("Vendor")
                        .value(ValueDef::dword("Version", 7))
                        .value(ValueDef::string("Path", "C:\\Program Files\\Vendor"))
                        .child(KeyDef::new("Settings").value(ValueDef::new("Blob", 3, &[1, 2, 3, 4, 5, 6]))),
                )
                .child(KeyDef::new("Abc")),
        )
        .child(
            KeyDef::new("System")
                .list(ListKind::IndexRoot(2))
                .child(KeyDef::new("ControlSet001"))
                .child(KeyDef::new("ControlSet002"))
                .child(KeyDef::new("Select").value(ValueDef::dword("Current", 1)))
                .child(KeyDef::new("Setup")),
        )
        .child(
            KeyDef::new("Legacy")
                .list(ListKind::IndexLeaf)
                .child(KeyDef::new("Old")),
        )
        .child(KeyDef::new("\u{c4}rger").value(ValueDef::dword("\u{e9}t\u{e9}", 2)))
}

/// Byte source wrapper that counts `read_at` calls.
pub struct CountingSource {
    inner: MemorySource,
    reads: AtomicUsize,
}

impl CountingSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            inner: MemorySource::new(bytes),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ByteSource for CountingSource {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_at(offset, length)
    }
}
