//! Cell signatures, key node flags and value type tags.
//!
//! Every record cell except value lists starts with a 2-byte signature that
//! identifies its kind.

use std::borrow::Cow;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Cell type signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum CellType {
    /// Key node (nk) - represents a registry key.
    KeyNode,

    /// Value key (vk) - represents a registry value.
    ValueKey,

    /// Security key (sk) - holds a shared security descriptor.
    Security,

    /// Index leaf (li) - list of subkey offsets.
    IndexLeaf,

    /// Fast leaf (lf) - list of subkeys with name hints.
    FastLeaf,

    /// Hash leaf (lh) - list of subkeys with name hashes.
    HashLeaf,

    /// Index root (ri) - list of subkey list offsets.
    IndexRoot,

    /// Data block (db) - big data block.
    DataBlock,
}

impl CellType {
    /// Parses a cell type from a 2-byte signature.
    pub fn from_signature(sig: &[u8; 2]) -> Option<Self> {
        match sig {
            b"nk" => Some(CellType::KeyNode),
            b"vk" => Some(CellType::ValueKey),
            b"sk" => Some(CellType::Security),
            b"li" => Some(CellType::IndexLeaf),
            b"lf" => Some(CellType::FastLeaf),
            b"lh" => Some(CellType::HashLeaf),
            b"ri" => Some(CellType::IndexRoot),
            b"db" => Some(CellType::DataBlock),
            _ => None,
        }
    }

    /// Reads the cell type from the first two bytes of cell data.
    pub fn from_cell_data(data: &[u8]) -> Option<Self> {
        match data {
            [a, b, ..] => Self::from_signature(&[*a, *b]),
            _ => None,
        }
    }

    /// Returns the 2-byte signature for this cell type.
    pub fn signature(&self) -> &'static [u8; 2] {
        match self {
            CellType::KeyNode => b"nk",
            CellType::ValueKey => b"vk",
            CellType::Security => b"sk",
            CellType::IndexLeaf => b"li",
            CellType::FastLeaf => b"lf",
            CellType::HashLeaf => b"lh",
            CellType::IndexRoot => b"ri",
            CellType::DataBlock => b"db",
        }
    }

    /// Returns true if this cell type represents a subkey list.
    pub fn is_subkey_list(&self) -> bool {
        matches!(
            self,
            CellType::IndexLeaf | CellType::FastLeaf | CellType::HashLeaf | CellType::IndexRoot
        )
    }
}

/// Flags for key nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct KeyNodeFlags(pub u16);

impl KeyNodeFlags {
    /// Key is volatile (not stored on disk).
    pub const VOLATILE: u16 = 0x0001;

    /// Key is a mount point for another hive.
    pub const HIVE_EXIT: u16 = 0x0002;

    /// Key is the root key.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key cannot be deleted.
    pub const NO_DELETE: u16 = 0x0008;

    /// Key is a symbolic link.
    pub const SYM_LINK: u16 = 0x0010;

    /// Key name is in compressed format (ASCII).
    pub const COMP_NAME: u16 = 0x0020;

    /// Key is a predefined handle.
    pub const PREDEF_HANDLE: u16 = 0x0040;

    /// Creates a new KeyNodeFlags from a u16 value.
    pub fn new(flags: u16) -> Self {
        Self(flags)
    }

    /// Returns true if the specified flag is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Returns true if the key name is compressed (ASCII).
    pub fn is_compressed(&self) -> bool {
        self.has_flag(Self::COMP_NAME)
    }

    /// Returns true if this is a volatile key.
    pub fn is_volatile(&self) -> bool {
        self.has_flag(Self::VOLATILE)
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.has_flag(Self::ROOT_KEY)
    }

    /// Returns true if the key is a symbolic link.
    pub fn is_symbolic_link(&self) -> bool {
        self.has_flag(Self::SYM_LINK)
    }
}

/// Flags for value keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ValueKeyFlags(pub u16);

impl ValueKeyFlags {
    /// Value name is in compressed format (ASCII).
    pub const COMP_NAME: u16 = 0x0001;

    /// Returns true if the value name is compressed (ASCII).
    pub fn is_compressed(&self) -> bool {
        (self.0 & Self::COMP_NAME) != 0
    }
}

/// Registry value data types.
///
/// Only the tag is interpreted here; the payload stays raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ValueType {
    /// No value type.
    None,

    /// String (null-terminated).
    String,

    /// String with environment variables.
    ExpandString,

    /// Binary data.
    Binary,

    /// 32-bit little-endian integer.
    Dword,

    /// 32-bit big-endian integer.
    DwordBigEndian,

    /// Symbolic link (Unicode).
    Link,

    /// Multiple strings.
    MultiString,

    /// Resource list.
    ResourceList,

    /// Full resource descriptor.
    FullResourceDescriptor,

    /// Resource requirements list.
    ResourceRequirementsList,

    /// 64-bit little-endian integer.
    Qword,

    /// Unknown or non-standard value type.
    /// Contains the raw type value.
    Unknown(u32),
}

impl From<u32> for ValueType {
    fn from(value: u32) -> Self {
        match value {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::Dword,
            5 => ValueType::DwordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            8 => ValueType::ResourceList,
            9 => ValueType::FullResourceDescriptor,
            10 => ValueType::ResourceRequirementsList,
            11 => ValueType::Qword,
            _ => ValueType::Unknown(value),
        }
    }
}

impl ValueType {
    /// Returns the on-disk type number.
    pub fn raw(&self) -> u32 {
        match self {
            ValueType::None => 0,
            ValueType::String => 1,
            ValueType::ExpandString => 2,
            ValueType::Binary => 3,
            ValueType::Dword => 4,
            ValueType::DwordBigEndian => 5,
            ValueType::Link => 6,
            ValueType::MultiString => 7,
            ValueType::ResourceList => 8,
            ValueType::FullResourceDescriptor => 9,
            ValueType::ResourceRequirementsList => 10,
            ValueType::Qword => 11,
            ValueType::Unknown(value) => *value,
        }
    }

    /// Returns the conventional `REG_*` name of this value type.
    pub fn name(&self) -> Cow<'static, str> {
        let known = match self {
            ValueType::None => "REG_NONE",
            ValueType::String => "REG_SZ",
            ValueType::ExpandString => "REG_EXPAND_SZ",
            ValueType::Binary => "REG_BINARY",
            ValueType::Dword => "REG_DWORD",
            ValueType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN",
            ValueType::Link => "REG_LINK",
            ValueType::MultiString => "REG_MULTI_SZ",
            ValueType::ResourceList => "REG_RESOURCE_LIST",
            ValueType::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR",
            ValueType::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST",
            ValueType::Qword => "REG_QWORD",
            ValueType::Unknown(raw) => return Cow::Owned(format!("REG_UNKNOWN_{:#010x}", raw)),
        };
        Cow::Borrowed(known)
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}
