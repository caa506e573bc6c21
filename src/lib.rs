//! # Windows Registry Hive Navigation
//!
//! A read-only, lazily evaluated navigator for Windows registry hive files
//! (the REGF format).
//!
//! ## Features
//!
//! - **Lazy resolution**: opening a hive reads only the base block and the
//!   bin headers; keys and values read their cells when first queried
//! - **Cached handles**: each handle decodes a cell at most once, even when
//!   shared between threads
//! - **Corruption containment**: a broken cell marks the key that followed
//!   it as corrupted without poisoning the rest of the hive
//! - **Pluggable storage**: memory-mapped files, in-memory images, or any
//!   [`ByteSource`]
//!
//! ## Architecture
//!
//! The crate is built in layers:
//!
//! 1. **Byte source**: random-access reads of the hive image
//! 2. **Base block and bins**: header validation and the bin index
//! 3. **Cells**: offset resolution with size and alignment checks
//! 4. **Records**: decoding of `nk`, `vk`, `li`/`lf`/`lh`/`ri`, `sk`, `db`
//!    and value lists
//! 5. **Handles**: [`RegistryKey`] and [`RegistryValue`], which resolve
//!    records on demand
//!
//! ## Binary Layout
//!
//! ```text
//! [Base Block - 4KB]
//!   - Signature: "regf"
//!   - Sequence numbers, version, root offset
//!   - Checksum
//!
//! [Hive Bins - 4KB aligned]
//!   [Hbin Header - 32 bytes]
//!   [Cells]
//!     [Cell Size - 4 bytes, negative if allocated]
//!     [Cell Data]
//! ```
//!
//! ## Examples
//!
//! ```no_run
//! use regf_nav::Hive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = Hive::open("NTUSER.DAT")?;
//! let root = hive.root_key()?;
//! println!("Root key: {}", root.name()?);
//!
//! for sub_key in root.sub_keys()? {
//!     println!("  Sub key: {}", sub_key.name()?);
//! }
//!
//! let run = hive.key_by_path("Software\\Microsoft\\Windows\\CurrentVersion\\Run", '\\')?;
//! for value in run.values()? {
//!     let value = value?;
//!     println!("  {} ({}) = {} bytes", value.name()?, value.value_type()?, value.data_size()?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bigdata;
pub mod cell;
pub mod error;
pub mod guard;
pub mod hbin;
pub mod header;
pub mod hive;
pub mod key;
pub mod name;
pub mod options;
pub mod record;
pub mod registry_key;
pub mod registry_value;
pub mod security;
pub mod source;
pub mod subkey_list;
pub mod utils;
pub mod value;

pub use cell::{CellType, KeyNodeFlags, ValueKeyFlags, ValueType};
pub use error::{RegistryError, Result};
pub use hbin::{CellView, HbinHeader};
pub use header::BaseBlock;
pub use hive::Hive;
pub use name::{EncodedName, NameEncoding, RegString};
pub use options::{Codepage, HiveOptions};
pub use record::{Record, RecordKind};
pub use registry_key::RegistryKey;
pub use registry_value::RegistryValue;
pub use source::{ByteSource, MemorySource, MmapSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
