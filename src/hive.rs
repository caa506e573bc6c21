//! Opening a hive and navigating from its root key.

use crate::error::{RegistryError, Result};
use crate::hbin::{BinsIndex, CellView, HbinHeader};
use crate::header::{BaseBlock, BASE_BLOCK_SIZE};
use crate::name::{EncodedName, RegString};
use crate::options::HiveOptions;
use crate::registry_key::RegistryKey;
use crate::source::{ByteSource, MemorySource, MmapSource};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// State shared by every handle derived from one opened hive.
pub(crate) struct HiveContext {
    pub(crate) bins: BinsIndex,
    pub(crate) base_block: BaseBlock,
    pub(crate) options: HiveOptions,
}

impl HiveContext {
    pub(crate) fn read_cell(&self, offset: u32) -> Result<CellView> {
        self.bins.read_cell(offset)
    }

    /// Binds a stored name to this hive's decoding options.
    pub(crate) fn reg_string(&self, name: EncodedName, offset: u32) -> RegString {
        RegString::new(
            name,
            self.options.ascii_codepage,
            self.options.strict_encoding,
            offset,
        )
    }
}

/// An opened registry hive.
///
/// The hive owns its byte source and the bin index built when it was opened.
/// Keys and values obtained from it share that state and stay valid after
/// the `Hive` itself is dropped.
///
/// # Thread Safety
///
/// `Hive`, [`RegistryKey`] and [`crate::RegistryValue`] are `Send + Sync`.
/// Handles resolve their fields lazily under per-field locks, so concurrent
/// readers of one handle never observe partially decoded state.
#[derive(Clone)]
pub struct Hive {
    context: Arc<HiveContext>,
}

impl fmt::Debug for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hive")
            .field("base_block", &self.context.base_block)
            .field("bins", &self.context.bins)
            .finish()
    }
}

impl Hive {
    /// Opens a hive file with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened or mapped
    /// - The file is smaller than the base block
    /// - The base block signature, version or checksum is invalid
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use regf_nav::Hive;
    ///
    /// let hive = Hive::open("NTUSER.DAT").unwrap();
    /// let root = hive.root_key().unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, HiveOptions::default())
    }

    /// Opens a hive file with explicit options.
    #[instrument(skip(path, options), fields(path = %path.as_ref().display()))]
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: HiveOptions) -> Result<Self> {
        info!("Opening registry hive");
        let source = MmapSource::open(&path)?;
        Self::from_source(Arc::new(source), options)
    }

    /// Opens a hive image held in memory.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::from_source(Arc::new(MemorySource::new(data)), HiveOptions::default())
    }

    /// Opens a hive over any byte source.
    ///
    /// Reads and validates the base block, then scans the bin headers. No
    /// key or value cell is read until a handle asks for it.
    pub fn from_source(source: Arc<dyn ByteSource>, options: HiveOptions) -> Result<Self> {
        let size = source.len();
        if size < BASE_BLOCK_SIZE as u64 {
            return Err(RegistryError::HiveTooSmall {
                size,
                minimum: BASE_BLOCK_SIZE as u64,
            });
        }

        let header = source.read_at(0, BASE_BLOCK_SIZE)?;
        let base_block = BaseBlock::parse(&header)?;
        debug!(header = %base_block, "Parsed base block");

        if !base_block.is_checksum_valid() {
            if options.verify_checksum {
                return Err(RegistryError::ChecksumMismatch {
                    expected: base_block.checksum,
                    calculated: base_block.calculated_checksum,
                });
            }
            warn!(
                expected = %format!("{:#x}", base_block.checksum),
                calculated = %format!("{:#x}", base_block.calculated_checksum),
                "Base block checksum mismatch"
            );
        }

        if !base_block.is_consistent() {
            warn!(
                primary = base_block.primary_sequence,
                secondary = base_block.secondary_sequence,
                "Hive was not cleanly written, reading it as stored"
            );
        }

        let bins = BinsIndex::scan(source, base_block.hive_bins_size)?;

        Ok(Self {
            context: Arc::new(HiveContext {
                bins,
                base_block,
                options,
            }),
        })
    }

    /// Returns the parsed base block.
    pub fn base_block(&self) -> &BaseBlock {
        &self.context.base_block
    }

    /// Returns the options the hive was opened with.
    pub fn options(&self) -> &HiveOptions {
        &self.context.options
    }

    /// Returns the hive bins found when the hive was opened.
    pub fn bins(&self) -> &[HbinHeader] {
        self.context.bins.bins()
    }

    /// Returns the root key.
    ///
    /// # Errors
    ///
    /// Fails if the root cell is not a readable key node.
    #[instrument(skip(self))]
    pub fn root_key(&self) -> Result<RegistryKey> {
        let offset = self.context.base_block.root_cell_offset;
        debug!(offset = %format!("{:#x}", offset), "Accessing root key");

        let root = RegistryKey::new(self.context.clone(), offset);
        root.resolve()?;
        Ok(root)
    }

    /// Resolves a separator-delimited path from the root key.
    ///
    /// Separators are handled as in [`RegistryKey::sub_key_by_path`]; an
    /// empty path returns the root.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use regf_nav::Hive;
    ///
    /// let hive = Hive::open("SOFTWARE").unwrap();
    /// let key = hive.key_by_path("Microsoft\\Windows\\CurrentVersion", '\\').unwrap();
    /// ```
    #[instrument(skip(self))]
    pub fn key_by_path(&self, path: &str, separator: char) -> Result<RegistryKey> {
        self.root_key()?.sub_key_by_path(path, separator)
    }

    /// Resolves a UTF-16 path from the root key.
    pub fn key_by_utf16_path(&self, path: &[u16], separator: u16) -> Result<RegistryKey> {
        self.root_key()?.sub_key_by_utf16_path(path, separator)
    }
}
