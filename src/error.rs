//! Error types for hive navigation.
//!
//! Errors fall into three groups. I/O failures of the byte source are fatal
//! for the operation that hit them. Structural corruption (bad offsets, bad
//! cell sizes, malformed records) is local to the handle that followed the
//! broken edge. Caller-contract violations (small buffers, bad indexes,
//! undecodable names in strict mode) and lookup misses are always reported
//! and never defaulted.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while reading a hive.
///
/// The enum is `Clone` so that a structural failure can be cached on the
/// handle that observed it and reported again on later queries.
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    /// I/O error occurred while reading the hive file.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// Invalid magic signature in header or structure.
    #[error("Invalid signature: expected {}, found {}", hex::encode(expected), hex::encode(found))]
    InvalidSignature {
        /// Signature that was expected.
        expected: Vec<u8>,
        /// Bytes found instead.
        found: Vec<u8>,
    },

    /// Offset does not fall inside the data area of any hive bin.
    #[error("Offset out of bounds: {offset:#x} (hive bins size: {bins_size:#x})")]
    OffsetOutOfBounds {
        /// The offending relative offset.
        offset: u32,
        /// Size of the hive bins data area.
        bins_size: u64,
    },

    /// Cell size is invalid, unaligned, crosses its bin, or the cell is free.
    #[error("Invalid cell size: {size} at offset {offset:#x}")]
    CellSizeInvalid {
        /// Raw signed cell size.
        size: i32,
        /// Offset of the cell.
        offset: u32,
    },

    /// Record does not match the expected layout.
    #[error("Malformed record at offset {offset:#x}: {reason}")]
    MalformedRecord {
        /// Offset of the cell holding the record.
        offset: u32,
        /// What was wrong with it.
        reason: String,
    },

    /// Data truncated or incomplete.
    #[error("Truncated data at offset {offset:#x}: expected {expected} bytes, got {actual} bytes")]
    TruncatedData {
        /// Offset at which the read started.
        offset: u64,
        /// Number of bytes needed.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// Key or value not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied a buffer that cannot hold the result.
    #[error("Buffer too small: {required} elements required, {provided} provided")]
    BufferTooSmall {
        /// Number of elements needed.
        required: usize,
        /// Number of elements supplied.
        provided: usize,
    },

    /// Index is past the end of a sub key or value list.
    #[error("Index {index} out of bounds (count: {count})")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Number of entries.
        count: usize,
    },

    /// Stored string bytes cannot be decoded with the declared encoding.
    #[error("Unable to decode {encoding} string at offset {offset:#x}")]
    Encoding {
        /// Offset of the record holding the string.
        offset: u32,
        /// Name of the encoding that failed.
        encoding: &'static str,
    },

    /// Hive is too small to be valid.
    #[error("Hive too small: {size} bytes (minimum: {minimum} bytes)")]
    HiveTooSmall {
        /// Actual size.
        size: u64,
        /// Minimum size.
        minimum: u64,
    },

    /// Checksum mismatch in hive header.
    #[error("Checksum mismatch: expected {expected:#x}, calculated {calculated:#x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Checksum computed over the base block.
        calculated: u32,
    },

    /// Unsupported hive version.
    #[error("Unsupported hive version: {major}.{minor}")]
    UnsupportedVersion {
        /// Major format version.
        major: u32,
        /// Minor format version.
        minor: u32,
    },
}

impl From<io::Error> for RegistryError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl RegistryError {
    /// Creates an invalid signature error with context.
    pub fn invalid_signature(expected: &[u8], found: &[u8]) -> Self {
        Self::InvalidSignature {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    /// Creates a malformed record error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use regf_nav::error::RegistryError;
    /// let err = RegistryError::malformed(0x20, "name runs past the end of the cell");
    /// assert!(err.is_corruption());
    /// ```
    pub fn malformed(offset: u32, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a not found error with context about what was being searched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use regf_nav::error::RegistryError;
    /// let err = RegistryError::not_found("value", "DisplayName");
    /// assert!(err.is_not_found());
    /// ```
    pub fn not_found(item_type: &str, name: &str) -> Self {
        Self::NotFound(format!("{} '{}'", item_type, name))
    }

    /// Returns true if this error describes structural corruption of the hive.
    ///
    /// Corruption is recorded on the handle that followed the broken edge and
    /// does not stop traversal of sibling keys.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::OffsetOutOfBounds { .. }
                | Self::CellSizeInvalid { .. }
                | Self::MalformedRecord { .. }
                | Self::TruncatedData { .. }
                | Self::InvalidSignature { .. }
        )
    }

    /// Returns true if this is the outcome of a lookup that matched nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_classification() {
        assert!(RegistryError::malformed(0, "x").is_corruption());
        assert!(RegistryError::CellSizeInvalid { size: 3, offset: 0 }.is_corruption());
        assert!(RegistryError::OffsetOutOfBounds { offset: 0, bins_size: 0 }.is_corruption());
        assert!(!RegistryError::not_found("key", "x").is_corruption());
        assert!(!RegistryError::BufferTooSmall { required: 2, provided: 1 }.is_corruption());
        assert!(!RegistryError::from(io::Error::new(io::ErrorKind::Other, "boom")).is_corruption());
    }

    #[test]
    fn test_signature_display_is_hex() {
        let err = RegistryError::invalid_signature(b"nk", b"XX");
        assert_eq!(err.to_string(), "Invalid signature: expected 6e6b, found 5858");
    }

    #[test]
    fn test_clone_keeps_io_source() {
        let err = RegistryError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        let cloned = err.clone();
        assert!(matches!(cloned, RegistryError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }
}
