//! Random-access byte providers backing an opened hive.

use crate::error::{RegistryError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Random-access, read-only view of a hive file or image.
///
/// Implementations must be safe to share across threads; every handle
/// derived from one hive reads through the same source.
pub trait ByteSource: Send + Sync {
    /// Total number of bytes available.
    fn len(&self) -> u64;

    /// Reads exactly `length` bytes starting at the absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns `TruncatedData` if the range extends past the end of the
    /// source, or `Io` if the underlying storage fails.
    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>>;

    /// Returns true if the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn copy_range(data: &[u8], offset: u64, length: usize) -> Result<Vec<u8>> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX);
    data.get(start..start.saturating_add(length))
        .map(<[u8]>::to_vec)
        .ok_or(RegistryError::TruncatedData {
            offset,
            expected: length,
            actual: data.len().saturating_sub(start),
        })
}

/// Memory-mapped hive file.
pub struct MmapSource {
    mmap: Mmap,
}

impl MmapSource {
    /// Maps a hive file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;

        // SAFETY: The file is opened read-only and the mapping is never
        // written through. All access goes through bounds-checked reads in
        // `read_at`. Concurrent truncation of the file by another process is
        // outside what this crate can guard against.
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(size = mmap.len(), "Memory mapped hive file");

        Ok(Self { mmap })
    }
}

impl ByteSource for MmapSource {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        copy_range(&self.mmap, offset, length)
    }
}

/// Hive image held in memory.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    /// Wraps an owned hive image.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        copy_range(&self.data, offset, length)
    }
}
