//! Persistent storage: the raw medium seam and the append log built on it

mod append_log;
mod backup;
mod record;

pub use append_log::{AppendLog, BACKUP_DIR, DATA_FILE, LOG_FILE, LOG_FILE_MAX_SIZE};
pub use backup::BackupTag;
pub use record::Record;

use alloc::string::String;
use alloc::vec::Vec;
use thiserror_no_std::Error;

use crate::bounded;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage medium unavailable: {0}")]
    Unavailable(heapless::String<64>),
    #[error("file not found: {0}")]
    NotFound(heapless::String<64>),
    #[error("I/O error on {path}: {details}")]
    Io {
        path: heapless::String<64>,
        details: heapless::String<64>,
    },
    #[error("failed to encode record: {0}")]
    Encode(heapless::String<64>),
    #[error("invalid record: {0}")]
    InvalidRecord(&'static str),
}

impl StorageError {
    pub fn unavailable(details: &str) -> Self {
        StorageError::Unavailable(bounded(details))
    }

    pub fn not_found(path: &str) -> Self {
        StorageError::NotFound(bounded(path))
    }

    pub fn io(path: &str, details: &str) -> Self {
        StorageError::Io {
            path: bounded(path),
            details: bounded(details),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name without the directory part
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Raw file primitives of the storage medium.
///
/// Paths are `/`-separated and relative to the medium's root. Implementations
/// only need one level of directories.
pub trait FileSystem {
    /// Check that the medium is mounted and usable
    fn probe(&mut self) -> Result<(), StorageError>;

    fn exists(&mut self, path: &str) -> Result<bool, StorageError>;

    /// Size in bytes, [`StorageError::NotFound`] if the file is missing
    fn size(&mut self, path: &str) -> Result<u64, StorageError>;

    /// Append to the end of `path`, creating it if needed
    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Read up to `buf.len()` bytes starting at `offset`. Returns 0 at end of file.
    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn rename(&mut self, from: &str, to: &str) -> Result<(), StorageError>;

    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError>;

    /// Entries of `path` in the medium's native order
    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>, StorageError>;
}
