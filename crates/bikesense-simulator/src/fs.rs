//! Storage medium backed by a directory on the host

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bikesense_core::storage::{DirEntry, FileSystem, StorageError};

/// Maps medium paths onto files below `root`. Plays the SD card.
#[derive(Debug, Clone)]
pub struct StdFs {
    root: PathBuf,
}

impl StdFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

fn storage_error(path: &str, e: io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::NotFound => StorageError::not_found(path),
        _ => StorageError::io(path, &e.to_string()),
    }
}

impl FileSystem for StdFs {
    fn probe(&mut self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| StorageError::unavailable(&e.to_string()))?;
        let meta = fs::metadata(&self.root).map_err(|e| StorageError::unavailable(&e.to_string()))?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StorageError::unavailable("data root is not a directory"))
        }
    }

    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        self.resolve(path)
            .try_exists()
            .map_err(|e| storage_error(path, e))
    }

    fn size(&mut self, path: &str) -> Result<u64, StorageError> {
        fs::metadata(self.resolve(path))
            .map(|meta| meta.len())
            .map_err(|e| storage_error(path, e))
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path))
            .map_err(|e| storage_error(path, e))?;
        file.write_all(data).map_err(|e| storage_error(path, e))
    }

    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut file = File::open(self.resolve(path)).map_err(|e| storage_error(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| storage_error(path, e))?;
        file.read(buf).map_err(|e| storage_error(path, e))
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        fs::rename(self.resolve(from), self.resolve(to)).map_err(|e| storage_error(from, e))
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path);
        let result = if target.is_dir() {
            fs::remove_dir(target)
        } else {
            fs::remove_file(target)
        };
        result.map_err(|e| storage_error(path, e))
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        fs::create_dir(self.resolve(path)).map_err(|e| storage_error(path, e))
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)).map_err(|e| storage_error(path, e))? {
            let entry = entry.map_err(|e| storage_error(path, e))?;
            let meta = entry.metadata().map_err(|e| storage_error(path, e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                is_dir: meta.is_dir(),
            });
        }
        // Directory order is unspecified on the host
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bikesense_core::storage::{AppendLog, BackupTag, DATA_FILE};
    use embassy_time::Instant;
    use std::sync::atomic::{AtomicU32, Ordering};

    static NEXT_DIR: AtomicU32 = AtomicU32::new(0);

    fn scratch() -> StdFs {
        let dir = std::env::temp_dir().join(format!(
            "bikesense-fs-{}-{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = fs::remove_dir_all(&dir);
        let mut fs = StdFs::new(dir);
        fs.probe().unwrap();
        fs
    }

    #[test]
    fn test_append_and_read_back() {
        let mut fs = scratch();
        fs.append("a.txt", b"hello ").unwrap();
        fs.append("a.txt", b"world").unwrap();

        let mut buf = [0u8; 16];
        let n = fs.read_at("a.txt", 6, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"world");
        assert_eq!(fs.size("a.txt").unwrap(), 11);
        fs::remove_dir_all(fs.root()).unwrap();
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let mut fs = scratch();
        assert!(!fs.exists("nope.txt").unwrap());
        assert!(matches!(fs.size("nope.txt"), Err(StorageError::NotFound(_))));
        fs::remove_dir_all(fs.root()).unwrap();
    }

    #[test]
    fn test_append_log_over_host_directory() {
        let fs = scratch();
        let root = fs.root().to_path_buf();
        let mut log = AppendLog::new(fs);
        for i in 0..3 {
            log.store(&format!("{{\"n\":{i}}}")).unwrap();
        }

        let backup = log
            .backup(DATA_FILE, BackupTag::resume(7, 1), Instant::from_millis(42))
            .unwrap();
        assert_eq!(backup, "backups/bikesense42-7-1.txt");
        assert_eq!(log.list_backups().unwrap(), [backup.clone()]);

        let first = log.retrieve(&backup, 10).unwrap().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[2], "{\"n\":2}");
        fs::remove_dir_all(root).unwrap();
    }
}
