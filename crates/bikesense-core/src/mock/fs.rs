//! In-memory storage medium

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::storage::{DirEntry, FileSystem, StorageError};

#[derive(Debug, Default)]
struct FsState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    unavailable: bool,
}

impl FsState {
    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable {
            Err(StorageError::unavailable("card removed"))
        } else {
            Ok(())
        }
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some((parent, _)) => self.dirs.contains(parent),
            None => true,
        }
    }
}

/// Storage medium backed by a map of path to bytes.
///
/// Directory listings come back sorted by name. Writing into a directory that
/// was never created fails like it would on a real card.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    state: Rc<RefCell<FsState>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate pulling or reinserting the card
    pub fn set_available(&self, available: bool) {
        self.state.borrow_mut().unavailable = !available;
    }

    /// Write `contents` to `path`, replacing it and creating its directory
    pub fn seed(&self, path: &str, contents: &str) {
        let mut state = self.state.borrow_mut();
        let mut rest = path;
        while let Some((parent, _)) = rest.rsplit_once('/') {
            state.dirs.insert(String::from(parent));
            rest = parent;
        }
        state
            .files
            .insert(String::from(path), Vec::from(contents.as_bytes()));
    }

    pub fn contents(&self, path: &str) -> Option<String> {
        self.state
            .borrow()
            .files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Every file path, sorted
    pub fn files(&self) -> Vec<String> {
        self.state.borrow().files.keys().cloned().collect()
    }
}

impl FileSystem for MemoryFs {
    fn probe(&mut self) -> Result<(), StorageError> {
        self.state.borrow().check()
    }

    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        let state = self.state.borrow();
        state.check()?;
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }

    fn size(&mut self, path: &str) -> Result<u64, StorageError> {
        let state = self.state.borrow();
        state.check()?;
        match state.files.get(path) {
            Some(bytes) => Ok(bytes.len() as u64),
            None if state.dirs.contains(path) => Err(StorageError::io(path, "is a directory")),
            None => Err(StorageError::not_found(path)),
        }
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.check()?;
        if !state.parent_exists(path) {
            return Err(StorageError::not_found(path));
        }
        state
            .files
            .entry(String::from(path))
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn read_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageError> {
        let state = self.state.borrow();
        state.check()?;
        let bytes = state
            .files
            .get(path)
            .ok_or_else(|| StorageError::not_found(path))?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
        let count = buf.len().min(bytes.len() - start);
        buf[..count].copy_from_slice(&bytes[start..start + count]);
        Ok(count)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.check()?;
        if state.files.contains_key(to) || state.dirs.contains(to) {
            return Err(StorageError::io(to, "destination exists"));
        }
        if !state.parent_exists(to) {
            return Err(StorageError::not_found(to));
        }
        let bytes = state
            .files
            .remove(from)
            .ok_or_else(|| StorageError::not_found(from))?;
        state.files.insert(String::from(to), bytes);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.check()?;
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(path))
    }

    fn create_dir(&mut self, path: &str) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        state.check()?;
        if state.files.contains_key(path) || state.dirs.contains(path) {
            return Err(StorageError::io(path, "already exists"));
        }
        if !state.parent_exists(path) {
            return Err(StorageError::not_found(path));
        }
        state.dirs.insert(String::from(path));
        Ok(())
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        let state = self.state.borrow();
        state.check()?;
        if !path.is_empty() && !state.dirs.contains(path) {
            return Err(StorageError::not_found(path));
        }

        let child = |full: &str| -> Option<String> {
            let name = if path.is_empty() {
                full
            } else {
                full.strip_prefix(path)?.strip_prefix('/')?
            };
            (!name.is_empty() && !name.contains('/')).then(|| String::from(name))
        };

        let mut entries: Vec<DirEntry> = state
            .files
            .iter()
            .filter_map(|(full, bytes)| {
                child(full).map(|name| DirEntry {
                    name,
                    size: bytes.len() as u64,
                    is_dir: false,
                })
            })
            .chain(state.dirs.iter().filter_map(|full| {
                child(full).map(|name| DirEntry {
                    name,
                    size: 0,
                    is_dir: true,
                })
            }))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let mut fs = MemoryFs::new();
        fs.append("log.txt", b"hello ").unwrap();
        fs.append("log.txt", b"world").unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(fs.read_at("log.txt", 6, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"world");
        assert_eq!(fs.read_at("log.txt", 11, &mut buf).unwrap(), 0);
        assert_eq!(fs.size("log.txt").unwrap(), 11);
    }

    #[test]
    fn test_writes_need_parent_directory() {
        let mut fs = MemoryFs::new();
        assert!(matches!(
            fs.append("backups/a.txt", b"x"),
            Err(StorageError::NotFound(_))
        ));
        fs.create_dir("backups").unwrap();
        fs.append("backups/a.txt", b"x").unwrap();
        fs.rename("backups/a.txt", "b.txt").unwrap();
        assert_eq!(fs.files(), ["b.txt"]);
    }

    #[test]
    fn test_list_dir_is_one_level() {
        let mut fs = MemoryFs::new();
        fs.seed("backups/one.txt", "1");
        fs.seed("backups/deeper/two.txt", "2");
        fs.seed("top.txt", "3");

        let names: Vec<String> = fs
            .list_dir("backups")
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, ["deeper", "one.txt"]);
    }

    #[test]
    fn test_clones_share_state() {
        let fs = MemoryFs::new();
        let mut other = fs.clone();
        other.append("a.txt", b"shared").unwrap();
        assert_eq!(fs.contents("a.txt").as_deref(), Some("shared"));

        fs.set_available(false);
        assert!(other.probe().is_err());
    }
}
