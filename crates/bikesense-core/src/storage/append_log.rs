//! Line-oriented append log with per-file read cursors
//!
//! Records are appended to [`DATA_FILE`] one per line. Uploads read them back
//! in batches through a byte-offset cursor kept per file name. When an upload
//! cannot finish, the whole file is renamed into [`BACKUP_DIR`] with a name
//! that says where to resume, which frees [`DATA_FILE`] for the next trip.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use embassy_time::Instant;
use log::{debug, info, warn};

use super::{BackupTag, FileSystem, StorageError};

pub const DATA_FILE: &str = "Bikesense.txt";
pub const LOG_FILE: &str = "Bikesense_Logs.txt";
pub const BACKUP_DIR: &str = "backups";
/// The event log is cleared at boot once it grows past this many bytes
pub const LOG_FILE_MAX_SIZE: u64 = 1_000_000;

const READ_CHUNK: usize = 256;

pub struct AppendLog<F> {
    fs: F,
    /// Byte offset of the first unread record, per file
    cursors: BTreeMap<String, u64>,
}

impl<F: FileSystem> AppendLog<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            cursors: BTreeMap::new(),
        }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn cursor(&self, path: &str) -> u64 {
        self.cursors.get(path).copied().unwrap_or(0)
    }

    /// Prepare the medium at boot.
    ///
    /// Rotates an oversize event log and moves a non-empty data file left
    /// over from the previous boot into the backups as an untagged file.
    /// Returns the backup path when that happened.
    pub fn setup(&mut self, now: Instant) -> Result<Option<String>, StorageError> {
        self.fs.probe()?;

        if self.fs.exists(LOG_FILE)? {
            let size = self.fs.size(LOG_FILE)?;
            if size > LOG_FILE_MAX_SIZE {
                info!("Event log is {} bytes, rotating", size);
                self.fs.remove(LOG_FILE)?;
            }
        }

        if self.has_data(DATA_FILE) {
            let path = self.backup(DATA_FILE, BackupTag::UNTAGGED, now)?;
            info!("Moved unsent data from a previous boot to {}", path);
            return Ok(Some(path));
        }

        Ok(None)
    }

    /// Append one serialized record to the data file.
    ///
    /// A record is a single line: blank records and records containing a line
    /// break are rejected, since reading them back would not reproduce them.
    pub fn store(&mut self, record: &str) -> Result<(), StorageError> {
        if record.bytes().all(|b| b.is_ascii_whitespace()) {
            return Err(StorageError::InvalidRecord("record is blank"));
        }
        if record.contains(['\n', '\r']) {
            return Err(StorageError::InvalidRecord("record spans more than one line"));
        }
        let mut line = Vec::with_capacity(record.len() + 1);
        line.extend_from_slice(record.as_bytes());
        line.push(b'\n');
        self.fs.append(DATA_FILE, &line)
    }

    /// Return up to `batch_size` unread records of `path`.
    ///
    /// `None` means nothing is left (or the file is missing) and resets the
    /// cursor, so the next call replays from the start.
    pub fn retrieve(
        &mut self,
        path: &str,
        batch_size: usize,
    ) -> Result<Option<Vec<String>>, StorageError> {
        let start = self.cursor(path);
        let mut records = Vec::new();
        let end = self.scan(path, start, batch_size, |record| records.push(record))?;

        if records.is_empty() {
            self.rewind(path);
            return Ok(None);
        }

        self.cursors.insert(String::from(path), end);
        Ok(Some(records))
    }

    /// Advance the cursor of `path` past `records` records. Stops at the end of
    /// the file without resetting. Returns how many records were skipped.
    pub fn skip(&mut self, path: &str, records: usize) -> Result<usize, StorageError> {
        if records == 0 {
            return Ok(0);
        }
        let start = self.cursor(path);
        let mut skipped = 0;
        let end = self.scan(path, start, records, |_| skipped += 1)?;
        self.cursors.insert(String::from(path), end);
        Ok(skipped)
    }

    pub fn rewind(&mut self, path: &str) {
        self.cursors.remove(path);
    }

    /// Delete `path` and forget its cursor. A missing file is not an error.
    pub fn clear(&mut self, path: &str) -> Result<(), StorageError> {
        self.rewind(path);
        if self.fs.exists(path)? {
            self.fs.remove(path)?;
        }
        Ok(())
    }

    /// Rename `path` into the backups directory under a name encoding `tag`.
    ///
    /// `now` provides the epoch part of the name. It is bumped until the name
    /// is free, so two backups in the same millisecond do not collide.
    pub fn backup(
        &mut self,
        path: &str,
        tag: BackupTag,
        now: Instant,
    ) -> Result<String, StorageError> {
        if !self.fs.exists(BACKUP_DIR)? {
            self.fs.create_dir(BACKUP_DIR)?;
        }

        let mut epoch_ms = now.as_millis();
        let mut target = tag.path(epoch_ms);
        while self.fs.exists(&target)? {
            epoch_ms += 1;
            target = tag.path(epoch_ms);
        }

        self.fs.rename(path, &target)?;
        self.rewind(path);
        debug!("Backed up {} to {}", path, target);
        Ok(target)
    }

    /// Non-empty backup files in the order the medium lists them
    pub fn list_backups(&mut self) -> Result<Vec<String>, StorageError> {
        if !self.fs.exists(BACKUP_DIR)? {
            return Ok(Vec::new());
        }
        Ok(self
            .fs
            .list_dir(BACKUP_DIR)?
            .into_iter()
            .filter(|entry| !entry.is_dir && entry.size > 0)
            .map(|entry| format!("{BACKUP_DIR}/{}", entry.name))
            .collect())
    }

    /// `path` exists and is non-empty. Medium errors count as no data.
    pub fn has_data(&mut self, path: &str) -> bool {
        let size = match self.fs.exists(path) {
            Ok(true) => self.fs.size(path),
            Ok(false) => return false,
            Err(e) => Err(e),
        };
        match size {
            Ok(size) => size > 0,
            Err(e) => {
                warn!("Could not inspect {}: {}", path, e);
                false
            }
        }
    }

    /// Append a line to the event log. Never fails the caller: returns whether
    /// the line was written.
    pub fn log_event(
        &mut self,
        level: log::Level,
        uptime: Instant,
        gps_timestamp: Option<&str>,
        message: &str,
    ) -> bool {
        let line = match gps_timestamp {
            Some(ts) => format!("[{}] [{}] [{}] {}\n", uptime.as_millis(), level, ts, message),
            None => format!("[{}] [{}] {}\n", uptime.as_millis(), level, message),
        };
        match self.fs.append(LOG_FILE, line.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                debug!("Event log write failed: {}", e);
                false
            }
        }
    }

    /// Feed every event log line to `sink`, oldest first. Returns the count.
    pub fn dump_events(&mut self, mut sink: impl FnMut(&str)) -> Result<usize, StorageError> {
        let mut count = 0;
        self.scan(LOG_FILE, 0, usize::MAX, |line| {
            sink(&line);
            count += 1;
        })?;
        Ok(count)
    }

    /// Walk records of `path` from byte `start`, handing at most `max` of them
    /// to `on_record`. Returns the offset just past the last record consumed.
    ///
    /// Blank lines are skipped, a trailing `\r` is trimmed, and a final line
    /// without a terminator still counts as a record.
    fn scan(
        &mut self,
        path: &str,
        start: u64,
        max: usize,
        mut on_record: impl FnMut(String),
    ) -> Result<u64, StorageError> {
        if !self.fs.exists(path)? {
            return Ok(0);
        }
        let size = self.fs.size(path)?;

        let mut offset = start.min(size);
        let mut found = 0usize;
        let mut line: Vec<u8> = Vec::new();
        let mut buf = [0u8; READ_CHUNK];

        'chunks: while found < max && offset < size {
            let read = self.fs.read_at(path, offset, &mut buf)?;
            if read == 0 {
                break;
            }
            for (i, &byte) in buf[..read].iter().enumerate() {
                if byte != b'\n' {
                    line.push(byte);
                    continue;
                }
                if let Some(record) = take_line(&mut line) {
                    on_record(record);
                    found += 1;
                    if found == max {
                        offset += (i + 1) as u64;
                        break 'chunks;
                    }
                }
            }
            offset += read as u64;
        }

        if found < max && !line.is_empty() {
            if let Some(record) = take_line(&mut line) {
                on_record(record);
            }
        }

        Ok(offset)
    }
}

fn take_line(line: &mut Vec<u8>) -> Option<String> {
    let mut bytes = core::mem::take(line);
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryFs;
    use alloc::vec;

    fn log_with(records: &[&str]) -> AppendLog<MemoryFs> {
        let mut log = AppendLog::new(MemoryFs::new());
        for record in records {
            log.store(record).unwrap();
        }
        log
    }

    #[test]
    fn test_store_then_retrieve_in_order() {
        let mut log = log_with(&[r#"{"a":1}"#, r#"{"a":2}"#, r#"{"a":3}"#]);

        assert_eq!(
            log.retrieve(DATA_FILE, 2).unwrap(),
            Some(vec![String::from(r#"{"a":1}"#), String::from(r#"{"a":2}"#)])
        );
        assert_eq!(
            log.retrieve(DATA_FILE, 2).unwrap(),
            Some(vec![String::from(r#"{"a":3}"#)])
        );
        assert_eq!(log.retrieve(DATA_FILE, 2).unwrap(), None);
        assert_eq!(log.cursor(DATA_FILE), 0);

        // After the reset the file replays from the start
        assert_eq!(log.retrieve(DATA_FILE, 1).unwrap(), Some(vec![String::from(r#"{"a":1}"#)]));
    }

    #[test]
    fn test_store_rejects_records_that_cannot_round_trip() {
        let mut log = AppendLog::new(MemoryFs::new());

        for record in ["", "  ", "x\r", "a\nb", "\r\n"] {
            assert!(
                matches!(log.store(record), Err(StorageError::InvalidRecord(_))),
                "{:?} was accepted",
                record
            );
        }
        assert!(log.fs().contents(DATA_FILE).is_none());

        log.store(" padded ").unwrap();
        assert_eq!(
            log.retrieve(DATA_FILE, 10).unwrap(),
            Some(vec![String::from(" padded ")])
        );
    }

    #[test]
    fn test_retrieve_missing_or_empty_file() {
        let mut log = AppendLog::new(MemoryFs::new());
        assert_eq!(log.retrieve(DATA_FILE, 10).unwrap(), None);

        log.fs_mut().seed(DATA_FILE, "\n\r\n");
        assert_eq!(log.retrieve(DATA_FILE, 10).unwrap(), None);
    }

    #[test]
    fn test_retrieve_handles_unterminated_and_blank_lines() {
        let mut log = AppendLog::new(MemoryFs::new());
        log.fs_mut().seed(DATA_FILE, "one\r\n\ntwo\nthree");

        assert_eq!(
            log.retrieve(DATA_FILE, 10).unwrap(),
            Some(vec![String::from("one"), String::from("two"), String::from("three")])
        );
        assert_eq!(log.retrieve(DATA_FILE, 10).unwrap(), None);
    }

    #[test]
    fn test_records_longer_than_a_chunk() {
        let long = "x".repeat(READ_CHUNK * 2 + 17);
        let mut log = log_with(&[&long, "short"]);

        assert_eq!(log.retrieve(DATA_FILE, 1).unwrap(), Some(vec![long.clone()]));
        assert_eq!(log.retrieve(DATA_FILE, 1).unwrap(), Some(vec![String::from("short")]));
    }

    #[test]
    fn test_skip_resumes_mid_file_and_stops_at_end() {
        let mut log = log_with(&["r0", "r1", "r2", "r3", "r4"]);

        assert_eq!(log.skip(DATA_FILE, 3).unwrap(), 3);
        assert_eq!(
            log.retrieve(DATA_FILE, 10).unwrap(),
            Some(vec![String::from("r3"), String::from("r4")])
        );

        log.rewind(DATA_FILE);
        assert_eq!(log.skip(DATA_FILE, 9).unwrap(), 5);
        assert_eq!(log.retrieve(DATA_FILE, 10).unwrap(), None);
    }

    #[test]
    fn test_clear_removes_file_and_cursor() {
        let mut log = log_with(&["r0", "r1"]);
        log.retrieve(DATA_FILE, 1).unwrap();

        log.clear(DATA_FILE).unwrap();

        assert!(!log.has_data(DATA_FILE));
        assert_eq!(log.cursor(DATA_FILE), 0);
        // Clearing twice is fine
        log.clear(DATA_FILE).unwrap();
    }

    #[test]
    fn test_backup_renames_and_frees_data_file() {
        let mut log = log_with(&["r0", "r1"]);
        log.retrieve(DATA_FILE, 1).unwrap();

        let path = log
            .backup(DATA_FILE, BackupTag::resume(5, 2), Instant::from_millis(100))
            .unwrap();

        assert_eq!(path, "backups/bikesense100-5-2.txt");
        assert!(!log.has_data(DATA_FILE));
        assert_eq!(log.cursor(DATA_FILE), 0);
        assert_eq!(log.fs().contents(&path).as_deref(), Some("r0\nr1\n"));
        assert_eq!(log.list_backups().unwrap(), vec![path]);
    }

    #[test]
    fn test_backup_name_collision_bumps_epoch() {
        let mut log = log_with(&["first"]);
        let first = log.backup(DATA_FILE, BackupTag::UNTAGGED, Instant::from_millis(50)).unwrap();
        log.store("second").unwrap();
        let second = log.backup(DATA_FILE, BackupTag::UNTAGGED, Instant::from_millis(50)).unwrap();

        assert_eq!(first, "backups/bikesense50.txt");
        assert_eq!(second, "backups/bikesense51.txt");
    }

    #[test]
    fn test_list_backups_skips_empty_files_and_dirs() {
        let mut log = AppendLog::new(MemoryFs::new());
        assert!(log.list_backups().unwrap().is_empty());

        log.fs_mut().seed("backups/bikesense1.txt", "r\n");
        log.fs_mut().seed("backups/bikesense2.txt", "");
        log.fs_mut().create_dir("backups/nested").unwrap();

        assert_eq!(log.list_backups().unwrap(), vec![String::from("backups/bikesense1.txt")]);
    }

    #[test]
    fn test_setup_backs_up_leftover_data() {
        let mut log = log_with(&["left over"]);

        let moved = log.setup(Instant::from_millis(7)).unwrap();

        assert_eq!(moved.as_deref(), Some("backups/bikesense7.txt"));
        assert!(!log.has_data(DATA_FILE));
    }

    #[test]
    fn test_setup_rotates_oversize_event_log() {
        let mut log = AppendLog::new(MemoryFs::new());
        log.fs_mut().seed(LOG_FILE, &"y".repeat(LOG_FILE_MAX_SIZE as usize + 1));

        assert_eq!(log.setup(Instant::from_millis(0)).unwrap(), None);
        assert!(!log.has_data(LOG_FILE));
    }

    #[test]
    fn test_setup_fails_without_medium() {
        let fs = MemoryFs::new();
        fs.set_available(false);
        let mut log = AppendLog::new(fs);
        assert!(matches!(
            log.setup(Instant::from_millis(0)),
            Err(StorageError::Unavailable(_))
        ));
    }

    #[test]
    fn test_event_log_format_and_dump() {
        let mut log = AppendLog::new(MemoryFs::new());
        assert!(log.log_event(log::Level::Info, Instant::from_millis(1500), None, "booted"));
        assert!(log.log_event(
            log::Level::Error,
            Instant::from_millis(2000),
            Some("2024-05-01T10:00:00Z"),
            "upload failed"
        ));

        let mut lines = Vec::new();
        let count = log.dump_events(|line| lines.push(String::from(line))).unwrap();

        assert_eq!(count, 2);
        assert_eq!(lines[0], "[1500] [INFO] booted");
        assert_eq!(lines[1], "[2000] [ERROR] [2024-05-01T10:00:00Z] upload failed");
    }

    #[test]
    fn test_event_log_never_fails_caller() {
        let fs = MemoryFs::new();
        fs.set_available(false);
        let mut log = AppendLog::new(fs);
        assert!(!log.log_event(log::Level::Warn, Instant::from_millis(0), None, "lost"));
    }
}
