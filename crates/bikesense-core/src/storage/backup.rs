use alloc::format;
use alloc::string::String;

use super::BACKUP_DIR;

const PREFIX: &str = "bikesense";
const EXTENSION: &str = ".txt";

/// What a backup file name says about how far its upload got.
///
/// Encoded as `backups/bikesense<epoch_ms>[-<trip_id>][-<batch_index>].txt`.
/// A batch index is only meaningful together with a trip id and is never
/// written without one.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackupTag {
    pub trip_id: Option<u32>,
    /// First batch that was not acknowledged
    pub batch_index: Option<u32>,
}

impl BackupTag {
    /// Registration never completed, so the whole file needs a new trip
    pub const UNTAGGED: Self = Self {
        trip_id: None,
        batch_index: None,
    };

    pub const fn trip(trip_id: u32) -> Self {
        Self {
            trip_id: Some(trip_id),
            batch_index: None,
        }
    }

    pub const fn resume(trip_id: u32, batch_index: u32) -> Self {
        Self {
            trip_id: Some(trip_id),
            batch_index: Some(batch_index),
        }
    }

    pub fn path(&self, epoch_ms: u64) -> String {
        match (self.trip_id, self.batch_index) {
            (Some(trip), Some(batch)) => {
                format!("{BACKUP_DIR}/{PREFIX}{epoch_ms}-{trip}-{batch}{EXTENSION}")
            }
            (Some(trip), None) => format!("{BACKUP_DIR}/{PREFIX}{epoch_ms}-{trip}{EXTENSION}"),
            (None, _) => format!("{BACKUP_DIR}/{PREFIX}{epoch_ms}{EXTENSION}"),
        }
    }

    /// Decode a backup path or bare file name.
    ///
    /// Three `-`-separated parts give trip and batch, two give only the trip.
    /// Anything else, including non-numeric parts, decodes as untagged.
    pub fn from_path(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        let stem = name.strip_suffix(EXTENSION).unwrap_or(name);

        let mut parts = stem.split('-');
        let (_epoch, trip, batch, rest) = (parts.next(), parts.next(), parts.next(), parts.next());
        if rest.is_some() {
            return Self::UNTAGGED;
        }

        match (trip, batch) {
            (Some(trip), Some(batch)) => match (trip.parse(), batch.parse()) {
                (Ok(trip), Ok(batch)) => Self::resume(trip, batch),
                _ => Self::UNTAGGED,
            },
            (Some(trip), None) => trip.parse().map_or(Self::UNTAGGED, Self::trip),
            _ => Self::UNTAGGED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_trip_and_batch() {
        assert_eq!(
            BackupTag::from_path("backups/bikesense100-5-2.txt"),
            BackupTag::resume(5, 2)
        );
    }

    #[test]
    fn test_decode_untagged() {
        assert_eq!(BackupTag::from_path("backups/bikesense50.txt"), BackupTag::UNTAGGED);
        assert_eq!(BackupTag::from_path("bikesense50.txt"), BackupTag::UNTAGGED);
    }

    #[test]
    fn test_decode_trip_only() {
        assert_eq!(BackupTag::from_path("/backups/bikesense7-12.txt"), BackupTag::trip(12));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(BackupTag::from_path("backups/bikesense1-x-2.txt"), BackupTag::UNTAGGED);
        assert_eq!(BackupTag::from_path("backups/bikesense1-2-3-4.txt"), BackupTag::UNTAGGED);
        assert_eq!(BackupTag::from_path("backups/notes.txt"), BackupTag::UNTAGGED);
    }

    #[test]
    fn test_encode() {
        assert_eq!(BackupTag::UNTAGGED.path(50), "backups/bikesense50.txt");
        assert_eq!(BackupTag::trip(3).path(50), "backups/bikesense50-3.txt");
        assert_eq!(BackupTag::resume(5, 2).path(100), "backups/bikesense100-5-2.txt");
        assert_eq!(
            BackupTag::from_path(&BackupTag::resume(9, 0).path(1234)),
            BackupTag::resume(9, 0)
        );
    }
}
