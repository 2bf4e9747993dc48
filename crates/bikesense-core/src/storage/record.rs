use alloc::string::String;
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::StorageError;
use crate::sensors::Reading;

const TIMESTAMP_KEY: &str = "timestamp";
const GPS_KEY: &str = "gps_data";

/// One persisted line of the data log:
/// `{"timestamp": "...", "gps_data": {...}, "<name>": <value>, ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: String,
    pub gps: Reading,
    pub measurements: Reading,
}

impl Record {
    pub fn new(timestamp: String, gps: Reading, measurements: Reading) -> Self {
        Self {
            timestamp,
            gps,
            measurements,
        }
    }

    /// Serialize to a single line of compact JSON, without the terminator
    pub fn to_line(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| {
            let mut details: heapless::String<64> = heapless::String::new();
            let _ = core::fmt::write(&mut details, format_args!("{}", e));
            StorageError::Encode(details)
        })
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(TIMESTAMP_KEY, &self.timestamp)?;
        if !self.gps.is_empty() {
            map.serialize_entry(GPS_KEY, &self.gps)?;
        }
        for (name, value) in &self.measurements {
            // The envelope keys win over a measurement of the same name
            if name == TIMESTAMP_KEY || name == GPS_KEY {
                continue;
            }
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_layout() {
        let record = Record::new(
            String::from("2024-05-01T10:00:00Z"),
            Reading::new().with("latitude", 38.5).with("longitude", -9.25),
            Reading::new().with("temperature", 21.5).with("humidity", 60.0),
        );

        assert_eq!(
            record.to_line().unwrap(),
            r#"{"timestamp":"2024-05-01T10:00:00Z","gps_data":{"latitude":38.5,"longitude":-9.25},"humidity":60.0,"temperature":21.5}"#
        );
    }

    #[test]
    fn test_empty_gps_is_omitted() {
        let record = Record::new(
            String::from("2024-05-01T10:00:00Z"),
            Reading::new(),
            Reading::new().with("lux", 12.0).with("timestamp", 1.0),
        );

        assert_eq!(
            record.to_line().unwrap(),
            r#"{"timestamp":"2024-05-01T10:00:00Z","lux":12.0}"#
        );
    }
}
