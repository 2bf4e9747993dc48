//! Sensor and GPS seams
//!
//! Individual drivers (temperature/humidity, light, noise, gas) live outside
//! this crate. They only need to produce a [`Reading`]. A tuple of sensors is
//! itself a [`Sensor`], so the controller reads the whole set in one call.

mod reading;

pub use reading::Reading;

use alloc::string::String;
use embassy_time::Duration;
use log::warn;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} failed to {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} timed out during {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// A sensor that produces named measurements
pub trait Sensor {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// One-time initialization at boot
    fn setup(&mut self) -> impl Future<Output = Result<(), SensorError>> {
        async { Ok(()) }
    }

    fn read(&mut self) -> impl Future<Output = Result<Reading, SensorError>>;
}

impl Sensor for () {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn read(&mut self) -> Result<Reading, SensorError> {
        Ok(Reading::new())
    }
}

// A failing member is logged and skipped so the others still contribute.
// The group only fails when no member produced data.
macro_rules! impl_sensor_group {
    ($($member:ident => $idx:tt),+) => {
        impl<$($member: Sensor),+> Sensor for ($($member,)+) {
            fn name(&self) -> &'static str {
                "sensor group"
            }

            async fn setup(&mut self) -> Result<(), SensorError> {
                let mut first_error = None;
                $(
                    if let Err(e) = self.$idx.setup().await {
                        warn!("{} setup failed: {}", self.$idx.name(), e);
                        first_error.get_or_insert(e);
                    }
                )+
                first_error.map_or(Ok(()), Err)
            }

            async fn read(&mut self) -> Result<Reading, SensorError> {
                let mut reading = Reading::new();
                let mut succeeded = 0usize;
                let mut last_error = None;
                $(
                    match self.$idx.read().await {
                        Ok(r) => {
                            reading += r;
                            succeeded += 1;
                        }
                        Err(e) => {
                            warn!("{} read failed: {}", self.$idx.name(), e);
                            last_error = Some(e);
                        }
                    }
                )+
                match last_error {
                    Some(e) if succeeded == 0 => Err(e),
                    _ => Ok(reading),
                }
            }
        }
    };
}

impl_sensor_group!(A => 0);
impl_sensor_group!(A => 0, B => 1);
impl_sensor_group!(A => 0, B => 1, C => 2);
impl_sensor_group!(A => 0, B => 1, C => 2, D => 3);
impl_sensor_group!(A => 0, B => 1, C => 2, D => 3, E => 4);
impl_sensor_group!(A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);
impl_sensor_group!(A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6);
impl_sensor_group!(A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6, H => 7);

/// Snapshot of the GPS fix quality after the last [`GpsReceiver::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsStatus {
    /// Location, altitude, date and time are all valid
    pub valid: bool,
    /// Age of the oldest of those fields
    pub age: Duration,
    /// A new location was decoded since the last read
    pub updated: bool,
    pub moving: bool,
}

impl GpsStatus {
    pub const NO_FIX: Self = Self {
        valid: false,
        age: Duration::MAX,
        updated: false,
        moving: false,
    };

    /// Valid and no older than `max_age`
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.valid && self.age <= max_age
    }
}

/// A GPS receiver. NMEA decoding happens behind this trait.
pub trait GpsReceiver {
    fn setup(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Drain whatever the receiver has buffered and decode it
    fn update(&mut self) -> impl Future<Output = ()>;

    fn status(&self) -> GpsStatus;

    /// Position fields for the `gps_data` object of a record
    /// (`latitude`, `longitude`, `altitude`, and `speed`, `course`,
    /// `satellites_in_use`, `hdop` when known). Marks the fix as consumed.
    fn read(&mut self) -> Reading;

    /// ISO-8601 UTC time of the current fix, `None` without one
    fn timestamp(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSensor;
    use embassy_futures::block_on;

    #[test]
    fn test_group_merges_in_order() {
        let mut group = (
            MockSensor::new("sht", Reading::new().with("temperature", 21.0).with("humidity", 40.0)),
            MockSensor::new("fake", Reading::new().with("humidity", 45.0)),
            MockSensor::new("bh1750", Reading::new().with("lux", 120.0)),
        );

        let reading = block_on(group.read()).unwrap();

        assert_eq!(reading.len(), 3);
        assert_eq!(reading.get("humidity"), Some(45.0));
        assert_eq!(reading.get("lux"), Some(120.0));
    }

    #[test]
    fn test_group_skips_failing_member() {
        let mut group = (
            MockSensor::new("mq7", Reading::new().with("co", 0.2)),
            MockSensor::failing("noise"),
        );

        let reading = block_on(group.read()).unwrap();
        assert_eq!(reading.get("co"), Some(0.2));
        assert_eq!(reading.len(), 1);
    }

    #[test]
    fn test_group_fails_when_every_member_fails() {
        let mut group = (MockSensor::failing("mq2"), MockSensor::failing("noise"));
        assert!(matches!(
            block_on(group.read()),
            Err(SensorError::ReadFailed { sensor: "noise", .. })
        ));
    }

    #[test]
    fn test_group_setup_reports_first_failure() {
        let mut group = (
            MockSensor::new("sht", Reading::new()),
            MockSensor::failing("mq2"),
            MockSensor::failing("mq7"),
        );
        assert!(matches!(
            block_on(group.setup()),
            Err(SensorError::InitializationFailed { sensor: "mq2", .. })
        ));
    }

    #[test]
    fn test_gps_freshness() {
        let status = GpsStatus {
            valid: true,
            age: Duration::from_millis(4_000),
            updated: true,
            moving: true,
        };
        assert!(status.is_fresh(Duration::from_millis(5_000)));
        assert!(!status.is_fresh(Duration::from_millis(3_999)));
        assert!(!GpsStatus::NO_FIX.is_fresh(Duration::MAX));
    }
}
