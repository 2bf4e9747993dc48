//! Device configuration
//!
//! Identity codes, API access, known networks, timing and upload sizing. On
//! the device these are baked in at build time. Hosts can keep the same
//! structure in a JSON file.

use alloc::string::String;
use alloc::vec::Vec;
use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Maximum SSID length (IEEE 802.11)
pub const MAX_SSID_LEN: usize = 32;

/// Maximum WiFi password length (WPA2)
pub const MAX_PASSWORD_LEN: usize = 63;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Parse(heapless::String<64>),
    #[error("SSID longer than 32 bytes")]
    SsidTooLong,
    #[error("WiFi password longer than 63 bytes")]
    PasswordTooLong,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub identity: DeviceIdentity,
    pub api: ApiConfig,
    pub networks: Vec<WifiCredentials>,
    pub timing: TimingConfig,
    pub upload: UploadConfig,
}

/// Codes the remote service uses to recognise this bike and sensor unit
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceIdentity {
    pub bike_code: String,
    pub unit_code: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            bike_code: String::from("BSB1"),
            unit_code: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://host:8080/api/v1` (no trailing slash)
    pub endpoint: String,
    /// Sent verbatim in the `Authorization` header
    pub token: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("http://localhost:8080/api/v1"),
            token: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: heapless::String<MAX_SSID_LEN>,
    pub password: heapless::String<MAX_PASSWORD_LEN>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            ssid: heapless::String::try_from(ssid).map_err(|_| ConfigError::SsidTooLong)?,
            password: heapless::String::try_from(password)
                .map_err(|_| ConfigError::PasswordTooLong)?,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Sampling cadence while the bike is moving
    pub sensor_read_interval_ms: u64,
    /// Sampling cadence while the bike is stationary
    pub stationary_read_interval_ms: u64,
    /// Minimum spacing between two connectivity checks
    pub wifi_retry_interval_ms: u64,
    pub http_timeout_ms: u64,
    /// A GPS fix older than this is treated as lost
    pub gps_max_age_ms: u64,
    pub registration_retry_delay_ms: u64,
    /// Pause between two controller ticks in `run`
    pub loop_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sensor_read_interval_ms: 1_000,
            stationary_read_interval_ms: 10_000,
            wifi_retry_interval_ms: 30_000,
            http_timeout_ms: 1_000,
            gps_max_age_ms: 5_000,
            registration_retry_delay_ms: 500,
            loop_delay_ms: 1,
        }
    }
}

impl TimingConfig {
    pub fn sensor_read_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_read_interval_ms)
    }

    pub fn stationary_read_interval(&self) -> Duration {
        Duration::from_millis(self.stationary_read_interval_ms)
    }

    pub fn wifi_retry_interval(&self) -> Duration {
        Duration::from_millis(self.wifi_retry_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn gps_max_age(&self) -> Duration {
        Duration::from_millis(self.gps_max_age_ms)
    }

    pub fn registration_retry_delay(&self) -> Duration {
        Duration::from_millis(self.registration_retry_delay_ms)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    /// Records per upload request. Resume offsets are counted in batches, so
    /// this must stay the same across reboots while backups are pending.
    pub batch_size: usize,
    pub registration_attempts: u8,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            registration_attempts: 3,
        }
    }
}

impl Config {
    /// Parse a JSON configuration document and validate it
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(document).map_err(|e| {
            let mut details: heapless::String<64> = heapless::String::new();
            let _ = core::fmt::write(&mut details, format_args!("{}", e));
            ConfigError::Parse(details)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.batch_size == 0 {
            return Err(ConfigError::Zero("upload.batch_size"));
        }
        if self.upload.registration_attempts == 0 {
            return Err(ConfigError::Zero("upload.registration_attempts"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timing.sensor_read_interval_ms, 1_000);
        assert_eq!(config.timing.wifi_retry_interval_ms, 30_000);
        assert_eq!(config.timing.http_timeout_ms, 1_000);
        assert_eq!(config.upload.batch_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = Config::from_json(
            r#"{
                "identity": {"bike_code": "BSB7", "unit_code": "E661"},
                "networks": [{"ssid": "bikenet", "password": "secret"}],
                "upload": {"batch_size": 25}
            }"#,
        )
        .unwrap();

        assert_eq!(config.identity.bike_code, "BSB7");
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].ssid.as_str(), "bikenet");
        assert_eq!(config.upload.batch_size, 25);
        assert_eq!(config.upload.registration_attempts, 3);
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let err = Config::from_json(r#"{"upload": {"batch_size": 0}}"#).unwrap_err();
        assert_eq!(err, ConfigError::Zero("upload.batch_size"));
    }

    #[test]
    fn test_rejects_malformed_document() {
        assert!(matches!(
            Config::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_credentials_are_length_checked() {
        assert!(WifiCredentials::new("bikenet", "Bike123!").is_ok());
        let long_ssid = "x".repeat(MAX_SSID_LEN + 1);
        assert_eq!(
            WifiCredentials::new(&long_ssid, "pw"),
            Err(ConfigError::SsidTooLong)
        );
    }
}
