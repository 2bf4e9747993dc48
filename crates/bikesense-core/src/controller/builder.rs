use alloc::string::String;
use embedded_hal_async::delay::DelayNs;
use thiserror_no_std::Error;

use super::{TripController, TripState};
use crate::api::ApiClient;
use crate::config::{Config, ConfigError, WifiCredentials};
use crate::indicator::StatusIndicator;
use crate::net::{ConnectivityMonitor, HttpClient, WifiStation};
use crate::sensors::{GpsReceiver, Sensor};
use crate::storage::{AppendLog, FileSystem};
use crate::time::{Clock, ElapsedTimer};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("no {0} was provided")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Config(ConfigError),
}

impl From<ConfigError> for BuildError {
    fn from(e: ConfigError) -> Self {
        BuildError::Config(e)
    }
}

/// Assembles a [`TripController`] from its collaborators.
///
/// ```ignore
/// let controller = TripControllerBuilder::new()
///     .with_config(config)
///     .sensors((sht40, bh1750, noise))
///     .gps(gps)
///     .storage(sd_card)
///     .wifi(station)
///     .http(client)
///     .indicator(led)
///     .timer(SystemClock)
///     .who_am_i("BSB1", "E661")
///     .add_network("bikenet", "Bike123!")
///     .build()?;
/// ```
pub struct TripControllerBuilder<S, G, F, W, H, L, T> {
    config: Config,
    sensors: Option<S>,
    gps: Option<G>,
    storage: Option<F>,
    wifi: Option<W>,
    http: Option<H>,
    indicator: Option<L>,
    timer: Option<T>,
    /// First invalid credential passed to `add_network`
    rejected: Option<ConfigError>,
}

impl<S, G, F, W, H, L, T> Default for TripControllerBuilder<S, G, F, W, H, L, T> {
    fn default() -> Self {
        Self {
            config: Config::default(),
            sensors: None,
            gps: None,
            storage: None,
            wifi: None,
            http: None,
            indicator: None,
            timer: None,
            rejected: None,
        }
    }
}

impl<S, G, F, W, H, L, T> TripControllerBuilder<S, G, F, W, H, L, T>
where
    S: Sensor,
    G: GpsReceiver,
    F: FileSystem,
    W: WifiStation,
    H: HttpClient,
    L: StatusIndicator,
    T: Clock + DelayNs + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration. Later `who_am_i`, `with_api_config`
    /// and `add_network` calls refine it.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn sensors(mut self, sensors: S) -> Self {
        self.sensors = Some(sensors);
        self
    }

    pub fn gps(mut self, gps: G) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn storage(mut self, storage: F) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn wifi(mut self, wifi: W) -> Self {
        self.wifi = Some(wifi);
        self
    }

    pub fn http(mut self, http: H) -> Self {
        self.http = Some(http);
        self
    }

    pub fn indicator(mut self, indicator: L) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn timer(mut self, timer: T) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn who_am_i(mut self, bike_code: &str, unit_code: &str) -> Self {
        self.config.identity.bike_code = String::from(bike_code);
        self.config.identity.unit_code = String::from(unit_code);
        self
    }

    pub fn with_api_config(mut self, token: &str, endpoint: &str) -> Self {
        self.config.api.token = String::from(token);
        self.config.api.endpoint = String::from(endpoint);
        self
    }

    /// Add a known network. Networks are tried in the order they were added.
    pub fn add_network(mut self, ssid: &str, password: &str) -> Self {
        match WifiCredentials::new(ssid, password) {
            Ok(credentials) => self.config.networks.push(credentials),
            Err(e) => {
                self.rejected.get_or_insert(e);
            }
        }
        self
    }

    pub fn build(self) -> Result<TripController<S, G, F, W, H, L, T>, BuildError> {
        if let Some(e) = self.rejected {
            return Err(e.into());
        }
        self.config.validate()?;

        let sensors = self.sensors.ok_or(BuildError::Missing("sensors"))?;
        let gps = self.gps.ok_or(BuildError::Missing("gps"))?;
        let storage = self.storage.ok_or(BuildError::Missing("storage"))?;
        let wifi = self.wifi.ok_or(BuildError::Missing("wifi"))?;
        let http = self.http.ok_or(BuildError::Missing("http client"))?;
        let indicator = self.indicator.ok_or(BuildError::Missing("indicator"))?;
        let timer = self.timer.ok_or(BuildError::Missing("timer"))?;

        Ok(TripController {
            state: TripState::Idle,
            timing: self.config.timing,
            sensors,
            gps,
            log: AppendLog::new(storage),
            connectivity: ConnectivityMonitor::new(wifi, self.config.networks.clone()),
            api: ApiClient::new(http, timer.clone(), &self.config),
            indicator,
            timer,
            wifi_retry: ElapsedTimer::new(),
            sampling: ElapsedTimer::new(),
        })
    }
}
