//! Trip lifecycle state machine
//!
//! ```text
//!            offline                 connectivity
//!   IDLE ───────────────▶ COLLECTING ───────────────▶ UPLOADING ──ok──▶ IDLE
//!    │ online:             │    ▲                        ▲   │
//!    │ drain backups   stale│    │fresh fix   connectivity│   │failed
//!    ▼                     ▼    │                        │   ▼
//!   IDLE                   NO_GPS ───────────────────────┘  ERROR ──▶ reboot
//! ```
//!
//! Each [`TripController::tick`] runs one cooperative step to completion. The
//! only suspension points are network calls and explicit delays.

mod builder;

pub use builder::{BuildError, TripControllerBuilder};

use alloc::format;
use embedded_hal_async::delay::DelayNs;
use log::{Level, debug, error, info, warn};

use crate::api::ApiClient;
use crate::config::TimingConfig;
use crate::indicator::StatusIndicator;
use crate::net::{ConnectivityMonitor, HttpClient, WifiStation};
use crate::sensors::{GpsReceiver, Reading, Sensor};
use crate::storage::{AppendLog, BackupTag, DATA_FILE, FileSystem, Record};
use crate::time::{Clock, ElapsedTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripState {
    Idle,
    CollectingData,
    NoGps,
    UploadingData,
    /// Unrecoverable for this boot, the device reboots
    Error,
}

/// Hard reset of the device
pub trait Reboot {
    fn reboot(&mut self) -> !;
}

pub struct TripController<S, G, F, W, H, L, T> {
    state: TripState,
    timing: TimingConfig,
    sensors: S,
    gps: G,
    log: AppendLog<F>,
    connectivity: ConnectivityMonitor<W>,
    api: ApiClient<H, T>,
    indicator: L,
    timer: T,
    /// Spacing between connectivity checks
    wifi_retry: ElapsedTimer,
    /// Spacing between stored records
    sampling: ElapsedTimer,
}

impl<S, G, F, W, H, L, T> TripController<S, G, F, W, H, L, T>
where
    S: Sensor,
    G: GpsReceiver,
    F: FileSystem,
    W: WifiStation,
    H: HttpClient,
    L: StatusIndicator,
    T: Clock + DelayNs + Clone,
{
    pub fn state(&self) -> TripState {
        self.state
    }

    pub fn log_mut(&mut self) -> &mut AppendLog<F> {
        &mut self.log
    }

    fn transition(&mut self, next: TripState) {
        if next == self.state {
            return;
        }
        info!("State {} -> {}", self.state, next);
        self.state = next;
        self.indicator.set_color(next.color());
    }

    /// Log through `log` and append the same line to the event log on the
    /// medium, tagged with the GPS time when there is a fix
    fn note(&mut self, level: Level, message: &str) {
        log::log!(level, "{}", message);
        let timestamp = self.gps.timestamp();
        self.log
            .log_event(level, self.timer.now(), timestamp.as_deref(), message);
    }

    /// Rate-limited connectivity check. Returns false without touching the
    /// radio while the retry interval has not passed.
    async fn connectivity_due(&mut self) -> bool {
        let now = self.timer.now();
        if !self
            .wifi_retry
            .check_and_reset(now, self.timing.wifi_retry_interval())
        {
            return false;
        }
        debug!("Checking for known WiFi networks");
        self.connectivity.check().await
    }

    /// Bring up GPS, sensors and storage. Storage failure is fatal and moves
    /// the controller to [`TripState::Error`].
    pub async fn setup(&mut self) -> TripState {
        if let Err(e) = self.gps.setup().await {
            warn!("GPS setup failed: {}", e);
        }
        if let Err(e) = self.sensors.setup().await {
            warn!("Sensor setup incomplete: {}", e);
        }

        match self.log.setup(self.timer.now()) {
            Ok(Some(path)) => {
                let message = format!("Unsent data from the previous boot moved to {}", path);
                self.note(Level::Info, &message);
            }
            Ok(None) => {}
            Err(e) => {
                error!("Failed to setup data storage: {}", e);
                self.transition(TripState::Error);
            }
        }

        self.indicator.set_color(self.state.color());
        self.state
    }

    /// Run one step of the current state and return the resulting state
    pub async fn tick(&mut self) -> TripState {
        match self.state {
            TripState::Idle => self.on_idle().await,
            TripState::CollectingData => self.on_collecting().await,
            TripState::NoGps => self.on_no_gps().await,
            TripState::UploadingData => self.on_uploading().await,
            TripState::Error => self.on_error(),
        }
        self.state
    }

    /// Set up, then tick forever. After the tick that handles
    /// [`TripState::Error`] the device is rebooted. Never returns.
    pub async fn run<R: Reboot>(&mut self, reboot: &mut R) {
        self.setup().await;
        let loop_delay_ms = u32::try_from(self.timing.loop_delay().as_millis()).unwrap_or(u32::MAX);

        loop {
            let handled = self.state;
            self.tick().await;
            if handled == TripState::Error {
                reboot.reboot();
            }
            self.timer.delay_ms(loop_delay_ms).await;
        }
    }

    async fn on_idle(&mut self) {
        let now = self.timer.now();
        if !self
            .wifi_retry
            .check_and_reset(now, self.timing.wifi_retry_interval())
        {
            return;
        }

        if self.connectivity.check().await {
            self.drain_backups().await;
        } else {
            self.note(Level::Info, "Starting data collection for new trip");
            self.sampling = ElapsedTimer::new();
            self.transition(TripState::CollectingData);
        }
    }

    async fn on_collecting(&mut self) {
        self.gps.update().await;
        let status = self.gps.status();

        if !status.is_fresh(self.timing.gps_max_age()) {
            self.note(Level::Warn, "GPS data is invalid or stale, pausing data collection");
            self.transition(TripState::NoGps);
            return;
        }

        if self.connectivity_due().await {
            self.transition(TripState::UploadingData);
            return;
        }

        let interval = if status.moving {
            self.timing.sensor_read_interval()
        } else {
            self.timing.stationary_read_interval()
        };
        let now = self.timer.now();
        if status.updated && self.sampling.has_elapsed(now, interval) {
            self.sampling.reset(now);
            self.collect().await;
        }
    }

    /// Read the sensors, tag the reading with the GPS fix and persist it
    async fn collect(&mut self) {
        let measurements = match self.sensors.read().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Sensor read failed: {}", e);
                Reading::new()
            }
        };
        let timestamp = self.gps.timestamp().unwrap_or_default();
        let position = self.gps.read();

        let record = Record::new(timestamp, position, measurements);
        match record.to_line().and_then(|line| self.log.store(&line)) {
            Ok(()) => debug!("Stored record at {}", record.timestamp),
            Err(e) => {
                let message = format!("Failed to store record: {}", e);
                self.note(Level::Error, &message);
            }
        }
    }

    async fn on_no_gps(&mut self) {
        self.gps.update().await;

        if self.gps.status().is_fresh(self.timing.gps_max_age()) {
            self.note(Level::Info, "GPS fix restored, resuming data collection");
            self.transition(TripState::CollectingData);
            return;
        }

        if self.connectivity_due().await {
            self.transition(TripState::UploadingData);
        }
    }

    async fn on_uploading(&mut self) {
        if !self.log.has_data(DATA_FILE) {
            info!("No data collected, nothing to upload");
            self.transition(TripState::Idle);
            return;
        }

        let ssid = self.connectivity.ssid().unwrap_or_default();
        let message = format!("Connected to WiFi: {}", ssid);
        self.note(Level::Info, &message);
        let message = format!("Uploading data to {}", self.api.endpoint());
        self.note(Level::Info, &message);

        match self
            .api
            .register_and_upload_trip(&mut self.log, DATA_FILE)
            .await
        {
            Ok(_) => {
                self.note(Level::Info, "Data upload successful, clearing storage");
                if let Err(e) = self.log.clear(DATA_FILE) {
                    let message = format!("Failed to clear uploaded data: {}", e);
                    self.note(Level::Error, &message);
                    self.transition(TripState::Error);
                    return;
                }
                self.transition(TripState::Idle);
            }
            Err(e) => {
                let message = format!("Failed to upload data, going into error mode: {}", e);
                self.note(Level::Error, &message);
                self.transition(TripState::Error);
            }
        }
    }

    fn on_error(&mut self) {
        self.indicator.set_color(TripState::Error.color());
        self.note(Level::Error, "Rebooting device due to error...");
    }

    /// Resend backed-up files, newest discovered first.
    ///
    /// Stops at the first failure or when connectivity is lost; whatever is
    /// left is retried on a later idle cycle. Returns the number of backups
    /// uploaded and deleted.
    pub async fn drain_backups(&mut self) -> usize {
        let mut backups = match self.log.list_backups() {
            Ok(backups) => backups,
            Err(e) => {
                let message = format!("Could not list backups: {}", e);
                self.note(Level::Error, &message);
                return 0;
            }
        };
        if backups.is_empty() {
            return 0;
        }

        let message = format!("Found {} backup files to upload", backups.len());
        self.note(Level::Info, &message);

        let mut drained = 0;
        while let Some(path) = backups.pop() {
            if !self.connectivity.check().await {
                self.note(Level::Warn, "Lost connectivity, postponing remaining backups");
                break;
            }

            let tag = BackupTag::from_path(&path);
            let result = match tag.trip_id {
                Some(trip_id) => {
                    let start = tag.batch_index.unwrap_or(0);
                    self.api
                        .upload_trip(&mut self.log, &path, trip_id, start)
                        .await
                }
                None => self.api.register_and_upload_trip(&mut self.log, &path).await,
            };

            if let Err(e) = result {
                let message = format!("Upload of backup {} failed, retrying later: {}", path, e);
                self.note(Level::Warn, &message);
                break;
            }
            if let Err(e) = self.log.clear(&path) {
                let message = format!("Uploaded backup {} but could not delete it: {}", path, e);
                self.note(Level::Error, &message);
                break;
            }

            let message = format!("Uploaded and removed backup {}", path);
            self.note(Level::Info, &message);
            drained += 1;
        }

        drained
    }
}
