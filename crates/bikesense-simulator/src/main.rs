//! Desktop simulator for the BikeSense trip controller.
//!
//! Runs the real controller from bikesense-core against a directory on disk
//! (the SD card), synthetic sensors, a GPS receiver following a repeating
//! route and an in-process registration/ingestion service. Time is virtual,
//! so hours of riding finish in seconds.
//!
//! The WiFi schedule alternates between riding (no known network in range)
//! and parking at home (the configured network in range). A controller that
//! ends up in the error state is dropped and rebuilt over the same storage,
//! which is what a reboot does on the device.
//!
//! ```text
//! RUST_LOG=debug bikesense-simulator --duration-secs 900 --fail-upload 3
//! ```

mod devices;
mod fs;

use std::path::{Path, PathBuf};
use std::time::Duration as WallDuration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::Parser;
use embassy_futures::block_on;
use log::{info, warn};

use bikesense_core::config::{Config, WifiCredentials};
use bikesense_core::controller::{TripController, TripControllerBuilder, TripState};
use bikesense_core::mock::{MockApi, MockClock, MockWifi};

use crate::devices::{ClimateSensor, ConsoleIndicator, LightSensor, NoiseSensor, Route, RouteGps};
use crate::fs::StdFs;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(version, about = "Simulate BikeSense trips against a local data directory")]
struct Args {
    /// Directory playing the SD card
    #[arg(long, env = "BIKESENSE_DATA_DIR", default_value = "bikesense-data")]
    data_dir: PathBuf,

    /// JSON configuration document, defaults are used without one
    #[arg(long, env = "BIKESENSE_CONFIG")]
    config: Option<PathBuf>,

    /// Virtual time to simulate
    #[arg(long, default_value_t = 900)]
    duration_secs: u64,

    /// Virtual time between two controller ticks
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Length of each ride, with no known network in range
    #[arg(long, default_value_t = 300)]
    offline_secs: u64,

    /// Length of each stop at home, with the known network in range
    #[arg(long, default_value_t = 60)]
    home_secs: u64,

    /// Answer 500 to this upload request (zero-based, repeatable)
    #[arg(long)]
    fail_upload: Vec<usize>,

    /// Delete the data directory before starting
    #[arg(long)]
    clean: bool,

    /// Sleep for each tick instead of running as fast as possible
    #[arg(long)]
    realtime: bool,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_SSID: &str = "bikenet";
const DEFAULT_PASSWORD: &str = "Bike123!";

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let document = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Config::from_json(&document)
                .map_err(|e| anyhow!("{}: {}", path.display(), e))?
        }
        None => {
            let mut config = Config::default();
            config.identity.unit_code = String::from("SIM1");
            config.api.token = String::from("simulator-token");
            config
        }
    };

    if config.networks.is_empty() {
        let home = WifiCredentials::new(DEFAULT_SSID, DEFAULT_PASSWORD)
            .map_err(|e| anyhow!("default network: {}", e))?;
        config.networks.push(home);
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Simulated device
// ---------------------------------------------------------------------------

type Sensors = (ClimateSensor, LightSensor, NoiseSensor);
type SimController =
    TripController<Sensors, RouteGps, StdFs, MockWifi, MockApi, ConsoleIndicator, MockClock>;

/// Everything that outlives a reboot: the medium, the outside world and time
struct Device {
    config: Config,
    fs: StdFs,
    wifi: MockWifi,
    api: MockApi,
    clock: MockClock,
    epoch: chrono::DateTime<Utc>,
    boots: u32,
}

impl Device {
    /// Power on: build a fresh controller and run its setup
    fn boot(&mut self) -> Result<SimController> {
        self.boots += 1;
        info!("Boot #{} at {} ms", self.boots, self.clock.millis());

        let clock = &self.clock;
        let mut controller = TripControllerBuilder::new()
            .with_config(self.config.clone())
            .sensors((
                ClimateSensor::new(clock.clone()),
                LightSensor::new(clock.clone()),
                NoiseSensor::new(clock.clone()),
            ))
            .gps(RouteGps::new(clock.clone(), self.epoch, Route::default()))
            .storage(self.fs.clone())
            .wifi(self.wifi.clone())
            .http(self.api.clone())
            .indicator(ConsoleIndicator::default())
            .timer(clock.clone())
            .build()
            .map_err(|e| anyhow!("building controller: {}", e))?;

        block_on(controller.setup());
        Ok(controller)
    }

    /// Put the home network in or out of range for the current virtual time
    fn update_wifi(&self, offline_secs: u64, home_secs: u64) -> bool {
        let period = (offline_secs + home_secs).max(1);
        let at_home = (self.clock.millis() / 1000) % period >= offline_secs;
        for network in &self.config.networks {
            self.wifi.set_in_range(&network.ssid, at_home);
        }
        at_home
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.clean && args.data_dir.exists() {
        std::fs::remove_dir_all(&args.data_dir)
            .with_context(|| format!("cleaning {}", args.data_dir.display()))?;
    }

    let config = load_config(args.config.as_deref())?;
    info!("Starting BikeSense simulator");
    info!(
        "Data in {}, endpoint {}, {} known network(s)",
        args.data_dir.display(),
        config.api.endpoint,
        config.networks.len()
    );

    let api = MockApi::new().with_token(&config.api.token);
    for nth in &args.fail_upload {
        api.fail_upload(*nth);
    }

    let mut device = Device {
        config,
        fs: StdFs::new(&args.data_dir),
        wifi: MockWifi::new(),
        api,
        clock: MockClock::new(),
        epoch: Utc::now(),
        boots: 0,
    };

    device.update_wifi(args.offline_secs, args.home_secs);
    let mut controller = device.boot()?;

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    let tick_ms = args.tick_ms.max(1);
    let end_ms = args.duration_secs * 1000;
    let mut at_home = false;

    while device.clock.millis() < end_ms {
        device.clock.advance_millis(tick_ms);

        let home = device.update_wifi(args.offline_secs, args.home_secs);
        if home != at_home {
            info!(
                "{} at {} s",
                if home { "Arrived home" } else { "Riding off" },
                device.clock.millis() / 1000
            );
            at_home = home;
        }

        let handled = controller.state();
        block_on(controller.tick());
        if handled == TripState::Error {
            warn!("Controller requested a reboot");
            drop(controller);
            controller = device.boot()?;
        }

        if args.realtime {
            std::thread::sleep(WallDuration::from_millis(tick_ms));
        }
    }

    // -----------------------------------------------------------------------
    // Report
    // -----------------------------------------------------------------------
    let uploads = device.api.uploads();
    info!(
        "Simulated {} s: {} boot(s), {} trip(s) registered, {} batch(es) with {} record(s) accepted",
        device.clock.millis() / 1000,
        device.boots,
        device.api.trips().len(),
        uploads.len(),
        device.api.uploaded_records().len()
    );
    info!("Final state {}", controller.state());

    let pending = controller
        .log_mut()
        .list_backups()
        .map_err(|e| anyhow!("listing backups: {}", e))?;
    for path in &pending {
        warn!("Backup still pending: {}", path);
    }

    println!("--- event log ---");
    let count = controller
        .log_mut()
        .dump_events(|line| println!("{line}"))
        .map_err(|e| anyhow!("reading event log: {}", e))?;
    info!("{} event(s) in the log", count);

    Ok(())
}
