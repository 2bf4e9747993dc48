//! Synthetic stand-ins for the sensors, GPS module and status LED

use chrono::{DateTime, TimeDelta, Utc};
use embassy_time::{Duration, Instant};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use log::{debug, info};

use bikesense_core::controller::TripState;
use bikesense_core::indicator::StatusIndicator;
use bikesense_core::mock::MockClock;
use bikesense_core::sensors::{GpsReceiver, GpsStatus, Reading, Sensor, SensorError};
use bikesense_core::time::Clock;

// ---------------------------------------------------------------------------
// Environmental sensors
// ---------------------------------------------------------------------------

fn seconds(clock: &MockClock) -> f64 {
    clock.millis() as f64 / 1000.0
}

/// Temperature and humidity, like an SHT40
pub struct ClimateSensor {
    clock: MockClock,
}

impl ClimateSensor {
    pub fn new(clock: MockClock) -> Self {
        Self { clock }
    }
}

impl Sensor for ClimateSensor {
    fn name(&self) -> &'static str {
        "sht40"
    }

    async fn read(&mut self) -> Result<Reading, SensorError> {
        let t = seconds(&self.clock);
        // 18 to 24 °C with a slow drift, humidity moving against it
        let temperature = 21.0 + 3.0 * (t / 240.0).sin() + 0.3 * (t / 17.0).cos();
        let humidity = 55.0 - 8.0 * (t / 240.0).sin() + 1.5 * (t / 29.0).cos();
        Ok(Reading::new()
            .with("temperature", round(temperature, 2))
            .with("humidity", round(humidity, 2)))
    }
}

/// Ambient light, like a BH1750. Passes under trees every few minutes.
pub struct LightSensor {
    clock: MockClock,
}

impl LightSensor {
    pub fn new(clock: MockClock) -> Self {
        Self { clock }
    }
}

impl Sensor for LightSensor {
    fn name(&self) -> &'static str {
        "bh1750"
    }

    async fn read(&mut self) -> Result<Reading, SensorError> {
        let t = seconds(&self.clock);
        let shade = if (t / 45.0).sin() > 0.8 { 0.3 } else { 1.0 };
        let lux = shade * (8_000.0 + 2_500.0 * (t / 90.0).sin());
        Ok(Reading::new().with("lux", round(lux, 1)))
    }
}

/// Sound level in dB(A) with traffic bursts
pub struct NoiseSensor {
    clock: MockClock,
}

impl NoiseSensor {
    pub fn new(clock: MockClock) -> Self {
        Self { clock }
    }
}

impl Sensor for NoiseSensor {
    fn name(&self) -> &'static str {
        "noise"
    }

    async fn read(&mut self) -> Result<Reading, SensorError> {
        let t = seconds(&self.clock);
        let burst = (t / 13.0).sin().max(0.0).powi(4) * 25.0;
        Ok(Reading::new().with("noise", round(55.0 + 5.0 * (t / 7.0).cos() + burst, 1)))
    }
}

fn round(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

// ---------------------------------------------------------------------------
// GPS
// ---------------------------------------------------------------------------

/// Start of the simulated route
const ORIGIN: (f64, f64) = (38.7369, -9.1388);

/// Riding speed while moving, in m/s
const RIDING_SPEED: f64 = 5.0;

const METERS_PER_DEGREE: f64 = 111_320.0;

/// Fix rate of the receiver
const FIX_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePhase {
    Moving,
    Stopped,
    /// No sentences decoded, e.g. in a tunnel
    Dropout,
}

/// Repeating ride pattern in whole seconds
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub moving_secs: u64,
    pub stopped_secs: u64,
    pub dropout_secs: u64,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            moving_secs: 90,
            stopped_secs: 30,
            dropout_secs: 15,
        }
    }
}

impl Route {
    fn cycle_secs(&self) -> u64 {
        (self.moving_secs + self.stopped_secs + self.dropout_secs).max(1)
    }

    pub fn phase(&self, elapsed_secs: u64) -> RoutePhase {
        let offset = elapsed_secs % self.cycle_secs();
        if offset < self.moving_secs {
            RoutePhase::Moving
        } else if offset < self.moving_secs + self.stopped_secs {
            RoutePhase::Stopped
        } else {
            RoutePhase::Dropout
        }
    }

    /// Seconds spent moving up to `elapsed_secs`
    fn moving_time(&self, elapsed_secs: u64) -> u64 {
        let cycles = elapsed_secs / self.cycle_secs();
        let offset = elapsed_secs % self.cycle_secs();
        cycles * self.moving_secs + offset.min(self.moving_secs)
    }
}

/// GPS receiver that follows [`Route`] on the virtual clock.
///
/// Fix times are wall-clock UTC at simulator start plus virtual uptime, so
/// records look like a ride happening now.
pub struct RouteGps {
    clock: MockClock,
    epoch: DateTime<Utc>,
    route: Route,
    last_fix: Option<Instant>,
    status: GpsStatus,
    position: Reading,
    timestamp: Option<String>,
}

impl RouteGps {
    pub fn new(clock: MockClock, epoch: DateTime<Utc>, route: Route) -> Self {
        Self {
            clock,
            epoch,
            route,
            last_fix: None,
            status: GpsStatus::NO_FIX,
            position: Reading::new(),
            timestamp: None,
        }
    }

    fn fix(&mut self, now: Instant, moving: bool) {
        let elapsed = now.as_secs();
        let travelled = self.route.moving_time(elapsed) as f64 * RIDING_SPEED;
        // Heading north-east along the river
        let latitude = ORIGIN.0 + travelled * 0.6 / METERS_PER_DEGREE;
        let longitude = ORIGIN.1 + travelled * 0.8 / METERS_PER_DEGREE;
        let speed_kmh = if moving { RIDING_SPEED * 3.6 } else { 0.0 };

        self.position = Reading::new()
            .with("latitude", round(latitude, 6))
            .with("longitude", round(longitude, 6))
            .with("altitude", round(12.0 + 4.0 * (elapsed as f64 / 60.0).sin(), 1))
            .with("speed", speed_kmh)
            .with("satellites_in_use", 9.0)
            .with("hdop", 0.9);

        let at = self.epoch
            + TimeDelta::milliseconds(i64::try_from(now.as_millis()).unwrap_or(i64::MAX));
        self.timestamp = Some(at.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        self.last_fix = Some(now);
        self.status = GpsStatus {
            valid: true,
            age: Duration::from_ticks(0),
            updated: true,
            moving,
        };
    }
}

impl GpsReceiver for RouteGps {
    async fn setup(&mut self) -> Result<(), SensorError> {
        info!("GPS receiver ready, route {:?}", self.route);
        Ok(())
    }

    async fn update(&mut self) {
        let now = self.clock.now();
        let phase = self.route.phase(now.as_secs());
        let due = self
            .last_fix
            .is_none_or(|last| now.saturating_duration_since(last) >= FIX_INTERVAL);

        if phase != RoutePhase::Dropout && due {
            self.fix(now, phase == RoutePhase::Moving);
        } else if let Some(last) = self.last_fix {
            self.status.age = now.saturating_duration_since(last);
        }
    }

    fn status(&self) -> GpsStatus {
        self.status
    }

    fn read(&mut self) -> Reading {
        self.status.updated = false;
        self.position.clone()
    }

    fn timestamp(&self) -> Option<String> {
        self.timestamp.clone().filter(|_| self.status.valid)
    }
}

// ---------------------------------------------------------------------------
// Status LED
// ---------------------------------------------------------------------------

/// Logs colour changes, naming the state a colour belongs to
#[derive(Debug, Default)]
pub struct ConsoleIndicator {
    current: Option<Rgb888>,
}

const STATES: [TripState; 5] = [
    TripState::Idle,
    TripState::CollectingData,
    TripState::NoGps,
    TripState::UploadingData,
    TripState::Error,
];

impl StatusIndicator for ConsoleIndicator {
    fn set_color(&mut self, color: Rgb888) {
        if self.current == Some(color) {
            debug!("LED unchanged");
            return;
        }
        self.current = Some(color);
        let state = STATES
            .iter()
            .find(|state| state.color() == color)
            .map_or("?", |state| state.label());
        info!(
            "LED #{:02X}{:02X}{:02X} ({})",
            color.r(),
            color.g(),
            color.b(),
            state
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    fn gps(clock: &MockClock) -> RouteGps {
        RouteGps::new(clock.clone(), DateTime::UNIX_EPOCH, Route::default())
    }

    #[test]
    fn test_route_phases_repeat() {
        let route = Route::default();
        assert_eq!(route.phase(0), RoutePhase::Moving);
        assert_eq!(route.phase(100), RoutePhase::Stopped);
        assert_eq!(route.phase(125), RoutePhase::Dropout);
        assert_eq!(route.phase(135), RoutePhase::Moving);
        assert_eq!(route.moving_time(200), 90 + 65);
    }

    #[test]
    fn test_fix_is_fresh_while_riding() {
        let clock = MockClock::new();
        let mut gps = gps(&clock);
        clock.set_millis(10_000);
        block_on(gps.update());

        let status = gps.status();
        assert!(status.valid && status.updated && status.moving);
        assert_eq!(gps.timestamp().as_deref(), Some("1970-01-01T00:00:10Z"));
        assert!(gps.read().get("latitude").is_some());
        assert!(!gps.status().updated);
    }

    #[test]
    fn test_dropout_ages_the_fix() {
        let clock = MockClock::new();
        let mut gps = gps(&clock);
        clock.set_millis(119_000);
        block_on(gps.update());
        assert!(!gps.status().moving);

        clock.set_millis(131_000);
        block_on(gps.update());
        let status = gps.status();
        assert_eq!(status.age, Duration::from_secs(12));
        assert!(!status.is_fresh(Duration::from_secs(5)));
    }

    #[test]
    fn test_sensors_produce_plausible_values() {
        let clock = MockClock::new();
        clock.set_millis(60_000);
        let mut group = (
            ClimateSensor::new(clock.clone()),
            LightSensor::new(clock.clone()),
            NoiseSensor::new(clock.clone()),
        );
        let reading = block_on(group.read()).unwrap();
        assert_eq!(reading.len(), 4);
        let temperature = reading.get("temperature").unwrap();
        assert!((17.0..=25.0).contains(&temperature));
        assert!(reading.get("lux").unwrap() > 0.0);
    }
}
