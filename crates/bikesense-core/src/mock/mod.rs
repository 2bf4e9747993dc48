//! In-memory test doubles for every hardware seam
//!
//! Each double is a cheap `Clone` handle over shared state. A test keeps one
//! handle for inspection and failure injection while the controller owns the
//! other, and the shared state survives when a controller is dropped and
//! rebuilt to simulate a reboot.
//!
//! # Feature Gate
//!
//! This module is available in two contexts:
//! - During test builds (`#[cfg(test)]`)
//! - When the `mock` feature is enabled

#![cfg(any(test, feature = "mock"))]

mod api;
mod clock;
mod fs;
mod gps;
mod indicator;
mod sensor;
mod wifi;

pub use api::{MockApi, Upload};
pub use clock::MockClock;
pub use fs::MemoryFs;
pub use gps::MockGps;
pub use indicator::MockIndicator;
pub use sensor::MockSensor;
pub use wifi::MockWifi;
