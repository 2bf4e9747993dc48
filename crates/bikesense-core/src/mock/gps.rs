use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;
use embassy_time::Duration;

use crate::sensors::{GpsReceiver, GpsStatus, Reading, SensorError};

#[derive(Debug)]
struct GpsState {
    status: GpsStatus,
    position: Reading,
    timestamp: Option<String>,
    updates: usize,
}

/// GPS receiver whose fix is scripted by the test.
///
/// Reading the position consumes the fix (`updated` goes false) until the
/// test calls [`MockGps::set_fix`] or [`MockGps::refresh`] again.
#[derive(Debug, Clone)]
pub struct MockGps {
    state: Rc<RefCell<GpsState>>,
}

impl Default for MockGps {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGps {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(GpsState {
                status: GpsStatus::NO_FIX,
                position: Reading::new(),
                timestamp: None,
                updates: 0,
            })),
        }
    }

    /// A fresh, valid, not yet consumed fix
    pub fn set_fix(&self, latitude: f64, longitude: f64, timestamp: &str) {
        let mut state = self.state.borrow_mut();
        state.position = Reading::new()
            .with("latitude", latitude)
            .with("longitude", longitude)
            .with("altitude", 12.0)
            .with("satellites_in_use", 7.0);
        state.timestamp = Some(String::from(timestamp));
        state.status.valid = true;
        state.status.age = Duration::from_ticks(0);
        state.status.updated = true;
    }

    /// Mark the current fix as new again without moving
    pub fn refresh(&self, timestamp: &str) {
        let mut state = self.state.borrow_mut();
        state.timestamp = Some(String::from(timestamp));
        state.status.age = Duration::from_ticks(0);
        state.status.updated = true;
    }

    pub fn set_age(&self, age: Duration) {
        self.state.borrow_mut().status.age = age;
    }

    pub fn set_moving(&self, moving: bool) {
        self.state.borrow_mut().status.moving = moving;
    }

    pub fn lose_fix(&self) {
        let mut state = self.state.borrow_mut();
        state.status.valid = false;
        state.status.updated = false;
    }

    /// Number of `update` calls so far
    pub fn updates(&self) -> usize {
        self.state.borrow().updates
    }
}

impl GpsReceiver for MockGps {
    async fn setup(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn update(&mut self) {
        self.state.borrow_mut().updates += 1;
    }

    fn status(&self) -> GpsStatus {
        self.state.borrow().status
    }

    fn read(&mut self) -> Reading {
        let mut state = self.state.borrow_mut();
        state.status.updated = false;
        state.position.clone()
    }

    fn timestamp(&self) -> Option<String> {
        let state = self.state.borrow();
        if state.status.valid {
            state.timestamp.clone()
        } else {
            None
        }
    }
}
