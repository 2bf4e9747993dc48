use alloc::rc::Rc;
use core::cell::{Cell, RefCell};

use crate::sensors::{Reading, Sensor, SensorError};

/// Sensor returning a fixed reading, or failing every call
#[derive(Debug, Clone)]
pub struct MockSensor {
    name: &'static str,
    reading: Rc<RefCell<Option<Reading>>>,
    reads: Rc<Cell<usize>>,
}

impl MockSensor {
    pub fn new(name: &'static str, reading: Reading) -> Self {
        Self {
            name,
            reading: Rc::new(RefCell::new(Some(reading))),
            reads: Rc::new(Cell::new(0)),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            reading: Rc::new(RefCell::new(None)),
            reads: Rc::new(Cell::new(0)),
        }
    }

    pub fn set_reading(&self, reading: Reading) {
        *self.reading.borrow_mut() = Some(reading);
    }

    /// Number of successful reads
    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl Sensor for MockSensor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn setup(&mut self) -> Result<(), SensorError> {
        match self.reading.borrow().as_ref() {
            Some(_) => Ok(()),
            None => Err(SensorError::InitializationFailed {
                sensor: self.name,
                details: "not responding",
            }),
        }
    }

    async fn read(&mut self) -> Result<Reading, SensorError> {
        let reading = self.reading.borrow().clone().ok_or(SensorError::ReadFailed {
            sensor: self.name,
            operation: "read",
            details: "not responding",
        })?;
        self.reads.set(self.reads.get() + 1);
        Ok(reading)
    }
}
