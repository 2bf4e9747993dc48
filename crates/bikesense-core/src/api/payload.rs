//! JSON bodies exchanged with the ingestion service

use serde::{Deserialize, Serialize};

/// `{"code": "<BIKE_CODE>"}` or `{"code": "<UNIT_CODE>"}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CodeRegistration<'a> {
    pub code: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripRegistration {
    pub bike_id: u32,
    pub sensor_unit_id: u32,
}

/// Every registration endpoint answers `{"id": <int>}`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    pub id: u32,
}
