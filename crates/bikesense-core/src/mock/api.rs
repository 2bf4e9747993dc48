//! In-process stand-in for the registration and ingestion service

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use serde::Deserialize;

use crate::api::payload::TripRegistration;
use crate::api::{
    BIKE_REGISTER_PATH, HEALTH_PATH, SENSOR_UNIT_REGISTER_PATH, TRIP_REGISTER_PATH,
    TRIP_UPLOAD_PATH,
};
use crate::net::{HttpClient, HttpError, Method, Request, Response};

#[derive(Deserialize)]
struct CodeBody {
    code: String,
}

/// One accepted upload batch
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub trip_id: u32,
    pub records: Vec<String>,
}

#[derive(Debug)]
struct ApiState {
    token: Option<String>,
    bikes: BTreeMap<String, u32>,
    units: BTreeMap<String, u32>,
    trips: Vec<u32>,
    next_trip_id: u32,
    uploads: Vec<Upload>,
    upload_posts: usize,
    failing_uploads: BTreeSet<usize>,
    dropped_uploads: BTreeSet<usize>,
    failing_registrations: usize,
    health_status: u16,
    offline: bool,
    requests: Vec<(Method, String)>,
}

impl Default for ApiState {
    fn default() -> Self {
        Self {
            token: None,
            bikes: BTreeMap::new(),
            units: BTreeMap::new(),
            trips: Vec::new(),
            next_trip_id: 1,
            uploads: Vec::new(),
            upload_posts: 0,
            failing_uploads: BTreeSet::new(),
            dropped_uploads: BTreeSet::new(),
            failing_registrations: 0,
            health_status: 200,
            offline: false,
            requests: Vec::new(),
        }
    }
}

fn respond(status: u16, body: String) -> Result<Response, HttpError> {
    Ok(Response { status, body })
}

fn id_body(id: u32) -> String {
    format!("{{\"id\":{id}}}")
}

impl ApiState {
    fn register_code(codes: &mut BTreeMap<String, u32>, body: Option<&str>) -> Result<Response, HttpError> {
        let Some(code) = body
            .and_then(|b| serde_json::from_str::<CodeBody>(b).ok())
            .map(|b| b.code)
        else {
            return respond(400, String::from("{\"error\":\"missing code\"}"));
        };
        let next = codes.len() as u32 + 1;
        let id = *codes.entry(code).or_insert(next);
        respond(201, id_body(id))
    }

    fn register_trip(&mut self, body: Option<&str>) -> Result<Response, HttpError> {
        let Some(trip) = body.and_then(|b| serde_json::from_str::<TripRegistration>(b).ok()) else {
            return respond(400, String::from("{\"error\":\"malformed trip\"}"));
        };
        let bike_known = self.bikes.values().any(|&id| id == trip.bike_id);
        let unit_known = self.units.values().any(|&id| id == trip.sensor_unit_id);
        if !bike_known || !unit_known {
            return respond(404, String::from("{\"error\":\"unknown device\"}"));
        }
        let id = self.next_trip_id;
        self.next_trip_id += 1;
        self.trips.push(id);
        respond(201, id_body(id))
    }

    fn upload(&mut self, request: &Request<'_>) -> Result<Response, HttpError> {
        let index = self.upload_posts;
        self.upload_posts += 1;
        if self.dropped_uploads.contains(&index) {
            return Err(HttpError::connection("connection reset by peer"));
        }
        if self.failing_uploads.contains(&index) {
            return respond(500, String::from("{\"error\":\"internal server error\"}"));
        }

        let Some(trip_id) = request
            .header("Trip-ID")
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|id| self.trips.contains(id))
        else {
            return respond(404, String::from("{\"error\":\"unknown trip\"}"));
        };
        let Some(records) = request
            .body
            .and_then(|b| serde_json::from_str::<Vec<String>>(b).ok())
        else {
            return respond(400, String::from("{\"error\":\"expected an array of records\"}"));
        };

        self.uploads.push(Upload { trip_id, records });
        respond(200, String::from("{\"status\":\"ok\"}"))
    }
}

/// Registration and ingestion service with failure injection.
///
/// Bike and sensor unit codes map to stable IDs, every trip registration
/// hands out a new trip ID, and uploads are recorded per batch.
#[derive(Debug, Clone, Default)]
pub struct MockApi {
    state: Rc<RefCell<ApiState>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require this `Authorization` value, answering 401 otherwise
    pub fn with_token(self, token: &str) -> Self {
        self.state.borrow_mut().token = Some(String::from(token));
        self
    }

    /// Answer 500 to the `nth` upload POST (zero-based, counted over the
    /// lifetime of the service)
    pub fn fail_upload(&self, nth: usize) {
        self.state.borrow_mut().failing_uploads.insert(nth);
    }

    /// Fail the `nth` upload POST at the transport level, with no response
    pub fn drop_upload(&self, nth: usize) {
        self.state.borrow_mut().dropped_uploads.insert(nth);
    }

    /// Answer 503 to the next `count` registration POSTs
    pub fn fail_registrations(&self, count: usize) {
        self.state.borrow_mut().failing_registrations = count;
    }

    pub fn set_health_status(&self, status: u16) {
        self.state.borrow_mut().health_status = status;
    }

    /// Fail every request at the transport level
    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.borrow().uploads.clone()
    }

    /// Every accepted record, in the order it arrived
    pub fn uploaded_records(&self) -> Vec<String> {
        self.state
            .borrow()
            .uploads
            .iter()
            .flat_map(|upload| upload.records.iter().cloned())
            .collect()
    }

    pub fn trips(&self) -> Vec<u32> {
        self.state.borrow().trips.clone()
    }

    pub fn bike_codes(&self) -> Vec<String> {
        self.state.borrow().bikes.keys().cloned().collect()
    }

    /// Upload POSTs seen so far, accepted or not
    pub fn upload_posts(&self) -> usize {
        self.state.borrow().upload_posts
    }

    /// Requests whose URL ends with `path`
    pub fn count_requests(&self, path: &str) -> usize {
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|(_, url)| url.ends_with(path))
            .count()
    }
}

impl HttpClient for MockApi {
    async fn request(&mut self, request: &Request<'_>) -> Result<Response, HttpError> {
        let mut state = self.state.borrow_mut();
        state.requests.push((request.method, String::from(request.url)));

        if state.offline {
            return Err(HttpError::connection("host unreachable"));
        }

        let authorized = match &state.token {
            Some(token) => request.header("Authorization") == Some(token.as_str()),
            None => true,
        };
        if !authorized {
            return respond(401, String::from("{\"error\":\"unauthorized\"}"));
        }

        let url = request.url;
        let registering = [BIKE_REGISTER_PATH, SENSOR_UNIT_REGISTER_PATH, TRIP_REGISTER_PATH]
            .iter()
            .any(|path| url.ends_with(path));
        if request.method == Method::Post && registering && state.failing_registrations > 0 {
            state.failing_registrations -= 1;
            return respond(503, String::from("{\"error\":\"service unavailable\"}"));
        }

        match request.method {
            Method::Get if url.ends_with(HEALTH_PATH) => {
                let status = state.health_status;
                respond(status, String::new())
            }
            Method::Post if url.ends_with(BIKE_REGISTER_PATH) => {
                ApiState::register_code(&mut state.bikes, request.body)
            }
            Method::Post if url.ends_with(SENSOR_UNIT_REGISTER_PATH) => {
                ApiState::register_code(&mut state.units, request.body)
            }
            Method::Post if url.ends_with(TRIP_REGISTER_PATH) => state.register_trip(request.body),
            Method::Post if url.ends_with(TRIP_UPLOAD_PATH) => state.upload(request),
            _ => respond(404, String::from("{\"error\":\"not found\"}")),
        }
    }
}
