//! Registration and batch upload client for the ingestion service
//!
//! Device identity (bike and sensor unit) is registered once per process and
//! cached. Every upload session registers a fresh trip and then streams the
//! stored records in fixed-size batches. A batch that is not acknowledged
//! stops the upload and moves the file into the backups with a name that
//! records the trip and the first unacknowledged batch, so a later drain can
//! resume without resending anything.

pub mod payload;

use alloc::format;
use alloc::string::String;
use alloc::vec;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::bounded;
use crate::config::{Config, DeviceIdentity};
use crate::net::{HttpClient, HttpError, Method, Request, Response};
use crate::storage::{AppendLog, BackupTag, FileSystem, StorageError};
use crate::time::Clock;
use payload::{CodeRegistration, Registered, TripRegistration};

pub const BIKE_REGISTER_PATH: &str = "/bike/register";
pub const SENSOR_UNIT_REGISTER_PATH: &str = "/sensor_unit/register";
pub const TRIP_REGISTER_PATH: &str = "/trip/register";
pub const TRIP_UPLOAD_PATH: &str = "/trip/upload_data";
pub const HEALTH_PATH: &str = "/health";

const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{endpoint} answered {status}: {body}")]
    Rejected {
        endpoint: &'static str,
        status: u16,
        body: heapless::String<64>,
    },
    #[error("{endpoint} unreachable: {error}")]
    Transport {
        endpoint: &'static str,
        error: HttpError,
    },
    #[error("{endpoint} sent an unexpected body: {body}")]
    InvalidBody {
        endpoint: &'static str,
        body: heapless::String<64>,
    },
    #[error("could not encode request: {0}")]
    Encode(heapless::String<64>),
    #[error("trip registration failed, data kept in {backup}")]
    RegistrationInterrupted { backup: heapless::String<64> },
    #[error("trip {trip_id} upload stopped at batch {batch}, data kept in {backup}")]
    UploadInterrupted {
        trip_id: u32,
        batch: u32,
        backup: heapless::String<64>,
    },
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

fn encode_error(e: serde_json::Error) -> ApiError {
    let mut details: heapless::String<64> = heapless::String::new();
    let _ = core::fmt::write(&mut details, format_args!("{}", e));
    ApiError::Encode(details)
}

/// Server-side IDs of this bike and sensor unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIds {
    pub bike_id: u32,
    pub sensor_unit_id: u32,
}

pub struct ApiClient<H, T> {
    http: H,
    timer: T,
    endpoint: String,
    token: String,
    identity: DeviceIdentity,
    timeout: Duration,
    batch_size: usize,
    attempts: u8,
    retry_delay: Duration,
    device: Option<DeviceIds>,
}

impl<H, T> ApiClient<H, T>
where
    H: HttpClient,
    T: Clock + DelayNs,
{
    pub fn new(http: H, timer: T, config: &Config) -> Self {
        Self {
            http,
            timer,
            endpoint: String::from(config.api.endpoint.trim_end_matches('/')),
            token: config.api.token.clone(),
            identity: config.identity.clone(),
            timeout: config.timing.http_timeout(),
            batch_size: config.upload.batch_size.max(1),
            attempts: config.upload.registration_attempts.max(1),
            retry_delay: config.timing.registration_retry_delay(),
            device: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Cached device IDs, `None` until [`register_device`](Self::register_device) succeeded
    pub fn device_ids(&self) -> Option<DeviceIds> {
        self.device
    }

    async fn send(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&str>,
        trip_id: Option<u32>,
    ) -> Result<Response, HttpError> {
        let url = format!("{}{}", self.endpoint, path);
        let trip_header = trip_id.map(|id| format!("{id}"));

        let mut headers = vec![
            ("Content-Type", CONTENT_TYPE_JSON),
            ("Authorization", self.token.as_str()),
        ];
        if let Some(trip) = trip_header.as_deref() {
            headers.push(("Trip-ID", trip));
        }

        let request = Request {
            method,
            url: &url,
            headers: &headers,
            body,
            timeout: self.timeout,
        };
        self.http.request(&request).await
    }

    /// POST once; anything but 200/201 is an error
    async fn post(
        &mut self,
        endpoint: &'static str,
        body: &str,
        trip_id: Option<u32>,
    ) -> Result<Response, ApiError> {
        match self.send(Method::Post, endpoint, Some(body), trip_id).await {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(ApiError::Rejected {
                endpoint,
                status: response.status,
                body: bounded(&response.body),
            }),
            Err(error) => Err(ApiError::Transport { endpoint, error }),
        }
    }

    /// POST a registration body and return the `id` of the answer, retrying
    /// up to the configured number of attempts
    async fn register(&mut self, endpoint: &'static str, body: &str) -> Result<u32, ApiError> {
        let mut attempt = 1;
        loop {
            let result = match self.post(endpoint, body, None).await {
                Ok(response) => serde_json::from_str::<Registered>(&response.body)
                    .map(|registered| registered.id)
                    .map_err(|_| ApiError::InvalidBody {
                        endpoint,
                        body: bounded(&response.body),
                    }),
                Err(e) => Err(e),
            };

            match result {
                Ok(id) => return Ok(id),
                Err(e) if attempt >= self.attempts => {
                    error!("Failed to register {}: {}", endpoint, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Registration at {} failed (attempt {}/{}): {}",
                        endpoint, attempt, self.attempts, e
                    );
                    attempt += 1;
                    let delay_ms = u32::try_from(self.retry_delay.as_millis()).unwrap_or(u32::MAX);
                    self.timer.delay_ms(delay_ms).await;
                }
            }
        }
    }

    /// Register bike and sensor unit codes once per process
    pub async fn register_device(&mut self) -> Result<DeviceIds, ApiError> {
        if let Some(ids) = self.device {
            return Ok(ids);
        }

        let bike_body = serde_json::to_string(&CodeRegistration {
            code: &self.identity.bike_code,
        })
        .map_err(encode_error)?;
        let unit_body = serde_json::to_string(&CodeRegistration {
            code: &self.identity.unit_code,
        })
        .map_err(encode_error)?;

        let bike_id = self.register(BIKE_REGISTER_PATH, &bike_body).await?;
        let sensor_unit_id = self.register(SENSOR_UNIT_REGISTER_PATH, &unit_body).await?;

        let ids = DeviceIds {
            bike_id,
            sensor_unit_id,
        };
        info!("Registered bike {} and sensor unit {}", bike_id, sensor_unit_id);
        self.device = Some(ids);
        Ok(ids)
    }

    /// Obtain a fresh trip ID, registering the device first if needed
    pub async fn register_trip(&mut self) -> Result<u32, ApiError> {
        let device = self.register_device().await?;
        let body = serde_json::to_string(&TripRegistration {
            bike_id: device.bike_id,
            sensor_unit_id: device.sensor_unit_id,
        })
        .map_err(encode_error)?;

        let trip_id = self.register(TRIP_REGISTER_PATH, &body).await?;
        info!("Registered trip {}", trip_id);
        Ok(trip_id)
    }

    /// Best-effort GET of the health endpoint. The first request on a cold
    /// connection tends to fail, so this warms it up before registering.
    pub async fn health_check(&mut self) -> bool {
        match self.send(Method::Get, HEALTH_PATH, None, None).await {
            Ok(response) => {
                debug!("Health check answered {}", response.status);
                response.is_success()
            }
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    /// Upload `path` for `trip_id`, skipping the first `start_batch` batches.
    ///
    /// Returns the number of batches sent. On the first rejected batch the
    /// file is backed up tagged with the trip and that batch index.
    pub async fn upload_trip<F: FileSystem>(
        &mut self,
        log: &mut AppendLog<F>,
        path: &str,
        trip_id: u32,
        start_batch: u32,
    ) -> Result<u32, ApiError> {
        log.rewind(path);
        let already_sent = start_batch as usize * self.batch_size;
        if already_sent > 0 {
            let skipped = log.skip(path, already_sent)?;
            info!(
                "Resuming trip {} at batch {} ({} records already sent)",
                trip_id, start_batch, skipped
            );
        }

        let mut batch = start_batch;
        let mut sent = 0;
        while let Some(records) = log.retrieve(path, self.batch_size)? {
            let body = serde_json::to_string(&records).map_err(encode_error)?;

            if let Err(e) = self.post(TRIP_UPLOAD_PATH, &body, Some(trip_id)).await {
                let message = format!("HTTP post failed after {} batches: {}", sent, e);
                error!("{}", message);
                log.log_event(log::Level::Error, self.timer.now(), None, &message);

                let backup = log.backup(path, BackupTag::resume(trip_id, batch), self.timer.now())?;
                return Err(ApiError::UploadInterrupted {
                    trip_id,
                    batch,
                    backup: bounded(&backup),
                });
            }

            debug!(
                "Uploaded batch {} ({} records) for trip {}",
                batch,
                records.len(),
                trip_id
            );
            batch += 1;
            sent += 1;
        }

        info!("Trip {} upload complete, {} batches sent", trip_id, sent);
        Ok(sent)
    }

    /// Warm up the connection, register a trip and upload `path` from the start.
    ///
    /// If no trip can be registered the file is backed up untagged.
    pub async fn register_and_upload_trip<F: FileSystem>(
        &mut self,
        log: &mut AppendLog<F>,
        path: &str,
    ) -> Result<u32, ApiError> {
        self.health_check().await;

        let trip_id = match self.register_trip().await {
            Ok(trip_id) => trip_id,
            Err(e) => {
                let message = format!("Failed to register trip, aborting upload: {}", e);
                error!("{}", message);
                log.log_event(log::Level::Error, self.timer.now(), None, &message);

                let backup = log.backup(path, BackupTag::UNTAGGED, self.timer.now())?;
                return Err(ApiError::RegistrationInterrupted {
                    backup: bounded(&backup),
                });
            }
        };

        self.upload_trip(log, path, trip_id, 0).await
    }
}
