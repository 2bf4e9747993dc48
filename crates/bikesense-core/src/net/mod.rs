//! Network seams: WiFi association and HTTP transport

mod connectivity;
mod http;

pub use connectivity::ConnectivityMonitor;
pub use http::{HttpClient, HttpError, Method, Request, Response};

use alloc::string::String;
use thiserror_no_std::Error;

use crate::config::{MAX_SSID_LEN, WifiCredentials};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("network {0} not in range")]
    NotFound(heapless::String<MAX_SSID_LEN>),
    #[error("association with {ssid} failed: {details}")]
    AssociationFailed {
        ssid: heapless::String<MAX_SSID_LEN>,
        details: heapless::String<64>,
    },
    #[error("timed out joining {0}")]
    Timeout(heapless::String<MAX_SSID_LEN>),
}

/// A WiFi station interface
pub trait WifiStation {
    /// Whether the station is currently associated
    fn is_connected(&mut self) -> bool;

    /// Try to join one network
    fn connect(
        &mut self,
        credentials: &WifiCredentials,
    ) -> impl Future<Output = Result<(), NetworkError>>;

    /// SSID of the joined network
    fn ssid(&self) -> Option<String>;
}
