use alloc::string::String;
use embassy_time::Duration;
use thiserror_no_std::Error;

use crate::bounded;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("connection failed: {0}")]
    Connection(heapless::String<64>),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    InvalidResponse(heapless::String<64>),
}

impl HttpError {
    pub fn connection(details: &str) -> Self {
        HttpError::Connection(bounded(details))
    }

    pub fn invalid_response(details: &str) -> Self {
        HttpError::InvalidResponse(bounded(details))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: Method,
    pub url: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: Option<&'a str>,
    pub timeout: Duration,
}

impl Request<'_> {
    /// First header named `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    /// 200 OK and 201 Created are the only statuses the service reports success with
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }
}

/// HTTP transport. Implementations must give up after `request.timeout`.
pub trait HttpClient {
    fn request(&mut self, request: &Request<'_>) -> impl Future<Output = Result<Response, HttpError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses() {
        let ok = |status| Response {
            status,
            body: String::new(),
        };
        assert!(ok(200).is_success());
        assert!(ok(201).is_success());
        assert!(!ok(204).is_success());
        assert!(!ok(500).is_success());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let headers = [("Content-Type", "application/json"), ("Trip-ID", "7")];
        let request = Request {
            method: Method::Post,
            url: "http://api/trip/upload_data",
            headers: &headers,
            body: None,
            timeout: Duration::from_millis(1_000),
        };
        assert_eq!(request.header("trip-id"), Some("7"));
        assert_eq!(request.header("Authorization"), None);
    }
}
