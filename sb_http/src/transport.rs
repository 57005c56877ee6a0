use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::HeaderMap;
use http::StatusCode;
use thiserror::Error;

/// One outbound GET, fully resolved
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// Raw response as seen by the dispatcher
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }
}

/// Network-level failure: no HTTP status was received
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Sends requests on behalf of the dispatcher
///
/// The production implementation is [`crate::HttpClient`]; tests substitute
/// scripted transports.
pub trait Transport: Send + Sync {
    fn get<'a>(&'a self, request: &'a ApiRequest) -> Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + 'a>>;
}
