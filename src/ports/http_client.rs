use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use thiserror::Error;

/// Custom error type for upstream HTTP operations
#[derive(Error, Debug)]
#[non_exhaustive] // Signal that more variants may be added in the future
pub enum UpstreamError {
    /// Error when the connection to the target fails (refused, reset, DNS)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error when the round trip exceeds the allowed time
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Error when the request could not be constructed or sent as given
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for upstream client operations
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// UpstreamClient defines the port (interface) for talking to targets.
/// Requests and responses are fully buffered; the timeout covers the whole
/// round trip including the response body.
pub trait UpstreamClient: Send + Sync + 'static {
    /// Send a buffered request to a target and collect the full response.
    ///
    /// # Arguments
    /// * `req` - The request to send, body already buffered
    /// * `timeout` - Budget for the complete round trip
    fn send_request(
        &self,
        req: Request<Bytes>,
        timeout: Duration,
    ) -> impl std::future::Future<Output = UpstreamResult<Response<Bytes>>> + Send;

    /// Issue a GET liveness probe and resolve to the response status.
    ///
    /// # Arguments
    /// * `url` - The absolute probe URL
    /// * `timeout` - Budget for the probe round trip
    fn probe(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl std::future::Future<Output = UpstreamResult<StatusCode>> + Send;
}
