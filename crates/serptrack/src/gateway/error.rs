//! Gateway error types.

use thiserror::Error;

/// Errors from the search-results API.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport-level failure (DNS, TLS, timeout, non-2xx status).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status code.
    #[error("API error {status_code}: {message}")]
    Api { status_code: u32, message: String },

    /// Part of a batch was refused, so the batch is treated as failed.
    #[error("{rejected} of {total} tasks rejected: {message}")]
    Rejected {
        rejected: usize,
        total: usize,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// The client could not be built from its configuration.
    #[error("Gateway configuration error: {0}")]
    Config(String),

    /// Test gateways use this to simulate an outage.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            // 50000-range codes are internal errors on the API side; plain
            // HTTP statuses end up here when the body was not an envelope.
            GatewayError::Api { status_code, .. } => {
                *status_code >= 50000 || (500..600).contains(status_code) || *status_code == 429
            }
            GatewayError::Unavailable(_) => true,
            GatewayError::Rejected { .. } | GatewayError::Decode(_) | GatewayError::Config(_) => {
                false
            }
        }
    }
}
