//! HTTP Client Utilities
//!
//! Shared reqwest client construction. Every network call in a session goes
//! through the client built here, so its timeout bounds each blocking step.

use std::time::Duration;

use crate::error::{Error, Result};

/// Create a reqwest HTTP client with the given request timeout.
pub fn create_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
        .map_err(|e| Error::ClientConstruction(format!("failed to build HTTP client: {}", e)))
}
