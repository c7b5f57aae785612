//! Error Types
//!
//! One error enum for the whole authorization and API flow. Each variant
//! names the step that failed so callers can print it as-is.

use std::path::PathBuf;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to read client secret file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse client secret file to config: {0}")]
    ConfigParse(String),

    #[error("Unable to create token cache directory {path}: {reason}")]
    DirectoryCreate { path: PathBuf, reason: String },

    /// Expected on first run; the session builder falls back to consent.
    #[error("No usable cached token at {path}: {reason}")]
    CacheMiss { path: PathBuf, reason: String },

    #[error("Unable to read authorization code: {0}")]
    UserInput(String),

    #[error("Unable to retrieve token from web: {0}")]
    TokenExchange(String),

    #[error("Unable to cache oauth token at {path}: {source}")]
    CachePersist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to create Gmail client: {0}")]
    ClientConstruction(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Token revocation failed: {0}")]
    TokenRevoke(String),

    #[error("Access token has expired and no refresh token is available")]
    TokenExpired,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gmail API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl Error {
    /// Whether the session builder may recover from this error by asking the
    /// user for consent again.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss { .. })
    }
}
