//! Configuration
//!
//! Client credentials are read from the JSON descriptor downloaded from the
//! Google Cloud console. Both the wrapped form (`{"installed": {...}}` or
//! `{"web": {...}}`) and a flat client entry are accepted.

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

// ── Google defaults ─────────────────────────────────────────────────────────

pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_REVOKE_ENDPOINT: &str = "https://oauth2.googleapis.com/revoke";
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Used when the descriptor lists no redirect URI. The user copies the code
/// (or the whole URL) from the browser address bar after consent.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

pub const DEFAULT_TOKEN_FILE: &str = "gmail-token.json";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ── AuthorizationConfig ─────────────────────────────────────────────────────

/// OAuth client settings, immutable once loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationConfig {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub redirect_uri: String,
}

impl fmt::Debug for AuthorizationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("revoke_url", &self.revoke_url)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ClientEntry {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    revoke_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
    #[serde(default)]
    scopes: Vec<String>,
}

/// Read a credentials descriptor from disk and build the config for the
/// requested scopes.
pub fn load_authorization_config(
    path: impl AsRef<Path>,
    scopes: &[String],
) -> Result<AuthorizationConfig> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_authorization_config(&data, scopes)
}

/// Parse a credentials descriptor held in memory.
///
/// The requested scopes take precedence; the descriptor's own `scopes` are
/// only used when the caller asks for none.
pub fn parse_authorization_config(data: &[u8], scopes: &[String]) -> Result<AuthorizationConfig> {
    let root: Value =
        serde_json::from_slice(data).map_err(|e| Error::ConfigParse(format!("invalid JSON: {}", e)))?;

    let entry = match (root.get("installed"), root.get("web")) {
        (Some(inner), _) | (None, Some(inner)) => inner.clone(),
        (None, None) => root,
    };
    if !entry.is_object() {
        return Err(Error::ConfigParse(
            "expected a JSON object describing the client".to_string(),
        ));
    }

    let entry: ClientEntry =
        serde_json::from_value(entry).map_err(|e| Error::ConfigParse(e.to_string()))?;

    if entry.client_id.trim().is_empty() {
        return Err(Error::ConfigParse("missing client_id".to_string()));
    }
    if entry.client_secret.trim().is_empty() {
        return Err(Error::ConfigParse("missing client_secret".to_string()));
    }

    let scopes = if scopes.is_empty() {
        entry.scopes
    } else {
        scopes.to_vec()
    };
    if scopes.is_empty() {
        return Err(Error::ConfigParse("no scope requested".to_string()));
    }

    let auth_url = endpoint("auth_uri", entry.auth_uri, GOOGLE_AUTH_ENDPOINT)?;
    let token_url = endpoint("token_uri", entry.token_uri, GOOGLE_TOKEN_ENDPOINT)?;
    let revoke_url = endpoint("revoke_uri", entry.revoke_uri, GOOGLE_REVOKE_ENDPOINT)?;
    let redirect_uri = entry
        .redirect_uris
        .into_iter()
        .next()
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

    Ok(AuthorizationConfig {
        client_id: entry.client_id,
        client_secret: entry.client_secret,
        scopes,
        auth_url,
        token_url,
        revoke_url,
        redirect_uri,
    })
}

fn endpoint(field: &str, value: Option<String>, default: &str) -> Result<String> {
    let url = value.unwrap_or_else(|| default.to_string());
    Url::parse(&url).map_err(|e| Error::ConfigParse(format!("invalid {} '{}': {}", field, url, e)))?;
    Ok(url)
}

// ── SessionConfig ───────────────────────────────────────────────────────────

/// Everything one session build needs, passed explicitly.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub credentials_path: PathBuf,
    pub scopes: Vec<String>,
    /// Directory for the token cache; `~/.credentials` when unset.
    pub cache_dir: Option<PathBuf>,
    pub token_file: String,
    pub api_base_url: String,
    /// Applied to every HTTP call the session makes.
    pub http_timeout: Duration,
}

impl SessionConfig {
    pub fn new(credentials_path: impl Into<PathBuf>, scope: impl Into<String>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            scopes: vec![scope.into()],
            cache_dir: None,
            token_file: DEFAULT_TOKEN_FILE.to_string(),
            api_base_url: GMAIL_API_BASE.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_token_file(mut self, name: impl Into<String>) -> Self {
        self.token_file = name.into();
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}
