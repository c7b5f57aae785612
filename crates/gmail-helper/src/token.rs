//! Token Record
//!
//! The OAuth token as cached on disk. The JSON layout matches the common
//! `{"access_token", "token_type", "refresh_token", "expiry"}` cache format,
//! where an absent or zero expiry means the token never expires.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Refresh this long before the recorded expiry.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Upper bound on any lifetime passed to [`TokenRecord::expires_in`].
pub const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 86_400;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    #[zeroize(skip)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    #[zeroize(skip)]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Year-one timestamps are how "no expiry" is written by other tools that
/// share this cache format.
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(expiry.filter(|t| t.year() > 1))
}

impl TokenRecord {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expiry: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Expiry computed from an `expires_in` value in seconds, clamped to
    /// `±MAX_EXPIRES_IN_SECS`.
    #[must_use]
    pub fn expires_in(self, secs: i64) -> Self {
        let secs = secs.clamp(-MAX_EXPIRES_IN_SECS, MAX_EXPIRES_IN_SECS);
        self.with_expiry(Utc::now() + Duration::seconds(secs))
    }

    /// Whether the token expires within `margin_secs` of now.
    pub fn is_expiring(&self, margin_secs: i64) -> bool {
        match self.expiry {
            Some(exp) => exp.signed_duration_since(Utc::now()).num_seconds() < margin_secs,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expiry.is_some_and(|exp| exp <= Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Usable either directly or after a refresh.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() && (!self.is_expired() || self.can_refresh())
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiry", &self.expiry)
            .finish()
    }
}
