//! Authenticated HTTP Transport
//!
//! Injects the bearer token into every request and refreshes it shortly
//! before expiry. A refreshed token replaces the current one and is written
//! back to the cache file so the next run starts from it.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::provider::OAuthProvider;
use crate::store;
use crate::token::{TokenRecord, REFRESH_MARGIN_SECS};

/// HTTP client carrying the current token.
pub struct AuthorizedClient<P> {
    http: Client,
    provider: P,
    token: RwLock<TokenRecord>,
    cache_path: Option<PathBuf>,
}

impl<P: OAuthProvider> AuthorizedClient<P> {
    pub fn new(http: Client, provider: P, token: TokenRecord) -> Self {
        Self {
            http,
            provider,
            token: RwLock::new(token),
            cache_path: None,
        }
    }

    /// Persist refreshed tokens to `path`.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Where refreshed tokens are written, if anywhere.
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// Snapshot of the current token record.
    pub async fn token(&self) -> TokenRecord {
        self.token.read().await.clone()
    }

    /// A valid access token, refreshing first if it is about to expire.
    pub async fn access_token(&self) -> Result<String> {
        {
            let current = self.token.read().await;
            if !current.is_expiring(REFRESH_MARGIN_SECS) {
                return Ok(current.access_token.clone());
            }
        }

        let mut current = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock
        if !current.is_expiring(REFRESH_MARGIN_SECS) {
            return Ok(current.access_token.clone());
        }

        let Some(refresh_token) = current.refresh_token.clone().filter(|t| !t.is_empty()) else {
            if current.is_expired() {
                return Err(Error::TokenExpired);
            }
            return Ok(current.access_token.clone());
        };

        match self.provider.refresh_token(&refresh_token).await {
            Ok(mut refreshed) => {
                if refreshed.refresh_token.is_none() {
                    refreshed.refresh_token = Some(refresh_token);
                }
                self.persist(&refreshed);
                *current = refreshed;
                info!("Access token refreshed");
                Ok(current.access_token.clone())
            }
            Err(e) if !current.is_expired() => {
                warn!("Token refresh failed but token not yet expired: {}", e);
                Ok(current.access_token.clone())
            }
            Err(e) => Err(e),
        }
    }

    /// Force a refresh regardless of expiry.
    pub async fn refresh(&self) -> Result<TokenRecord> {
        let mut current = self.token.write().await;
        let refresh_token = current
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::TokenRefresh("no refresh token available".to_string()))?;

        let mut refreshed = self.provider.refresh_token(&refresh_token).await?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token);
        }
        self.persist(&refreshed);
        *current = refreshed.clone();
        Ok(refreshed)
    }

    fn persist(&self, token: &TokenRecord) {
        if let Some(path) = &self.cache_path {
            if let Err(e) = store::save(path, token) {
                error!("Failed to save refreshed token: {}", e);
            }
        }
    }

    /// Make an authenticated GET request
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let token = self.access_token().await?;
        let builder = self.http.get(url).query(query).bearer_auth(token);
        self.execute_request(builder).await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.access_token().await?;
        let builder = self.http.post(url).bearer_auth(token).json(body);
        self.execute_request(builder).await
    }

    /// Make an authenticated DELETE request
    pub async fn delete(&self, url: &str) -> Result<Value> {
        let token = self.access_token().await?;
        let builder = self.http.delete(url).bearer_auth(token);
        self.execute_request(builder).await
    }

    /// Execute a request and handle Google API response patterns
    async fn execute_request(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder.send().await?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited by Gmail API");
            return Err(Error::Api {
                status: status.as_u16(),
                message: "Rate limited. Please try again later.".to_string(),
            });
        }

        let body = response.text().await?;

        // Empty successful responses (e.g., DELETE)
        if status.is_success() && body.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        if !status.is_success() {
            let message = extract_error_message(&body, status);
            error!("Gmail API error: {}", message);
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::Decode(format!("{} (body: {})", e, body)))
    }

    /// GET every page of a list endpoint, collecting `items_field`.
    pub async fn get_paginated(
        &self,
        url: &str,
        base_query: &[(&str, String)],
        items_field: &str,
        max_results: Option<usize>,
    ) -> Result<Vec<Value>> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;
        let limit = max_results.unwrap_or(usize::MAX);

        loop {
            let mut query = base_query.to_vec();
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }
            if let Some(max) = max_results {
                query.push(("maxResults", (max - all_items.len()).to_string()));
            }

            let response = self.get(url, &query).await?;

            if let Some(items) = response.get(items_field).and_then(|v| v.as_array()) {
                all_items.extend(items.iter().cloned());
            }
            if all_items.len() >= limit {
                all_items.truncate(limit);
                break;
            }

            match response.get("nextPageToken").and_then(|v| v.as_str()) {
                Some(next) => page_token = Some(next.to_string()),
                None => break,
            }
        }

        Ok(all_items)
    }
}

/// Error message from a Google API error body:
/// `{"error": {"code": 400, "message": "..."}}`
fn extract_error_message(body: &str, status: StatusCode) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| format!("HTTP {} error", status))
}
