//! Google OAuth2 Provider
//!
//! Authorization Code flow with PKCE against the endpoints named in the
//! credentials descriptor (Google's by default).

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{error, info};

use super::OAuthProvider;
use crate::config::AuthorizationConfig;
use crate::error::{Error, Result};
use crate::token::{TokenRecord, MAX_EXPIRES_IN_SECS};

/// Used when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Google OAuth2 provider.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    config: AuthorizationConfig,
    http: Client,
}

impl GoogleProvider {
    pub fn new(config: AuthorizationConfig, http: Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    /// POST a form-encoded request and return status and body.
    ///
    /// Secrets travel in the request body only.
    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<(StatusCode, String), String> {
        let response = self
            .http
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            error!("HTTP error {} from {}: {}", status, url, body);
        }
        Ok((status, body))
    }
}

impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        let scope_str = self.config.scopes.join(" ");
        let separator = if self.config.auth_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256&access_type=offline&prompt=consent",
            self.config.auth_url,
            separator,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scope_str),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenRecord> {
        info!("Exchanging authorization code for tokens");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let (status, body) = self
            .post_form(&self.config.token_url, &params)
            .await
            .map_err(Error::TokenExchange)?;
        parse_token_response(status, &body).map_err(Error::TokenExchange)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRecord> {
        info!("Refreshing access token");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let (status, body) = self
            .post_form(&self.config.token_url, &params)
            .await
            .map_err(Error::TokenRefresh)?;
        parse_token_response(status, &body).map_err(Error::TokenRefresh)
    }

    async fn revoke_token(&self, token: &str) -> Result<()> {
        info!("Revoking token at {}", self.name());

        let (status, body) = self
            .post_form(&self.config.revoke_url, &[("token", token)])
            .await
            .map_err(Error::TokenRevoke)?;

        if status.is_success() {
            return Ok(());
        }
        Err(Error::Api {
            status: status.as_u16(),
            message: oauth_error_message(&body).unwrap_or_else(|| "Revocation failed".to_string()),
        })
    }
}

// ── Response parsing ────────────────────────────────────────────────────────

/// `error: error_description` from an OAuth error body, if present.
fn oauth_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let err = parsed.get("error")?;
    // Some servers nest the error object
    let code = err
        .as_str()
        .or_else(|| err.get("status").and_then(|v| v.as_str()))
        .unwrap_or("error");
    let desc = parsed
        .get("error_description")
        .and_then(|v| v.as_str())
        .or_else(|| err.get("message").and_then(|v| v.as_str()))
        .unwrap_or("Unknown error");
    Some(format!("{}: {}", code, desc))
}

/// Parse a token endpoint response into a record.
fn parse_token_response(status: StatusCode, body: &str) -> std::result::Result<TokenRecord, String> {
    if let Some(msg) = oauth_error_message(body) {
        return Err(msg);
    }
    if !status.is_success() {
        return Err(format!("HTTP {} error: {}", status, body));
    }

    let parsed: Value =
        serde_json::from_str(body).map_err(|e| format!("Invalid JSON response: {}", e))?;

    let access_token = parsed
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or("Missing access_token in response")?;

    let token_type = parsed
        .get("token_type")
        .and_then(|v| v.as_str())
        .unwrap_or("Bearer");

    let expires_in = match parsed.get("expires_in") {
        None | Some(Value::Null) => DEFAULT_EXPIRES_IN,
        Some(v) => v
            .as_i64()
            .filter(|secs| (0..=MAX_EXPIRES_IN_SECS).contains(secs))
            .ok_or_else(|| format!("expires_in out of range: {}", v))?,
    };

    let mut record = TokenRecord::new(access_token).expires_in(expires_in);
    record.token_type = token_type.to_string();
    if let Some(rt) = parsed.get("refresh_token").and_then(|v| v.as_str()) {
        record = record.with_refresh_token(rt);
    }
    Ok(record)
}

// ── PKCE Utilities ──────────────────────────────────────────────────────────

/// Generate a PKCE code verifier (43-128 characters of unreserved URI characters).
pub fn generate_code_verifier() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64_url_encode(&bytes)
}

/// Derive the PKCE code challenge from a code verifier using S256.
pub fn generate_code_challenge(verifier: &str) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(verifier.as_bytes());
    base64_url_encode(&hash)
}

/// Base64url encoding (no padding) per RFC 4648 §5.
pub(crate) fn base64_url_encode(data: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_authorization_config;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server_uri: &str) -> GoogleProvider {
        let descriptor = serde_json::json!({
            "installed": {
                "client_id": "cid",
                "client_secret": "csecret",
                "auth_uri": "https://accounts.example.com/o/oauth2/auth",
                "token_uri": format!("{}/token", server_uri),
                "revoke_uri": format!("{}/revoke", server_uri),
                "redirect_uris": ["http://localhost"]
            }
        });
        let config = parse_authorization_config(
            descriptor.to_string().as_bytes(),
            &["https://www.googleapis.com/auth/gmail.readonly".to_string()],
        )
        .unwrap();
        GoogleProvider::new(config, Client::new())
    }

    #[test]
    fn test_code_verifier_length() {
        let v = generate_code_verifier();
        assert!(v.len() >= 43);
        assert!(v.len() <= 128);
    }

    #[test]
    fn test_code_challenge_matches_rfc7636_example() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            generate_code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_authorize_url_requests_offline_access() {
        let provider = provider_for("http://127.0.0.1:1");
        let url = provider.authorize_url("st4te", "ch4llenge");

        assert!(url.starts_with("https://accounts.example.com/o/oauth2/auth?client_id=cid&"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("code_challenge=ch4llenge"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fgmail.readonly"));
    }

    #[test]
    fn test_parse_token_response_success() {
        let body = r#"{
            "access_token": "ya29.test",
            "refresh_token": "1//0e.test",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "https://www.googleapis.com/auth/gmail.readonly"
        }"#;

        let token = parse_token_response(StatusCode::OK, body).unwrap();
        assert_eq!(token.access_token, "ya29.test");
        assert_eq!(token.refresh_token.as_deref(), Some("1//0e.test"));
        assert!(!token.is_expiring(60));
    }

    #[test]
    fn test_parse_token_response_error() {
        let body = r#"{"error": "invalid_grant", "error_description": "Token has been revoked"}"#;
        let err = parse_token_response(StatusCode::BAD_REQUEST, body).unwrap_err();
        assert_eq!(err, "invalid_grant: Token has been revoked");
    }

    #[test]
    fn test_parse_token_response_requires_access_token() {
        assert!(parse_token_response(StatusCode::OK, r#"{"token_type":"Bearer"}"#).is_err());
        assert!(parse_token_response(StatusCode::BAD_GATEWAY, "upstream down").is_err());
    }

    #[test]
    fn test_parse_token_response_rejects_unbounded_lifetime() {
        let body = r#"{"access_token":"t","expires_in":9223372036854775807}"#;
        let err = parse_token_response(StatusCode::OK, body).unwrap_err();
        assert!(err.contains("expires_in"));

        let body = r#"{"access_token":"t","expires_in":-5}"#;
        assert!(parse_token_response(StatusCode::OK, body).is_err());
        let body = r#"{"access_token":"t","expires_in":"soon"}"#;
        assert!(parse_token_response(StatusCode::OK, body).is_err());
    }

    #[test]
    fn test_parse_token_response_defaults_lifetime() {
        let token = parse_token_response(StatusCode::OK, r#"{"access_token":"t"}"#).unwrap();
        assert!(!token.is_expiring(3500));
        assert!(token.is_expiring(3700));
    }

    #[tokio::test]
    async fn test_huge_expires_in_is_exchange_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"access_token":"t","expires_in":9223372036854775807}"#),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let err = provider.exchange_code("abc123", "v").await.unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)));
        let err = provider.refresh_token("r").await.unwrap_err();
        assert!(matches!(err, Error::TokenRefresh(_)));
    }

    #[tokio::test]
    async fn test_exchange_code_posts_pkce_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc123"))
            .and(body_string_contains("code_verifier=v3rifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok1",
                "refresh_token": "ref1",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let token = provider.exchange_code("abc123", "v3rifier").await.unwrap();

        assert_eq!(token.access_token, "tok1");
        assert_eq!(token.refresh_token.as_deref(), Some("ref1"));
    }

    #[tokio::test]
    async fn test_exchange_code_failure_is_exchange_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Bad Request"
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let err = provider.exchange_code("expired", "v").await.unwrap_err();
        assert!(matches!(err, Error::TokenExchange(ref msg) if msg.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_refresh_failure_is_refresh_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        let err = provider.refresh_token("r").await.unwrap_err();
        assert!(matches!(err, Error::TokenRefresh(_)));
    }

    #[tokio::test]
    async fn test_revoke_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(body_string_contains("token=tok1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri());
        provider.revoke_token("tok1").await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_unreachable_is_revoke_error() {
        let provider = provider_for("http://127.0.0.1:1");
        let err = provider.revoke_token("tok1").await.unwrap_err();
        assert!(matches!(err, Error::TokenRevoke(_)));
        assert!(err.to_string().starts_with("Token revocation failed"));
    }
}
