//! Session Builder
//!
//! Cached token if there is a usable one, interactive consent otherwise,
//! then an authenticated Gmail handle. A failed cache write after consent
//! only costs the next run a new consent; it never fails this one.

use reqwest::Client;
use std::path::Path;
use tracing::{info, warn};

use crate::authorizer::{authorize_interactively, CodePrompt};
use crate::config::{load_authorization_config, SessionConfig};
use crate::error::Result;
use crate::gmail::{GmailService, TokenOrigin};
use crate::http::create_http_client;
use crate::provider::{GoogleProvider, OAuthProvider};
use crate::store;
use crate::token::TokenRecord;
use crate::transport::AuthorizedClient;

/// Load credentials, resolve the cache path and build a Gmail session
/// against Google's endpoints.
pub async fn build_session<C: CodePrompt>(
    config: &SessionConfig,
    prompt: &mut C,
) -> Result<GmailService<GoogleProvider>> {
    let auth = load_authorization_config(&config.credentials_path, &config.scopes)?;
    let http = create_http_client(config.http_timeout)?;
    let cache_path = store::resolve_cache_path(config.cache_dir.as_deref(), &config.token_file)?;

    let provider = GoogleProvider::new(auth, http.clone());
    build_session_with(provider, prompt, &cache_path, http, &config.api_base_url).await
}

/// Session flow over an explicit provider, prompt and cache path.
pub async fn build_session_with<P, C>(
    provider: P,
    prompt: &mut C,
    cache_path: &Path,
    http: Client,
    api_base_url: &str,
) -> Result<GmailService<P>>
where
    P: OAuthProvider,
    C: CodePrompt,
{
    let (token, origin) = match try_cache(cache_path) {
        Some(token) => (token, TokenOrigin::Cache),
        None => {
            let token = authorize_interactively(&provider, prompt).await?;
            if let Err(e) = store::save(cache_path, &token) {
                warn!("{} (continuing with the new token)", e);
            }
            (token, TokenOrigin::Interactive)
        }
    };

    let client = AuthorizedClient::new(http, provider, token).with_cache_path(cache_path);
    let service = GmailService::new(client, api_base_url, origin)?;
    info!("Gmail session ready ({:?} token)", origin);
    Ok(service)
}

/// A cached token worth using, or `None` to fall through to consent.
fn try_cache(cache_path: &Path) -> Option<TokenRecord> {
    match store::load(cache_path) {
        Ok(token) if token.is_usable() => Some(token),
        Ok(_) => {
            info!("Cached token at {} is expired and cannot be refreshed", cache_path.display());
            None
        }
        Err(e) => {
            info!("{}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::tests::FakeProvider;
    use crate::authorizer::ConsolePrompt;
    use crate::error::Error;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn console(input: &'static str) -> ConsolePrompt<&'static [u8], Vec<u8>> {
        ConsolePrompt::new(input.as_bytes(), Vec::new())
    }

    fn exchanged_token() -> TokenRecord {
        let json = r#"{"access_token":"tok1","expiry":"2099-01-01T00:00:00Z","token_type":"Bearer"}"#;
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_no_cache_runs_consent_once_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("gmail-token.json");
        let provider = FakeProvider {
            token: Some(exchanged_token()),
            ..Default::default()
        };
        let mut prompt = console("abc123\n");

        let service = build_session_with(
            provider,
            &mut prompt,
            &cache,
            Client::new(),
            "https://gmail.googleapis.com/gmail/v1",
        )
        .await
        .unwrap();

        assert_eq!(service.token_origin(), TokenOrigin::Interactive);
        let exchanged = service.client().provider().exchanged.borrow().clone();
        assert_eq!(exchanged.len(), 1);
        assert_eq!(exchanged[0].0, "abc123");

        assert_eq!(store::load(&cache).unwrap(), exchanged_token());
        let (_, out) = prompt.into_inner();
        assert!(String::from_utf8(out).unwrap().contains("Enter code> "));
    }

    #[tokio::test]
    async fn test_valid_cache_skips_console() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("gmail-token.json");
        store::save(&cache, &TokenRecord::new("cached").expires_in(3600)).unwrap();
        let mut prompt = console("");

        let service = build_session_with(
            FakeProvider::default(),
            &mut prompt,
            &cache,
            Client::new(),
            "https://gmail.googleapis.com/gmail/v1",
        )
        .await
        .unwrap();

        assert_eq!(service.token_origin(), TokenOrigin::Cache);
        assert_eq!(service.client().token().await.access_token, "cached");
        assert!(service.client().provider().exchanged.borrow().is_empty());
        let (_, out) = prompt.into_inner();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_unusable_cache_falls_back_to_consent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("gmail-token.json");
        store::save(&cache, &TokenRecord::new("stale").expires_in(-60)).unwrap();
        let provider = FakeProvider {
            token: Some(exchanged_token()),
            ..Default::default()
        };
        let mut prompt = console("abc123\n");

        let service = build_session_with(provider, &mut prompt, &cache, Client::new(), "https://example.com")
            .await
            .unwrap();

        assert_eq!(service.token_origin(), TokenOrigin::Interactive);
        assert_eq!(store::load(&cache).unwrap().access_token, "tok1");
    }

    #[tokio::test]
    async fn test_exchange_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("gmail-token.json");
        let mut prompt = console("abc123\n");

        let result = build_session_with(
            FakeProvider::default(),
            &mut prompt,
            &cache,
            Client::new(),
            "https://example.com",
        )
        .await;

        assert!(matches!(result, Err(Error::TokenExchange(_))));
        assert!(!cache.exists());
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("missing-dir").join("gmail-token.json");
        let provider = FakeProvider {
            token: Some(exchanged_token()),
            ..Default::default()
        };
        let mut prompt = console("abc123\n");

        let service = build_session_with(provider, &mut prompt, &cache, Client::new(), "https://example.com")
            .await
            .unwrap();

        assert_eq!(service.client().token().await.access_token, "tok1");
        assert!(!cache.exists());
    }

    #[tokio::test]
    async fn test_bad_base_url_is_construction_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("gmail-token.json");
        store::save(&cache, &TokenRecord::new("cached")).unwrap();
        let mut prompt = console("");

        let result =
            build_session_with(FakeProvider::default(), &mut prompt, &cache, Client::new(), "::nope::").await;
        assert!(matches!(result, Err(Error::ClientConstruction(_))));
    }

    #[tokio::test]
    async fn test_build_session_reports_missing_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new(dir.path().join("client_secret.json"), "read")
            .with_cache_dir(dir.path().join("creds"));
        let mut prompt = console("");

        let result = build_session(&config, &mut prompt).await;
        assert!(matches!(result, Err(Error::ConfigRead { .. })));
    }

    #[tokio::test]
    async fn test_build_session_uses_cached_token() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("client_secret.json");
        std::fs::write(&secret, r#"{"client_id":"X","client_secret":"Y","scopes":["read"]}"#).unwrap();
        let creds = dir.path().join("creds");
        let cache = store::resolve_cache_path(Some(&creds), "gmail-token.json").unwrap();
        store::save(&cache, &TokenRecord::new("cached").expires_in(3600)).unwrap();

        let config = SessionConfig::new(&secret, "read").with_cache_dir(&creds);
        let mut prompt = console("");

        let service = build_session(&config, &mut prompt).await.unwrap();
        assert_eq!(service.token_origin(), TokenOrigin::Cache);
        assert_eq!(service.base_url(), "https://gmail.googleapis.com/gmail/v1");
    }

    #[tokio::test]
    async fn test_build_session_exchanges_code_with_google_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc123"))
            .and(body_string_contains("client_id=X"))
            .and(body_string_contains("client_secret=Y"))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok1",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("client_secret.json");
        let descriptor = serde_json::json!({
            "client_id": "X",
            "client_secret": "Y",
            "scopes": ["read"],
            "token_uri": format!("{}/token", server.uri()),
        });
        std::fs::write(&secret, descriptor.to_string()).unwrap();
        let creds = dir.path().join("creds");
        let config = SessionConfig::new(&secret, "read").with_cache_dir(&creds);
        let mut prompt = console("abc123\n");

        let service = build_session(&config, &mut prompt).await.unwrap();

        assert_eq!(service.token_origin(), TokenOrigin::Interactive);
        let cache = creds.join("gmail-token.json");
        assert_eq!(service.client().cache_path(), Some(cache.as_path()));

        let cached = store::load(&cache).unwrap();
        assert_eq!(cached, service.client().token().await);
        assert_eq!(cached.access_token, "tok1");
        assert_eq!(cached.token_type, "Bearer");
        assert_eq!(cached.refresh_token, None);
        assert!(!cached.is_expiring(3500));
        assert!(cached.is_expiring(3700));

        let (_, out) = prompt.into_inner();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("client_id=X"));
        assert!(out.contains("scope=read"));
    }
}
