//! OAuth Provider Abstraction
//!
//! The session flow only needs four things from an authorization server:
//! a consent URL, code exchange, refresh and revocation.

pub mod google;

use crate::error::Result;
use crate::token::TokenRecord;

pub use google::GoogleProvider;

#[allow(async_fn_in_trait)]
pub trait OAuthProvider {
    /// Provider name (e.g. "google")
    fn name(&self) -> &str;

    /// Consent URL requesting offline access, bound to `state` and the PKCE
    /// `code_challenge`.
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String;

    /// Exchange an authorization code for a token.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenRecord>;

    /// Obtain a fresh access token. The returned record may lack a refresh
    /// token; callers carry the old one over.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRecord>;

    /// Revoke a token at the provider.
    async fn revoke_token(&self, token: &str) -> Result<()>;
}
