//! Gmail Helper
//!
//! Wires a local OAuth2 consent flow to an authenticated Gmail API handle:
//! load the client secret, reuse the cached token or ask the user for
//! consent, cache the result under `~/.credentials/`, and return a
//! ready-to-use [`GmailService`].
//!
//! ```no_run
//! use gmail_helper::{build_session, ConsolePrompt, SessionConfig, GMAIL_READONLY_SCOPE};
//!
//! # async fn run() -> gmail_helper::Result<()> {
//! let config = SessionConfig::new("client_secret.json", GMAIL_READONLY_SCOPE);
//! let mut prompt = ConsolePrompt::stdio();
//! let gmail = build_session(&config, &mut prompt).await?;
//! for label in gmail.list_labels("me").await? {
//!     println!("- {}", label.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod authorizer;
pub mod config;
pub mod error;
pub mod gmail;
pub mod http;
pub mod provider;
pub mod session;
pub mod store;
pub mod token;
pub mod transport;

pub use authorizer::{authorize_interactively, CodePrompt, ConsolePrompt};
pub use config::{
    load_authorization_config, parse_authorization_config, AuthorizationConfig, SessionConfig,
    DEFAULT_TOKEN_FILE, GMAIL_API_BASE, GMAIL_MODIFY_SCOPE, GMAIL_READONLY_SCOPE, GMAIL_SEND_SCOPE,
};
pub use error::{Error, Result};
pub use gmail::{GmailService, Label, Message, MessageRef, OutgoingMessage, TokenOrigin};
pub use http::create_http_client;
pub use provider::{GoogleProvider, OAuthProvider};
pub use session::{build_session, build_session_with};
pub use token::TokenRecord;
pub use transport::AuthorizedClient;
