//! Interactive Authorizer
//!
//! Human-in-the-loop consent: print the consent URL, read back the code the
//! provider shows after approval, and exchange it. A failed attempt is
//! returned to the caller as-is.

use reqwest::Url;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::provider::google::{generate_code_challenge, generate_code_verifier};
use crate::provider::OAuthProvider;
use crate::token::TokenRecord;

/// Where the consent URL is shown and the authorization code read back.
#[allow(async_fn_in_trait)]
pub trait CodePrompt {
    /// Present `consent_url` and return the raw line the user entered.
    async fn prompt_for_code(&mut self, consent_url: &str) -> Result<String>;
}

/// Text console prompt over any async reader/writer pair.
pub struct ConsolePrompt<R, W> {
    reader: R,
    writer: W,
    open_browser: bool,
}

impl ConsolePrompt<tokio::io::BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Prompt on the process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> ConsolePrompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            open_browser: false,
        }
    }

    /// Also try to open the consent URL in the default browser.
    #[must_use]
    pub fn open_browser(mut self, enabled: bool) -> Self {
        self.open_browser = enabled;
        self
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R, W> CodePrompt for ConsolePrompt<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn prompt_for_code(&mut self, consent_url: &str) -> Result<String> {
        let io_err = |e: std::io::Error| Error::UserInput(e.to_string());

        let banner = format!(
            "Go to the following link in your browser then type the authorization code: \n{}\n",
            consent_url
        );
        self.writer.write_all(banner.as_bytes()).await.map_err(io_err)?;

        if self.open_browser {
            if let Err(e) = open::that(consent_url) {
                warn!("Failed to open browser automatically: {}", e);
            }
        }

        self.writer.write_all(b"Enter code> ").await.map_err(io_err)?;
        self.writer.flush().await.map_err(io_err)?;

        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.map_err(io_err)?;
        if n == 0 {
            return Err(Error::UserInput("input stream closed".to_string()));
        }
        Ok(line)
    }
}

/// Run the consent flow once and exchange the resulting code.
pub async fn authorize_interactively<P, C>(provider: &P, prompt: &mut C) -> Result<TokenRecord>
where
    P: OAuthProvider,
    C: CodePrompt,
{
    let state = generate_state();
    let code_verifier = generate_code_verifier();
    let code_challenge = generate_code_challenge(&code_verifier);
    let consent_url = provider.authorize_url(&state, &code_challenge);

    info!("Requesting user consent via {}", provider.name());
    let input = prompt.prompt_for_code(&consent_url).await?;
    let code = extract_code(input.trim(), &state)?;

    let token = provider.exchange_code(&code, &code_verifier).await?;
    info!("Authorization code exchanged for an access token");
    Ok(token)
}

/// Accept either the bare code or the whole redirected URL.
fn extract_code(input: &str, expected_state: &str) -> Result<String> {
    if input.is_empty() {
        return Err(Error::UserInput("empty authorization code".to_string()));
    }

    if !(input.starts_with("http://") || input.starts_with("https://")) {
        return Ok(input.to_string());
    }

    let url = Url::parse(input).map_err(|e| Error::UserInput(format!("invalid redirect URL: {}", e)))?;
    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" if value != expected_state => {
                return Err(Error::UserInput("state mismatch in redirect URL".to_string()));
            }
            "error" => {
                return Err(Error::UserInput(format!("consent was not granted: {}", value)));
            }
            _ => {}
        }
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| Error::UserInput("no code parameter in redirect URL".to_string()))
}

/// Generate a random state string for CSRF protection
fn generate_state() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::rngs::OsRng.gen();
    hex::encode(bytes)
}
