use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use gmail_helper::{
    build_session, create_http_client, load_authorization_config, store, ConsolePrompt,
    GmailService, GoogleProvider, OAuthProvider, SessionConfig, TokenOrigin, DEFAULT_TOKEN_FILE,
    GMAIL_API_BASE, GMAIL_READONLY_SCOPE,
};

#[derive(Parser, Debug)]
#[command(name = "gmail-helper", about = "Authorize against Gmail and inspect the mailbox")]
struct Args {
    /// Client secret JSON downloaded from the Google Cloud console
    #[arg(long, env = "GMAIL_HELPER_CREDENTIALS", default_value = "client_secret.json")]
    credentials: PathBuf,

    /// OAuth scope to request (repeatable)
    #[arg(long = "scope", env = "GMAIL_HELPER_SCOPES", value_delimiter = ',', default_value = GMAIL_READONLY_SCOPE)]
    scopes: Vec<String>,

    /// Token cache directory (default: ~/.credentials)
    #[arg(long, env = "GMAIL_HELPER_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[arg(long, env = "GMAIL_HELPER_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    token_file: String,

    #[arg(long, env = "GMAIL_HELPER_API_BASE_URL", default_value = GMAIL_API_BASE)]
    api_base_url: String,

    #[arg(long, env = "GMAIL_HELPER_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Try to open the consent page in the default browser
    #[arg(long, env = "GMAIL_HELPER_OPEN_BROWSER")]
    open_browser: bool,

    /// Mailbox to inspect
    #[arg(long, env = "GMAIL_HELPER_USER", default_value = "me")]
    user: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the mailbox labels (default)
    Labels,
    /// List message ids, optionally filtered by a Gmail search query
    Messages {
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = 10)]
        max: usize,
    },
    /// Show where the session token came from and when it expires
    Token,
    /// Revoke the cached token and delete the cache file
    Revoke,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(&self.credentials, GMAIL_READONLY_SCOPE)
            .with_token_file(&self.token_file)
            .with_api_base_url(&self.api_base_url)
            .with_http_timeout(Duration::from_secs(self.timeout_secs));
        config.scopes = self.scopes.clone();
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.session_config();

    match args.command.unwrap_or(Command::Labels) {
        Command::Revoke => revoke(&config).await?,
        Command::Labels => {
            let gmail = open_session(&config, args.open_browser).await?;
            let labels = gmail
                .list_labels(&args.user)
                .await
                .context("Unable to retrieve labels")?;
            if labels.is_empty() {
                println!("No labels found.");
            } else {
                println!("Labels:");
                for label in labels {
                    println!("- {}", label.name);
                }
            }
        }
        Command::Messages { query, max } => {
            let gmail = open_session(&config, args.open_browser).await?;
            let messages = gmail
                .list_messages(&args.user, query.as_deref(), &[], Some(max))
                .await
                .context("Unable to retrieve messages")?;
            for message in messages {
                println!("{}\t{}", message.id, message.thread_id);
            }
        }
        Command::Token => {
            let gmail = open_session(&config, args.open_browser).await?;
            let token = gmail.client().token().await;
            let expiry = token
                .expiry
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            let status = serde_json::json!({
                "origin": format!("{:?}", gmail.token_origin()).to_lowercase(),
                "token_type": token.token_type,
                "expiry": expiry,
                "refreshable": token.can_refresh(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

async fn open_session(config: &SessionConfig, open_browser: bool) -> anyhow::Result<GmailService> {
    let mut prompt = ConsolePrompt::stdio().open_browser(open_browser);
    let gmail = build_session(config, &mut prompt)
        .await
        .context("Unable to retrieve gmail service")?;
    if let Some(notice) = saved_credential_notice(&gmail) {
        eprintln!("{}", notice);
    }
    Ok(gmail)
}

/// Where a freshly authorized token was written, shown regardless of log level.
fn saved_credential_notice<P: OAuthProvider>(gmail: &GmailService<P>) -> Option<String> {
    if gmail.token_origin() != TokenOrigin::Interactive {
        return None;
    }
    let path = gmail.client().cache_path()?;
    path.exists().then(|| format!("Saving credential file to: {}", path.display()))
}

async fn revoke(config: &SessionConfig) -> anyhow::Result<()> {
    let cache_path = store::resolve_cache_path(config.cache_dir.as_deref(), &config.token_file)?;
    let token = match store::load(&cache_path) {
        Ok(token) => token,
        Err(e) => {
            println!("Nothing to revoke: {}", e);
            return Ok(());
        }
    };

    let auth = load_authorization_config(&config.credentials_path, &config.scopes)?;
    let provider = GoogleProvider::new(auth, create_http_client(config.http_timeout)?);

    let secret = token.refresh_token.as_deref().unwrap_or(token.access_token.as_str());
    if let Err(e) = provider.revoke_token(secret).await {
        warn!("Provider-side revocation failed (continuing): {}", e);
    }

    store::remove(&cache_path)?;
    println!("Removed {}", cache_path.display());
    Ok(())
}
