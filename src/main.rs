use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pkce_login::{
    Clock, DeploymentConfig, FileStorage, LocalServer, LoginInfo, LoginOrchestrator, MemoryStore,
    Navigator, OAuthError, SessionStore, SystemClock,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pkce-login",
    about = "Sign in to an identity provider with OAuth 2.0 + PKCE and keep the session on disk."
)]
struct Cli {
    /// Directory holding the persisted session.
    #[arg(long, env = "PKCE_LOGIN_STATE_DIR", default_value = ".pkce-login")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open the provider's sign-in page and wait for the redirect.
    Login {
        #[arg(long)]
        provider: String,
        /// Seconds to wait for the browser to come back.
        #[arg(long, default_value_t = 300)]
        wait_secs: u64,
    },
    /// Show the stored session.
    Status,
    /// Forget the stored session.
    Logout,
}

struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &str) -> Result<(), OAuthError> {
        eprintln!("Authorization URL:\n{url}");
        if let Err(err) = webbrowser::open(url) {
            warn!(error = %err, "failed to open browser automatically");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), OAuthError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let sessions = SessionStore::open(Arc::new(FileStorage::new(cli.state_dir.clone()))).await?;

    match cli.command {
        Command::Login {
            provider,
            wait_secs,
        } => login(&sessions, &provider, Duration::from_secs(wait_secs)).await,
        Command::Status => status(&sessions),
        Command::Logout => {
            sessions.logout().await?;
            eprintln!("Signed out.");
            Ok(())
        }
    }
}

async fn login(sessions: &SessionStore, provider: &str, wait: Duration) -> Result<(), OAuthError> {
    let config = DeploymentConfig::from_env()?;
    let redirect_uri = config
        .providers
        .get(provider)
        .map(|p| p.redirect_uri.clone())
        .ok_or_else(|| OAuthError::UnknownProvider(provider.to_string()))?;

    let server = LocalServer::new(&redirect_uri)?.with_timeout(wait);
    let listener = server.bind().await?;

    let orchestrator = LoginOrchestrator::from_deployment(
        &config,
        Arc::new(MemoryStore::new()),
        Arc::new(BrowserNavigator),
    )?;
    orchestrator.start(provider)?;

    let redirect_url = server.wait_for_redirect(listener).await?;
    let info = orchestrator.handle_redirect(provider, &redirect_url).await?;
    sessions.sign_in(info.clone()).await?;

    print_session(&info)?;
    if info.role.is_none() {
        eprintln!("Signed in, but no authorized role was asserted for this account.");
    }
    Ok(())
}

fn status(sessions: &SessionStore) -> Result<(), OAuthError> {
    let Some(info) = sessions.current() else {
        eprintln!("No active session.");
        return Ok(());
    };

    let now = SystemClock.now();
    let expiry = match (info.is_expired_at(now), info.expires_at) {
        (Some(true), _) => "expired".to_string(),
        (Some(false), Some(expires_at)) => format!("expires in {}s", expires_at - now),
        _ => "unknown expiry".to_string(),
    };
    let role = info.role.map_or("none", |role| role.as_str());
    eprintln!("{}: role {role}, {expiry}", info.provider);
    print_session(&info)
}

fn print_session(info: &LoginInfo) -> Result<(), OAuthError> {
    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}
