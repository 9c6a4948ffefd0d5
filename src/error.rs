use thiserror::Error;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("os rng error: {message}")]
    OsRng { message: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid redirect uri: {0}")]
    InvalidRedirectUri(String),

    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("missing authorization code in callback url")]
    MissingAuthorizationCode,

    #[error("authorization denied by provider: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("invalid oauth state for provider {provider}")]
    InvalidState { provider: String },

    #[error("token exchange failed ({status}): {message}")]
    ExchangeFailed { status: u16, message: String },

    #[error("failed to fetch user info ({status}): {body}")]
    UserInfoFetchFailed { status: u16, body: String },

    #[error("session for provider {provider} carries no authorized role")]
    RoleUnauthorized { provider: String },

    #[cfg(feature = "local-server")]
    #[error("local server timed out after {timeout:?}")]
    LocalServerTimeout { timeout: std::time::Duration },
}

impl OAuthError {
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}
