//! Deployment-time configuration read from environment values.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::exchange::{BackendExchange, DirectExchange, TokenExchange};
use crate::http::HttpConfig;
use crate::identity::{BackendResolver, DirectResolver, IdentityResolver};
use crate::{OAuthError, ProviderRegistry, authentik_provider, google_provider};

pub const BACKEND_URL: &str = "BACKEND_URL";
pub const HTTP_TIMEOUT_SECS: &str = "OAUTH_HTTP_TIMEOUT_SECS";
pub const AUTHENTIK_URL: &str = "AUTHENTIK_URL";
pub const AUTHENTIK_CLIENT_ID: &str = "AUTHENTIK_CLIENT_ID";
pub const AUTHENTIK_REDIRECT_URI: &str = "AUTHENTIK_REDIRECT_URI";
pub const GOOGLE_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
pub const GOOGLE_REDIRECT_URI: &str = "GOOGLE_REDIRECT_URI";
pub const GOOGLE_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";

/// Who performs the token exchange. The two modes carry different trust
/// models and are never mixed within one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeMode {
    /// The client talks to the provider itself.
    Direct,
    /// A trusted backend holds the provider secrets and asserts roles.
    Backend { base_url: String },
}

impl ExchangeMode {
    pub fn strategies(
        &self,
        http: Client,
    ) -> (Arc<dyn TokenExchange>, Arc<dyn IdentityResolver>) {
        let exchange: Arc<dyn TokenExchange>;
        let resolver: Arc<dyn IdentityResolver>;
        match self {
            Self::Direct => {
                exchange = Arc::new(DirectExchange::new(http.clone()));
                resolver = Arc::new(DirectResolver::new(http));
            }
            Self::Backend { base_url } => {
                exchange = Arc::new(BackendExchange::new(http.clone(), base_url.as_str()));
                resolver = Arc::new(BackendResolver::new(http, base_url.as_str()));
            }
        }
        (exchange, resolver)
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub providers: ProviderRegistry,
    pub mode: ExchangeMode,
    pub http: HttpConfig,
}

impl DeploymentConfig {
    pub fn from_env() -> Result<Self, OAuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as missing. A provider is only registered when every value it
    /// needs is present.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OAuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mode = match value(BACKEND_URL) {
            Some(base_url) => ExchangeMode::Backend { base_url },
            None => ExchangeMode::Direct,
        };

        let mut http = HttpConfig::default();
        if let Some(raw) = value(HTTP_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                OAuthError::Config(format!(
                    "{HTTP_TIMEOUT_SECS} must be a whole number of seconds, got {raw:?}"
                ))
            })?;
            http = http.with_timeout(Duration::from_secs(secs));
        }

        let mut providers = ProviderRegistry::new();

        match (
            value(AUTHENTIK_URL),
            value(AUTHENTIK_CLIENT_ID),
            value(AUTHENTIK_REDIRECT_URI),
        ) {
            (Some(base_url), Some(client_id), Some(redirect_uri)) => {
                providers.register(authentik_provider(&base_url, client_id, redirect_uri));
            }
            (None, None, None) => debug!("authentik not configured"),
            _ => warn!("authentik configuration incomplete; provider disabled"),
        }

        match (value(GOOGLE_CLIENT_ID), value(GOOGLE_REDIRECT_URI)) {
            (Some(client_id), Some(redirect_uri)) => {
                let provider = google_provider(client_id, redirect_uri);
                match (&mode, value(GOOGLE_CLIENT_SECRET)) {
                    // The backend owns the secret; it must never be loaded client side.
                    (ExchangeMode::Backend { .. }, secret) => {
                        if secret.is_some() {
                            warn!("{GOOGLE_CLIENT_SECRET} is ignored in backend exchange mode");
                        }
                        providers.register(provider);
                    }
                    (ExchangeMode::Direct, Some(secret)) => {
                        warn!("google client secret loaded for direct exchange");
                        providers.register(provider.with_client_secret(secret));
                    }
                    (ExchangeMode::Direct, None) => {
                        warn!("{GOOGLE_CLIENT_SECRET} missing for direct exchange; google disabled");
                    }
                }
            }
            (None, None) => debug!("google not configured"),
            _ => warn!("google configuration incomplete; provider disabled"),
        }

        if providers.is_empty() {
            return Err(OAuthError::Config(
                "no identity provider is fully configured".to_string(),
            ));
        }

        Ok(Self {
            providers,
            mode,
            http,
        })
    }
}
