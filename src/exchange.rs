//! Authorization code for token exchange.
//!
//! Two strategies share one contract: [`DirectExchange`] talks to the
//! provider's token endpoint itself, [`BackendExchange`] hands the code to a
//! trusted backend that holds the provider secret. A deployment picks one;
//! they are never combined.

use async_trait::async_trait;
use reqwest::{Client, Response, header::ACCEPT};
use serde::Serialize;
use tracing::{debug, warn};

use crate::http::error_message;
use crate::{OAuthError, OAuthTokens, ProviderConfig};

const BACKEND_FALLBACK_MESSAGE: &str = "Token exchange failed";

#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchanges `code` for tokens. The provider supplies the client id and
    /// redirect URI that were used in the authorization request.
    async fn exchange(
        &self,
        provider: &ProviderConfig,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthTokens, OAuthError>;
}

#[derive(Debug, Clone)]
pub struct DirectExchange {
    http: Client,
}

impl DirectExchange {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TokenExchange for DirectExchange {
    async fn exchange(
        &self,
        provider: &ProviderConfig,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthTokens, OAuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", provider.client_id.as_str()),
            ("redirect_uri", provider.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];

        if provider.flags.requires_client_secret {
            let secret = provider.exchange_secret().ok_or_else(|| {
                OAuthError::Config(format!(
                    "provider {} requires a client secret for direct exchange",
                    provider.name
                ))
            })?;
            form.push(("client_secret", secret));
        }

        debug!(provider = %provider.name, url = %provider.token_url, "exchanging code with provider");
        let response = self
            .http
            .post(&provider.token_url)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        read_token_response(response, None).await
    }
}

#[derive(Debug, Serialize)]
struct BackendTokenRequest<'a> {
    code: &'a str,
    redirect_uri: &'a str,
    code_verifier: &'a str,
}

#[derive(Debug, Clone)]
pub struct BackendExchange {
    http: Client,
    base_url: String,
}

impl BackendExchange {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn token_url(&self, provider: &str) -> String {
        format!("{}/api/login/{provider}/token", self.base_url)
    }
}

#[async_trait]
impl TokenExchange for BackendExchange {
    async fn exchange(
        &self,
        provider: &ProviderConfig,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthTokens, OAuthError> {
        let url = self.token_url(&provider.name);
        let payload = BackendTokenRequest {
            code,
            redirect_uri: &provider.redirect_uri,
            code_verifier,
        };

        debug!(provider = %provider.name, %url, "exchanging code via backend");
        let response = self.http.post(&url).json(&payload).send().await?;

        read_token_response(response, Some(BACKEND_FALLBACK_MESSAGE)).await
    }
}

async fn read_token_response(
    response: Response,
    fallback: Option<&str>,
) -> Result<OAuthTokens, OAuthError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = match (error_message(&body), fallback) {
            (Some(message), _) => message,
            (None, Some(fallback)) => fallback.to_string(),
            (None, None) => body,
        };
        warn!(status = status.as_u16(), %message, "token exchange rejected");
        return Err(OAuthError::ExchangeFailed {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|err| OAuthError::InvalidResponse {
        message: err.to_string(),
        body,
    })
}
