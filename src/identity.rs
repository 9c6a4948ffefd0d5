use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::deserialize_role;
use crate::{OAuthError, ProviderConfig, Role, UserInfo};

/// Turns an access token into the identity it belongs to.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> Result<UserInfo, OAuthError>;

    /// The server-asserted authorization role. Only a trusted backend can
    /// assert one, so the default is always "no role".
    async fn verify_role(&self, _access_token: &str) -> Option<Role> {
        None
    }
}

/// Reads claims straight from the provider's userinfo endpoint.
#[derive(Debug, Clone)]
pub struct DirectResolver {
    http: Client,
}

impl DirectResolver {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IdentityResolver for DirectResolver {
    async fn resolve(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> Result<UserInfo, OAuthError> {
        debug!(provider = %provider.name, "fetching provider userinfo");
        let response = self
            .http
            .get(&provider.user_info_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(provider = %provider.name, status = status.as_u16(), "userinfo request failed");
            return Err(OAuthError::UserInfoFetchFailed {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|err| OAuthError::InvalidResponse {
            message: err.to_string(),
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default, deserialize_with = "deserialize_role")]
    role: Option<Role>,
}

/// Asks the backend "who am I" for the normalized identity and the role it
/// grants.
///
/// The role seen by `resolve` is kept for the same access token, so a login
/// that resolves and then verifies makes a single `/me` request.
#[derive(Debug)]
pub struct BackendResolver {
    http: Client,
    base_url: String,
    resolved_role: Mutex<Option<(String, Option<Role>)>>,
}

impl BackendResolver {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            resolved_role: Mutex::new(None),
        }
    }

    pub fn me_url(&self) -> String {
        format!("{}/api/login/me", self.base_url)
    }

    async fn fetch_me(&self, access_token: &str) -> Result<MeResponse, OAuthError> {
        let response = self
            .http
            .get(self.me_url())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OAuthError::UserInfoFetchFailed {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|err| OAuthError::InvalidResponse {
            message: err.to_string(),
            body,
        })
    }
}

#[async_trait]
impl IdentityResolver for BackendResolver {
    async fn resolve(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> Result<UserInfo, OAuthError> {
        debug!(provider = %provider.name, "fetching identity from backend");
        let me = self.fetch_me(access_token).await?;
        if let Ok(mut resolved) = self.resolved_role.lock() {
            *resolved = Some((access_token.to_string(), me.role));
        }

        let sub = me.sub.or_else(|| me.email.clone()).ok_or_else(|| {
            OAuthError::InvalidResponse {
                message: "backend identity has neither sub nor email".to_string(),
                body: String::new(),
            }
        })?;

        Ok(UserInfo {
            sub,
            email: me.email,
            name: me.name,
            preferred_username: None,
            picture: me.picture,
        })
    }

    async fn verify_role(&self, access_token: &str) -> Option<Role> {
        let resolved = self
            .resolved_role
            .lock()
            .ok()
            .and_then(|mut resolved| resolved.take())
            .filter(|(token, _)| token == access_token);
        if let Some((_, role)) = resolved {
            return role;
        }

        match self.fetch_me(access_token).await {
            Ok(me) => me.role,
            Err(err) => {
                debug!(error = %err, "backend did not verify a role");
                None
            }
        }
    }
}
