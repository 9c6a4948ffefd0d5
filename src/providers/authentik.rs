use super::{ProviderConfig, ProviderEndpoints};

const NAME: &str = "authentik";

const AUTHORIZE_PATH: &str = "/application/o/authorize/";
const TOKEN_PATH: &str = "/application/o/token/";
const USER_INFO_PATH: &str = "/application/o/userinfo/";

/// Authentik OpenID-Connect provider rooted at `base_url`.
pub fn authentik_provider(
    base_url: &str,
    client_id: impl Into<String>,
    redirect_uri: impl Into<String>,
) -> ProviderConfig {
    let base = base_url.trim_end_matches('/');
    let endpoints = ProviderEndpoints {
        authorize_url: format!("{base}{AUTHORIZE_PATH}"),
        token_url: format!("{base}{TOKEN_PATH}"),
        user_info_url: format!("{base}{USER_INFO_PATH}"),
    };
    ProviderConfig::new(NAME, endpoints, client_id, redirect_uri)
}
