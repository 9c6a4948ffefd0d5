use super::{ProviderConfig, ProviderEndpoints, ProviderFlags};

const NAME: &str = "google";

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USER_INFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// Google as a consumer IdP. Google only hands out refresh tokens after an
/// explicit offline consent, and its token endpoint wants the client secret
/// even for PKCE clients.
pub fn google_provider(
    client_id: impl Into<String>,
    redirect_uri: impl Into<String>,
) -> ProviderConfig {
    let endpoints = ProviderEndpoints {
        authorize_url: AUTHORIZE_URL.to_string(),
        token_url: TOKEN_URL.to_string(),
        user_info_url: USER_INFO_URL.to_string(),
    };
    ProviderConfig::new(NAME, endpoints, client_id, redirect_uri).with_flags(ProviderFlags {
        offline_access_prompt: true,
        requires_client_secret: true,
    })
}
