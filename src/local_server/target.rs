use url::Url;

use crate::OAuthError;

/// The loopback address a redirect URI points at.
#[derive(Debug, Clone)]
pub(super) struct RedirectTarget {
    pub(super) host: String,
    pub(super) port: u16,
    pub(super) path: String,
    redirect_uri: Url,
}

impl RedirectTarget {
    pub(super) fn parse(redirect_uri: &str) -> Result<Self, OAuthError> {
        let url = Url::parse(redirect_uri)?;
        if url.scheme() != "http" {
            return Err(OAuthError::InvalidRedirectUri(
                "loopback redirect uri must use http scheme".to_string(),
            ));
        }

        let host = url.host_str().ok_or_else(|| {
            OAuthError::InvalidRedirectUri("redirect uri is missing host".to_string())
        })?;

        let port = url.port_or_known_default().ok_or_else(|| {
            OAuthError::InvalidRedirectUri("redirect uri is missing port".to_string())
        })?;

        Ok(Self {
            host: host.to_string(),
            port,
            path: url.path().to_string(),
            redirect_uri: url,
        })
    }

    /// The redirect URI with the query the browser arrived with.
    pub(super) fn callback_url(&self, query: Option<&str>) -> String {
        let mut url = self.redirect_uri.clone();
        url.set_query(query.filter(|query| !query.is_empty()));
        url.to_string()
    }
}
