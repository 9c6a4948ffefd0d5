use secrecy::{ExposeSecret, SecretString};

pub(crate) const DEFAULT_SCOPE: &str = "openid profile email";

/// Provider quirks the flow honours without branching on provider names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderFlags {
    /// Ask for offline access (`access_type=offline&prompt=consent`) so the
    /// provider issues a refresh token.
    pub offline_access_prompt: bool,
    /// The token endpoint rejects public clients; direct exchange must send
    /// `client_secret`.
    pub requires_client_secret: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub user_info_url: String,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub authorize_url: String,
    pub token_url: String,
    pub user_info_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub client_secret: Option<SecretString>,
    pub flags: ProviderFlags,
    pub authorize_params: Vec<(String, String)>,
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        endpoints: ProviderEndpoints,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let ProviderEndpoints {
            authorize_url,
            token_url,
            user_info_url,
        } = endpoints;
        Self {
            name: name.into(),
            authorize_url,
            token_url,
            user_info_url,
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: DEFAULT_SCOPE.to_string(),
            client_secret: None,
            flags: ProviderFlags::default(),
            authorize_params: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_flags(mut self, flags: ProviderFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    pub fn with_authorize_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.authorize_params.push((key.into(), value.into()));
        self
    }

    /// Provider specific authorization parameters, appended after the fixed
    /// PKCE parameters.
    pub fn extra_authorize_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if self.flags.offline_access_prompt {
            params.push(("access_type".to_string(), "offline".to_string()));
            params.push(("prompt".to_string(), "consent".to_string()));
        }
        params.extend(self.authorize_params.iter().cloned());
        params
    }

    /// The secret to attach to a direct token request, if the provider needs one.
    pub(crate) fn exchange_secret(&self) -> Option<&str> {
        if !self.flags.requires_client_secret {
            return None;
        }
        self.client_secret
            .as_ref()
            .map(|secret| secret.expose_secret().as_str())
    }
}
