use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::OAuthError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport settings shared by every request the login flow makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl HttpConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build_client(&self) -> Result<Client, OAuthError> {
        Ok(Client::builder().timeout(self.timeout).build()?)
    }
}

/// Pulls a human readable message out of an OAuth or backend error payload.
///
/// Looks at `detail` (backend), then `error_description` and `error` (RFC 6749).
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "error_description", "error"]
        .iter()
        .find_map(|key| {
            value
                .get(*key)
                .and_then(Value::as_str)
                .filter(|message| !message.is_empty())
        })
        .map(str::to_string)
}
