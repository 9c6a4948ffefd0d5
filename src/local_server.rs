//! Loopback receiver for the provider redirect, for native programs that
//! cannot be navigated to like a browser tab.

mod http;
mod target;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::OAuthError;

use self::http::{CallbackState, callback_handler, fallback_handler};
use self::target::RedirectTarget;

#[derive(Debug, Clone)]
pub struct LocalServer {
    target: RedirectTarget,
    timeout: Option<Duration>,
}

impl LocalServer {
    pub fn new(redirect_uri: &str) -> Result<Self, OAuthError> {
        Ok(Self {
            target: RedirectTarget::parse(redirect_uri)?,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Binds before the browser is sent away so the redirect cannot race us.
    pub async fn bind(&self) -> Result<TcpListener, OAuthError> {
        let listener =
            TcpListener::bind((self.target.host.as_str(), self.target.port)).await?;
        debug!(addr = ?listener.local_addr().ok(), path = %self.target.path, "listening for oauth redirect");
        Ok(listener)
    }

    /// Serves the redirect path until the provider calls back, then returns the
    /// full redirect URL.
    pub async fn wait_for_redirect(&self, listener: TcpListener) -> Result<String, OAuthError> {
        let (redirect_tx, redirect_rx) = oneshot::channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState {
            target: self.target.clone(),
            redirect_tx: Arc::new(Mutex::new(Some(redirect_tx))),
        };

        let app = Router::new()
            .route(&self.target.path, get(callback_handler))
            .fallback(fallback_handler)
            .with_state(state);

        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                warn!(error = %err, "redirect listener stopped");
            }
        });

        let closed = || OAuthError::InvalidResponse {
            message: "redirect listener closed before a callback arrived".to_string(),
            body: String::new(),
        };
        let result = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, redirect_rx).await {
                Ok(received) => received.map_err(|_| closed()),
                Err(_) => Err(OAuthError::LocalServerTimeout { timeout }),
            },
            None => redirect_rx.await.map_err(|_| closed()),
        };

        let _ = shutdown_tx.send(());
        let _ = server.await;
        result
    }
}
