use std::sync::{Arc, Mutex};

use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use tokio::sync::oneshot;
use tracing::debug;

use crate::{CallbackParams, OAuthError};

use super::target::RedirectTarget;

const SUCCESS_HTML: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8" /><title>Signed in</title></head>
  <body>
    <p>Sign-in received. You may close this window.</p>
  </body>
</html>
"#;

const ERROR_HTML: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8" /><title>Sign-in error</title></head>
  <body>
    <p>Sign-in failed. You may close this window and try again.</p>
  </body>
</html>
"#;

pub(super) type RedirectSender = Arc<Mutex<Option<oneshot::Sender<String>>>>;

#[derive(Clone)]
pub(super) struct CallbackState {
    pub(super) target: RedirectTarget,
    pub(super) redirect_tx: RedirectSender,
}

/// Hands the first redirect over; later ones are dropped.
fn deliver(redirect_tx: &RedirectSender, callback_url: String) {
    if let Ok(mut guard) = redirect_tx.lock() {
        if let Some(sender) = guard.take() {
            let _ = sender.send(callback_url);
        }
    }
}

pub(super) async fn callback_handler(
    State(state): State<CallbackState>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let callback_url = state.target.callback_url(query.as_deref());

    match CallbackParams::from_url(&callback_url) {
        Ok(_) => {
            deliver(&state.redirect_tx, callback_url);
            (StatusCode::OK, Html(SUCCESS_HTML))
        }
        // Stray hits on the callback path (prefetch, reloads) keep the server waiting.
        Err(OAuthError::MissingAuthorizationCode) => {
            debug!("ignoring callback request without code");
            (StatusCode::BAD_REQUEST, Html(ERROR_HTML))
        }
        // Provider errors still go to the login flow so it can consume the attempt.
        Err(_) => {
            deliver(&state.redirect_tx, callback_url);
            (StatusCode::OK, Html(ERROR_HTML))
        }
    }
}

pub(super) async fn fallback_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(ERROR_HTML))
}
