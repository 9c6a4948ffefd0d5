//! OAuth 2.0 authorization code + PKCE login flow.
//!
//! [`LoginOrchestrator`] drives a login from `start` (fresh verifier, challenge
//! and state, browser sent to the provider) to `handle_callback` (state
//! validated, code exchanged, identity resolved) and produces a [`LoginInfo`]
//! for the [`SessionStore`]. Token exchange runs either directly against the
//! provider or through a trusted backend that keeps the provider secrets.

mod config;
mod error;
mod exchange;
mod http;
mod identity;
#[cfg(feature = "local-server")]
mod local_server;
mod login;
pub mod pkce;
mod providers;
mod session;
mod transaction;
mod types;

pub use config::{DeploymentConfig, ExchangeMode};
pub use error::OAuthError;
pub use exchange::{BackendExchange, DirectExchange, TokenExchange};
pub use http::HttpConfig;
pub use identity::{BackendResolver, DirectResolver, IdentityResolver};
#[cfg(feature = "local-server")]
pub use local_server::LocalServer;
pub use login::{Clock, LoginOrchestrator, LoginPhase, Navigator, SystemClock};
pub use pkce::PkcePair;
pub use providers::{
    ProviderConfig, ProviderEndpoints, ProviderFlags, ProviderRegistry, authentik_provider,
    google_provider,
};
pub use session::{DurableStorage, FileStorage, MemoryStorage, SESSION_KEY, SessionStore};
pub use transaction::{EphemeralStore, MemoryStore, PkceTransaction};
pub use types::{AuthorizationRequest, CallbackParams, LoginInfo, OAuthTokens, Role, UserInfo};
