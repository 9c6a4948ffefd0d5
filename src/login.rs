//! The login state machine.
//!
//! ```text
//! Idle ─start─▶ AwaitingRedirect ─callback─▶ CallbackReceived ─┬▶ Rejected
//!                                                              └▶ Validated ─▶ Exchanging ─┬▶ SessionReady
//!                                                                                          └▶ Failed
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::DeploymentConfig;
use crate::pkce::{CODE_CHALLENGE_METHOD, PkcePair, STATE_LENGTH, generate_random_string};
use crate::transaction::{EphemeralStore, PkceTransaction};
use crate::{
    AuthorizationRequest, CallbackParams, IdentityResolver, LoginInfo, OAuthError,
    ProviderConfig, ProviderRegistry, TokenExchange,
};

const RESERVED_AUTHORIZE_PARAMS: &[&str] = &[
    "response_type",
    "client_id",
    "redirect_uri",
    "scope",
    "state",
    "code_challenge",
    "code_challenge_method",
];

/// Sends the user agent to the provider's authorization page.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str) -> Result<(), OAuthError>;
}

/// Source of the current time in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginPhase {
    #[default]
    Idle,
    AwaitingRedirect,
    CallbackReceived,
    Validated,
    Rejected,
    Exchanging,
    SessionReady,
    Failed,
}

pub struct LoginOrchestrator {
    registry: Arc<ProviderRegistry>,
    transactions: Arc<dyn EphemeralStore>,
    exchange: Arc<dyn TokenExchange>,
    resolver: Arc<dyn IdentityResolver>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    phases: Mutex<HashMap<String, LoginPhase>>,
}

impl LoginOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        transactions: Arc<dyn EphemeralStore>,
        exchange: Arc<dyn TokenExchange>,
        resolver: Arc<dyn IdentityResolver>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            registry,
            transactions,
            exchange,
            resolver,
            navigator,
            clock: Arc::new(SystemClock),
            phases: Mutex::new(HashMap::new()),
        }
    }

    /// Wires the exchange and identity strategies the deployment selected.
    pub fn from_deployment(
        config: &DeploymentConfig,
        transactions: Arc<dyn EphemeralStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, OAuthError> {
        let http = config.http.build_client()?;
        let (exchange, resolver) = config.mode.strategies(http);
        Ok(Self::new(
            Arc::new(config.providers.clone()),
            transactions,
            exchange,
            resolver,
            navigator,
        ))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn phase(&self, provider: &str) -> LoginPhase {
        self.phases
            .lock()
            .ok()
            .and_then(|phases| phases.get(provider).copied())
            .unwrap_or_default()
    }

    /// Begins a login: stores fresh PKCE secrets for `provider_name` and sends
    /// the browser to the provider. Any earlier unfinished attempt for the same
    /// provider is invalidated.
    pub fn start(&self, provider_name: &str) -> Result<AuthorizationRequest, OAuthError> {
        let provider = self.provider(provider_name)?;

        let pkce = PkcePair::generate()?;
        let state = generate_random_string(STATE_LENGTH)?;
        let transaction = PkceTransaction::new(provider_name, pkce.code_verifier, state);
        transaction.persist(self.transactions.as_ref())?;

        let authorization_url =
            build_authorization_url(provider, &pkce.code_challenge, &transaction.state)?;

        self.set_phase(provider_name, LoginPhase::AwaitingRedirect);
        info!(provider = provider_name, "starting oauth login");
        self.navigator.navigate(&authorization_url)?;

        Ok(AuthorizationRequest {
            provider: provider_name.to_string(),
            authorization_url,
            state: transaction.state,
        })
    }

    /// Validates the redirect for `provider_name` and completes the login.
    ///
    /// The stored transaction is consumed whatever the outcome. A missing
    /// transaction or a state mismatch fails with `InvalidState` before any
    /// token request is made.
    pub async fn handle_callback(
        &self,
        provider_name: &str,
        code: &str,
        state: &str,
    ) -> Result<LoginInfo, OAuthError> {
        let provider = self.provider(provider_name)?;
        self.set_phase(provider_name, LoginPhase::CallbackReceived);

        let transaction = match PkceTransaction::take(self.transactions.as_ref(), provider_name) {
            Ok(Some(transaction)) if transaction.matches_state(state) => transaction,
            Ok(stored) => {
                self.set_phase(provider_name, LoginPhase::Rejected);
                warn!(
                    provider = provider_name,
                    transaction_found = stored.is_some(),
                    "rejecting oauth callback with invalid state"
                );
                return Err(OAuthError::InvalidState {
                    provider: provider_name.to_string(),
                });
            }
            Err(err) => {
                self.set_phase(provider_name, LoginPhase::Rejected);
                return Err(err);
            }
        };
        self.set_phase(provider_name, LoginPhase::Validated);

        self.set_phase(provider_name, LoginPhase::Exchanging);
        match self
            .exchange_and_resolve(provider, code, &transaction.code_verifier)
            .await
        {
            Ok(login) => {
                self.set_phase(provider_name, LoginPhase::SessionReady);
                info!(
                    provider = provider_name,
                    authorized = login.role.is_some(),
                    "oauth login complete"
                );
                Ok(login)
            }
            Err(err) => {
                self.set_phase(provider_name, LoginPhase::Failed);
                warn!(provider = provider_name, error = %err, "oauth login failed");
                Err(err)
            }
        }
    }

    /// Parses the full redirect URL and hands it to [`Self::handle_callback`].
    /// A redirect carrying a provider error still consumes the transaction.
    pub async fn handle_redirect(
        &self,
        provider_name: &str,
        redirect_url: &str,
    ) -> Result<LoginInfo, OAuthError> {
        match CallbackParams::from_url(redirect_url) {
            Ok(params) => {
                let state = params.state.as_deref().unwrap_or_default();
                self.handle_callback(provider_name, &params.code, state).await
            }
            Err(err) => {
                PkceTransaction::take(self.transactions.as_ref(), provider_name)?;
                self.set_phase(provider_name, LoginPhase::Rejected);
                warn!(provider = provider_name, error = %err, "oauth redirect rejected");
                Err(err)
            }
        }
    }

    async fn exchange_and_resolve(
        &self,
        provider: &ProviderConfig,
        code: &str,
        code_verifier: &str,
    ) -> Result<LoginInfo, OAuthError> {
        let mut tokens = self.exchange.exchange(provider, code, code_verifier).await?;

        let user_info = match tokens.userinfo.take() {
            Some(user_info) => user_info,
            None => self.resolver.resolve(provider, &tokens.access_token).await?,
        };
        let role = self.resolver.verify_role(&tokens.access_token).await;
        let expires_at = tokens
            .expires_in
            .map(|expires_in| self.clock.now().saturating_add(expires_in));

        Ok(LoginInfo {
            provider: provider.name.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            id_token: tokens.id_token,
            expires_at,
            user_info: Some(user_info),
            role,
        })
    }

    fn provider(&self, name: &str) -> Result<&ProviderConfig, OAuthError> {
        self.registry.get(name).ok_or_else(|| {
            error!(provider = name, "login requested for unregistered provider");
            OAuthError::UnknownProvider(name.to_string())
        })
    }

    fn set_phase(&self, provider: &str, phase: LoginPhase) {
        debug!(provider, ?phase, "login phase");
        if let Ok(mut phases) = self.phases.lock() {
            phases.insert(provider.to_string(), phase);
        }
    }
}

fn build_authorization_url(
    provider: &ProviderConfig,
    code_challenge: &str,
    state: &str,
) -> Result<String, OAuthError> {
    let mut url = Url::parse(&provider.authorize_url)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("response_type", "code");
        pairs.append_pair("client_id", &provider.client_id);
        pairs.append_pair("redirect_uri", &provider.redirect_uri);
        pairs.append_pair("scope", &provider.scope);
        pairs.append_pair("state", state);
        pairs.append_pair("code_challenge", code_challenge);
        pairs.append_pair("code_challenge_method", CODE_CHALLENGE_METHOD);

        for (key, value) in provider.extra_authorize_params() {
            if RESERVED_AUTHORIZE_PARAMS.contains(&key.as_str()) {
                warn!(provider = %provider.name, param = %key, "ignoring attempt to override pkce parameter");
                continue;
            }
            pairs.append_pair(&key, &value);
        }
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::pkce::{VERIFIER_LENGTH, generate_code_challenge};
    use crate::transaction::MemoryStore;
    use crate::{OAuthTokens, Role, UserInfo, authentik_provider, google_provider};

    const NOW: u64 = 1_700_000_000;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        urls: Mutex<Vec<String>>,
    }

    impl RecordingNavigator {
        fn last(&self) -> Url {
            let urls = self.urls.lock().unwrap();
            Url::parse(urls.last().unwrap()).unwrap()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, url: &str) -> Result<(), OAuthError> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    struct MockExchange {
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, String)>>,
        response: Box<dyn Fn() -> Result<OAuthTokens, OAuthError> + Send + Sync>,
    }

    impl MockExchange {
        fn returning(
            response: impl Fn() -> Result<OAuthTokens, OAuthError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                response: Box::new(response),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchange for MockExchange {
        async fn exchange(
            &self,
            _provider: &ProviderConfig,
            code: &str,
            code_verifier: &str,
        ) -> Result<OAuthTokens, OAuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((code.to_string(), code_verifier.to_string()));
            (self.response)()
        }
    }

    struct MockResolver {
        resolves: AtomicUsize,
        user_info: Option<UserInfo>,
        role: Option<Role>,
    }

    impl MockResolver {
        fn new(user_info: Option<UserInfo>, role: Option<Role>) -> Arc<Self> {
            Arc::new(Self {
                resolves: AtomicUsize::new(0),
                user_info,
                role,
            })
        }
    }

    #[async_trait]
    impl IdentityResolver for MockResolver {
        async fn resolve(
            &self,
            _provider: &ProviderConfig,
            _access_token: &str,
        ) -> Result<UserInfo, OAuthError> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            self.user_info
                .clone()
                .ok_or_else(|| OAuthError::UserInfoFetchFailed {
                    status: 500,
                    body: "boom".to_string(),
                })
        }

        async fn verify_role(&self, _access_token: &str) -> Option<Role> {
            self.role
        }
    }

    fn tokens(access_token: &str, expires_in: Option<u64>) -> OAuthTokens {
        OAuthTokens {
            access_token: access_token.to_string(),
            refresh_token: None,
            id_token: None,
            token_type: None,
            scope: None,
            expires_in,
            userinfo: None,
        }
    }

    fn user(sub: &str, email: &str) -> UserInfo {
        UserInfo {
            sub: sub.to_string(),
            email: Some(email.to_string()),
            name: None,
            preferred_username: None,
            picture: None,
        }
    }

    struct Harness {
        orchestrator: LoginOrchestrator,
        store: Arc<MemoryStore>,
        navigator: Arc<RecordingNavigator>,
    }

    fn harness(exchange: Arc<MockExchange>, resolver: Arc<MockResolver>) -> Harness {
        let registry = ProviderRegistry::new()
            .with_provider(authentik_provider(
                "https://id.example.com",
                "authentik-client",
                "http://localhost:5173/callback",
            ))
            .with_provider(
                google_provider("google-client", "http://localhost:5173/callback")
                    .with_authorize_param("prompt", "none")
                    .with_authorize_param("code_challenge_method", "plain"),
            );
        let store = Arc::new(MemoryStore::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let orchestrator = LoginOrchestrator::new(
            Arc::new(registry),
            store.clone(),
            exchange,
            resolver,
            navigator.clone(),
        )
        .with_clock(Arc::new(FixedClock(NOW)));

        Harness {
            orchestrator,
            store,
            navigator,
        }
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().into_owned().collect()
    }

    fn param(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn start_persists_transaction_and_navigates() {
        let h = harness(
            MockExchange::returning(|| Ok(tokens("tok", None))),
            MockResolver::new(None, None),
        );

        let request = h.orchestrator.start("authentik").unwrap();
        let url = h.navigator.last();

        assert_eq!(request.authorization_url, url.to_string());
        assert_eq!(
            url.as_str().split('?').next(),
            Some("https://id.example.com/application/o/authorize/")
        );

        let verifier = h.store.get("pkce_authentik").unwrap().unwrap();
        let state = h.store.get("state_authentik").unwrap().unwrap();
        assert_eq!(verifier.len(), VERIFIER_LENGTH);
        assert_eq!(state.len(), STATE_LENGTH);
        assert_eq!(request.state, state);

        assert_eq!(
            query(&url),
            vec![
                ("response_type".to_string(), "code".to_string()),
                ("client_id".to_string(), "authentik-client".to_string()),
                (
                    "redirect_uri".to_string(),
                    "http://localhost:5173/callback".to_string()
                ),
                ("scope".to_string(), "openid profile email".to_string()),
                ("state".to_string(), state),
                ("code_challenge".to_string(), generate_code_challenge(&verifier)),
                ("code_challenge_method".to_string(), "S256".to_string()),
            ]
        );
        assert_eq!(h.orchestrator.phase("authentik"), LoginPhase::AwaitingRedirect);
        assert_eq!(h.orchestrator.phase("google"), LoginPhase::Idle);
    }

    #[test]
    fn start_appends_provider_extras_without_overriding_pkce() {
        let h = harness(
            MockExchange::returning(|| Ok(tokens("tok", None))),
            MockResolver::new(None, None),
        );

        h.orchestrator.start("google").unwrap();
        let url = h.navigator.last();

        assert_eq!(param(&url, "access_type").as_deref(), Some("offline"));
        let methods: Vec<_> = url
            .query_pairs()
            .filter(|(k, _)| k == "code_challenge_method")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(methods, ["S256"]);
        let prompts: Vec<_> = url
            .query_pairs()
            .filter(|(k, _)| k == "prompt")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(prompts, ["consent", "none"]);
    }

    #[test]
    fn start_rejects_unknown_provider() {
        let h = harness(
            MockExchange::returning(|| Ok(tokens("tok", None))),
            MockResolver::new(None, None),
        );
        let result = h.orchestrator.start("microsoft");
        assert!(matches!(result, Err(OAuthError::UnknownProvider(name)) if name == "microsoft"));
        assert!(h.navigator.urls.lock().unwrap().is_empty());
    }

    struct UnavailableBrowser;

    impl Navigator for UnavailableBrowser {
        fn navigate(&self, _url: &str) -> Result<(), OAuthError> {
            Err(OAuthError::Io(std::io::Error::other("no browser")))
        }
    }

    #[test]
    fn start_surfaces_navigator_failure() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = LoginOrchestrator::new(
            Arc::new(ProviderRegistry::new().with_provider(authentik_provider(
                "https://id.example.com",
                "authentik-client",
                "http://localhost:5173/callback",
            ))),
            store.clone(),
            MockExchange::returning(|| Ok(tokens("tok", None))),
            MockResolver::new(None, None),
            Arc::new(UnavailableBrowser),
        );

        let result = orchestrator.start("authentik");
        assert!(matches!(result, Err(OAuthError::Io(err)) if err.to_string() == "no browser"));
        // The attempt stays valid for a manually opened URL.
        assert!(store.get("pkce_authentik").unwrap().is_some());
        assert_eq!(orchestrator.phase("authentik"), LoginPhase::AwaitingRedirect);
    }

    #[tokio::test]
    async fn successful_callback_builds_session() {
        let exchange = MockExchange::returning(|| Ok(tokens("tok", Some(3600))));
        let resolver = MockResolver::new(Some(user("u1", "a@b.com")), None);
        let h = harness(exchange.clone(), resolver.clone());

        let request = h.orchestrator.start("authentik").unwrap();
        let verifier = h.store.get("pkce_authentik").unwrap().unwrap();

        let login = h
            .orchestrator
            .handle_callback("authentik", "abc123", &request.state)
            .await
            .unwrap();

        assert_eq!(
            login,
            LoginInfo {
                provider: "authentik".to_string(),
                access_token: "tok".to_string(),
                refresh_token: None,
                id_token: None,
                expires_at: Some(NOW + 3600),
                user_info: Some(user("u1", "a@b.com")),
                role: None,
            }
        );
        assert_eq!(exchange.calls(), 1);
        assert_eq!(
            exchange.seen.lock().unwrap()[0],
            ("abc123".to_string(), verifier)
        );
        assert_eq!(h.orchestrator.phase("authentik"), LoginPhase::SessionReady);
        assert_eq!(h.store.get("pkce_authentik").unwrap(), None);
        assert_eq!(h.store.get("state_authentik").unwrap(), None);
    }

    #[tokio::test]
    async fn missing_expires_in_leaves_expiry_unknown() {
        let h = harness(
            MockExchange::returning(|| Ok(tokens("tok", None))),
            MockResolver::new(Some(user("u1", "a@b.com")), None),
        );
        let request = h.orchestrator.start("authentik").unwrap();
        let login = h
            .orchestrator
            .handle_callback("authentik", "abc123", &request.state)
            .await
            .unwrap();
        assert_eq!(login.expires_at, None);
    }

    #[tokio::test]
    async fn mismatched_state_never_reaches_exchange() {
        let exchange = MockExchange::returning(|| Ok(tokens("tok", Some(3600))));
        let h = harness(exchange.clone(), MockResolver::new(None, None));

        let request = h.orchestrator.start("authentik").unwrap();
        let mut tampered = request.state.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'a' { 'b' } else { 'a' });

        let result = h
            .orchestrator
            .handle_callback("authentik", "abc123", &tampered)
            .await;

        assert!(matches!(result, Err(OAuthError::InvalidState { .. })));
        assert_eq!(exchange.calls(), 0);
        assert_eq!(h.orchestrator.phase("authentik"), LoginPhase::Rejected);

        // The failed attempt consumed the transaction, so even the right state
        // is now refused.
        let retry = h
            .orchestrator
            .handle_callback("authentik", "abc123", &request.state)
            .await;
        assert!(matches!(retry, Err(OAuthError::InvalidState { .. })));
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn callback_without_start_is_invalid_state() {
        let exchange = MockExchange::returning(|| Ok(tokens("tok", Some(3600))));
        let h = harness(exchange.clone(), MockResolver::new(None, None));

        let result = h
            .orchestrator
            .handle_callback("authentik", "abc123", "whatever")
            .await;

        assert!(matches!(result, Err(OAuthError::InvalidState { provider }) if provider == "authentik"));
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn callback_cannot_be_replayed() {
        let exchange = MockExchange::returning(|| Ok(tokens("tok", Some(3600))));
        let h = harness(
            exchange.clone(),
            MockResolver::new(Some(user("u1", "a@b.com")), None),
        );

        let request = h.orchestrator.start("authentik").unwrap();
        h.orchestrator
            .handle_callback("authentik", "abc123", &request.state)
            .await
            .unwrap();
        let replay = h
            .orchestrator
            .handle_callback("authentik", "abc123", &request.state)
            .await;

        assert!(matches!(replay, Err(OAuthError::InvalidState { .. })));
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test]
    async fn restarting_invalidates_previous_attempt() {
        let exchange = MockExchange::returning(|| Ok(tokens("tok", Some(3600))));
        let h = harness(exchange.clone(), MockResolver::new(None, None));

        let first = h.orchestrator.start("authentik").unwrap();
        let second = h.orchestrator.start("authentik").unwrap();
        assert_ne!(first.state, second.state);

        let result = h
            .orchestrator
            .handle_callback("authentik", "abc123", &first.state)
            .await;
        assert!(matches!(result, Err(OAuthError::InvalidState { .. })));
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn callback_for_other_provider_does_not_consume_transaction() {
        let exchange = MockExchange::returning(|| Ok(tokens("tok", None)));
        let h = harness(
            exchange.clone(),
            MockResolver::new(Some(user("u1", "a@b.com")), None),
        );

        let request = h.orchestrator.start("authentik").unwrap();
        let wrong = h
            .orchestrator
            .handle_callback("google", "abc123", &request.state)
            .await;
        assert!(matches!(wrong, Err(OAuthError::InvalidState { .. })));

        h.orchestrator
            .handle_callback("authentik", "abc123", &request.state)
            .await
            .unwrap();
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test]
    async fn exchange_failure_yields_no_session() {
        let exchange = MockExchange::returning(|| {
            Err(OAuthError::ExchangeFailed {
                status: 400,
                message: "invalid_grant".to_string(),
            })
        });
        let resolver = MockResolver::new(Some(user("u1", "a@b.com")), Some(Role::User));
        let h = harness(exchange.clone(), resolver.clone());

        let request = h.orchestrator.start("authentik").unwrap();
        let result = h
            .orchestrator
            .handle_callback("authentik", "abc123", &request.state)
            .await;

        match result {
            Err(OAuthError::ExchangeFailed { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "invalid_grant");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(resolver.resolves.load(Ordering::SeqCst), 0);
        assert_eq!(h.orchestrator.phase("authentik"), LoginPhase::Failed);
        assert_eq!(h.store.get("pkce_authentik").unwrap(), None);
    }

    #[tokio::test]
    async fn identity_failure_after_exchange_yields_no_session() {
        let exchange = MockExchange::returning(|| Ok(tokens("tok", Some(3600))));
        let h = harness(exchange.clone(), MockResolver::new(None, Some(Role::User)));

        let request = h.orchestrator.start("authentik").unwrap();
        let result = h
            .orchestrator
            .handle_callback("authentik", "abc123", &request.state)
            .await;

        assert!(matches!(
            result,
            Err(OAuthError::UserInfoFetchFailed { status: 500, .. })
        ));
        assert_eq!(exchange.calls(), 1);
        assert_eq!(h.orchestrator.phase("authentik"), LoginPhase::Failed);
    }

    #[tokio::test]
    async fn backend_userinfo_skips_resolve_and_keeps_role() {
        let exchange = MockExchange::returning(|| {
            let mut tokens = tokens("tok", Some(60));
            tokens.refresh_token = Some("ref".to_string());
            tokens.userinfo = Some(user("u9", "b@c.com"));
            Ok(tokens)
        });
        let resolver = MockResolver::new(None, Some(Role::User));
        let h = harness(exchange, resolver.clone());

        let request = h.orchestrator.start("google").unwrap();
        let login = h
            .orchestrator
            .handle_callback("google", "code", &request.state)
            .await
            .unwrap();

        assert_eq!(resolver.resolves.load(Ordering::SeqCst), 0);
        assert_eq!(login.user_info, Some(user("u9", "b@c.com")));
        assert_eq!(login.refresh_token.as_deref(), Some("ref"));
        assert_eq!(login.role, Some(Role::User));
        assert_eq!(login.expires_at, Some(NOW + 60));
        assert_eq!(login.require_role().unwrap(), Role::User);
    }

    #[tokio::test]
    async fn handle_redirect_parses_callback_url() {
        let h = harness(
            MockExchange::returning(|| Ok(tokens("tok", None))),
            MockResolver::new(Some(user("u1", "a@b.com")), None),
        );

        let request = h.orchestrator.start("authentik").unwrap();
        let redirect = format!(
            "http://localhost:5173/callback?code=abc123&state={}",
            request.state
        );
        let login = h
            .orchestrator
            .handle_redirect("authentik", &redirect)
            .await
            .unwrap();
        assert_eq!(login.access_token, "tok");
    }

    #[tokio::test]
    async fn denied_redirect_consumes_transaction() {
        let exchange = MockExchange::returning(|| Ok(tokens("tok", None)));
        let h = harness(exchange.clone(), MockResolver::new(None, None));

        let request = h.orchestrator.start("authentik").unwrap();
        let redirect = format!(
            "http://localhost:5173/callback?error=access_denied&state={}",
            request.state
        );
        let result = h.orchestrator.handle_redirect("authentik", &redirect).await;

        assert!(matches!(result, Err(OAuthError::AuthorizationDenied { .. })));
        assert_eq!(h.store.get("pkce_authentik").unwrap(), None);
        assert_eq!(h.orchestrator.phase("authentik"), LoginPhase::Rejected);
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn redirect_without_state_is_invalid_state() {
        let exchange = MockExchange::returning(|| Ok(tokens("tok", None)));
        let h = harness(exchange.clone(), MockResolver::new(None, None));

        h.orchestrator.start("authentik").unwrap();
        let result = h
            .orchestrator
            .handle_redirect("authentik", "http://localhost:5173/callback?code=abc123")
            .await;

        assert!(matches!(result, Err(OAuthError::InvalidState { .. })));
        assert_eq!(exchange.calls(), 0);
    }
}
