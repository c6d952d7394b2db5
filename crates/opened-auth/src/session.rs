//! Token lifecycle for one OpenEd client
//!
//! A [`Session`] owns the bearer token from acquisition to revocation:
//!
//! 1. `Session::init` validates the config and loads any persisted token
//! 2. `login` opens the implicit-flow page; the host later hands the redirect
//!    to `consume_redirect_token`, which persists and re-validates it
//! 3. `silent_login` exchanges a signed request and persists the result
//!    without re-validation (the signing server already authenticated the user)
//! 4. `verify_token` checks the local expiry, then introspects with the backend
//! 5. `logout` revokes best-effort and always clears the local token
//!
//! Any failed validation clears the local token (fail closed). Token
//! mutations are not serialized against each other; callers must not run
//! `login`, `silent_login` and `logout` concurrently on one session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_API_HOST, DEFAULT_AUTH_HOST, DEFAULT_TOKEN_PREFIX};
use crate::error::{Error, Result};
use crate::record::{ACCESS_TOKEN_FIELD, EXPIRES_IN_FIELD, TokenRecord, is_expired_at};
use crate::storage::TokenStore;
use crate::token::{self, Endpoints, TokenInfo};

/// Client configuration, fixed for the life of a session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_auth_host")]
    pub auth_host: String,
    #[serde(default = "default_token_prefix")]
    pub token_prefix: String,
    /// Timeout applied to every backend request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Verify a persisted token with the backend during `init`
    #[serde(default)]
    pub check_status: bool,
}

fn default_api_host() -> String {
    DEFAULT_API_HOST.to_owned()
}

fn default_auth_host() -> String {
    DEFAULT_AUTH_HOST.to_owned()
}

fn default_token_prefix() -> String {
    DEFAULT_TOKEN_PREFIX.to_owned()
}

fn default_request_timeout() -> u64 {
    30
}

impl SessionConfig {
    /// Config with default hosts, prefix and timeout.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: None,
            api_host: default_api_host(),
            auth_host: default_auth_host(),
            token_prefix: default_token_prefix(),
            request_timeout_secs: default_request_timeout(),
            check_status: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Configuration("client_id must not be empty".into()));
        }
        for (name, host) in [("api_host", &self.api_host), ("auth_host", &self.auth_host)] {
            if !host.starts_with("http://") && !host.starts_with("https://") {
                return Err(Error::Configuration(format!(
                    "{name} must start with http:// or https://, got: {host}"
                )));
            }
        }
        if self.token_prefix.is_empty() {
            return Err(Error::Configuration("token_prefix must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Configuration(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            api_host: self.api_host.clone(),
            auth_host: self.auth_host.clone(),
        }
    }
}

/// Where the session stands with respect to its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
    /// Introspection request in flight
    Verifying,
    /// The last token failed the local expiry check and was cleared
    Expired,
}

/// Notification kinds a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    LoggedIn,
    LoggedOut,
}

/// Notification delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { access_token: String },
    LoggedOut,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::LoggedIn { .. } => EventKind::LoggedIn,
            SessionEvent::LoggedOut => EventKind::LoggedOut,
        }
    }
}

/// Handle returned by [`Session::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Source of the current time in unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

/// External capability that shows the authorization page to the user
/// (a browser popup, a system browser, a webview).
pub trait UserAgent {
    /// Open `url`. Returns `false` if the agent refused, e.g. a blocked popup.
    fn open(&self, url: &str) -> bool;
}

/// Token manager for one client.
pub struct Session {
    config: SessionConfig,
    endpoints: Endpoints,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    listeners: Mutex<Vec<(ListenerId, EventKind, Listener)>>,
    next_listener_id: AtomicU64,
}

/// Collects a clock and listeners before [`SessionBuilder::init`] runs.
///
/// Listeners added here see the `LoggedIn` emitted by the start-up status
/// check. They stay registered for the life of the session.
pub struct SessionBuilder {
    config: SessionConfig,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    listeners: Vec<(EventKind, Listener)>,
}

impl SessionBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn on<F>(mut self, kind: EventKind, listener: F) -> Self
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.listeners.push((kind, Arc::new(listener)));
        self
    }

    /// Validate the config, load the persisted token and optionally verify it.
    ///
    /// Only configuration and storage problems fail here. When
    /// `check_status` is set, a persisted token that fails verification is
    /// cleared and logged; the outcome is visible through [`Session::state`],
    /// and [`Session::check_login_status`] reports the error itself.
    pub async fn init(self) -> Result<Session> {
        let Self {
            config,
            store,
            clock,
            listeners,
        } = self;
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("building HTTP client: {e}")))?;

        let next_listener_id = AtomicU64::new(0);
        let listeners = listeners
            .into_iter()
            .map(|(kind, listener)| {
                let id = ListenerId(next_listener_id.fetch_add(1, Ordering::Relaxed));
                (id, kind, listener)
            })
            .collect();

        let session = Session {
            endpoints: config.endpoints(),
            config,
            http,
            store,
            clock,
            state: Mutex::new(SessionState::LoggedOut),
            listeners: Mutex::new(listeners),
            next_listener_id,
        };

        if session.get_access_token().await?.is_some() {
            if session.config.check_status {
                match session.check_login_status().await {
                    Ok(_) => info!(client_id = %session.config.client_id, "persisted token verified"),
                    Err(e) => warn!(error = %e, "persisted token failed status check"),
                }
            } else {
                session.set_state(SessionState::LoggedIn);
            }
        }

        info!(
            client_id = %session.config.client_id,
            state = ?session.state(),
            "session initialized"
        );
        Ok(session)
    }
}

impl Session {
    /// Start configuring a session; see [`SessionBuilder::init`].
    pub fn builder(config: SessionConfig, store: Arc<dyn TokenStore>) -> SessionBuilder {
        SessionBuilder {
            config,
            store,
            clock: Arc::new(SystemClock),
            listeners: Vec::new(),
        }
    }

    /// [`SessionBuilder::init`] with the system clock and no early listeners.
    pub async fn init(config: SessionConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        Self::builder(config, store).init().await
    }

    /// [`Session::init`] with an explicit time source.
    pub async fn init_with_clock(
        config: SessionConfig,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::builder(config, store).clock(clock).init().await
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// HTTP client configured with the session timeout.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Implicit-flow authorization URL for this client.
    pub fn authorize_url(&self) -> String {
        self.endpoints
            .authorize_url(&self.config.client_id, self.config.redirect_uri.as_deref())
    }

    /// Show the authorization page through `agent`.
    ///
    /// The agent is expected to redirect back with the token in the fragment,
    /// which the host passes to [`Session::consume_redirect_token`]. A refused
    /// open is logged as a warning and reported as `false`. Abandoning the
    /// page leaves the session logged out without any signal.
    pub fn login(&self, agent: &dyn UserAgent) -> bool {
        let url = self.authorize_url();
        if agent.open(&url) {
            info!(client_id = %self.config.client_id, "authorization page opened");
            true
        } else {
            warn!(url = %url, "authorization page was blocked, allow popups and retry login");
            false
        }
    }

    /// Persist the token from an authorization redirect, then verify it.
    ///
    /// `LoggedIn` is emitted only after the backend confirms the token
    /// belongs to this client. On failure the token is cleared and the
    /// verification error returned.
    pub async fn consume_redirect_token(&self, raw: &str) -> Result<TokenRecord> {
        let record = TokenRecord::parse_redirect(raw, self.clock.now_millis())?;
        let access_token = record
            .access_token
            .clone()
            .ok_or_else(|| Error::InvalidResponse("redirect carried no access_token".into()))?;

        self.save_record(&record).await?;
        debug!("redirect token stored, verifying");

        self.verify_token().await?;
        self.emit(&SessionEvent::LoggedIn { access_token });
        Ok(record)
    }

    /// Exchange a signed request for a token and persist it.
    ///
    /// No introspection follows; the token is usable immediately.
    pub async fn silent_login(&self, signed_request: &str) -> Result<TokenRecord> {
        if signed_request.trim().is_empty() {
            return Err(Error::InvalidInput("signed request must not be empty".into()));
        }

        let fields = token::exchange_signed_request(&self.http, &self.endpoints, signed_request).await?;
        let record = TokenRecord::from_response(fields, self.clock.now_millis())?;
        let access_token = record
            .access_token
            .clone()
            .ok_or_else(|| Error::InvalidResponse("silent login returned no access_token".into()))?;

        self.save_record(&record).await?;
        self.set_state(SessionState::LoggedIn);
        info!(client_id = %self.config.client_id, "silent login succeeded");
        self.emit(&SessionEvent::LoggedIn { access_token });
        Ok(record)
    }

    /// Revoke the token (best-effort) and clear it locally.
    ///
    /// Without a stored token no request is made. `LoggedOut` is emitted
    /// either way.
    pub async fn logout(&self) -> Result<()> {
        if let Some(access_token) = self.get_access_token().await? {
            match token::revoke(&self.http, &self.endpoints, &access_token).await {
                Ok(()) => debug!("token revoked"),
                Err(e) => warn!(error = %e, "token revocation failed, clearing local token anyway"),
            }
        }
        self.reset_token(SessionState::LoggedOut).await?;
        info!(client_id = %self.config.client_id, "logged out");
        Ok(())
    }

    /// Check the stored token: local expiry first, then backend introspection.
    ///
    /// - no token: [`Error::LoggedOut`], no request
    /// - expired locally: token cleared, [`Error::Expired`], no request
    /// - introspection fails: token cleared, [`Error::Network`]
    /// - token issued to another client: token cleared, [`Error::WrongClient`]
    pub async fn verify_token(&self) -> Result<TokenInfo> {
        let Some(access_token) = self.get_access_token().await? else {
            self.set_state(SessionState::LoggedOut);
            return Err(Error::LoggedOut);
        };

        let now = self.clock.now_millis();
        if is_expired_at(self.stored_expiry().await?, now) {
            debug!(now, "stored token expired");
            self.reset_token_logged(SessionState::Expired).await;
            return Err(Error::Expired);
        }

        self.set_state(SessionState::Verifying);
        let info = match token::token_info(&self.http, &self.endpoints, &access_token).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "token introspection failed, clearing token");
                self.reset_token_logged(SessionState::LoggedOut).await;
                return Err(e);
            }
        };

        if info.client_uid() != Some(self.config.client_id.as_str()) {
            let actual = info.client_uid().map(str::to_owned);
            warn!(expected = %self.config.client_id, actual = ?actual, "token issued to another client");
            self.reset_token_logged(SessionState::LoggedOut).await;
            return Err(Error::WrongClient {
                expected: self.config.client_id.clone(),
                actual,
            });
        }

        self.set_state(SessionState::LoggedIn);
        Ok(info)
    }

    /// Verify the stored token and emit `LoggedIn` on success.
    pub async fn check_login_status(&self) -> Result<TokenInfo> {
        let info = self.verify_token().await?;
        if let Some(access_token) = self.get_access_token().await? {
            self.emit(&SessionEvent::LoggedIn { access_token });
        }
        Ok(info)
    }

    /// Currently stored token, `None` when logged out. Never touches the network.
    pub async fn get_access_token(&self) -> Result<Option<String>> {
        self.store.get(&self.key(ACCESS_TOKEN_FIELD)).await
    }

    /// Subscribe to `kind` notifications.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, kind, Arc::new(listener)));
        id
    }

    /// Unsubscribe. Returns `false` if `id` was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Call matching listeners in registration order.
    ///
    /// The registry lock is released first so listeners may call `on`/`off`.
    fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        let matching: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in matching {
            listener(event);
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn key(&self, field: &str) -> String {
        format!("{}.{field}", self.config.token_prefix)
    }

    /// Remove every persisted field of the current token.
    async fn clear_record(&self) -> Result<()> {
        let removed = self.store.remove_prefix(&self.key("")).await?;
        debug!(removed, "cleared token fields");
        Ok(())
    }

    /// Stored absolute expiry. An unparseable value counts as already expired.
    async fn stored_expiry(&self) -> Result<Option<u64>> {
        let Some(raw) = self.store.get(&self.key(EXPIRES_IN_FIELD)).await? else {
            return Ok(None);
        };
        match raw.trim().parse::<u64>() {
            Ok(expires_at) => Ok(Some(expires_at)),
            Err(_) => {
                warn!(value = %raw, "unparseable stored expiry, treating token as expired");
                Ok(Some(0))
            }
        }
    }

    /// Replace the persisted token with `record`; no field of the previous
    /// token survives.
    async fn save_record(&self, record: &TokenRecord) -> Result<()> {
        self.clear_record().await?;
        for (field, value) in record.fields() {
            self.store.set(&self.key(&field), &value).await?;
        }
        Ok(())
    }

    /// Move to `next`, clear the whole record and emit `LoggedOut`.
    ///
    /// The state changes even when storage fails.
    async fn reset_token(&self, next: SessionState) -> Result<()> {
        self.set_state(next);
        self.clear_record().await?;
        self.emit(&SessionEvent::LoggedOut);
        Ok(())
    }

    /// `reset_token` on an error path, where the original error wins.
    async fn reset_token_logged(&self, next: SessionState) {
        if let Err(e) = self.reset_token(next).await {
            warn!(error = %e, "failed to clear token from storage");
        }
    }
}
