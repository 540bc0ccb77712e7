//! Authentication flows for one session slot
//!
//! [`AuthOrchestrator`] drives login, registration, logout, start-up
//! re-validation and token refresh for a single actor kind. It is the only
//! writer of that slot's [`AuthState`], which it publishes on a watch
//! channel for the presentation layer, and it is the only caller of the
//! slot's [`SessionManager`].
//!
//! The user and admin flows are the same state machine; the differences
//! (which endpoint signs in, whether the server can re-validate the
//! identity, whether there is a remote logout) live in [`SlotFlows`].
//! Operations only the end-user slot supports (registration, profile
//! refresh, token refresh) are inherent methods on
//! `AuthOrchestrator<User, G>`.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::gateway::{into_data, AuthGateway};
use crate::session::{ActorKind, Admin, SessionManager, User};
use crate::store::KeyValueStore;
use crate::types::*;
use async_singleflight::Group;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// Nothing has been attempted yet
    Uninitialized,
    /// A sign-in or start-up check is in flight
    Initializing,
    Authenticated,
    Unauthenticated,
    /// The last transition failed; `AuthState::error` holds the reason
    Error,
}

/// Observable authentication state of one slot
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState<I> {
    pub identity: Option<I>,
    pub tokens: Option<AuthTokens>,
    pub phase: AuthPhase,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl<I> AuthState<I> {
    fn uninitialized() -> Self {
        Self {
            identity: None,
            tokens: None,
            phase: AuthPhase::Uninitialized,
            is_loading: false,
            error: None,
        }
    }

    fn authenticated(identity: I, tokens: AuthTokens) -> Self {
        Self {
            identity: Some(identity),
            tokens: Some(tokens),
            phase: AuthPhase::Authenticated,
            is_loading: false,
            error: None,
        }
    }

    fn signed_out() -> Self {
        Self {
            phase: AuthPhase::Unauthenticated,
            ..Self::uninitialized()
        }
    }

    fn failed(message: String) -> Self {
        Self {
            phase: AuthPhase::Error,
            error: Some(message),
            ..Self::uninitialized()
        }
    }

    /// Signed in with an identity and an access token that has not expired
    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
            && self.identity.is_some()
            && self.tokens.as_ref().is_some_and(|tokens| !tokens.is_expired())
    }
}

/// Per-slot differences between the user and admin flows
pub trait SlotFlows: ActorKind {
    /// Exchange credentials for tokens, plus the identity when the sign-in
    /// endpoint returns one
    fn sign_in<G: AuthGateway>(
        gateway: &G,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<(AuthTokens, Option<Self::Identity>)>> + Send;

    /// Ask the server who `bearer` belongs to. `Ok(None)` means the slot has
    /// no re-validation endpoint and the stored identity stands.
    fn fetch_identity<G: AuthGateway>(
        gateway: &G,
        bearer: &str,
    ) -> impl Future<Output = Result<Option<Self::Identity>>> + Send;

    /// Tell the server the session is over
    fn sign_out<G: AuthGateway>(gateway: &G, bearer: &str) -> impl Future<Output = Result<()>> + Send;
}

impl SlotFlows for User {
    async fn sign_in<G: AuthGateway>(
        gateway: &G,
        credentials: &Credentials,
    ) -> Result<(AuthTokens, Option<UserProfile>)> {
        let tokens = into_data(gateway.login(credentials).await?, "login failed")?;
        Ok((tokens, None))
    }

    async fn fetch_identity<G: AuthGateway>(gateway: &G, bearer: &str) -> Result<Option<UserProfile>> {
        let profile = into_data(gateway.get_profile(bearer).await?, "failed to get profile")?;
        Ok(Some(profile))
    }

    async fn sign_out<G: AuthGateway>(gateway: &G, bearer: &str) -> Result<()> {
        let envelope = gateway.logout(bearer).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(ClientError::Rejected {
                status: envelope.status_code,
                message: envelope.message,
            })
        }
    }
}

impl SlotFlows for Admin {
    async fn sign_in<G: AuthGateway>(
        gateway: &G,
        credentials: &Credentials,
    ) -> Result<(AuthTokens, Option<AdminProfile>)> {
        let AdminTokens { tokens, admin } =
            into_data(gateway.admin_login(credentials).await?, "admin login failed")?;
        Ok((tokens, Some(admin)))
    }

    async fn fetch_identity<G: AuthGateway>(_gateway: &G, _bearer: &str) -> Result<Option<AdminProfile>> {
        Ok(None)
    }

    async fn sign_out<G: AuthGateway>(_gateway: &G, _bearer: &str) -> Result<()> {
        Ok(())
    }
}

/// Coordinates remote authentication calls with one persisted session slot
pub struct AuthOrchestrator<A: SlotFlows, G: AuthGateway> {
    gateway: Arc<G>,
    session: SessionManager<A>,
    state: watch::Sender<AuthState<A::Identity>>,
    request_timeout: Duration,
    refresh_window_minutes: i64,
    /// Collapses concurrent refreshes of this slot into one request
    token_refresh_singleflight: Group<AuthTokens, String>,
}

impl<A: SlotFlows, G: AuthGateway> AuthOrchestrator<A, G> {
    pub fn new(gateway: Arc<G>, store: Arc<dyn KeyValueStore>, config: &ClientConfig) -> Self {
        let (state, _) = watch::channel(AuthState::uninitialized());
        Self {
            gateway,
            session: SessionManager::new(store),
            state,
            request_timeout: config.request_timeout,
            refresh_window_minutes: config.refresh_window_minutes,
            token_refresh_singleflight: Group::new(),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AuthState<A::Identity> {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state transition
    pub fn subscribe(&self) -> watch::Receiver<AuthState<A::Identity>> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn identity(&self) -> Option<A::Identity> {
        self.state.borrow().identity.clone()
    }

    /// Bearer token to attach to this slot's API calls, if signed in
    pub fn access_token(&self) -> Option<String> {
        let state = self.state.borrow();
        if state.is_authenticated() {
            state.tokens.as_ref().map(|tokens| tokens.access_token.clone())
        } else {
            None
        }
    }

    pub fn session(&self) -> &SessionManager<A> {
        &self.session
    }

    /// Restore the persisted session, confirming it with the server where
    /// the slot supports that. Runs once at start-up.
    pub async fn initialize(&self) {
        self.begin_transition();

        if !self.session.is_persistent() {
            debug!(slot = A::NAME, "No persistent storage, nothing to restore");
            self.state.send_replace(AuthState::signed_out());
            return;
        }

        let (tokens, stored_identity) = self.session.load();
        let tokens = match tokens {
            Some(tokens) if !tokens.is_expired() => tokens,
            Some(_) => {
                debug!(slot = A::NAME, "Stored access token has expired");
                self.state.send_replace(AuthState::signed_out());
                return;
            }
            None => {
                debug!(slot = A::NAME, "No stored session");
                self.state.send_replace(AuthState::signed_out());
                return;
            }
        };

        // Tentatively signed in while the server confirms the identity
        self.state.send_modify(|state| {
            state.identity = stored_identity.clone();
            state.tokens = Some(tokens.clone());
            state.phase = AuthPhase::Authenticated;
        });

        let confirmed = self
            .deadline(A::fetch_identity(&*self.gateway, &tokens.access_token))
            .await;

        match confirmed {
            Ok(Some(identity)) => {
                self.session.save_identity(&identity);
                info!(slot = A::NAME, "Session restored");
                self.state.send_replace(AuthState::authenticated(identity, tokens));
            }
            Ok(None) => match stored_identity {
                Some(identity) => {
                    info!(slot = A::NAME, "Session restored");
                    self.state.send_replace(AuthState::authenticated(identity, tokens));
                }
                None => {
                    warn!(slot = A::NAME, "Stored session has no identity, discarding it");
                    self.session.clear();
                    self.state.send_replace(AuthState::signed_out());
                }
            },
            Err(e) if e.is_rejection() => {
                info!(slot = A::NAME, error = %e, "Server rejected stored session");
                self.session.clear();
                self.state.send_replace(AuthState::signed_out());
            }
            Err(e) => {
                warn!(slot = A::NAME, error = %e, "Session initialization failed");
                self.session.clear();
                self.state.send_replace(AuthState::failed(e.to_string()));
            }
        }
    }

    /// Sign in with email and password
    ///
    /// On failure the returned error is also recorded in the state and the
    /// phase becomes Error. A session that was stored before the attempt is
    /// left in storage, and its identity and tokens stay in the state, so
    /// the next `initialize` restores it. The exception is a failed profile
    /// fetch after the server issued new tokens: the slot is then cleared.
    pub async fn login(&self, credentials: &Credentials) -> Result<A::Identity> {
        debug!(slot = A::NAME, email = %credentials.email, "Signing in");
        self.authenticate(A::sign_in(&*self.gateway, credentials)).await
    }

    /// Sign out. The remote call is best effort; the local session is always
    /// cleared and the state always ends signed out and not loading.
    pub async fn logout(&self) {
        let mut bearer = None;
        self.state.send_modify(|state| {
            state.is_loading = true;
            bearer = state.tokens.as_ref().map(|tokens| tokens.access_token.clone());
        });

        if let Some(bearer) = bearer {
            if let Err(e) = self.deadline(A::sign_out(&*self.gateway, &bearer)).await {
                warn!(slot = A::NAME, error = %e, "Remote logout failed, clearing local session anyway");
            }
        }

        // Refresh persists under the same lock
        self.state.send_modify(|state| {
            self.session.clear();
            *state = AuthState::signed_out();
        });
        info!(slot = A::NAME, "Signed out");
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    async fn authenticate<F>(&self, exchange: F) -> Result<A::Identity>
    where
        F: Future<Output = Result<(AuthTokens, Option<A::Identity>)>>,
    {
        self.begin_transition();

        match self.complete_sign_in(exchange).await {
            Ok((tokens, identity)) => {
                info!(slot = A::NAME, "Signed in");
                self.state
                    .send_replace(AuthState::authenticated(identity.clone(), tokens));
                Ok(identity)
            }
            Err(e) => {
                warn!(slot = A::NAME, error = %e, "Sign-in failed");
                // ProfileUnavailable means the new tokens replaced the stored
                // session and the slot was then cleared
                let slot_cleared = matches!(e, ClientError::ProfileUnavailable);
                self.state.send_modify(|state| {
                    if slot_cleared {
                        state.identity = None;
                        state.tokens = None;
                    }
                    state.phase = AuthPhase::Error;
                    state.is_loading = false;
                    state.error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    async fn complete_sign_in<F>(&self, exchange: F) -> Result<(AuthTokens, A::Identity)>
    where
        F: Future<Output = Result<(AuthTokens, Option<A::Identity>)>>,
    {
        let (tokens, identity) = self.deadline(exchange).await?;
        self.session.save_tokens(&tokens);

        let identity = match identity {
            Some(identity) => identity,
            None => match self
                .deadline(A::fetch_identity(&*self.gateway, &tokens.access_token))
                .await
            {
                Ok(Some(identity)) => identity,
                Ok(None) => {
                    self.session.clear();
                    return Err(ClientError::ProfileUnavailable);
                }
                Err(e) => {
                    warn!(slot = A::NAME, error = %e, "Profile fetch after sign-in failed");
                    self.session.clear();
                    return Err(ClientError::ProfileUnavailable);
                }
            },
        };

        self.session.save_identity(&identity);
        Ok((tokens, identity))
    }

    fn begin_transition(&self) {
        self.state.send_modify(|state| {
            state.phase = AuthPhase::Initializing;
            state.is_loading = true;
            state.error = None;
        });
    }

    /// Bound `fut` by the request timeout
    async fn deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| ClientError::Timeout(self.request_timeout))?
    }
}

impl<G: AuthGateway> AuthOrchestrator<User, G> {
    /// Create an account and sign in with it
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserProfile> {
        debug!(email = %request.email, "Registering");
        let gateway = &*self.gateway;
        self.authenticate(async move {
            let tokens = into_data(gateway.register(request).await?, "registration failed")?;
            Ok((tokens, None))
        })
        .await
    }

    /// Re-fetch the profile of the signed-in user. Best effort: failures are
    /// logged and leave the state untouched.
    pub async fn refresh_profile(&self) {
        let Some(bearer) = self.access_token() else {
            return;
        };

        let refreshed = self
            .deadline(User::fetch_identity(&*self.gateway, &bearer))
            .await;

        match refreshed {
            Ok(Some(profile)) => {
                self.session.save_identity(&profile);
                self.state.send_if_modified(|state| {
                    if state.phase != AuthPhase::Authenticated {
                        return false;
                    }
                    state.identity = Some(profile);
                    true
                });
            }
            Ok(None) => {}
            Err(e) => warn!(slot = User::NAME, error = %e, "Failed to refresh profile"),
        }
    }

    /// Exchange the refresh token for a new token set
    ///
    /// Concurrent callers share a single request.
    pub async fn refresh_tokens(&self) -> Result<AuthTokens> {
        let refresh_token = self
            .state
            .borrow()
            .tokens
            .as_ref()
            .map(|tokens| tokens.refresh_token.clone())
            .ok_or(ClientError::NoSession)?;

        let (success_opt, error_opt, _shared) = self
            .token_refresh_singleflight
            .work(User::NAME, async {
                match self.do_refresh(&refresh_token).await {
                    Ok(tokens) => Ok(tokens),
                    Err(e) => {
                        let err_msg = e.to_string();
                        warn!(slot = User::NAME, error = %err_msg, "Token refresh failed");
                        Err(err_msg)
                    }
                }
            })
            .await;

        match (success_opt, error_opt) {
            (Some(tokens), None) => Ok(tokens),
            (None, Some(err_str)) => Err(ClientError::Refresh(err_str)),
            _ => Err(ClientError::Refresh("unknown error during token refresh".to_string())),
        }
    }

    /// Access token that is valid now, refreshing first if it is inside the
    /// refresh window
    pub async fn fresh_access_token(&self) -> Result<String> {
        let tokens = self.state.borrow().tokens.clone().ok_or(ClientError::NoSession)?;
        if tokens.is_expired() {
            return Err(ClientError::TokenExpired);
        }
        if tokens.should_refresh(SystemTime::now(), self.refresh_window_minutes) {
            return Ok(self.refresh_tokens().await?.access_token);
        }
        Ok(tokens.access_token)
    }

    async fn do_refresh(&self, refresh_token: &str) -> Result<AuthTokens> {
        let envelope = self.deadline(self.gateway.refresh_token(refresh_token)).await?;
        let tokens = into_data(envelope, "token refresh failed")?;

        // Only the session that was refreshed may take the new tokens. A
        // logout or a newer sign-in while the request was out wins.
        let applied = self.state.send_if_modified(|state| {
            let same_session = state.phase == AuthPhase::Authenticated
                && state
                    .tokens
                    .as_ref()
                    .is_some_and(|current| current.refresh_token == refresh_token);
            if !same_session {
                return false;
            }
            self.session.save_tokens(&tokens);
            state.tokens = Some(tokens.clone());
            true
        });
        if !applied {
            debug!(slot = User::NAME, "Session changed during refresh, discarding new tokens");
            return Err(ClientError::NoSession);
        }

        info!(slot = User::NAME, "Access token refreshed");
        Ok(tokens)
    }

    /// Start a background task that refreshes the access token whenever it
    /// enters the refresh window
    pub fn spawn_auto_refresh(self: &Arc<Self>, check_interval: Duration) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run_refresh_task(check_interval).await;
        })
    }

    async fn run_refresh_task(&self, check_interval: Duration) {
        info!(
            check_interval_secs = check_interval.as_secs(),
            refresh_window_minutes = self.refresh_window_minutes,
            "Started auto-refresh task"
        );

        let mut interval = tokio::time::interval(check_interval);

        loop {
            interval.tick().await;

            let due = {
                let state = self.state.borrow();
                state.phase == AuthPhase::Authenticated
                    && state.tokens.as_ref().is_some_and(|tokens| {
                        tokens.should_refresh(SystemTime::now(), self.refresh_window_minutes)
                    })
            };
            if !due {
                continue;
            }

            match self.refresh_tokens().await {
                Ok(_) => info!(slot = User::NAME, "Auto-refresh successful"),
                // The next foreground call will surface the problem
                Err(e) => warn!(slot = User::NAME, error = %e, "Auto-refresh failed"),
            }
        }
    }
}
