use std::{
    cell::Cell,
    fmt::{Debug, Formatter},
    rc::Rc,
};

use futures_util::FutureExt;
use http::StatusCode;
use snafu::ResultExt;

use crate::{
    broadcaster::{AuthEvent, Broadcaster},
    claims::{self, TokenClaims},
    client::AuthenticatedClient,
    config::{AuthenticationOptions, OnRefreshRejected},
    error::{AuthError, ExchangeSnafu, SerdeSnafu, UrlSnafu},
    federated::{FederatedProvider, FederatedTokenExchanger},
    identity::{IdentityEvent, IdentityProvider, LoginOptions, LogoutOptions},
    listeners::Subscription,
    request::{self, RequestError},
    response::Token,
    runtime::Runtime,
    scheduler::{RefreshFn, RefreshScheduler},
    session::{SessionState, VersionCounter},
    storage::Storage,
    token::TokenData,
    token_store::TokenStore,
    AccessToken,
};

/// Host services an `Authentication` depends on.
#[derive(Clone)]
pub struct SessionContext {
    pub storage: Rc<dyn Storage>,
    pub runtime: Rc<dyn Runtime>,
    pub broadcaster: Broadcaster,
    pub client: reqwest::Client,
}

impl SessionContext {
    /// Context with a fresh broadcaster and HTTP client.
    pub fn new(storage: Rc<dyn Storage>, runtime: Rc<dyn Runtime>) -> Self {
        Self {
            storage,
            runtime,
            broadcaster: Broadcaster::new(),
            client: reqwest::Client::new(),
        }
    }
}

/// The authentication session of the current user.
///
/// Stores the tokens issued by the identity provider, refreshes the access token shortly before
/// it expires and hands out tokens of federated providers. State changes are published through
/// the `broadcaster()`.
///
/// Cheap to clone. All clones share the same session.
#[derive(Clone)]
pub struct Authentication {
    inner: Rc<Inner>,
}

struct Inner {
    options: Rc<AuthenticationOptions>,
    identity: Rc<dyn IdentityProvider>,
    runtime: Rc<dyn Runtime>,
    client: reqwest::Client,
    broadcaster: Broadcaster,
    store: TokenStore,
    scheduler: RefreshScheduler,
    exchanger: FederatedTokenExchanger,
    state: Cell<SessionState>,

    /// Incremented on every login and logout.
    version: VersionCounter,
    initialized: Cell<bool>,
}

impl Debug for Authentication {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authentication")
            .field("state", &self.inner.state.get())
            .field("version", &self.inner.version.current())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl Authentication {
    /// # Errors
    /// Returns `AuthError::Url` if the endpoints cannot be derived from `options`.
    pub fn new(
        options: AuthenticationOptions,
        identity: Rc<dyn IdentityProvider>,
        context: SessionContext,
    ) -> Result<Self, AuthError> {
        options.refresh_endpoint().context(UrlSnafu {})?;

        let options = Rc::new(options);
        let store = TokenStore::new(context.storage);
        let scheduler = RefreshScheduler::new(context.runtime.clone(), options.refresh_policy());
        let exchanger = FederatedTokenExchanger::new(
            options.clone(),
            context.client.clone(),
            store.clone(),
            context.broadcaster.clone(),
        );
        Ok(Self {
            inner: Rc::new(Inner {
                options,
                identity,
                runtime: context.runtime,
                client: context.client,
                broadcaster: context.broadcaster,
                store,
                scheduler,
                exchanger,
                state: Cell::new(SessionState::LoggedOut),
                version: VersionCounter::default(),
                initialized: Cell::new(false),
            }),
        })
    }

    /// Connect to the identity provider and restore a persisted session.
    ///
    /// Only the first call has an effect.
    pub fn init(&self) {
        if self.inner.initialized.replace(true) {
            tracing::trace!("Authentication already initialized.");
            return;
        }
        tracing::trace!("Initializing authentication...");

        let weak = Rc::downgrade(&self.inner);
        self.inner.identity.init(Rc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                Authentication { inner }.handle_identity_event(event);
            }
        }));

        self.restore_session();

        let first_start = self.inner.store.mark_initialized();
        self.inner
            .broadcaster
            .broadcast(AuthEvent::AppInitialized(first_start));
    }

    /// Redirect to the login page of the identity provider.
    pub fn log_in(&self, options: &LoginOptions) -> bool {
        tracing::debug!(?options, "Redirecting to login.");
        self.inner.identity.login(options);
        true
    }

    /// Complete a login with a token passed back through the login redirect.
    ///
    /// # Errors
    /// Returns `AuthError::Serde` if `token_json` is not a token. The session is not touched.
    pub fn log_in_with_token(&self, token_json: &str) -> Result<(), AuthError> {
        let token = Token::from_json(token_json).context(SerdeSnafu {})?;
        self.complete_login(token);
        Ok(())
    }

    /// End the session locally and at the identity provider.
    ///
    /// Always emits `logout`, even if no session existed.
    pub fn logout(&self, options: &LogoutOptions) {
        tracing::debug!("Logging out.");
        self.end_session();
        self.inner.broadcaster.broadcast(AuthEvent::Logout(1));
        self.inner.identity.logout(options);
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state() == SessionState::LoggedIn
    }

    /// The current access token. `None` when logged out.
    pub fn get_token(&self) -> Option<AccessToken> {
        match self.is_logged_in() {
            true => self.inner.store.access_token(),
            false => None,
        }
    }

    /// Claims of the current access token. Not verified!
    pub fn parsed_token(&self) -> Option<TokenClaims> {
        let access_token = self.get_token()?;
        claims::decode_unverified(&access_token)
            .inspect_err(|err| tracing::debug!(?err, "Could not decode access token."))
            .ok()
    }

    /// Token of a federated `provider`, obtained through the Keycloak broker.
    ///
    /// Resolves to `Ok(None)` when logged out (without performing any request) and when the
    /// broker holds no token for the user.
    pub async fn get_federated_token(
        &self,
        provider: FederatedProvider,
    ) -> Result<Option<AccessToken>, AuthError> {
        let Some(access_token) = self.get_token() else {
            tracing::debug!(%provider, "Not logged in. No federated token available.");
            return Ok(None);
        };
        self.inner
            .exchanger
            .get(provider, &access_token)
            .await
            .context(ExchangeSnafu {})
    }

    /// Receive the current token of `provider` and every token obtained later on.
    pub fn subscribe_federated_token(
        &self,
        provider: FederatedProvider,
        listener: impl Fn(&AccessToken) + 'static,
    ) -> Subscription {
        self.inner.exchanger.subscribe(provider, listener)
    }

    /// Obtain the token of `provider` in the background. Subscribers receive it once available.
    ///
    /// Does nothing while logged out.
    pub fn prefetch_federated_token(&self, provider: FederatedProvider) {
        if !self.is_logged_in() {
            return;
        }
        let auth = self.clone();
        self.inner.runtime.spawn_local(
            async move {
                if let Err(err) = auth.get_federated_token(provider.clone()).await {
                    tracing::warn!(%provider, ?err, "Could not obtain federated token.");
                }
            }
            .boxed_local(),
        );
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    pub fn options(&self) -> &AuthenticationOptions {
        &self.inner.options
    }

    /// HTTP client attaching the current access token to every request.
    pub fn client(&self) -> AuthenticatedClient {
        AuthenticatedClient::new(self.inner.client.clone(), self.clone())
    }

    /// Refresh the access token now.
    ///
    /// Resolves to `Ok(None)` if the refresh endpoint rejected the refresh token or no refresh
    /// token is known.
    ///
    /// # Errors
    /// Returns `AuthError::NotLoggedIn` when no session exists and `AuthError::Request` if the
    /// refresh failed for any other reason.
    pub async fn refresh_token(&self) -> Result<Option<AccessToken>, AuthError> {
        if !self.is_logged_in() {
            return Err(AuthError::NotLoggedIn);
        }
        match self.refresh_session().await? {
            Some((access_token, remaining_seconds)) if self.is_logged_in() => {
                self.arm_refresh(remaining_seconds);
                Ok(Some(access_token))
            }
            Some(_) | None => Ok(None),
        }
    }

    fn handle_identity_event(&self, event: IdentityEvent) {
        match event {
            IdentityEvent::Authenticated(token) => self.complete_login(token),
            IdentityEvent::Unauthenticated => {
                if self.is_logged_in() {
                    tracing::debug!("Identity provider ended the session.");
                    self.end_session();
                    self.inner.broadcaster.broadcast(AuthEvent::Logout(1));
                }
            }
        }
    }

    fn restore_session(&self) {
        if self.is_logged_in() {
            return;
        }
        let Some(token) = self.inner.store.token_data() else {
            return;
        };
        if token.access_token_expired() && token.refresh_token.is_none() {
            tracing::debug!("Persisted access token expired and cannot be refreshed. Dropping it.");
            self.inner.store.clear();
            return;
        }
        let remaining_seconds = token.access_token_seconds_left();
        tracing::debug!(remaining_seconds, "Restoring persisted session.");
        self.start_session(token.access_token, remaining_seconds);
    }

    fn complete_login(&self, token: Token) {
        let expires_in = token.expires_in;
        let token = TokenData::from_token(token, self.fallback_lifetime());
        self.inner.store.save(&token);
        let remaining_seconds = expires_in.unwrap_or_else(|| token.access_token_seconds_left());

        match self.state() {
            SessionState::LoggedOut => self.start_session(token.access_token, remaining_seconds),
            SessionState::LoggedIn => {
                tracing::trace!("Received updated token.");
                self.arm_refresh(remaining_seconds);
                self.spawn_federated_refresh(token.access_token);
            }
        }
    }

    fn start_session(&self, access_token: AccessToken, remaining_seconds: i64) {
        self.inner.version.increment();
        self.inner.state.set(SessionState::LoggedIn);
        self.arm_refresh(remaining_seconds);
        self.inner.broadcaster.broadcast(AuthEvent::LoggedIn(1));
        self.spawn_federated_refresh(access_token);
    }

    fn end_session(&self) {
        self.inner.scheduler.cancel();
        self.inner.store.clear();
        self.inner.exchanger.clear();
        self.inner.version.increment();
        self.inner.state.set(SessionState::LoggedOut);
    }

    fn arm_refresh(&self, remaining_seconds: i64) {
        let weak = Rc::downgrade(&self.inner);
        let refresh: RefreshFn = Rc::new(move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return None;
                };
                match (Authentication { inner }).refresh_session().await {
                    Ok(refreshed) => refreshed.map(|(_, remaining_seconds)| remaining_seconds),
                    Err(err) => {
                        tracing::warn!(?err, "Scheduled token refresh failed.");
                        None
                    }
                }
            }
            .boxed_local()
        });
        self.inner.scheduler.arm(remaining_seconds, refresh);
    }

    fn spawn_federated_refresh(&self, access_token: AccessToken) {
        let exchanger = self.inner.exchanger.clone();
        self.inner.runtime.spawn_local(
            async move {
                exchanger.refresh_all(&access_token).await;
            }
            .boxed_local(),
        );
    }

    /// Perform a refresh. Resolves to the new access token and its remaining lifetime.
    async fn refresh_session(&self) -> Result<Option<(AccessToken, i64)>, AuthError> {
        if !self.is_logged_in() {
            tracing::debug!("No session exists. Skipping refresh.");
            return Ok(None);
        }
        let Some(refresh_token) = self.inner.store.refresh_token() else {
            tracing::debug!("No refresh token available. Skipping refresh.");
            return Ok(None);
        };
        let endpoint = self.inner.options.refresh_endpoint().context(UrlSnafu {})?;
        let version = self.inner.version.current();

        tracing::trace!("Refreshing token...");
        let result = request::refresh_token(&self.inner.client, endpoint, &refresh_token).await;

        if !self.inner.version.is_current(version) {
            tracing::trace!("Session changed during refresh. Dropping response.");
            return Ok(None);
        }

        match result {
            Ok(token) => {
                let expires_in = token.expires_in;
                let token = TokenData::from_token(token, self.fallback_lifetime());
                self.inner.store.save(&token);
                let remaining_seconds =
                    expires_in.unwrap_or_else(|| token.access_token_seconds_left());
                tracing::debug!(remaining_seconds, "Token refreshed.");
                self.inner.exchanger.refresh_all(&token.access_token).await;
                if !self.inner.version.is_current(version) {
                    tracing::trace!("Session ended while refreshing federated tokens.");
                    return Ok(None);
                }
                Ok(Some((token.access_token, remaining_seconds)))
            }
            Err(RequestError::ErrResponse { failure })
                if failure.status == StatusCode::BAD_REQUEST =>
            {
                tracing::warn!(
                    on_rejected = ?self.inner.options.advanced.on_refresh_rejected,
                    "Refresh token was rejected."
                );
                self.inner
                    .broadcaster
                    .broadcast(AuthEvent::AuthenticationError(failure));
                if self.inner.options.advanced.on_refresh_rejected == OnRefreshRejected::EndSession
                {
                    self.end_session();
                    self.inner.broadcaster.broadcast(AuthEvent::Logout(1));
                }
                Ok(None)
            }
            Err(err) => {
                if let RequestError::ErrResponse { failure } = &err {
                    self.inner.broadcaster.report(failure);
                }
                Err(AuthError::Request { source: err })
            }
        }
    }

    fn fallback_lifetime(&self) -> time::Duration {
        time::Duration::try_from(self.inner.options.advanced.refresh_ceiling)
            .unwrap_or(time::Duration::MAX)
    }
}
