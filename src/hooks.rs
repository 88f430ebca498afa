use std::rc::Rc;

use leptos::prelude::*;

use crate::{
    auth::{Authentication, SessionContext},
    broadcaster::{AuthEvent, Topic},
    config::AuthenticationOptions,
    error::AuthError,
    federated::FederatedProvider,
    identity::{IdentityProvider, LoginOptions, LogoutOptions},
    runtime::BrowserRuntime,
    storage::BrowserStorage,
    AccessToken,
};

/// Reactive handle to the `Authentication` of this application.
///
/// Provided as context by `use_session_with`. Use
/// ```no_run
/// use leptos_keycloak_session::use_session;
///
/// let session = use_session();
/// ```
/// in any component rendered below the component performing the `use_session_with` call.
#[derive(Clone, Copy)]
pub struct AuthSession {
    /// `true` between `loggedin` and `logout`.
    pub is_logged_in: Signal<bool>,

    auth: StoredValue<Authentication, LocalStorage>,
}

impl AuthSession {
    /// Track the state of `auth` reactively and initialize it.
    ///
    /// Subscriptions end when the current reactive owner is disposed.
    pub fn new(auth: Authentication) -> Self {
        let is_logged_in = RwSignal::new(auth.is_logged_in());
        let subscriptions = [Topic::LoggedIn, Topic::Logout].map(|topic| {
            auth.broadcaster().on(topic, move |event| {
                is_logged_in.set(matches!(event, AuthEvent::LoggedIn(_)));
            })
        });
        let _ = StoredValue::new_local(subscriptions);

        auth.init();

        Self {
            is_logged_in: is_logged_in.into(),
            auth: StoredValue::new_local(auth),
        }
    }

    pub fn log_in(&self, options: &LoginOptions) -> bool {
        self.auth.with_value(|auth| auth.log_in(options))
    }

    pub fn logout(&self, options: &LogoutOptions) {
        self.auth.with_value(|auth| auth.logout(options));
    }

    pub fn get_token(&self) -> Option<AccessToken> {
        self.auth.with_value(Authentication::get_token)
    }

    pub fn with_authentication<R>(&self, f: impl FnOnce(&Authentication) -> R) -> R {
        self.auth.with_value(f)
    }

    pub fn authentication(&self) -> Authentication {
        self.auth.get_value()
    }

    /// Reactive token of a federated `provider`.
    ///
    /// The token is requested right away when logged in, again whenever a session starts and
    /// updated with every refresh. It is `None` while logged out or if the broker holds no token
    /// for the user.
    pub fn federated_token(&self, provider: FederatedProvider) -> Signal<Option<AccessToken>> {
        let token = RwSignal::new(None::<AccessToken>);
        let subscriptions = self.with_authentication(|auth| {
            let updates = auth.subscribe_federated_token(provider.clone(), move |value| {
                token.set(Some(value.clone()));
            });
            let logout = auth.broadcaster().on(Topic::Logout, move |_| token.set(None));
            auth.prefetch_federated_token(provider);
            [updates, logout]
        });
        let _ = StoredValue::new_local(subscriptions);

        token.into()
    }
}

/// Create the `Authentication` for this application, backed by browser storage and timers, and
/// provide it as context.
///
/// # Errors
/// Returns `AuthError::Url` if the endpoints cannot be derived from `options`.
pub fn use_session_with(
    options: AuthenticationOptions,
    identity: Rc<dyn IdentityProvider>,
) -> Result<AuthSession, AuthError> {
    tracing::trace!("Initializing session...");
    let storage = Rc::new(BrowserStorage::new(options.advanced.storage));
    let auth = Authentication::new(
        options,
        identity,
        SessionContext::new(storage, Rc::new(BrowserRuntime)),
    )?;
    let session = AuthSession::new(auth);
    provide_context(session);
    Ok(session)
}

/// # Panics
/// Panics if no `AuthSession` was provided, e.g. through `use_session_with` or `AuthProvider`.
pub fn use_session() -> AuthSession {
    expect_context::<AuthSession>()
}

pub fn try_use_session() -> Option<AuthSession> {
    use_context::<AuthSession>()
}
