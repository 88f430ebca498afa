use std::rc::Rc;

use url::Url;

use crate::response::Token;

/// Notification of the identity provider client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// The user is authenticated and `Token` was issued for them.
    Authenticated(Token),

    /// The identity provider no longer considers the user authenticated.
    Unauthenticated,
}

pub type IdentityListener = Rc<dyn Fn(IdentityEvent)>;

/// The client of the identity provider (e.g. the Keycloak JS adapter) which performs the actual
/// login and logout redirects and issues tokens.
pub trait IdentityProvider {
    /// Start the client. `listener` must be called whenever the authentication state changes,
    /// including when a login redirect completes.
    fn init(&self, listener: IdentityListener);

    /// Redirect the user to the login page.
    fn login(&self, options: &LoginOptions);

    /// End the users session at the identity provider.
    fn logout(&self, options: &LogoutOptions);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginOptions {
    /// Where to return to after a successful login. Defaults to the current page.
    pub redirect_uri: Option<Url>,

    /// E.g. `"login"` to force re-authentication.
    pub prompt: Option<String>,

    /// Pre-fills the username field.
    pub login_hint: Option<String>,

    /// Skips the login page and redirects to the given federated provider directly.
    pub idp_hint: Option<String>,

    pub locale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogoutOptions {
    /// Where to return to after logging out.
    pub redirect_uri: Option<Url>,
}
