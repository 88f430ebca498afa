use std::rc::Rc;

use leptos::prelude::*;

use crate::{
    config::AuthenticationOptions,
    hooks::{try_use_session, use_session_with, AuthSession},
    identity::{IdentityProvider, LogoutOptions},
};

/// Initialize the session and provide it to child components.
///
/// # Example
/// ```no_run
/// use std::rc::Rc;
/// use leptos::prelude::*;
/// use leptos_keycloak_session::{
///     components::{AuthProvider, ShowWhenLoggedIn},
///     url::Url,
///     AdvancedOptions, AuthenticationOptions, IdentityProvider,
/// };
///
/// # #[component]
/// # fn Example(keycloak: Rc<dyn IdentityProvider>) -> impl IntoView {
/// let options = AuthenticationOptions {
///     api_url: Url::parse("https://api.example.com/api/").expect("valid api url"),
///     sso_url: Url::parse("https://sso.example.com/auth").expect("valid sso url"),
///     realm: "my-realm".to_owned(),
///     advanced: AdvancedOptions::default(),
/// };
/// view! {
///     <AuthProvider options=options identity=keycloak>
///         <ShowWhenLoggedIn fallback=|| view! { <p>"Please log in."</p> }>
///             <p>"Your secure content here"</p>
///         </ShowWhenLoggedIn>
///     </AuthProvider>
/// }
/// # }
/// ```
#[allow(clippy::must_use_candidate)]
#[component]
pub fn AuthProvider(
    options: AuthenticationOptions,

    /// Client of the identity provider performing the actual login and logout.
    identity: Rc<dyn IdentityProvider>,

    children: Children,
) -> impl IntoView {
    if let Err(err) = use_session_with(options, identity) {
        tracing::error!(?err, "Could not initialize session. Rendering without one.");
    }

    view! {
        { children() }
    }
}

/// Show `children` only while a session exists. Renders `fallback` otherwise.
#[component(transparent)]
#[allow(clippy::must_use_candidate)]
pub fn ShowWhenLoggedIn(
    #[prop(optional, into)] fallback: ViewFn,
    children: ChildrenFn,
) -> impl IntoView {
    logged_in_view(session_signal(), fallback, children)
}

fn session_signal() -> Signal<bool> {
    match try_use_session() {
        Some(session) => session.is_logged_in,
        None => {
            tracing::warn!("ShowWhenLoggedIn used without a session. Rendering fallback.");
            Signal::stored(false)
        }
    }
}

fn logged_in_view(
    is_logged_in: Signal<bool>,
    fallback: ViewFn,
    children: ChildrenFn,
) -> impl Fn() -> AnyView + Send + 'static {
    move || match is_logged_in.get() {
        true => children(),
        false => fallback.run(),
    }
}

/// Immediately ends the session when rendered.
///
/// You may use this in your router and render it as the only component when the user hits
/// the "/logout" path locally.
#[component]
#[allow(clippy::must_use_candidate)]
pub fn EndSession(#[prop(optional)] options: LogoutOptions) -> impl IntoView {
    let session = try_use_session();
    // The session MUST only be ended on the client, not on the server.
    Effect::new(move |_| end_session(session, &options));
}

fn end_session(session: Option<AuthSession>, options: &LogoutOptions) {
    match session {
        Some(session) => session.logout(options),
        None => tracing::trace!("No session. Nothing to end."),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use assertr::prelude::*;

    use super::*;
    use crate::{
        hooks::tests::{authentication, sample_token},
        identity::IdentityEvent,
        test_support::FakeIdentityProvider,
    };

    #[test]
    fn children_are_shown_while_logged_in() {
        let owner = Owner::new();
        owner.with(|| {
            let is_logged_in = RwSignal::new(false);
            let rendered = Arc::new(Mutex::new(Vec::new()));
            let children: ChildrenFn = {
                let rendered = rendered.clone();
                Arc::new(move || {
                    rendered.lock().unwrap().push("children");
                    ().into_any()
                })
            };
            let fallback = {
                let rendered = rendered.clone();
                ViewFn::from(move || rendered.lock().unwrap().push("fallback"))
            };
            let view = logged_in_view(is_logged_in.into(), fallback, children);

            let _ = view();
            is_logged_in.set(true);
            let _ = view();
            is_logged_in.set(false);
            let _ = view();

            assert_that(rendered.lock().unwrap().clone())
                .is_equal_to(vec!["fallback", "children", "fallback"]);
        });
    }

    #[test]
    fn session_signal_without_session_is_false() {
        let owner = Owner::new();
        owner.with(|| {
            assert_that(session_signal().get_untracked()).is_false();
        });
    }

    #[test]
    fn session_signal_follows_provided_session() {
        let owner = Owner::new();
        owner.with(|| {
            let identity = Rc::new(FakeIdentityProvider::default());
            provide_context(AuthSession::new(authentication(identity.clone())));
            let is_logged_in = session_signal();
            assert_that(is_logged_in.get_untracked()).is_false();

            identity.emit(IdentityEvent::Authenticated(sample_token()));

            assert_that(is_logged_in.get_untracked()).is_true();
        });
    }

    #[test]
    fn end_session_logs_out() {
        let owner = Owner::new();
        owner.with(|| {
            let identity = Rc::new(FakeIdentityProvider::default());
            let session = AuthSession::new(authentication(identity.clone()));
            identity.emit(IdentityEvent::Authenticated(sample_token()));

            end_session(Some(session), &LogoutOptions::default());

            assert_that(session.is_logged_in.get_untracked()).is_false();
            assert_that(identity.logouts.get()).is_equal_to(1);
        });
    }

    #[test]
    fn end_session_without_session_does_nothing() {
        end_session(None, &LogoutOptions::default());
    }
}
