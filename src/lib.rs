//! Keycloak session handling for Leptos applications.
//!
//! Wraps the client of your identity provider (e.g. the Keycloak JS adapter), which performs the
//! login and logout redirects, and takes care of everything happening in between:
//!
//! - Tokens are persisted in the browsers storage and restored after a page reload.
//! - The access token is refreshed through `POST {api_url}/login/refresh` shortly before it
//!   expires.
//! - Tokens of federated providers (Google, Microsoft, ...) are obtained from the Keycloak
//!   broker and kept up to date.
//! - Login, logout and failing requests are published as events.
//!
//! ```no_run
//! use std::rc::Rc;
//! use leptos::prelude::*;
//! use leptos_keycloak_session::{
//!     components::{AuthProvider, ShowWhenLoggedIn},
//!     url::Url,
//!     use_session, AdvancedOptions, AuthenticationOptions, FederatedProvider, IdentityProvider,
//!     LoginOptions,
//! };
//!
//! #[component]
//! pub fn App(keycloak: Rc<dyn IdentityProvider>) -> impl IntoView {
//!     let options = AuthenticationOptions {
//!         api_url: Url::parse("http://127.0.0.1:3000/api/").unwrap(),
//!         sso_url: Url::parse("http://localhost:8443/auth").unwrap(),
//!         realm: "test-realm".to_owned(),
//!         advanced: AdvancedOptions::default(),
//!     };
//!
//!     view! {
//!         <AuthProvider options=options identity=keycloak>
//!             <ShowWhenLoggedIn fallback=|| view! { <LoginButton/> }>
//!                 <ConfidentialArea/>
//!             </ShowWhenLoggedIn>
//!         </AuthProvider>
//!     }
//! }
//!
//! #[component]
//! pub fn LoginButton() -> impl IntoView {
//!     let session = use_session();
//!     view! {
//!         <button on:click=move |_| { session.log_in(&LoginOptions::default()); }>"Login"</button>
//!     }
//! }
//!
//! #[component]
//! pub fn ConfidentialArea() -> impl IntoView {
//!     let session = use_session();
//!     let github_token = session.federated_token(FederatedProvider::GitHub);
//!
//!     view! {
//!         <div>
//!             "Linked with GitHub: " { move || if github_token.get().is_some() { "yes" } else { "no" } }
//!         </div>
//!     }
//! }
//! ```

mod auth;
mod broadcaster;
mod claims;
mod client;
pub mod components;
mod config;
mod error;
mod federated;
mod hooks;
mod identity;
mod latest_value;
mod listeners;
mod request;
mod response;
mod runtime;
mod scheduler;
mod session;
mod storage;
mod token;
mod token_store;
mod user;

#[cfg(test)]
mod test_support;

// Library exports (additional to pub modules).
pub use auth::*;
pub use broadcaster::*;
pub use claims::{ClaimsError, TokenClaims};
pub use client::*;
pub use config::*;
pub use error::AuthError;
pub use federated::{ExchangeError, ExchangeResult, FederatedProvider, FederatedTokenExchanger};
pub use hooks::*;
pub use identity::*;
pub use latest_value::LatestValue;
pub use listeners::Subscription;
pub use request::{HttpFailure, RequestError};
pub use response::Token;
pub use runtime::*;
pub use scheduler::{RefreshFn, RefreshPolicy, RefreshScheduler};
pub use session::{SessionState, SessionVersion};
pub use storage::*;
pub use token::TokenData;
pub use token_store::TokenStore;
pub use user::*;
pub mod url {
    pub use url::Url;
}
pub mod reqwest {
    pub use reqwest::*;
}

type RefreshEndpoint = url::Url;
type BrokerTokenEndpoint = url::Url;

pub type AccessToken = String;
pub type RefreshToken = String;
