use snafu::Snafu;

use crate::{config::UrlError, federated::ExchangeError, request::RequestError};

/// An enumeration representing various authentication-related errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display("AuthError: Request error"))]
    Request { source: RequestError },

    #[snafu(display("AuthError: Could not serialize or deserialize data: {source}"))]
    Serde { source: serde_json::Error },

    #[snafu(display("AuthError: Invalid endpoint"))]
    Url { source: UrlError },

    #[snafu(display("AuthError: Federated token exchange failed"))]
    Exchange { source: ExchangeError },

    #[snafu(display("AuthError: No session exists"))]
    NotLoggedIn,
}
