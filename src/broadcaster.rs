use http::StatusCode;

use crate::{
    listeners::{Listeners, Subscription},
    request::HttpFailure,
};

/// Events published to the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A session was started. Carries the number of logins (always 1).
    LoggedIn(u32),

    /// The session ended. Carries the number of logouts (always 1).
    Logout(u32),

    /// A request was rejected with 400 (refresh), 401 or 403.
    AuthenticationError(HttpFailure),

    /// A request failed with 500.
    CommunicationError(HttpFailure),

    /// The broker holds no token for a federated provider.
    NoFederatedToken(HttpFailure),

    /// Emitted once per `Authentication::init`. `true` only on the very first start of the
    /// application using this storage.
    AppInitialized(bool),
}

impl AuthEvent {
    pub fn topic(&self) -> Topic {
        match self {
            AuthEvent::LoggedIn(_) => Topic::LoggedIn,
            AuthEvent::Logout(_) => Topic::Logout,
            AuthEvent::AuthenticationError(_) => Topic::AuthenticationError,
            AuthEvent::CommunicationError(_) => Topic::CommunicationError,
            AuthEvent::NoFederatedToken(_) => Topic::NoFederatedToken,
            AuthEvent::AppInitialized(_) => Topic::AppInitialized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    LoggedIn,
    Logout,
    AuthenticationError,
    CommunicationError,
    NoFederatedToken,
    AppInitialized,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::LoggedIn,
        Topic::Logout,
        Topic::AuthenticationError,
        Topic::CommunicationError,
        Topic::NoFederatedToken,
        Topic::AppInitialized,
    ];

    /// Wire name of the topic, as used by other parts of the application.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::LoggedIn => "loggedin",
            Topic::Logout => "logout",
            Topic::AuthenticationError => "authenticationError",
            Topic::CommunicationError => "communicationError",
            Topic::NoFederatedToken => "noFederatedToken",
            Topic::AppInitialized => "appinitialized",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous, in-process publish/subscribe.
///
/// Listeners of a topic are invoked in registration order, directly from within `broadcast`.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    listeners: Listeners<AuthEvent>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, topic: Topic, listener: impl Fn(&AuthEvent) + 'static) -> Subscription {
        self.listeners.add(move |event| {
            if event.topic() == topic {
                listener(event);
            }
        })
    }

    pub fn broadcast(&self, event: AuthEvent) {
        tracing::trace!(topic = %event.topic(), "Broadcasting event.");
        self.listeners.notify(&event);
    }

    /// Broadcast the event matching a failed response: `authenticationError` for 401 and 403,
    /// `communicationError` for 500. Other failures are not broadcast.
    pub(crate) fn report(&self, failure: &HttpFailure) {
        match failure.status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.broadcast(AuthEvent::AuthenticationError(failure.clone()));
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                self.broadcast(AuthEvent::CommunicationError(failure.clone()));
            }
            status => {
                tracing::debug!(%status, url = %failure.url, "Request failed.");
            }
        }
    }
}
