use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{claims, response::Token, AccessToken, RefreshToken};

/// A structure representing the storage of authentication tokens.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenData {
    /// Access token. Allows access to resources requiring authentication unless expired.
    pub access_token: AccessToken,

    /// Point in time when the `access_token` expires.
    #[serde(with = "time::serde::rfc3339")]
    pub access_token_expires_at: OffsetDateTime,

    /// Refresh token. May be used to obtain a new access token without user intervention.
    pub refresh_token: Option<RefreshToken>,

    /// Point in time when the `refresh_token` expires.
    #[serde(with = "time::serde::rfc3339::option")]
    pub refresh_expires_at: Option<OffsetDateTime>,

    /// Point in time this token data was read.
    #[serde(with = "time::serde::rfc3339")]
    pub time_received: OffsetDateTime,
}

impl TokenData {
    /// Convert a freshly received token.
    ///
    /// The access token lifetime is taken from `expires_in`. Should that be missing, the `exp`
    /// claim of the access token is used. Should that be missing as well, `fallback_lifetime`
    /// is assumed.
    pub(crate) fn from_token(token: Token, fallback_lifetime: Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        let access_token_expires_at = match token.expires_in {
            Some(expires_in) => now + Duration::seconds(expires_in),
            None => claims::decode_unverified(&token.access_token)
                .ok()
                .and_then(|claims| claims.exp)
                .and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
                .unwrap_or_else(|| {
                    tracing::debug!(
                        ?fallback_lifetime,
                        "Token carries no lifetime information. Assuming fallback lifetime."
                    );
                    now + fallback_lifetime
                }),
        };
        Self {
            access_token: token.access_token,
            access_token_expires_at,
            refresh_token: token.refresh_token,
            refresh_expires_at: token
                .refresh_expires_in
                .map(|refresh_expires_in| now + Duration::seconds(refresh_expires_in)),
            time_received: now,
        }
    }

    pub fn access_token_time_left(&self) -> Duration {
        self.access_token_expires_at - OffsetDateTime::now_utc()
    }

    /// Whole seconds until the access token expires. Negative once expired.
    pub fn access_token_seconds_left(&self) -> i64 {
        self.access_token_time_left().whole_seconds()
    }

    pub fn access_token_expired(&self) -> bool {
        self.access_token_expires_at <= OffsetDateTime::now_utc()
    }

    pub fn estimated_access_token_lifetime(&self) -> Duration {
        self.access_token_expires_at - self.time_received
    }

    pub fn refresh_token_time_left(&self) -> Option<Duration> {
        self.refresh_expires_at
            .as_ref()
            .map(|expires_at| *expires_at - OffsetDateTime::now_utc())
    }
}
