use serde::{Deserialize, Serialize};

use crate::{AccessToken, RefreshToken};

/// A token as issued by the identity provider, the refresh endpoint or a broker token endpoint.
///
/// Only `access_token` is guaranteed. Broker token endpoints in particular tend to omit the
/// refresh token and sometimes even the lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Token {
    pub access_token: AccessToken,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,

    /// Lifetime of the access token in seconds, counted from the moment the token was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Token {
    /// Parse a token from its JSON representation, e.g. a token passed back through a login
    /// redirect.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Body of a successful `POST {api_url}/login/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct RefreshResponse {
    pub token: TokenPayload,
}

/// The refresh endpoint has been seen returning the token both as a nested object and as a
/// JSON document encoded into a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum TokenPayload {
    Structured(Token),
    Encoded(String),
}

impl TokenPayload {
    pub(crate) fn into_token(self) -> Result<Token, serde_json::Error> {
        match self {
            TokenPayload::Structured(token) => Ok(token),
            TokenPayload::Encoded(json) => Token::from_json(&json),
        }
    }
}
