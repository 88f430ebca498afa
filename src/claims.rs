use std::collections::HashMap;

use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum ClaimsError {
    #[snafu(display("ClaimsError: Could not decode token claims"))]
    Decode { source: jsonwebtoken::errors::Error },
}

/// Claims read from an access token.
///
/// These are NOT verified. Signature and expiry checks are the identity provider's business,
/// we only read what it handed us to display user information and to learn the expiry time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenClaims {
    /// (sub) Subject identifier. The Keycloak user id.
    pub sub: Option<String>,

    /// (exp) Expiration time as seconds since the unix epoch.
    pub exp: Option<i64>,

    /// (iat) Time of issuing as seconds since the unix epoch.
    pub iat: Option<i64>,

    /// KEYCLOAK SPECIFIC. Full name of the user.
    pub name: Option<String>,

    /// KEYCLOAK SPECIFIC. Preferred username.
    pub preferred_username: Option<String>,

    /// KEYCLOAK SPECIFIC. Email address of the user.
    pub email: Option<String>,

    #[serde(flatten)]
    pub remaining: HashMap<String, serde_json::Value>,
}

pub(crate) fn decode_unverified(access_token: &str) -> Result<TokenClaims, ClaimsError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<TokenClaims>(access_token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .context(DecodeSnafu {})
}
