use http::StatusCode;
use serde::Serialize;
use snafu::{ResultExt, Snafu};

use crate::{
    response::{RefreshResponse, Token},
    BrokerTokenEndpoint, RefreshEndpoint,
};

/// A non-successful HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    pub status: StatusCode,
    pub url: String,
    pub body: String,
}

impl HttpFailure {
    pub(crate) async fn read(response: reqwest::Response) -> Self {
        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .inspect_err(|err| tracing::debug!(?err, "Could not read error response body."))
            .unwrap_or_default();
        Self { status, url, body }
    }
}

#[derive(Debug, Snafu)]
pub enum RequestError {
    #[snafu(display("RequestError: Could not send request"))]
    Send { source: reqwest::Error },

    #[snafu(display("RequestError: Could not decode payload"))]
    Decode { source: reqwest::Error },

    #[snafu(display("RequestError: Could not parse encoded token"))]
    Parse { source: serde_json::Error },

    #[snafu(display("RequestError: Received an error response with status {}", failure.status))]
    ErrResponse { failure: HttpFailure },
}

impl RequestError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Send { source } | RequestError::Decode { source } => source.status(),
            RequestError::Parse { .. } => None,
            RequestError::ErrResponse { failure } => Some(failure.status),
        }
    }
}

pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, RequestError> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(ErrResponseSnafu {
        failure: HttpFailure::read(response).await,
    }
    .build())
}

/// `POST {api_url}/login/refresh` with `{"refresh_token": "..."}`.
pub(crate) async fn refresh_token(
    client: &reqwest::Client,
    refresh_endpoint: RefreshEndpoint,
    refresh_token: &str,
) -> Result<Token, RequestError> {
    #[derive(Serialize)]
    struct RefreshRequest<'a> {
        refresh_token: &'a str,
    }
    let response = client
        .post(refresh_endpoint)
        .json(&RefreshRequest { refresh_token })
        .send()
        .await
        .context(SendSnafu {})?;
    error_for_status(response)
        .await?
        .json::<RefreshResponse>()
        .await
        .context(DecodeSnafu {})?
        .token
        .into_token()
        .context(ParseSnafu {})
}

/// `GET {sso_url}/realms/{realm}/broker/{provider}/token`, authorized by the primary access token.
pub(crate) async fn retrieve_broker_token(
    client: &reqwest::Client,
    broker_token_endpoint: BrokerTokenEndpoint,
    access_token: &str,
) -> Result<Token, RequestError> {
    let response = client
        .get(broker_token_endpoint)
        .bearer_auth(access_token)
        .send()
        .await
        .context(SendSnafu {})?;
    error_for_status(response)
        .await?
        .json::<Token>()
        .await
        .context(DecodeSnafu {})
}
