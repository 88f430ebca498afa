use snafu::{ResultExt, Snafu};

use crate::{auth::Authentication, request::HttpFailure};

#[derive(Debug, Snafu)]
pub enum ClientError {
    #[snafu(display("ClientError: Could not send request"))]
    Send { source: reqwest::Error },

    #[snafu(display("ClientError: Received an error response with status {}", failure.status))]
    ErrResponse { failure: HttpFailure },
}

impl ClientError {
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            ClientError::Send { source } => source.status(),
            ClientError::ErrResponse { failure } => Some(failure.status),
        }
    }
}

/// HTTP client with automatic access token injection and error broadcasting.
///
/// This client wraps a `reqwest::Client` and provides the same HTTP methods to issue GET, POST,
/// PUT, PATCH and DELETE requests with two enhancements:
///
/// 1. **Automatic Token Injection**: Requests include the current access token in the
///    `Authorization` header as a Bearer token. Without a session, requests are sent as they are.
///
/// 2. **Error Broadcasting**: Responses with status 401 or 403 are broadcast as
///    `authenticationError`, responses with status 500 as `communicationError`. Every
///    non-success response is returned as `ClientError::ErrResponse`.
///
/// Create an instance using [`Authentication::client()`].
///
/// # Example
/// ```no_run
/// # use leptos_keycloak_session::Authentication;
///
/// # async fn example(auth: Authentication) -> Result<(), Box<dyn std::error::Error>> {
/// let client = auth.client();
/// let response = client.get("https://api.example.com/protected-resource").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    client: reqwest::Client,
    auth: Authentication,
}

impl AuthenticatedClient {
    pub(crate) fn new(client: reqwest::Client, auth: Authentication) -> Self {
        Self { client, auth }
    }

    pub async fn get(&self, url: impl reqwest::IntoUrl) -> Result<reqwest::Response, ClientError> {
        self.get_with(url, |builder| builder).await
    }

    /// Perform a GET request, customizing the request using `with`.
    ///
    /// # Example
    /// ```no_run
    /// # use leptos_keycloak_session::Authentication;
    ///
    /// # async fn example(auth: Authentication) -> Result<(), Box<dyn std::error::Error>> {
    /// let response = auth
    ///     .client()
    ///     .get_with("https://api.example.com/protected-resource", |builder| {
    ///         builder
    ///             .query(&[("limit", "10"), ("offset", "0")])
    ///             .header(http::header::ACCEPT, "application/json")
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_with(
        &self,
        url: impl reqwest::IntoUrl,
        with: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        self.request(reqwest::Method::GET, url, with).await
    }

    pub async fn post(&self, url: impl reqwest::IntoUrl) -> Result<reqwest::Response, ClientError> {
        self.post_with(url, |builder| builder).await
    }

    /// Perform a POST request, e.g. setting a JSON body using `with`.
    pub async fn post_with(
        &self,
        url: impl reqwest::IntoUrl,
        with: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        self.request(reqwest::Method::POST, url, with).await
    }

    pub async fn put(&self, url: impl reqwest::IntoUrl) -> Result<reqwest::Response, ClientError> {
        self.put_with(url, |builder| builder).await
    }

    pub async fn put_with(
        &self,
        url: impl reqwest::IntoUrl,
        with: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        self.request(reqwest::Method::PUT, url, with).await
    }

    pub async fn patch(
        &self,
        url: impl reqwest::IntoUrl,
    ) -> Result<reqwest::Response, ClientError> {
        self.patch_with(url, |builder| builder).await
    }

    pub async fn patch_with(
        &self,
        url: impl reqwest::IntoUrl,
        with: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        self.request(reqwest::Method::PATCH, url, with).await
    }

    pub async fn delete(
        &self,
        url: impl reqwest::IntoUrl,
    ) -> Result<reqwest::Response, ClientError> {
        self.delete_with(url, |builder| builder).await
    }

    pub async fn delete_with(
        &self,
        url: impl reqwest::IntoUrl,
        with: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        self.request(reqwest::Method::DELETE, url, with).await
    }

    /// Performs a request while automatically setting the current access token as an
    /// AUTHORIZATION header.
    ///
    /// # Errors
    /// Returns `ClientError::Send` if the request could not be built or sent and
    /// `ClientError::ErrResponse` for any response not having a success status.
    pub async fn request(
        &self,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl,
        with: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        // Let the user build the request.
        let mut req_builder = with(self.client.request(method, url));

        if let Some(access_token) = self.auth.get_token() {
            req_builder = req_builder.bearer_auth(access_token);
        }

        let resp = req_builder.send().await.context(SendSnafu {})?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let failure = HttpFailure::read(resp).await;
        self.auth.broadcaster().report(&failure);
        Err(ClientError::ErrResponse { failure })
    }
}
