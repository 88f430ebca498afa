use std::time::Duration;

use snafu::Snafu;
use url::Url;

use crate::{
    federated::FederatedProvider, scheduler::RefreshPolicy, storage::StorageKind,
    BrokerTokenEndpoint, RefreshEndpoint,
};

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum UrlError {
    #[snafu(display("UrlError: '{url}' cannot be used as a base url"))]
    CannotBeABase { url: Url },
}

/// Represents the parameters required for initializing an `Authentication`.
#[derive(Debug, Clone)]
pub struct AuthenticationOptions {
    /// Url of the application backend serving `login/refresh`, E.g. "https://api.example.com/api/"
    pub api_url: Url,

    /// Url of your Keycloak instance, including any path prefix, E.g. "https://sso.example.com/auth"
    pub sso_url: Url,

    /// The Keycloak realm you want to use.
    pub realm: String,

    pub advanced: AdvancedOptions,
}

impl AuthenticationOptions {
    /// `{api_url}/login/refresh`
    pub fn refresh_endpoint(&self) -> Result<RefreshEndpoint, UrlError> {
        extend_path(&self.api_url, &["login", "refresh"])
    }

    /// `{sso_url}/realms/{realm}/broker/{provider}/token`
    pub fn broker_token_endpoint(
        &self,
        provider: &FederatedProvider,
    ) -> Result<BrokerTokenEndpoint, UrlError> {
        extend_path(
            &self.sso_url,
            &["realms", &self.realm, "broker", provider.as_str(), "token"],
        )
    }

    pub(crate) fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            ceiling: self.advanced.refresh_ceiling,
            factor: self.advanced.refresh_factor,
        }
    }
}

fn extend_path(base: &Url, segments: &[&str]) -> Result<Url, UrlError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| UrlError::CannotBeABase { url: base.clone() })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// What to do when the refresh endpoint rejects our refresh token with a `400 Bad Request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnRefreshRejected {
    /// Only broadcast an `authenticationError`. The session stays logged in, holding the
    /// (soon to be expired) token.
    #[default]
    KeepSession,

    /// Broadcast an `authenticationError` and end the local session.
    EndSession,
}

#[derive(Debug, Clone)]
pub struct AdvancedOptions {
    /// Upper bound for the remaining token lifetime considered when scheduling a refresh.
    /// Bounds the worst-case staleness of a session.
    /// Defaults to `Duration::from_secs(600)`.
    pub refresh_ceiling: Duration,

    /// Share of the (possibly capped) remaining lifetime after which a refresh is performed.
    /// Defaults to `0.9`.
    pub refresh_factor: f64,

    /// Defaults to `OnRefreshRejected::KeepSession`.
    pub on_refresh_rejected: OnRefreshRejected,

    /// Storage used by `use_session_with` to persist tokens.
    /// Defaults to `StorageKind::Local`.
    pub storage: StorageKind,

    /// Providers whose persisted tokens are removed on logout, even if they were never
    /// requested in the current page session.
    /// Defaults to `google` and `microsoft`.
    pub federated_providers: Vec<FederatedProvider>,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            refresh_ceiling: Duration::from_secs(600),
            refresh_factor: 0.9,
            on_refresh_rejected: OnRefreshRejected::default(),
            storage: StorageKind::default(),
            federated_providers: vec![FederatedProvider::Google, FederatedProvider::Microsoft],
        }
    }
}

#[cfg(test)]
mod tests {
    use assertr::prelude::*;

    use super::*;

    fn options(api_url: &str, sso_url: &str) -> AuthenticationOptions {
        AuthenticationOptions {
            api_url: Url::parse(api_url).unwrap(),
            sso_url: Url::parse(sso_url).unwrap(),
            realm: "openfact".to_owned(),
            advanced: AdvancedOptions::default(),
        }
    }

    #[test]
    fn refresh_endpoint() {
        let options = options("http://example.com", "http://example.com/auth");
        assert_that(options.refresh_endpoint().unwrap().as_str())
            .is_equal_to("http://example.com/login/refresh");
    }

    #[test]
    fn refresh_endpoint_keeps_api_prefix_with_trailing_slash() {
        let options = options("http://example.com/api/", "http://example.com/auth");
        assert_that(options.refresh_endpoint().unwrap().as_str())
            .is_equal_to("http://example.com/api/login/refresh");
    }

    #[test]
    fn broker_token_endpoint() {
        let options = options("http://example.com", "http://example.com/auth");
        assert_that(
            options
                .broker_token_endpoint(&FederatedProvider::Google)
                .unwrap()
                .as_str(),
        )
        .is_equal_to("http://example.com/auth/realms/openfact/broker/google/token");
    }

    #[test]
    fn broker_token_endpoint_for_custom_provider() {
        let options = options("http://example.com", "http://sso.example.com");
        assert_that(
            options
                .broker_token_endpoint(&FederatedProvider::OpenShift)
                .unwrap()
                .as_str(),
        )
        .is_equal_to("http://sso.example.com/realms/openfact/broker/openshift-v3/token");
    }

    #[test]
    fn cannot_be_a_base_url_is_rejected() {
        let options = options("mailto:someone@example.com", "http://example.com/auth");
        assert_that(options.refresh_endpoint().is_err()).is_true();
    }

    #[test]
    fn default_policy() {
        let policy = options("http://example.com", "http://example.com").refresh_policy();
        assert_that(policy.ceiling).is_equal_to(Duration::from_secs(600));
        assert_that(policy.factor).is_equal_to(0.9);
    }

    #[test]
    fn tokens_are_kept_in_local_storage_by_default() {
        let advanced = AdvancedOptions::default();
        let copied = advanced.storage;
        assert_that(copied).is_equal_to(StorageKind::Local);
        assert_that(advanced.on_refresh_rejected).is_equal_to(OnRefreshRejected::KeepSession);
    }
}
