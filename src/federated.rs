use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::{Display, Formatter},
    rc::Rc,
    sync::Arc,
};

use futures_util::{
    future::{join_all, LocalBoxFuture, Shared},
    FutureExt,
};
use http::StatusCode;
use snafu::Snafu;

use crate::{
    broadcaster::{AuthEvent, Broadcaster},
    config::{AuthenticationOptions, UrlError},
    latest_value::LatestValue,
    listeners::Subscription,
    request::{self, RequestError},
    response::Token,
    session::{SessionVersion, VersionCounter},
    token_store::TokenStore,
    AccessToken,
};

/// An identity provider brokered by Keycloak.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FederatedProvider {
    Google,
    Microsoft,
    GitHub,
    OpenShift,
    Other(String),
}

impl FederatedProvider {
    /// Alias of the provider as configured in Keycloak.
    pub fn as_str(&self) -> &str {
        match self {
            FederatedProvider::Google => "google",
            FederatedProvider::Microsoft => "microsoft",
            FederatedProvider::GitHub => "github",
            FederatedProvider::OpenShift => "openshift-v3",
            FederatedProvider::Other(alias) => alias,
        }
    }

    pub(crate) fn storage_key(&self) -> String {
        format!("{}_token", self.as_str())
    }
}

impl From<&str> for FederatedProvider {
    fn from(alias: &str) -> Self {
        match alias {
            "google" => FederatedProvider::Google,
            "microsoft" => FederatedProvider::Microsoft,
            "github" => FederatedProvider::GitHub,
            "openshift-v3" => FederatedProvider::OpenShift,
            other => FederatedProvider::Other(other.to_owned()),
        }
    }
}

impl Display for FederatedProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Snafu)]
pub enum ExchangeError {
    #[snafu(display("ExchangeError: Could not derive broker token endpoint"))]
    Url { source: UrlError },

    #[snafu(display("ExchangeError: Broker token request failed"))]
    Request { source: Arc<RequestError> },
}

pub type ExchangeResult = Result<Option<AccessToken>, ExchangeError>;

type SharedExchange = Shared<LocalBoxFuture<'static, ExchangeResult>>;

#[derive(Default)]
struct Slot {
    latest: Rc<LatestValue<AccessToken>>,
    in_flight: Option<SharedExchange>,
}

/// Exchanges the primary access token for tokens of federated providers.
///
/// Keeps the latest token of every provider, replaying it to subscribers. Concurrent requests
/// for the same provider share a single HTTP call.
#[derive(Clone)]
pub struct FederatedTokenExchanger {
    inner: Rc<Inner>,
}

struct Inner {
    options: Rc<AuthenticationOptions>,
    client: reqwest::Client,
    store: TokenStore,
    broadcaster: Broadcaster,
    slots: RefCell<HashMap<FederatedProvider, Slot>>,
    version: VersionCounter,
}

impl std::fmt::Debug for FederatedTokenExchanger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedTokenExchanger")
            .field("providers", &self.inner.slots.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FederatedTokenExchanger {
    pub fn new(
        options: Rc<AuthenticationOptions>,
        client: reqwest::Client,
        store: TokenStore,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                options,
                client,
                store,
                broadcaster,
                slots: RefCell::new(HashMap::new()),
                version: VersionCounter::default(),
            }),
        }
    }

    /// Token of `provider`, exchanging `access_token` for it if none is known yet.
    ///
    /// Resolves to `Ok(None)` if the broker holds no token for the user (400), after
    /// broadcasting `noFederatedToken`.
    pub async fn get(&self, provider: FederatedProvider, access_token: &str) -> ExchangeResult {
        if let Some(token) = self.cached(&provider) {
            tracing::trace!(%provider, "Serving cached federated token.");
            return Ok(Some(token));
        }
        self.exchange(provider, access_token)?.await
    }

    /// Re-exchange the tokens of all providers requested in this session or subscribed to.
    pub async fn refresh_all(&self, access_token: &str) {
        let providers = self.providers();
        if providers.is_empty() {
            return;
        }
        tracing::debug!(?providers, "Re-exchanging federated tokens.");
        let exchanges = providers
            .into_iter()
            .filter_map(|provider| match self.exchange(provider.clone(), access_token) {
                Ok(exchange) => Some(exchange.map(move |result| (provider, result))),
                Err(err) => {
                    tracing::warn!(%provider, ?err, "Could not start federated token exchange.");
                    None
                }
            });
        for (provider, result) in join_all(exchanges).await {
            if let Err(err) = result {
                tracing::warn!(%provider, ?err, "Federated token exchange failed.");
            }
        }
    }

    /// Receive the current token of `provider` (if any) and all future ones.
    pub fn subscribe(
        &self,
        provider: FederatedProvider,
        listener: impl Fn(&AccessToken) + 'static,
    ) -> Subscription {
        self.latest(&provider).subscribe(listener)
    }

    /// Forget all federated tokens. Exchanges still running will not publish their result.
    ///
    /// Providers nobody subscribed to are forgotten as well, so the next session only exchanges
    /// tokens it asks for.
    pub fn clear(&self) {
        self.inner.version.increment();
        let slots: Vec<(FederatedProvider, Rc<LatestValue<AccessToken>>)> = {
            let mut slots = self.inner.slots.borrow_mut();
            let cleared = slots
                .iter_mut()
                .map(|(provider, slot)| {
                    slot.in_flight = None;
                    (provider.clone(), slot.latest.clone())
                })
                .collect();
            slots.retain(|_, slot| slot.latest.subscriber_count() > 0);
            cleared
        };
        for (provider, latest) in slots {
            latest.clear();
            self.inner.store.clear_federated_token(&provider);
        }
        for provider in &self.inner.options.advanced.federated_providers {
            self.inner.store.clear_federated_token(provider);
        }
    }

    /// Providers whose tokens are kept up to date by `refresh_all`.
    pub fn providers(&self) -> Vec<FederatedProvider> {
        self.inner.slots.borrow().keys().cloned().collect()
    }

    fn latest(&self, provider: &FederatedProvider) -> Rc<LatestValue<AccessToken>> {
        self.inner
            .slots
            .borrow_mut()
            .entry(provider.clone())
            .or_default()
            .latest
            .clone()
    }

    fn cached(&self, provider: &FederatedProvider) -> Option<AccessToken> {
        let latest = self.latest(provider);
        if let Some(token) = latest.get() {
            return Some(token);
        }
        let persisted = self.inner.store.federated_token(provider)?;
        tracing::trace!(%provider, "Restoring persisted federated token.");
        latest.set(persisted.clone());
        Some(persisted)
    }

    /// Join the running exchange for `provider` or start a new one.
    fn exchange(
        &self,
        provider: FederatedProvider,
        access_token: &str,
    ) -> Result<SharedExchange, ExchangeError> {
        let mut slots = self.inner.slots.borrow_mut();
        let slot = slots.entry(provider.clone()).or_default();
        if let Some(in_flight) = &slot.in_flight {
            tracing::trace!(%provider, "Joining running federated token exchange.");
            return Ok(in_flight.clone());
        }

        let endpoint = self
            .inner
            .options
            .broker_token_endpoint(&provider)
            .map_err(|source| ExchangeError::Url { source })?;
        let client = self.inner.client.clone();
        let weak = Rc::downgrade(&self.inner);
        let version = self.inner.version.current();
        let access_token = access_token.to_owned();
        let exchange = async move {
            let result = request::retrieve_broker_token(&client, endpoint, &access_token).await;
            let Some(inner) = weak.upgrade() else {
                return Ok(None);
            };
            FederatedTokenExchanger { inner }.complete(provider, version, result)
        }
        .boxed_local()
        .shared();
        slot.in_flight = Some(exchange.clone());
        Ok(exchange)
    }

    fn complete(
        &self,
        provider: FederatedProvider,
        version: SessionVersion,
        result: Result<Token, RequestError>,
    ) -> ExchangeResult {
        if !self.inner.version.is_current(version) {
            tracing::trace!(%provider, "Session changed during exchange. Dropping result.");
            return Ok(None);
        }
        let latest = {
            let mut slots = self.inner.slots.borrow_mut();
            let slot = slots.entry(provider.clone()).or_default();
            slot.in_flight = None;
            slot.latest.clone()
        };
        match result {
            Ok(token) => {
                tracing::debug!(%provider, "Received federated token.");
                self.inner
                    .store
                    .save_federated_token(&provider, &token.access_token);
                latest.set(token.access_token.clone());
                Ok(Some(token.access_token))
            }
            Err(RequestError::ErrResponse { failure }) if failure.status == StatusCode::BAD_REQUEST => {
                tracing::debug!(%provider, "Broker holds no token for this user.");
                self.inner
                    .broadcaster
                    .broadcast(AuthEvent::NoFederatedToken(failure));
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(%provider, ?err, "Could not exchange federated token.");
                Err(ExchangeError::Request {
                    source: Arc::new(err),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use assertr::prelude::*;
    use url::Url;

    use super::*;
    use crate::{
        broadcaster::Topic,
        config::AdvancedOptions,
        storage::{MemoryStorage, Storage},
        test_support::EventLog,
    };

    struct Fixture {
        server: mockito::ServerGuard,
        storage: Rc<MemoryStorage>,
        broadcaster: Broadcaster,
        exchanger: FederatedTokenExchanger,
    }

    async fn fixture() -> Fixture {
        let server = mockito::Server::new_async().await;
        let options = AuthenticationOptions {
            api_url: Url::parse(&server.url()).unwrap(),
            sso_url: Url::parse(&server.url()).unwrap(),
            realm: "openfact".to_owned(),
            advanced: AdvancedOptions::default(),
        };
        let storage = Rc::new(MemoryStorage::new());
        let broadcaster = Broadcaster::new();
        let exchanger = FederatedTokenExchanger::new(
            Rc::new(options),
            reqwest::Client::new(),
            TokenStore::new(storage.clone()),
            broadcaster.clone(),
        );
        Fixture {
            server,
            storage,
            broadcaster,
            exchanger,
        }
    }

    #[test]
    fn provider_aliases() {
        assert_that(FederatedProvider::Google.as_str()).is_equal_to("google");
        assert_that(FederatedProvider::OpenShift.as_str()).is_equal_to("openshift-v3");
        assert_that(FederatedProvider::from("github")).is_equal_to(FederatedProvider::GitHub);
        assert_that(FederatedProvider::from("gitlab"))
            .is_equal_to(FederatedProvider::Other("gitlab".to_owned()));
        assert_that(FederatedProvider::Microsoft.storage_key())
            .is_equal_to("microsoft_token".to_owned());
    }

    #[tokio::test]
    async fn successful_exchange_is_persisted_and_published() {
        let mut f = fixture().await;
        let mock = f
            .server
            .mock("GET", "/realms/openfact/broker/google/token")
            .match_header("authorization", "Bearer primary")
            .with_status(200)
            .with_body(r#"{"access_token":"google-token"}"#)
            .expect(1)
            .create_async()
            .await;
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _subscription = {
            let seen = seen.clone();
            f.exchanger
                .subscribe(FederatedProvider::Google, move |token| {
                    seen.borrow_mut().push(token.clone())
                })
        };

        let token = f.exchanger.get(FederatedProvider::Google, "primary").await;
        let cached = f.exchanger.get(FederatedProvider::Google, "primary").await;

        mock.assert_async().await;
        assert_that(token.unwrap()).is_equal_to(Some("google-token".to_owned()));
        assert_that(cached.unwrap()).is_equal_to(Some("google-token".to_owned()));
        assert_that(f.storage.get_item("google_token")).is_equal_to(Some("google-token".to_owned()));
        assert_that(seen.borrow().clone()).is_equal_to(vec!["google-token".to_owned()]);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_exchange() {
        let mut f = fixture().await;
        let mock = f
            .server
            .mock("GET", "/realms/openfact/broker/google/token")
            .with_status(200)
            .with_body(r#"{"access_token":"google-token"}"#)
            .expect(1)
            .create_async()
            .await;

        let (first, second) = futures_util::future::join(
            f.exchanger.get(FederatedProvider::Google, "primary"),
            f.exchanger.get(FederatedProvider::Google, "primary"),
        )
        .await;

        mock.assert_async().await;
        assert_that(first.unwrap()).is_equal_to(Some("google-token".to_owned()));
        assert_that(second.unwrap()).is_equal_to(Some("google-token".to_owned()));
    }

    #[tokio::test]
    async fn bad_request_yields_none_and_broadcasts() {
        let mut f = fixture().await;
        let _mock = f
            .server
            .mock("GET", "/realms/openfact/broker/microsoft/token")
            .with_status(400)
            .with_body("identity provider link not found")
            .create_async()
            .await;
        let log = EventLog::attach(&f.broadcaster);

        let token = f.exchanger.get(FederatedProvider::Microsoft, "primary").await;

        assert_that(token.unwrap()).is_equal_to(None);
        assert_that(log.count(Topic::NoFederatedToken)).is_equal_to(1);
        match log.events().first() {
            Some(AuthEvent::NoFederatedToken(failure)) => {
                assert_that(failure.status).is_equal_to(StatusCode::BAD_REQUEST);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_that(f.storage.get_item("microsoft_token")).is_equal_to(None);
    }

    #[tokio::test]
    async fn server_error_is_an_error() {
        let mut f = fixture().await;
        let _mock = f
            .server
            .mock("GET", "/realms/openfact/broker/google/token")
            .with_status(500)
            .create_async()
            .await;
        let log = EventLog::attach(&f.broadcaster);

        let token = f.exchanger.get(FederatedProvider::Google, "primary").await;

        assert_that(token.is_err()).is_true();
        assert_that(log.events().is_empty()).is_true();
    }

    #[tokio::test]
    async fn persisted_token_is_served_without_request() {
        let mut f = fixture().await;
        let mock = f
            .server
            .mock("GET", "/realms/openfact/broker/google/token")
            .expect(0)
            .create_async()
            .await;
        f.storage.set_item("google_token", "persisted");

        let token = f.exchanger.get(FederatedProvider::Google, "primary").await;

        mock.assert_async().await;
        assert_that(token.unwrap()).is_equal_to(Some("persisted".to_owned()));
    }

    #[tokio::test]
    async fn clear_forgets_tokens_and_keys() {
        let mut f = fixture().await;
        let mock = f
            .server
            .mock("GET", "/realms/openfact/broker/google/token")
            .with_status(200)
            .with_body(r#"{"access_token":"google-token"}"#)
            .expect(2)
            .create_async()
            .await;
        f.storage.set_item("microsoft_token", "left over");

        f.exchanger
            .get(FederatedProvider::Google, "primary")
            .await
            .unwrap();
        f.exchanger.clear();

        assert_that(f.storage.get_item("google_token")).is_equal_to(None);
        assert_that(f.storage.get_item("microsoft_token")).is_equal_to(None);

        let token = f.exchanger.get(FederatedProvider::Google, "primary").await;
        mock.assert_async().await;
        assert_that(token.unwrap()).is_equal_to(Some("google-token".to_owned()));
    }

    #[tokio::test]
    async fn refresh_all_re_exchanges_known_providers() {
        let mut f = fixture().await;
        let google = f
            .server
            .mock("GET", "/realms/openfact/broker/google/token")
            .match_header("authorization", "Bearer refreshed")
            .with_status(200)
            .with_body(r#"{"access_token":"new-google-token"}"#)
            .expect(1)
            .create_async()
            .await;
        f.storage.set_item("google_token", "old-google-token");
        f.exchanger
            .get(FederatedProvider::Google, "primary")
            .await
            .unwrap();

        f.exchanger.refresh_all("refreshed").await;

        google.assert_async().await;
        let token = f.exchanger.get(FederatedProvider::Google, "refreshed").await;
        assert_that(token.unwrap()).is_equal_to(Some("new-google-token".to_owned()));
    }

    #[tokio::test]
    async fn next_session_only_exchanges_subscribed_providers() {
        let mut f = fixture().await;
        let google = f
            .server
            .mock("GET", "/realms/openfact/broker/google/token")
            .with_status(200)
            .with_body(r#"{"access_token":"google-token"}"#)
            .expect(1)
            .create_async()
            .await;
        let github = f
            .server
            .mock("GET", "/realms/openfact/broker/github/token")
            .with_status(200)
            .with_body(r#"{"access_token":"github-token"}"#)
            .expect(1)
            .create_async()
            .await;
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _subscription = {
            let seen = seen.clone();
            f.exchanger
                .subscribe(FederatedProvider::GitHub, move |token| {
                    seen.borrow_mut().push(token.clone())
                })
        };
        let log = EventLog::attach(&f.broadcaster);
        f.exchanger
            .get(FederatedProvider::Google, "first-user")
            .await
            .unwrap();

        f.exchanger.clear();
        assert_that(f.exchanger.providers()).is_equal_to(vec![FederatedProvider::GitHub]);
        f.exchanger.refresh_all("other-user").await;

        google.assert_async().await;
        github.assert_async().await;
        assert_that(log.count(Topic::NoFederatedToken)).is_equal_to(0);
        assert_that(seen.borrow().clone()).is_equal_to(vec!["github-token".to_owned()]);
    }
}
