use std::rc::Rc;

use codee::{string::JsonSerdeCodec, Decoder, Encoder};

use crate::{federated::FederatedProvider, storage::Storage, token::TokenData, AccessToken, RefreshToken};

const ACCESS_TOKEN_KEY: &str = "auth_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const TOKEN_DATA_KEY: &str = "auth_token_data";
const INITIALIZED_KEY: &str = "auth_initialized";

/// Persists the current tokens under fixed keys.
///
/// The raw `auth_token` and `refresh_token` entries are kept for other code reading them
/// directly. `auth_token_data` additionally remembers when the access token expires, so that a
/// session restored after a page reload can be refreshed in time.
#[derive(Clone)]
pub struct TokenStore {
    storage: Rc<dyn Storage>,
}

impl TokenStore {
    pub fn new(storage: Rc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn save(&self, token: &TokenData) {
        self.storage.set_item(ACCESS_TOKEN_KEY, &token.access_token);
        match &token.refresh_token {
            Some(refresh_token) => self.storage.set_item(REFRESH_TOKEN_KEY, refresh_token),
            None => self.storage.remove_item(REFRESH_TOKEN_KEY),
        }
        match JsonSerdeCodec::encode(token) {
            Ok(encoded) => self.storage.set_item(TOKEN_DATA_KEY, &encoded),
            Err(err) => {
                tracing::error!(?err, "Could not encode token data. Only raw tokens are stored.");
                self.storage.remove_item(TOKEN_DATA_KEY);
            }
        }
    }

    pub fn clear(&self) {
        self.storage.remove_item(ACCESS_TOKEN_KEY);
        self.storage.remove_item(REFRESH_TOKEN_KEY);
        self.storage.remove_item(TOKEN_DATA_KEY);
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.storage.get_item(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.storage.get_item(REFRESH_TOKEN_KEY)
    }

    /// Previously saved token data. Data which can no longer be decoded is dropped.
    pub fn token_data(&self) -> Option<TokenData> {
        let encoded = self.storage.get_item(TOKEN_DATA_KEY)?;
        match <JsonSerdeCodec as Decoder<TokenData>>::decode(&encoded) {
            Ok(token) => Some(token),
            Err(err) => {
                // Note: A decode error will always come up if we break the persisted type.
                tracing::debug!(
                    ?err,
                    "Data format of '{TOKEN_DATA_KEY}' changed. Removing previously persisted value."
                );
                self.storage.remove_item(TOKEN_DATA_KEY);
                None
            }
        }
    }

    pub fn federated_token(&self, provider: &FederatedProvider) -> Option<AccessToken> {
        self.storage.get_item(&provider.storage_key())
    }

    pub fn save_federated_token(&self, provider: &FederatedProvider, token: &str) {
        self.storage.set_item(&provider.storage_key(), token);
    }

    pub fn clear_federated_token(&self, provider: &FederatedProvider) {
        self.storage.remove_item(&provider.storage_key());
    }

    /// Set the one-shot initialization marker.
    /// Returns `true` if this call set it, `false` if it was already present.
    pub fn mark_initialized(&self) -> bool {
        match self.storage.get_item(INITIALIZED_KEY) {
            Some(_) => false,
            None => {
                self.storage.set_item(INITIALIZED_KEY, "true");
                true
            }
        }
    }
}
