use std::{cell::RefCell, collections::HashMap, fmt::Debug};

use leptos_use::storage::StorageType;

/// Durable string key-value storage, e.g. the browsers `localStorage`.
///
/// Implementations log failures instead of reporting them. A storage which is not available
/// behaves like an empty storage which forgets everything written to it.
pub trait Storage {
    fn get_item(&self, key: &str) -> Option<String>;

    fn set_item(&self, key: &str, value: &str);

    fn remove_item(&self, key: &str);
}

/// In-memory storage. Used on the server and in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        self.items
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
    }

    fn remove_item(&self, key: &str) {
        self.items.borrow_mut().remove(key);
    }
}

/// Which browser storage holds the tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// `window.localStorage`, shared by all tabs and kept across browser restarts.
    #[default]
    Local,

    /// `window.sessionStorage`, scoped to the current tab.
    Session,
}

impl StorageKind {
    fn storage_type(self) -> StorageType {
        match self {
            StorageKind::Local => StorageType::Local,
            StorageKind::Session => StorageType::Session,
        }
    }
}

/// Storage backed by the browsers local or session storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserStorage {
    kind: StorageKind,
}

impl BrowserStorage {
    pub fn new(kind: StorageKind) -> Self {
        Self { kind }
    }

    fn with_storage<T: Default>(
        &self,
        key: &str,
        f: impl FnOnce(leptos::web_sys::Storage) -> T,
    ) -> T {
        match self.kind.storage_type().into_storage() {
            Ok(Some(storage)) => f(storage),
            Ok(None) => {
                tracing::error!(key, kind = ?self.kind, "Storage not available. Storage returned none.");
                T::default()
            }
            Err(err) => {
                tracing::error!(?err, key, "Storage not available.");
                T::default()
            }
        }
    }
}

impl Storage for BrowserStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.with_storage(key, |storage| {
            storage
                .get_item(key)
                .inspect_err(|err| log_error("read", key, err))
                .ok()
                .flatten()
        })
    }

    fn set_item(&self, key: &str, value: &str) {
        self.with_storage(key, |storage| {
            if let Err(err) = storage.set_item(key, value) {
                log_error("write", key, &err);
            }
        });
    }

    fn remove_item(&self, key: &str) {
        self.with_storage(key, |storage| {
            if let Err(err) = storage.remove_item(key) {
                log_error("remove", key, &err);
            }
        });
    }
}

fn log_error(operation: &str, key: &str, err: &impl Debug) {
    tracing::error!(?err, "Could not {operation} '{key}' in storage.");
}
