use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use thiserror::Error;

/// Errors produced by storage implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying medium failure (quota, I/O, poisoned lock, ...).
    #[error("storage failure: {reason}")]
    Backend { reason: String },
}

impl StorageError {
    pub fn backend(reason: impl ToString) -> Self {
        StorageError::Backend {
            reason: reason.to_string(),
        }
    }
}

/// Contract for the string key/value medium state slices are persisted to.
///
/// Synchronous by design: sync runs inline after every state update and must
/// complete before control returns to the caller. A missing entry is `Ok(None)`
/// from `get`, not an error; `remove` is idempotent.
pub trait Storage: Send + Sync {
    /// Read the stored string for a key, `None` when nothing is stored.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Persist a string under a key, overwriting any existing entry.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key and its value (idempotent).
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store for tests and smoke runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.inner.lock().map_err(|err| StorageError::Backend {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.inner.lock().map_err(|err| StorageError::Backend {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.inner.lock().map_err(|err| StorageError::Backend {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_overwrites() {
        let store = InMemoryStorage::new();
        store.set("session", "{\"token\":1}").expect("set");
        assert_eq!(
            store.get("session").expect("get").as_deref(),
            Some("{\"token\":1}")
        );

        store.set("session", "{\"token\":2}").expect("overwrite");
        assert_eq!(
            store.get("session").expect("get").as_deref(),
            Some("{\"token\":2}")
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_key_is_none_not_error() {
        let store = InMemoryStorage::new();
        assert_eq!(store.get("absent").expect("get"), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = InMemoryStorage::new();
        store.set("k", "v").expect("set");
        store.remove("k").expect("remove");
        store.remove("k").expect("remove again");
        assert!(store.is_empty());
    }
}
