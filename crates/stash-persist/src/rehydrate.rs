use serde_json::Value;
use stash_core::{
    keys::CanonicalKey,
    storage::{Storage, StorageError},
    warn::WarnSink,
    State,
};
use thiserror::Error;
use tracing::instrument;

use crate::reviver::{date_reviver, revive};

/// Rehydrate failures propagate: this runs once at setup, where a broken
/// medium or corrupt entry must be visible rather than silently dropped.
#[derive(Debug, Error)]
pub enum RehydrateError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("persisted value for key {key} is not valid JSON")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read every persisted key back into a state mapping.
///
/// Keys with nothing stored contribute no entry at all. Duplicate names are
/// processed left to right, later results overwriting earlier ones. Per key
/// the stored string goes through decrypt (when the cipher pair resolves),
/// JSON parse with the effective reviver (default: date revival), then the
/// key's deserializer. Never writes to storage.
#[instrument(skip_all, fields(keys = keys.len()))]
pub fn rehydrate<S: Storage>(
    keys: &[CanonicalKey],
    storage: &S,
    warn: &dyn WarnSink,
) -> Result<State, RehydrateError> {
    let mut restored = State::new();
    for key in keys {
        let name = key.name();
        let Some(raw) = storage.get(name)? else {
            continue;
        };
        let raw = match key.cipher(warn) {
            Some((_, decrypt)) => decrypt(&raw),
            None => raw,
        };
        let parsed: Value =
            serde_json::from_str(&raw).map_err(|source| RehydrateError::Parse {
                key: name.to_string(),
                source,
            })?;
        let revived = match key.reviver() {
            Some(custom) => revive(parsed, custom.as_ref()),
            None => revive(parsed, &date_reviver),
        };
        let value = match key.deserializer() {
            Some(deserialize) => deserialize(revived),
            None => revived,
        };
        restored.insert(name.to_string(), value);
    }
    Ok(restored)
}
