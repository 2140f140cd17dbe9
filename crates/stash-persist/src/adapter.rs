use std::{fmt, sync::Arc};

use serde_json::Value;
use stash_core::{
    keys::{normalize, CanonicalKey, KeyError, RawKey},
    storage::Storage,
    warn::{LogSink, WarnSink},
    State,
};
use tracing::debug;

use crate::{
    rehydrate::{rehydrate, RehydrateError},
    sync::sync_state,
};

/// Discriminant of the initialization action. Dispatching it merges the
/// rehydrated state over the reducer's own initial state.
pub const INIT_KIND: &str = "@@stash/INIT";

/// A dispatched action: a discriminant plus an arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: String,
    pub payload: Value,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// The initialization action.
    pub fn init() -> Self {
        Self::new(INIT_KIND)
    }

    pub fn is_init(&self) -> bool {
        self.kind == INIT_KIND
    }
}

/// Builder for the persistence adapter. Key validation happens here, before
/// any storage access; a bad key list halts construction.
pub struct Persist<S> {
    keys: Vec<CanonicalKey>,
    storage: S,
    rehydrate_on_start: bool,
    remove_on_missing: bool,
    warn: Arc<dyn WarnSink>,
}

impl<S> fmt::Debug for Persist<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persist")
            .field("keys", &self.keys)
            .field("rehydrate_on_start", &self.rehydrate_on_start)
            .field("remove_on_missing", &self.remove_on_missing)
            .finish_non_exhaustive()
    }
}

impl<S: Storage> Persist<S> {
    pub fn new(raw: Vec<RawKey>, storage: S) -> Result<Self, KeyError> {
        let keys = normalize(raw)?;
        debug!(keys = keys.len(), "persistence keys validated");
        Ok(Self {
            keys,
            storage,
            rehydrate_on_start: false,
            remove_on_missing: false,
            warn: Arc::new(LogSink),
        })
    }

    /// Convenience constructor with stale-entry removal preset.
    pub fn pruning(raw: Vec<RawKey>, storage: S) -> Result<Self, KeyError> {
        Self::new(raw, storage).map(|persist| persist.remove_on_missing(true))
    }

    /// Restore persisted slices when the reducer is wrapped (default off).
    pub fn rehydrate_on_start(mut self, enabled: bool) -> Self {
        self.rehydrate_on_start = enabled;
        self
    }

    /// Remove the storage entry for keys whose slice is absent (default off).
    pub fn remove_on_missing(mut self, enabled: bool) -> Self {
        self.remove_on_missing = enabled;
        self
    }

    /// Route degraded-condition warnings somewhere other than `tracing`.
    pub fn warn_sink(mut self, sink: Arc<dyn WarnSink>) -> Self {
        self.warn = sink;
        self
    }

    /// Wrap a reducer with rehydrate-then-sync behavior. Rehydration happens
    /// here, exactly once, before the first reduction; its failures propagate.
    pub fn wrap<R>(self, reducer: R) -> Result<PersistedReducer<S, R>, RehydrateError>
    where
        R: Fn(Option<&State>, &Action) -> State,
    {
        let restored = if self.rehydrate_on_start {
            let restored = rehydrate(&self.keys, &self.storage, self.warn.as_ref())?;
            debug!(slices = restored.len(), "rehydrated persisted state");
            Some(restored)
        } else {
            None
        };
        Ok(PersistedReducer {
            inner: reducer,
            keys: self.keys,
            storage: self.storage,
            remove_on_missing: self.remove_on_missing,
            warn: self.warn,
            restored,
        })
    }
}

/// A reducer wrapped with persistence. Every completed reduction is synced to
/// storage before control returns; sync failures degrade to warnings and the
/// in-memory state is always returned intact.
pub struct PersistedReducer<S, R> {
    inner: R,
    keys: Vec<CanonicalKey>,
    storage: S,
    remove_on_missing: bool,
    warn: Arc<dyn WarnSink>,
    restored: Option<State>,
}

impl<S, R> PersistedReducer<S, R>
where
    S: Storage,
    R: Fn(Option<&State>, &Action) -> State,
{
    /// Run one update. For the init action the inner reducer runs on the
    /// un-rehydrated input (producing its own initial state) and restored
    /// values are merged over its output; every later reduction starts from
    /// that merged state. Reducers must not read rehydrated values inside
    /// their init branch.
    pub fn reduce(&self, state: Option<&State>, action: &Action) -> State {
        let mut next = (self.inner)(state, action);
        if action.is_init() {
            if let Some(restored) = &self.restored {
                merge_restored(&mut next, restored);
            }
        }
        sync_state(
            &next,
            &self.keys,
            &self.storage,
            self.remove_on_missing,
            self.warn.as_ref(),
        );
        next
    }

    /// State restored at wrap time, when rehydration was enabled.
    pub fn restored(&self) -> Option<&State> {
        self.restored.as_ref()
    }
}

/// Rehydrated values win, key by key, for the keys they cover.
fn merge_restored(base: &mut State, restored: &State) {
    for (name, value) in restored {
        base.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stash_core::{keys::KeyOptions, storage::InMemoryStorage, warn::MemorySink};

    use super::*;

    fn counter_reducer(state: Option<&State>, action: &Action) -> State {
        let mut next = match state {
            Some(state) => state.clone(),
            None => match json!({"x": 0, "y": 2}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        };
        if action.kind == "bump" {
            let x = next.get("x").and_then(Value::as_i64).unwrap_or(0);
            next.insert("x".into(), json!(x + 1));
        }
        next
    }

    #[test]
    fn init_merges_rehydrated_over_initial_state() {
        let storage = InMemoryStorage::new();
        storage.set("x", "1").expect("seed");

        let reducer = Persist::new(vec![RawKey::bare("x")], storage)
            .expect("persist")
            .rehydrate_on_start(true)
            .wrap(counter_reducer)
            .expect("wrap");

        let state = reducer.reduce(None, &Action::init());
        assert_eq!(state.get("x"), Some(&json!(1)));
        assert_eq!(state.get("y"), Some(&json!(2)));
    }

    #[test]
    fn init_reducer_sees_raw_input_and_merge_applies_to_its_output() {
        let storage = InMemoryStorage::new();
        storage.set("x", "1").expect("seed");

        let reducer = Persist::new(vec![RawKey::bare("x")], storage)
            .expect("persist")
            .rehydrate_on_start(true)
            .wrap(|state: Option<&State>, _action: &Action| {
                // records what the init branch was handed
                let mut next = State::new();
                next.insert("x".into(), json!(0));
                next.insert("input_x".into(), json!(state.and_then(|s| s.get("x")).cloned()));
                next
            })
            .expect("wrap");

        let state = reducer.reduce(None, &Action::init());
        // the reducer itself never saw the rehydrated value...
        assert_eq!(state.get("input_x"), Some(&json!(null)));
        // ...but the state it returned has restored values merged over it
        assert_eq!(state.get("x"), Some(&json!(1)));
    }

    #[test]
    fn without_rehydration_initial_state_stands() {
        let storage = InMemoryStorage::new();
        storage.set("x", "1").expect("seed");

        let reducer = Persist::new(vec![RawKey::bare("x")], storage)
            .expect("persist")
            .wrap(counter_reducer)
            .expect("wrap");

        let state = reducer.reduce(None, &Action::init());
        assert_eq!(state.get("x"), Some(&json!(0)));
        assert!(reducer.restored().is_none());
    }

    #[test]
    fn every_update_syncs_before_returning() {
        let storage = InMemoryStorage::new();
        let reducer = Persist::new(vec![RawKey::bare("x")], storage.clone())
            .expect("persist")
            .wrap(counter_reducer)
            .expect("wrap");

        let state = reducer.reduce(None, &Action::init());
        assert_eq!(storage.get("x").expect("get").as_deref(), Some("0"));

        let state = reducer.reduce(Some(&state), &Action::new("bump"));
        assert_eq!(storage.get("x").expect("get").as_deref(), Some("1"));
        assert_eq!(state.get("x"), Some(&json!(1)));
    }

    #[test]
    fn bad_key_list_halts_construction_before_storage_access() {
        let storage = InMemoryStorage::new();
        let err = Persist::new(vec![RawKey::Bare(json!(true))], storage.clone())
            .expect_err("must fail");
        assert_eq!(err, KeyError::InvalidName { kind: "boolean" });
        assert!(storage.is_empty());
    }

    #[test]
    fn persist_debug_summarizes_without_requiring_storage_debug() {
        struct OpaqueStorage;
        impl Storage for OpaqueStorage {
            fn get(&self, _key: &str) -> Result<Option<String>, stash_core::storage::StorageError> {
                Ok(None)
            }
            fn set(&self, _key: &str, _value: &str) -> Result<(), stash_core::storage::StorageError> {
                Ok(())
            }
            fn remove(&self, _key: &str) -> Result<(), stash_core::storage::StorageError> {
                Ok(())
            }
        }

        let persist = Persist::new(vec![RawKey::bare("x")], OpaqueStorage).expect("persist");
        let rendered = format!("{persist:?}");
        assert!(rendered.contains("Persist"));
        assert!(rendered.contains("remove_on_missing"));
    }

    #[test]
    fn sync_failures_leave_in_memory_state_intact() {
        struct ReadOnlyStorage;
        impl Storage for ReadOnlyStorage {
            fn get(&self, _key: &str) -> Result<Option<String>, stash_core::storage::StorageError> {
                Ok(None)
            }
            fn set(&self, _key: &str, _value: &str) -> Result<(), stash_core::storage::StorageError> {
                Err(stash_core::storage::StorageError::backend("read-only"))
            }
            fn remove(&self, _key: &str) -> Result<(), stash_core::storage::StorageError> {
                Err(stash_core::storage::StorageError::backend("read-only"))
            }
        }

        let sink = MemorySink::new();
        let reducer = Persist::new(vec![RawKey::bare("x")], ReadOnlyStorage)
            .expect("persist")
            .warn_sink(Arc::new(sink.clone()))
            .wrap(counter_reducer)
            .expect("wrap");

        let state = reducer.reduce(None, &Action::init());
        assert_eq!(state.get("x"), Some(&json!(0)));
        assert_eq!(sink.warnings().len(), 1);
        assert_eq!(sink.warnings()[0].key(), "x");
    }

    #[test]
    fn pruning_preset_removes_stale_entries() {
        let storage = InMemoryStorage::new();
        storage.set("gone", "stale").expect("seed");

        let reducer = Persist::pruning(vec![RawKey::bare("gone"), RawKey::bare("x")], storage.clone())
            .expect("persist")
            .wrap(counter_reducer)
            .expect("wrap");

        reducer.reduce(None, &Action::init());
        assert_eq!(storage.get("gone").expect("get"), None);
        assert_eq!(storage.get("x").expect("get").as_deref(), Some("0"));
    }

    #[test]
    fn date_slices_round_trip_through_sync_and_rehydrate() {
        use crate::reviver::parse_datetime;

        let storage = InMemoryStorage::new();
        let original = parse_datetime("2021-05-01T00:00:00").expect("parse");

        let writer = Persist::new(vec![RawKey::bare("session")], storage.clone())
            .expect("persist")
            .wrap(|state: Option<&State>, _action: &Action| {
                state.cloned().unwrap_or_else(|| {
                    match json!({"session": {"saved_at": "2021-05-01T00:00:00"}}) {
                        Value::Object(map) => map,
                        _ => unreachable!(),
                    }
                })
            })
            .expect("wrap");
        writer.reduce(None, &Action::init());

        let reader = Persist::new(vec![RawKey::bare("session")], storage)
            .expect("persist")
            .rehydrate_on_start(true)
            .wrap(counter_reducer)
            .expect("wrap");
        let revived = reader
            .restored()
            .and_then(|state| state.get("session"))
            .and_then(|slice| slice.get("saved_at"))
            .and_then(Value::as_str)
            .and_then(parse_datetime)
            .expect("revived date");
        assert_eq!(revived, original);
    }

    #[test]
    fn filtered_fields_never_reach_storage_or_rehydrate() {
        let storage = InMemoryStorage::new();
        let reducer = Persist::new(
            vec![RawKey::with_options("session", KeyOptions::new().with_filter(["a"]))],
            storage.clone(),
        )
        .expect("persist")
        .wrap(|_: Option<&State>, _: &Action| match json!({"session": {"a": 1, "b": 2}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
        .expect("wrap");
        reducer.reduce(None, &Action::init());
        assert_eq!(
            storage.get("session").expect("get").as_deref(),
            Some("{\"a\":1}")
        );

        let sink = MemorySink::new();
        let keys = normalize(vec![RawKey::bare("session")]).expect("normalize");
        let restored = rehydrate(&keys, &storage, &sink).expect("rehydrate");
        assert_eq!(restored.get("session"), Some(&json!({"a": 1})));
    }
}
