//! Core abstractions for stash: the persistence-key model and storage contracts.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod keys;
pub mod storage;
pub mod warn;

/// Full application state as a JSON object, keyed by top-level slice name.
pub type State = serde_json::Map<String, serde_json::Value>;
