//! The rehydrate/sync pipeline: restores persisted slices into reducer state
//! at startup and persists selected slices after every update.

pub mod adapter;
pub mod config;
pub mod rehydrate;
pub mod reviver;
pub mod sync;
