use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Degraded-but-nonfatal conditions reported by the rehydrate and sync paths.
/// These never interrupt the state-update flow; they are pushed through a
/// [`WarnSink`] so callers can observe them (or assert on them in tests).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Warning {
    /// Only one half of an encrypt/decrypt pair was configured; the pair is
    /// ignored and the key is processed without encryption.
    #[error("key {key}: {present} configured without its counterpart, pair disabled")]
    CipherPairIncomplete { key: String, present: &'static str },
    /// Writing a slice to storage failed.
    #[error("key {key}: write failed: {reason}")]
    WriteFailed { key: String, reason: String },
    /// Removing a stale entry from storage failed.
    #[error("key {key}: remove failed: {reason}")]
    RemoveFailed { key: String, reason: String },
}

impl Warning {
    /// Name of the key the warning is about.
    pub fn key(&self) -> &str {
        match self {
            Warning::CipherPairIncomplete { key, .. }
            | Warning::WriteFailed { key, .. }
            | Warning::RemoveFailed { key, .. } => key,
        }
    }
}

/// Receiver for structured warnings.
pub trait WarnSink: Send + Sync {
    fn warn(&self, warning: Warning);
}

/// Default sink that reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl WarnSink for LogSink {
    fn warn(&self, warning: Warning) {
        tracing::warn!(%warning, "state persistence degraded");
    }
}

/// Capturing sink for tests and smoke runs.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Arc<Mutex<Vec<Warning>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything warned so far.
    pub fn warnings(&self) -> Vec<Warning> {
        self.inner.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings().is_empty()
    }
}

impl WarnSink for MemorySink {
    fn warn(&self, warning: Warning) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.push(warning);
        }
    }
}
