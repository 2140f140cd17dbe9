//! Concrete storage backends for stash. The file store is the production
//! default; the in-memory store for tests lives in `stash-core`.

pub mod file_store;
