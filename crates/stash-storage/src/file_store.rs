use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use stash_core::storage::{Storage, StorageError};
use tempfile::NamedTempFile;
use tracing::instrument;

/// One file per key under a root directory. Writes are atomic (temp file plus
/// rename) so a crash mid-sync never leaves a half-written entry; key names
/// are base64-encoded so arbitrary names stay filesystem-safe.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }
}

impl Storage for FileStorage {
    #[instrument(skip_all, fields(key))]
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::backend(err)),
        };
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(StorageError::backend)?;
        Ok(Some(contents))
    }

    #[instrument(skip_all, fields(key))]
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        write_entry(&self.root, &self.path_for(key), value)
    }

    #[instrument(skip_all, fields(key))]
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::backend(err)),
        }
    }
}

fn write_entry(root: &Path, path: &Path, value: &str) -> Result<(), StorageError> {
    fs::create_dir_all(root).map_err(StorageError::backend)?;
    let mut tmp = NamedTempFile::new_in(root).map_err(StorageError::backend)?;
    tmp.write_all(value.as_bytes())
        .map_err(StorageError::backend)?;
    tmp.flush().map_err(StorageError::backend)?;
    tmp.persist(path).map_err(|e| StorageError::backend(e.error))?;
    Ok(())
}

fn sanitize_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

/// Platform data directory for the file store. An explicit helper the caller
/// passes in, not a process-wide default.
pub fn default_data_dir() -> Result<PathBuf, StorageError> {
    let base = dirs::data_dir().ok_or_else(|| StorageError::backend("no data dir available"))?;
    Ok(base.join("stash"))
}
