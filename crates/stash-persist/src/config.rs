use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use stash_core::keys::{Indent, KeyOptions, RawKey};

/// User-level configuration loaded from `~/.config/stash/config.toml`
/// (platform-specific). Declarative key specs cover names, field filters and
/// indentation; function-valued hooks stay programmatic.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the file store's root directory.
    pub data_dir: Option<PathBuf>,
    /// Restore persisted slices at startup.
    #[serde(default)]
    pub rehydrate: bool,
    /// Remove storage entries for keys whose slice is absent.
    #[serde(default)]
    pub remove_on_missing: bool,
    /// Slices to persist.
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct KeyConfig {
    pub name: String,
    /// Top-level fields to persist, in this order.
    #[serde(default)]
    pub filter: Option<Vec<String>>,
    /// Pretty-print stored JSON with this many spaces per level.
    #[serde(default)]
    pub indent: Option<u8>,
}

impl Config {
    /// Convert the declarative key specs into raw persistence keys.
    pub fn raw_keys(&self) -> Vec<RawKey> {
        self.keys
            .iter()
            .map(|key| {
                if key.filter.is_none() && key.indent.is_none() {
                    return RawKey::bare(key.name.clone());
                }
                let mut options = KeyOptions::new();
                options.filter = key.filter.clone();
                options.space = key.indent.map(Indent::Spaces);
                RawKey::with_options(key.name.clone(), options)
            })
            .collect()
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| anyhow::anyhow!("no config dir available"))?;
    Ok(base.join("stash").join("config.toml"))
}

/// Write the given config to the default path unless a file already exists,
/// to avoid clobbering user edits.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    let path = default_path()?;
    write_to_path_if_missing(config, &path)?;
    Ok(path)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(())
}
