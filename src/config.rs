//! Configuration for Gunny
//!
//! Settings load from `gunny.toml` in the working directory; a missing
//! file means defaults. Unknown keys are tolerated. The store path can
//! also be overridden through the `GUNNY_STORE` environment variable
//! (handy for tests), and the CLI `--store` flag beats both.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::EngineOptions;
use crate::error::{GunnyError, GunnyResult};

/// Config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "gunny.toml";

/// Tunable settings for the CLI and engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GunnyConfig {
    /// Path of the JSON mill-state file
    pub store: PathBuf,
    /// Per-receipt lock acquisition timeout, in milliseconds
    pub lock_timeout_ms: u64,
    /// Automatic retries on contention before surfacing the error
    pub contention_retries: u32,
}

impl Default for GunnyConfig {
    fn default() -> Self {
        Self {
            store: PathBuf::from("gunny.json"),
            lock_timeout_ms: 2000,
            contention_retries: 3,
        }
    }
}

impl GunnyConfig {
    /// Load configuration from `gunny.toml` under `dir`.
    ///
    /// A missing file yields defaults; a malformed file is a `Config`
    /// error rather than a silent fallback.
    pub fn load(dir: &Path) -> GunnyResult<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| GunnyError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        toml::from_str(&content).map_err(|e| GunnyError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Store path after applying the `GUNNY_STORE` environment override
    pub fn store_path(&self) -> PathBuf {
        match std::env::var("GUNNY_STORE") {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => self.store.clone(),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            contention_retries: self.contention_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = GunnyConfig::load(dir.path()).unwrap();
        assert_eq!(config.store, PathBuf::from("gunny.json"));
        assert_eq!(config.lock_timeout_ms, 2000);
        assert_eq!(config.contention_retries, 3);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "lock_timeout_ms = 250\n").unwrap();

        let config = GunnyConfig::load(dir.path()).unwrap();
        assert_eq!(config.lock_timeout_ms, 250);
        assert_eq!(config.contention_retries, 3);
    }

    #[test]
    fn test_unknown_keys_are_tolerated() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "store = \"mill.json\"\nfuture_knob = true\n",
        )
        .unwrap();

        let config = GunnyConfig::load(dir.path()).unwrap();
        assert_eq!(config.store, PathBuf::from("mill.json"));
    }

    #[test]
    fn test_malformed_file_is_a_config_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "lock_timeout_ms = [nope\n").unwrap();

        let err = GunnyConfig::load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_engine_options_mapping() {
        let config = GunnyConfig {
            lock_timeout_ms: 500,
            contention_retries: 7,
            ..GunnyConfig::default()
        };
        let options = config.engine_options();
        assert_eq!(options.lock_timeout, Duration::from_millis(500));
        assert_eq!(options.contention_retries, 7);
    }
}
