//! User configuration.
//!
//! Read from `<home>/config.toml`; every field is optional. Environment
//! variables win over the file.

use std::path::{Path, PathBuf};

use mainline_schema::UBUNTU_MAINLINE_URL;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths;

/// Environment variable overriding the mainline server URL.
pub const URL_ENV: &str = "MAINLINE_URL";

const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the mainline directory listing.
    pub url: String,
    /// Data directory holding the content store.
    pub home: PathBuf,
    /// Parallel downloads.
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: UBUNTU_MAINLINE_URL.to_string(),
            home: paths::mainline_home(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&paths::config_path())?;
        if let Ok(url) = std::env::var(URL_ENV) {
            config.url = url;
        }
        if let Some(home) = std::env::var_os(paths::HOME_ENV) {
            config.home = PathBuf::from(home);
        }
        Ok(config)
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(text)?;
        config.concurrency = config.concurrency.max(1);
        Ok(config)
    }

    /// Content store root.
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }
}
