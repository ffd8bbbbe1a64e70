//! Subcommand implementations.

pub mod cache;
pub mod download;
pub mod list;
pub mod show;

use anyhow::{Context as _, Result};
use mainline_core::{Config, ContentStore, HttpText, MainlineRepo};

/// What every command needs: the settings and a resolver for the server.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub repo: MainlineRepo<HttpText>,
}

impl Context {
    /// Load the configuration; `repo_url` wins over the configured server.
    pub fn load(repo_url: Option<String>) -> Result<Self> {
        let mut config = Config::load().context("Failed to load configuration")?;
        if let Some(url) = repo_url {
            config.url = url;
        }
        tracing::debug!("Using {} with home {}", config.url, config.home.display());
        let repo = MainlineRepo::new(config.url.clone(), HttpText::new());
        Ok(Self { config, repo })
    }

    /// Open the download cache.
    pub fn store(&self) -> Result<ContentStore> {
        let root = self.config.cache_dir();
        ContentStore::with_root(&root)
            .with_context(|| format!("Failed to open cache at {}", root.display()))
    }
}
