//! Remote text fetching and per-URL memoisation.
//!
//! Listings, summaries and checksum manifests are small text documents that
//! never change once published, so [`TextCache`] keeps every successful
//! response for as long as the cache object lives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("Error fetching {url}: {status}")]
    Transport { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Source of remote text documents.
#[async_trait]
pub trait RemoteText: Send + Sync {
    /// Fetch `url` and return its body as text.
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<T: RemoteText + ?Sized> RemoteText for Arc<T> {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        (**self).get_text(url).await
    }
}

/// Build the HTTP client used for catalog and artifact requests.
pub fn http_client() -> Client {
    Client::builder()
        .user_agent(crate::USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// [`RemoteText`] over plain HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpText {
    client: Client,
}

impl HttpText {
    pub fn new() -> Self {
        Self::with_client(http_client())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpText {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteText for HttpText {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("GET {url}");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Transport {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

/// Memoising wrapper around a [`RemoteText`].
///
/// Concurrent requests for the same URL share one in-flight fetch. Failures
/// are not remembered, so a later call retries.
#[derive(Debug)]
pub struct TextCache<F> {
    inner: F,
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<str>>>>>,
}

impl<F: RemoteText> TextCache<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch `url`, or return the text remembered from an earlier call.
    pub async fn get(&self, url: &str) -> Result<Arc<str>, FetchError> {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cells.entry(url.to_string()).or_default())
        };

        if let Some(text) = cell.get() {
            tracing::trace!("Memoised {url}");
            return Ok(Arc::clone(text));
        }

        let text = cell
            .get_or_try_init(|| async { self.inner.get_text(url).await.map(Arc::from) })
            .await?;
        Ok(Arc::clone(text))
    }

    /// Number of URLs with a remembered response.
    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every remembered response.
    pub fn clear(&self) {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}
