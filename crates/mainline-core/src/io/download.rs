//! Cached downloads with progress reporting.
//!
//! Bodies stream into the [`ContentStore`] while a [`Transfer`] tracks
//! progress. Callers always get a handle on the committed store entry, never
//! the live response.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use mainline_schema::Integrity;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::io::store::{ContentStore, EntryInfo, StoreError, StoreReader, VerifyReport};
use crate::reporter::{DownloadProgress, Reporter};
use crate::telemetry::{TelemetryError, Transfer};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Error fetching {url}: {status}")]
    Transport { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// A committed store entry ready for reading.
#[derive(Debug)]
pub struct Fetched {
    /// No network request was made.
    pub from_cache: bool,
    pub info: EntryInfo,
    pub file: tokio::fs::File,
}

type KeyLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Fetches URLs through the content store, at most one request per URL at a
/// time.
#[derive(Debug)]
pub struct Downloader<R: Reporter> {
    client: Client,
    store: ContentStore,
    reporter: R,
    in_flight: KeyLocks,
    next_id: AtomicU64,
}

impl<R: Reporter> Downloader<R> {
    pub fn new(store: ContentStore, reporter: R) -> Self {
        Self::with_client(crate::fetch::http_client(), store, reporter)
    }

    pub fn with_client(client: Client, store: ContentStore, reporter: R) -> Self {
        Self {
            client,
            store,
            reporter,
            in_flight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Serve `url` from the store, or download and store it first.
    ///
    /// A stored entry is used only if its content still hashes to the
    /// recorded digest and satisfies `expected`; anything else is a miss.
    /// Concurrent calls for the same URL wait for the first one and are then
    /// served from the store.
    pub async fn fetch_or_cached(
        &self,
        url: &str,
        expected: Option<&Integrity>,
    ) -> Result<Fetched, DownloadError> {
        let _guard = self.lock_key(url).await;

        if let Some(hit) = self.cached(url, expected).await? {
            return Ok(hit);
        }
        self.fetch(url, expected).await
    }

    /// Integrity sweep over the whole store.
    pub async fn verify_store(&self) -> Result<VerifyReport, DownloadError> {
        let store = self.store.clone();
        let report = tokio::task::spawn_blocking(move || store.verify())
            .await
            .map_err(io::Error::other)??;
        Ok(report)
    }

    async fn lock_key(&self, url: &str) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(url.to_string()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        KeyGuard {
            locks: &self.in_flight,
            key: url.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    async fn cached(
        &self,
        url: &str,
        expected: Option<&Integrity>,
    ) -> Result<Option<Fetched>, DownloadError> {
        let reader = match self.store.open(url).await {
            Ok(Some(reader)) => reader,
            Ok(None) => return Ok(None),
            Err(e @ (StoreError::Corruption { .. } | StoreError::Index { .. })) => {
                tracing::warn!("Ignoring cached {url}: {e}");
                self.reporter
                    .warning(&format!("Cached copy of {url} is damaged, refetching"));
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(expected) = expected {
            if !reader.info.satisfies(expected) {
                tracing::warn!("Cached {url} does not match {expected}, refetching");
                return Ok(None);
            }
        }

        tracing::debug!("Cache hit for {url}");
        let StoreReader { info, file } = reader;
        let mut transfer = Transfer::new(Some(info.size));
        transfer.start();
        transfer.update_bytes(info.size)?;
        transfer.finish();
        self.reporter.done(&progress(self.next_id(), url, &transfer, true));

        Ok(Some(Fetched {
            from_cache: true,
            info,
            file,
        }))
    }

    async fn fetch(
        &self,
        url: &str,
        expected: Option<&Integrity>,
    ) -> Result<Fetched, DownloadError> {
        tracing::debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Transport {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let id = self.next_id();
        let mut transfer = Transfer::new(response.content_length());
        let mut writer = self.store.writer(url, expected.cloned())?;
        transfer.start();

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write(&chunk).await?;
            transfer.update_bytes(writer.bytes_written())?;
            self.reporter.downloading(&progress(id, url, &transfer, false));
        }

        let committed = writer.commit().await?;
        transfer.finish();
        self.reporter.done(&progress(id, url, &transfer, false));

        let StoreReader { info, file } =
            self.store
                .open(url)
                .await?
                .ok_or_else(|| StoreError::Corruption {
                    key: url.to_string(),
                    expected: committed.integrity().to_string(),
                    actual: "missing entry".to_string(),
                })?;
        Ok(Fetched {
            from_cache: false,
            info,
            file,
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn progress(id: u64, url: &str, transfer: &Transfer, from_cache: bool) -> DownloadProgress {
    DownloadProgress {
        id,
        url: url.to_string(),
        stats: transfer.stats(),
        from_cache,
    }
}

/// Holds the per-URL lock; drops the registry slot once nobody else wants it.
struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // the map and this guard are the only owners left
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NullReporter;
    use mainline_schema::Algorithm;
    use std::io::Write;
    use tempfile::{TempDir, tempdir};
    use tokio::io::AsyncReadExt;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<(bool, DownloadProgress)>>,
    }

    impl Reporter for Recorder {
        fn downloading(&self, progress: &DownloadProgress) {
            self.events.lock().unwrap().push((false, progress.clone()));
        }
        fn done(&self, progress: &DownloadProgress) {
            self.events.lock().unwrap().push((true, progress.clone()));
        }
        fn warning(&self, _: &str) {}
    }

    fn downloader<R: Reporter>(reporter: R) -> (TempDir, Downloader<R>) {
        let dir = tempdir().unwrap();
        let store = ContentStore::with_root(dir.path().join("cache")).unwrap();
        (dir, Downloader::new(store, reporter))
    }

    async fn body(fetched: Fetched) -> Vec<u8> {
        let mut file = fetched.file;
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_store() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pool/a.deb")
            .with_status(200)
            .with_body("kernel bytes")
            .expect(1)
            .create_async()
            .await;
        let (_dir, dl) = downloader(NullReporter);
        let url = format!("{}/pool/a.deb", server.url());

        let first = dl.fetch_or_cached(&url, None).await.unwrap();
        assert!(!first.from_cache);
        let second = dl.fetch_or_cached(&url, None).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(first.info.integrity(), second.info.integrity());

        assert_eq!(body(first).await, b"kernel bytes");
        assert_eq!(body(second).await, b"kernel bytes");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cancelled_fetch_leaves_no_entry() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pool/slow.deb")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(b"first chunk")?;
                w.flush()?;
                std::thread::sleep(std::time::Duration::from_secs(2));
                w.write_all(b"never read")
            })
            .create_async()
            .await;
        let (dir, dl) = downloader(NullReporter);
        let url = format!("{}/pool/slow.deb", server.url());

        let res = tokio::time::timeout(
            std::time::Duration::from_millis(300),
            dl.fetch_or_cached(&url, None),
        )
        .await;
        assert!(res.is_err());

        assert!(dl.store().info(&url).unwrap().is_none());
        let tmp = dir.path().join("cache").join("tmp");
        assert_eq!(std::fs::read_dir(tmp).unwrap().count(), 0);
        assert!(dl.in_flight.lock().unwrap().is_empty());
        assert!(dl.verify_store().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pool/b.deb")
            .with_status(200)
            .with_body("shared")
            .expect(1)
            .create_async()
            .await;
        let (_dir, dl) = downloader(NullReporter);
        let url = format!("{}/pool/b.deb", server.url());

        let (a, b) = tokio::join!(dl.fetch_or_cached(&url, None), dl.fetch_or_cached(&url, None));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.from_cache, b.from_cache);
        assert_eq!(body(a).await, body(b).await);
        assert!(dl.in_flight.lock().unwrap().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_a_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.deb")
            .with_status(404)
            .create_async()
            .await;
        let (_dir, dl) = downloader(NullReporter);
        let url = format!("{}/missing.deb", server.url());

        let err = dl.fetch_or_cached(&url, None).await.unwrap_err();
        assert!(matches!(err, DownloadError::Transport { status: 404, .. }));
        assert!(dl.store().info(&url).unwrap().is_none());
    }

    #[tokio::test]
    async fn digest_mismatch_is_not_stored() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/c.deb")
            .with_status(200)
            .with_body("tampered")
            .create_async()
            .await;
        let (_dir, dl) = downloader(NullReporter);
        let url = format!("{}/c.deb", server.url());
        let expected = Integrity::compute(Algorithm::Sha256, b"original");

        let err = dl.fetch_or_cached(&url, Some(&expected)).await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::Store(StoreError::IntegrityMismatch { .. })
        ));
        assert!(dl.store().info(&url).unwrap().is_none());
        assert!(dl.verify_store().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn corrupt_entry_is_refetched() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/d.deb")
            .with_status(200)
            .with_body("payload")
            .expect(2)
            .create_async()
            .await;
        let (_dir, dl) = downloader(NullReporter);
        let url = format!("{}/d.deb", server.url());
        let expected = Integrity::compute(Algorithm::Sha1, b"payload");

        let first = dl.fetch_or_cached(&url, Some(&expected)).await.unwrap();
        std::fs::write(dl.store().content_path(first.info.integrity()), b"garbage").unwrap();

        let report = dl.verify_store().await.unwrap();
        assert_eq!(report.corrupt, [url.clone()]);

        let again = dl.fetch_or_cached(&url, Some(&expected)).await.unwrap();
        assert!(!again.from_cache);
        assert_eq!(body(again).await, b"payload");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn progress_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/e.deb")
            .with_status(200)
            .with_body(vec![7u8; 4096])
            .create_async()
            .await;
        let (_dir, dl) = downloader(Recorder::default());
        let url = format!("{}/e.deb", server.url());

        dl.fetch_or_cached(&url, None).await.unwrap();
        dl.fetch_or_cached(&url, None).await.unwrap();

        let events = dl.reporter().events.lock().unwrap();
        let done: Vec<&DownloadProgress> =
            events.iter().filter(|(d, _)| *d).map(|(_, p)| p).collect();
        assert_eq!(done.len(), 2);
        assert!(!done[0].from_cache);
        assert!(done[1].from_cache);
        assert_ne!(done[0].id, done[1].id);
        for p in done {
            assert!(p.stats.finished);
            assert_eq!(p.stats.bytes_completed, 4096);
            assert_eq!(p.stats.percentage, Some(1.0));
            assert_eq!(p.url, url);
        }
        assert!(events.iter().any(|(d, p)| !*d && !p.from_cache));
    }
}
