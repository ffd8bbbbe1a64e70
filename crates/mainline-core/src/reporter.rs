//! Reporter trait for dependency injection
//!
//! Lets the download pipeline report progress without being coupled to a
//! particular terminal or GUI rendering.

use crate::telemetry::TransferStats;

/// One progress event for a transfer.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Identifies the transfer across events; unique per [`crate::Downloader`].
    pub id: u64,
    pub url: String,
    pub stats: TransferStats,
    /// The bytes come from the content store, not the network.
    pub from_cache: bool,
}

pub trait Reporter: Send + Sync {
    /// Bytes arrived for an in-flight transfer.
    fn downloading(&self, progress: &DownloadProgress);

    /// A transfer finished, or was served from the store.
    fn done(&self, progress: &DownloadProgress);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn downloading(&self, progress: &DownloadProgress) {
        (**self).downloading(progress);
    }
    fn done(&self, progress: &DownloadProgress) {
        (**self).done(progress);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn downloading(&self, _: &DownloadProgress) {}
    fn done(&self, _: &DownloadProgress) {}
    fn warning(&self, _: &str) {}
}
