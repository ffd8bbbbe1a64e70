//! Catalog resolution and cached downloads for Ubuntu mainline kernels.
//!
//! [`MainlineRepo`] turns the server's listing, build summaries and
//! `CHECKSUMS` manifests into [`mainline_schema`] records. [`Downloader`]
//! fetches the artifacts those records point at into a content-addressed
//! [`ContentStore`].

pub mod config;
pub mod error;
pub mod fetch;
pub mod io;
pub mod listing;
pub mod manifest;
pub mod paths;
pub mod repo;
pub mod reporter;
pub mod summary;
pub mod telemetry;

pub use config::Config;
pub use error::CatalogError;
pub use fetch::{FetchError, HttpText, RemoteText, TextCache};
pub use io::download::{DownloadError, Downloader, Fetched};
pub use io::store::{ContentStore, EntryInfo, StoreError, VerifyReport};
pub use paths::*;
pub use repo::{DEFAULT_LISTING_LIMIT, ListingFilter, MainlineRepo};
pub use reporter::{DownloadProgress, NullReporter, Reporter};
pub use telemetry::{Transfer, TransferStats};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("mainline-core/", env!("CARGO_PKG_VERSION"));
