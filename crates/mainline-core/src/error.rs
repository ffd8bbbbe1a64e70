//! Errors raised while resolving the catalog.

use mainline_schema::SchemaError;
use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// Unknown version, architecture or variant.
    #[error("{0} not found")]
    NotFound(String),

    /// A manifest entry has no usable digest.
    #[error("Could not determine checksum of package \"{package}\"")]
    IntegrityMissing { package: String },

    #[error("Invalid checksum for package \"{package}\": {reason}")]
    InvalidDigest { package: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Malformed listing, summary or manifest.
    #[error("Failed to parse {url}: {message}")]
    Parse { url: String, message: String },
}

impl CatalogError {
    pub fn parse(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

impl From<SchemaError> for CatalogError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::IntegrityMissing { package } => Self::IntegrityMissing { package },
            SchemaError::InvalidDigest { package, source } => Self::InvalidDigest {
                package,
                reason: source.to_string(),
            },
        }
    }
}
