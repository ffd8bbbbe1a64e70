//! Shared types for the kernel mainline catalog.
//!
//! The resolver in `mainline-core` produces these; the CLI consumes them.

pub mod catalog;
pub mod hash;
pub mod types;
pub mod version;

// Re-exports
pub use catalog::{BuildSummary, CatalogEntry, CatalogIndex};
pub use hash::{Algorithm, DigestSet, HashError, Integrity, IntegrityHasher};
pub use types::*;
pub use version::KernelVersion;

/// Public directory index of Ubuntu mainline kernel builds.
pub const UBUNTU_MAINLINE_URL: &str = "https://kernel.ubuntu.com/~kernel-ppa/mainline";
