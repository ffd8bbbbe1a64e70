//! Catalog entries and the in-memory index keyed by version.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ArchitectureInfo;
use crate::version::KernelVersion;

/// Build metadata read from a version's `summary.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    /// Machine the build ran on (`build-host`).
    pub host: Option<String>,
    /// Architectures that were built and tested (`testsets`).
    pub archs: Vec<String>,
    /// Source-control series (`series`).
    pub series: Option<String>,
    /// Commit identifier (`commit`).
    pub commit: Option<String>,
    /// Human label of the commit (`commit-label`).
    pub commit_label: Option<String>,
    /// Commit subject line (`commit-title`).
    pub commit_title: Option<String>,
    /// Commit timestamp (`commit-time`).
    pub commit_time: Option<DateTime<Utc>>,
    /// Full commit hash (`commit-hash`).
    pub commit_hash: Option<String>,
    /// Build start (`start-time`).
    pub start_time: Option<DateTime<Utc>>,
    /// Build end (`end-time`).
    pub end_time: Option<DateTime<Utc>>,
    /// Directory the summary belongs to.
    pub listing_url: String,
    /// URL the summary was read from.
    pub summary_url: String,
}

/// One published kernel version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Version key without the `v` prefix, e.g. `5.16` or `5.13.1`.
    pub version: String,
    /// Directory URL of the version on the mainline server.
    pub url: String,
    /// Release date from the listing; the epoch when unknown.
    pub date: DateTime<Utc>,
    /// Lazily loaded build summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<BuildSummary>,
    /// Architectures resolved so far.
    #[serde(default)]
    pub archs: BTreeMap<String, ArchitectureInfo>,
}

impl CatalogEntry {
    /// A listing entry with nothing resolved yet.
    pub fn new(version: impl Into<String>, url: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            version: version.into(),
            url: url.into(),
            date,
            summary: None,
            archs: BTreeMap::new(),
        }
    }

    /// Parsed version key for ordering.
    pub fn kernel_version(&self) -> KernelVersion {
        KernelVersion::parse(&self.version)
    }
}

/// Process-scoped index of every known version.
///
/// Append-mostly: merging a fresh listing never removes entries.
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    entries: HashMap<String, CatalogEntry>,
}

impl CatalogIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge listing entries: unseen versions are added, known versions keep
    /// their resolved data. Returns how many versions were new.
    pub fn merge_listing(&mut self, listing: impl IntoIterator<Item = CatalogEntry>) -> usize {
        let mut added = 0;
        for entry in listing {
            if let Entry::Vacant(slot) = self.entries.entry(entry.version.clone()) {
                slot.insert(entry);
                added += 1;
            }
        }
        added
    }

    /// Look up a version.
    pub fn get(&self, version: &str) -> Option<&CatalogEntry> {
        self.entries.get(version)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, version: &str) -> Option<&mut CatalogEntry> {
        self.entries.get_mut(version)
    }

    /// Whether the version is known.
    pub fn contains(&self, version: &str) -> bool {
        self.entries.contains_key(version)
    }

    /// Number of known versions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no versions are known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Entries sorted oldest version first.
    pub fn sorted_by_version(&self) -> Vec<&CatalogEntry> {
        let mut entries: Vec<&CatalogEntry> = self.entries.values().collect();
        entries.sort_by_cached_key(|e| e.kernel_version());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: &str) -> CatalogEntry {
        CatalogEntry::new(
            version,
            format!("https://example.test/v{version}"),
            DateTime::<Utc>::UNIX_EPOCH,
        )
    }

    #[test]
    fn merge_preserves_resolved_entries() {
        let mut index = CatalogIndex::new();
        assert_eq!(index.merge_listing([entry("5.13"), entry("5.13.1")]), 2);

        index
            .get_mut("5.13")
            .unwrap()
            .archs
            .insert("amd64".to_string(), ArchitectureInfo::new("amd64"));

        assert_eq!(index.merge_listing([entry("5.13"), entry("5.14")]), 1);
        assert_eq!(index.len(), 3);
        assert!(index.get("5.13").unwrap().archs.contains_key("amd64"));
    }

    #[test]
    fn sorted_by_version_is_numeric() {
        let mut index = CatalogIndex::new();
        index.merge_listing([entry("5.10"), entry("5.9"), entry("5.10-rc1")]);
        let versions: Vec<&str> = index
            .sorted_by_version()
            .into_iter()
            .map(|e| e.version.as_str())
            .collect();
        assert_eq!(versions, ["5.9", "5.10-rc1", "5.10"]);
    }
}
