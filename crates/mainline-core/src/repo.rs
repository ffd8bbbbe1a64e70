//! Catalog resolver for the mainline directory tree.
//!
//! ```text
//! <url>/                           listing of v<version>/ directories
//! <url>/v<version>/summary.yaml    build summary
//! <url>/v<version>/<arch>/CHECKSUMS
//! ```
//!
//! Every document is fetched through a [`TextCache`] owned by the repo, so
//! repeated lookups never hit the network twice.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use futures::future::{join_all, try_join_all};
use mainline_schema::{
    ArchitectureInfo, BuildSummary, CatalogEntry, CatalogIndex, PackageInfo, PackageRole,
};

use crate::error::CatalogError;
use crate::fetch::{RemoteText, TextCache};
use crate::listing::{join_url, parse_listing};
use crate::manifest::{PackagePattern, PatternOptions, match_all, match_first};
use crate::summary::parse_summary;

const SUMMARY_FILE: &str = "summary.yaml";
const CHECKSUMS_FILE: &str = "CHECKSUMS";

/// Number of versions listed when no limit or date range is given.
pub const DEFAULT_LISTING_LIMIT: usize = 5;

/// Selection of listing entries by release date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ListingFilter {
    /// How many of the newest matches to keep; `None` keeps all.
    ///
    /// Without an explicit limit a closed date range is unbounded and
    /// anything else shows [`DEFAULT_LISTING_LIMIT`] entries.
    pub fn effective_limit(&self) -> Option<usize> {
        match (self.limit, self.after, self.before) {
            (Some(n), _, _) => Some(n),
            (None, Some(_), Some(_)) => None,
            _ => Some(DEFAULT_LISTING_LIMIT),
        }
    }

    /// Parse a user-supplied limit; unparseable input falls back to the default.
    pub fn parse_limit(raw: &str) -> usize {
        raw.trim().parse().unwrap_or_else(|_| {
            tracing::debug!("Ignoring limit {raw:?}, using {DEFAULT_LISTING_LIMIT}");
            DEFAULT_LISTING_LIMIT
        })
    }

    fn contains(&self, date: DateTime<Utc>) -> bool {
        self.after.is_none_or(|after| date >= after) && self.before.is_none_or(|before| date <= before)
    }
}

/// Resolver over one mainline server.
#[derive(Debug)]
pub struct MainlineRepo<F> {
    url: String,
    texts: TextCache<F>,
    index: RwLock<CatalogIndex>,
}

impl<F: RemoteText> MainlineRepo<F> {
    pub fn new(url: impl Into<String>, fetcher: F) -> Self {
        Self {
            url: url.into(),
            texts: TextCache::new(fetcher),
            index: RwLock::new(CatalogIndex::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn texts(&self) -> &TextCache<F> {
        &self.texts
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the root listing and merge it into the index.
    ///
    /// Known versions keep whatever was resolved for them; nothing is removed.
    /// Returns a snapshot of the merged index.
    pub async fn reload_listing(&self) -> Result<CatalogIndex, CatalogError> {
        let html = self.texts.get(&self.url).await?;
        let entries = parse_listing(&html, &self.url);
        let mut index = self.write();
        let added = index.merge_listing(entries);
        tracing::debug!("Listing has {} versions ({added} new)", index.len());
        Ok(index.clone())
    }

    /// Snapshot of one version.
    pub fn entry(&self, version: &str) -> Option<CatalogEntry> {
        self.read().get(version).cloned()
    }

    /// Known versions, oldest first.
    pub fn versions_sorted(&self) -> Vec<String> {
        self.read()
            .sorted_by_version()
            .into_iter()
            .map(|e| e.version.clone())
            .collect()
    }

    /// Listing entries inside the filter's date range, oldest version first,
    /// truncated to the newest [`ListingFilter::effective_limit`] entries.
    pub fn listing(&self, filter: &ListingFilter) -> Vec<CatalogEntry> {
        let index = self.read();
        let mut matched: Vec<CatalogEntry> = index
            .sorted_by_version()
            .into_iter()
            .filter(|e| filter.contains(e.date))
            .cloned()
            .collect();
        if let Some(limit) = filter.effective_limit() {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    fn entry_url(&self, version: &str) -> Result<String, CatalogError> {
        self.read()
            .get(version)
            .map(|e| e.url.clone())
            .ok_or_else(|| CatalogError::NotFound(format!("Kernel {version}")))
    }

    /// Build summary of `version`, fetched on first use.
    pub async fn summary(&self, version: &str) -> Result<BuildSummary, CatalogError> {
        let url = {
            let index = self.read();
            let entry = index
                .get(version)
                .ok_or_else(|| CatalogError::NotFound(format!("Kernel {version}")))?;
            if let Some(summary) = &entry.summary {
                return Ok(summary.clone());
            }
            entry.url.clone()
        };

        let summary_url = join_url(&url, SUMMARY_FILE);
        let text = self.texts.get(&summary_url).await?;
        let summary = parse_summary(&text, &url, &summary_url)?;

        let mut index = self.write();
        let entry = index
            .get_mut(version)
            .ok_or_else(|| CatalogError::NotFound(format!("Kernel {version}")))?;
        Ok(entry.summary.get_or_insert(summary).clone())
    }

    /// Resolve `version` for `archs`, or every architecture in its summary.
    ///
    /// Architectures already resolved without a warning are not fetched
    /// again. A failing architecture gets a warning on its
    /// [`ArchitectureInfo`] unless `strict` is set, in which case the first
    /// failure is returned and the remaining fetches are dropped.
    pub async fn info(
        &self,
        version: &str,
        archs: Option<&[String]>,
        strict: bool,
    ) -> Result<CatalogEntry, CatalogError> {
        let summary = self.summary(version).await?;
        let wanted: Vec<String> = archs.map_or_else(|| summary.archs.clone(), <[String]>::to_vec);

        let pending: Vec<&String> = {
            let index = self.read();
            let entry = index
                .get(version)
                .ok_or_else(|| CatalogError::NotFound(format!("Kernel {version}")))?;
            wanted
                .iter()
                .filter(|a| entry.archs.get(a.as_str()).is_none_or(|i| i.warning.is_some()))
                .collect()
        };

        if strict {
            try_join_all(pending.iter().map(|a| self.resolve_arch(version, a))).await?;
        } else {
            let results = join_all(pending.iter().map(|a| self.resolve_arch(version, a))).await;
            for (arch, result) in pending.iter().zip(results) {
                if let Err(e) = result {
                    tracing::warn!("Failed to resolve {version} for {arch}: {e}");
                    self.record_warning(version, arch, &e);
                }
            }
        }

        self.entry(version)
            .ok_or_else(|| CatalogError::NotFound(format!("Kernel {version}")))
    }

    /// Resolve one architecture, failing on any error.
    pub async fn arch_info(
        &self,
        version: &str,
        arch: &str,
    ) -> Result<ArchitectureInfo, CatalogError> {
        if let Some(info) = self
            .entry(version)
            .and_then(|mut e| e.archs.remove(arch))
            .filter(|i| i.warning.is_none())
        {
            return Ok(info);
        }
        self.resolve_arch(version, arch).await
    }

    /// One artifact, straight from the manifest. `variant` may be `all` for
    /// shared headers.
    pub async fn package(
        &self,
        version: &str,
        arch: &str,
        role: PackageRole,
        variant: &str,
    ) -> Result<PackageInfo, CatalogError> {
        let arch_url = join_url(&self.entry_url(version)?, arch);
        let text = self.texts.get(&join_url(&arch_url, CHECKSUMS_FILE)).await?;
        let pattern = PackagePattern::new(
            role.prefix(),
            PatternOptions {
                version: Some(version.to_string()),
                arch: (role != PackageRole::Headers).then(|| arch.to_string()),
                variant: Some(variant.to_string()),
            },
        );
        match_first(&text, &pattern, &arch_url)?.ok_or_else(|| {
            CatalogError::NotFound(format!("{} for {version} {arch} {variant}", role.prefix()))
        })
    }

    async fn resolve_arch(
        &self,
        version: &str,
        arch: &str,
    ) -> Result<ArchitectureInfo, CatalogError> {
        let arch_url = join_url(&self.entry_url(version)?, arch);
        let text = self.texts.get(&join_url(&arch_url, CHECKSUMS_FILE)).await?;

        let mut info = ArchitectureInfo::new(arch);
        for role in PackageRole::ALL {
            // shared headers are published as arch "all"
            let pattern = PackagePattern::new(
                role.prefix(),
                PatternOptions {
                    version: Some(version.to_string()),
                    arch: (role != PackageRole::Headers).then(|| arch.to_string()),
                    variant: None,
                },
            );
            for pkg in match_all(&text, &pattern, &arch_url)? {
                info.insert(role, pkg);
            }
        }
        info.fan_out_headers();
        tracing::debug!(
            "Resolved {version} {arch}: variants {}",
            info.variants.join(", ")
        );

        let mut index = self.write();
        let entry = index
            .get_mut(version)
            .ok_or_else(|| CatalogError::NotFound(format!("Kernel {version}")))?;
        entry.archs.insert(arch.to_string(), info.clone());
        Ok(info)
    }

    fn record_warning(&self, version: &str, arch: &str, err: &CatalogError) {
        let mut index = self.write();
        if let Some(entry) = index.get_mut(version) {
            entry
                .archs
                .entry(arch.to_string())
                .or_insert_with(|| ArchitectureInfo::new(arch))
                .warning = Some(err.to_string());
        }
    }
}
