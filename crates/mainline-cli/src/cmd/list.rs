//! List command

use anyhow::{Context as _, Result, bail};
use futures::StreamExt;
use mainline_core::ListingFilter;
use mainline_schema::CatalogEntry;

use super::Context;
use crate::system_arch;
use crate::ui::table::{ListColumns, ListingRow, listing_table};

/// List kernel versions in the filter's date range, newest last.
///
/// The optional columns need each version's summary or manifest; those are
/// fetched up to `concurrency` at a time.
pub async fn list(
    ctx: &Context,
    filter: &ListingFilter,
    columns: ListColumns,
    json: bool,
) -> Result<()> {
    ctx.repo
        .reload_listing()
        .await
        .with_context(|| format!("Failed to read the listing at {}", ctx.repo.url()))?;
    let entries = ctx.repo.listing(filter);
    if entries.is_empty() {
        bail!("No kernels matching the given criteria were found");
    }

    let rows: Vec<ListingRow<'_>> = futures::stream::iter(&entries)
        .map(|entry| listing_row(ctx, entry, columns))
        .buffered(ctx.config.concurrency)
        .collect()
        .await;

    if json {
        let resolved: Vec<CatalogEntry> = entries
            .iter()
            .map(|e| ctx.repo.entry(&e.version).unwrap_or_else(|| e.clone()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    println!("{}", listing_table(&rows, columns));
    Ok(())
}

/// Resolve what the optional columns need. Failures leave the cell empty.
async fn listing_row<'a>(
    ctx: &Context,
    entry: &'a CatalogEntry,
    columns: ListColumns,
) -> ListingRow<'a> {
    let mut row = ListingRow {
        entry,
        archs: Vec::new(),
        variants: Vec::new(),
    };

    if columns.archs {
        match ctx.repo.summary(&entry.version).await {
            Ok(summary) => row.archs = summary.archs,
            Err(e) => tracing::warn!("No summary for {}: {e}", entry.version),
        }
    }

    if columns.variants {
        let arch = [system_arch().to_string()];
        match ctx.repo.info(&entry.version, Some(arch.as_slice()), false).await {
            Ok(resolved) => {
                for name in resolved.archs.values().flat_map(|a| &a.variants) {
                    if !row.variants.contains(name) {
                        row.variants.push(name.clone());
                    }
                }
            }
            Err(e) => tracing::warn!("Could not resolve {}: {e}", entry.version),
        }
    }

    row
}
