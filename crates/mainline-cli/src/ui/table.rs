//! Table rendering for `list`, `show` and `cache inspect`.

use comfy_table::presets::UTF8_HORIZONTAL_ONLY;
use comfy_table::{ContentArrangement, Table};
use mainline_core::{EntryInfo, filename_from_url};
use mainline_schema::{CatalogEntry, ImageStatus};

use super::format_size;

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

/// Optional columns of `mainline list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListColumns {
    pub archs: bool,
    pub variants: bool,
}

/// A listed version plus whatever was resolved for the optional columns.
#[derive(Debug, Clone)]
pub struct ListingRow<'a> {
    pub entry: &'a CatalogEntry,
    pub archs: Vec<String>,
    pub variants: Vec<String>,
}

/// One row per listed version.
pub fn listing_table(rows: &[ListingRow<'_>], columns: ListColumns) -> Table {
    let mut header = vec!["Kernel", "Released"];
    if columns.archs {
        header.push("Archs");
    }
    if columns.variants {
        header.push("Variants");
    }
    header.push("URL");

    let mut table = new_table(&header);
    for row in rows {
        let mut cells = vec![
            row.entry.version.clone(),
            row.entry.date.format("%Y-%m-%d %H:%M").to_string(),
        ];
        if columns.archs {
            cells.push(row.archs.join(", "));
        }
        if columns.variants {
            cells.push(row.variants.join(", "));
        }
        cells.push(row.entry.url.clone());
        table.add_row(cells);
    }
    table
}

fn status_label(status: ImageStatus) -> &'static str {
    match status {
        ImageStatus::Signed => "signed",
        ImageStatus::Unsigned => "unsigned",
        ImageStatus::Missing => "missing",
    }
}

/// Summary of one resolved version.
pub fn build_table(entry: &CatalogEntry) -> Table {
    let summary = entry.summary.as_ref();

    let mut kernel = vec![entry.version.clone()];
    if let Some(series) = summary.and_then(|s| s.series.as_deref()) {
        kernel.push(series.to_string());
    }

    let mut built = Vec::new();
    if let Some(host) = summary.and_then(|s| s.host.as_deref()) {
        built.push(host.to_string());
    }
    let finished = summary.and_then(|s| s.end_time.or(s.start_time));
    built.push(
        finished
            .unwrap_or(entry.date)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
    );

    let mut images = Vec::new();
    for arch in entry.archs.values() {
        if arch.warning.is_some() {
            images.push(format!("{}: unavailable", arch.name));
            continue;
        }
        for name in &arch.variants {
            if let Some(variant) = arch.variant(name) {
                images.push(format!(
                    "{}/{name}: {}",
                    arch.name,
                    status_label(variant.image_status())
                ));
            }
        }
    }
    if images.is_empty() {
        images.push("none".to_string());
    }

    let mut details = Vec::new();
    if let Some(s) = summary {
        if let Some(label) = &s.commit_label {
            details.push(label.clone());
        }
        if let Some(title) = &s.commit_title {
            details.push(title.clone());
        }
        if let Some(hash) = &s.commit_hash {
            details.push(hash.chars().take(12).collect());
        }
    }
    details.push(entry.url.clone());

    let mut table = new_table(&["Kernel", "Built on", "Images", "Details"]);
    table.add_row(vec![
        kernel.join("\n"),
        built.join("\n"),
        images.join("\n"),
        details.join("\n"),
    ]);
    table
}

/// One row per cached file.
pub fn cache_table(entries: &[EntryInfo]) -> Table {
    let mut table = new_table(&["File", "Size", "Cached", "Integrity"]);
    for entry in entries {
        table.add_row(vec![
            filename_from_url(&entry.key).to_string(),
            format_size(entry.size),
            entry.time.format("%Y-%m-%d %H:%M").to_string(),
            entry.integrity().to_string(),
        ]);
    }
    table
}
