//! Cache maintenance commands

use anyhow::{Result, bail};
use crossterm::style::Stylize;
use mainline_core::{Downloader, NullReporter};

use super::Context;
use crate::ui::format_size;
use crate::ui::table::cache_table;

/// Delete every cached file.
pub fn clear(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let entries = store.list()?;
    let bytes: u64 = entries.iter().map(|e| e.size).sum();
    store.clear()?;
    println!(
        "  Removed {} cached files, {}.",
        entries.len(),
        format_size(bytes)
    );
    Ok(())
}

/// List cached files.
pub fn inspect(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let entries = store.list()?;
    if entries.is_empty() {
        println!();
        println!("  Cache is empty ({}).", store.root().display());
        return Ok(());
    }
    let bytes: u64 = entries.iter().map(|e| e.size).sum();
    println!("{}", cache_table(&entries));
    println!(
        "{}",
        format!("  {} files, {}", entries.len(), format_size(bytes)).dark_grey()
    );
    Ok(())
}

/// Re-hash every cached file; fails if anything is wrong.
pub async fn verify(ctx: &Context) -> Result<()> {
    let downloader = Downloader::new(ctx.store()?, NullReporter);
    let report = downloader.verify_store().await?;

    println!(
        "  Checked {} files, {}.",
        report.entries,
        format_size(report.bytes)
    );
    for key in &report.corrupt {
        println!("  {} {key}", "corrupt".red());
    }
    for key in &report.missing {
        println!("  {} {key}", "missing".red());
    }
    for path in &report.unreadable {
        println!("  {} {}", "unreadable".yellow(), path.display());
    }
    for path in &report.orphaned {
        println!("  {} {}", "orphaned".dark_grey(), path.display());
    }

    if !report.is_clean() {
        bail!("Cache has problems; run 'mainline cache clear' to start over");
    }
    println!("  {}", "Cache is healthy.".green());
    Ok(())
}
