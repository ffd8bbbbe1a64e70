//! Show command

use anyhow::{Context as _, Result};
use crossterm::style::Stylize;

use super::Context;
use crate::ui::table::build_table;
use crate::{normalize_version, system_arch};

/// Resolve a version and print what it publishes per architecture.
///
/// Architectures that fail are shown with their warning instead of aborting
/// the command.
pub async fn show(
    ctx: &Context,
    version: &str,
    archs: &[String],
    all: bool,
    json: bool,
) -> Result<()> {
    let version = normalize_version(version);
    ctx.repo
        .reload_listing()
        .await
        .with_context(|| format!("Failed to read the listing at {}", ctx.repo.url()))?;

    let wanted = if all {
        None
    } else if archs.is_empty() {
        Some(vec![system_arch().to_string()])
    } else {
        Some(archs.to_vec())
    };
    let mut entry = ctx
        .repo
        .info(version, wanted.as_deref(), false)
        .await
        .with_context(|| format!("Failed to resolve kernel {version}"))?;
    if let Some(wanted) = &wanted {
        entry.archs.retain(|name, _| wanted.contains(name));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    println!("{}", build_table(&entry));
    for arch in entry.archs.values() {
        if let Some(warning) = &arch.warning {
            eprintln!("  {} {}: {warning}", "warning:".yellow(), arch.name);
        }
    }
    Ok(())
}
