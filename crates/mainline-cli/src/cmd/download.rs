//! Download command

use std::path::Path;

use anyhow::{Context as _, Result, bail};
use crossterm::style::Stylize;
use futures::{StreamExt, TryStreamExt};
use mainline_core::{Downloader, Fetched};
use mainline_schema::{CatalogEntry, PackageInfo, PackageRole};
use tokio::io::AsyncWriteExt;

use super::Context;
use crate::ui::progress::ConsoleReporter;
use crate::{DEFAULT_VARIANT, normalize_version, system_arch};

/// Fetch every package of the chosen variants into the cache, then copy them
/// to `output_dir` if one is given.
pub async fn download(
    ctx: &Context,
    version: &str,
    archs: &[String],
    variants: &[String],
    output_dir: Option<&Path>,
    overwrite: bool,
) -> Result<()> {
    let version = normalize_version(version);
    let archs = if archs.is_empty() {
        vec![system_arch().to_string()]
    } else {
        archs.to_vec()
    };
    let variants = if variants.is_empty() {
        vec![DEFAULT_VARIANT.to_string()]
    } else {
        variants.to_vec()
    };

    ctx.repo
        .reload_listing()
        .await
        .with_context(|| format!("Failed to read the listing at {}", ctx.repo.url()))?;
    let entry = ctx
        .repo
        .info(version, Some(archs.as_slice()), true)
        .await
        .with_context(|| format!("Failed to resolve kernel {version}"))?;

    let mut packages = select_packages(&entry, &archs, &variants)?;
    if let Some(dir) = output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        if !overwrite {
            packages.retain(|pkg| {
                let exists = dir.join(&pkg.deb).exists();
                if exists {
                    println!("  {} {} (exists)", "skip".dark_grey(), pkg.deb);
                }
                !exists
            });
        }
    }
    if packages.is_empty() {
        println!("  Nothing to download.");
        return Ok(());
    }

    let downloader = Downloader::new(ctx.store()?, ConsoleReporter::new());
    let fetched: Vec<(PackageInfo, Fetched)> = futures::stream::iter(packages)
        .map(|pkg| {
            let downloader = &downloader;
            async move {
                let fetched = downloader
                    .fetch_or_cached(&pkg.url, Some(&pkg.hash))
                    .await
                    .with_context(|| format!("Failed to download {}", pkg.deb))?;
                Ok::<_, anyhow::Error>((pkg, fetched))
            }
        })
        .buffer_unordered(ctx.config.concurrency)
        .try_collect()
        .await?;

    let report = downloader.verify_store().await?;
    if !report.is_clean() {
        eprintln!(
            "  {} cache has problems; run 'mainline cache verify'",
            "warning:".yellow()
        );
    }

    match output_dir {
        Some(dir) => {
            for (pkg, mut fetched) in fetched {
                copy_out(&mut fetched.file, &dir.join(&pkg.deb)).await?;
            }
            println!("  Saved to {}", dir.display());
        }
        None => {
            for (pkg, fetched) in &fetched {
                let path = downloader.store().content_path(fetched.info.integrity());
                println!("  {}  {}", pkg.deb, path.display().to_string().dark_grey());
            }
        }
    }
    Ok(())
}

/// Packages to fetch for every `arch` x `variant`, shared headers once.
///
/// A signed image replaces the unsigned one.
fn select_packages(
    entry: &CatalogEntry,
    archs: &[String],
    variants: &[String],
) -> Result<Vec<PackageInfo>> {
    let mut selected: Vec<PackageInfo> = Vec::new();
    for arch in archs {
        let Some(info) = entry.archs.get(arch) else {
            bail!("Kernel {} has no {arch} builds", entry.version);
        };
        for name in variants {
            let Some(variant) = info.variant(name) else {
                bail!(
                    "Kernel {} has no {name} variant for {arch} (available: {})",
                    entry.version,
                    info.variants.join(", ")
                );
            };
            if !variant.is_installable() {
                bail!("{arch}/{name} has no kernel image");
            }
            for (role, pkg) in variant.files.iter() {
                if role == PackageRole::ImageUnsigned && variant.files.image.is_some() {
                    continue;
                }
                if !selected.iter().any(|p| p.url == pkg.url) {
                    selected.push(pkg.clone());
                }
            }
        }
    }
    Ok(selected)
}

/// Copy a cached file out, replacing `dest` only once the copy is complete.
async fn copy_out(source: &mut tokio::fs::File, dest: &Path) -> Result<()> {
    let partial = dest.with_extension("deb.part");
    let mut out = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    tokio::io::copy(source, &mut out).await?;
    out.flush().await?;
    drop(out);
    tokio::fs::rename(&partial, dest)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(())
}
