//! mainline - browse and download Ubuntu mainline kernel builds
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Thin command-line front end over `mainline-core`.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.mainline/
//! ├── config.toml   # optional settings
//! └── cache/        # content store (index/, content/, tmp/)
//! ```

pub mod cmd;
pub mod ui;

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

/// Variant downloaded when none is named.
pub const DEFAULT_VARIANT: &str = "generic";

#[derive(Debug, Parser)]
#[command(name = "mainline")]
#[command(author, version, about = "Browse and download Ubuntu mainline kernel builds")]
pub struct Cli {
    /// Mainline server URL, overriding the configured one
    #[arg(long, global = true, value_name = "URL")]
    pub repo: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List published kernel versions
    List {
        /// Only versions released on or after this date
        #[arg(long, value_parser = parse_date_arg)]
        after: Option<DateTime<Utc>>,
        /// Only versions released on or before this date
        #[arg(long, value_parser = parse_date_arg)]
        before: Option<DateTime<Utc>>,
        /// Number of newest versions to show
        #[arg(short = 'n', long, short_alias = 'l')]
        limit: Option<String>,
        /// Add a column with the architectures each build covers
        #[arg(short = 'A', long)]
        archs: bool,
        /// Add a column with the variants built for this machine's architecture
        #[arg(short = 'V', long)]
        variants: bool,
        /// Print JSON instead of a table
        #[arg(short, long)]
        json: bool,
    },
    /// Show the builds published for a version
    Show {
        /// Kernel version, e.g. 5.16 or v5.16-rc3
        version: String,
        /// Architecture to resolve (repeatable, defaults to this machine)
        #[arg(short, long = "arch")]
        archs: Vec<String>,
        /// Resolve every architecture in the build summary
        #[arg(long, conflicts_with = "archs")]
        all: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Download the packages of a version
    Download {
        /// Kernel version, e.g. 5.16 or v5.16-rc3
        version: String,
        /// Architecture (repeatable, defaults to this machine)
        #[arg(short, long = "arch")]
        archs: Vec<String>,
        /// Variant (repeatable, defaults to generic)
        #[arg(short = 'v', long = "variant")]
        variants: Vec<String>,
        /// Copy the packages here; without it they stay in the cache
        output_dir: Option<PathBuf>,
        /// Replace files that already exist in the output directory
        #[arg(short = 'o', long)]
        overwrite: bool,
    },
    /// Manage the download cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// Delete every cached file
    Clear,
    /// List cached files
    Inspect,
    /// Re-hash cached files and report problems
    Verify,
}

/// Debian name of the architecture this binary runs on.
pub fn system_arch() -> &'static str {
    debian_arch(std::env::consts::ARCH)
}

fn debian_arch(rust_arch: &str) -> &str {
    match rust_arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "armhf",
        "powerpc64" => "ppc64el",
        "riscv64" | "riscv64gc" => "riscv64",
        other => other,
    }
}

/// Accept `YYYY`, `YYYY-MM`, `YYYY-MM-DD` or RFC 3339.
pub fn parse_date_arg(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let padded = match raw.matches('-').count() {
        0 => format!("{raw}-01-01"),
        1 => format!("{raw}-01"),
        _ => raw.to_string(),
    };
    NaiveDate::parse_from_str(&padded, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date '{raw}' (expected YYYY, YYYY-MM, YYYY-MM-DD or RFC 3339)"))
}

/// Strip the `v` the server puts in front of directory names.
pub fn normalize_version(raw: &str) -> &str {
    raw.trim().strip_prefix('v').unwrap_or(raw.trim())
}
