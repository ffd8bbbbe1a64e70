//! Transfer status lines
//!
//! One line per finished transfer; in-flight progress only goes to the log.

use crossterm::style::Stylize;
use mainline_core::{DownloadProgress, Reporter, filename_from_url};

use super::format_size;

/// [`Reporter`] printing to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for ConsoleReporter {
    fn downloading(&self, progress: &DownloadProgress) {
        tracing::trace!(
            "{} {:.0}% at {}/s",
            filename_from_url(&progress.url),
            progress.stats.percentage.unwrap_or(0.0),
            format_size(progress.stats.bytes_per_second as u64)
        );
    }

    fn done(&self, progress: &DownloadProgress) {
        eprintln!("{}", format_done(progress));
    }

    fn warning(&self, msg: &str) {
        eprintln!("  {} {msg}", "warning:".yellow());
    }
}

/// Format progress status as a bare status word
pub fn format_progress_status(progress: &DownloadProgress) -> String {
    let stats = &progress.stats;
    let status_word = if progress.from_cache {
        "cached"
    } else if stats.finished {
        "fetched"
    } else if stats.bytes_completed == 0 {
        "queued"
    } else {
        "fetching"
    };

    format!("{status_word:<9}")
}

fn format_done(progress: &DownloadProgress) -> String {
    let stats = &progress.stats;
    let name = filename_from_url(&progress.url);
    let size = format_size(stats.bytes_completed);
    if progress.from_cache {
        return format!(
            "  {} {name}  {}",
            format_progress_status(progress).dark_grey(),
            size.dark_grey()
        );
    }
    format!(
        "  {} {name}  {}",
        format_progress_status(progress).green(),
        format!(
            "{size} in {:.1}s, {}/s",
            stats.elapsed.as_secs_f64(),
            format_size(stats.bytes_per_second as u64)
        )
        .dark_grey()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mainline_core::Transfer;

    fn progress(transfer: &Transfer, from_cache: bool) -> DownloadProgress {
        DownloadProgress {
            id: 1,
            url: "https://mirror.test/v5.16/amd64/linux-image.deb".to_string(),
            stats: transfer.stats(),
            from_cache,
        }
    }

    #[test]
    fn test_progress_status_format() {
        let mut transfer = Transfer::new(Some(1024));
        assert!(format_progress_status(&progress(&transfer, false)).contains("queued"));

        transfer.start();
        transfer.update_bytes(512).unwrap();
        assert!(format_progress_status(&progress(&transfer, false)).contains("fetching"));

        transfer.update_bytes(1024).unwrap();
        transfer.finish();
        assert!(format_progress_status(&progress(&transfer, false)).contains("fetched"));
        assert!(format_progress_status(&progress(&transfer, true)).contains("cached"));
    }

    #[test]
    fn test_progress_status_padding() {
        let transfer = Transfer::new(None);
        assert_eq!(format_progress_status(&progress(&transfer, false)).len(), 9);
    }

    #[test]
    fn done_line_names_the_file() {
        let mut transfer = Transfer::new(Some(2048));
        transfer.start();
        transfer.update_bytes(2048).unwrap();
        transfer.finish();
        let line = format_done(&progress(&transfer, false));
        assert!(line.contains("linux-image.deb"));
        assert!(line.contains("2.0 KiB"));
    }
}
