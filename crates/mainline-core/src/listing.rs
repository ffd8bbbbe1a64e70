//! Root directory listing of the mainline server.
//!
//! The listing is an Apache-style HTML index. Each kernel is an anchor whose
//! href is `v<major>.<minor>[.<patch>][-suffix]/`, followed by the release
//! date in the next table cell.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use mainline_schema::CatalogEntry;
use regex::Regex;

/// Marker put on builds that must not be used.
const DO_NOT_USE_MARKER: &str = "dontuse";

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap()
});

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+\.\d+(\.\d+)?-?.*").unwrap());

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\d{4}-\d{2}-\d{2}(?:[ T]\d{2}:\d{2}(?::\d{2})?)?|\d{2}-[A-Za-z]{3}-\d{4}(?: \d{2}:\d{2})?",
    )
    .unwrap()
});

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d-%b-%Y %H:%M",
];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Parse the listing page into catalog entries.
///
/// Entries keep listing order; duplicates are left for the index merge to
/// drop. Missing or unparseable dates become the Unix epoch.
pub fn parse_listing(html: &str, base_url: &str) -> Vec<CatalogEntry> {
    let anchors: Vec<_> = ANCHOR_RE.captures_iter(html).collect();
    let mut entries = Vec::new();

    for (i, caps) in anchors.iter().enumerate() {
        let href = caps[1].trim();
        let text = &caps[2];
        if !VERSION_RE.is_match(href) || is_marked_unusable(href) || is_marked_unusable(text) {
            continue;
        }

        let whole = caps.get(0).map_or(0, |m| m.end());
        let next = anchors
            .get(i + 1)
            .and_then(|c| c.get(0))
            .map_or(html.len(), |m| m.start());
        let sibling = TAG_RE.replace_all(&html[whole..next], " ");

        let version = href
            .strip_prefix('v')
            .unwrap_or(href)
            .trim_end_matches('/')
            .to_string();
        let date = parse_date(&sibling).unwrap_or_else(|| {
            tracing::debug!("No release date for {version}, defaulting to epoch");
            DateTime::<Utc>::UNIX_EPOCH
        });
        entries.push(CatalogEntry::new(
            version,
            join_url(base_url, href.trim_end_matches('/')),
            date,
        ));
    }

    entries
}

fn is_marked_unusable(s: &str) -> bool {
    s.to_ascii_lowercase().contains(DO_NOT_USE_MARKER)
}

/// Read the first date-like token from the text that follows an anchor.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let token = DATE_RE.find(text)?.as_str();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(token, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%d-%b-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(token, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Join a path segment onto a base URL with exactly one `/` between them.
pub fn join_url(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const BASE: &str = "https://kernel.ubuntu.com/~kernel-ppa/mainline";

    fn row(href: &str, date: &str) -> String {
        format!(
            r#"<tr><td valign="top"><img src="/icons/folder.gif" alt="[DIR]"></td><td><a href="{href}">{href}</a></td><td align="right">{date}  </td><td align="right">  - </td><td>&nbsp;</td></tr>"#
        )
    }

    #[test]
    fn accepts_versions_and_skips_dontuse() {
        let html = format!(
            "<table><tr><th><a href=\"?C=N;O=D\">Name</a></th></tr>\n{}\n{}\n{}\n{}</table>",
            row("v5.13/", "2021-03-01 12:00"),
            row("v5.13.1/", "2021-03-10 08:30"),
            row("v5.13-dontuse/", "2021-03-02 00:00"),
            row("daily/", "2021-03-11 00:00"),
        );

        let entries = parse_listing(&html, BASE);
        let versions: Vec<&str> = entries.iter().map(|e| e.version.as_str()).collect();
        assert_eq!(versions, ["5.13", "5.13.1"]);

        assert_eq!(entries[0].url, format!("{BASE}/v5.13"));
        assert_eq!(entries[0].date.month(), 3);
        assert_eq!(entries[0].date.day(), 1);
        assert_eq!(entries[1].date.day(), 10);
        assert_eq!(entries[1].date.hour(), 8);
    }

    #[test]
    fn link_text_marker_is_excluded() {
        let html = r#"<a href="v5.14/">v5.14 (dontuse)</a> 2021-08-29 22:11"#;
        assert!(parse_listing(html, BASE).is_empty());
    }

    #[test]
    fn missing_date_defaults_to_epoch() {
        let html = r#"<pre><a href="v5.15-rc1/">v5.15-rc1/</a>      -    </pre>"#;
        let entries = parse_listing(html, BASE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, "5.15-rc1");
        assert_eq!(entries[0].date, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn preformatted_listing_dates_are_read() {
        let html = "<pre><a href=\"v4.19/\">v4.19/</a>   22-Oct-2018 09:13    -\n\
                    <a href=\"v4.20/\">v4.20/</a>   24-Dec-2018 01:02    -\n</pre>";
        let entries = parse_listing(html, BASE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].date.year(), 2018);
        assert_eq!(entries[0].date.day(), 22);
        assert_eq!(entries[1].date.month(), 12);
    }

    #[test]
    fn join_url_uses_single_slash() {
        assert_eq!(join_url("https://a/b/", "/c"), "https://a/b/c");
        assert_eq!(join_url("https://a/b", "c/CHECKSUMS"), "https://a/b/c/CHECKSUMS");
    }
}
