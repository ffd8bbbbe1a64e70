//! Per-version `summary.yaml` parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use mainline_schema::BuildSummary;
use serde_yaml_ng::{Mapping, Value};

use crate::error::CatalogError;

/// Parse a build summary document.
///
/// Unknown keys are ignored and unreadable values become `None`; only a
/// document that is not a YAML mapping is an error.
pub fn parse_summary(
    text: &str,
    listing_url: &str,
    summary_url: &str,
) -> Result<BuildSummary, CatalogError> {
    let doc: Value =
        serde_yaml_ng::from_str(text).map_err(|e| CatalogError::parse(summary_url, e))?;
    let map = match doc {
        Value::Mapping(map) => map,
        Value::Null => Mapping::new(),
        other => {
            return Err(CatalogError::parse(
                summary_url,
                format!("expected a mapping, found {}", kind(&other)),
            ));
        }
    };

    Ok(BuildSummary {
        host: string(&map, "build-host"),
        archs: testsets(&map),
        series: string(&map, "series"),
        commit: string(&map, "commit"),
        commit_label: string(&map, "commit-label"),
        commit_title: string(&map, "commit-title"),
        commit_time: time(&map, "commit-time"),
        commit_hash: string(&map, "commit-hash"),
        start_time: time(&map, "start-time"),
        end_time: time(&map, "end-time"),
        listing_url: listing_url.to_string(),
        summary_url: summary_url.to_string(),
    })
}

fn string(map: &Mapping, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `testsets` entries look like `amd64/build`; keep the architecture part.
fn testsets(map: &Mapping) -> Vec<String> {
    let Some(Value::Sequence(items)) = map.get("testsets") else {
        return Vec::new();
    };
    let mut archs: Vec<String> = Vec::new();
    for item in items {
        let Value::String(s) = item else { continue };
        let arch = s.split('/').next().unwrap_or(s).trim();
        if !arch.is_empty() && !archs.iter().any(|a| a == arch) {
            archs.push(arch.to_string());
        }
    }
    archs
}

fn time(map: &Mapping, key: &str) -> Option<DateTime<Utc>> {
    match map.get(key)? {
        Value::Number(n) => DateTime::from_timestamp(n.as_i64()?, 0),
        Value::String(s) => parse_time(s),
        _ => None,
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.and_utc())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const SUMMARY: &str = r"
build-host: kathleen
series: jammy
commit: v5.16
commit-label: 5.16
commit-title: Linux 5.16
commit-time: 1641748200
commit-hash: df0cc57e057f18e44dac8e6c18aba47ab53202f9
start-time: 2022-01-09 18:30:00
end-time: 2022-01-09T19:45:10Z
testsets:
  - amd64/build
  - amd64/boot
  - arm64/build
  - ppc64el/build
";

    #[test]
    fn remaps_fields() {
        let summary = parse_summary(
            SUMMARY,
            "https://example.test/v5.16",
            "https://example.test/v5.16/summary.yaml",
        )
        .unwrap();

        assert_eq!(summary.host.as_deref(), Some("kathleen"));
        assert_eq!(summary.series.as_deref(), Some("jammy"));
        assert_eq!(summary.commit_label.as_deref(), Some("5.16"));
        assert_eq!(summary.commit_title.as_deref(), Some("Linux 5.16"));
        assert_eq!(summary.archs, ["amd64", "arm64", "ppc64el"]);
        assert_eq!(summary.commit_time.unwrap().year(), 2022);
        assert_eq!(summary.start_time.unwrap().hour(), 18);
        assert_eq!(summary.end_time.unwrap().minute(), 45);
        assert_eq!(summary.summary_url, "https://example.test/v5.16/summary.yaml");
    }

    #[test]
    fn missing_and_odd_values_are_none() {
        let summary = parse_summary("start-time: soon\ntestsets: none\n", "u", "u/s").unwrap();
        assert!(summary.start_time.is_none());
        assert!(summary.host.is_none());
        assert!(summary.archs.is_empty());
    }

    #[test]
    fn non_mapping_is_a_parse_error() {
        let err = parse_summary("- a\n- b\n", "u", "u/summary.yaml").unwrap_err();
        assert!(matches!(err, CatalogError::Parse { ref url, .. } if url == "u/summary.yaml"));

        let err = parse_summary("key: [unclosed", "u", "u/summary.yaml").unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }
}
