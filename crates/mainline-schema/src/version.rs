//! Kernel version ordering.
//!
//! Mainline versions look like `5.13`, `5.13.1` or `5.16-rc4`. They are not
//! strict semver, so ordering is numeric component-wise with a bare release
//! sorting after any of its suffixed pre-releases.

use std::cmp::Ordering;
use std::fmt;

/// A parsed kernel version key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelVersion {
    raw: String,
    parts: Vec<u64>,
    suffix: Option<String>,
}

impl KernelVersion {
    /// Parse a version key. Non-numeric leading text (such as a `v` prefix)
    /// is ignored; anything after the first `-` is the suffix.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches('v').trim_end_matches('/');
        let (numbers, suffix) = match trimmed.split_once('-') {
            Some((n, s)) if !s.is_empty() => (n, Some(s.to_string())),
            Some((n, _)) => (n, None),
            None => (trimmed, None),
        };
        let parts = numbers
            .split('.')
            .map_while(|p| p.parse::<u64>().ok())
            .collect();
        Self {
            raw: raw.to_string(),
            parts,
            suffix,
        }
    }

    /// Numeric components (`[5, 13, 1]`).
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    /// Pre-release or flavour suffix, if any.
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// The string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn suffix_key(suffix: &str) -> (&str, u64, &str) {
        let digits_at = suffix
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(suffix.len());
        let (label, rest) = suffix.split_at(digits_at);
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let number = rest[..digits_end].parse().unwrap_or(0);
        (label, number, &rest[digits_end..])
    }
}

impl Ord for KernelVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        let by_suffix = match (&self.suffix, &other.suffix) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => Self::suffix_key(a).cmp(&Self::suffix_key(b)),
        };

        by_suffix
            .then_with(|| self.parts.len().cmp(&other.parts.len()))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for KernelVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Coerce a loose version string into `major.minor.patch`.
///
/// Finds the first run of up to three dot-separated numbers and pads missing
/// components with zero: `5.16` → `5.16.0`, `v5.16-rc4` → `5.16.0`.
/// Returns `None` if the string contains no digits.
pub fn coerce(version: &str) -> Option<String> {
    let start = version.find(|c: char| c.is_ascii_digit())?;
    let mut parts: Vec<u64> = Vec::with_capacity(3);
    for piece in version[start..].split('.') {
        let digits_end = piece
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(piece.len());
        let Ok(n) = piece[..digits_end].parse::<u64>() else {
            break;
        };
        parts.push(n);
        if parts.len() == 3 || digits_end != piece.len() {
            break;
        }
    }
    parts.resize(3, 0);
    Some(format!("{}.{}.{}", parts[0], parts[1], parts[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_numerically() {
        let mut versions: Vec<KernelVersion> = ["5.9", "5.13.1", "5.13", "5.10.100", "4.19"]
            .into_iter()
            .map(KernelVersion::parse)
            .collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(KernelVersion::as_str).collect();
        assert_eq!(sorted, ["4.19", "5.9", "5.10.100", "5.13", "5.13.1"]);
    }

    #[test]
    fn release_sorts_after_release_candidates() {
        let rc4 = KernelVersion::parse("5.16-rc4");
        let rc10 = KernelVersion::parse("5.16-rc10");
        let release = KernelVersion::parse("5.16");
        assert!(rc4 < rc10);
        assert!(rc10 < release);
        assert!(release < KernelVersion::parse("5.16.1"));
    }

    #[test]
    fn coerce_pads_and_strips() {
        assert_eq!(coerce("5.16").as_deref(), Some("5.16.0"));
        assert_eq!(coerce("v5.16-rc4").as_deref(), Some("5.16.0"));
        assert_eq!(coerce("5.13.1").as_deref(), Some("5.13.1"));
        assert_eq!(coerce("6").as_deref(), Some("6.0.0"));
        assert_eq!(coerce("latest"), None);
    }
}
