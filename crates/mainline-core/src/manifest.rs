//! Checksum manifest parsing.
//!
//! Each architecture directory publishes a `CHECKSUMS` file with one
//! `<hexdigest> <filename>` pair per line, SHA-1 and SHA-256 on separate
//! lines. Filenames follow the Debian kernel package convention:
//!
//! ```text
//! <prefix>-<version>[-<label>[-<variant>]]_<upstream>-<debtag>_<arch>.deb
//! ```
//!
//! where `<debtag>` is `<left>.<build>` and `<left>` is either all digits or
//! exactly the `<label>` from the package name. That equality is checked
//! structurally; the `regex` crate has no back-references.

use std::collections::HashMap;

use mainline_schema::version::coerce;
use mainline_schema::{ALL_VARIANT, Algorithm, PackageFile, PackageInfo};

use crate::error::CatalogError;
use crate::listing::join_url;

/// Constraints applied when building a [`PackagePattern`].
#[derive(Debug, Clone, Default)]
pub struct PatternOptions {
    /// Kernel version the package name must carry. Coerced to
    /// `major.minor.patch`; any version matches when unset.
    pub version: Option<String>,
    /// Architecture the file must be built for; any when unset.
    pub arch: Option<String>,
    /// Variant the package must belong to. `all` selects packages without
    /// a variant segment.
    pub variant: Option<String>,
}

/// Reusable matcher for one package name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePattern {
    prefix: String,
    version: Option<String>,
    arch: Option<String>,
    variant: Option<String>,
}

impl PackagePattern {
    pub fn new(prefix: impl Into<String>, options: PatternOptions) -> Self {
        Self {
            prefix: prefix.into(),
            version: options.version.as_deref().and_then(coerce),
            arch: options.arch,
            variant: options.variant,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Split a `.deb` filename into its parts, or `None` if it does not
    /// match this pattern.
    pub fn parse_file_name(&self, name: &str) -> Option<PackageFile> {
        let stem = name.strip_suffix(".deb")?;
        let mut fields = stem.split('_');
        let (full, full_version, arch) = (fields.next()?, fields.next()?, fields.next()?);
        if fields.next().is_some() || arch.is_empty() {
            return None;
        }
        if self.arch.as_deref().is_some_and(|want| want != arch) {
            return None;
        }

        let (upstream, deb_tag) = full_version.split_once('-')?;
        if !is_version_triplet(upstream) {
            return None;
        }
        let (left, build_tag) = deb_tag.rsplit_once('.')?;
        if !is_digits(build_tag) {
            return None;
        }

        let rest = full.strip_prefix(self.prefix.as_str())?.strip_prefix('-')?;
        let (version, tail) = self.split_version(rest)?;

        let numeric_left = is_digits(left);
        let (package_label, variant) = if tail.is_empty() {
            if !numeric_left {
                return None;
            }
            (None, None)
        } else {
            let segments = tail.strip_prefix('-')?;
            if numeric_left {
                match segments.split_once('-') {
                    Some((label, variant)) => (Some(label), Some(variant)),
                    None => (Some(segments), None),
                }
            } else {
                // The tag must repeat the label captured from the name.
                match segments.strip_prefix(left)? {
                    "" => (Some(left), None),
                    after => (Some(left), Some(after.strip_prefix('-')?)),
                }
            }
        };
        if package_label.is_some_and(str::is_empty) || variant.is_some_and(str::is_empty) {
            return None;
        }
        if self
            .variant
            .as_deref()
            .is_some_and(|want| want != variant.unwrap_or(ALL_VARIANT))
        {
            return None;
        }

        Some(PackageFile {
            package_full_name: full.to_string(),
            version: version.to_string(),
            package_label: package_label.map(str::to_string),
            variant: variant.map(str::to_string),
            upstream_version: upstream.to_string(),
            deb_tag: deb_tag.to_string(),
            deb_label: numeric_left.then(|| left.to_string()),
            build_tag: build_tag.to_string(),
            arch: arch.to_string(),
        })
    }

    /// Split `<version><tail>` where the tail is empty or starts with `-`.
    fn split_version<'a>(&self, rest: &'a str) -> Option<(&'a str, &'a str)> {
        let end = match &self.version {
            Some(want) => {
                let tail = rest.strip_prefix(want.as_str())?;
                if !tail.is_empty() && !tail.starts_with('-') {
                    return None;
                }
                want.len()
            }
            None => {
                let end = rest.find('-').unwrap_or(rest.len());
                if !is_version_triplet(&rest[..end]) {
                    return None;
                }
                end
            }
        };
        Some(rest.split_at(end))
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_version_triplet(s: &str) -> bool {
    let mut parts = s.split('.');
    let ok = (0..3).all(|_| parts.next().is_some_and(is_digits));
    ok && parts.next().is_none()
}

/// One tokenised manifest line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestLine<'a> {
    pub sha1: Option<&'a str>,
    pub sha256: Option<&'a str>,
    pub file_name: &'a str,
}

impl<'a> ManifestLine<'a> {
    /// Tokenise `<hex> <filename>`. Blank lines, comments and lines that do
    /// not start with a hex token yield `None`. A hex token of any length
    /// other than 40 or 64 keeps the line but records no digest.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (digest, rest) = line.split_once(char::is_whitespace)?;
        // sha256sum marks binary mode with a leading '*'
        let file_name = rest.trim_start().trim_start_matches('*');
        if file_name.is_empty() || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        let (mut sha1, mut sha256) = (None, None);
        match Algorithm::from_hex_len(digest.len()) {
            Some(Algorithm::Sha256) => sha256 = Some(digest),
            Some(Algorithm::Sha1) => sha1 = Some(digest),
            None => {}
        }
        Some(Self {
            sha1,
            sha256,
            file_name,
        })
    }
}

/// Every digest line in the manifest, in document order.
pub fn parse_manifest(text: &str) -> impl Iterator<Item = ManifestLine<'_>> {
    text.lines().filter_map(ManifestLine::parse)
}

struct Candidate<'a> {
    file: PackageFile,
    sha1: Option<&'a str>,
    sha256: Option<&'a str>,
}

/// Matching files in document order, with the digests from every line that
/// names the same file folded together.
fn candidates<'a>(text: &'a str, pattern: &PackagePattern) -> Vec<Candidate<'a>> {
    let mut found: Vec<Candidate<'a>> = Vec::new();
    let mut by_name: HashMap<&'a str, usize> = HashMap::new();
    for line in parse_manifest(text) {
        if let Some(&i) = by_name.get(line.file_name) {
            let prev = &mut found[i];
            prev.sha1 = line.sha1.or(prev.sha1);
            prev.sha256 = line.sha256.or(prev.sha256);
            continue;
        }
        let Some(file) = pattern.parse_file_name(line.file_name) else {
            continue;
        };
        by_name.insert(line.file_name, found.len());
        found.push(Candidate {
            file,
            sha1: line.sha1,
            sha256: line.sha256,
        });
    }
    found
}

fn build(candidate: Candidate<'_>, base_url: &str) -> Result<PackageInfo, CatalogError> {
    let url = join_url(base_url, &candidate.file.file_name());
    let info = PackageInfo::new(
        candidate.file,
        url,
        candidate.sha1.map(str::to_string),
        candidate.sha256.map(str::to_string),
    )?;
    Ok(info)
}

/// First package in `text` matching `pattern`.
///
/// Used for the single-artifact roles. `base_url` is the directory the
/// manifest was read from; artifact URLs are resolved against it.
pub fn match_first(
    text: &str,
    pattern: &PackagePattern,
    base_url: &str,
) -> Result<Option<PackageInfo>, CatalogError> {
    candidates(text, pattern)
        .into_iter()
        .next()
        .map(|c| build(c, base_url))
        .transpose()
}

/// Every package in `text` matching `pattern`, in document order.
///
/// Fails on the first record without a usable digest rather than dropping it.
pub fn match_all(
    text: &str,
    pattern: &PackagePattern,
    base_url: &str,
) -> Result<Vec<PackageInfo>, CatalogError> {
    candidates(text, pattern)
        .into_iter()
        .map(|c| build(c, base_url))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mainline_schema::{ArchitectureInfo, ImageStatus, PackageRole};

    const BASE: &str = "https://example.test/v5.16/amd64";

    fn sha256(seed: char) -> String {
        seed.to_string().repeat(64)
    }

    fn sha1(seed: char) -> String {
        seed.to_string().repeat(40)
    }

    fn pattern(prefix: &str, version: Option<&str>, arch: Option<&str>) -> PackagePattern {
        PackagePattern::new(
            prefix,
            PatternOptions {
                version: version.map(str::to_string),
                arch: arch.map(str::to_string),
                variant: None,
            },
        )
    }

    #[test]
    fn file_names_round_trip() {
        let cases = [
            ("linux-headers", "linux-headers-5.16.0-051600_5.16.0-051600.202201091830_all.deb"),
            (
                "linux-headers",
                "linux-headers-5.16.0-051600-generic_5.16.0-051600.202201091830_amd64.deb",
            ),
            (
                "linux-modules",
                "linux-modules-5.16.0-051600-generic-64k_5.16.0-051600.202201091830_arm64.deb",
            ),
            (
                "linux-image-unsigned",
                "linux-image-unsigned-5.13.0-1014-oem_5.13.0-1014.15_amd64.deb",
            ),
            (
                "linux-headers",
                "linux-headers-5.16.0-051600rc8-generic_5.16.0-051600rc8.202201022230_amd64.deb",
            ),
        ];
        for (prefix, name) in cases {
            let file = pattern(prefix, None, None)
                .parse_file_name(name)
                .unwrap_or_else(|| panic!("{name} should parse"));
            assert_eq!(file.file_name(), name);
            assert!(file.package_full_name.starts_with(prefix));
        }
    }

    #[test]
    fn parts_are_extracted() {
        let file = pattern("linux-modules", Some("5.16"), Some("arm64"))
            .parse_file_name(
                "linux-modules-5.16.0-051600-generic-64k_5.16.0-051600.202201091830_arm64.deb",
            )
            .unwrap();
        assert_eq!(file.version, "5.16.0");
        assert_eq!(file.package_label.as_deref(), Some("051600"));
        assert_eq!(file.variant.as_deref(), Some("generic-64k"));
        assert_eq!(file.deb_label.as_deref(), Some("051600"));
        assert_eq!(file.build_tag, "202201091830");
        assert_eq!(file.arch, "arm64");
    }

    #[test]
    fn label_must_repeat_in_tag() {
        let p = pattern("linux-headers", Some("5.16"), None);
        let file = p
            .parse_file_name(
                "linux-headers-5.16.0-051600rc8-generic_5.16.0-051600rc8.202201022230_amd64.deb",
            )
            .unwrap();
        assert_eq!(file.package_label.as_deref(), Some("051600rc8"));
        assert_eq!(file.variant.as_deref(), Some("generic"));
        assert!(file.deb_label.is_none());

        assert!(
            p.parse_file_name(
                "linux-headers-5.16.0-051600rc7-generic_5.16.0-051600rc8.202201022230_amd64.deb"
            )
            .is_none()
        );
        assert!(
            p.parse_file_name("linux-headers-5.16.0_5.16.0-051600rc8.202201022230_all.deb")
                .is_none()
        );
    }

    #[test]
    fn constraints_are_applied() {
        let name = "linux-image-unsigned-5.16.0-051600-generic_5.16.0-051600.202201091830_amd64.deb";
        assert!(pattern("linux-image-unsigned", Some("5.16"), Some("amd64")).parse_file_name(name).is_some());
        assert!(pattern("linux-image-unsigned", Some("5.16.1"), None).parse_file_name(name).is_none());
        assert!(pattern("linux-image-unsigned", None, Some("arm64")).parse_file_name(name).is_none());
        // the signed image prefix must not swallow unsigned images
        assert!(pattern("linux-image", None, None).parse_file_name(name).is_none());
    }

    #[test]
    fn variant_constraint_selects_one_flavour() {
        let text = format!(
            "{a}  linux-headers-5.16.0-051600-generic_5.16.0-051600.202201091830_amd64.deb\n\
             {b}  linux-headers-5.16.0-051600_5.16.0-051600.202201091830_all.deb\n",
            a = sha256('a'),
            b = sha256('b'),
        );
        let only = |variant: &str| {
            PackagePattern::new(
                "linux-headers",
                PatternOptions {
                    version: Some("5.16".to_string()),
                    arch: None,
                    variant: Some(variant.to_string()),
                },
            )
        };
        let all = match_first(&text, &only("all"), BASE).unwrap().unwrap();
        assert_eq!(all.package_full_name(), "linux-headers-5.16.0-051600");
        let generic = match_first(&text, &only("generic"), BASE).unwrap().unwrap();
        assert_eq!(generic.variant_name(), "generic");
        assert!(match_first(&text, &only("lowlatency"), BASE).unwrap().is_none());
    }

    #[test]
    fn lines_are_tokenised() {
        let text = format!(
            "# Checksums, check with the command below:\n\
             #     shasum -c CHECKSUMS\n\
             \n\
             {} *a.deb\n\
             {}  b.deb\n\
             d41d8cd98f00b204e9800998ecf8427e  c.deb\n\
             not-hex d.deb\n",
            sha1('a'),
            sha256('b'),
        );
        let lines: Vec<_> = parse_manifest(&text).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].file_name, "a.deb");
        assert!(lines[0].sha1.is_some() && lines[0].sha256.is_none());
        assert!(lines[1].sha256.is_some());
        assert_eq!(lines[2].file_name, "c.deb");
        assert!(lines[2].sha1.is_none() && lines[2].sha256.is_none());
    }

    #[test]
    fn digests_from_both_sections_are_merged() {
        let deb = "linux-modules-5.16.0-051600-generic_5.16.0-051600.202201091830_amd64.deb";
        let text = format!(
            "{}  {deb}\n{}  {deb}\n",
            sha1('1'),
            sha256('A')
        );
        let info = match_first(&text, &pattern("linux-modules", Some("5.16"), Some("amd64")), BASE)
            .unwrap()
            .unwrap();
        assert_eq!(info.sha1.as_deref(), Some(sha1('1').as_str()));
        assert_eq!(info.sha256.as_deref(), Some(sha256('a').as_str()));
        assert!(info.hash.to_string().starts_with("sha256-"));
        assert_eq!(info.url, format!("{BASE}/{deb}"));
    }

    #[test]
    fn md5_only_entry_is_integrity_missing() {
        let text = "d41d8cd98f00b204e9800998ecf8427e  \
                    linux-image-5.16.0-051600-generic_5.16.0-051600.202201091830_amd64.deb\n";
        let p = pattern("linux-image", Some("5.16"), Some("amd64"));

        let err = match_first(text, &p, BASE).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::IntegrityMissing { ref package } if package == "linux-image-5.16.0-051600-generic"
        ));
        assert!(matches!(
            match_all(text, &p, BASE),
            Err(CatalogError::IntegrityMissing { .. })
        ));
    }

    #[test]
    fn no_match_is_not_an_error() {
        let text = format!("{}  unrelated_1.0-1_amd64.deb\n", sha256('c'));
        let p = pattern("linux-image", Some("5.16"), Some("amd64"));
        assert!(match_first(&text, &p, BASE).unwrap().is_none());
        assert!(match_all(&text, &p, BASE).unwrap().is_empty());
    }

    #[test]
    fn headers_match_in_document_order() {
        let text = format!(
            "{a}  linux-headers-5.16.0-051600-generic_5.16.0-051600.202201091830_amd64.deb\n\
             {b}  linux-headers-5.16.0-051600_5.16.0-051600.202201091830_all.deb\n\
             {c}  linux-headers-5.16.0-051600-lowlatency_5.16.0-051600.202201091830_amd64.deb\n",
            a = sha256('a'),
            b = sha256('b'),
            c = sha256('c'),
        );
        let headers = match_all(&text, &pattern("linux-headers", Some("5.16"), None), BASE).unwrap();
        let variants: Vec<&str> = headers.iter().map(PackageInfo::variant_name).collect();
        assert_eq!(variants, ["generic", "all", "lowlatency"]);
        assert_eq!(headers[1].file.arch, "all");
    }

    #[test]
    fn oem_unsigned_image_only() {
        let text = format!(
            "{}  linux-image-unsigned-5.13.0-1014-oem_5.13.0-1014.15_amd64.deb\n",
            sha256('e')
        );
        let base = "https://example.test/v5.13/amd64";
        let opts = |prefix| pattern(prefix, Some("5.13"), Some("amd64"));

        let unsigned = match_first(&text, &opts("linux-image-unsigned"), base)
            .unwrap()
            .unwrap();
        assert_eq!(unsigned.file.variant.as_deref(), Some("oem"));
        assert_eq!(unsigned.file.arch, "amd64");
        assert!(unsigned.hash.to_string().starts_with("sha256-"));
        assert!(match_first(&text, &opts("linux-image"), base).unwrap().is_none());

        let mut arch = ArchitectureInfo::new("amd64");
        arch.insert(PackageRole::ImageUnsigned, unsigned);
        let oem = arch.variant("oem").unwrap();
        assert!(oem.files.image.is_none());
        assert_eq!(oem.image_status(), ImageStatus::Unsigned);
    }
}
