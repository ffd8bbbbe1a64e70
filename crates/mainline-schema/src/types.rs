//! Packages, variants and per-architecture views resolved from manifests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::{Algorithm, HashError, Integrity};

/// Variant name used for packages that carry no variant segment
/// (architecture-independent headers).
pub const ALL_VARIANT: &str = "all";

/// Errors raised while assembling catalog records.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    /// A manifest entry carries no recognised digest; the record is unusable.
    #[error("Could not determine checksum of package \"{package}\"")]
    IntegrityMissing {
        /// Full package name of the offending entry.
        package: String,
    },

    /// A digest was present but could not be decoded.
    #[error("Invalid digest for package \"{package}\": {source}")]
    InvalidDigest {
        /// Full package name of the offending entry.
        package: String,
        /// Underlying decoding failure.
        source: HashError,
    },
}

/// The four artifact roles a kernel variant is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PackageRole {
    /// `linux-headers-*` packages. A variant may have several.
    Headers,
    /// `linux-modules-*` package.
    Modules,
    /// Signed `linux-image-*` package.
    Image,
    /// `linux-image-unsigned-*` package.
    ImageUnsigned,
}

impl PackageRole {
    /// Every role, in install order.
    pub const ALL: [Self; 4] = [
        Self::Headers,
        Self::Modules,
        Self::Image,
        Self::ImageUnsigned,
    ];

    /// Package name prefix used in manifests (e.g. `linux-headers`).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Headers => "linux-headers",
            Self::Modules => "linux-modules",
            Self::Image => "linux-image",
            Self::ImageUnsigned => "linux-image-unsigned",
        }
    }

    /// Whether the role holds a list of artifacts rather than a single one.
    pub fn is_list(self) -> bool {
        matches!(self, Self::Headers)
    }
}

/// Structured pieces of a `.deb` filename from a checksum manifest.
///
/// `<package_full_name>_<upstream_version>-<deb_tag>_<arch>.deb`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageFile {
    /// e.g. `linux-modules-5.16.0-051600-generic`
    pub package_full_name: String,
    /// Kernel version embedded in the package name, e.g. `5.16.0`.
    pub version: String,
    /// Package/series label, e.g. `051600`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_label: Option<String>,
    /// Build flavour, e.g. `generic`. `None` for architecture-independent headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Upstream version between the first `_` and the `-` of the tag.
    pub upstream_version: String,
    /// Full Debian tag, e.g. `051600.202201091830`.
    pub deb_tag: String,
    /// Numeric label portion of the tag, when it was numeric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deb_label: Option<String>,
    /// Build timestamp portion of the tag, e.g. `202201091830`.
    pub build_tag: String,
    /// Debian architecture (`amd64`, `arm64`, `all`, ...).
    pub arch: String,
}

impl PackageFile {
    /// Rebuild the `.deb` filename from its parts.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}-{}_{}.deb",
            self.package_full_name, self.upstream_version, self.deb_tag, self.arch
        )
    }

    /// Variant name, falling back to [`ALL_VARIANT`].
    pub fn variant_name(&self) -> &str {
        self.variant.as_deref().unwrap_or(ALL_VARIANT)
    }
}

/// One resolved, integrity-checkable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    /// Filename structure.
    #[serde(flatten)]
    pub file: PackageFile,
    /// The artifact filename as it appeared in the manifest.
    pub deb: String,
    /// Absolute download URL.
    pub url: String,
    /// Lowercase hex SHA-1, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    /// Lowercase hex SHA-256, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Preferred digest in SRI form; SHA-256 when available.
    pub hash: Integrity,
}

impl PackageInfo {
    /// Build a record, failing if no digest is available.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::IntegrityMissing`] if both digests are absent and
    /// [`SchemaError::InvalidDigest`] if a digest does not decode.
    pub fn new(
        file: PackageFile,
        url: String,
        sha1: Option<String>,
        sha256: Option<String>,
    ) -> Result<Self, SchemaError> {
        let sha1 = sha1.map(|s| s.to_ascii_lowercase());
        let sha256 = sha256.map(|s| s.to_ascii_lowercase());
        let hash = preferred_integrity(&file.package_full_name, sha1.as_deref(), sha256.as_deref())?;
        Ok(Self {
            deb: file.file_name(),
            file,
            url,
            sha1,
            sha256,
            hash,
        })
    }

    /// Full package name, e.g. `linux-headers-5.16.0-051600-generic`.
    pub fn package_full_name(&self) -> &str {
        &self.file.package_full_name
    }

    /// Variant name, falling back to [`ALL_VARIANT`].
    pub fn variant_name(&self) -> &str {
        self.file.variant_name()
    }

    /// Rebuild the `.deb` filename from the parsed parts.
    pub fn file_name(&self) -> String {
        self.file.file_name()
    }

    /// Fold a later sighting of the same package into this one.
    ///
    /// Attributes present on `other` win; digests missing on `other` are kept
    /// from `self`. The preferred hash is recomputed afterwards.
    pub fn merge(&mut self, other: PackageInfo) {
        self.file = other.file;
        self.deb = other.deb;
        self.url = other.url;
        self.sha1 = other.sha1.or_else(|| self.sha1.take());
        self.sha256 = other.sha256.or_else(|| self.sha256.take());
        if let Ok(hash) = preferred_integrity(
            &self.file.package_full_name,
            self.sha1.as_deref(),
            self.sha256.as_deref(),
        ) {
            self.hash = hash;
        }
    }
}

fn preferred_integrity(
    package: &str,
    sha1: Option<&str>,
    sha256: Option<&str>,
) -> Result<Integrity, SchemaError> {
    let (algorithm, hex) = match (sha256, sha1) {
        (Some(hex), _) => (Algorithm::Sha256, hex),
        (None, Some(hex)) => (Algorithm::Sha1, hex),
        (None, None) => {
            return Err(SchemaError::IntegrityMissing {
                package: package.to_string(),
            });
        }
    };
    Integrity::from_hex(algorithm, hex).map_err(|source| SchemaError::InvalidDigest {
        package: package.to_string(),
        source,
    })
}

/// Borrowed view of one role's artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleFiles<'a> {
    /// A single-artifact role (modules, image, unsigned image).
    Single(Option<&'a PackageInfo>),
    /// The headers role.
    List(&'a [PackageInfo]),
}

impl RoleFiles<'_> {
    /// Whether the role has no artifacts.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(pkg) => pkg.is_none(),
            Self::List(pkgs) => pkgs.is_empty(),
        }
    }
}

/// The artifacts that make up one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantFiles {
    /// Header packages, variant-specific first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<PackageInfo>,
    /// Kernel modules package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<PackageInfo>,
    /// Signed kernel image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PackageInfo>,
    /// Unsigned kernel image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_unsigned: Option<PackageInfo>,
}

impl VariantFiles {
    /// View the artifacts held for `role`.
    pub fn role(&self, role: PackageRole) -> RoleFiles<'_> {
        match role {
            PackageRole::Headers => RoleFiles::List(&self.headers),
            PackageRole::Modules => RoleFiles::Single(self.modules.as_ref()),
            PackageRole::Image => RoleFiles::Single(self.image.as_ref()),
            PackageRole::ImageUnsigned => RoleFiles::Single(self.image_unsigned.as_ref()),
        }
    }

    /// Record `pkg` under `role`.
    ///
    /// Headers are merged by full package name or appended. Single roles keep
    /// the first package seen; a later sighting with the same full name is
    /// merged into it.
    pub fn insert(&mut self, role: PackageRole, pkg: PackageInfo) {
        let slot = match role {
            PackageRole::Headers => {
                match self
                    .headers
                    .iter_mut()
                    .find(|h| h.package_full_name() == pkg.package_full_name())
                {
                    Some(prev) => prev.merge(pkg),
                    None => self.headers.push(pkg),
                }
                return;
            }
            PackageRole::Modules => &mut self.modules,
            PackageRole::Image => &mut self.image,
            PackageRole::ImageUnsigned => &mut self.image_unsigned,
        };
        if let Some(prev) = slot.as_mut() {
            if prev.package_full_name() == pkg.package_full_name() {
                prev.merge(pkg);
            }
        } else {
            *slot = Some(pkg);
        }
    }

    /// Every artifact with its role, headers first.
    pub fn iter(&self) -> impl Iterator<Item = (PackageRole, &PackageInfo)> {
        self.headers
            .iter()
            .map(|h| (PackageRole::Headers, h))
            .chain(self.modules.iter().map(|p| (PackageRole::Modules, p)))
            .chain(self.image.iter().map(|p| (PackageRole::Image, p)))
            .chain(
                self.image_unsigned
                    .iter()
                    .map(|p| (PackageRole::ImageUnsigned, p)),
            )
    }
}

/// Signing status of a variant's kernel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    /// A signed image is published.
    Signed,
    /// Only an unsigned image is published.
    Unsigned,
    /// No image at all; the variant cannot be installed.
    Missing,
}

/// A named build flavour within an architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// e.g. `generic`, `lowlatency`, or [`ALL_VARIANT`].
    pub name: String,
    /// Artifacts by role.
    pub files: VariantFiles,
}

impl Variant {
    /// An empty variant.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: VariantFiles::default(),
        }
    }

    /// The signed image wins over the unsigned one.
    pub fn image_status(&self) -> ImageStatus {
        if self.files.image.is_some() {
            ImageStatus::Signed
        } else if self.files.image_unsigned.is_some() {
            ImageStatus::Unsigned
        } else {
            ImageStatus::Missing
        }
    }

    /// Whether the variant has an image to install.
    pub fn is_installable(&self) -> bool {
        self.image_status() != ImageStatus::Missing
    }
}

/// Per-architecture view of one kernel version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureInfo {
    /// Debian architecture name.
    pub name: String,
    /// Concrete variants in discovery order. Never contains [`ALL_VARIANT`].
    pub variants: Vec<String>,
    /// Variants by name, including [`ALL_VARIANT`] when headers exist.
    pub packages: BTreeMap<String, Variant>,
    /// Set when resolving this architecture failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ArchitectureInfo {
    /// An architecture with nothing resolved yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
            packages: BTreeMap::new(),
            warning: None,
        }
    }

    /// Look up a variant by name.
    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.packages.get(name)
    }

    /// File `pkg` under its variant, discovering the variant if needed.
    pub fn insert(&mut self, role: PackageRole, pkg: PackageInfo) {
        let name = pkg.variant_name().to_string();
        if pkg.file.variant.is_some() && !self.variants.contains(&name) {
            self.variants.push(name.clone());
        }
        self.packages
            .entry(name.clone())
            .or_insert_with(|| Variant::new(name))
            .files
            .insert(role, pkg);
    }

    /// Give every concrete variant the architecture-independent headers, in
    /// addition to its own.
    pub fn fan_out_headers(&mut self) {
        let shared = match self.packages.get(ALL_VARIANT) {
            Some(all) if !all.files.headers.is_empty() => all.files.headers.clone(),
            _ => return,
        };
        for name in &self.variants {
            if let Some(variant) = self.packages.get_mut(name) {
                for header in &shared {
                    variant.files.insert(PackageRole::Headers, header.clone());
                }
            }
        }
    }
}
