//! Integrity digests in Subresource-Integrity form (`sha256-<base64>`).
//!
//! Checksum manifests publish hex digests; the catalog and the content store
//! speak the SRI encoding. [`Integrity`] converts between the two.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Errors produced while decoding or validating a digest.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// The algorithm prefix is not one we can check.
    #[error("Unsupported digest algorithm: '{0}'")]
    UnknownAlgorithm(String),

    /// The hex string contains non-hex characters.
    #[error("Invalid hex digest '{0}'")]
    InvalidHex(String),

    /// The base64 payload of an SRI string does not decode.
    #[error("Invalid base64 digest in '{0}'")]
    InvalidBase64(String),

    /// The decoded digest has the wrong number of bytes for its algorithm.
    #[error("Invalid {algorithm} digest: expected {expected} bytes, got {actual}")]
    WrongLength {
        /// Algorithm the digest claims to be.
        algorithm: Algorithm,
        /// Digest size required by the algorithm.
        expected: usize,
        /// Digest size actually supplied.
        actual: usize,
    },

    /// The string is not of the form `<algorithm>-<base64>`.
    #[error("Malformed integrity string '{0}'")]
    Malformed(String),
}

/// Digest algorithms found in kernel checksum manifests.
///
/// Ordered by strength so that `max()` picks the preferred one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// SHA-1, accepted only as a fallback when no SHA-256 is published.
    Sha1,
    /// SHA-256, the preferred algorithm.
    Sha256,
}

impl Algorithm {
    /// Lowercase name used as the SRI prefix.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Size of the raw digest in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Length of the digest when written as hex.
    pub fn hex_len(self) -> usize {
        self.digest_len() * 2
    }

    /// Guess the algorithm from the length of a hex digest.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// A digest tagged with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Integrity {
    algorithm: Algorithm,
    digest: Vec<u8>,
}

impl Integrity {
    /// Wrap raw digest bytes, checking the length against the algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::WrongLength`] if `digest` is not the algorithm's size.
    pub fn new(algorithm: Algorithm, digest: Vec<u8>) -> Result<Self, HashError> {
        if digest.len() != algorithm.digest_len() {
            return Err(HashError::WrongLength {
                algorithm,
                expected: algorithm.digest_len(),
                actual: digest.len(),
            });
        }
        Ok(Self { algorithm, digest })
    }

    /// Decode a hex digest as published in a checksum manifest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidHex`] for non-hex input and
    /// [`HashError::WrongLength`] if the decoded size does not fit `algorithm`.
    pub fn from_hex(algorithm: Algorithm, hex_digest: &str) -> Result<Self, HashError> {
        let digest =
            hex::decode(hex_digest).map_err(|_| HashError::InvalidHex(hex_digest.to_string()))?;
        Self::new(algorithm, digest)
    }

    /// Hash `data` in one shot.
    pub fn compute(algorithm: Algorithm, data: &[u8]) -> Self {
        let digest = match algorithm {
            Algorithm::Sha1 => Sha1::digest(data).to_vec(),
            Algorithm::Sha256 => Sha256::digest(data).to_vec(),
        };
        Self { algorithm, digest }
    }

    /// The digest algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Raw digest bytes.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Lowercase hex form of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm, STANDARD.encode(&self.digest))
    }
}

impl FromStr for Integrity {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (alg, payload) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| HashError::Malformed(s.to_string()))?;
        let algorithm: Algorithm = alg.parse()?;
        let digest = STANDARD
            .decode(payload)
            .map_err(|_| HashError::InvalidBase64(s.to_string()))?;
        Self::new(algorithm, digest)
    }
}

impl Serialize for Integrity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Integrity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The digests recorded for one piece of stored content.
///
/// SHA-256 is authoritative; SHA-1 is kept so that manifests which only
/// publish SHA-1 can still be checked without re-reading the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSet {
    /// SHA-256 of the content.
    pub sha256: Integrity,
    /// SHA-1 of the content.
    pub sha1: Integrity,
}

impl DigestSet {
    /// The recorded digest for `algorithm`.
    pub fn get(&self, algorithm: Algorithm) -> &Integrity {
        match algorithm {
            Algorithm::Sha1 => &self.sha1,
            Algorithm::Sha256 => &self.sha256,
        }
    }

    /// Whether `expected` agrees with the digest recorded for its algorithm.
    pub fn satisfies(&self, expected: &Integrity) -> bool {
        self.get(expected.algorithm()) == expected
    }
}

/// Streaming hasher that feeds every supported algorithm at once.
#[derive(Debug, Clone, Default)]
pub struct IntegrityHasher {
    sha256: Sha256,
    sha1: Sha1,
}

impl IntegrityHasher {
    /// Start a fresh hash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.sha256.update(chunk);
        self.sha1.update(chunk);
    }

    /// Finish hashing and return both digests.
    pub fn finish(self) -> DigestSet {
        DigestSet {
            sha256: Integrity {
                algorithm: Algorithm::Sha256,
                digest: self.sha256.finalize().to_vec(),
            },
            sha1: Integrity {
                algorithm: Algorithm::Sha1,
                digest: self.sha1.finalize().to_vec(),
            },
        }
    }
}
