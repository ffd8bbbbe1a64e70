//! Persistent content store keyed by source URL.
//!
//! Layout under the root:
//!
//! ```text
//! index/<xx>/<sha256(key)>.json     entry metadata
//! content/sha256/<xx>/<hex>         content bytes, named by their SHA-256
//! tmp/                              writes in progress
//! ```
//!
//! Content only becomes visible once a [`StoreWriter`] commits: the bytes are
//! renamed into `content/` first and the index entry written last, both via
//! temporary files in `tmp/`.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mainline_schema::{Algorithm, DigestSet, Integrity, IntegrityHasher};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use walkdir::WalkDir;

const BUF_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid index entry {}: {source}", path.display())]
    Index {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Stored bytes no longer match the digest recorded when they were written.
    #[error("Store corruption for {key}: expected {expected}, found {actual}")]
    Corruption {
        key: String,
        expected: String,
        actual: String,
    },

    /// Freshly written bytes do not match the digest the caller required.
    #[error("Integrity mismatch for {key}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        key: String,
        expected: String,
        actual: String,
    },
}

/// Metadata recorded for one stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub key: String,
    pub digests: DigestSet,
    pub size: u64,
    pub time: DateTime<Utc>,
}

impl EntryInfo {
    /// The authoritative SHA-256 integrity.
    pub fn integrity(&self) -> &Integrity {
        &self.digests.sha256
    }

    pub fn satisfies(&self, expected: &Integrity) -> bool {
        self.digests.satisfies(expected)
    }
}

/// A verified entry opened for reading.
#[derive(Debug)]
pub struct StoreReader {
    pub info: EntryInfo,
    pub file: tokio::fs::File,
}

/// Result of a full integrity sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Index entries checked.
    pub entries: usize,
    /// Bytes of content read.
    pub bytes: u64,
    /// Keys whose content does not match the recorded digest.
    pub corrupt: Vec<String>,
    /// Keys whose content file is gone.
    pub missing: Vec<String>,
    /// Index files that could not be read or parsed.
    pub unreadable: Vec<PathBuf>,
    /// Content files no index entry points at.
    pub orphaned: Vec<PathBuf>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty()
            && self.missing.is_empty()
            && self.unreadable.is_empty()
            && self.orphaned.is_empty()
    }
}

/// Content store rooted at a directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (creating if needed) a store at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("tmp"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    fn content_dir(&self) -> PathBuf {
        self.root.join("content").join(Algorithm::Sha256.name())
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Index file for a key. Uses 2-char prefix: ab/abcdef123....json
    pub fn index_path(&self, key: &str) -> PathBuf {
        let hashed = hex::encode(Sha256::digest(key.as_bytes()));
        self.index_dir()
            .join(&hashed[..2])
            .join(format!("{hashed}.json"))
    }

    /// Content file for a SHA-256 integrity.
    pub fn content_path(&self, integrity: &Integrity) -> PathBuf {
        let hex = integrity.to_hex();
        self.content_dir().join(&hex[..2]).join(hex)
    }

    /// Metadata for `key`, if stored.
    pub fn info(&self, key: &str) -> Result<Option<EntryInfo>, StoreError> {
        let path = self.index_path(key);
        match fs::read(&path) {
            Ok(bytes) => decode_index(key, path, &bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn info_async(&self, key: &str) -> Result<Option<EntryInfo>, StoreError> {
        let path = self.index_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => decode_index(key, path, &bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Open `key` for reading after re-hashing its content.
    ///
    /// Returns `Ok(None)` when the key is not stored and
    /// [`StoreError::Corruption`] when the content is missing or altered.
    pub async fn open(&self, key: &str) -> Result<Option<StoreReader>, StoreError> {
        let Some(info) = self.info_async(key).await? else {
            return Ok(None);
        };
        let path = self.content_path(info.integrity());
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::Corruption {
                    key: key.to_string(),
                    expected: info.integrity().to_string(),
                    actual: "missing content".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; BUF_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let actual = Integrity::new(Algorithm::Sha256, hasher.finalize().to_vec())
            .map_err(io::Error::other)?;
        if &actual != info.integrity() {
            return Err(StoreError::Corruption {
                key: key.to_string(),
                expected: info.integrity().to_string(),
                actual: actual.to_string(),
            });
        }

        file.rewind().await?;
        Ok(Some(StoreReader { info, file }))
    }

    /// Start writing content for `key`. Nothing is visible until
    /// [`StoreWriter::commit`]; dropping the writer discards the bytes.
    pub fn writer(
        &self,
        key: &str,
        required: Option<Integrity>,
    ) -> Result<StoreWriter, StoreError> {
        let (file, temp) = NamedTempFile::new_in(self.tmp_dir())?.into_parts();
        Ok(StoreWriter {
            store: self.clone(),
            key: key.to_string(),
            required,
            file: tokio::fs::File::from_std(file),
            temp,
            hasher: IntegrityHasher::new(),
            size: 0,
        })
    }

    /// Every readable index entry, sorted by key. Unparseable entries are
    /// skipped; [`ContentStore::verify`] reports them.
    pub fn list(&self) -> Result<Vec<EntryInfo>, StoreError> {
        let mut entries: Vec<EntryInfo> = Vec::new();
        for path in self.index_files() {
            let bytes = fs::read(&path)?;
            match serde_json::from_slice(&bytes) {
                Ok(info) => entries.push(info),
                Err(e) => tracing::debug!("Skipping index entry {}: {e}", path.display()),
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Remove `key`. Its content is deleted unless another entry shares it.
    /// Returns whether the key was stored.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let Some(info) = self.info(key)? else {
            return Ok(false);
        };
        fs::remove_file(self.index_path(key))?;

        let shared = self
            .list()?
            .iter()
            .any(|other| other.integrity() == info.integrity());
        if !shared {
            match fs::remove_file(self.content_path(info.integrity())) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(true)
    }

    /// Delete every entry and all content.
    pub fn clear(&self) -> Result<(), StoreError> {
        for dir in [self.index_dir(), self.root.join("content"), self.tmp_dir()] {
            match fs::remove_dir_all(&dir) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        fs::create_dir_all(self.tmp_dir())?;
        Ok(())
    }

    /// Re-hash every entry and report anomalies. Nothing is repaired.
    pub fn verify(&self) -> Result<VerifyReport, StoreError> {
        let mut report = VerifyReport::default();
        let mut referenced = HashSet::new();

        for path in self.index_files() {
            let info: EntryInfo = match fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|b| serde_json::from_slice(&b).map_err(|e| e.to_string()))
            {
                Ok(info) => info,
                Err(reason) => {
                    tracing::warn!("Unreadable index entry {}: {reason}", path.display());
                    report.unreadable.push(path);
                    continue;
                }
            };
            report.entries += 1;

            let content = self.content_path(info.integrity());
            referenced.insert(content.clone());
            match hash_file(&content) {
                Ok((digests, size)) => {
                    report.bytes += size;
                    if digests.sha256 != info.digests.sha256 {
                        tracing::warn!(
                            "Corrupt content for {}: expected {}, found {}",
                            info.key,
                            info.integrity(),
                            digests.sha256
                        );
                        report.corrupt.push(info.key);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!("Missing content for {}", info.key);
                    report.missing.push(info.key);
                }
                Err(e) => return Err(e.into()),
            }
        }

        for entry in WalkDir::new(self.content_dir())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            if !referenced.contains(entry.path()) {
                tracing::warn!("Orphaned content {}", entry.path().display());
                report.orphaned.push(entry.into_path());
            }
        }

        Ok(report)
    }

    fn index_files(&self) -> Vec<PathBuf> {
        WalkDir::new(self.index_dir())
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "json")
            })
            .map(walkdir::DirEntry::into_path)
            .collect()
    }
}

fn hash_file(path: &Path) -> io::Result<(DigestSet, u64)> {
    let mut file = fs::File::open(path)?;
    let mut hasher = IntegrityHasher::new();
    let mut buf = vec![0u8; BUF_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hasher.finish(), size))
}

/// In-progress write of one entry.
#[derive(Debug)]
pub struct StoreWriter {
    store: ContentStore,
    key: String,
    required: Option<Integrity>,
    file: tokio::fs::File,
    temp: TempPath,
    hasher: IntegrityHasher,
    size: u64,
}

impl StoreWriter {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
        self.file.write_all(chunk).await?;
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.size
    }

    /// Check the required integrity, then publish content and index entry.
    pub async fn commit(mut self) -> Result<EntryInfo, StoreError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);

        let digests = self.hasher.finish();
        if let Some(required) = &self.required {
            if !digests.satisfies(required) {
                return Err(StoreError::IntegrityMismatch {
                    key: self.key,
                    expected: required.to_string(),
                    actual: digests.get(required.algorithm()).to_string(),
                });
            }
        }

        let StoreWriter {
            store,
            key,
            temp,
            size,
            ..
        } = self;
        let info = EntryInfo {
            key,
            digests,
            size,
            time: Utc::now(),
        };
        let info = tokio::task::spawn_blocking(move || store.publish(temp, info))
            .await
            .map_err(io::Error::other)??;

        tracing::debug!("Stored {} ({} bytes, {})", info.key, info.size, info.integrity());
        Ok(info)
    }
}

impl ContentStore {
    /// Move verified content into place, then write its index entry.
    fn publish(&self, temp: TempPath, info: EntryInfo) -> Result<EntryInfo, StoreError> {
        let content = self.content_path(info.integrity());
        if let Some(parent) = content.parent() {
            fs::create_dir_all(parent)?;
        }
        temp.persist(&content).map_err(|e| StoreError::Io(e.error))?;

        let index = self.index_path(&info.key);
        if let Some(parent) = index.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = NamedTempFile::new_in(self.tmp_dir())?;
        serde_json::to_writer_pretty(&mut tmp, &info).map_err(|source| StoreError::Index {
            path: index.clone(),
            source,
        })?;
        tmp.flush()?;
        tmp.persist(&index).map_err(|e| StoreError::Io(e.error))?;
        Ok(info)
    }
}

fn decode_index(key: &str, path: PathBuf, bytes: &[u8]) -> Result<Option<EntryInfo>, StoreError> {
    let info: EntryInfo =
        serde_json::from_slice(bytes).map_err(|source| StoreError::Index { path, source })?;
    Ok((info.key == key).then_some(info))
}
