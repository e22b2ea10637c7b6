//! Dependency cache store
//!
//! The cache backend is a collaborator behind the [`CacheStore`] trait:
//! restore with an exact key plus fallback prefixes, save under a key
//! that must not already exist. Its errors carry their own severity:
//! validation failures mean the caller built a bad request and are
//! fatal upstream, a lost save race is routine, and anything else is a
//! transient the caller downgrades to a cache miss.
//!
//! The shipped [`DirStore`] keeps one tar.gz per key under a shared
//! directory, which is all a single-tenant self-hosted runner needs.

use crate::process::{self, RunOpts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Longest key the store accepts
pub const MAX_KEY_LENGTH: usize = 512;

/// Cache store failures, by caller-facing severity
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request itself is malformed; the caller must not ignore this
    #[error("validation failed: {0}")]
    Validation(String),

    /// Another run saved this key first
    #[error("key already reserved: {0}")]
    Reserved(String),

    /// Backend trouble; safe to treat as a miss
    #[error("{0}")]
    Other(String),
}

/// Key/value artifact cache for dependency directories
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Restore `paths` from the entry under `key`, or under the newest
    /// entry matching one of `fallback_prefixes`. Returns the matched
    /// key, if any.
    async fn restore(
        &self,
        paths: &[PathBuf],
        key: &str,
        fallback_prefixes: &[String],
    ) -> Result<Option<String>, StoreError>;

    /// Save `paths` under `key`. Keys are write-once.
    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<(), StoreError>;
}

/// Reject malformed keys and path lists before touching the backend
pub fn validate(key: &str, paths: &[PathBuf]) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::Validation("cache key is empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StoreError::Validation(format!(
            "cache key exceeds {MAX_KEY_LENGTH} characters: {key}"
        )));
    }
    if key.contains(',') {
        return Err(StoreError::Validation(format!(
            "cache key cannot contain commas: {key}"
        )));
    }
    if paths.is_empty() {
        return Err(StoreError::Validation("no paths given".to_string()));
    }
    Ok(())
}

/// Sidecar metadata written next to each archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: String,
    pub saved_at: DateTime<Utc>,
}

/// One stored cache entry
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub meta: EntryMeta,
    pub archive: PathBuf,
}

/// Filesystem-backed cache store
pub struct DirStore {
    root: PathBuf,
    workdir: Option<PathBuf>,
}

impl DirStore {
    /// Store rooted at `root`; archived paths are relative to the
    /// process working directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workdir: None,
        }
    }

    /// Store with an explicit working directory for archiving
    pub fn with_workdir(root: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workdir: Some(workdir.into()),
        }
    }

    fn stem(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        hex::encode(&digest[..8])
    }

    fn archive_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.tar.gz", Self::stem(key)))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", Self::stem(key)))
    }

    fn run_opts(&self) -> RunOpts {
        RunOpts {
            cwd: self.workdir.clone(),
            quiet: true,
            ..RunOpts::default()
        }
    }

    /// All entries currently in the store
    pub fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let dir = match std::fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Other(format!("reading cache store: {e}"))),
        };

        let mut entries = Vec::new();
        for item in dir {
            let item = item.map_err(|e| StoreError::Other(e.to_string()))?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::Other(format!("reading {}: {e}", path.display())))?;
            let meta: EntryMeta = serde_json::from_str(&raw)
                .map_err(|e| StoreError::Other(format!("parsing {}: {e}", path.display())))?;
            let archive = path.with_extension("tar.gz");
            if archive.is_file() {
                entries.push(StoreEntry { meta, archive });
            }
        }
        Ok(entries)
    }

    /// Delete every entry, returning how many were removed
    pub fn clear(&self) -> Result<usize, StoreError> {
        let entries = self.entries()?;
        for entry in &entries {
            std::fs::remove_file(&entry.archive).map_err(|e| StoreError::Other(e.to_string()))?;
            std::fs::remove_file(self.meta_path(&entry.meta.key))
                .map_err(|e| StoreError::Other(e.to_string()))?;
        }
        Ok(entries.len())
    }

    async fn unpack(&self, archive: &Path) -> Result<(), StoreError> {
        let archive_str = archive.display().to_string();
        process::run_checked("tar", &["-xz", "-f", archive_str.as_str()], &self.run_opts())
            .await
            .map_err(|e| StoreError::Other(format!("unpacking {}: {e}", archive.display())))
    }
}

#[async_trait]
impl CacheStore for DirStore {
    async fn restore(
        &self,
        paths: &[PathBuf],
        key: &str,
        fallback_prefixes: &[String],
    ) -> Result<Option<String>, StoreError> {
        validate(key, paths)?;

        let exact = self.archive_path(key);
        if exact.is_file() {
            debug!("Cache store exact hit for {key}");
            self.unpack(&exact).await?;
            return Ok(Some(key.to_string()));
        }

        // Fallback: newest entry sharing a prefix, regardless of digest
        let mut candidates: Vec<StoreEntry> = self
            .entries()?
            .into_iter()
            .filter(|e| fallback_prefixes.iter().any(|p| e.meta.key.starts_with(p.as_str())))
            .collect();
        candidates.sort_by_key(|e| e.meta.saved_at);

        match candidates.pop() {
            Some(entry) => {
                debug!("Cache store fallback hit for {}", entry.meta.key);
                self.unpack(&entry.archive).await?;
                Ok(Some(entry.meta.key))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<(), StoreError> {
        validate(key, paths)?;

        let archive = self.archive_path(key);
        if archive.exists() {
            return Err(StoreError::Reserved(key.to_string()));
        }

        std::fs::create_dir_all(&self.root)
            .map_err(|e| StoreError::Other(format!("creating {}: {e}", self.root.display())))?;

        // Pack into a temp name first so a crash never leaves a
        // half-written archive under a valid key
        let partial = archive.with_extension("partial");
        let mut args = vec![
            "-cz".to_string(),
            "-f".to_string(),
            partial.display().to_string(),
        ];
        args.extend(paths.iter().map(|p| p.display().to_string()));
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        process::run_checked("tar", &arg_refs, &self.run_opts())
            .await
            .map_err(|e| StoreError::Other(format!("packing {key}: {e}")))?;

        std::fs::rename(&partial, &archive).map_err(|e| StoreError::Other(e.to_string()))?;

        let meta = EntryMeta {
            key: key.to_string(),
            saved_at: Utc::now(),
        };
        std::fs::write(
            self.meta_path(key),
            serde_json::to_string_pretty(&meta).map_err(|e| StoreError::Other(e.to_string()))?,
        )
        .map_err(|e| StoreError::Other(e.to_string()))?;

        debug!("Saved cache entry for {key}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, TempDir, DirStore) {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        std::fs::create_dir_all(work.path().join("vendor/bundle")).unwrap();
        std::fs::write(work.path().join("vendor/bundle/a.gem"), "gem-a").unwrap();
        let store = DirStore::with_workdir(root.path(), work.path());
        (root, work, store)
    }

    fn bundle_paths() -> Vec<PathBuf> {
        vec![PathBuf::from("vendor/bundle")]
    }

    #[test]
    fn validation_rules() {
        let paths = bundle_paths();
        assert!(validate("ok-key", &paths).is_ok());
        assert!(matches!(validate("", &paths), Err(StoreError::Validation(_))));
        assert!(matches!(
            validate("a,b", &paths),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            validate(&"k".repeat(513), &paths),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            validate("ok", &[]),
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn save_then_exact_restore() {
        let (_root, work, store) = fixture();

        store.save(&bundle_paths(), "base-abc").await.unwrap();

        std::fs::remove_dir_all(work.path().join("vendor")).unwrap();
        let matched = store
            .restore(&bundle_paths(), "base-abc", &["base-".to_string()])
            .await
            .unwrap();
        assert_eq!(matched.as_deref(), Some("base-abc"));
        assert!(work.path().join("vendor/bundle/a.gem").exists());
    }

    #[tokio::test]
    async fn miss_when_nothing_matches() {
        let (_root, _work, store) = fixture();
        let matched = store
            .restore(&bundle_paths(), "base-abc", &["base-".to_string()])
            .await
            .unwrap();
        assert_eq!(matched, None);
    }

    #[tokio::test]
    async fn fallback_picks_newest_matching_entry() {
        let (root, _work, store) = fixture();

        store.save(&bundle_paths(), "base-old").await.unwrap();
        store.save(&bundle_paths(), "base-new").await.unwrap();
        store.save(&bundle_paths(), "other-x").await.unwrap();

        // Pin saved_at so ordering does not depend on test timing
        for (key, when) in [
            ("base-old", "2024-01-01T00:00:00Z"),
            ("base-new", "2024-06-01T00:00:00Z"),
            ("other-x", "2024-12-01T00:00:00Z"),
        ] {
            let meta = EntryMeta {
                key: key.to_string(),
                saved_at: when.parse().unwrap(),
            };
            std::fs::write(
                root.path().join(format!("{}.json", DirStore::stem(key))),
                serde_json::to_string(&meta).unwrap(),
            )
            .unwrap();
        }

        let matched = store
            .restore(&bundle_paths(), "base-missing", &["base-".to_string()])
            .await
            .unwrap();
        assert_eq!(matched.as_deref(), Some("base-new"));
    }

    #[tokio::test]
    async fn save_is_write_once() {
        let (_root, _work, store) = fixture();

        store.save(&bundle_paths(), "base-abc").await.unwrap();
        let err = store.save(&bundle_paths(), "base-abc").await.unwrap_err();
        assert!(matches!(err, StoreError::Reserved(_)));
    }

    #[tokio::test]
    async fn clear_removes_entries() {
        let (_root, _work, store) = fixture();
        store.save(&bundle_paths(), "base-abc").await.unwrap();
        store.save(&bundle_paths(), "base-def").await.unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.entries().unwrap().is_empty());
    }
}
