//! Content-addressed blob storage
//!
//! Stores raw file content on the filesystem keyed by its digest, at
//! `{root}/blobs/{hex[0..2]}/{hex[2..4]}/{hash}`. The shard prefixes keep
//! directory sizes bounded; identical content is stored once.
//!
//! Blobs are immutable: `put` verifies the claimed digest against the
//! computed one, writes atomically (tmp + rename), and is a no-op for a
//! digest that is already present.

use crate::error::StorageError;
use crate::types::ContentHash;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Distinguishes the temp files of concurrent writers of the same digest.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (or create) a content store rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("blobs"))?;
        Ok(ContentStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `bytes` under `hash`.
    ///
    /// The computed digest of `bytes` must match `hash`; otherwise the write
    /// is rejected with `ContentIntegrity` and nothing is stored. Storing a
    /// digest that already exists is a no-op, so concurrent writers of the
    /// same content cannot conflict.
    pub fn put(&self, hash: &ContentHash, bytes: &[u8]) -> Result<(), StorageError> {
        let computed = ContentHash::of(bytes);
        if computed != *hash {
            return Err(StorageError::ContentIntegrity {
                claimed: hash.clone(),
                computed,
            });
        }

        let blob_path = self.blob_path(hash);
        if blob_path.exists() {
            debug!(%hash, "blob already stored, skipping");
            return Ok(());
        }

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Each writer gets its own temp file; two racing writers of the
        // same digest must never truncate or rename out from under each
        // other.
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_path = blob_path.with_extension(format!("{n}.tmp"));
        fs::write(&temp_path, bytes)?;
        if let Err(e) = fs::rename(&temp_path, &blob_path) {
            let _ = fs::remove_file(&temp_path);
            // A concurrent writer of the same digest may have landed the
            // blob first; content is verified, so that counts as stored.
            if blob_path.exists() {
                debug!(%hash, "blob stored by concurrent writer");
                return Ok(());
            }
            return Err(e.into());
        }

        debug!(%hash, size = bytes.len(), "blob stored");
        Ok(())
    }

    /// Fetch the content stored under `hash`.
    pub fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, StorageError> {
        let blob_path = self.blob_path(hash);
        if !blob_path.exists() {
            return Err(StorageError::BlobNotFound(hash.clone()));
        }
        Ok(fs::read(blob_path)?)
    }

    pub fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(self.blob_path(hash).exists())
    }

    /// Number of stored blobs. Scans the store; intended for reporting and
    /// tests, not hot paths.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.walk_blobs().count())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.walk_blobs().next().is_none())
    }

    /// Delete blobs that are not in `referenced` and were written before
    /// `older_than`. Returns the number of blobs removed.
    ///
    /// The age watermark protects uploads whose referencing change-set has
    /// not committed yet: callers pass a watermark older than the longest
    /// plausible in-flight upload.
    pub fn purge_orphans(
        &self,
        referenced: &HashSet<ContentHash>,
        older_than: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let mut purged = 0;
        for path in self.walk_blobs().collect::<Vec<_>>() {
            let Some(hash) = hash_from_path(&path) else {
                warn!(?path, "ignoring unrecognized file in blob store");
                continue;
            };
            if referenced.contains(&hash) {
                continue;
            }
            let written_at: DateTime<Utc> = fs::metadata(&path)?.modified()?.into();
            if written_at >= older_than {
                continue;
            }
            fs::remove_file(&path)?;
            debug!(%hash, %written_at, "purged orphaned blob");
            purged += 1;
        }
        Ok(purged)
    }

    /// Path layout: `blobs/{hex[0..2]}/{hex[2..4]}/{hash}`. Digests shorter
    /// than four characters land directly under `blobs/`.
    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.as_str();
        let blobs = self.root.join("blobs");
        if hex.len() < 4 {
            return blobs.join(hex);
        }
        blobs.join(&hex[0..2]).join(&hex[2..4]).join(hex)
    }

    fn walk_blobs(&self) -> impl Iterator<Item = PathBuf> {
        WalkDir::new(self.root.join("blobs"))
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_none())
            .map(|entry| entry.into_path())
    }
}

fn hash_from_path(path: &Path) -> Option<ContentHash> {
    let name = path.file_name()?.to_str()?;
    ContentHash::from_str(name).ok()
}
