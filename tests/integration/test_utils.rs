//! Shared fixtures for the integration tests.

use driftline::changelog::ChangeSetStore;
use driftline::changeset::codec::write_changeset;
use driftline::changeset::{ChangeSet, ChangeSetCategory, ChangeSetHeader, FileEntry};
use driftline::config::UploadConfig;
use driftline::content::ContentStore;
use driftline::metrics::NoopMetrics;
use driftline::sync::{archive, NullNotifier, SyncService};
use driftline::types::{ContentHash, DefinitionId, ResourceId, Version};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    // Kept alive so the stores' directories survive the test body.
    pub _log_dir: TempDir,
    pub _content_dir: TempDir,
    pub log: Arc<ChangeSetStore>,
    pub content: Arc<ContentStore>,
    pub service: SyncService,
}

pub fn harness() -> Harness {
    let log_dir = TempDir::new().unwrap();
    let content_dir = TempDir::new().unwrap();
    let log = Arc::new(ChangeSetStore::new(log_dir.path()).unwrap());
    let content = Arc::new(ContentStore::new(content_dir.path()).unwrap());
    let service = SyncService::new(
        Arc::clone(&log),
        Arc::clone(&content),
        Arc::new(NullNotifier),
        Arc::new(NoopMetrics),
        UploadConfig::default(),
    )
    .unwrap();
    Harness {
        _log_dir: log_dir,
        _content_dir: content_dir,
        log,
        content,
        service,
    }
}

pub fn hash(s: &str) -> ContentHash {
    s.parse().unwrap()
}

pub fn changeset(
    resource_id: ResourceId,
    definition_id: DefinitionId,
    category: ChangeSetCategory,
    version: Version,
    entries: Vec<FileEntry>,
) -> ChangeSet {
    ChangeSet::new(
        ChangeSetHeader {
            resource_id,
            definition_id,
            definition_name: "core-config".to_string(),
            base_directory: "/opt/app/conf".to_string(),
            category,
            version,
        },
        entries,
    )
}

/// Wrap an encoded change-set record in the upload archive format.
pub fn changeset_archive(changeset: &ChangeSet) -> Vec<u8> {
    let mut record = Vec::new();
    write_changeset(&mut record, changeset).unwrap();
    let mut buf = Vec::new();
    archive::pack_entries(&mut buf, &[("changeset".to_string(), record)]).unwrap();
    buf
}

/// Build a content archive from raw blobs, naming each entry by its digest.
pub fn content_archive(blobs: &[&[u8]]) -> (Vec<u8>, Vec<ContentHash>) {
    let entries: Vec<(String, Vec<u8>)> = blobs
        .iter()
        .map(|b| (ContentHash::of(b).to_string(), b.to_vec()))
        .collect();
    let hashes = blobs.iter().map(|b| ContentHash::of(b)).collect();
    let mut buf = Vec::new();
    archive::pack_entries(&mut buf, &entries).unwrap();
    (buf, hashes)
}
