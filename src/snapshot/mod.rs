//! Snapshot reconstruction
//!
//! A snapshot is the materialized `path -> content hash` view of one
//! definition at a target version: the most recent coverage baseline at or
//! below the target, folded with every later drift change-set in version
//! order. Because the log is append-only, a snapshot for a fixed version is
//! stable forever.

use crate::changelog::ChangeSetStore;
use crate::changeset::{ChangeSet, ChangeSetCategory, EntryKind};
use crate::content::ContentStore;
use crate::error::StorageError;
use crate::types::{ContentHash, DefinitionId, ResourceId, Version};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Materialized file-state view for one definition at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub resource_id: ResourceId,
    pub definition_id: DefinitionId,
    pub version: Version,
    pub files: BTreeMap<String, ContentHash>,
}

/// A snapshot entry whose content is structurally known but absent from the
/// content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingContent {
    pub path: String,
    pub hash: ContentHash,
}

pub struct SnapshotBuilder {
    log: Arc<ChangeSetStore>,
}

impl SnapshotBuilder {
    pub fn new(log: Arc<ChangeSetStore>) -> Self {
        SnapshotBuilder { log }
    }

    /// Reconstruct the file-state view at `target_version`.
    ///
    /// Fails with `NoBaseline` when no coverage change-set exists at or
    /// below the target. Deterministic: the same inputs always produce the
    /// same map.
    pub fn build(
        &self,
        resource_id: ResourceId,
        definition_id: DefinitionId,
        target_version: Version,
    ) -> Result<Snapshot, StorageError> {
        let sets = self
            .log
            .read_range(resource_id, definition_id, 1, target_version)?;

        let baseline_index = sets
            .iter()
            .rposition(|cs| cs.header.category == ChangeSetCategory::Coverage)
            .ok_or(StorageError::NoBaseline {
                resource_id,
                definition_id,
            })?;

        let mut files = BTreeMap::new();
        // Every baseline entry seeds the map, whatever its recorded kind.
        for entry in &sets[baseline_index].entries {
            match &entry.new_hash {
                Some(hash) => {
                    files.insert(entry.path.clone(), hash.clone());
                }
                None => warn!(
                    resource_id,
                    definition_id,
                    path = %entry.path,
                    "coverage entry without a new hash, skipping"
                ),
            }
        }

        for changeset in &sets[baseline_index + 1..] {
            apply_drift(&mut files, changeset);
        }

        debug!(
            resource_id,
            definition_id,
            target_version,
            files = files.len(),
            "snapshot built"
        );
        Ok(Snapshot {
            resource_id,
            definition_id,
            version: target_version,
            files,
        })
    }

    /// Restricted "what changed since I last looked" view: the paths touched
    /// by drift change-sets with `from < version <= to`, mapped to their
    /// latest hash. Paths whose final state in the window is a removal are
    /// absent from the result.
    pub fn build_delta(
        &self,
        resource_id: ResourceId,
        definition_id: DefinitionId,
        from: Version,
        to: Version,
    ) -> Result<Snapshot, StorageError> {
        let sets = self
            .log
            .read_range(resource_id, definition_id, from + 1, to)?;

        let mut files = BTreeMap::new();
        for changeset in &sets {
            for entry in &changeset.entries {
                match entry.kind {
                    EntryKind::Added | EntryKind::Changed => {
                        if let Some(hash) = &entry.new_hash {
                            files.insert(entry.path.clone(), hash.clone());
                        }
                    }
                    EntryKind::Removed => {
                        files.remove(&entry.path);
                    }
                }
            }
        }

        Ok(Snapshot {
            resource_id,
            definition_id,
            version: to,
            files,
        })
    }
}

/// Report the snapshot entries whose blobs are absent from the content
/// store. The structural map stands on its own; content gaps are a separate,
/// recoverable condition.
pub fn verify_content(
    snapshot: &Snapshot,
    content: &ContentStore,
) -> Result<Vec<MissingContent>, StorageError> {
    let mut missing = Vec::new();
    for (path, hash) in &snapshot.files {
        if !content.exists(hash)? {
            warn!(path = %path, %hash, "snapshot references missing content");
            missing.push(MissingContent {
                path: path.clone(),
                hash: hash.clone(),
            });
        }
    }
    Ok(missing)
}

fn apply_drift(files: &mut BTreeMap<String, ContentHash>, changeset: &ChangeSet) {
    let header = &changeset.header;
    for entry in &changeset.entries {
        match entry.kind {
            EntryKind::Added => {
                if let Some(hash) = &entry.new_hash {
                    files.insert(entry.path.clone(), hash.clone());
                }
            }
            EntryKind::Changed => {
                // A change to a path we have never seen is a recoverable
                // anomaly: log it and leave the map untouched.
                if !files.contains_key(&entry.path) {
                    warn!(
                        resource_id = header.resource_id,
                        definition_id = header.definition_id,
                        version = header.version,
                        path = %entry.path,
                        "changed entry for unknown path, skipping"
                    );
                    continue;
                }
                if let Some(hash) = &entry.new_hash {
                    files.insert(entry.path.clone(), hash.clone());
                }
            }
            EntryKind::Removed => {
                if files.remove(&entry.path).is_none() {
                    warn!(
                        resource_id = header.resource_id,
                        definition_id = header.definition_id,
                        version = header.version,
                        path = %entry.path,
                        "removed entry for unknown path, skipping"
                    );
                }
            }
        }
    }
}
