//! Agent synchronization service
//!
//! The server side of the agent upload protocol. Each sync cycle an agent
//! sends two independent streams: an archive holding one encoded change-set
//! record, and an archive of content blobs named by their digests. The
//! transport is at-most-once with no retry; recovery happens through the
//! out-of-band repeat-request path, never by replaying uploads.

pub mod archive;

use crate::changelog::ChangeSetStore;
use crate::changeset::codec;
use crate::config::UploadConfig;
use crate::content::ContentStore;
use crate::error::{StorageError, SyncError};
use crate::metrics::MetricsSink;
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::types::{DefinitionId, ResourceId, Version};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Server-to-agent callback seam. Delivery is best effort; a lost
/// instruction just means the agent resends on its next scheduled scan.
pub trait AgentNotifier: Send + Sync {
    fn repeat_change_set(&self, resource_id: ResourceId, definition_name: &str, version: Version);
}

/// Notifier that goes nowhere; useful in tests and single-process setups.
pub struct NullNotifier;

impl AgentNotifier for NullNotifier {
    fn repeat_change_set(&self, _: ResourceId, _: &str, _: Version) {}
}

/// What a definition looks like from the server's side: which resource owns
/// it and what the agent calls it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionHandle {
    pub resource_id: ResourceId,
    pub definition_name: String,
}

/// A repeat instruction waiting on (or already sent to) an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRepeat {
    pub resource_id: ResourceId,
    pub definition_name: String,
    pub version: Version,
    pub requested_at: DateTime<Utc>,
}

/// Result of a change-set upload, as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The change-set was appended at this version.
    Accepted { version: Version },
    /// The upload arrived out of order; a repeat of `expected` was
    /// requested and the upload itself was acknowledged and dropped.
    RepeatRequested { expected: Version, received: Version },
}

pub struct SyncService {
    log: Arc<ChangeSetStore>,
    content: Arc<ContentStore>,
    snapshots: SnapshotBuilder,
    definitions: RwLock<HashMap<DefinitionId, DefinitionHandle>>,
    pending: Mutex<Vec<PendingRepeat>>,
    notifier: Arc<dyn AgentNotifier>,
    metrics: Arc<dyn MetricsSink>,
    upload: UploadConfig,
}

impl SyncService {
    /// Wire up the service and rebuild the definition registry from the log,
    /// so restarts pick up every definition the log has ever seen.
    pub fn new(
        log: Arc<ChangeSetStore>,
        content: Arc<ContentStore>,
        notifier: Arc<dyn AgentNotifier>,
        metrics: Arc<dyn MetricsSink>,
        upload: UploadConfig,
    ) -> Result<Self, StorageError> {
        let mut definitions = HashMap::new();
        for (resource_id, definition_id) in log.definitions()? {
            let head = log.head_version(resource_id, definition_id)?;
            if head == 0 {
                continue;
            }
            let changeset = log.read(resource_id, definition_id, head)?;
            definitions.insert(
                definition_id,
                DefinitionHandle {
                    resource_id,
                    definition_name: changeset.header.definition_name,
                },
            );
        }

        Ok(SyncService {
            snapshots: SnapshotBuilder::new(Arc::clone(&log)),
            log,
            content,
            definitions: RwLock::new(definitions),
            pending: Mutex::new(Vec::new()),
            notifier,
            metrics,
            upload,
        })
    }

    /// Ingest one change-set archive.
    ///
    /// The archive must hold exactly one entry: the encoded record. The
    /// stream is fully unpacked and decoded before the append lock is ever
    /// taken. A version conflict is not an error to the caller: the upload
    /// channel is fire-and-forget, so the service acknowledges receipt,
    /// records a pending repeat for the version it actually needs, and tells
    /// the agent to resend.
    pub fn ingest_changeset(
        &self,
        resource_id: ResourceId,
        size_hint: u64,
        stream: impl Read,
    ) -> Result<IngestOutcome, SyncError> {
        let started = Instant::now();
        debug!(resource_id, size_hint, "change set upload started");
        self.check_size(size_hint)?;

        let mut entries = archive::unpack_entries(stream)?;
        if entries.len() != 1 {
            return Err(SyncError::MalformedArchive(format!(
                "change set archive must hold exactly one record, found {}",
                entries.len()
            )));
        }
        let (_, record) = entries.remove(0);
        let changeset = codec::read_changeset(record.as_slice())?;
        let header = changeset.header.clone();

        if header.resource_id != resource_id {
            return Err(SyncError::ResourceMismatch {
                claimed: resource_id,
                actual: header.resource_id,
            });
        }

        match self.log.append(&changeset) {
            Ok(()) => {
                // Only an accepted upload may (re)name the definition's
                // handle in the registry.
                self.definitions.write().insert(
                    header.definition_id,
                    DefinitionHandle {
                        resource_id,
                        definition_name: header.definition_name.clone(),
                    },
                );
                self.metrics.changeset_ingested(
                    resource_id,
                    header.definition_id,
                    header.version,
                    started.elapsed(),
                );
                Ok(IngestOutcome::Accepted {
                    version: header.version,
                })
            }
            Err(StorageError::VersionConflict {
                expected, received, ..
            }) => {
                warn!(
                    resource_id,
                    definition_id = header.definition_id,
                    expected,
                    received,
                    "out-of-order change set, requesting repeat"
                );
                self.metrics
                    .version_conflict(resource_id, header.definition_id, expected, received);
                self.request_repeat(resource_id, &header.definition_name, expected);
                Ok(IngestOutcome::RepeatRequested { expected, received })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ingest one content archive: flat entries named by content digest.
    ///
    /// `token` is the opaque tag the agent attached when it announced the
    /// upload; it only matters for diagnostics here. Returns the number of
    /// blobs stored. Storing is idempotent, so a partially-received archive
    /// that the agent resends later costs nothing extra.
    pub fn ingest_content(
        &self,
        resource_id: ResourceId,
        definition_name: &str,
        token: &str,
        size_hint: u64,
        stream: impl Read,
    ) -> Result<usize, SyncError> {
        let started = Instant::now();
        debug!(
            resource_id,
            definition_name, token, size_hint, "content upload started"
        );
        self.check_size(size_hint)?;

        let entries = archive::unpack_entries(stream)?;
        let mut stored = 0;
        for (name, bytes) in &entries {
            let hash = name.parse().map_err(|_| {
                SyncError::MalformedArchive(format!("entry name {name:?} is not a content hash"))
            })?;
            self.content.put(&hash, bytes)?;
            stored += 1;
        }

        self.metrics.content_stored(stored, started.elapsed());
        info!(
            resource_id,
            definition_name, token, stored, "content upload complete"
        );
        Ok(stored)
    }

    fn check_size(&self, size_hint: u64) -> Result<(), SyncError> {
        if size_hint > self.upload.max_archive_bytes {
            return Err(SyncError::ArchiveTooLarge {
                size: size_hint,
                limit: self.upload.max_archive_bytes,
            });
        }
        Ok(())
    }

    /// Ask the agent to recompute and resend the change-set at `version`.
    /// Used after version conflicts, server-side data loss, or an agent
    /// restart with uncertain last-acked state.
    pub fn request_repeat(&self, resource_id: ResourceId, definition_name: &str, version: Version) {
        self.pending.lock().push(PendingRepeat {
            resource_id,
            definition_name: definition_name.to_string(),
            version,
            requested_at: Utc::now(),
        });
        self.notifier
            .repeat_change_set(resource_id, definition_name, version);
    }

    /// Repeat instructions recorded so far, oldest first.
    pub fn pending_repeats(&self) -> Vec<PendingRepeat> {
        self.pending.lock().clone()
    }

    /// Drop pending repeats that a subsequent successful append has made
    /// moot, returning how many were cleared.
    pub fn clear_repeats_through(
        &self,
        resource_id: ResourceId,
        definition_name: &str,
        version: Version,
    ) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|r| {
            !(r.resource_id == resource_id
                && r.definition_name == definition_name
                && r.version <= version)
        });
        before - pending.len()
    }

    /// The definition registry entry for `definition_id`, if known.
    pub fn definition(&self, definition_id: DefinitionId) -> Option<DefinitionHandle> {
        self.definitions.read().get(&definition_id).cloned()
    }

    /// Snapshot of a definition at its current head version.
    pub fn current_snapshot(&self, definition_id: DefinitionId) -> Result<Snapshot, SyncError> {
        let handle = self
            .definition(definition_id)
            .ok_or(SyncError::UnknownDefinition(definition_id))?;
        let head = self.log.head_version(handle.resource_id, definition_id)?;
        Ok(self.snapshots.build(handle.resource_id, definition_id, head)?)
    }

    /// Full snapshot at `version`.
    pub fn snapshot_at(
        &self,
        definition_id: DefinitionId,
        version: Version,
    ) -> Result<Snapshot, SyncError> {
        let handle = self
            .definition(definition_id)
            .ok_or(SyncError::UnknownDefinition(definition_id))?;
        Ok(self.snapshots.build(handle.resource_id, definition_id, version)?)
    }

    /// Delta snapshot: paths touched strictly after `from`, up to `to`.
    pub fn snapshot(
        &self,
        definition_id: DefinitionId,
        from: Version,
        to: Version,
    ) -> Result<Snapshot, SyncError> {
        let handle = self
            .definition(definition_id)
            .ok_or(SyncError::UnknownDefinition(definition_id))?;
        Ok(self
            .snapshots
            .build_delta(handle.resource_id, definition_id, from, to)?)
    }

    /// Maintenance entrypoint: purge blobs no stored change-set references
    /// and that were written before `older_than`. The reference set is
    /// recomputed from the full log under this call, so a blob whose
    /// referencing change-set committed before the scan is always retained.
    pub fn purge_orphans(&self, older_than: DateTime<Utc>) -> Result<usize, SyncError> {
        let referenced = self.log.referenced_hashes()?;
        let removed = self.content.purge_orphans(&referenced, older_than)?;
        self.metrics.orphans_purged(removed);
        info!(removed, %older_than, "orphan purge complete");
        Ok(removed)
    }
}
