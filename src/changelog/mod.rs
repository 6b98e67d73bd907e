//! Append-only change-set log
//!
//! One ordered log of change-sets per (resource, definition) key, persisted
//! in sled with bincode-encoded values. Appends enforce the monotonic
//! version invariant: a change-set is accepted only when its version is
//! exactly one greater than the current head, and a key's first change-set
//! must be a version-1 coverage baseline.
//!
//! Appends for the same key are serialized through a keyed mutex; appends
//! for different keys proceed independently.

mod locks;

use crate::changeset::{ChangeSet, ChangeSetCategory};
use crate::error::StorageError;
use crate::types::{ContentHash, DefinitionId, ResourceId, Version};
use locks::KeyLockManager;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const CHANGESET_PREFIX: &[u8] = b"cs:";
const HEAD_PREFIX: &[u8] = b"head:";

pub struct ChangeSetStore {
    db: sled::Db,
    append_locks: KeyLockManager<(ResourceId, DefinitionId)>,
}

impl ChangeSetStore {
    /// Open (or create) a change-set log at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(ChangeSetStore {
            db,
            append_locks: KeyLockManager::new(),
        })
    }

    /// Append a change-set for its (resource, definition) key.
    ///
    /// Succeeds only when `header.version == head_version + 1`. The first
    /// change-set for a key must be a version-1 coverage baseline; a drift
    /// record arriving before any baseline is rejected with `NoBaseline`.
    /// A rejected append leaves the log untouched.
    pub fn append(&self, changeset: &ChangeSet) -> Result<(), StorageError> {
        let header = &changeset.header;
        let key = (header.resource_id, header.definition_id);

        let lock = self.append_locks.get(&key);
        let _guard = lock.lock();

        let head = self.head_version(header.resource_id, header.definition_id)?;
        if head == 0 && header.category != ChangeSetCategory::Coverage {
            return Err(StorageError::NoBaseline {
                resource_id: header.resource_id,
                definition_id: header.definition_id,
            });
        }
        let expected = head + 1;
        if header.version != expected {
            return Err(StorageError::VersionConflict {
                resource_id: header.resource_id,
                definition_id: header.definition_id,
                expected,
                received: header.version,
            });
        }

        let value = bincode::serialize(changeset)?;
        self.db.insert(
            changeset_key(header.resource_id, header.definition_id, header.version),
            value,
        )?;
        self.db.insert(
            head_key(header.resource_id, header.definition_id),
            header.version.to_be_bytes().to_vec(),
        )?;

        info!(
            resource_id = header.resource_id,
            definition_id = header.definition_id,
            version = header.version,
            category = header.category.code(),
            entries = changeset.entries.len(),
            "change set appended"
        );
        Ok(())
    }

    /// Current head version for a key, 0 when no change-set exists.
    pub fn head_version(
        &self,
        resource_id: ResourceId,
        definition_id: DefinitionId,
    ) -> Result<Version, StorageError> {
        match self.db.get(head_key(resource_id, definition_id))? {
            Some(bytes) if bytes.len() == 4 => {
                Ok(Version::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            // Defaulting to 0 here would let a fresh coverage baseline
            // overwrite existing records; refuse instead.
            Some(bytes) => Err(StorageError::HeadCorrupted {
                resource_id,
                definition_id,
                len: bytes.len(),
            }),
            None => Ok(0),
        }
    }

    /// Read one change-set by exact version.
    pub fn read(
        &self,
        resource_id: ResourceId,
        definition_id: DefinitionId,
        version: Version,
    ) -> Result<ChangeSet, StorageError> {
        match self.db.get(changeset_key(resource_id, definition_id, version))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(StorageError::ChangeSetNotFound {
                resource_id,
                definition_id,
                version,
            }),
        }
    }

    /// Read the ordered run of change-sets with `from <= version <= to`.
    pub fn read_range(
        &self,
        resource_id: ResourceId,
        definition_id: DefinitionId,
        from: Version,
        to: Version,
    ) -> Result<Vec<ChangeSet>, StorageError> {
        let mut out = Vec::new();
        if from > to {
            return Ok(out);
        }
        let start = changeset_key(resource_id, definition_id, from);
        let end = changeset_key(resource_id, definition_id, to);
        for item in self.db.range(start..=end) {
            let (_, value) = item?;
            out.push(bincode::deserialize(&value)?);
        }
        debug!(
            resource_id,
            definition_id,
            from,
            to,
            count = out.len(),
            "change set range read"
        );
        Ok(out)
    }

    /// All (resource, definition) keys known to the log.
    pub fn definitions(&self) -> Result<Vec<(ResourceId, DefinitionId)>, StorageError> {
        let mut keys = Vec::new();
        for item in self.db.scan_prefix(HEAD_PREFIX) {
            let (key, _) = item?;
            let suffix = &key[HEAD_PREFIX.len()..];
            if suffix.len() != 8 {
                continue;
            }
            let resource_id =
                ResourceId::from_be_bytes([suffix[0], suffix[1], suffix[2], suffix[3]]);
            let definition_id =
                DefinitionId::from_be_bytes([suffix[4], suffix[5], suffix[6], suffix[7]]);
            keys.push((resource_id, definition_id));
        }
        Ok(keys)
    }

    /// The resource that owns `definition_id`, if the log has seen it.
    pub fn resource_of(
        &self,
        definition_id: DefinitionId,
    ) -> Result<Option<ResourceId>, StorageError> {
        Ok(self
            .definitions()?
            .into_iter()
            .find(|(_, d)| *d == definition_id)
            .map(|(r, _)| r))
    }

    /// Every content hash mentioned by any stored change-set, old or new.
    /// This is the live reference set the orphan purge checks against.
    pub fn referenced_hashes(&self) -> Result<HashSet<ContentHash>, StorageError> {
        let mut hashes = HashSet::new();
        for item in self.db.scan_prefix(CHANGESET_PREFIX) {
            let (_, value) = item?;
            let changeset: ChangeSet = bincode::deserialize(&value)?;
            for entry in &changeset.entries {
                if let Some(h) = &entry.new_hash {
                    hashes.insert(h.clone());
                }
                if let Some(h) = &entry.old_hash {
                    hashes.insert(h.clone());
                }
            }
        }
        Ok(hashes)
    }
}

/// Key layout: prefix, then big-endian ids so sled range scans iterate in
/// version order.
fn changeset_key(resource_id: ResourceId, definition_id: DefinitionId, version: Version) -> Vec<u8> {
    let mut key = Vec::with_capacity(CHANGESET_PREFIX.len() + 12);
    key.extend_from_slice(CHANGESET_PREFIX);
    key.extend_from_slice(&resource_id.to_be_bytes());
    key.extend_from_slice(&definition_id.to_be_bytes());
    key.extend_from_slice(&version.to_be_bytes());
    key
}

fn head_key(resource_id: ResourceId, definition_id: DefinitionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(HEAD_PREFIX.len() + 8);
    key.extend_from_slice(HEAD_PREFIX);
    key.extend_from_slice(&resource_id.to_be_bytes());
    key.extend_from_slice(&definition_id.to_be_bytes());
    key
}
