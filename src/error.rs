//! Error types for the drift change-set and snapshot engine.

use crate::types::{ContentHash, DefinitionId, ResourceId, TemplateId, Version};
use thiserror::Error;

/// Errors raised while encoding or decoding change-set records
#[derive(Debug, Error)]
pub enum ChangeSetError {
    #[error("malformed change set at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("{field} must not contain newlines")]
    EmbeddedNewline { field: &'static str },

    #[error("changed entry for {path:?} must carry distinct old and new hashes")]
    UnchangedContent { path: String },

    #[error("duplicate path {path:?} in change set")]
    DuplicatePath { path: String },

    #[error("codec I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChangeSetError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        ChangeSetError::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

/// Storage-related errors (blob store and change-set log)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    BlobNotFound(ContentHash),

    #[error("content integrity failure: claimed {claimed}, computed {computed}")]
    ContentIntegrity {
        claimed: ContentHash,
        computed: ContentHash,
    },

    #[error("version conflict for resource {resource_id} definition {definition_id}: expected {expected}, received {received}")]
    VersionConflict {
        resource_id: ResourceId,
        definition_id: DefinitionId,
        expected: Version,
        received: Version,
    },

    #[error("no coverage baseline for resource {resource_id} definition {definition_id}")]
    NoBaseline {
        resource_id: ResourceId,
        definition_id: DefinitionId,
    },

    #[error("corrupt head record for resource {resource_id} definition {definition_id}: {len} bytes")]
    HeadCorrupted {
        resource_id: ResourceId,
        definition_id: DefinitionId,
        len: usize,
    },

    #[error("change set not found: resource {resource_id} definition {definition_id} version {version}")]
    ChangeSetNotFound {
        resource_id: ResourceId,
        definition_id: DefinitionId,
        version: Version,
    },

    #[error("log database error: {0}")]
    Database(#[from] sled::Error),

    #[error("log record serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the agent-facing synchronization surface
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("archive of {size} bytes exceeds the {limit} byte upload limit")]
    ArchiveTooLarge { size: u64, limit: u64 },

    #[error("archive claims resource {claimed} but change set belongs to resource {actual}")]
    ResourceMismatch {
        claimed: ResourceId,
        actual: ResourceId,
    },

    #[error("unknown drift definition: {0}")]
    UnknownDefinition(DefinitionId),

    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("sync I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by template management
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(TemplateId),

    #[error("no resource owns definition {0}")]
    UnknownDefinition(DefinitionId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
