//! Change-set data model
//!
//! A change-set is one versioned record describing either a full file-state
//! baseline (coverage) or a delta against the previous version (drift).
//! Change-sets are immutable once appended to the log.

pub mod codec;

use crate::error::ChangeSetError;
use crate::types::{ContentHash, DefinitionId, ResourceId, Version};
use serde::{Deserialize, Serialize};

/// Category of a change-set: full baseline or delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeSetCategory {
    Coverage,
    Drift,
}

impl ChangeSetCategory {
    /// Single-letter wire code used in the record format.
    pub fn code(&self) -> &'static str {
        match self {
            ChangeSetCategory::Coverage => "C",
            ChangeSetCategory::Drift => "D",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "C" => Some(ChangeSetCategory::Coverage),
            "D" => Some(ChangeSetCategory::Drift),
            _ => None,
        }
    }
}

/// Kind of a single file entry within a change-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Added,
    Removed,
    Changed,
}

impl EntryKind {
    pub fn code(&self) -> &'static str {
        match self {
            EntryKind::Added => "A",
            EntryKind::Removed => "R",
            EntryKind::Changed => "C",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(EntryKind::Added),
            "R" => Some(EntryKind::Removed),
            "C" => Some(EntryKind::Changed),
            _ => None,
        }
    }
}

/// One line-item inside a change-set.
///
/// Invariant, enforced by the constructors: `Added` carries only `new_hash`,
/// `Removed` carries only `old_hash`, `Changed` carries both and they differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub kind: EntryKind,
    /// Path relative to the definition's base directory. May contain spaces.
    pub path: String,
    pub new_hash: Option<ContentHash>,
    pub old_hash: Option<ContentHash>,
}

impl FileEntry {
    pub fn added(path: impl Into<String>, new_hash: ContentHash) -> Self {
        FileEntry {
            kind: EntryKind::Added,
            path: path.into(),
            new_hash: Some(new_hash),
            old_hash: None,
        }
    }

    pub fn removed(path: impl Into<String>, old_hash: ContentHash) -> Self {
        FileEntry {
            kind: EntryKind::Removed,
            path: path.into(),
            new_hash: None,
            old_hash: Some(old_hash),
        }
    }

    /// Build a `Changed` entry. Fails if old and new digests are equal,
    /// since such an entry would describe no change at all.
    pub fn changed(
        path: impl Into<String>,
        new_hash: ContentHash,
        old_hash: ContentHash,
    ) -> Result<Self, ChangeSetError> {
        let path = path.into();
        if new_hash == old_hash {
            return Err(ChangeSetError::UnchangedContent { path });
        }
        Ok(FileEntry {
            kind: EntryKind::Changed,
            path,
            new_hash: Some(new_hash),
            old_hash: Some(old_hash),
        })
    }
}

/// Identifies and types one change-set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetHeader {
    pub resource_id: ResourceId,
    pub definition_id: DefinitionId,
    pub definition_name: String,
    /// Absolute base directory the entry paths are relative to.
    pub base_directory: String,
    pub category: ChangeSetCategory,
    pub version: Version,
}

/// Header plus ordered file entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub header: ChangeSetHeader,
    pub entries: Vec<FileEntry>,
}

impl ChangeSet {
    pub fn new(header: ChangeSetHeader, entries: Vec<FileEntry>) -> Self {
        ChangeSet { header, entries }
    }
}
