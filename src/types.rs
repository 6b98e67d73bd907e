//! Core identifier types for the drift engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Identifier of a monitored resource.
pub type ResourceId = u32;

/// Identifier of a drift definition attached to a resource.
pub type DefinitionId = u32;

/// Change-set version number. Versions start at 1 and increase by exactly
/// one per (resource, definition) key; 0 means "no change-set yet".
pub type Version = u32;

/// Identifier of a definition template.
pub type TemplateId = u32;

/// Hex-encoded content digest; the universal key into the content store.
///
/// `ContentHash::of` always produces a full 64-character SHA-256 digest.
/// Parsing accepts any non-empty hex string so that short digests appearing
/// in hand-written change-set records remain readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute the SHA-256 digest of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        ContentHash(hex::encode(hasher.finalize()))
    }

    /// The hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a string is not a valid hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content hash {0:?}: must be non-empty lowercase hex")]
pub struct InvalidHash(pub String);

impl FromStr for ContentHash {
    type Err = InvalidHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(InvalidHash(s.to_string()));
        }
        Ok(ContentHash(s.to_string()))
    }
}
