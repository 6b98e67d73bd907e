//! Metrics sink seam
//!
//! Ingest and maintenance paths report through an injected sink rather than
//! a global registry, so deployments can wire in whatever backend they run.

use crate::types::{DefinitionId, ResourceId, Version};
use std::time::Duration;

pub trait MetricsSink: Send + Sync {
    /// A change-set was accepted into the log.
    fn changeset_ingested(
        &self,
        resource_id: ResourceId,
        definition_id: DefinitionId,
        version: Version,
        elapsed: Duration,
    );

    /// An append was rejected for arriving out of order.
    fn version_conflict(
        &self,
        resource_id: ResourceId,
        definition_id: DefinitionId,
        expected: Version,
        received: Version,
    );

    /// A content archive was unpacked into the blob store.
    fn content_stored(&self, blobs: usize, elapsed: Duration);

    /// The orphan purge completed.
    fn orphans_purged(&self, removed: usize);
}

/// Sink that drops everything; the default when no backend is wired in.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn changeset_ingested(&self, _: ResourceId, _: DefinitionId, _: Version, _: Duration) {}
    fn version_conflict(&self, _: ResourceId, _: DefinitionId, _: Version, _: Version) {}
    fn content_stored(&self, _: usize, _: Duration) {}
    fn orphans_purged(&self, _: usize) {}
}
