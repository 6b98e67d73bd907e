//! Definition templates
//!
//! A template packages a drift definition configuration, optionally with a
//! pinned baseline, so resources of one type can start tracking from a
//! shared known-good state. Pinning copies the realized snapshot of a
//! source definition into a synthetic coverage change-set owned by the
//! template; later drift on the source never reaches the template, and
//! resources that derived a baseline from an earlier pin keep it.

use crate::changelog::ChangeSetStore;
use crate::changeset::{ChangeSet, ChangeSetCategory, ChangeSetHeader, FileEntry};
use crate::error::TemplateError;
use crate::snapshot::SnapshotBuilder;
use crate::types::{DefinitionId, ResourceId, TemplateId, Version};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Configuration payload of a drift definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftDefinitionConfig {
    pub name: String,
    pub base_directory: String,
    /// Seconds between drift scans on the agent.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the definition compares against a pinned baseline instead of
    /// its own rolling one.
    #[serde(default)]
    pub pinned: bool,
    /// Whether definitions derived from a template follow template updates.
    #[serde(default = "default_true")]
    pub attached: bool,
}

fn default_interval_secs() -> u64 {
    1800
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: TemplateId,
    pub resource_type_id: u32,
    pub is_user_defined: bool,
    pub config: DriftDefinitionConfig,
    /// Synthetic coverage change-set this template seeds new definitions
    /// with; absent until the template is pinned.
    pub baseline: Option<ChangeSet>,
}

pub struct TemplateManager {
    log: Arc<ChangeSetStore>,
    snapshots: SnapshotBuilder,
    templates: RwLock<HashMap<TemplateId, Template>>,
    next_id: RwLock<TemplateId>,
}

impl TemplateManager {
    pub fn new(log: Arc<ChangeSetStore>) -> Self {
        TemplateManager {
            snapshots: SnapshotBuilder::new(Arc::clone(&log)),
            log,
            templates: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
        }
    }

    pub fn create_template(
        &self,
        resource_type_id: u32,
        is_user_defined: bool,
        config: DriftDefinitionConfig,
    ) -> TemplateId {
        let mut next_id = self.next_id.write();
        let id = *next_id;
        *next_id += 1;

        self.templates.write().insert(
            id,
            Template {
                id,
                resource_type_id,
                is_user_defined,
                config,
                baseline: None,
            },
        );
        info!(template_id = id, resource_type_id, "template created");
        id
    }

    /// Pin the realized snapshot of `source_definition_id` at
    /// `source_version` as this template's baseline.
    ///
    /// The snapshot is materialized into a fresh version-1 coverage
    /// change-set owned by the template; nothing is shared with the source
    /// definition's log. Pinning an unknown or not-yet-baselined definition
    /// fails with the snapshot builder's `NoBaseline`.
    pub fn pin_template(
        &self,
        template_id: TemplateId,
        source_definition_id: DefinitionId,
        source_version: Version,
    ) -> Result<(), TemplateError> {
        let resource_id = self.resource_of(source_definition_id)?;
        let snapshot = self
            .snapshots
            .build(resource_id, source_definition_id, source_version)?;

        let mut templates = self.templates.write();
        let template = templates
            .get_mut(&template_id)
            .ok_or(TemplateError::NotFound(template_id))?;

        let entries: Vec<FileEntry> = snapshot
            .files
            .iter()
            .map(|(path, hash)| FileEntry::added(path.clone(), hash.clone()))
            .collect();
        template.baseline = Some(ChangeSet::new(
            ChangeSetHeader {
                resource_id: 0,
                definition_id: 0,
                definition_name: template.config.name.clone(),
                base_directory: template.config.base_directory.clone(),
                category: ChangeSetCategory::Coverage,
                version: 1,
            },
            entries,
        ));
        template.config.pinned = true;

        info!(
            template_id,
            source_definition_id,
            source_version,
            files = snapshot.files.len(),
            "template pinned"
        );
        Ok(())
    }

    /// Replace a template's configuration. The pinned baseline, if any,
    /// stays; definitions that already derived their own baseline from an
    /// earlier pin are unaffected either way.
    pub fn update_template(
        &self,
        template_id: TemplateId,
        config: DriftDefinitionConfig,
    ) -> Result<(), TemplateError> {
        let mut templates = self.templates.write();
        let template = templates
            .get_mut(&template_id)
            .ok_or(TemplateError::NotFound(template_id))?;
        template.config = config;
        Ok(())
    }

    pub fn delete_template(&self, template_id: TemplateId) -> Result<(), TemplateError> {
        self.templates
            .write()
            .remove(&template_id)
            .map(|_| ())
            .ok_or(TemplateError::NotFound(template_id))
    }

    pub fn template(&self, template_id: TemplateId) -> Option<Template> {
        self.templates.read().get(&template_id).cloned()
    }

    pub fn templates_for_type(&self, resource_type_id: u32) -> Vec<Template> {
        let mut out: Vec<Template> = self
            .templates
            .read()
            .values()
            .filter(|t| t.resource_type_id == resource_type_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.id);
        out
    }

    fn resource_of(&self, definition_id: DefinitionId) -> Result<ResourceId, TemplateError> {
        self.log
            .resource_of(definition_id)?
            .ok_or(TemplateError::UnknownDefinition(definition_id))
    }
}
