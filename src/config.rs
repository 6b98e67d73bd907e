//! Runtime configuration
//!
//! Layered configuration: built-in defaults, then an optional TOML file,
//! then `DRIFTLINE_*` environment overrides.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DriftConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub purge: PurgeConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the change-set log and blob store live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn changelog_dir(&self) -> PathBuf {
        self.data_dir.join("changelog")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.data_dir.join("content")
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("driftline-data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: default_data_dir(),
        }
    }
}

/// Orphan purge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Minimum blob age before it is eligible for purging. Must comfortably
    /// exceed the longest plausible in-flight upload so a blob is never
    /// removed while its referencing change-set is still being committed.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

impl Default for PurgeConfig {
    fn default() -> Self {
        PurgeConfig {
            retention_secs: default_retention_secs(),
        }
    }
}

/// Upload transport limits, enforced by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Abandon a stalled archive stream after this many seconds. Enforced
    /// by the transport feeding the ingest streams, not by the engine.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Reject archives whose declared size exceeds this bound. Checked by
    /// the sync service before an archive is unpacked.
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_archive_bytes() -> u64 {
    256 * 1024 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            timeout_secs: default_timeout_secs(),
            max_archive_bytes: default_max_archive_bytes(),
        }
    }
}

impl DriftConfig {
    /// Load configuration from an optional file plus environment overrides
    /// (`DRIFTLINE_STORAGE__DATA_DIR` and friends).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            let name = path.to_str().ok_or_else(|| {
                ConfigError::Invalid(format!("config path {path:?} is not valid UTF-8"))
            })?;
            builder = builder.add_source(File::with_name(name));
        }
        let settings = builder
            .add_source(Environment::with_prefix("DRIFTLINE").separator("__"))
            .build()?;
        let loaded: DriftConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.purge.retention_secs == 0 {
            return Err(ConfigError::Invalid(
                "purge.retention_secs must be positive; a zero retention races in-flight uploads"
                    .to_string(),
            ));
        }
        if self.upload.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upload.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
