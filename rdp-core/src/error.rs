//! Error types for inventory access, configuration and remediation

use nsg_eval::NsgError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("VM {vm} not found in resource group {resource_group}")]
    VmNotFound { resource_group: String, vm: String },

    #[error("Network security group not found: {0}")]
    NsgNotFound(String),

    #[error("Action has no target security group: {0}")]
    UntargetedAction(String),

    #[error("No inventory configured; pass --snapshot or set ENABLE_RDP_SNAPSHOT")]
    NoInventory,

    #[error("Failed to read snapshot {path}: {source}")]
    SnapshotLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse snapshot {path}: {source}")]
    SnapshotParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write snapshot {path}: {source}")]
    SnapshotWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    SnapshotSerialize(#[from] toml::ser::Error),

    #[error("Failed to load config from {path}: {source}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Nsg(#[from] NsgError),

    #[error("Failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}
