use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Unrecoverable conditions. Ordinary command failures are reported as
/// [`crate::OperationOutcome::Failed`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage root not found: {0}")]
    StorageRootMissing(PathBuf),

    #[error("Change set has no paths")]
    EmptyChangeSet,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("A synchronization operation is already in flight")]
    Busy,

    #[error("Sync worker has shut down")]
    WorkerClosed,
}
