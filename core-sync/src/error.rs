use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync folder unavailable: {0}")]
    FolderUnavailable(String),

    #[error("Unparsable playback record {path}: {message}")]
    RecordParse { path: String, message: String },

    #[error("Content identifier unavailable for {0}")]
    Identity(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] core_runtime::Error),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the error only means sync is disabled for this operation.
    pub fn is_folder_unavailable(&self) -> bool {
        match self {
            SyncError::FolderUnavailable(_) => true,
            SyncError::Bridge(e) => e.is_not_found() || matches!(e, BridgeError::PermissionDenied(_)),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
