//! # External Record Store
//!
//! Durable playback-position records inside the user-chosen sync folder.
//!
//! Two layouts share the [`RecordStore`] contract:
//! - [`PerFileRecordStore`]: one small JSON file per identifier in a
//!   subdirectory (default)
//! - [`AggregateRecordStore`]: a single pretty-printed JSON array
//!
//! Both confine their I/O to their own subdirectory or file, serialize their
//! own reads and writes with a mutex, and never assume exclusive ownership of
//! the folder: a cloud client may change it between any two accesses, so
//! unparsable entries are skipped and a revoked or missing folder reads as
//! empty.

mod aggregate;
mod per_file;

pub use aggregate::AggregateRecordStore;
pub use per_file::PerFileRecordStore;

use crate::error::{Result, SyncError};
use crate::identity::ContentId;
use crate::record::PlaybackPositionRecord;
use async_trait::async_trait;
use bridge_traits::FileSystemAccess;
use core_runtime::config::{CoreConfig, RecordLayout};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read every record, optionally only those updated after `since` (Unix ms).
    ///
    /// At most one record per identifier is returned, the one with the newest
    /// `last_updated`. An unavailable folder yields an empty list.
    async fn read_all(&self, folder: &str, since: Option<i64>) -> Result<Vec<PlaybackPositionRecord>>;

    /// Read the live record for one identifier.
    async fn read(&self, folder: &str, identifier: &ContentId) -> Result<Option<PlaybackPositionRecord>>;

    /// Create or replace the record for `record.identifier`.
    ///
    /// # Errors
    /// [`SyncError::FolderUnavailable`] when the folder is gone or revoked.
    async fn write(&self, folder: &str, record: &PlaybackPositionRecord) -> Result<()>;

    /// Create or replace several records.
    async fn write_all(&self, folder: &str, records: &[PlaybackPositionRecord]) -> Result<()> {
        for record in records {
            self.write(folder, record).await?;
        }
        Ok(())
    }
}

/// Build the store selected by `config.record_layout`.
pub fn from_config(config: &CoreConfig) -> Arc<dyn RecordStore> {
    match config.record_layout {
        RecordLayout::PerFile => Arc::new(PerFileRecordStore::new(
            config.file_system.clone(),
            config.records_directory_name.clone(),
        )),
        RecordLayout::Aggregate => Arc::new(AggregateRecordStore::new(
            config.file_system.clone(),
            config.aggregate_file_name.clone(),
        )),
    }
}

/// Resolve `folder` and make sure it is still an accessible directory.
pub(crate) async fn accessible_root(fs: &dyn FileSystemAccess, folder: &str) -> Result<PathBuf> {
    if folder.trim().is_empty() {
        return Err(SyncError::FolderUnavailable("no folder selected".to_string()));
    }

    let root = fs.resolve(folder);
    match fs.is_accessible_directory(&root).await {
        Ok(true) => Ok(root),
        Ok(false) => Err(SyncError::FolderUnavailable(display_name(&root))),
        Err(e) => Err(SyncError::FolderUnavailable(format!("{}: {e}", display_name(&root)))),
    }
}

/// Keep the newest record of each identifier, in first-seen order.
pub(crate) fn newest_per_identifier(records: Vec<PlaybackPositionRecord>) -> Vec<PlaybackPositionRecord> {
    let mut positions: HashMap<ContentId, usize> = HashMap::with_capacity(records.len());
    let mut newest: Vec<PlaybackPositionRecord> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(&record.identifier) {
            Some(&index) => {
                if record.last_updated > newest[index].last_updated {
                    newest[index] = record;
                }
            }
            None => {
                positions.insert(record.identifier.clone(), newest.len());
                newest.push(record);
            }
        }
    }
    newest
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
