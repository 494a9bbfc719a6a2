//! Single aggregate record file.
//!
//! Layout: `<folder>/<file_name>` holding a pretty-printed JSON array of
//! records. Every write reads the array, replaces all entries with the same
//! identifier by the new one and rewrites the whole file.

use super::{accessible_root, display_name, newest_per_identifier, RecordStore};
use crate::error::{Result, SyncError};
use crate::identity::ContentId;
use crate::record::PlaybackPositionRecord;
use async_trait::async_trait;
use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

pub struct AggregateRecordStore {
    fs: Arc<dyn FileSystemAccess>,
    file_name: String,
    lock: Mutex<()>,
}

impl AggregateRecordStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, file_name: impl Into<String>) -> Self {
        Self {
            fs,
            file_name: file_name.into(),
            lock: Mutex::new(()),
        }
    }

    /// Load every parsable entry; a missing, blank or corrupt file is empty.
    async fn load(&self, path: &Path) -> Result<Vec<PlaybackPositionRecord>> {
        if !self.fs.exists(path).await? {
            return Ok(Vec::new());
        }

        let content = self.fs.read_file(path).await?;
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let entries: Vec<serde_json::Value> = match serde_json::from_slice(&content) {
            Ok(entries) => entries,
            Err(e) => {
                let error = SyncError::RecordParse {
                    path: display_name(path),
                    message: e.to_string(),
                };
                warn!(error = %error, "Ignoring unparsable record file");
                return Ok(Vec::new());
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<PlaybackPositionRecord>(entry) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping unparsable playback record"),
            }
        }
        Ok(records)
    }

    async fn read_records(&self, folder: &str) -> Result<Vec<PlaybackPositionRecord>> {
        match accessible_root(self.fs.as_ref(), folder).await {
            Ok(root) => self.load(&root.join(&self.file_name)).await,
            Err(e) => {
                debug!(error = %e, "Sync folder unavailable; no records");
                Ok(Vec::new())
            }
        }
    }

    async fn merge(&self, folder: &str, updates: &[PlaybackPositionRecord]) -> Result<()> {
        let root = accessible_root(self.fs.as_ref(), folder).await?;
        let path = root.join(&self.file_name);

        let mut records = self.load(&path).await?;
        for update in updates {
            match records.iter().position(|r| r.identifier == update.identifier) {
                Some(index) => {
                    records.retain(|r| r.identifier != update.identifier);
                    records.insert(index, update.clone());
                }
                None => records.push(update.clone()),
            }
        }

        let data = serde_json::to_vec_pretty(&records)?;
        self.fs.write_file(&path, Bytes::from(data)).await?;

        debug!(updated = updates.len(), total = records.len(), "Wrote record file");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for AggregateRecordStore {
    #[instrument(skip(self, folder))]
    async fn read_all(&self, folder: &str, since: Option<i64>) -> Result<Vec<PlaybackPositionRecord>> {
        let _guard = self.lock.lock().await;

        let records = newest_per_identifier(self.read_records(folder).await?);
        Ok(match since {
            Some(since) => records.into_iter().filter(|r| r.last_updated > since).collect(),
            None => records,
        })
    }

    #[instrument(skip(self, folder), fields(identifier = %identifier))]
    async fn read(&self, folder: &str, identifier: &ContentId) -> Result<Option<PlaybackPositionRecord>> {
        let _guard = self.lock.lock().await;

        Ok(self
            .read_records(folder)
            .await?
            .into_iter()
            .filter(|r| r.identifier == *identifier)
            .max_by_key(|r| r.last_updated))
    }

    #[instrument(skip(self, folder, record), fields(identifier = %record.identifier))]
    async fn write(&self, folder: &str, record: &PlaybackPositionRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.merge(folder, std::slice::from_ref(record)).await
    }

    async fn write_all(&self, folder: &str, records: &[PlaybackPositionRecord]) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.merge(folder, records).await
    }
}
