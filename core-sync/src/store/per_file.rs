//! Per-file record directory.
//!
//! Layout: `<folder>/<records_dir>/<sha256(identifier)>.json`. Storage layers
//! that refuse to overwrite create numbered copies such as
//! `<hash> (1).json`; every write removes those before writing the fresh
//! record, so at most one file per identifier survives a write. Readers
//! that still find copies keep the newest record.
//!
//! Bulk reads skip files whose mtime is not after the checkpoint, then drop
//! records whose own `lastUpdated` is not after it either.

use super::{accessible_root, display_name, newest_per_identifier, RecordStore};
use crate::error::{Result, SyncError};
use crate::identity::{hash_string, ContentId};
use crate::record::PlaybackPositionRecord;
use async_trait::async_trait;
use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

const RECORD_EXTENSION: &str = "json";

pub struct PerFileRecordStore {
    fs: Arc<dyn FileSystemAccess>,
    directory_name: String,
    lock: Mutex<()>,
}

impl PerFileRecordStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, directory_name: impl Into<String>) -> Self {
        Self {
            fs,
            directory_name: directory_name.into(),
            lock: Mutex::new(()),
        }
    }

    /// File name used for an identifier's record.
    pub fn record_file_name(identifier: &ContentId) -> String {
        format!("{}.{RECORD_EXTENSION}", hash_string(identifier.as_str()))
    }

    async fn records_dir(&self, folder: &str) -> Result<Option<PathBuf>> {
        let root = match accessible_root(self.fs.as_ref(), folder).await {
            Ok(root) => root,
            Err(e) => {
                debug!(error = %e, "Sync folder unavailable; no records");
                return Ok(None);
            }
        };

        let dir = root.join(&self.directory_name);
        if !self.fs.is_accessible_directory(&dir).await? {
            return Ok(None);
        }
        Ok(Some(dir))
    }

    /// Exact record file plus numbered duplicates of it.
    async fn files_for(&self, dir: &Path, identifier: &ContentId) -> Result<Vec<PathBuf>> {
        let hash = hash_string(identifier.as_str());
        let exact = format!("{hash}.{RECORD_EXTENSION}");

        let files = self
            .fs
            .list_directory(dir)
            .await?
            .into_iter()
            .filter(|path| {
                let name = display_name(path);
                name == exact || is_duplicate_of(&name, &hash)
            })
            .collect();
        Ok(files)
    }

    /// Parse one record file, treating blank or corrupt files as absent.
    async fn load(&self, path: &Path) -> Option<PlaybackPositionRecord> {
        let content = match self.fs.read_file(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %display_name(path), error = %e, "Failed to read playback record");
                return None;
            }
        };

        match PlaybackPositionRecord::parse(&content) {
            Ok(record) => record,
            Err(e) => {
                let error = SyncError::RecordParse {
                    path: display_name(path),
                    message: e.to_string(),
                };
                warn!(error = %error, "Skipping unparsable playback record");
                None
            }
        }
    }

    async fn modified_after(&self, path: &Path, since: Option<i64>) -> bool {
        let Some(since) = since else {
            return true;
        };
        match self.fs.metadata(path).await {
            Ok(metadata) => metadata.modified_at_ms.map_or(true, |modified| modified > since),
            Err(e) => {
                debug!(file = %display_name(path), error = %e, "Record vanished while listing");
                false
            }
        }
    }
}

/// `<hash> (<n>).json`, as produced by storage layers on name collision.
fn duplicate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([0-9a-f]{64}) \(\d+\)\.json$").expect("Valid duplicate record pattern")
    })
}

fn is_duplicate_of(name: &str, hash: &str) -> bool {
    duplicate_pattern()
        .captures(name)
        .and_then(|captures| captures.get(1))
        .is_some_and(|m| m.as_str() == hash)
}

#[async_trait]
impl RecordStore for PerFileRecordStore {
    #[instrument(skip(self, folder))]
    async fn read_all(&self, folder: &str, since: Option<i64>) -> Result<Vec<PlaybackPositionRecord>> {
        let _guard = self.lock.lock().await;

        let Some(dir) = self.records_dir(folder).await? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for path in self.fs.list_directory(&dir).await? {
            let is_record = path
                .extension()
                .is_some_and(|ext| ext == RECORD_EXTENSION);
            if !is_record || !self.modified_after(&path, since).await {
                continue;
            }
            if let Some(record) = self.load(&path).await {
                records.push(record);
            }
        }

        // Conflict copies of one identifier collapse to the newest record
        let records: Vec<_> = newest_per_identifier(records)
            .into_iter()
            .filter(|r| since.map_or(true, |since| r.last_updated > since))
            .collect();

        debug!(count = records.len(), "Read playback records");
        Ok(records)
    }

    #[instrument(skip(self, folder), fields(identifier = %identifier))]
    async fn read(&self, folder: &str, identifier: &ContentId) -> Result<Option<PlaybackPositionRecord>> {
        let _guard = self.lock.lock().await;

        let Some(dir) = self.records_dir(folder).await? else {
            return Ok(None);
        };

        // Conflict copies may still exist if a writer was interrupted; trust the newest
        let mut newest: Option<PlaybackPositionRecord> = None;
        for path in self.files_for(&dir, identifier).await? {
            if let Some(record) = self.load(&path).await {
                if record.identifier != *identifier {
                    continue;
                }
                if newest.as_ref().map_or(true, |n| record.last_updated > n.last_updated) {
                    newest = Some(record);
                }
            }
        }
        Ok(newest)
    }

    #[instrument(skip(self, folder, record), fields(identifier = %record.identifier))]
    async fn write(&self, folder: &str, record: &PlaybackPositionRecord) -> Result<()> {
        let _guard = self.lock.lock().await;

        let root = accessible_root(self.fs.as_ref(), folder).await?;
        let dir = root.join(&self.directory_name);
        if !self.fs.is_accessible_directory(&dir).await? {
            self.fs.create_dir_all(&dir).await?;
        }

        for stale in self.files_for(&dir, &record.identifier).await? {
            if let Err(e) = self.fs.delete_file(&stale).await {
                // Another writer may have removed it already
                if !e.is_not_found() {
                    return Err(e.into());
                }
            }
        }

        let path = dir.join(Self::record_file_name(&record.identifier));
        let data = serde_json::to_vec(record)?;
        self.fs.write_file(&path, Bytes::from(data)).await?;

        debug!(position_ms = record.position, "Wrote playback record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;

    fn scratch_folder() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("per-file-store-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn store() -> PerFileRecordStore {
        PerFileRecordStore::new(Arc::new(TokioFileSystem::new()), "playback_positions")
    }

    fn record(id: &str, position: i64, last_updated: i64) -> PlaybackPositionRecord {
        PlaybackPositionRecord::new(ContentId::new(id), position, last_updated)
    }

    fn record_files(folder: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(folder.join("playback_positions"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let folder = scratch_folder();
        let folder_uri = folder.to_str().unwrap();
        let store = store();
        let r = record("abc", 5_000, 200);

        store.write(folder_uri, &r).await.unwrap();

        assert_eq!(store.read(folder_uri, &r.identifier).await.unwrap(), Some(r.clone()));
        assert_eq!(store.read_all(folder_uri, None).await.unwrap(), vec![r]);
        assert_eq!(record_files(&folder), vec![format!("{}.json", hash_string("abc"))]);
    }

    #[tokio::test]
    async fn test_rewrite_keeps_single_file() {
        let folder = scratch_folder();
        let folder_uri = folder.to_str().unwrap();
        let store = store();

        store.write(folder_uri, &record("abc", 1_000, 100)).await.unwrap();
        store.write(folder_uri, &record("abc", 2_000, 300)).await.unwrap();

        assert_eq!(record_files(&folder).len(), 1);
        assert_eq!(
            store.read_all(folder_uri, None).await.unwrap(),
            vec![record("abc", 2_000, 300)]
        );
    }

    #[tokio::test]
    async fn test_write_prunes_numbered_duplicates() {
        let folder = scratch_folder();
        let folder_uri = folder.to_str().unwrap();
        let dir = folder.join("playback_positions");
        std::fs::create_dir_all(&dir).unwrap();
        let hash = hash_string("abc");
        for name in [format!("{hash} (1).json"), format!("{hash} (2).json")] {
            std::fs::write(dir.join(name), br#"{"identifier":"abc","position":1,"lastUpdated":1}"#)
                .unwrap();
        }
        let other = format!("{} (1).json", hash_string("other"));
        std::fs::write(dir.join(&other), b"{}").unwrap();

        store().write(folder_uri, &record("abc", 9_000, 900)).await.unwrap();

        let mut expected = vec![format!("{hash}.json"), other];
        expected.sort();
        assert_eq!(record_files(&folder), expected);
    }

    #[tokio::test]
    async fn test_unparsable_files_are_skipped() {
        let folder = scratch_folder();
        let folder_uri = folder.to_str().unwrap();
        let store = store();
        store.write(folder_uri, &record("good", 10, 10)).await.unwrap();

        let dir = folder.join("playback_positions");
        std::fs::write(dir.join("corrupt.json"), b"{\"identifier\":").unwrap();
        std::fs::write(dir.join("blank.json"), b"").unwrap();
        std::fs::write(dir.join("notes.txt"), b"not a record").unwrap();

        assert_eq!(store.read_all(folder_uri, None).await.unwrap(), vec![record("good", 10, 10)]);
    }

    #[tokio::test]
    async fn test_read_all_skips_files_not_modified_since_checkpoint() {
        let folder = scratch_folder();
        let folder_uri = folder.to_str().unwrap();
        let store = store();
        store.write(folder_uri, &record("abc", 10, 10)).await.unwrap();

        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        assert!(store.read_all(folder_uri, Some(future)).await.unwrap().is_empty());
        assert_eq!(store.read_all(folder_uri, Some(0)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_read_all_keeps_newest_of_conflict_copies() {
        let folder = scratch_folder();
        let folder_uri = folder.to_str().unwrap();
        let dir = folder.join("playback_positions");
        std::fs::create_dir_all(&dir).unwrap();
        let hash = hash_string("abc");
        std::fs::write(
            dir.join(format!("{hash}.json")),
            br#"{"identifier":"abc","position":9000,"lastUpdated":500}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join(format!("{hash} (1).json")),
            br#"{"identifier":"abc","position":1000,"lastUpdated":100}"#,
        )
        .unwrap();

        let store = store();
        assert_eq!(store.read_all(folder_uri, None).await.unwrap(), vec![record("abc", 9_000, 500)]);
        assert_eq!(
            store.read(folder_uri, &ContentId::new("abc")).await.unwrap(),
            Some(record("abc", 9_000, 500))
        );
    }

    #[tokio::test]
    async fn test_read_all_drops_records_not_updated_since_checkpoint() {
        let folder = scratch_folder();
        let folder_uri = folder.to_str().unwrap();
        let store = store();
        store.write(folder_uri, &record("old", 1, 100)).await.unwrap();
        store.write(folder_uri, &record("edge", 2, 200)).await.unwrap();
        store.write(folder_uri, &record("new", 3, 300)).await.unwrap();

        // Every file was just written, so only record timestamps decide
        assert_eq!(store.read_all(folder_uri, Some(200)).await.unwrap(), vec![record("new", 3, 300)]);
    }

    #[tokio::test]
    async fn test_unavailable_folder() {
        let store = store();
        let missing = std::env::temp_dir().join(format!("missing-{}", uuid::Uuid::new_v4()));
        let missing = missing.to_str().unwrap();

        assert!(store.read_all(missing, None).await.unwrap().is_empty());
        assert_eq!(store.read(missing, &ContentId::new("abc")).await.unwrap(), None);
        let err = store.write(missing, &record("abc", 1, 1)).await.unwrap_err();
        assert!(err.is_folder_unavailable());

        assert!(store.read_all("", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_folder_without_records_dir() {
        let folder = scratch_folder();
        assert!(store().read_all(folder.to_str().unwrap(), None).await.unwrap().is_empty());
    }
}
