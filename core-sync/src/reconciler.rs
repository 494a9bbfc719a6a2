//! # Position Reconciler
//!
//! Resolves the resume position of a single file at playback start by
//! comparing the local row with the external record for the same content.
//!
//! ## Outcomes
//!
//! | Condition | Returned | Propagation |
//! |-----------|----------|-------------|
//! | external timestamp newer, record present | external position | local row ← external |
//! | local timestamp newer, row present | local position | external ← local |
//! | tie / nothing usable | local position | none |
//!
//! Missing timestamps compare as 0. Propagation is awaited before returning;
//! a failed propagation is logged and the winning position is still returned.
//! Without a usable folder or identifier the local answer is returned as is.

use crate::folder::FolderAccessManager;
use crate::identity::{ContentId, IdentityDeriver};
use crate::record::PlaybackPositionRecord;
use crate::store::RecordStore;
use core_library::{LocalPositionStore, MediaRecord, POSITION_UNSET};
use core_runtime::logging::strip_path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Which side won a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// External record was newer and was copied into the local row.
    AdoptedExternal,
    /// Local row was newer and was written to the external store.
    PushedLocal,
    /// Equal timestamps or nothing usable; no store was rewritten.
    KeptLocal,
    /// No folder or no identifier; the external store was not consulted.
    LocalOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Resume position in ms; `None` when unset.
    pub position: Option<i64>,
    pub outcome: ReconcileOutcome,
    pub identifier: Option<ContentId>,
}

pub struct PositionReconciler {
    store: LocalPositionStore,
    records: Arc<dyn RecordStore>,
    identity: IdentityDeriver,
    folders: Arc<FolderAccessManager>,
}

impl PositionReconciler {
    pub fn new(
        store: LocalPositionStore,
        records: Arc<dyn RecordStore>,
        identity: IdentityDeriver,
        folders: Arc<FolderAccessManager>,
    ) -> Self {
        Self {
            store,
            records,
            identity,
            folders,
        }
    }

    /// Resume position for `handle` after reconciling both stores.
    pub async fn reconcile(&self, handle: &str) -> core_library::Result<Option<i64>> {
        Ok(self.reconcile_detailed(handle).await?.position)
    }

    #[instrument(skip(self, handle), fields(handle = %strip_path(handle)))]
    pub async fn reconcile_detailed(&self, handle: &str) -> core_library::Result<Reconciliation> {
        let local = self.store.get(handle).await?;
        let local_position = local.as_ref().map_or(POSITION_UNSET, |r| r.playback_position);
        let local_only = || Reconciliation {
            position: resumable(local_position),
            outcome: ReconcileOutcome::LocalOnly,
            identifier: None,
        };

        let folder = match self.folders.current_folder().await {
            Ok(Some(folder)) => folder,
            Ok(None) => return Ok(local_only()),
            Err(e) => {
                debug!(error = %e, "Could not read sync folder preference");
                return Ok(local_only());
            }
        };

        let Some(identifier) = self.identity.derive(handle).await else {
            return Ok(local_only());
        };
        if local.is_some() {
            if let Err(e) = self.store.remember_identifier(handle, identifier.as_str()).await {
                warn!(error = %e, "Failed to store content identifier");
            }
        }

        let external = match self.records.read(&folder, &identifier).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to read external record; using local position");
                None
            }
        };

        Ok(self.resolve(handle, &folder, identifier, local, external).await)
    }

    async fn resolve(
        &self,
        handle: &str,
        folder: &str,
        identifier: ContentId,
        local: Option<MediaRecord>,
        external: Option<PlaybackPositionRecord>,
    ) -> Reconciliation {
        let local_timestamp = local.as_ref().map_or(0, MediaRecord::position_timestamp);
        let external_timestamp = external.as_ref().map_or(0, |r| r.last_updated);
        let local_position = local.as_ref().map_or(POSITION_UNSET, |r| r.playback_position);

        if let Some(external) = external.filter(|_| external_timestamp > local_timestamp) {
            debug!(
                position_ms = external.position,
                local_timestamp, external_timestamp, "External record is newer"
            );
            let position = match self
                .store
                .adopt_position(handle, external.position, external.last_updated)
                .await
            {
                Ok(Some(stored)) => stored,
                Ok(None) => core_library::final_position(external.position, None),
                Err(e) => {
                    warn!(error = %e, "Failed to copy external position locally");
                    core_library::final_position(external.position, None)
                }
            };
            return Reconciliation {
                position: resumable(position),
                outcome: ReconcileOutcome::AdoptedExternal,
                identifier: Some(identifier),
            };
        }

        if local.is_some() && local_timestamp > external_timestamp {
            debug!(
                position_ms = local_position,
                local_timestamp, external_timestamp, "Local position is newer"
            );
            let record = PlaybackPositionRecord::new(identifier.clone(), local_position, local_timestamp);
            if let Err(e) = self.records.write(folder, &record).await {
                warn!(error = %e, "Failed to write external record");
            }
            return Reconciliation {
                position: resumable(local_position),
                outcome: ReconcileOutcome::PushedLocal,
                identifier: Some(identifier),
            };
        }

        Reconciliation {
            position: resumable(local_position),
            outcome: ReconcileOutcome::KeptLocal,
            identifier: Some(identifier),
        }
    }
}

fn resumable(position: i64) -> Option<i64> {
    (position != POSITION_UNSET).then_some(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AggregateRecordStore;
    use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
    use bridge_traits::{FileSystemAccess, ManualClock};
    use core_library::db::create_test_pool;
    use core_library::{MediaRepository, SqliteMediaRepository};
    use core_runtime::config::IdentityStrategy;
    use core_runtime::preferences::SettingsPreferences;

    const HANDLE: &str = "/media/show/episode-01.mkv";

    struct Fixture {
        reconciler: PositionReconciler,
        repo: Arc<SqliteMediaRepository>,
        records: Arc<AggregateRecordStore>,
        folders: Arc<FolderAccessManager>,
        folder: String,
    }

    async fn fixture() -> Fixture {
        let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let repo = Arc::new(SqliteMediaRepository::new(create_test_pool().await.unwrap()));
        repo.upsert_media(HANDLE, Some(100_000)).await.unwrap();

        let store = LocalPositionStore::new(repo.clone(), Arc::new(ManualClock::new(0)));
        let records = Arc::new(AggregateRecordStore::new(fs.clone(), "positions.json"));
        let folders = Arc::new(FolderAccessManager::new(
            fs.clone(),
            Arc::new(SettingsPreferences::new(settings)),
        ));
        let folder = std::env::temp_dir().join(format!("reconciler-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&folder).unwrap();

        Fixture {
            reconciler: PositionReconciler::new(
                store,
                records.clone(),
                IdentityDeriver::new(fs, IdentityStrategy::FileName),
                folders.clone(),
            ),
            repo,
            records,
            folders,
            folder: folder.to_string_lossy().into_owned(),
        }
    }

    fn external(position: i64, last_updated: i64) -> PlaybackPositionRecord {
        PlaybackPositionRecord::new(ContentId::new("episode-01.mkv"), position, last_updated)
    }

    #[tokio::test]
    async fn test_local_only_without_folder() {
        let f = fixture().await;
        f.repo.update_position(HANDLE, 5_000, 10).await.unwrap();

        let result = f.reconciler.reconcile_detailed(HANDLE).await.unwrap();
        assert_eq!(result.outcome, ReconcileOutcome::LocalOnly);
        assert_eq!(result.position, Some(5_000));
    }

    #[tokio::test]
    async fn test_outcomes_follow_timestamps() {
        let f = fixture().await;
        f.folders.select_folder(&f.folder).await.unwrap();
        f.repo.update_position(HANDLE, 5_000, 100).await.unwrap();

        f.records.write(&f.folder, &external(7_000, 200)).await.unwrap();
        let adopted = f.reconciler.reconcile_detailed(HANDLE).await.unwrap();
        assert_eq!(adopted.outcome, ReconcileOutcome::AdoptedExternal);
        assert_eq!(adopted.position, Some(7_000));

        // Both sides now agree on timestamp 200
        let kept = f.reconciler.reconcile_detailed(HANDLE).await.unwrap();
        assert_eq!(kept.outcome, ReconcileOutcome::KeptLocal);

        f.repo.update_position(HANDLE, 8_000, 300).await.unwrap();
        let pushed = f.reconciler.reconcile_detailed(HANDLE).await.unwrap();
        assert_eq!(pushed.outcome, ReconcileOutcome::PushedLocal);
        assert_eq!(
            f.records.read(&f.folder, &ContentId::new("episode-01.mkv")).await.unwrap(),
            Some(external(8_000, 300))
        );
    }

    #[tokio::test]
    async fn test_unset_local_with_no_record_keeps_local() {
        let f = fixture().await;
        f.folders.select_folder(&f.folder).await.unwrap();

        let result = f.reconciler.reconcile_detailed(HANDLE).await.unwrap();
        assert_eq!(result.outcome, ReconcileOutcome::KeptLocal);
        assert_eq!(result.position, None);
        assert_eq!(
            f.repo.find_by_handle(HANDLE).await.unwrap().unwrap().content_hash.as_deref(),
            Some("episode-01.mkv")
        );
    }
}
