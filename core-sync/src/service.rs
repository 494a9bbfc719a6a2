//! # Playback Sync Service
//!
//! Facade the player and catalog screens talk to. It wires the local store,
//! the external record store, the identity deriver, the reconciler and the
//! bulk sync driver from one [`CoreConfig`].
//!
//! ## Data flow
//!
//! - Position report: local row ← clamped position; then, when a folder is
//!   configured, identifier → external record. Runs on the application-wide
//!   scope so a save outlives the player screen.
//! - Resume: [`PositionReconciler`] picks the newer side and copies it over.
//! - Catalog refresh: [`BulkSyncDriver`] pulls records newer than the checkpoint.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_runtime::config::CoreConfig;
//! use core_sync::PlaybackSyncService;
//!
//! let service = PlaybackSyncService::from_config(config).await?;
//! service.update_position("content://media/video/7", 42_000);
//! let resume = service.sync_and_get_position("content://media/video/7").await?;
//! ```

use crate::bulk::{BulkSyncDriver, BulkSyncReport};
use crate::checkpoint::{CheckpointStore, SettingsCheckpointStore};
use crate::error::Result;
use crate::folder::FolderAccessManager;
use crate::identity::IdentityDeriver;
use crate::reconciler::PositionReconciler;
use crate::record::PlaybackPositionRecord;
use crate::store::{self, RecordStore};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{LocalPositionStore, MediaRepository, SqliteMediaRepository};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_runtime::logging::strip_path;
use core_runtime::preferences::{PreferencesRepository, SettingsPreferences};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct PlaybackSyncService {
    store: LocalPositionStore,
    records: Arc<dyn RecordStore>,
    identity: IdentityDeriver,
    folders: Arc<FolderAccessManager>,
    checkpoints: Arc<dyn CheckpointStore>,
    reconciler: PositionReconciler,
    bulk: BulkSyncDriver,
    events: EventBus,
}

impl PlaybackSyncService {
    /// Open the database at `config.database_path` and wire every component.
    pub async fn from_config(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        info!(
            layout = ?config.record_layout,
            identity = ?config.identity_strategy,
            "Playback sync service ready"
        );
        Ok(Self::with_repository(&config, Arc::new(SqliteMediaRepository::new(pool))))
    }

    /// Wire every component around an existing repository.
    pub fn with_repository(config: &CoreConfig, repository: Arc<dyn MediaRepository>) -> Self {
        let events = EventBus::new(config.event_buffer_size);
        let preferences: Arc<dyn PreferencesRepository> =
            Arc::new(SettingsPreferences::new(config.settings_store.clone()));

        let store = LocalPositionStore::new(repository, config.clock.clone())
            .with_preferences(preferences.clone())
            .with_event_bus(events.clone());
        let records = store::from_config(config);
        let identity = IdentityDeriver::new(config.file_system.clone(), config.identity_strategy);
        let folders = Arc::new(FolderAccessManager::new(config.file_system.clone(), preferences));
        let checkpoints: Arc<dyn CheckpointStore> =
            Arc::new(SettingsCheckpointStore::new(config.settings_store.clone()));

        let reconciler = PositionReconciler::new(
            store.clone(),
            records.clone(),
            identity.clone(),
            folders.clone(),
        );
        let bulk = BulkSyncDriver::new(
            store.clone(),
            records.clone(),
            identity.clone(),
            folders.clone(),
            checkpoints.clone(),
            config.clock.clone(),
        )
        .with_event_bus(events.clone());

        Self {
            store,
            records,
            identity,
            folders,
            checkpoints,
            reconciler,
            bulk,
            events,
        }
    }

    pub fn store(&self) -> &LocalPositionStore {
        &self.store
    }

    pub fn folders(&self) -> &FolderAccessManager {
        &self.folders
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Persist a position reported by the player without waiting.
    pub fn update_position(&self, handle: impl Into<String>, position: i64) {
        let handle = handle.into();
        let store = self.store.clone();
        let records = self.records.clone();
        let identity = self.identity.clone();
        let folders = self.folders.clone();

        self.store.spawn_detached(async move {
            persist_position(&store, records.as_ref(), &identity, &folders, &handle, position).await;
        });
    }

    /// Resume position for `handle`, reconciled with the external record.
    pub async fn sync_and_get_position(&self, handle: &str) -> Result<Option<i64>> {
        Ok(self.reconciler.reconcile(handle).await?)
    }

    /// Pull external records into the local store.
    pub async fn sync_all(&self) -> Result<BulkSyncReport> {
        self.bulk.run().await
    }

    /// [`sync_all`](Self::sync_all) bound to a UI lifecycle.
    pub async fn sync_all_until_cancelled(&self, cancellation_token: &CancellationToken) -> Result<BulkSyncReport> {
        self.bulk.run_until_cancelled(cancellation_token).await
    }

    /// Wait for queued background writes.
    pub async fn drain(&self) {
        self.store.drain().await;
    }
}

async fn persist_position(
    store: &LocalPositionStore,
    records: &dyn RecordStore,
    identity: &IdentityDeriver,
    folders: &FolderAccessManager,
    handle: &str,
    position: i64,
) {
    let write = match store.record_position(handle, position).await {
        Ok(write) => write,
        Err(e) => {
            warn!(handle = %strip_path(handle), error = %e, "Failed to store playback position");
            return;
        }
    };

    let folder = match folders.current_folder().await {
        Ok(Some(folder)) => folder,
        Ok(None) => return,
        Err(e) => {
            debug!(error = %e, "Could not read sync folder preference");
            return;
        }
    };

    let Some(identifier) = identity.derive(handle).await else {
        return;
    };
    if write.row_found {
        if let Err(e) = store.remember_identifier(handle, identifier.as_str()).await {
            warn!(error = %e, "Failed to store content identifier");
        }
    }

    let record = PlaybackPositionRecord::new(identifier, write.position, write.updated_at);
    if let Err(e) = records.write(&folder, &record).await {
        if e.is_folder_unavailable() {
            debug!(error = %e, "Sync folder unavailable; external record skipped");
        } else {
            warn!(handle = %strip_path(handle), error = %e, "Failed to write external record");
        }
    }
}
