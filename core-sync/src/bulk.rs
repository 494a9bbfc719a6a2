//! # Bulk Sync Driver
//!
//! One-directional pass run on catalog load or refresh: every external record
//! changed since the last checkpoint overwrites the position and timestamp of
//! all local rows carrying the same content identifier.
//!
//! ## Workflow
//! 1. Resolve the sync folder; without one the pass is a no-op
//! 2. Load the checkpoint and note the pass start time from the clock
//! 3. Read records newer than the checkpoint
//! 4. Derive identifiers for catalog rows that have none yet
//! 5. Apply each record by identifier
//! 6. Save the pass start time as the new checkpoint
//!
//! A failed or cancelled pass leaves the checkpoint untouched so the next
//! pass retries the same window.

use crate::checkpoint::CheckpointStore;
use crate::error::{Result, SyncError};
use crate::folder::FolderAccessManager;
use crate::identity::IdentityDeriver;
use crate::store::RecordStore;
use bridge_traits::Clock;
use core_library::LocalPositionStore;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::logging::strip_path;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Unique identifier for a bulk sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncPassId(Uuid);

impl SyncPassId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncPassId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncPassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Summary of a bulk sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSyncReport {
    pub pass_id: SyncPassId,
    /// Records that matched at least one local row
    pub records_applied: u64,
    /// Local rows overwritten
    pub rows_updated: u64,
    /// Checkpoint saved by the pass; `None` when no folder is configured
    pub checkpoint: Option<i64>,
}

impl BulkSyncReport {
    fn skipped(pass_id: SyncPassId) -> Self {
        Self {
            pass_id,
            records_applied: 0,
            rows_updated: 0,
            checkpoint: None,
        }
    }
}

pub struct BulkSyncDriver {
    store: LocalPositionStore,
    records: Arc<dyn RecordStore>,
    identity: IdentityDeriver,
    folders: Arc<FolderAccessManager>,
    checkpoints: Arc<dyn CheckpointStore>,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl BulkSyncDriver {
    pub fn new(
        store: LocalPositionStore,
        records: Arc<dyn RecordStore>,
        identity: IdentityDeriver,
        folders: Arc<FolderAccessManager>,
        checkpoints: Arc<dyn CheckpointStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            records,
            identity,
            folders,
            checkpoints,
            clock,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Run a pass to completion.
    pub async fn run(&self) -> Result<BulkSyncReport> {
        self.run_until_cancelled(&CancellationToken::new()).await
    }

    /// Run a pass that stops at the next record once `cancellation_token` fires.
    #[instrument(skip(self, cancellation_token))]
    pub async fn run_until_cancelled(
        &self,
        cancellation_token: &CancellationToken,
    ) -> Result<BulkSyncReport> {
        let pass_id = SyncPassId::new();

        let Some(folder) = self.folders.current_folder().await? else {
            info!("No sync folder configured; skipping bulk sync");
            return Ok(BulkSyncReport::skipped(pass_id));
        };

        let started = Instant::now();
        let pass_start = self.clock.unix_timestamp_millis();
        let since = self.checkpoints.load().await?;

        info!(pass_id = %pass_id, since = ?since, "Starting bulk sync");
        self.emit(SyncEvent::Started {
            job_id: pass_id.to_string(),
            since,
        });

        let mut report = BulkSyncReport::skipped(pass_id);
        match self
            .apply(&folder, since, cancellation_token, &mut report)
            .await
        {
            Ok(()) => {}
            Err(SyncError::Cancelled) => {
                warn!(pass_id = %pass_id, applied = report.records_applied, "Bulk sync cancelled");
                self.emit(SyncEvent::Cancelled {
                    job_id: pass_id.to_string(),
                    records_applied: report.records_applied,
                });
                return Err(SyncError::Cancelled);
            }
            Err(e) => return Err(self.fail(pass_id, &report, e)),
        }

        if let Err(e) = self.checkpoints.save(pass_start).await {
            return Err(self.fail(pass_id, &report, e));
        }
        report.checkpoint = Some(pass_start);

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            pass_id = %pass_id,
            applied = report.records_applied,
            rows = report.rows_updated,
            checkpoint = pass_start,
            checkpoint_at = %format_millis(pass_start),
            duration_ms,
            "Bulk sync completed"
        );
        self.emit(SyncEvent::Completed {
            job_id: pass_id.to_string(),
            records_applied: report.records_applied,
            checkpoint: pass_start,
            duration_ms,
        });

        Ok(report)
    }

    async fn apply(
        &self,
        folder: &str,
        since: Option<i64>,
        cancellation_token: &CancellationToken,
        report: &mut BulkSyncReport,
    ) -> Result<()> {
        let records = tokio::select! {
            _ = cancellation_token.cancelled() => return Err(SyncError::Cancelled),
            records = self.records.read_all(folder, since) => records?,
        };

        if records.is_empty() {
            return Ok(());
        }

        let identified = self.identify_rows(cancellation_token).await?;
        if identified > 0 {
            debug!(identified, "Identified catalog rows");
        }

        for record in records {
            if cancellation_token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let rows = self
                .store
                .adopt_position_by_identifier(record.identifier.as_str(), record.position, record.last_updated)
                .await?;
            if rows == 0 {
                debug!(identifier = %record.identifier, "No local row for record");
                continue;
            }
            report.rows_updated += rows;
            report.records_applied += 1;
        }
        Ok(())
    }

    /// Derive and store identifiers for rows that never had one, such as a
    /// catalog freshly scanned on a new device.
    async fn identify_rows(&self, cancellation_token: &CancellationToken) -> Result<u64> {
        let mut identified = 0;
        for handle in self.store.unidentified_handles().await? {
            if cancellation_token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match self.identity.derive(&handle).await {
                Some(identifier) => {
                    self.store.remember_identifier(&handle, identifier.as_str()).await?;
                    identified += 1;
                }
                None => debug!(handle = %strip_path(&handle), "No identifier for catalog row"),
            }
        }
        Ok(identified)
    }

    fn fail(&self, pass_id: SyncPassId, report: &BulkSyncReport, error: SyncError) -> SyncError {
        warn!(pass_id = %pass_id, error = %error, "Bulk sync failed; checkpoint unchanged");
        self.emit(SyncEvent::Failed {
            job_id: pass_id.to_string(),
            message: error.to_string(),
            records_applied: report.records_applied,
        });
        error
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            let _ = events.emit(CoreEvent::Sync(event));
        }
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
