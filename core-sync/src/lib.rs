//! # Playback Position Sync
//!
//! Keeps per-file resume positions consistent between the local media-state
//! database and durable records in a user-chosen folder, so watch progress
//! survives reinstalls and follows the user across devices sharing that
//! folder.
//!
//! ## Components
//!
//! - [`identity`]: content fingerprints independent of file handles
//! - [`store`]: external record store (per-file directory or aggregate file)
//! - [`checkpoint`]: persisted time of the last successful bulk pass
//! - [`folder`]: sync folder selection and validity
//! - [`reconciler`]: single-file resume reconciliation
//! - [`bulk`]: one-directional bulk import on catalog refresh
//! - [`service`]: facade wiring all of the above from a `CoreConfig`
//!
//! ## Failure policy
//!
//! Nothing here is fatal to playback. A missing or revoked folder, an
//! unparsable record or an unreadable media file degrade to the local
//! database being the only source of truth for that operation.

pub mod bulk;
pub mod checkpoint;
pub mod error;
pub mod folder;
pub mod identity;
pub mod reconciler;
pub mod record;
pub mod service;
pub mod store;

pub use bulk::{BulkSyncDriver, BulkSyncReport, SyncPassId};
pub use checkpoint::{CheckpointStore, SettingsCheckpointStore};
pub use error::{Result, SyncError};
pub use folder::FolderAccessManager;
pub use identity::{derive_identifier, fingerprint, ContentId, IdentityDeriver};
pub use reconciler::{PositionReconciler, ReconcileOutcome, Reconciliation};
pub use record::PlaybackPositionRecord;
pub use service::PlaybackSyncService;
pub use store::{AggregateRecordStore, PerFileRecordStore, RecordStore};
