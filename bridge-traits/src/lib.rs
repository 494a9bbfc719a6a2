//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the playback-sync core and the
//! platform it runs on. The core never touches the file system, preference
//! storage or wall clock directly; it asks the host through these traits.
//!
//! ## Traits
//!
//! ### Storage
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Read/write bytes at a URI,
//!   ranged reads for fingerprinting, folder enumeration and validity checks
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Android  | Storage Access Framework adapter | 📋 Host supplied |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert their native errors to `BridgeError` and
//! include the failing path or key in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared across the I/O tasks of the sync core.

pub mod error;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use storage::{FileMetadata, FileSystemAccess, SettingsStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
