//! # Core Configuration Module
//!
//! Provides configuration management for the playback-sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all necessary dependencies and settings for the core.
//! It enforces fail-fast validation so that missing bridges are reported at
//! startup rather than on the first position update.
//!
//! ## Required Dependencies
//!
//! - `FileSystemAccess` - Reads media files and the synced folder
//! - `SettingsStore` - Player preferences and the sync checkpoint
//!
//! When the `desktop-shims` feature is enabled, `TokioFileSystem` and a
//! `SqliteSettingsStore` next to the database are injected automatically if
//! not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, RecordLayout};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/player/media.db")
//!     .file_system(Arc::new(MyFileSystem))
//!     .settings_store(Arc::new(MySettingsStore))
//!     .record_layout(RecordLayout::PerFile)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing database path
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - database path is required");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, FileSystemAccess, SettingsStore, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default name of the per-file record directory inside the synced folder.
pub const DEFAULT_RECORDS_DIRECTORY: &str = "playback_positions";

/// Default name of the aggregate record file inside the synced folder.
pub const DEFAULT_AGGREGATE_FILE: &str = "playback_positions.json";

/// Default event bus capacity.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// How playback-position records are laid out inside the synced folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordLayout {
    /// One small JSON file per identifier under a subdirectory.
    #[default]
    PerFile,
    /// A single JSON array holding every record.
    Aggregate,
}

/// What identifies a media file in the external records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityStrategy {
    /// SHA-256 fingerprint over size, head and tail bytes.
    #[default]
    ContentHash,
    /// Last segment of the media URI.
    FileName,
}

/// Core configuration for the playback-sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// File system access abstraction
    pub file_system: Arc<dyn FileSystemAccess>,

    /// User preferences storage
    pub settings_store: Arc<dyn SettingsStore>,

    /// Time source for position timestamps and the sync checkpoint
    pub clock: Arc<dyn Clock>,

    pub record_layout: RecordLayout,

    pub identity_strategy: IdentityStrategy,

    /// Subdirectory of the synced folder used by [`RecordLayout::PerFile`]
    pub records_directory_name: String,

    /// File name inside the synced folder used by [`RecordLayout::Aggregate`]
    pub aggregate_file_name: String,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("file_system", &"FileSystemAccess { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("clock", &"Clock { ... }")
            .field("record_layout", &self.record_layout)
            .field("identity_strategy", &self.identity_strategy)
            .field("records_directory_name", &self.records_directory_name)
            .field("aggregate_file_name", &self.aggregate_file_name)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Record directory and file names are single, non-empty path segments
    /// - Event buffer size is greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        validate_segment("records_directory_name", &self.records_directory_name)?;
        validate_segment("aggregate_file_name", &self.aggregate_file_name)?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_segment(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", field)));
    }

    if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        return Err(Error::Config(format!(
            "{} must be a single file name, got '{}'",
            field, value
        )));
    }

    Ok(())
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required to fingerprint media files \
                 and read the synced folder. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default TokioFileSystem. \
                 Android: inject a Storage Access Framework adapter."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for player preferences and the sync checkpoint. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default SqliteSettingsStore. \
                 Android: inject SharedPreferences/DataStore-backed settings."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(database_path: &Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let candidate = database_path
        .parent()
        .map(|parent| parent.join("settings.db"))
        .unwrap_or_else(|| PathBuf::from("settings.db"));

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default settings store: {}",
                    e
                ))
            })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // block_on panics inside a runtime, so initialize on a scratch thread
    let store = match Handle::try_current() {
        Ok(_) => {
            let path = candidate.clone();
            thread::spawn(move || init_store(path))
                .join()
                .map_err(|_| {
                    Error::Internal(
                        "Worker thread panicked while creating default SettingsStore".to_string(),
                    )
                })??
        }
        Err(_) => init_store(candidate)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_database_path: &Path) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
    record_layout: RecordLayout,
    identity_strategy: IdentityStrategy,
    records_directory_name: Option<String>,
    aggregate_file_name: Option<String>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().database_path("/data/player/media.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Overrides the wall clock (tests inject a `ManualClock`).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn record_layout(mut self, layout: RecordLayout) -> Self {
        self.record_layout = layout;
        self
    }

    pub fn identity_strategy(mut self, strategy: IdentityStrategy) -> Self {
        self.identity_strategy = strategy;
        self
    }

    pub fn records_directory_name(mut self, name: impl Into<String>) -> Self {
        self.records_directory_name = Some(name.into());
        self
    }

    pub fn aggregate_file_name(mut self, name: impl Into<String>) -> Self {
        self.aggregate_file_name = Some(name.into());
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if:
    /// - The database path is missing
    /// - Required bridges are missing and no desktop default is available
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&database_path)?,
        };

        let config = CoreConfig {
            database_path,
            file_system,
            settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            record_layout: self.record_layout,
            identity_strategy: self.identity_strategy,
            records_directory_name: self
                .records_directory_name
                .unwrap_or_else(|| DEFAULT_RECORDS_DIRECTORY.to_string()),
            aggregate_file_name: self
                .aggregate_file_name
                .unwrap_or_else(|| DEFAULT_AGGREGATE_FILE.to_string()),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
