//! Folder Access Manager
//!
//! Tracks the user-chosen sync folder and answers whether it is still usable.
//! Acquiring the grant is the host's job; this module only validates the
//! reference it was handed and persists it as a preference.

use crate::error::{Result, SyncError};
use bridge_traits::FileSystemAccess;
use core_runtime::logging::strip_path;
use core_runtime::preferences::PreferencesRepository;
use std::sync::Arc;
use tracing::{debug, info};

pub struct FolderAccessManager {
    fs: Arc<dyn FileSystemAccess>,
    preferences: Arc<dyn PreferencesRepository>,
}

impl FolderAccessManager {
    pub fn new(fs: Arc<dyn FileSystemAccess>, preferences: Arc<dyn PreferencesRepository>) -> Self {
        Self { fs, preferences }
    }

    /// The configured folder, only while it is still accessible.
    pub async fn current_folder(&self) -> Result<Option<String>> {
        let Some(folder) = self.preferences.load().await?.sync_folder_uri else {
            return Ok(None);
        };

        if self.is_valid(&folder).await {
            Ok(Some(folder))
        } else {
            debug!(folder = strip_path(&folder), "Sync folder no longer accessible");
            Ok(None)
        }
    }

    /// Whether `uri` refers to a directory the app can still use.
    pub async fn is_valid(&self, uri: &str) -> bool {
        if uri.trim().is_empty() {
            return false;
        }
        self.fs
            .is_accessible_directory(&self.fs.resolve(uri))
            .await
            .unwrap_or(false)
    }

    /// Validate and persist `uri` as the sync folder.
    pub async fn select_folder(&self, uri: &str) -> Result<()> {
        if !self.is_valid(uri).await {
            return Err(SyncError::FolderUnavailable(strip_path(uri).to_string()));
        }

        self.preferences.set_sync_folder(Some(uri)).await?;
        info!(folder = strip_path(uri), "Sync folder selected");
        Ok(())
    }

    /// Turn sync off.
    pub async fn clear_folder(&self) -> Result<()> {
        self.preferences.set_sync_folder(None).await?;
        info!("Sync folder cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
    use core_runtime::preferences::SettingsPreferences;

    async fn manager() -> FolderAccessManager {
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        FolderAccessManager::new(
            Arc::new(TokioFileSystem::new()),
            Arc::new(SettingsPreferences::new(settings)),
        )
    }

    #[tokio::test]
    async fn test_select_and_clear() {
        let manager = manager().await;
        let dir = std::env::temp_dir().join(format!("folder-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let uri = dir.to_str().unwrap();

        assert_eq!(manager.current_folder().await.unwrap(), None);

        manager.select_folder(uri).await.unwrap();
        assert_eq!(manager.current_folder().await.unwrap().as_deref(), Some(uri));

        manager.clear_folder().await.unwrap();
        assert_eq!(manager.current_folder().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_folder_is_rejected() {
        let manager = manager().await;

        assert!(!manager.is_valid("").await);
        let err = manager.select_folder("/no/such/folder").await.unwrap_err();
        assert!(err.is_folder_unavailable());
    }

    #[tokio::test]
    async fn test_revoked_folder_reads_as_unset() {
        let manager = manager().await;
        let dir = std::env::temp_dir().join(format!("folder-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        manager.select_folder(dir.to_str().unwrap()).await.unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(manager.current_folder().await.unwrap(), None);
    }
}
