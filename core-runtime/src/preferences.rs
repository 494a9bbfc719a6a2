//! Player preferences consumed by the sync core.
//!
//! Only two pieces of the host's preference storage matter here: the synced
//! folder reference and whether per-file player selections are remembered.

use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::SettingsStore;
use std::sync::Arc;
use tracing::debug;

pub const SYNC_FOLDER_KEY: &str = "sync_folder_uri";
pub const REMEMBER_SELECTIONS_KEY: &str = "remember_player_selections";

/// Snapshot of the preferences relevant to playback sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerPreferences {
    /// Folder chosen for external records; `None` when sync is disabled.
    pub sync_folder_uri: Option<String>,
    /// Persist audio/subtitle track, zoom and speed per file.
    pub remember_player_selections: bool,
}

impl Default for PlayerPreferences {
    fn default() -> Self {
        Self {
            sync_folder_uri: None,
            remember_player_selections: true,
        }
    }
}

#[async_trait]
pub trait PreferencesRepository: Send + Sync {
    async fn load(&self) -> Result<PlayerPreferences>;

    /// Store `uri` as the synced folder, or clear it with `None`.
    async fn set_sync_folder(&self, uri: Option<&str>) -> Result<()>;

    async fn set_remember_player_selections(&self, remember: bool) -> Result<()>;
}

/// [`PreferencesRepository`] over the host [`SettingsStore`].
pub struct SettingsPreferences {
    store: Arc<dyn SettingsStore>,
}

impl SettingsPreferences {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PreferencesRepository for SettingsPreferences {
    async fn load(&self) -> Result<PlayerPreferences> {
        // A blank folder string means sync is off
        let sync_folder_uri = self
            .store
            .get_string(SYNC_FOLDER_KEY)
            .await?
            .filter(|uri| !uri.trim().is_empty());

        let remember_player_selections = self
            .store
            .get_bool(REMEMBER_SELECTIONS_KEY)
            .await?
            .unwrap_or(true);

        Ok(PlayerPreferences {
            sync_folder_uri,
            remember_player_selections,
        })
    }

    async fn set_sync_folder(&self, uri: Option<&str>) -> Result<()> {
        match uri {
            Some(uri) if !uri.trim().is_empty() => {
                self.store.set_string(SYNC_FOLDER_KEY, uri).await?;
                debug!(folder = crate::logging::strip_path(uri), "Sync folder stored");
            }
            _ => {
                self.store.delete(SYNC_FOLDER_KEY).await?;
                debug!("Sync folder cleared");
            }
        }
        Ok(())
    }

    async fn set_remember_player_selections(&self, remember: bool) -> Result<()> {
        self.store.set_bool(REMEMBER_SELECTIONS_KEY, remember).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::SqliteSettingsStore;

    async fn preferences() -> (SettingsPreferences, Arc<dyn SettingsStore>) {
        let store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        (SettingsPreferences::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let (prefs, _) = preferences().await;
        assert_eq!(prefs.load().await.unwrap(), PlayerPreferences::default());
    }

    #[tokio::test]
    async fn test_blank_folder_reads_as_unset() {
        let (prefs, store) = preferences().await;
        store.set_string(SYNC_FOLDER_KEY, "   ").await.unwrap();

        assert_eq!(prefs.load().await.unwrap().sync_folder_uri, None);
    }

    #[tokio::test]
    async fn test_set_and_clear_folder() {
        let (prefs, store) = preferences().await;

        prefs.set_sync_folder(Some("/sdcard/Sync")).await.unwrap();
        assert_eq!(
            prefs.load().await.unwrap().sync_folder_uri.as_deref(),
            Some("/sdcard/Sync")
        );

        prefs.set_sync_folder(None).await.unwrap();
        assert!(!store.has_key(SYNC_FOLDER_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_selections_round_trip() {
        let (prefs, _) = preferences().await;
        prefs.set_remember_player_selections(false).await.unwrap();
        assert!(!prefs.load().await.unwrap().remember_player_selections);
    }
}
