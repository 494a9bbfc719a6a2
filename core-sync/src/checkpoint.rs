//! Persisted bulk-sync checkpoint.

use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::SettingsStore;
use std::sync::Arc;
use tracing::debug;

pub const CHECKPOINT_KEY: &str = "playback_sync.last_sync_time";

/// Wall-clock time (Unix ms) of the last successful bulk sync pass.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `None` before the first successful pass or after a reset.
    async fn load(&self) -> Result<Option<i64>>;

    async fn save(&self, checkpoint: i64) -> Result<()>;

    async fn reset(&self) -> Result<()>;
}

/// [`CheckpointStore`] kept in the host [`SettingsStore`].
pub struct SettingsCheckpointStore {
    settings: Arc<dyn SettingsStore>,
}

impl SettingsCheckpointStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CheckpointStore for SettingsCheckpointStore {
    async fn load(&self) -> Result<Option<i64>> {
        Ok(self.settings.get_i64(CHECKPOINT_KEY).await?)
    }

    async fn save(&self, checkpoint: i64) -> Result<()> {
        self.settings.set_i64(CHECKPOINT_KEY, checkpoint).await?;
        debug!(checkpoint, "Sync checkpoint saved");
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.settings.delete(CHECKPOINT_KEY).await?;
        debug!("Sync checkpoint reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::SqliteSettingsStore;

    #[tokio::test]
    async fn test_save_load_reset() {
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let checkpoints = SettingsCheckpointStore::new(settings);

        assert_eq!(checkpoints.load().await.unwrap(), None);

        checkpoints.save(1_700_000_000_000).await.unwrap();
        assert_eq!(checkpoints.load().await.unwrap(), Some(1_700_000_000_000));

        checkpoints.reset().await.unwrap();
        assert_eq!(checkpoints.load().await.unwrap(), None);
    }
}
