//! Media state repository trait and SQLite implementation

use crate::error::{LibraryError, Result};
use crate::models::{MediaRecord, POSITION_UNSET};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{FromRow, SqlitePool};

/// Data access for the `media_state` table
///
/// Rows are created by the catalog scan through [`upsert_media`]; every
/// targeted update on a handle without a row is a no-op reported as `false`.
///
/// [`upsert_media`]: MediaRepository::upsert_media
#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Find the row for a file handle
    async fn find_by_handle(&self, handle: &str) -> Result<Option<MediaRecord>>;

    /// Insert a row for `handle`, or refresh its duration if it exists
    ///
    /// Playback state of an existing row is left untouched.
    async fn upsert_media(&self, handle: &str, duration_ms: Option<i64>) -> Result<()>;

    /// Delete a row
    ///
    /// # Returns
    /// - `Ok(true)` if the row was deleted
    /// - `Ok(false)` if no row existed
    async fn remove(&self, handle: &str) -> Result<bool>;

    /// Store position and position timestamp verbatim
    async fn update_position(&self, handle: &str, position: i64, updated_at: i64) -> Result<bool>;

    /// Overwrite position and timestamp of every row carrying `content_hash`
    ///
    /// The position is clamped against each row's own duration.
    ///
    /// # Returns
    /// Number of rows updated
    async fn update_position_by_hash(
        &self,
        content_hash: &str,
        position: i64,
        updated_at: i64,
    ) -> Result<u64>;

    /// Handles of rows that have no content identifier yet
    async fn find_unidentified(&self) -> Result<Vec<String>>;

    /// Remember the content identifier derived for a handle
    async fn set_content_hash(&self, handle: &str, content_hash: &str) -> Result<bool>;

    async fn update_last_played(&self, handle: &str, played_at: i64) -> Result<bool>;

    async fn update_speed(&self, handle: &str, speed: f32) -> Result<bool>;

    async fn update_audio_track(&self, handle: &str, index: i32) -> Result<bool>;

    async fn update_subtitle_track(&self, handle: &str, index: i32) -> Result<bool>;

    async fn update_zoom(&self, handle: &str, zoom: f32) -> Result<bool>;

    /// Replace the attached subtitle list
    async fn set_external_subtitles(&self, handle: &str, subtitles: &[String]) -> Result<bool>;
}

/// SQLite implementation of MediaRepository
pub struct SqliteMediaRepository {
    pool: SqlitePool,
}

impl SqliteMediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn execute_update<'a>(&self, query: Query<'a, Sqlite, SqliteArguments<'a>>) -> Result<bool> {
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Database row representation of media state
#[derive(Debug, FromRow)]
struct MediaRow {
    handle: String,
    content_hash: Option<String>,
    duration_ms: Option<i64>,
    playback_position: i64,
    position_updated_at: Option<i64>,
    last_played_at: Option<i64>,
    playback_speed: Option<f32>,
    audio_track_index: Option<i32>,
    subtitle_track_index: Option<i32>,
    video_zoom: Option<f32>,
    external_subtitles: String,
}

impl TryFrom<MediaRow> for MediaRecord {
    type Error = LibraryError;

    fn try_from(row: MediaRow) -> Result<Self> {
        let external_subtitles = if row.external_subtitles.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&row.external_subtitles).map_err(|e| {
                LibraryError::InvalidInput {
                    field: "external_subtitles".to_string(),
                    message: e.to_string(),
                }
            })?
        };

        Ok(MediaRecord {
            handle: row.handle,
            content_hash: row.content_hash,
            duration_ms: row.duration_ms,
            playback_position: row.playback_position,
            position_updated_at: row.position_updated_at,
            last_played_at: row.last_played_at,
            playback_speed: row.playback_speed,
            audio_track_index: row.audio_track_index,
            subtitle_track_index: row.subtitle_track_index,
            video_zoom: row.video_zoom,
            external_subtitles,
        })
    }
}

#[async_trait]
impl MediaRepository for SqliteMediaRepository {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<MediaRecord>> {
        let row = sqlx::query_as::<_, MediaRow>(
            r#"
            SELECT handle, content_hash, duration_ms, playback_position,
                   position_updated_at, last_played_at, playback_speed,
                   audio_track_index, subtitle_track_index, video_zoom,
                   external_subtitles
            FROM media_state
            WHERE handle = ?
            "#,
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MediaRecord::try_from).transpose()
    }

    async fn upsert_media(&self, handle: &str, duration_ms: Option<i64>) -> Result<()> {
        if handle.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "handle".to_string(),
                message: "Media handle cannot be empty".to_string(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO media_state (handle, duration_ms, playback_position)
            VALUES (?, ?, ?)
            ON CONFLICT(handle) DO UPDATE SET duration_ms = excluded.duration_ms
            "#,
        )
        .bind(handle)
        .bind(duration_ms)
        .bind(POSITION_UNSET)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, handle: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media_state WHERE handle = ?")
            .bind(handle)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_position(&self, handle: &str, position: i64, updated_at: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE media_state SET playback_position = ?, position_updated_at = ? WHERE handle = ?",
        )
        .bind(position)
        .bind(updated_at)
        .bind(handle)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_position_by_hash(
        &self,
        content_hash: &str,
        position: i64,
        updated_at: i64,
    ) -> Result<u64> {
        // Same rule as models::final_position, evaluated per row
        let result = sqlx::query(
            r#"
            UPDATE media_state SET
                playback_position = CASE
                    WHEN ?1 < 0 OR (duration_ms IS NOT NULL AND ?1 >= duration_ms) THEN ?2
                    ELSE ?1
                END,
                position_updated_at = ?3
            WHERE content_hash = ?4
            "#,
        )
        .bind(position)
        .bind(POSITION_UNSET)
        .bind(updated_at)
        .bind(content_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_unidentified(&self) -> Result<Vec<String>> {
        let handles = sqlx::query_scalar::<_, String>(
            "SELECT handle FROM media_state WHERE content_hash IS NULL ORDER BY handle",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(handles)
    }

    async fn set_content_hash(&self, handle: &str, content_hash: &str) -> Result<bool> {
        self.execute_update(
            sqlx::query("UPDATE media_state SET content_hash = ? WHERE handle = ?")
                .bind(content_hash)
                .bind(handle),
        )
        .await
    }

    async fn update_last_played(&self, handle: &str, played_at: i64) -> Result<bool> {
        self.execute_update(
            sqlx::query("UPDATE media_state SET last_played_at = ? WHERE handle = ?")
                .bind(played_at)
                .bind(handle),
        )
        .await
    }

    async fn update_speed(&self, handle: &str, speed: f32) -> Result<bool> {
        self.execute_update(
            sqlx::query("UPDATE media_state SET playback_speed = ? WHERE handle = ?")
                .bind(speed)
                .bind(handle),
        )
        .await
    }

    async fn update_audio_track(&self, handle: &str, index: i32) -> Result<bool> {
        self.execute_update(
            sqlx::query("UPDATE media_state SET audio_track_index = ? WHERE handle = ?")
                .bind(index)
                .bind(handle),
        )
        .await
    }

    async fn update_subtitle_track(&self, handle: &str, index: i32) -> Result<bool> {
        self.execute_update(
            sqlx::query("UPDATE media_state SET subtitle_track_index = ? WHERE handle = ?")
                .bind(index)
                .bind(handle),
        )
        .await
    }

    async fn update_zoom(&self, handle: &str, zoom: f32) -> Result<bool> {
        self.execute_update(
            sqlx::query("UPDATE media_state SET video_zoom = ? WHERE handle = ?")
                .bind(zoom)
                .bind(handle),
        )
        .await
    }

    async fn set_external_subtitles(&self, handle: &str, subtitles: &[String]) -> Result<bool> {
        let encoded = serde_json::to_string(subtitles).map_err(|e| LibraryError::InvalidInput {
            field: "external_subtitles".to_string(),
            message: e.to_string(),
        })?;

        self.execute_update(
            sqlx::query("UPDATE media_state SET external_subtitles = ? WHERE handle = ?")
                .bind(encoded)
                .bind(handle),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    const HANDLE: &str = "content://media/external/video/media/42";

    async fn repository() -> SqliteMediaRepository {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteMediaRepository::new(pool);
        repo.upsert_media(HANDLE, Some(60_000)).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_upsert_creates_unset_row() {
        let repo = repository().await;

        let record = repo.find_by_handle(HANDLE).await.unwrap().unwrap();
        assert_eq!(record, MediaRecord::new(HANDLE, Some(60_000)));
    }

    #[tokio::test]
    async fn test_upsert_keeps_playback_state() {
        let repo = repository().await;
        repo.update_position(HANDLE, 5_000, 100).await.unwrap();

        repo.upsert_media(HANDLE, Some(90_000)).await.unwrap();

        let record = repo.find_by_handle(HANDLE).await.unwrap().unwrap();
        assert_eq!(record.duration_ms, Some(90_000));
        assert_eq!(record.playback_position, 5_000);
        assert_eq!(record.position_updated_at, Some(100));
    }

    #[tokio::test]
    async fn test_upsert_rejects_empty_handle() {
        let repo = repository().await;
        assert!(matches!(
            repo.upsert_media("", None).await,
            Err(LibraryError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_position_missing_row() {
        let repo = repository().await;
        assert!(!repo.update_position("content://missing", 1, 1).await.unwrap());
        assert!(repo.find_by_handle("content://missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_position_by_hash_clamps_per_row() {
        let repo = repository().await;
        repo.upsert_media("content://copy", Some(30_000)).await.unwrap();
        repo.upsert_media("content://other", Some(60_000)).await.unwrap();
        repo.set_content_hash(HANDLE, "abc").await.unwrap();
        repo.set_content_hash("content://copy", "abc").await.unwrap();

        let rows = repo.update_position_by_hash("abc", 45_000, 200).await.unwrap();
        assert_eq!(rows, 2);

        let original = repo.find_by_handle(HANDLE).await.unwrap().unwrap();
        assert_eq!(original.playback_position, 45_000);
        assert_eq!(original.position_updated_at, Some(200));

        let shorter = repo.find_by_handle("content://copy").await.unwrap().unwrap();
        assert_eq!(shorter.playback_position, POSITION_UNSET);
        assert_eq!(shorter.position_updated_at, Some(200));

        let untouched = repo.find_by_handle("content://other").await.unwrap().unwrap();
        assert_eq!(untouched.position_updated_at, None);

        assert_eq!(repo.update_position_by_hash("nope", 1, 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_unidentified() {
        let repo = repository().await;
        repo.upsert_media("content://b", None).await.unwrap();
        repo.upsert_media("content://c", None).await.unwrap();
        assert!(repo.set_content_hash("content://c", "abc").await.unwrap());

        assert_eq!(
            repo.find_unidentified().await.unwrap(),
            vec!["content://b".to_string(), HANDLE.to_string()]
        );
    }

    #[tokio::test]
    async fn test_player_settings() {
        let repo = repository().await;

        assert!(repo.update_speed(HANDLE, 1.5).await.unwrap());
        assert!(repo.update_audio_track(HANDLE, 2).await.unwrap());
        assert!(repo.update_subtitle_track(HANDLE, -1).await.unwrap());
        assert!(repo.update_zoom(HANDLE, 1.25).await.unwrap());
        assert!(repo.update_last_played(HANDLE, 777).await.unwrap());

        let subs = vec!["content://subs/a.srt".to_string()];
        assert!(repo.set_external_subtitles(HANDLE, &subs).await.unwrap());

        let record = repo.find_by_handle(HANDLE).await.unwrap().unwrap();
        assert_eq!(record.playback_speed, Some(1.5));
        assert_eq!(record.audio_track_index, Some(2));
        assert_eq!(record.subtitle_track_index, Some(-1));
        assert_eq!(record.video_zoom, Some(1.25));
        assert_eq!(record.last_played_at, Some(777));
        assert_eq!(record.external_subtitles, subs);
    }

    #[tokio::test]
    async fn test_remove() {
        let repo = repository().await;
        assert!(repo.remove(HANDLE).await.unwrap());
        assert!(!repo.remove(HANDLE).await.unwrap());
        assert!(repo.find_by_handle(HANDLE).await.unwrap().is_none());
    }
}
