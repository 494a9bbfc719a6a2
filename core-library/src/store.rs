//! # Local Position Store
//!
//! Service over [`MediaRepository`] that applies the playback-state rules:
//! positions are clamped with [`final_position`], every position write stamps
//! the position timestamp and refreshes the last-played time, and per-file
//! player settings are only kept when the user asked for it.
//!
//! ## Write scopes
//!
//! Reads and the reconciliation writes are awaited. Writes coming from the
//! player (`update_*`) are fire-and-forget: they run on an application-wide
//! [`TaskTracker`] that is not tied to any UI lifecycle, so a save started
//! while the player screen is torn down still completes. [`drain`] waits for
//! everything queued so far.
//!
//! [`drain`]: LocalPositionStore::drain

use crate::error::Result;
use crate::models::{final_position, MediaRecord};
use crate::repositories::MediaRepository;
use bridge_traits::Clock;
use core_runtime::events::{CoreEvent, EventBus, PositionEvent};
use core_runtime::logging::strip_path;
use core_runtime::preferences::PreferencesRepository;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, instrument, warn};

/// Outcome of a position write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionWrite {
    /// Position as persisted (after clamping)
    pub position: i64,
    /// Timestamp stamped on the write (Unix ms)
    pub updated_at: i64,
    /// Whether a local row existed for the handle
    pub row_found: bool,
}

/// Per-file player selection gated by `remember_player_selections`.
#[derive(Debug, Clone, Copy)]
enum Selection {
    Speed(f32),
    AudioTrack(i32),
    SubtitleTrack(i32),
    Zoom(f32),
}

impl Selection {
    fn name(self) -> &'static str {
        match self {
            Selection::Speed(_) => "playback_speed",
            Selection::AudioTrack(_) => "audio_track",
            Selection::SubtitleTrack(_) => "subtitle_track",
            Selection::Zoom(_) => "video_zoom",
        }
    }
}

#[derive(Clone)]
pub struct LocalPositionStore {
    repository: Arc<dyn MediaRepository>,
    clock: Arc<dyn Clock>,
    preferences: Option<Arc<dyn PreferencesRepository>>,
    events: Option<EventBus>,
    tracker: TaskTracker,
    drain_lock: Arc<Mutex<()>>,
}

impl LocalPositionStore {
    pub fn new(repository: Arc<dyn MediaRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            clock,
            preferences: None,
            events: None,
            tracker: TaskTracker::new(),
            drain_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Gate per-file player selections on the user's preference.
    pub fn with_preferences(mut self, preferences: Arc<dyn PreferencesRepository>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn repository(&self) -> &Arc<dyn MediaRepository> {
        &self.repository
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Point lookup by file handle.
    pub async fn get(&self, handle: &str) -> Result<Option<MediaRecord>> {
        self.repository.find_by_handle(handle).await
    }

    /// Persist a position reported by the player, awaiting the write.
    ///
    /// The position is clamped against the row's duration (no row means no
    /// clamp) and stamped with the current time, which also becomes the
    /// last-played time.
    #[instrument(skip(self, handle), fields(handle = %strip_path(handle)))]
    pub async fn record_position(&self, handle: &str, position: i64) -> Result<PositionWrite> {
        let duration = self
            .repository
            .find_by_handle(handle)
            .await?
            .and_then(|record| record.duration_ms);
        let position = final_position(position, duration);
        let updated_at = self.clock.unix_timestamp_millis();

        let row_found = self
            .repository
            .update_position(handle, position, updated_at)
            .await?;
        self.repository.update_last_played(handle, updated_at).await?;

        if row_found {
            self.emit(PositionEvent::Updated {
                handle: handle.to_string(),
                position_ms: position,
                updated_at,
            });
        } else {
            debug!("No local row for handle; position not stored locally");
        }

        Ok(PositionWrite {
            position,
            updated_at,
            row_found,
        })
    }

    /// Adopt a position from the external store with its own timestamp.
    ///
    /// Returns the position as persisted, or `None` when no row exists.
    pub async fn adopt_position(
        &self,
        handle: &str,
        position: i64,
        updated_at: i64,
    ) -> Result<Option<i64>> {
        let Some(record) = self.repository.find_by_handle(handle).await? else {
            return Ok(None);
        };

        let position = final_position(position, record.duration_ms);
        self.repository
            .update_position(handle, position, updated_at)
            .await?;

        self.emit(PositionEvent::Updated {
            handle: handle.to_string(),
            position_ms: position,
            updated_at,
        });
        Ok(Some(position))
    }

    /// Overwrite every row sharing a content identifier.
    pub async fn adopt_position_by_identifier(
        &self,
        identifier: &str,
        position: i64,
        updated_at: i64,
    ) -> Result<u64> {
        let rows = self
            .repository
            .update_position_by_hash(identifier, position, updated_at)
            .await?;

        if rows > 0 {
            self.emit(PositionEvent::UpdatedByIdentifier {
                identifier: identifier.to_string(),
                position_ms: position,
                updated_at,
                rows,
            });
        }
        Ok(rows)
    }

    /// Handles of catalog rows bulk sync cannot match yet.
    pub async fn unidentified_handles(&self) -> Result<Vec<String>> {
        self.repository.find_unidentified().await
    }

    /// Remember the identifier derived for a handle so bulk sync can find it.
    pub async fn remember_identifier(&self, handle: &str, identifier: &str) -> Result<()> {
        self.repository.set_content_hash(handle, identifier).await?;
        Ok(())
    }

    /// Queue a position write on the application-wide scope.
    pub fn update_position(&self, handle: impl Into<String>, position: i64) {
        let handle = handle.into();
        let store = self.clone();
        self.spawn_detached(async move {
            if let Err(e) = store.record_position(&handle, position).await {
                warn!(handle = %strip_path(&handle), error = %e, "Failed to store playback position");
            }
        });
    }

    pub fn update_last_played(&self, handle: impl Into<String>) {
        let handle = handle.into();
        let store = self.clone();
        self.spawn_detached(async move {
            let now = store.clock.unix_timestamp_millis();
            if let Err(e) = store.repository.update_last_played(&handle, now).await {
                warn!(handle = %strip_path(&handle), error = %e, "Failed to store last played time");
            }
        });
    }

    pub fn update_speed(&self, handle: impl Into<String>, speed: f32) {
        self.queue_selection(handle.into(), Selection::Speed(speed));
    }

    pub fn update_audio_track(&self, handle: impl Into<String>, index: i32) {
        self.queue_selection(handle.into(), Selection::AudioTrack(index));
    }

    pub fn update_subtitle_track(&self, handle: impl Into<String>, index: i32) {
        self.queue_selection(handle.into(), Selection::SubtitleTrack(index));
    }

    pub fn update_zoom(&self, handle: impl Into<String>, zoom: f32) {
        self.queue_selection(handle.into(), Selection::Zoom(zoom));
    }

    /// Attach a subtitle file; already attached references are ignored.
    pub fn add_external_subtitle(&self, handle: impl Into<String>, subtitle: impl Into<String>) {
        let handle = handle.into();
        let subtitle = subtitle.into();
        let store = self.clone();
        self.spawn_detached(async move {
            if let Err(e) = store.append_subtitle(&handle, subtitle).await {
                warn!(handle = %strip_path(&handle), error = %e, "Failed to attach subtitle");
            }
        });
    }

    /// Run `task` on the application-wide scope.
    pub fn spawn_detached<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Wait until every write queued so far has finished.
    ///
    /// Concurrent drains run one after another; the tracker is reopened only
    /// once the current drain has seen it empty.
    pub async fn drain(&self) {
        let _guard = self.drain_lock.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    async fn append_subtitle(&self, handle: &str, subtitle: String) -> Result<()> {
        let Some(record) = self.repository.find_by_handle(handle).await? else {
            return Ok(());
        };
        if record.external_subtitles.contains(&subtitle) {
            return Ok(());
        }

        let mut subtitles = record.external_subtitles;
        subtitles.push(subtitle);
        if self
            .repository
            .set_external_subtitles(handle, &subtitles)
            .await?
        {
            self.emit(PositionEvent::SettingChanged {
                handle: handle.to_string(),
                setting: "external_subtitles".to_string(),
            });
        }
        Ok(())
    }

    async fn remembers_selections(&self) -> bool {
        let Some(preferences) = &self.preferences else {
            return true;
        };
        match preferences.load().await {
            Ok(prefs) => prefs.remember_player_selections,
            Err(e) => {
                warn!(error = %e, "Failed to load player preferences; keeping selections");
                true
            }
        }
    }

    fn queue_selection(&self, handle: String, selection: Selection) {
        let store = self.clone();
        self.spawn_detached(async move {
            if !store.remembers_selections().await {
                debug!(setting = selection.name(), "Player selections are not remembered; skipping");
                return;
            }
            if let Err(e) = store.apply_selection(&handle, selection).await {
                warn!(
                    handle = %strip_path(&handle),
                    setting = selection.name(),
                    error = %e,
                    "Failed to store player setting"
                );
            }
        });
    }

    async fn apply_selection(&self, handle: &str, selection: Selection) -> Result<()> {
        let updated = match selection {
            Selection::Speed(speed) => self.repository.update_speed(handle, speed).await?,
            Selection::AudioTrack(index) => self.repository.update_audio_track(handle, index).await?,
            Selection::SubtitleTrack(index) => {
                self.repository.update_subtitle_track(handle, index).await?
            }
            Selection::Zoom(zoom) => self.repository.update_zoom(handle, zoom).await?,
        };
        if !updated {
            return Ok(());
        }

        let now = self.clock.unix_timestamp_millis();
        self.repository.update_last_played(handle, now).await?;
        self.emit(PositionEvent::SettingChanged {
            handle: handle.to_string(),
            setting: selection.name().to_string(),
        });
        Ok(())
    }

    fn emit(&self, event: PositionEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine
            let _ = events.emit(CoreEvent::Position(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::POSITION_UNSET;
    use crate::repositories::SqliteMediaRepository;
    use async_trait::async_trait;
    use bridge_traits::ManualClock;
    use core_runtime::preferences::PlayerPreferences;

    const HANDLE: &str = "content://media/external/video/media/7";

    struct FixedPreferences(PlayerPreferences);

    #[async_trait]
    impl PreferencesRepository for FixedPreferences {
        async fn load(&self) -> core_runtime::Result<PlayerPreferences> {
            Ok(self.0.clone())
        }

        async fn set_sync_folder(&self, _uri: Option<&str>) -> core_runtime::Result<()> {
            Ok(())
        }

        async fn set_remember_player_selections(&self, _remember: bool) -> core_runtime::Result<()> {
            Ok(())
        }
    }

    async fn store() -> (LocalPositionStore, Arc<ManualClock>) {
        let repo = Arc::new(SqliteMediaRepository::new(create_test_pool().await.unwrap()));
        repo.upsert_media(HANDLE, Some(60_000)).await.unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        (LocalPositionStore::new(repo, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_record_position_stamps_and_refreshes_last_played() {
        let (store, _) = store().await;

        let write = store.record_position(HANDLE, 5_000).await.unwrap();
        assert_eq!(
            write,
            PositionWrite {
                position: 5_000,
                updated_at: 1_000,
                row_found: true
            }
        );

        let record = store.get(HANDLE).await.unwrap().unwrap();
        assert_eq!(record.playback_position, 5_000);
        assert_eq!(record.position_updated_at, Some(1_000));
        assert_eq!(record.last_played_at, Some(1_000));
    }

    #[tokio::test]
    async fn test_record_position_at_end_is_unset() {
        let (store, _) = store().await;

        let write = store.record_position(HANDLE, 60_000).await.unwrap();
        assert_eq!(write.position, POSITION_UNSET);
        assert_eq!(store.get(HANDLE).await.unwrap().unwrap().resume_position(), None);
    }

    #[tokio::test]
    async fn test_record_position_without_row_is_unclamped() {
        let (store, _) = store().await;

        let write = store.record_position("content://unknown", 90_000).await.unwrap();
        assert_eq!(write.position, 90_000);
        assert!(!write.row_found);
    }

    #[tokio::test]
    async fn test_adopt_position_keeps_external_timestamp_and_clamps() {
        let (store, _) = store().await;

        assert_eq!(store.adopt_position(HANDLE, 7_000, 200).await.unwrap(), Some(7_000));
        let record = store.get(HANDLE).await.unwrap().unwrap();
        assert_eq!((record.playback_position, record.position_updated_at), (7_000, Some(200)));

        assert_eq!(
            store.adopt_position(HANDLE, 70_000, 300).await.unwrap(),
            Some(POSITION_UNSET)
        );
        assert_eq!(store.adopt_position("content://unknown", 1, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fire_and_forget_updates_complete_after_drain() {
        let (store, clock) = store().await;
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let store = store.with_event_bus(bus);

        clock.set(5_000);
        store.update_speed(HANDLE, 1.5);
        store.update_zoom(HANDLE, 2.0);
        store.update_audio_track(HANDLE, 1);
        store.update_subtitle_track(HANDLE, 3);
        store.drain().await;

        let record = store.get(HANDLE).await.unwrap().unwrap();
        assert_eq!(record.playback_speed, Some(1.5));
        assert_eq!(record.video_zoom, Some(2.0));
        assert_eq!(record.audio_track_index, Some(1));
        assert_eq!(record.subtitle_track_index, Some(3));
        assert_eq!(record.last_played_at, Some(5_000));

        let mut settings = 0;
        while let Ok(CoreEvent::Position(PositionEvent::SettingChanged { .. })) = events.try_recv() {
            settings += 1;
        }
        assert_eq!(settings, 4);

        // The tracker is reusable after a drain
        store.update_position(HANDLE, 10_000);
        store.drain().await;
        assert_eq!(store.get(HANDLE).await.unwrap().unwrap().playback_position, 10_000);
    }

    #[tokio::test]
    async fn test_concurrent_drains_all_complete() {
        let (store, _) = store().await;

        for position in [1_000, 2_000, 3_000] {
            store.update_position(HANDLE, position);
        }
        let first = store.clone();
        let second = store.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            async { tokio::join!(first.drain(), second.drain(), store.drain()) },
        )
        .await
        .unwrap();

        // Still accepting and draining work afterwards
        store.update_position(HANDLE, 4_000);
        store.drain().await;
        assert_eq!(store.get(HANDLE).await.unwrap().unwrap().playback_position, 4_000);
    }

    #[tokio::test]
    async fn test_selections_skipped_when_not_remembered() {
        let (store, _) = store().await;
        let store = store.with_preferences(Arc::new(FixedPreferences(PlayerPreferences {
            sync_folder_uri: None,
            remember_player_selections: false,
        })));

        store.update_speed(HANDLE, 2.0);
        store.update_position(HANDLE, 3_000);
        store.drain().await;

        let record = store.get(HANDLE).await.unwrap().unwrap();
        assert_eq!(record.playback_speed, None);
        assert_eq!(record.playback_position, 3_000);
    }

    #[tokio::test]
    async fn test_external_subtitles_are_deduplicated() {
        let (store, _) = store().await;

        store.add_external_subtitle(HANDLE, "content://subs/en.srt");
        store.drain().await;
        store.add_external_subtitle(HANDLE, "content://subs/en.srt");
        store.add_external_subtitle(HANDLE, "content://subs/de.srt");
        store.drain().await;

        let record = store.get(HANDLE).await.unwrap().unwrap();
        assert_eq!(
            record.external_subtitles,
            vec!["content://subs/en.srt".to_string(), "content://subs/de.srt".to_string()]
        );
    }
}
