//! Domain models for the local position store

use serde::{Deserialize, Serialize};

/// Sentinel stored when a file has no resumable position.
///
/// Matches the player engine's "time unset" constant so the value can be
/// handed to the engine unchanged.
pub const POSITION_UNSET: i64 = i64::MIN + 1;

/// Clamp a reported playback position against the file's duration.
///
/// A position at or beyond the end means the file was finished, which is
/// stored as [`POSITION_UNSET`]. Negative positions are never resumable.
/// An unknown duration leaves the position untouched.
///
/// ```
/// use core_library::models::{final_position, POSITION_UNSET};
///
/// assert_eq!(final_position(5_000, Some(60_000)), 5_000);
/// assert_eq!(final_position(60_000, Some(60_000)), POSITION_UNSET);
/// assert_eq!(final_position(5_000, None), 5_000);
/// ```
pub fn final_position(position: i64, duration_ms: Option<i64>) -> i64 {
    if position < 0 {
        return POSITION_UNSET;
    }
    match duration_ms {
        Some(duration) if position >= duration => POSITION_UNSET,
        _ => position,
    }
}

/// Local playback state for one media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Opaque file handle (usually a content URI)
    pub handle: String,
    /// Content identifier last derived for this handle
    pub content_hash: Option<String>,
    pub duration_ms: Option<i64>,
    /// Resume position in ms, or [`POSITION_UNSET`]
    pub playback_position: i64,
    /// When the position was last written (Unix ms); `None` for legacy rows
    pub position_updated_at: Option<i64>,
    pub last_played_at: Option<i64>,
    pub playback_speed: Option<f32>,
    pub audio_track_index: Option<i32>,
    pub subtitle_track_index: Option<i32>,
    pub video_zoom: Option<f32>,
    /// References to subtitle files attached by the user
    pub external_subtitles: Vec<String>,
}

impl MediaRecord {
    /// A fresh row as the catalog scan would create it.
    pub fn new(handle: impl Into<String>, duration_ms: Option<i64>) -> Self {
        Self {
            handle: handle.into(),
            content_hash: None,
            duration_ms,
            playback_position: POSITION_UNSET,
            position_updated_at: None,
            last_played_at: None,
            playback_speed: None,
            audio_track_index: None,
            subtitle_track_index: None,
            video_zoom: None,
            external_subtitles: Vec::new(),
        }
    }

    /// Resume position, if one is stored.
    pub fn resume_position(&self) -> Option<i64> {
        (self.playback_position != POSITION_UNSET).then_some(self.playback_position)
    }

    /// Position timestamp with legacy rows treated as epoch 0.
    pub fn position_timestamp(&self) -> i64 {
        self.position_updated_at.unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.handle.trim().is_empty() {
            return Err("Media handle cannot be empty".to_string());
        }

        if matches!(self.duration_ms, Some(d) if d < 0) {
            return Err("Duration cannot be negative".to_string());
        }

        if let Some(duration) = self.duration_ms {
            if self.playback_position != POSITION_UNSET
                && (self.playback_position < 0 || self.playback_position >= duration)
            {
                return Err("Playback position must be within the duration".to_string());
            }
        }

        Ok(())
    }
}
