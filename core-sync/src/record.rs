//! External playback-position record format.
//!
//! Records are UTF-8 JSON objects with exactly three fields:
//!
//! ```json
//! { "identifier": "9f86d0…", "position": 5000, "lastUpdated": 1700000000000 }
//! ```
//!
//! Unknown fields are ignored on read. Records written by the filename-keyed
//! variant carry `"filename"` instead of `"identifier"` and parse the same way.

use crate::identity::ContentId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPositionRecord {
    #[serde(alias = "filename")]
    pub identifier: ContentId,
    /// Position in milliseconds
    pub position: i64,
    /// Unix epoch milliseconds
    pub last_updated: i64,
}

impl PlaybackPositionRecord {
    pub fn new(identifier: ContentId, position: i64, last_updated: i64) -> Self {
        Self {
            identifier,
            position,
            last_updated,
        }
    }

    /// Parse a single record; blank content yields `None`.
    pub fn parse(content: &[u8]) -> serde_json::Result<Option<Self>> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(content).map(Some)
    }
}
