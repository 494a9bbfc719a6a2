//! # Content Identity
//!
//! Derives a stable identifier for a media file from its bytes so that
//! external records survive renames, moves and changing access handles.
//!
//! The fingerprint is SHA-256 over the decimal file size, the first
//! [`HASH_WINDOW`] bytes and, for larger files, the last bytes not already
//! covered by the head window (at most [`HASH_WINDOW`]). Files that agree on
//! size, head and tail collide even when their middles differ.

use bridge_traits::FileSystemAccess;
use core_runtime::config::IdentityStrategy;
use core_runtime::logging::strip_path;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Bytes hashed from each end of the file.
pub const HASH_WINDOW: usize = 4096;

/// Identifier of a logical media file in the external records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash the size, head and tail windows of a file into a lowercase hex digest.
///
/// `tail` must not overlap `head`; pass an empty slice for files no larger
/// than [`HASH_WINDOW`].
pub fn fingerprint(size: u64, head: &[u8], tail: &[u8]) -> ContentId {
    let mut hasher = Sha256::new();
    hasher.update(size.to_string().as_bytes());
    hasher.update(head);
    hasher.update(tail);
    ContentId(hex::encode(hasher.finalize()))
}

/// Lowercase hex SHA-256 of a string.
pub fn hash_string(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Derive the content fingerprint of the file at `uri`.
///
/// Returns `None` when the file is empty or any read fails; callers fall back
/// to local-only behavior.
pub async fn derive_identifier(fs: &dyn FileSystemAccess, uri: &str) -> Option<ContentId> {
    match read_windows(fs, uri).await {
        Ok(Some((size, head, tail))) => Some(fingerprint(size, &head, &tail)),
        Ok(None) => {
            debug!(file = strip_path(uri), "Empty file has no content identifier");
            None
        }
        Err(e) => {
            debug!(file = strip_path(uri), error = %e, "Content identifier unavailable");
            None
        }
    }
}

/// Identifier used by the filename-keyed record variant.
pub fn file_name_identifier(uri: &str) -> Option<ContentId> {
    let name = strip_path(uri.trim_end_matches(['/', '\\']));
    (!name.is_empty()).then(|| ContentId::new(name))
}

async fn read_windows(
    fs: &dyn FileSystemAccess,
    uri: &str,
) -> bridge_traits::error::Result<Option<(u64, Vec<u8>, Vec<u8>)>> {
    let path = fs.resolve(uri);
    let size = fs.metadata(&path).await?.size;
    if size == 0 {
        return Ok(None);
    }

    let head = fs.read_range(&path, 0, HASH_WINDOW).await?;

    let mut tail = Vec::new();
    if size > HASH_WINDOW as u64 {
        // Never re-read bytes the head window already covered
        let offset = (size - HASH_WINDOW as u64).max(head.len() as u64);
        let len = (size - offset) as usize;
        if len > 0 {
            tail = fs.read_range(&path, offset, len).await?.to_vec();
        }
    }

    Ok(Some((size, head.to_vec(), tail)))
}

/// Derives identifiers according to the configured [`IdentityStrategy`].
#[derive(Clone)]
pub struct IdentityDeriver {
    fs: Arc<dyn FileSystemAccess>,
    strategy: IdentityStrategy,
}

impl IdentityDeriver {
    pub fn new(fs: Arc<dyn FileSystemAccess>, strategy: IdentityStrategy) -> Self {
        Self { fs, strategy }
    }

    pub fn strategy(&self) -> IdentityStrategy {
        self.strategy
    }

    pub async fn derive(&self, uri: &str) -> Option<ContentId> {
        match self.strategy {
            IdentityStrategy::ContentHash => derive_identifier(self.fs.as_ref(), uri).await,
            IdentityStrategy::FileName => file_name_identifier(uri),
        }
    }
}
