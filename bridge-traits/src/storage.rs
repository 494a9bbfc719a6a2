//! Storage Abstractions
//!
//! Provides platform-agnostic traits for file I/O inside user-granted folders
//! and key-value settings storage.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    /// Creation time in Unix milliseconds, when the platform reports it
    pub created_at_ms: Option<i64>,
    /// Last modification time in Unix milliseconds
    pub modified_at_ms: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O so the sync core can run against different storage
/// backends:
/// - Desktop: Direct filesystem access
/// - Android: Storage Access Framework document trees with persisted grants
///
/// Media files and the synced folder are referenced by opaque URI strings;
/// [`resolve`](FileSystemAccess::resolve) turns them into the path form the
/// other methods accept.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn save(fs: &dyn FileSystemAccess, folder: &str, data: &[u8]) -> Result<()> {
///     let path = fs.resolve(folder).join("record.json");
///     fs.write_file(&path, data.to_vec().into()).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Convert a host URI into a path understood by this implementation
    fn resolve(&self, uri: &str) -> PathBuf {
        PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
    }

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Check whether `path` is a directory the app may still read and write
    ///
    /// Hosts with revocable grants (e.g. persisted URI permissions) should
    /// override this to consult the grant as well.
    async fn is_accessible_directory(&self, path: &Path) -> Result<bool> {
        if !self.exists(path).await? {
            return Ok(false);
        }
        Ok(self.metadata(path).await?.is_directory)
    }

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Read at most `len` bytes starting at `offset`
    ///
    /// Returns fewer bytes when the file ends first.
    async fn read_range(&self, path: &Path, offset: u64, len: usize) -> Result<Bytes>;

    /// Write data to a file, replacing any previous content
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences storage:
/// - Android: SharedPreferences / DataStore
/// - Desktop: SQLite-backed key-value table
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("sync_folder_uri", "/mnt/cloud/player").await?;
///     store.set_bool("remember_player_selections", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Fs {}

        #[async_trait]
        impl FileSystemAccess for Fs {
            async fn exists(&self, path: &Path) -> Result<bool>;
            async fn metadata(&self, path: &Path) -> Result<FileMetadata>;
            async fn create_dir_all(&self, path: &Path) -> Result<()>;
            async fn read_file(&self, path: &Path) -> Result<Bytes>;
            async fn read_range(&self, path: &Path, offset: u64, len: usize) -> Result<Bytes>;
            async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;
            async fn delete_file(&self, path: &Path) -> Result<()>;
            async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
        }
    }

    #[test]
    fn test_resolve_strips_file_scheme() {
        let fs = MockFs::new();
        assert_eq!(fs.resolve("file:///music/a.mkv"), PathBuf::from("/music/a.mkv"));
        assert_eq!(fs.resolve("/music/a.mkv"), PathBuf::from("/music/a.mkv"));
    }

    #[tokio::test]
    async fn test_missing_folder_is_not_accessible() {
        let mut fs = MockFs::new();
        fs.expect_exists().returning(|_| Ok(false));
        fs.expect_metadata().never();

        let accessible = fs.is_accessible_directory(Path::new("/sync")).await.unwrap();
        assert!(!accessible);
    }

    #[tokio::test]
    async fn test_plain_file_is_not_accessible_directory() {
        let mut fs = MockFs::new();
        fs.expect_exists().returning(|_| Ok(true));
        fs.expect_metadata().returning(|_| {
            Ok(FileMetadata {
                size: 10,
                created_at_ms: None,
                modified_at_ms: Some(1_700_000_000_000),
                is_directory: false,
            })
        });

        let accessible = fs.is_accessible_directory(Path::new("/sync")).await.unwrap();
        assert!(!accessible);
    }
}
