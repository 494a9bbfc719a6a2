//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Tokio-based file system implementation
///
/// Desktop folders have no revocable grant, so a synced folder stays valid as
/// long as it exists and is a directory.
#[derive(Debug, Default, Clone)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => BridgeError::PermissionDenied(e.to_string()),
            _ => BridgeError::Io(e),
        }
    }

    fn to_millis(time: std::io::Result<SystemTime>) -> Option<i64> {
        time.ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;

        Ok(FileMetadata {
            size: metadata.len(),
            created_at_ms: Self::to_millis(metadata.created()),
            modified_at_ms: Self::to_millis(metadata.modified()),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn read_range(&self, path: &Path, offset: u64, len: usize) -> Result<Bytes> {
        let mut file = fs::File::open(path).await.map_err(Self::map_io_error)?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(Self::map_io_error)?;

        let mut buffer = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut buffer)
            .await
            .map_err(Self::map_io_error)?;

        Ok(Bytes::from(buffer))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        fs::write(path, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir.next_entry().await.map_err(Self::map_io_error)? {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        env::temp_dir().join(format!("bridge-desktop-test-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = TokioFileSystem::new();
        let dir = scratch_dir();
        let test_file = dir.join("nested").join("test-file.txt");

        let data = Bytes::from("Hello, World!");
        fs.write_file(&test_file, data.clone()).await.unwrap();

        let read_data = fs.read_file(&test_file).await.unwrap();
        assert_eq!(data, read_data);

        let metadata = fs.metadata(&test_file).await.unwrap();
        assert_eq!(metadata.size, 13);
        assert!(metadata.modified_at_ms.unwrap() > 0);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_read_range() {
        let fs = TokioFileSystem::new();
        let dir = scratch_dir();
        let file = dir.join("range.bin");
        fs.write_file(&file, Bytes::from_static(b"0123456789")).await.unwrap();

        let middle = fs.read_range(&file, 3, 4).await.unwrap();
        assert_eq!(middle.as_ref(), b"3456");

        let past_end = fs.read_range(&file, 8, 16).await.unwrap();
        assert_eq!(past_end.as_ref(), b"89");

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_directory_accessibility() {
        let fs = TokioFileSystem::new();
        let dir = scratch_dir();

        assert!(!fs.is_accessible_directory(&dir).await.unwrap());

        fs.create_dir_all(&dir).await.unwrap();
        assert!(fs.is_accessible_directory(&dir).await.unwrap());

        let file = dir.join("plain.txt");
        fs.write_file(&file, Bytes::from_static(b"x")).await.unwrap();
        assert!(!fs.is_accessible_directory(&file).await.unwrap());
        assert_eq!(fs.list_directory(&dir).await.unwrap(), vec![file.clone()]);

        fs.delete_file(&file).await.unwrap();
        assert!(!fs.exists(&file).await.unwrap());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_not_found() {
        let fs = TokioFileSystem::new();
        let err = fs.read_file(&scratch_dir().join("missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
