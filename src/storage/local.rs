/// Local filesystem storage backend
use crate::{
    error::{MediaError, MediaResult},
    media::path::sharded_rel_path,
    storage::{ByteReader, StorageBackend},
};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Filesystem backend
///
/// Stores blobs under a base directory with hash-prefix sharding so no
/// single directory accumulates too many files.
#[derive(Clone)]
pub struct LocalBackend {
    base_dir: PathBuf,
    url_template: String,
}

impl LocalBackend {
    /// Create a new filesystem backend
    pub fn new(base_dir: PathBuf, url_template: String) -> Self {
        Self {
            base_dir,
            url_template,
        }
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(sharded_rel_path(name))
    }

    /// Ensure the shard directory for a blob exists
    async fn ensure_blob_dir(&self, name: &str) -> MediaResult<PathBuf> {
        let blob_path = self.blob_path(name);
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                MediaError::Backend(format!("Failed to create blob directory: {}", e))
            })?;
        }
        Ok(blob_path)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn save(&self, name: &str, data: Vec<u8>) -> MediaResult<String> {
        let blob_path = self.ensure_blob_dir(name).await?;

        fs::write(&blob_path, data)
            .await
            .map_err(|e| MediaError::Backend(format!("Failed to write blob {}: {}", name, e)))?;

        Ok(blob_path.to_string_lossy().into_owned())
    }

    async fn read(&self, name: &str) -> MediaResult<Option<Vec<u8>>> {
        match fs::read(self.blob_path(name)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MediaError::Backend(format!(
                "Failed to read blob {}: {}",
                name, e
            ))),
        }
    }

    async fn open_stream(&self, name: &str) -> MediaResult<Option<ByteReader>> {
        match fs::File::open(self.blob_path(name)).await {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MediaError::Backend(format!(
                "Failed to open blob {}: {}",
                name, e
            ))),
        }
    }

    async fn exists(&self, name: &str) -> MediaResult<bool> {
        Ok(self.blob_path(name).exists())
    }

    async fn delete(&self, name: &str) -> MediaResult<()> {
        match fs::remove_file(self.blob_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MediaError::Backend(format!(
                "Failed to delete blob {}: {}",
                name, e
            ))),
        }
    }

    fn local_path(&self, name: &str) -> Option<PathBuf> {
        Some(self.blob_path(name))
    }

    async fn url(&self, name: &str) -> MediaResult<String> {
        Ok(self
            .url_template
            .replace("${name}", &sharded_rel_path(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn backend(dir: &tempfile::TempDir) -> LocalBackend {
        LocalBackend::new(dir.path().to_path_buf(), "/static/${name}".to_string())
    }

    #[tokio::test]
    async fn test_save_and_read_blob() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let name = "3f9a7c0de1.webp";
        let data = b"canonical webp bytes".to_vec();

        backend.save(name, data.clone()).await.unwrap();

        let retrieved = backend.read(name).await.unwrap();
        assert_eq!(retrieved, Some(data));
    }

    #[tokio::test]
    async fn test_read_nonexistent_blob() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        assert_eq!(backend.read("missing.webp").await.unwrap(), None);
        assert!(backend.open_stream("missing.webp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_blob_is_idempotent() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let name = "deadbeef01.gif";
        backend.save(name, b"to be deleted".to_vec()).await.unwrap();
        assert!(backend.exists(name).await.unwrap());

        backend.delete(name).await.unwrap();
        assert!(!backend.exists(name).await.unwrap());

        // Second delete of the same name is a no-op
        backend.delete(name).await.unwrap();
    }

    #[tokio::test]
    async fn test_idempotent_overwrite() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let name = "cafebabe01.webp";
        backend.save(name, b"same bytes".to_vec()).await.unwrap();
        backend.save(name, b"same bytes".to_vec()).await.unwrap();

        assert_eq!(
            backend.read(name).await.unwrap(),
            Some(b"same bytes".to_vec())
        );
    }

    #[tokio::test]
    async fn test_directory_sharding() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let path = backend.local_path("3f9a7c0de1.webp").unwrap();
        assert!(path.to_string_lossy().contains("3f/9a/"));
    }

    #[tokio::test]
    async fn test_stream_matches_saved_bytes() {
        use tokio::io::AsyncReadExt;

        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let name = "0011223344.svg";
        backend.save(name, b"<svg/>".to_vec()).await.unwrap();

        let mut reader = backend.open_stream(name).await.unwrap().unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"<svg/>");
    }

    #[tokio::test]
    async fn test_url_template() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        assert_eq!(
            backend.url("3f9a7c0de1.webp").await.unwrap(),
            "/static/3f/9a/3f9a7c0de1.webp"
        );
    }
}
