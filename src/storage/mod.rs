/// Storage backends for content-addressed blobs
///
/// Ingestion and read pipelines are backend-agnostic: both the local
/// filesystem and S3-compatible variants satisfy one capability trait.
pub mod local;
pub mod s3;

pub use local::LocalBackend;
pub use s3::{S3Backend, S3Options};

use crate::error::MediaResult;
use async_trait::async_trait;
use std::path::PathBuf;

/// Streamed blob contents
pub type ByteReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Byte-level persistence for canonical media blobs.
///
/// Objects are addressed by name (`hash.format`); both variants resolve
/// names through the same sharded layout. `save` must be an idempotent
/// overwrite for byte-identical content at the same address, since
/// concurrent ingests of the same content race on it by design.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist a blob, returning its storage location
    async fn save(&self, name: &str, data: Vec<u8>) -> MediaResult<String>;

    /// Read a whole blob into memory
    async fn read(&self, name: &str) -> MediaResult<Option<Vec<u8>>>;

    /// Open a blob as a byte stream without buffering it
    async fn open_stream(&self, name: &str) -> MediaResult<Option<ByteReader>>;

    /// Check whether a blob exists
    async fn exists(&self, name: &str) -> MediaResult<bool>;

    /// Delete a blob; deleting a missing blob is not an error
    async fn delete(&self, name: &str) -> MediaResult<()>;

    /// Local filesystem path, when the backend has one
    fn local_path(&self, name: &str) -> Option<PathBuf>;

    /// Public or presigned URL for direct access
    async fn url(&self, name: &str) -> MediaResult<String>;
}
