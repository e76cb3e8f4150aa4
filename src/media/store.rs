/// Media store: composes hashing, transcoding, the storage backend and
/// the catalog into ingest, read and delete pipelines.
use crate::{
    error::{MediaError, MediaResult},
    media::catalog::Catalog,
    media::hash::content_hash,
    media::models::{content_type_for, MediaObject, NewMediaObject, SYSTEM_FOLDER_ID},
    media::path::object_name,
    media::transcode::{transcode, Transcoded, TranscodeOptions},
    storage::{ByteReader, StorageBackend},
};
use std::sync::Arc;
use tracing::{debug, info};

const AVATAR_WIDTH: u32 = 120;
const AVATAR_HEIGHT: u32 = 120;

/// Lookup key for the read pipeline: numeric catalog id or content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKey {
    Id(i64),
    Hash(String),
}

impl MediaKey {
    /// Parse a path segment as an id or a 64-hex content hash
    pub fn parse(raw: &str) -> MediaResult<Self> {
        if let Ok(id) = raw.parse::<i64>() {
            return Ok(MediaKey::Id(id));
        }
        if raw.len() == 64 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(MediaKey::Hash(raw.to_ascii_lowercase()));
        }
        Err(MediaError::Validation(format!(
            "Not a media id or content hash: {}",
            raw
        )))
    }
}

/// Body of a fetched object: streamed from the backend, or buffered when
/// it was re-encoded on the fly
pub enum MediaBody {
    Buffered(Vec<u8>),
    Stream(ByteReader),
}

/// A fetched object ready for delivery
pub struct FetchedMedia {
    pub body: MediaBody,
    pub content_type: &'static str,
    /// Content hash, usable as a cache validator
    pub hash: String,
}

/// Main media store
#[derive(Clone)]
pub struct MediaStore {
    backend: Arc<dyn StorageBackend>,
    catalog: Catalog,
    max_upload_size: usize,
}

impl MediaStore {
    pub fn new(backend: Arc<dyn StorageBackend>, catalog: Catalog, max_upload_size: usize) -> Self {
        Self {
            backend,
            catalog,
            max_upload_size,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Ingest an upload into a folder, exactly once per (content, folder).
    ///
    /// The upload is canonicalized before hashing, so two uploads that
    /// normalize to the same bytes are one object. Re-ingesting existing
    /// content returns the existing row without touching storage or
    /// folder aggregates.
    pub async fn ingest(
        &self,
        data: Vec<u8>,
        folder_id: i64,
        tags: Vec<String>,
        created_by: i64,
    ) -> MediaResult<MediaObject> {
        self.ingest_with_options(data, folder_id, tags, created_by, &TranscodeOptions::default())
            .await
    }

    async fn ingest_with_options(
        &self,
        data: Vec<u8>,
        folder_id: i64,
        tags: Vec<String>,
        created_by: i64,
        options: &TranscodeOptions,
    ) -> MediaResult<MediaObject> {
        if data.len() > self.max_upload_size {
            return Err(MediaError::Validation(format!(
                "Upload of {} bytes exceeds limit of {}",
                data.len(),
                self.max_upload_size
            )));
        }

        let folder = self
            .catalog
            .get_folder(folder_id)
            .await?
            .ok_or(MediaError::FolderNotFound(folder_id))?;

        let canonical = transcode(&data, options)?;
        let hash = content_hash(&canonical.bytes);

        if let Some(existing) = self.catalog.find_object(&hash, folder.id).await? {
            if existing.is_active() {
                debug!("Ingest dedup hit: {} in folder {}", hash, folder.id);
                return Ok(existing);
            }
            // A soft-deleted twin: its bytes may have been reclaimed, so
            // persist again (idempotent overwrite) and restore the row.
            self.persist_with_preview(&canonical, &hash).await?;
            info!("Reactivating soft-deleted object {} in folder {}", hash, folder.id);
            return self.catalog.reactivate_object(&existing).await;
        }

        let preview_hash = self.persist_with_preview(&canonical, &hash).await?;

        let new = NewMediaObject {
            hash: hash.clone(),
            format: canonical.format.clone(),
            size: canonical.size(),
            width: canonical.width.map(i64::from),
            height: canonical.height.map(i64::from),
            folder_id: folder.id,
            tags,
            preview_hash: Some(preview_hash),
            created_by,
        };

        match self.catalog.insert_object(&new).await {
            Ok(object) => {
                info!(
                    "Ingested {} ({} bytes, {}) into folder {}",
                    object.hash, object.size, object.format, folder.id
                );
                Ok(object)
            }
            // Lost the race against a concurrent ingest of the same
            // content; the winner's row is the result.
            Err(MediaError::Conflict(_)) => self
                .catalog
                .find_object(&hash, folder.id)
                .await?
                .ok_or_else(|| {
                    MediaError::Internal("Winning ingest row disappeared".to_string())
                }),
            Err(e) => Err(e),
        }
    }

    /// Persist canonical bytes and their preview rendition, returning the
    /// preview's hash. Both writes are idempotent content-addressed
    /// overwrites, safe under concurrent ingest of identical content.
    async fn persist_with_preview(
        &self,
        canonical: &Transcoded,
        hash: &str,
    ) -> MediaResult<String> {
        self.backend
            .save(&object_name(hash, &canonical.format), canonical.bytes.clone())
            .await?;

        let preview = transcode(&canonical.bytes, &TranscodeOptions::preview())?;
        let preview_hash = content_hash(&preview.bytes);
        self.backend
            .save(&object_name(&preview_hash, &preview.format), preview.bytes)
            .await?;

        Ok(preview_hash)
    }

    /// Ingest an avatar: resized to a fixed square in a single encoding
    /// pass, stored in the system folder. Returns the serving path.
    pub async fn ingest_avatar(&self, data: Vec<u8>, user_id: i64) -> MediaResult<String> {
        let object = self
            .ingest_with_options(
                data,
                SYSTEM_FOLDER_ID,
                Vec::new(),
                user_id,
                &TranscodeOptions::sized(AVATAR_WIDTH, AVATAR_HEIGHT),
            )
            .await?;

        Ok(format!("/api/media/{}", object.hash))
    }

    /// Fetch an object's canonical bytes, optionally re-encoded into a
    /// requested delivery format. Stored bytes are never mutated; large
    /// reads stream straight from the backend.
    pub async fn fetch(
        &self,
        key: MediaKey,
        requested_format: Option<&str>,
    ) -> MediaResult<FetchedMedia> {
        let object = match &key {
            MediaKey::Id(id) => self.catalog.get_object(*id).await?,
            MediaKey::Hash(hash) => self.catalog.get_object_by_hash(hash).await?,
        }
        .ok_or_else(|| MediaError::NotFound(format!("Media object not found: {:?}", key)))?;

        let name = object_name(&object.hash, &object.format);

        if let Some(target) = requested_format {
            if target != object.format {
                if object.format != "webp" {
                    return Err(MediaError::Validation(format!(
                        "No conversion from {} to {}",
                        object.format, target
                    )));
                }
                let stored = self.backend.read(&name).await?.ok_or_else(|| {
                    MediaError::NotFound(format!("Blob missing from storage: {}", name))
                })?;
                let converted = crate::media::transcode::convert_from_webp(&stored, target)?;
                return Ok(FetchedMedia {
                    body: MediaBody::Buffered(converted),
                    content_type: content_type_for(target),
                    hash: object.hash,
                });
            }
        }

        let reader = self.backend.open_stream(&name).await?.ok_or_else(|| {
            MediaError::NotFound(format!("Blob missing from storage: {}", name))
        })?;

        Ok(FetchedMedia {
            body: MediaBody::Stream(reader),
            content_type: content_type_for(&object.format),
            hash: object.hash,
        })
    }

    /// Fetch the preview rendition of an object by its canonical hash.
    pub async fn fetch_preview(&self, hash: &str) -> MediaResult<FetchedMedia> {
        let object = self
            .catalog
            .get_object_by_hash(hash)
            .await?
            .ok_or_else(|| MediaError::NotFound(format!("Media object not found: {}", hash)))?;

        let preview_hash = object
            .preview_hash
            .clone()
            .ok_or_else(|| MediaError::NotFound(format!("No preview for: {}", hash)))?;

        let name = object_name(&preview_hash, &object.format);
        let reader = self.backend.open_stream(&name).await?.ok_or_else(|| {
            MediaError::NotFound(format!("Preview missing from storage: {}", name))
        })?;

        Ok(FetchedMedia {
            body: MediaBody::Stream(reader),
            content_type: content_type_for(&object.format),
            hash: preview_hash,
        })
    }

    /// Soft-delete an object. Physical bytes are unlinked only once no
    /// active row in any folder still references them; the recount always
    /// runs before the unlink.
    pub async fn delete(&self, id: i64) -> MediaResult<()> {
        let object = self.catalog.soft_delete_object(id).await?;

        if self.catalog.count_references(&object.hash).await? == 0 {
            self.backend
                .delete(&object_name(&object.hash, &object.format))
                .await?;
            debug!("Unlinked physical blob {}", object.hash);
        }

        if let Some(preview_hash) = &object.preview_hash {
            if self.catalog.count_references(preview_hash).await? == 0 {
                self.backend
                    .delete(&object_name(preview_hash, &object.format))
                    .await?;
                debug!("Unlinked preview blob {}", preview_hash);
            }
        }

        info!("Deleted media object {}", id);
        Ok(())
    }

    /// Replace an object's tag set
    pub async fn update_tags(&self, id: i64, tags: Vec<String>, updated_by: i64) -> MediaResult<()> {
        self.catalog.update_tags(id, &tags, updated_by).await
    }

    /// Public or presigned URL for an object's canonical blob
    pub async fn url(&self, object: &MediaObject) -> MediaResult<String> {
        self.backend
            .url(&object_name(&object.hash, &object.format))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::media::transcode::{detect, DetectedFormat};
    use crate::storage::LocalBackend;
    use std::io::Cursor;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    async fn read_body(body: MediaBody) -> Vec<u8> {
        match body {
            MediaBody::Buffered(bytes) => bytes,
            MediaBody::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await.unwrap();
                buf
            }
        }
    }

    async fn test_store(dir: &tempfile::TempDir) -> MediaStore {
        let backend = Arc::new(LocalBackend::new(
            dir.path().to_path_buf(),
            "/static/${name}".to_string(),
        ));
        let catalog = Catalog::new(db::memory_pool().await);
        MediaStore::new(backend, catalog, 1024 * 1024)
    }

    #[tokio::test]
    async fn test_ingest_png_stores_webp_with_dimensions() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let folder = store.catalog().create_folder("photos", None, 1).await.unwrap();

        let object = store
            .ingest(png_fixture(800, 600), folder.id, vec!["scenery".to_string()], 1)
            .await
            .unwrap();

        assert_eq!(object.format, "webp");
        assert_eq!(object.width, Some(800));
        assert_eq!(object.height, Some(600));
        assert_eq!(object.hash.len(), 64);
        assert!(object.preview_hash.is_some());

        let folder = store.catalog().get_folder(folder.id).await.unwrap().unwrap();
        assert_eq!(folder.count, 1);
        assert_eq!(folder.size, object.size);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let folder = store.catalog().create_folder("photos", None, 1).await.unwrap();

        let data = png_fixture(100, 100);
        let first = store.ingest(data.clone(), folder.id, vec![], 1).await.unwrap();
        let second = store.ingest(data, folder.id, vec![], 1).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.hash, second.hash);

        // The folder aggregate incremented exactly once
        let folder = store.catalog().get_folder(folder.id).await.unwrap().unwrap();
        assert_eq!(folder.count, 1);
        assert_eq!(folder.size, first.size);
    }

    #[tokio::test]
    async fn test_same_content_two_folders_shares_bytes() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let one = store.catalog().create_folder("one", None, 1).await.unwrap();
        let two = store.catalog().create_folder("two", None, 1).await.unwrap();

        let data = png_fixture(50, 50);
        let a = store.ingest(data.clone(), one.id, vec![], 1).await.unwrap();
        let b = store.ingest(data, two.id, vec![], 1).await.unwrap();

        assert_eq!(a.hash, b.hash);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_round_trip_returns_canonical_bytes() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let folder = store.catalog().create_folder("photos", None, 1).await.unwrap();

        let object = store
            .ingest(png_fixture(64, 64), folder.id, vec![], 1)
            .await
            .unwrap();

        let fetched = store.fetch(MediaKey::Id(object.id), None).await.unwrap();
        assert_eq!(fetched.content_type, "image/webp");

        let bytes = read_body(fetched.body).await;
        assert_eq!(content_hash(&bytes), object.hash);
    }

    #[tokio::test]
    async fn test_fetch_by_hash() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let folder = store.catalog().create_folder("photos", None, 1).await.unwrap();

        let object = store
            .ingest(png_fixture(30, 30), folder.id, vec![], 1)
            .await
            .unwrap();

        let fetched = store
            .fetch(MediaKey::Hash(object.hash.clone()), None)
            .await
            .unwrap();
        assert_eq!(fetched.hash, object.hash);
    }

    #[tokio::test]
    async fn test_fetch_converted_to_jpg() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let folder = store.catalog().create_folder("photos", None, 1).await.unwrap();

        let object = store
            .ingest(png_fixture(40, 20), folder.id, vec![], 1)
            .await
            .unwrap();

        let fetched = store
            .fetch(MediaKey::Id(object.id), Some("jpg"))
            .await
            .unwrap();
        assert_eq!(fetched.content_type, "image/jpeg");

        let bytes = read_body(fetched.body).await;
        assert_eq!(detect(&bytes), Some(DetectedFormat::Jpeg));

        // Same pixel dimensions, different bytes than the stored webp
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));
        assert_ne!(content_hash(&bytes), object.hash);
    }

    #[tokio::test]
    async fn test_fetch_preview() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let folder = store.catalog().create_folder("photos", None, 1).await.unwrap();

        let object = store
            .ingest(png_fixture(128, 128), folder.id, vec![], 1)
            .await
            .unwrap();

        let preview = store.fetch_preview(&object.hash).await.unwrap();
        assert_eq!(preview.content_type, "image/webp");
        assert_eq!(Some(preview.hash), object.preview_hash);
    }

    #[tokio::test]
    async fn test_unsupported_upload_has_no_side_effects() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let folder = store.catalog().create_folder("photos", None, 1).await.unwrap();

        let result = store
            .ingest(b"plain text, not an image".to_vec(), folder.id, vec![], 1)
            .await;
        assert!(matches!(result, Err(MediaError::UnsupportedFormat(_))));

        let folder = store.catalog().get_folder(folder.id).await.unwrap().unwrap();
        assert_eq!(folder.count, 0);
        assert_eq!(folder.size, 0);

        let page = store.catalog().list_by_folder(folder.id, 1, 10).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_missing_folder_rejected_before_any_write() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;

        let result = store.ingest(png_fixture(10, 10), 999, vec![], 1).await;
        assert!(matches!(result, Err(MediaError::FolderNotFound(999))));
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(LocalBackend::new(
            dir.path().to_path_buf(),
            "/static/${name}".to_string(),
        ));
        let store = MediaStore::new(backend, Catalog::new(db::memory_pool().await), 64);

        let result = store.ingest(png_fixture(100, 100), 1, vec![], 1).await;
        assert!(matches!(result, Err(MediaError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_unlinks_only_unreferenced_bytes() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let one = store.catalog().create_folder("one", None, 1).await.unwrap();
        let two = store.catalog().create_folder("two", None, 1).await.unwrap();

        let data = png_fixture(77, 77);
        let a = store.ingest(data.clone(), one.id, vec![], 1).await.unwrap();
        let b = store.ingest(data, two.id, vec![], 1).await.unwrap();
        let name = object_name(&a.hash, &a.format);

        // Two rows share the blob: deleting one keeps the bytes
        store.delete(a.id).await.unwrap();
        assert!(store.backend.exists(&name).await.unwrap());

        // Deleting the last reference unlinks canonical and preview bytes
        store.delete(b.id).await.unwrap();
        assert!(!store.backend.exists(&name).await.unwrap());
        let preview_name = object_name(b.preview_hash.as_ref().unwrap(), &b.format);
        assert!(!store.backend.exists(&preview_name).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_then_reingest_reactivates() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let folder = store.catalog().create_folder("photos", None, 1).await.unwrap();

        let data = png_fixture(60, 60);
        let object = store.ingest(data.clone(), folder.id, vec![], 1).await.unwrap();
        store.delete(object.id).await.unwrap();

        let restored = store.ingest(data, folder.id, vec![], 1).await.unwrap();
        assert_eq!(restored.id, object.id);
        assert!(restored.is_active());

        // Bytes were re-persisted and the aggregates restored
        let name = object_name(&restored.hash, &restored.format);
        assert!(store.backend.exists(&name).await.unwrap());
        let folder = store.catalog().get_folder(folder.id).await.unwrap().unwrap();
        assert_eq!(folder.count, 1);
        assert_eq!(folder.size, restored.size);
    }

    #[tokio::test]
    async fn test_aggregate_invariant_over_mixed_operations() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        let folder = store.catalog().create_folder("photos", None, 1).await.unwrap();

        let a = store
            .ingest(png_fixture(10, 10), folder.id, vec![], 1)
            .await
            .unwrap();
        let b = store
            .ingest(png_fixture(20, 20), folder.id, vec![], 1)
            .await
            .unwrap();
        store
            .ingest(png_fixture(30, 30), folder.id, vec![], 1)
            .await
            .unwrap();
        store.delete(a.id).await.unwrap();

        let folder = store.catalog().get_folder(folder.id).await.unwrap().unwrap();
        let page = store.catalog().list_by_folder(folder.id, 1, 100).await.unwrap();
        assert_eq!(folder.count, page.total);
        assert_eq!(folder.size, page.data.iter().map(|o| o.size).sum::<i64>());
        assert!(page.data.iter().any(|o| o.id == b.id));
    }

    #[tokio::test]
    async fn test_avatar_ingest() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;

        let url = store.ingest_avatar(png_fixture(512, 512), 3).await.unwrap();
        assert!(url.starts_with("/api/media/"));

        // The stored bytes are one encoding pass away from the upload
        let expected = transcode(
            &png_fixture(512, 512),
            &TranscodeOptions::sized(120, 120),
        )
        .unwrap();
        let hash = url.rsplit('/').next().unwrap().to_string();
        assert_eq!(hash, content_hash(&expected.bytes));
        let object = store
            .catalog()
            .get_object_by_hash(&hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(object.folder_id, SYSTEM_FOLDER_ID);
        assert_eq!(object.width, Some(120));
        assert_eq!(object.height, Some(120));

        // Avatar ingestion is idempotent too
        let again = store.ingest_avatar(png_fixture(512, 512), 3).await.unwrap();
        assert_eq!(url, again);
        let folder = store
            .catalog()
            .get_folder(SYSTEM_FOLDER_ID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(folder.count, 1);
    }

    #[test]
    fn test_media_key_parsing() {
        assert_eq!(MediaKey::parse("42").unwrap(), MediaKey::Id(42));

        let hash = "a".repeat(64);
        assert_eq!(MediaKey::parse(&hash).unwrap(), MediaKey::Hash(hash.clone()));

        assert!(MediaKey::parse("not-a-key").is_err());
        assert!(MediaKey::parse(&"g".repeat(64)).is_err());
    }
}
