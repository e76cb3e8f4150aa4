/// Relational catalog for media objects and folder aggregates
///
/// The catalog's transaction boundary is the only synchronization
/// primitive the engine relies on: a media row and its folder-aggregate
/// update are committed together or not at all, and aggregates are
/// updated with atomic in-database increments, never read-modify-write
/// in application code.
use crate::{
    error::{MediaError, MediaResult},
    media::models::{
        MediaFolder, MediaObject, MediaPage, NewMediaObject, STATUS_ACTIVE, STATUS_DELETED,
    },
    media::path::object_name,
};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

const OBJECT_COLUMNS: &str = "id, hash, format, size, width, height, folder_id, tags, \
     preview_hash, status, created_at, created_by";

/// Catalog handle over the shared connection pool
#[derive(Clone)]
pub struct Catalog {
    db: SqlitePool,
}

impl Catalog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Look up a folder by id
    pub async fn get_folder(&self, id: i64) -> MediaResult<Option<MediaFolder>> {
        let row = sqlx::query(
            "SELECT id, name, description, cover, count, size, is_system, created_at \
             FROM media_folder WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(MediaError::Database)?;

        row.map(folder_from_row).transpose()
    }

    /// Create a folder; duplicate names are refused
    pub async fn create_folder(
        &self,
        name: &str,
        description: Option<&str>,
        created_by: i64,
    ) -> MediaResult<MediaFolder> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO media_folder (name, description, count, size, is_system, created_at, created_by) \
             VALUES (?1, ?2, 0, 0, 0, ?3, ?4)",
        )
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(created_by)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MediaError::Conflict(format!("Folder name already exists: {}", name))
            } else {
                MediaError::Database(e)
            }
        })?;

        Ok(MediaFolder {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(String::from),
            cover: None,
            count: 0,
            size: 0,
            is_system: false,
            created_at: now,
        })
    }

    /// List all folders
    pub async fn list_folders(&self) -> MediaResult<Vec<MediaFolder>> {
        let rows = sqlx::query(
            "SELECT id, name, description, cover, count, size, is_system, created_at \
             FROM media_folder ORDER BY id ASC",
        )
        .fetch_all(&self.db)
        .await
        .map_err(MediaError::Database)?;

        rows.into_iter().map(folder_from_row).collect()
    }

    /// Delete a folder; refused while any object row (any status) remains
    pub async fn delete_folder(&self, id: i64) -> MediaResult<()> {
        let folder = self
            .get_folder(id)
            .await?
            .ok_or(MediaError::FolderNotFound(id))?;

        if folder.is_system {
            return Err(MediaError::Validation(
                "System folder cannot be deleted".to_string(),
            ));
        }

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM media_object WHERE folder_id = ?1")
                .bind(id)
                .fetch_one(&self.db)
                .await
                .map_err(MediaError::Database)?;

        if remaining > 0 {
            return Err(MediaError::Validation(
                "Folder still contains media".to_string(),
            ));
        }

        sqlx::query("DELETE FROM media_folder WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(MediaError::Database)?;

        Ok(())
    }

    /// Find an object by (hash, folder) regardless of status.
    ///
    /// The dedup lookup must see soft-deleted twins too, so re-ingest can
    /// reactivate them instead of colliding with the unique constraint.
    pub async fn find_object(&self, hash: &str, folder_id: i64) -> MediaResult<Option<MediaObject>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM media_object WHERE hash = ?1 AND folder_id = ?2",
            OBJECT_COLUMNS
        ))
        .bind(hash)
        .bind(folder_id)
        .fetch_optional(&self.db)
        .await
        .map_err(MediaError::Database)?;

        row.map(object_from_row).transpose()
    }

    /// Get an active object by id
    pub async fn get_object(&self, id: i64) -> MediaResult<Option<MediaObject>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM media_object WHERE id = ?1 AND status = ?2",
            OBJECT_COLUMNS
        ))
        .bind(id)
        .bind(STATUS_ACTIVE)
        .fetch_optional(&self.db)
        .await
        .map_err(MediaError::Database)?;

        row.map(object_from_row).transpose()
    }

    /// Get an active object by content hash
    pub async fn get_object_by_hash(&self, hash: &str) -> MediaResult<Option<MediaObject>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM media_object WHERE hash = ?1 AND status = ?2 LIMIT 1",
            OBJECT_COLUMNS
        ))
        .bind(hash)
        .bind(STATUS_ACTIVE)
        .fetch_optional(&self.db)
        .await
        .map_err(MediaError::Database)?;

        row.map(object_from_row).transpose()
    }

    /// Insert a new object and bump its folder's aggregates in one
    /// transaction.
    ///
    /// A concurrent ingest of the same content loses the UNIQUE(hash,
    /// folder_id) race here and surfaces as `Conflict`; the caller
    /// resolves it as a no-op lookup of the winner's row, so the folder
    /// aggregate is incremented exactly once.
    pub async fn insert_object(&self, new: &NewMediaObject) -> MediaResult<MediaObject> {
        let now = Utc::now();
        let tags_json = serde_json::to_string(&new.tags)
            .map_err(|e| MediaError::Internal(format!("Tag serialization failed: {}", e)))?;

        let mut tx = self.db.begin().await.map_err(MediaError::Database)?;

        let result = sqlx::query(
            "INSERT INTO media_object \
             (hash, format, size, width, height, folder_id, tags, preview_hash, status, created_at, created_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&new.hash)
        .bind(&new.format)
        .bind(new.size)
        .bind(new.width)
        .bind(new.height)
        .bind(new.folder_id)
        .bind(&tags_json)
        .bind(&new.preview_hash)
        .bind(STATUS_ACTIVE)
        .bind(now)
        .bind(new.created_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                MediaError::Conflict(format!(
                    "Object already exists: ({}, {})",
                    new.hash, new.folder_id
                ))
            } else {
                MediaError::Database(e)
            }
        })?;

        let id = result.last_insert_rowid();

        sqlx::query(
            "UPDATE media_folder SET count = count + 1, size = size + ?1, cover = ?2 WHERE id = ?3",
        )
        .bind(new.size)
        .bind(object_name(&new.hash, &new.format))
        .bind(new.folder_id)
        .execute(&mut *tx)
        .await
        .map_err(MediaError::Database)?;

        tx.commit().await.map_err(MediaError::Database)?;

        Ok(MediaObject {
            id,
            hash: new.hash.clone(),
            format: new.format.clone(),
            size: new.size,
            width: new.width,
            height: new.height,
            folder_id: new.folder_id,
            tags: new.tags.clone(),
            preview_hash: new.preview_hash.clone(),
            status: STATUS_ACTIVE,
            created_at: now,
            created_by: new.created_by,
        })
    }

    /// Reactivate a soft-deleted object and restore its folder aggregates
    /// in one transaction.
    pub async fn reactivate_object(&self, object: &MediaObject) -> MediaResult<MediaObject> {
        let mut tx = self.db.begin().await.map_err(MediaError::Database)?;

        sqlx::query("UPDATE media_object SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(STATUS_ACTIVE)
            .bind(Utc::now())
            .bind(object.id)
            .execute(&mut *tx)
            .await
            .map_err(MediaError::Database)?;

        sqlx::query(
            "UPDATE media_folder SET count = count + 1, size = size + ?1, cover = ?2 WHERE id = ?3",
        )
        .bind(object.size)
        .bind(object_name(&object.hash, &object.format))
        .bind(object.folder_id)
        .execute(&mut *tx)
        .await
        .map_err(MediaError::Database)?;

        tx.commit().await.map_err(MediaError::Database)?;

        let mut reactivated = object.clone();
        reactivated.status = STATUS_ACTIVE;
        Ok(reactivated)
    }

    /// Soft-delete an object and decrement its folder aggregates in one
    /// transaction. Returns the deleted row for physical cleanup.
    pub async fn soft_delete_object(&self, id: i64) -> MediaResult<MediaObject> {
        let mut tx = self.db.begin().await.map_err(MediaError::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM media_object WHERE id = ?1 AND status = ?2",
            OBJECT_COLUMNS
        ))
        .bind(id)
        .bind(STATUS_ACTIVE)
        .fetch_optional(&mut *tx)
        .await
        .map_err(MediaError::Database)?;

        let object = row
            .map(object_from_row)
            .transpose()?
            .ok_or_else(|| MediaError::NotFound(format!("Media object not found: {}", id)))?;

        sqlx::query("UPDATE media_object SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(STATUS_DELETED)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(MediaError::Database)?;

        sqlx::query("UPDATE media_folder SET count = count - 1, size = size - ?1 WHERE id = ?2")
            .bind(object.size)
            .bind(object.folder_id)
            .execute(&mut *tx)
            .await
            .map_err(MediaError::Database)?;

        // A cover pointing at the deleted object falls back to the newest
        // remaining active object, or NULL. The subselect mirrors
        // object_name's `hash.format` layout.
        sqlx::query(
            "UPDATE media_folder SET cover = \
             (SELECT hash || '.' || format FROM media_object \
              WHERE folder_id = ?1 AND status = ?2 \
              ORDER BY created_at DESC, id DESC LIMIT 1) \
             WHERE id = ?1 AND cover = ?3",
        )
        .bind(object.folder_id)
        .bind(STATUS_ACTIVE)
        .bind(object_name(&object.hash, &object.format))
        .execute(&mut *tx)
        .await
        .map_err(MediaError::Database)?;

        tx.commit().await.map_err(MediaError::Database)?;

        Ok(object)
    }

    /// Count active rows still referencing a physical blob, either as
    /// their canonical hash or as their preview rendition.
    pub async fn count_references(&self, hash: &str) -> MediaResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM media_object \
             WHERE status = ?1 AND (hash = ?2 OR preview_hash = ?2)",
        )
        .bind(STATUS_ACTIVE)
        .bind(hash)
        .fetch_one(&self.db)
        .await
        .map_err(MediaError::Database)?;

        Ok(count)
    }

    /// Replace an object's tag set
    pub async fn update_tags(
        &self,
        id: i64,
        tags: &[String],
        updated_by: i64,
    ) -> MediaResult<()> {
        let tags_json = serde_json::to_string(tags)
            .map_err(|e| MediaError::Internal(format!("Tag serialization failed: {}", e)))?;

        let result = sqlx::query(
            "UPDATE media_object SET tags = ?1, updated_at = ?2, updated_by = ?3 \
             WHERE id = ?4 AND status = ?5",
        )
        .bind(&tags_json)
        .bind(Utc::now())
        .bind(updated_by)
        .bind(id)
        .bind(STATUS_ACTIVE)
        .execute(&self.db)
        .await
        .map_err(MediaError::Database)?;

        if result.rows_affected() == 0 {
            return Err(MediaError::NotFound(format!(
                "Media object not found: {}",
                id
            )));
        }

        Ok(())
    }

    /// Page through the active objects of a folder
    pub async fn list_by_folder(
        &self,
        folder_id: i64,
        page: i64,
        per_page: i64,
    ) -> MediaResult<MediaPage> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM media_object WHERE folder_id = ?1 AND status = ?2 \
             ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            OBJECT_COLUMNS
        ))
        .bind(folder_id)
        .bind(STATUS_ACTIVE)
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(&self.db)
        .await
        .map_err(MediaError::Database)?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM media_object WHERE folder_id = ?1 AND status = ?2",
        )
        .bind(folder_id)
        .bind(STATUS_ACTIVE)
        .fetch_one(&self.db)
        .await
        .map_err(MediaError::Database)?;

        let data = rows
            .into_iter()
            .map(object_from_row)
            .collect::<MediaResult<Vec<_>>>()?;

        Ok(MediaPage {
            page,
            per_page,
            total,
            data,
        })
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

fn folder_from_row(row: sqlx::sqlite::SqliteRow) -> MediaResult<MediaFolder> {
    Ok(MediaFolder {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        cover: row.try_get("cover")?,
        count: row.try_get("count")?,
        size: row.try_get("size")?,
        is_system: row.try_get::<i64, _>("is_system")? != 0,
        created_at: row.try_get("created_at")?,
    })
}

fn object_from_row(row: sqlx::sqlite::SqliteRow) -> MediaResult<MediaObject> {
    let tags_json: String = row.try_get("tags")?;
    let tags = serde_json::from_str(&tags_json)
        .map_err(|e| MediaError::Internal(format!("Corrupt tag column: {}", e)))?;

    Ok(MediaObject {
        id: row.try_get("id")?,
        hash: row.try_get("hash")?,
        format: row.try_get("format")?,
        size: row.try_get("size")?,
        width: row.try_get("width")?,
        height: row.try_get("height")?,
        folder_id: row.try_get("folder_id")?,
        tags,
        preview_hash: row.try_get("preview_hash")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        created_by: row.try_get("created_by")?,
    })
}
