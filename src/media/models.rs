/// Media catalog data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Folder reserved for avatars and other service-generated assets
pub const SYSTEM_FOLDER_ID: i64 = 1;

/// A logical catalog entry for one piece of content in one folder.
///
/// Physical bytes are addressed purely by `hash` + `format`, so objects
/// in different folders may share the same blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaObject {
    pub id: i64,
    pub hash: String,
    pub format: String,
    pub size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub folder_id: i64,
    pub tags: Vec<String>,
    pub preview_hash: Option<String>,
    pub status: i64,
    pub created_at: DateTime<Utc>,
    pub created_by: i64,
}

impl MediaObject {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

pub const STATUS_ACTIVE: i64 = 1;
pub const STATUS_DELETED: i64 = 0;

/// A named collection with transactionally maintained aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFolder {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cover: Option<String>,
    /// Number of active objects in this folder
    pub count: i64,
    /// Sum of the canonical sizes of active objects
    pub size: i64,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new catalog row, produced by the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct NewMediaObject {
    pub hash: String,
    pub format: String,
    pub size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub folder_id: i64,
    pub tags: Vec<String>,
    pub preview_hash: Option<String>,
    pub created_by: i64,
}

/// A page of objects plus the folder's total
#[derive(Debug, Serialize)]
pub struct MediaPage {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub data: Vec<MediaObject>,
}

/// Content type for a canonical or requested format
pub fn content_type_for(format: &str) -> &'static str {
    match format {
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("webp"), "image/webp");
        assert_eq!(content_type_for("svg"), "image/svg+xml");
        assert_eq!(content_type_for("jpg"), "image/jpeg");
        assert_eq!(content_type_for("bin"), "application/octet-stream");
    }
}
