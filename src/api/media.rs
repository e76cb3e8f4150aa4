/// Media ingestion and delivery endpoints
use crate::{
    context::AppContext,
    error::{MediaError, MediaResult},
    media::models::MediaObject,
    media::store::{MediaBody, MediaKey},
};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

/// Build media routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/media", post(upload_media))
        .route("/api/media/avatar", post(upload_avatar))
        .route("/api/media/preview/:key", get(get_preview))
        .route("/api/media/:key", get(get_media).delete(delete_media))
        .route("/api/media/:key/tags", patch(update_tags))
}

/// Mutating endpoints address objects by catalog id only
fn parse_object_id(raw: &str) -> MediaResult<i64> {
    raw.parse()
        .map_err(|_| MediaError::Validation(format!("Not a media id: {}", raw)))
}

/// Caller identity, recorded on writes. Authentication itself is handled
/// upstream of this service.
pub(crate) fn actor_id(headers: &HeaderMap) -> i64 {
    headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    folder_id: i64,
    /// Comma-separated tag list
    tags: Option<String>,
}

/// Ingest an upload into a folder
///
/// Accepts raw image bytes in the request body. Re-uploading content a
/// folder already holds returns the existing record.
async fn upload_media(
    State(ctx): State<AppContext>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> MediaResult<impl IntoResponse> {
    let tags = params
        .tags
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let object = ctx
        .media
        .ingest(body.to_vec(), params.folder_id, tags, actor_id(&headers))
        .await?;

    Ok((StatusCode::OK, Json(object)))
}

/// Ingest an avatar, resized to the fixed avatar dimensions
async fn upload_avatar(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> MediaResult<impl IntoResponse> {
    let url = ctx
        .media
        .ingest_avatar(body.to_vec(), actor_id(&headers))
        .await?;

    Ok((StatusCode::OK, Json(serde_json::json!({ "url": url }))))
}

#[derive(Debug, Deserialize)]
struct FetchParams {
    /// Delivery format override (`jpg`, `jpeg`, `png`)
    format: Option<String>,
}

/// Serve an object's canonical bytes by id or content hash
///
/// Content-addressed bytes never change, so responses carry an immutable
/// cache policy with the hash as ETag.
async fn get_media(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    Query(params): Query<FetchParams>,
    headers: HeaderMap,
) -> MediaResult<Response> {
    let key = MediaKey::parse(&key)?;
    let fetched = ctx.media.fetch(key, params.format.as_deref()).await?;

    // Converted responses are derived bytes; only canonical ones get the
    // hash validator.
    let etag = match params.format {
        None => Some(format!("\"{}\"", fetched.hash)),
        Some(_) => None,
    };

    if let (Some(etag), Some(if_none_match)) = (&etag, headers.get(header::IF_NONE_MATCH)) {
        if if_none_match.to_str().ok() == Some(etag.as_str()) {
            return Ok(Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header(header::ETAG, etag)
                .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
                .body(Body::empty())
                .map_err(|e| MediaError::Internal(format!("Response build failed: {}", e)))?);
        }
    }

    media_response(fetched.body, fetched.content_type, etag)
}

/// Serve the preview rendition of an object by its canonical hash
async fn get_preview(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
) -> MediaResult<Response> {
    let fetched = ctx.media.fetch_preview(&hash).await?;
    let etag = format!("\"{}\"", fetched.hash);

    media_response(fetched.body, fetched.content_type, Some(etag))
}

fn media_response(
    body: MediaBody,
    content_type: &'static str,
    etag: Option<String>,
) -> MediaResult<Response> {
    let body = match body {
        MediaBody::Buffered(bytes) => Body::from(bytes),
        MediaBody::Stream(reader) => Body::from_stream(ReaderStream::new(reader)),
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable");

    if let Some(etag) = etag {
        builder = builder.header(header::ETAG, etag);
    }

    builder
        .body(body)
        .map_err(|e| MediaError::Internal(format!("Response build failed: {}", e)))
}

#[derive(Debug, Deserialize)]
struct UpdateTagsRequest {
    tags: Vec<String>,
}

/// Replace an object's tag set
async fn update_tags(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateTagsRequest>,
) -> MediaResult<impl IntoResponse> {
    let id = parse_object_id(&key)?;
    ctx.media
        .update_tags(id, request.tags, actor_id(&headers))
        .await?;

    let object: Option<MediaObject> = ctx.media.catalog().get_object(id).await?;
    Ok((StatusCode::OK, Json(object)))
}

/// Soft-delete an object; physical bytes go away with the last reference
async fn delete_media(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> MediaResult<impl IntoResponse> {
    ctx.media.delete(parse_object_id(&key)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
