/// Folder management and listing endpoints
use crate::{
    api::media::actor_id,
    context::AppContext,
    error::MediaResult,
    media::models::MediaFolder,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

const DEFAULT_PER_PAGE: i64 = 20;
const MAX_PER_PAGE: i64 = 100;

/// Build folder routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/folders", get(list_folders))
        .route("/api/folders", post(create_folder))
        .route("/api/folders/:id", delete(delete_folder))
        .route("/api/folders/:id/media", get(list_folder_media))
}

/// List all folders with their aggregates
async fn list_folders(State(ctx): State<AppContext>) -> MediaResult<Json<Vec<MediaFolder>>> {
    Ok(Json(ctx.media.catalog().list_folders().await?))
}

#[derive(Debug, Deserialize)]
struct CreateFolderRequest {
    name: String,
    description: Option<String>,
}

/// Create a folder; names are unique
async fn create_folder(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(request): Json<CreateFolderRequest>,
) -> MediaResult<impl IntoResponse> {
    let folder = ctx
        .media
        .catalog()
        .create_folder(
            &request.name,
            request.description.as_deref(),
            actor_id(&headers),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(folder)))
}

/// Delete an empty, non-system folder
async fn delete_folder(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> MediaResult<impl IntoResponse> {
    ctx.media.catalog().delete_folder(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<i64>,
    per_page: Option<i64>,
}

/// Page through a folder's active objects, newest first
async fn list_folder_media(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Query(params): Query<PageParams>,
) -> MediaResult<impl IntoResponse> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);

    let result = ctx.media.catalog().list_by_folder(id, page, per_page).await?;
    Ok(Json(result))
}
