/// API routes and handlers
pub mod folder;
pub mod media;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new().merge(media::routes()).merge(folder::routes())
}
