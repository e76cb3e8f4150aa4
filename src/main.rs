/// Lumen Media - content-addressed media storage engine
///
/// Ingests images through a canonicalizing transcoder, stores them by
/// content hash on disk or S3-compatible storage, and serves them with
/// on-the-fly format conversion.

mod api;
mod config;
mod context;
mod db;
mod error;
mod media;
mod server;
mod storage;

use config::ServerConfig;
use context::AppContext;
use error::MediaResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> MediaResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumen_media=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}
