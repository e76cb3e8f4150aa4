/// Application context and dependency injection
use crate::{
    config::{ServerConfig, StorageBackendConfig},
    db,
    error::MediaResult,
    media::{Catalog, MediaStore},
    storage::{LocalBackend, S3Backend, S3Options, StorageBackend},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub media: Arc<MediaStore>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> MediaResult<Self> {
        config.validate()?;

        let db = db::create_pool(&config.database.path, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        // The backend is constructed once at startup; every pipeline
        // shares the same client.
        let backend: Arc<dyn StorageBackend> = match &config.storage.backend {
            StorageBackendConfig::Local {
                base_dir,
                url_template,
            } => {
                tokio::fs::create_dir_all(base_dir).await?;
                info!("Using local media storage at {}", base_dir.display());
                Arc::new(LocalBackend::new(base_dir.clone(), url_template.clone()))
            }
            StorageBackendConfig::S3 {
                bucket,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
                use_tls,
                url_template,
                key_prefix,
                timeout_secs,
            } => Arc::new(
                S3Backend::new(S3Options {
                    bucket: bucket.clone(),
                    region: region.clone(),
                    endpoint: endpoint.clone(),
                    access_key_id: access_key_id.clone(),
                    secret_access_key: secret_access_key.clone(),
                    use_tls: *use_tls,
                    url_template: url_template.clone(),
                    key_prefix: key_prefix.clone(),
                    timeout: Duration::from_secs(*timeout_secs),
                })
                .await?,
            ),
        };

        let catalog = Catalog::new(db.clone());
        let media = Arc::new(MediaStore::new(
            backend,
            catalog,
            config.service.max_upload_size,
        ));

        Ok(Self {
            config: Arc::new(config),
            db,
            media,
        })
    }
}
