/// Configuration management for the media engine
use crate::error::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Maximum accepted upload size in bytes
    pub max_upload_size: usize,
}

/// Catalog database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
}

/// Storage backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageBackendConfig {
    Local {
        base_dir: PathBuf,
        /// URL template for served objects, `${name}` is the sharded path
        url_template: String,
    },
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        access_key_id: String,
        secret_access_key: String,
        use_tls: bool,
        /// Static URL template; when absent, presigned URLs are issued
        url_template: Option<String>,
        key_prefix: String,
        timeout_secs: u64,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> MediaResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("MEDIA_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("MEDIA_PORT")
            .unwrap_or_else(|_| "8300".to_string())
            .parse()
            .map_err(|_| MediaError::Validation("Invalid port number".to_string()))?;
        let max_upload_size = env::var("MEDIA_MAX_UPLOAD_SIZE")
            .unwrap_or_else(|_| "20971520".to_string())
            .parse()
            .unwrap_or(20 * 1024 * 1024);

        let data_directory: PathBuf = env::var("MEDIA_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database_path = env::var("MEDIA_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("catalog.sqlite"));

        let backend = if let Ok(bucket) = env::var("MEDIA_S3_BUCKET") {
            StorageBackendConfig::S3 {
                bucket,
                region: env::var("MEDIA_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                endpoint: env::var("MEDIA_S3_ENDPOINT").ok(),
                access_key_id: env::var("MEDIA_S3_ACCESS_KEY_ID")
                    .map_err(|_| MediaError::Validation("S3 access key required".to_string()))?,
                secret_access_key: env::var("MEDIA_S3_SECRET_ACCESS_KEY")
                    .map_err(|_| MediaError::Validation("S3 secret key required".to_string()))?,
                use_tls: env::var("MEDIA_S3_USE_TLS")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .unwrap_or(true),
                url_template: env::var("MEDIA_S3_URL_TEMPLATE").ok(),
                key_prefix: env::var("MEDIA_S3_KEY_PREFIX")
                    .unwrap_or_else(|_| "media/".to_string()),
                timeout_secs: env::var("MEDIA_S3_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            }
        } else {
            StorageBackendConfig::Local {
                base_dir: env::var("MEDIA_LOCAL_BASE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("objects")),
                url_template: env::var("MEDIA_LOCAL_URL_TEMPLATE")
                    .unwrap_or_else(|_| "/static/${name}".to_string()),
            }
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                max_upload_size,
            },
            database: DatabaseConfig {
                path: database_path,
            },
            storage: StorageConfig { backend },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.service.hostname.is_empty() {
            return Err(MediaError::Validation(
                "Hostname cannot be empty".to_string(),
            ));
        }

        if self.service.max_upload_size == 0 {
            return Err(MediaError::Validation(
                "Upload size limit must be non-zero".to_string(),
            ));
        }

        match &self.storage.backend {
            StorageBackendConfig::Local { url_template, .. } => {
                if !url_template.contains("${name}") {
                    return Err(MediaError::Validation(
                        "Local URL template must contain ${name}".to_string(),
                    ));
                }
            }
            StorageBackendConfig::S3 { bucket, .. } => {
                if bucket.is_empty() {
                    return Err(MediaError::Validation(
                        "S3 bucket cannot be empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8300,
                max_upload_size: 1024,
            },
            database: DatabaseConfig {
                path: PathBuf::from("./data/catalog.sqlite"),
            },
            storage: StorageConfig {
                backend: StorageBackendConfig::Local {
                    base_dir: PathBuf::from("./data/objects"),
                    url_template: "/static/${name}".to_string(),
                },
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(local_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_template_without_name() {
        let mut config = local_config();
        config.storage.backend = StorageBackendConfig::Local {
            base_dir: PathBuf::from("./data/objects"),
            url_template: "/static/".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_upload_limit() {
        let mut config = local_config();
        config.service.max_upload_size = 0;
        assert!(config.validate().is_err());
    }
}
