/// S3-compatible storage backend
///
/// Works against AWS S3 and S3-compatible providers (MinIO, DigitalOcean
/// Spaces, etc.)
use crate::{
    error::{MediaError, MediaResult},
    media::path::sharded_rel_path,
    storage::{ByteReader, StorageBackend},
};
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const PRESIGN_TTL: Duration = Duration::from_secs(3600);

/// Connection options for an S3-compatible object store
#[derive(Debug, Clone)]
pub struct S3Options {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services, host or full URL
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Scheme for endpoints given without one
    pub use_tls: bool,
    /// Static URL template (`${bucket}`, `${region}`, `${name}`); when
    /// absent, a presigned URL is issued per request
    pub url_template: Option<String>,
    /// Key prefix for all objects
    pub key_prefix: String,
    /// Operation timeout for network calls
    pub timeout: Duration,
}

/// S3 storage backend
#[derive(Clone)]
pub struct S3Backend {
    client: Arc<Client>,
    bucket: String,
    region: String,
    key_prefix: String,
    url_template: Option<String>,
}

impl S3Backend {
    /// Create a new S3 backend, opening the client once at startup
    pub async fn new(options: S3Options) -> MediaResult<Self> {
        info!(
            "Initializing S3 media storage (bucket: {}, region: {})",
            options.bucket, options.region
        );

        let credentials = Credentials::new(
            &options.access_key_id,
            &options.secret_access_key,
            None, // session token
            None, // expiration
            "lumen-media",
        );

        let timeout = TimeoutConfig::builder()
            .operation_timeout(options.timeout)
            .build();

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(options.region.clone()))
            .credentials_provider(credentials)
            .timeout_config(timeout)
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&aws_config);

        if let Some(endpoint) = &options.endpoint {
            let endpoint = normalize_endpoint(endpoint, options.use_tls);
            debug!("Using custom S3 endpoint: {}", endpoint);
            builder = builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO and friends
        }

        let client = Client::from_conf(builder.build());

        info!("S3 media storage initialized");

        Ok(Self {
            client: Arc::new(client),
            bucket: options.bucket,
            region: options.region,
            key_prefix: options.key_prefix,
            url_template: options.url_template,
        })
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, sharded_rel_path(name))
    }
}

fn normalize_endpoint(endpoint: &str, use_tls: bool) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else if use_tls {
        format!("https://{}", endpoint)
    } else {
        format!("http://{}", endpoint)
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("NoSuchKey") || message.contains("NotFound")
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn save(&self, name: &str, data: Vec<u8>) -> MediaResult<String> {
        let key = self.key(name);

        debug!("Uploading blob to S3: {} ({} bytes)", key, data.len());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to upload blob to S3: {}", e);
                MediaError::Backend(format!("S3 upload failed: {}", e))
            })?;

        Ok(key)
    }

    async fn read(&self, name: &str) -> MediaResult<Option<Vec<u8>>> {
        let key = self.key(name);

        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => {
                let data = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| MediaError::Backend(format!("Failed to read S3 object: {}", e)))?
                    .into_bytes()
                    .to_vec();

                Ok(Some(data))
            }
            Err(e) => {
                if is_not_found(&format!("{:?}", e)) {
                    Ok(None)
                } else {
                    error!("Failed to download blob from S3: {}", e);
                    Err(MediaError::Backend(format!("S3 download failed: {}", e)))
                }
            }
        }
    }

    async fn open_stream(&self, name: &str) -> MediaResult<Option<ByteReader>> {
        let key = self.key(name);

        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => Ok(Some(Box::new(response.body.into_async_read()))),
            Err(e) => {
                if is_not_found(&format!("{:?}", e)) {
                    Ok(None)
                } else {
                    error!("Failed to stream blob from S3: {}", e);
                    Err(MediaError::Backend(format!("S3 download failed: {}", e)))
                }
            }
        }
    }

    async fn exists(&self, name: &str) -> MediaResult<bool> {
        let key = self.key(name);

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if is_not_found(&format!("{:?}", e)) {
                    Ok(false)
                } else {
                    Err(MediaError::Backend(format!("S3 head object failed: {}", e)))
                }
            }
        }
    }

    async fn delete(&self, name: &str) -> MediaResult<()> {
        let key = self.key(name);

        debug!("Deleting blob from S3: {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to delete blob from S3: {}", e);
                MediaError::Backend(format!("S3 delete failed: {}", e))
            })?;

        Ok(())
    }

    fn local_path(&self, _name: &str) -> Option<PathBuf> {
        None
    }

    async fn url(&self, name: &str) -> MediaResult<String> {
        if let Some(template) = &self.url_template {
            return Ok(template
                .replace("${bucket}", &self.bucket)
                .replace("${region}", &self.region)
                .replace("${name}", &self.key(name)));
        }

        let presigning = PresigningConfig::expires_in(PRESIGN_TTL)
            .map_err(|e| MediaError::Internal(format!("Invalid presign TTL: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(name))
            .presigned(presigning)
            .await
            .map_err(|e| MediaError::Backend(format!("S3 presign failed: {}", e)))?;

        Ok(request.uri().to_string())
    }
}
