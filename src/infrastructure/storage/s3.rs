use super::uploader::ObjectSink;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::BehaviorVersion, config::Credentials, config::Region, Client};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
    upload_permits: Arc<Semaphore>,
}

impl StorageService {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        max_concurrent_uploads: usize,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("✅ Configured S3 client for bucket '{}' at {}", bucket, endpoint);

        Self {
            client,
            bucket: bucket.to_string(),
            upload_permits: Arc::new(Semaphore::new(max_concurrent_uploads.max(1))),
        }
    }

    pub async fn put_path(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| anyhow!("failed to open {}: {}", path.display(), e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow!("PutObject {} failed: {}", key, aws_sdk_s3::Error::from(e)))?;

        Ok(())
    }

    /// Raw `GetObject` so callers can forward the origin status on failure.
    pub async fn get_object(
        &self,
        key: &str,
        range: Option<String>,
    ) -> Result<GetObjectOutput, SdkError<GetObjectError>> {
        self.client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range)
            .send()
            .await
    }
}

#[async_trait]
impl ObjectSink for StorageService {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let _permit = self
            .upload_permits
            .acquire()
            .await
            .map_err(|e| anyhow!("upload limiter closed: {}", e))?;

        debug!(key, "⬆️ PutObject");
        self.put_path(key, path, content_type).await
    }
}

/// HTTP status carried by a failed S3 call, if the request reached the origin.
pub fn origin_status<E>(err: &SdkError<E>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}
