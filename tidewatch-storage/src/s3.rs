//! S3-compatible blob store using the AWS SDK.
//!
//! One bucket per project; keys are the `object_key` values stored on audio
//! rows. Works against AWS S3 and MinIO-style endpoints.

use crate::blob::BlobStore;
use ::async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use tidewatch_core::constants::MAX_BLOB_BATCH_SIZE;
use tidewatch_core::{BlobError, ConfigError, TidewatchResult};
use tracing::instrument;

const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for the object store.
#[derive(Clone, Default)]
pub struct S3Config {
    /// Custom endpoint, e.g. `minio:9000`. `None` targets AWS.
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Path-style addressing (`endpoint/bucket/key`), needed by MinIO.
    pub force_path_style: bool,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .finish_non_exhaustive()
    }
}

impl S3Config {
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("TIDEWATCH_S3_ENDPOINT").ok(),
            region: std::env::var("TIDEWATCH_S3_REGION").ok(),
            access_key_id: std::env::var("TIDEWATCH_S3_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("TIDEWATCH_S3_SECRET_ACCESS_KEY").ok(),
            force_path_style: std::env::var("TIDEWATCH_S3_FORCE_PATH_STYLE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
        }
    }

    pub fn validate(&self) -> TidewatchResult<()> {
        if self.access_key_id.is_some() ^ self.secret_access_key.is_some() {
            return Err(ConfigError::InvalidValue {
                field: "access_key_id".to_string(),
                value: "<redacted>".to_string(),
                reason: "access_key_id and secret_access_key must be set together".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Endpoint with a scheme; bare `host:port` values get `http://`.
    fn normalized_endpoint(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            let lower = endpoint.to_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("http://{}", endpoint)
            }
        })
    }

    fn resolved_region(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }
}

fn sdk_failure<E>(bucket: &str, keys: usize, err: aws_sdk_s3::error::SdkError<E>) -> BlobError
where
    E: std::error::Error + Send + Sync + 'static,
{
    BlobError::StorageDeletionFailure {
        bucket: bucket.to_string(),
        keys,
        reason: err.to_string(),
    }
}

/// Object store backed by an S3 client.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    region: String,
}

impl std::fmt::Debug for S3BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3BlobStore")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3BlobStore {
    pub fn new(config: &S3Config) -> TidewatchResult<Self> {
        config.validate()?;
        let region = config.resolved_region();
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()));

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "tidewatch-config",
            );
            builder = builder.credentials_provider(credentials);
        }

        if let Some(endpoint) = config.normalized_endpoint() {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            region,
        })
    }

    pub fn from_env() -> TidewatchResult<Self> {
        Self::new(&S3Config::from_env())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BlobError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_failure(bucket, 1, e))?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(backend = "s3", keys = keys.len()))]
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), BlobError> {
        if keys.len() > MAX_BLOB_BATCH_SIZE {
            return Err(BlobError::BatchTooLarge {
                size: keys.len(),
                max: MAX_BLOB_BATCH_SIZE,
            });
        }
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BlobError::StorageDeletionFailure {
                bucket: bucket.to_string(),
                keys: keys.len(),
                reason: e.to_string(),
            })?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| BlobError::StorageDeletionFailure {
                bucket: bucket.to_string(),
                keys: keys.len(),
                reason: e.to_string(),
            })?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| sdk_failure(bucket, keys.len(), e))?;

        let errors = output.errors();
        if !errors.is_empty() {
            let first = errors
                .first()
                .and_then(|e| e.message())
                .unwrap_or("unknown error");
            return Err(BlobError::StorageDeletionFailure {
                bucket: bucket.to_string(),
                keys: errors.len(),
                reason: format!("{} key(s) not deleted: {}", errors.len(), first),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn create_bucket(&self, bucket: &str) -> Result<(), BlobError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let exists = err.as_service_error().is_some_and(|e| {
                    e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
                });
                if exists {
                    return Ok(());
                }
                Err(BlobError::Bucket {
                    bucket: bucket.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete_bucket(&self, bucket: &str) -> Result<(), BlobError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| BlobError::Bucket {
                bucket: bucket.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
