//! S3 object store
//!
//! Works against AWS S3 and S3-compatible storage (MinIO). Object bodies are
//! streamed out chunk by chunk; uploads are spooled to a temporary file first
//! because a signed PUT needs the content length up front.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{
    Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use aws_sdk_s3::primitives::ByteStream as S3Body;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use catalyst_backup::{ByteStream, ObjectStore};
use futures::{stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Region AWS treats as the default; buckets there take no location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for S3-compatible storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Custom endpoint (MinIO); `None` talks to AWS
    pub endpoint: Option<String>,

    pub region: String,

    /// Static credentials; when absent the default AWS provider chain is used
    pub access_key: Option<String>,

    pub secret_key: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            access_key: None,
            secret_key: None,
        }
    }
}

/// Object store backed by an S3 client.
pub struct S3ObjectStore {
    client: Client,
    region: String,
}

impl S3ObjectStore {
    pub async fn new(config: &S3Config) -> Result<Self> {
        let client = Self::create_client(config).await?;
        Ok(Self {
            client,
            region: config.region.clone(),
        })
    }

    async fn create_client(config: &S3Config) -> Result<Client> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                loader = loader.credentials_provider(Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "catalyst-config",
                ));
            }
            (None, None) => {}
            _ => return Err(anyhow!("S3 access_key and secret_key must be set together")),
        }

        let sdk_config = loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        // Custom endpoints: path-style addressing, checksums only where an operation requires them
        if let Some(endpoint_url) = &config.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint_url);
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint_url)
                .force_path_style(true)
                .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
                .response_checksum_validation(ResponseChecksumValidation::WhenRequired);
        }

        Ok(Client::from_conf(s3_config_builder.build()))
    }

    fn bucket_configuration(&self) -> Option<CreateBucketConfiguration> {
        location_constraint(&self.region).map(|constraint| {
            CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build()
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_buckets()
            .send()
            .await
            .context("Failed to list buckets")?;

        let buckets: Vec<String> = resp
            .buckets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|bucket| bucket.name)
            .collect();
        debug!("Found {} buckets", buckets.len());
        Ok(buckets)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    debug!("Bucket {} does not exist", bucket);
                    Ok(false)
                } else {
                    Err(anyhow!(
                        "Failed to check bucket {}: {}",
                        bucket,
                        service_error
                    ))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(self.bucket_configuration())
            .send()
            .await
            .with_context(|| format!("Failed to create bucket: {}", bucket))?;

        info!("Created bucket {}", bucket);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        for key in self.list_objects(bucket).await? {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(&key)
                .send()
                .await
                .with_context(|| format!("Failed to delete object {}/{}", bucket, key))?;
        }

        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| format!("Failed to delete bucket: {}", bucket))?;

        info!("Deleted bucket {}", bucket);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let resp = request
                .send()
                .await
                .with_context(|| format!("Failed to list objects in bucket {}", bucket))?;

            if let Some(contents) = resp.contents {
                keys.extend(contents.into_iter().filter_map(|object| object.key));
            }

            if resp.is_truncated != Some(true) {
                break;
            }
            match resp.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => bail!(
                    "Listing of bucket {} is truncated but has no continuation token",
                    bucket
                ),
            }
        }

        debug!("Found {} objects in {}", keys.len(), bucket);
        Ok(keys)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get object {}/{}", bucket, key))?;

        let body = stream::try_unfold(resp.body, |mut body| async move {
            match body.next().await {
                Some(chunk) => Ok(Some((chunk?, body))),
                None => Ok::<_, anyhow::Error>(None),
            }
        });
        Ok(Box::pin(body))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: ByteStream) -> Result<u64> {
        let spool = tempfile::NamedTempFile::new().context("Failed to create upload spool")?;
        let mut file = tokio::fs::File::create(spool.path()).await?;

        let mut size = 0u64;
        let mut body = body;
        while let Some(chunk) = body.try_next().await? {
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        let upload = S3Body::from_path(spool.path())
            .await
            .with_context(|| format!("Failed to open upload spool for {}/{}", bucket, key))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(size as i64)
            .body(upload)
            .send()
            .await
            .with_context(|| format!("Failed to put object {}/{}", bucket, key))?;

        debug!("Uploaded {} bytes to {}/{}", size, bucket, key);
        Ok(size)
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

fn location_constraint(region: &str) -> Option<BucketLocationConstraint> {
    if region.is_empty() || region == DEFAULT_REGION {
        None
    } else {
        Some(BucketLocationConstraint::from(region))
    }
}
