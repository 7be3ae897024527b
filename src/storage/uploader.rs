use std::sync::Arc;

use bytes::Bytes;

use super::backend::{ObjectAcl, ObjectSink, PutRequest};
use super::s3::S3Sink;
use crate::config::S3Config;
use crate::errors::UploadError;
use crate::models::Table;

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_CSV: &str = "text/csv";

/// A bucket in a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub bucket: String,
    pub region: String,
}

impl StorageTarget {
    /// `https://s3.{region}.amazonaws.com/{bucket}`
    pub fn base_url(&self) -> String {
        format!("https://s3.{}.amazonaws.com/{}", self.region, self.bucket)
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url(), key)
    }
}

/// Uploads buffers and tables to a bucket and returns their public URL.
///
/// The URL is derived from configuration (region + bucket + key), never from
/// the store's response.
pub struct ObjectUploader {
    sink: Arc<dyn ObjectSink>,
    region: String,
    default_bucket: String,
    acl: ObjectAcl,
}

impl ObjectUploader {
    pub fn new(cfg: S3Config) -> anyhow::Result<Self> {
        let sink = S3Sink::new(&cfg)?;
        let acl = if cfg.public_read {
            ObjectAcl::PublicRead
        } else {
            ObjectAcl::Private
        };
        tracing::info!(
            region = %cfg.region,
            default_bucket = %cfg.default_bucket,
            endpoint = %sink.endpoint(),
            public_read = cfg.public_read,
            "object uploader: using S3 backend"
        );
        Ok(Self {
            sink: Arc::new(sink),
            region: cfg.region,
            default_bucket: cfg.default_bucket,
            acl,
        })
    }

    /// Build over any sink. Objects are uploaded `public-read`.
    pub fn with_sink(
        sink: Arc<dyn ObjectSink>,
        region: impl Into<String>,
        default_bucket: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            region: region.into(),
            default_bucket: default_bucket.into(),
            acl: ObjectAcl::PublicRead,
        }
    }

    pub fn with_acl(mut self, acl: ObjectAcl) -> Self {
        self.acl = acl;
        self
    }

    fn target(&self, bucket: Option<&str>) -> StorageTarget {
        let bucket = bucket
            .filter(|b| !b.is_empty())
            .unwrap_or(&self.default_bucket);
        StorageTarget {
            bucket: bucket.to_string(),
            region: self.region.clone(),
        }
    }

    /// Base URL of `bucket`, or of the default bucket when absent or empty.
    pub fn file_url_path(&self, bucket: Option<&str>) -> String {
        self.target(bucket).base_url()
    }

    /// Upload `body` under `key` and return its URL. Nothing is cleaned up
    /// if the upload fails midway.
    pub async fn upload(
        &self,
        body: Bytes,
        key: &str,
        bucket: Option<&str>,
    ) -> Result<String, UploadError> {
        self.put(body, key, bucket, OCTET_STREAM).await
    }

    /// Encode `table` as CSV (header row, no index) and upload it.
    pub async fn upload_tabular(
        &self,
        table: &Table,
        key: &str,
        bucket: Option<&str>,
    ) -> Result<String, UploadError> {
        let csv = table.to_csv();
        self.put(Bytes::from(csv), key, bucket, TEXT_CSV).await
    }

    async fn put(
        &self,
        body: Bytes,
        key: &str,
        bucket: Option<&str>,
        content_type: &str,
    ) -> Result<String, UploadError> {
        let target = self.target(bucket);
        // An empty path would address the bucket itself.
        if key.trim_matches('/').is_empty() {
            tracing::warn!(bucket = %target.bucket, key, "upload rejected: empty object key");
            return Err(UploadError::internal(anyhow::anyhow!(
                "object key must not be empty, got {:?}",
                key
            )));
        }
        let file_url = target.object_url(key);
        let size = body.len();

        self.sink
            .put_object(PutRequest {
                bucket: &target.bucket,
                key,
                body,
                content_type,
                acl: self.acl,
            })
            .await
            .map_err(|e| {
                tracing::warn!(bucket = %target.bucket, key, error = %e, "upload failed");
                UploadError::internal(e)
            })?;

        tracing::info!(bucket = %target.bucket, key, bytes = size, url = %file_url, "file uploaded");
        Ok(file_url)
    }
}
