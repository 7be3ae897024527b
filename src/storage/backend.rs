//! Object sink abstraction and the `object_store`-backed implementation.
//!
//! [`ObjectStoreSink`] is selected with a URL:
//!
//! ```text
//! # Local filesystem (development)
//! file:///tmp/automation-uploads
//!
//! # Process memory (tests)
//! memory://
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use object_store::{memory::InMemory, path::Path, ObjectStore};

/// Access control applied to an uploaded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAcl {
    Private,
    PublicRead,
}

impl ObjectAcl {
    /// Canned ACL name as understood by S3's `x-amz-acl` header.
    pub fn canned(&self) -> Option<&'static str> {
        match self {
            ObjectAcl::Private => None,
            ObjectAcl::PublicRead => Some("public-read"),
        }
    }
}

/// One object PUT.
pub struct PutRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub body: Bytes,
    pub content_type: &'a str,
    pub acl: ObjectAcl,
}

/// Destination that stores whole objects under `(bucket, key)`.
#[async_trait::async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put_object(&self, request: PutRequest<'_>) -> Result<()>;
}

/// Sink over any `object_store` backend. Objects land at `{bucket}/{key}`.
/// ACLs have no meaning here and are ignored.
#[derive(Clone)]
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    pub fn from_url(url: &str) -> Result<Self> {
        if url == "memory://" || url == "memory:" {
            return Ok(Self::in_memory());
        }

        if let Some(path) = url.strip_prefix("file://") {
            std::fs::create_dir_all(path)
                .with_context(|| format!("failed to create upload directory {}", path))?;
            let store = object_store::local::LocalFileSystem::new_with_prefix(path)
                .context("failed to create local file system object store")?;
            return Ok(Self::new(Arc::new(store)));
        }

        anyhow::bail!("unsupported object sink URL scheme: {}", url)
    }

    /// Read an object back.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let path = object_path(bucket, key);
        self.store
            .get(&path)
            .await
            .context("failed to get object from store")?
            .bytes()
            .await
            .context("failed to read object bytes")
    }
}

fn object_path(bucket: &str, key: &str) -> Path {
    Path::from(format!("{}/{}", bucket, key.trim_start_matches('/')))
}

#[async_trait::async_trait]
impl ObjectSink for ObjectStoreSink {
    async fn put_object(&self, request: PutRequest<'_>) -> Result<()> {
        let path = object_path(request.bucket, request.key);
        self.store
            .put(&path, request.body.into())
            .await
            .context("failed to put object to store")?;

        tracing::debug!(
            path = %path,
            content_type = request.content_type,
            "object written to store"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_acl() {
        assert_eq!(ObjectAcl::PublicRead.canned(), Some("public-read"));
        assert_eq!(ObjectAcl::Private.canned(), None);
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(ObjectStoreSink::from_url("ftp://host/dir").is_err());
    }

    #[tokio::test]
    async fn test_memory_put_then_get() {
        let sink = ObjectStoreSink::from_url("memory://").unwrap();
        sink.put_object(PutRequest {
            bucket: "assets",
            key: "dir/file.txt",
            body: Bytes::from_static(b"hello"),
            content_type: "text/plain",
            acl: ObjectAcl::PublicRead,
        })
        .await
        .unwrap();

        let bytes = sink.get("assets", "dir/file.txt").await.unwrap();
        assert_eq!(bytes.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_file_backend_writes_under_bucket_dir() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", dir.path().display());
        let sink = ObjectStoreSink::from_url(&url).unwrap();

        sink.put_object(PutRequest {
            bucket: "assets",
            key: "a.csv",
            body: Bytes::from_static(b"x\n"),
            content_type: "text/csv",
            acl: ObjectAcl::Private,
        })
        .await
        .unwrap();

        let on_disk = std::fs::read(dir.path().join("assets").join("a.csv")).unwrap();
        assert_eq!(on_disk, b"x\n");
    }

    #[tokio::test]
    async fn test_get_missing_object_errors() {
        let sink = ObjectStoreSink::in_memory();
        assert!(sink.get("assets", "nope").await.is_err());
    }
}
