use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use zeroize::Zeroize;

use super::backend::{ObjectSink, PutRequest};
use super::sigv4::{self, SigningParams};
use crate::config::S3Config;

/// Writes objects to S3 (or an S3-compatible endpoint) with SigV4-signed
/// path-style PUTs.
pub struct S3Sink {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
}

impl S3Sink {
    pub fn new(cfg: &S3Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = cfg.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("failed to build S3 HTTP client")?;

        let endpoint = cfg
            .endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", cfg.region));

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: cfg.region.clone(),
            access_key_id: cfg.access_key_id.clone(),
            secret_access_key: cfg.secret_access_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, sigv4::encode_key(key))
    }
}

impl Drop for S3Sink {
    fn drop(&mut self) {
        self.secret_access_key.zeroize();
    }
}

#[async_trait::async_trait]
impl ObjectSink for S3Sink {
    async fn put_object(&self, request: PutRequest<'_>) -> Result<()> {
        let url = self.object_url(request.bucket, request.key);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(request.content_type)?);
        if let Some(acl) = request.acl.canned() {
            headers.insert("x-amz-acl", HeaderValue::from_static(acl));
        }

        sigv4::sign_request(
            "PUT",
            &url,
            &mut headers,
            &request.body,
            &SigningParams {
                access_key: &self.access_key_id,
                secret_key: &self.secret_access_key,
                region: &self.region,
                service: "s3",
            },
        )?;

        let size = request.body.len();
        let resp = self
            .client
            .put(&url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .context("S3 PUT request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("S3 returned error: status={}, body={}", status, body);
        }

        tracing::debug!(bucket = request.bucket, key = request.key, bytes = size, "object uploaded to S3");
        Ok(())
    }
}
