use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use std::time::Duration;

/// Produces presigned object URLs.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// URL allowing one `PUT` of `key` with the given content type into the
    /// configured bucket.
    async fn presign_put(&self, key: &str, content_type: &str, expires_in: Duration)
    -> Result<String>;

    /// URL allowing one `GET` of `bucket/key`.
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String>;

    fn bucket(&self) -> &str;
}

pub struct S3UrlSigner {
    client: Client,
    bucket: String,
}

impl S3UrlSigner {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl UrlSigner for S3UrlSigner {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(PresigningConfig::expires_in(expires_in)?)
            .await?;
        Ok(request.uri().to_string())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        let res = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(expires_in)?)
            .await;

        match res {
            Ok(request) => Ok(request.uri().to_string()),
            Err(e) => {
                tracing::error!(
                    "S3 presign get_object failed: bucket={}, key={}, error={:?}",
                    bucket,
                    key,
                    e
                );
                Err(e.into())
            }
        }
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
