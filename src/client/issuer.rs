use crate::client::error::UploadError;
use crate::client::types::{AuthorizationRequest, AuthorizationToken};
use crate::models::{
    ErrorResponse, FileSpec, SignedUrlResponse, SignedUrlsRequest, SignedUrlsResponse,
};
use async_trait::async_trait;
use chrono::Duration;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

/// Source of presigned URLs.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// One write token per request entry, in the same order. A single call
    /// covers the whole batch.
    async fn request_tokens(
        &self,
        files: &[AuthorizationRequest],
    ) -> Result<Vec<AuthorizationToken>, UploadError>;

    async fn request_read_token(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<AuthorizationToken, UploadError>;
}

/// Talks to the issuer service over HTTP.
pub struct HttpTokenIssuer {
    client: reqwest::Client,
    base_url: String,
    token_ttl: Duration,
}

impl HttpTokenIssuer {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token_ttl: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token_ttl,
        }
    }

    fn token(&self, raw: &str) -> Result<AuthorizationToken, UploadError> {
        let url = Url::parse(raw)
            .map_err(|e| UploadError::IssuanceFailure(format!("invalid signed URL: {}", e)))?;
        Ok(AuthorizationToken::issued_now(url, self.token_ttl))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, UploadError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| "no error message".to_string());
            return Err(UploadError::IssuanceFailure(format!(
                "issuer responded with {}: {}",
                status, message
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UploadError::IssuanceFailure(format!("malformed issuer response: {}", e)))
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn request_tokens(
        &self,
        files: &[AuthorizationRequest],
    ) -> Result<Vec<AuthorizationToken>, UploadError> {
        let body = SignedUrlsRequest {
            files: files
                .iter()
                .map(|f| FileSpec {
                    file_name: f.name.clone(),
                    file_type: f.mime_type.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/api/s3/signed-url", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Signed URL request failed: {}", e);
                UploadError::IssuanceFailure(e.to_string())
            })?;

        let decoded: SignedUrlsResponse = Self::decode(response).await.inspect_err(|e| {
            tracing::error!("{}", e);
        })?;

        if decoded.signed_urls.len() != files.len() {
            let err = UploadError::IssuanceFailure(format!(
                "expected {} signed URLs, got {}",
                files.len(),
                decoded.signed_urls.len()
            ));
            tracing::error!("{}", err);
            return Err(err);
        }

        decoded
            .signed_urls
            .iter()
            .map(|raw| self.token(raw))
            .collect()
    }

    async fn request_read_token(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<AuthorizationToken, UploadError> {
        if bucket.trim().is_empty() || key.trim().is_empty() {
            return Err(UploadError::IssuanceFailure(
                "Missing required parameters: key, bucket".to_string(),
            ));
        }

        let url = format!(
            "{}/api/s3/signed-url/{}/{}",
            self.base_url,
            utf8_percent_encode(bucket, NON_ALPHANUMERIC),
            utf8_percent_encode(key, NON_ALPHANUMERIC)
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            tracing::error!("Signed URL request for {}/{} failed: {}", bucket, key, e);
            UploadError::IssuanceFailure(e.to_string())
        })?;

        let decoded: SignedUrlResponse = Self::decode(response).await.inspect_err(|e| {
            tracing::error!("{}", e);
        })?;
        self.token(&decoded.signed_url)
    }
}
