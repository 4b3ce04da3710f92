use crate::client::error::UploadError;
use crate::client::progress::ProgressReporter;
use crate::client::types::{AuthorizationToken, FileDescriptor, TransferOutcome, UploadedFile};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};

/// Writes one file to the location its token authorizes.
///
/// Implementations must call [`ProgressReporter::begin`] once before sending
/// any byte and report progress only through the given reporter.
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    async fn transfer(
        &self,
        token: &AuthorizationToken,
        file: &FileDescriptor,
        progress: ProgressReporter,
    ) -> TransferOutcome;
}

/// Streams the file body to a presigned URL with a single `PUT`.
pub struct HttpTransferExecutor {
    client: reqwest::Client,
}

impl HttpTransferExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransferExecutor for HttpTransferExecutor {
    async fn transfer(
        &self,
        token: &AuthorizationToken,
        file: &FileDescriptor,
        progress: ProgressReporter,
    ) -> TransferOutcome {
        if token.is_expired() {
            tracing::error!(
                "Signed URL for {} expired at {}",
                file.name,
                token.expires_at
            );
            return Err(UploadError::transfer_failed(&file.name, "signed URL expired"));
        }

        let source = file.open().await.map_err(|e| {
            tracing::error!("Failed to open {}: {}", file.name, e);
            UploadError::transfer_failed(&file.name, e)
        })?;

        let total = file.size_bytes;
        progress.begin();
        // An empty body yields no chunk; it completes once storage accepts it.
        let (mut streamed, empty) = if total == 0 {
            (None, Some(progress))
        } else {
            (Some(progress), None)
        };
        let mut sent: u64 = 0;
        let counted = source.map(move |chunk| {
            if let (Ok(bytes), Some(progress)) = (&chunk, streamed.as_mut()) {
                sent += bytes.len() as u64;
                progress.advance(sent, total);
            }
            chunk
        });

        let response = self
            .client
            .put(token.url.clone())
            .header(CONTENT_TYPE, &file.mime_type)
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(counted))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Upload of {} failed: {}", file.name, e);
                UploadError::transfer_failed(&file.name, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                "Storage rejected {} with status {}: {}",
                file.name,
                status,
                body
            );
            return Err(UploadError::transfer_failed(
                &file.name,
                format!("storage responded with {}", status),
            ));
        }

        if let Some(mut progress) = empty {
            progress.complete();
        }
        tracing::debug!("Uploaded {} ({} bytes)", file.name, total);
        Ok(UploadedFile {
            name: file.name.clone(),
            size_bytes: file.size_bytes,
        })
    }
}
