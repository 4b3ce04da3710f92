use crate::client::error::UploadError;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::Stream;
use futures::stream;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio_util::io::ReaderStream;
use url::Url;

/// Size of the chunks in-memory sources are split into when streamed.
const MEMORY_CHUNK_SIZE: usize = 64 * 1024;

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Where the bytes of a file live on the client.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A local file selected for upload. The name is its identity within a batch
/// and doubles as the object key on the issuer side.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub source: FileSource,
}

impl FileDescriptor {
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    /// Builds a descriptor for a file on disk. The mime type is sniffed from
    /// the file's leading bytes and falls back to `application/octet-stream`.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let unreadable = |reason: String| UploadError::FileUnreadable {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        if !metadata.is_file() {
            return Err(unreadable("not a regular file".to_string()));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .ok_or_else(|| unreadable("file name is not valid UTF-8".to_string()))?;

        let sniff_path = path.to_path_buf();
        let kind = tokio::task::spawn_blocking(move || infer::get_from_path(sniff_path))
            .await
            .map_err(|e| unreadable(e.to_string()))?
            .map_err(|e| unreadable(e.to_string()))?;
        let mime_type = kind
            .map(|k| k.mime_type().to_string())
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

        Ok(Self {
            name,
            mime_type,
            size_bytes: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Opens the file content as a stream of chunks.
    pub async fn open(&self) -> io::Result<ByteStream> {
        match &self.source {
            FileSource::Path(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::pin(ReaderStream::new(file)))
            }
            FileSource::Memory(data) => {
                let chunks: Vec<io::Result<Bytes>> = (0..data.len())
                    .step_by(MEMORY_CHUNK_SIZE)
                    .map(|start| {
                        let end = (start + MEMORY_CHUNK_SIZE).min(data.len());
                        Ok(data.slice(start..end))
                    })
                    .collect();
                Ok(Box::pin(stream::iter(chunks)))
            }
        }
    }
}

/// One entry of the batched authorization call, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub name: String,
    pub mime_type: String,
}

impl From<&FileDescriptor> for AuthorizationRequest {
    fn from(file: &FileDescriptor) -> Self {
        Self {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
        }
    }
}

/// A presigned URL granting one read or write of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationToken {
    pub url: Url,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationToken {
    pub fn issued_now(url: Url, ttl: Duration) -> Self {
        Self {
            url,
            expires_at: Utc::now()
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Record of a file that reached storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub name: String,
    pub size_bytes: u64,
}

pub type TransferOutcome = Result<UploadedFile, UploadError>;

/// Result of a batch that got past the pre-flight checks.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Succeeded(Vec<UploadedFile>),
    /// `error` is the issuance failure or the first failed transfer by file
    /// order. `outcomes` holds one entry per file, empty when issuance failed.
    Failed {
        error: UploadError,
        outcomes: Vec<TransferOutcome>,
    },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Succeeded(_))
    }

    pub fn into_result(self) -> Result<Vec<UploadedFile>, UploadError> {
        match self {
            BatchOutcome::Succeeded(files) => Ok(files),
            BatchOutcome::Failed { error, .. } => Err(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Requesting,
    Transferring,
    Succeeded,
    Failed,
}

/// Notifications emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// A transfer is about to send its first byte.
    Began { index: usize, name: String },
    /// Full progress vector after one tick, or at a batch boundary.
    Progress(Vec<u8>),
}
