use thiserror::Error;

/// Failures raised by the upload engine.
///
/// Every variant carries plain strings so an error can be cloned into both
/// the per-file outcome list and the batch-level error of a failed batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("You can only upload {limit} files at a time")]
    BatchLimitExceeded { limit: usize },

    #[error("Failed to fetch signed URLs: {0}")]
    IssuanceFailure(String),

    #[error("Failed to upload {name}: {reason}")]
    TransferFailed { name: String, reason: String },

    #[error("An upload batch is already in flight")]
    Busy,

    #[error("Cannot read {path}: {reason}")]
    FileUnreadable { path: String, reason: String },
}

impl UploadError {
    pub(crate) fn transfer_failed(name: &str, reason: impl ToString) -> Self {
        UploadError::TransferFailed {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Name of the file a transfer failure belongs to, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            UploadError::TransferFailed { name, .. } => Some(name),
            _ => None,
        }
    }
}
