//! Upload engine: admit files, fetch one presigned URL per file in a single
//! call, PUT every file to storage concurrently and fold the per-file results
//! into one batch outcome.

pub mod error;
pub mod guard;
pub mod issuer;
pub mod orchestrator;
pub mod progress;
pub mod transfer;
pub mod types;

pub use error::UploadError;
pub use guard::{Admission, SelectionGuard};
pub use issuer::{HttpTokenIssuer, TokenIssuer};
pub use orchestrator::BatchOrchestrator;
pub use progress::{ProgressAggregator, ProgressReporter};
pub use transfer::{HttpTransferExecutor, TransferExecutor};
pub use types::{
    AuthorizationRequest, AuthorizationToken, BatchOutcome, BatchPhase, FileDescriptor,
    FileSource, TransferOutcome, UploadEvent, UploadedFile,
};
