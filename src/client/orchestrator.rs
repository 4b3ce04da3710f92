use crate::client::error::UploadError;
use crate::client::issuer::{HttpTokenIssuer, TokenIssuer};
use crate::client::progress::{ProgressAggregator, ProgressReporter, ProgressSignal};
use crate::client::transfer::{HttpTransferExecutor, TransferExecutor};
use crate::client::types::{
    AuthorizationRequest, BatchOutcome, BatchPhase, FileDescriptor, TransferOutcome, UploadEvent,
};
use crate::config::UploadConfig;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};

type EventSink = Option<mpsc::UnboundedSender<UploadEvent>>;

/// State of the batch currently in flight. Lives only as long as one `run`.
#[derive(Debug)]
pub struct BatchState {
    files: Vec<FileDescriptor>,
    progress: ProgressAggregator,
}

impl BatchState {
    fn new(files: Vec<FileDescriptor>) -> Self {
        let mut progress = ProgressAggregator::new();
        progress.reset(files.len());
        Self { files, progress }
    }
}

/// Clears the busy flag and returns the phase to idle when the batch ends,
/// including when the `run` future is dropped mid-batch.
struct BusyGuard<'a> {
    busy: &'a AtomicBool,
    phase: &'a watch::Sender<BatchPhase>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_if_modified(|phase| {
            if *phase == BatchPhase::Idle {
                return false;
            }
            *phase = BatchPhase::Idle;
            true
        });
        self.busy.store(false, Ordering::Release);
    }
}

/// Drives one batch at a time: issue tokens, transfer every file, report.
pub struct BatchOrchestrator {
    issuer: Arc<dyn TokenIssuer>,
    executor: Arc<dyn TransferExecutor>,
    max_batch_size: usize,
    busy: AtomicBool,
    phase: watch::Sender<BatchPhase>,
}

impl BatchOrchestrator {
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        executor: Arc<dyn TransferExecutor>,
        max_batch_size: usize,
    ) -> Self {
        let (phase, _) = watch::channel(BatchPhase::Idle);
        Self {
            issuer,
            executor,
            max_batch_size,
            busy: AtomicBool::new(false),
            phase,
        }
    }

    /// Wires the HTTP issuer client and transfer executor from configuration.
    pub fn from_config(config: &UploadConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("presigned-upload/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let token_ttl = i64::try_from(config.token_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                anyhow::anyhow!("token TTL of {}s is out of range", config.token_ttl_secs)
            })?;
        let issuer = HttpTokenIssuer::new(client.clone(), config.issuer_url.clone(), token_ttl);
        Ok(Self::new(
            Arc::new(issuer),
            Arc::new(HttpTransferExecutor::new(client)),
            config.max_batch_size,
        ))
    }

    pub fn issuer(&self) -> &Arc<dyn TokenIssuer> {
        &self.issuer
    }

    pub fn phase(&self) -> BatchPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchPhase> {
        self.phase.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn run(&self, files: Vec<FileDescriptor>) -> Result<BatchOutcome, UploadError> {
        self.run_with_events(files, None).await
    }

    /// Uploads `files` as one batch.
    ///
    /// `Err` means the batch never started (another batch is in flight, or
    /// `files` exceeds the batch limit). Otherwise the outcome reports whether
    /// every file reached storage. Progress snapshots and transfer starts are
    /// sent to `events` as they happen.
    pub async fn run_with_events(
        &self,
        files: Vec<FileDescriptor>,
        events: EventSink,
    ) -> Result<BatchOutcome, UploadError> {
        if files.len() > self.max_batch_size {
            return Err(UploadError::BatchLimitExceeded {
                limit: self.max_batch_size,
            });
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Rejected upload batch: another batch is in flight");
            return Err(UploadError::Busy);
        }
        let _busy = BusyGuard {
            busy: &self.busy,
            phase: &self.phase,
        };

        if files.is_empty() {
            return Ok(BatchOutcome::Succeeded(Vec::new()));
        }

        let mut state = BatchState::new(files);
        self.phase.send_replace(BatchPhase::Requesting);
        emit(&events, UploadEvent::Progress(state.progress.snapshot()));
        tracing::info!("Requesting signed URLs for {} files", state.files.len());

        let requests: Vec<AuthorizationRequest> =
            state.files.iter().map(AuthorizationRequest::from).collect();
        let tokens = match self.issuer.request_tokens(&requests).await {
            Ok(tokens) if tokens.len() == requests.len() => tokens,
            Ok(tokens) => {
                let error = UploadError::IssuanceFailure(format!(
                    "expected {} signed URLs, got {}",
                    requests.len(),
                    tokens.len()
                ));
                return Ok(self.finish(&mut state, &events, Err(error)));
            }
            Err(error) => return Ok(self.finish(&mut state, &events, Err(error))),
        };

        self.phase.send_replace(BatchPhase::Transferring);
        let outcomes = {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let transfers = join_all(state.files.iter().zip(tokens.iter()).enumerate().map(
                |(index, (file, token))| {
                    let reporter = ProgressReporter::new(index, tx.clone());
                    self.executor.transfer(token, file, reporter)
                },
            ));
            drop(tx);
            tokio::pin!(transfers);

            let outcomes = loop {
                tokio::select! {
                    biased;
                    Some(signal) = rx.recv() => {
                        apply(&mut state.progress, &state.files, signal, &events);
                    }
                    outcomes = &mut transfers => break outcomes,
                }
            };
            while let Ok(signal) = rx.try_recv() {
                apply(&mut state.progress, &state.files, signal, &events);
            }
            outcomes
        };

        Ok(self.finish(&mut state, &events, Ok(outcomes)))
    }

    fn finish(
        &self,
        state: &mut BatchState,
        events: &EventSink,
        result: Result<Vec<TransferOutcome>, UploadError>,
    ) -> BatchOutcome {
        let outcome = match result {
            Err(error) => {
                tracing::error!("Upload batch failed before transfer: {}", error);
                BatchOutcome::Failed {
                    error,
                    outcomes: Vec::new(),
                }
            }
            Ok(outcomes) => match outcomes.iter().find_map(|o| o.as_ref().err()).cloned() {
                Some(error) => {
                    let failed = outcomes.iter().filter(|o| o.is_err()).count();
                    tracing::error!(
                        "Upload batch failed: {} of {} files did not transfer",
                        failed,
                        outcomes.len()
                    );
                    BatchOutcome::Failed { error, outcomes }
                }
                None => {
                    let uploaded: Vec<_> = outcomes.into_iter().filter_map(Result::ok).collect();
                    tracing::info!("Upload complete: {} files", uploaded.len());
                    BatchOutcome::Succeeded(uploaded)
                }
            },
        };

        self.phase.send_replace(if outcome.is_success() {
            BatchPhase::Succeeded
        } else {
            BatchPhase::Failed
        });
        state.progress.clear();
        emit(events, UploadEvent::Progress(state.progress.snapshot()));
        self.phase.send_replace(BatchPhase::Idle);
        outcome
    }
}

fn apply(
    progress: &mut ProgressAggregator,
    files: &[FileDescriptor],
    signal: ProgressSignal,
    events: &EventSink,
) {
    match signal {
        ProgressSignal::Began { index } => {
            let name = files.get(index).map(|f| f.name.clone()).unwrap_or_default();
            tracing::debug!("Upload begin: {}", name);
            emit(events, UploadEvent::Began { index, name });
        }
        ProgressSignal::Tick { index, percent } => {
            if let Some(snapshot) = progress.report(index, percent) {
                emit(events, UploadEvent::Progress(snapshot));
            }
        }
    }
}

fn emit(events: &EventSink, event: UploadEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
