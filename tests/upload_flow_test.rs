use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    routing::{post, put},
};
use presigned_upload::client::progress::ProgressSignal;
use presigned_upload::client::{
    AuthorizationToken, BatchOrchestrator, BatchOutcome, FileDescriptor, HttpTokenIssuer,
    HttpTransferExecutor, ProgressReporter, SelectionGuard, TokenIssuer, TransferExecutor,
    UploadError, UploadEvent, UploadedFile,
};
use presigned_upload::config::{IssuerConfig, UploadConfig};
use presigned_upload::services::signer::UrlSigner;
use presigned_upload::{AppState, create_app};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Signs URLs that point back at the in-process storage routes.
struct LocalSigner {
    base: String,
}

#[async_trait]
impl UrlSigner for LocalSigner {
    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        expires_in: Duration,
    ) -> anyhow::Result<String> {
        Ok(format!(
            "{}/storage/{}?X-Amz-Expires={}",
            self.base,
            key,
            expires_in.as_secs()
        ))
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> anyhow::Result<String> {
        Ok(format!(
            "{}/storage/{}?bucket={}&X-Amz-Expires={}",
            self.base,
            key,
            bucket,
            expires_in.as_secs()
        ))
    }

    fn bucket(&self) -> &str {
        "local"
    }
}

#[derive(Clone, Default)]
struct ObjectStore {
    objects: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
    puts: Arc<AtomicUsize>,
}

/// Accepts every write except keys starting with `fail-`.
async fn put_object(
    State(store): State<ObjectStore>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    store.puts.fetch_add(1, Ordering::SeqCst);
    if key.starts_with("fail-") {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    store
        .objects
        .lock()
        .unwrap()
        .insert(key, (content_type, body.to_vec()));
    StatusCode::OK
}

async fn serve(app: Router, listener: tokio::net::TcpListener) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

/// Starts the issuer and a fake storage endpoint on one ephemeral port.
async fn spawn_backend(store: ObjectStore) -> String {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("presigned_upload=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let issuer = create_app(AppState {
        signer: Arc::new(LocalSigner { base: base.clone() }),
        config: IssuerConfig::default(),
    });
    let storage = Router::new()
        .route("/storage/:key", put(put_object))
        .with_state(store);

    serve(issuer.merge(storage), listener).await;
    base
}

/// Starts an issuer that always answers with the given body.
async fn spawn_canned_issuer(body: Value) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = Router::new().route(
        "/api/s3/signed-url",
        post(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    );
    serve(app, listener).await;
    base
}

fn orchestrator(base: &str) -> BatchOrchestrator {
    BatchOrchestrator::from_config(&UploadConfig {
        issuer_url: base.to_string(),
        ..UploadConfig::default()
    })
    .unwrap()
}

fn text_file(name: &str, len: usize) -> FileDescriptor {
    FileDescriptor::from_bytes(name, "text/plain", vec![b'x'; len])
}

fn drain(mut rx: mpsc::UnboundedReceiver<UploadEvent>) -> Vec<UploadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_batch_of_three_reaches_storage() {
    let store = ObjectStore::default();
    let base = spawn_backend(store.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("orders.csv");
    tokio::fs::write(&csv_path, vec![b'1'; 150 * 1024]).await.unwrap();

    let mut guard = SelectionGuard::new(5);
    guard
        .admit_all(vec![
            text_file("invoice.txt", 200 * 1024),
            FileDescriptor::from_path(&csv_path).await.unwrap(),
            text_file("picks.txt", 10),
        ])
        .unwrap();

    let orchestrator = orchestrator(&base);
    let (tx, rx) = mpsc::unbounded_channel();
    let outcome = orchestrator
        .run_with_events(guard.take(), Some(tx))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        BatchOutcome::Succeeded(vec![
            UploadedFile {
                name: "invoice.txt".to_string(),
                size_bytes: 200 * 1024
            },
            UploadedFile {
                name: "orders.csv".to_string(),
                size_bytes: 150 * 1024
            },
            UploadedFile {
                name: "picks.txt".to_string(),
                size_bytes: 10
            },
        ])
    );

    let objects = store.objects.lock().unwrap();
    assert_eq!(objects.len(), 3);
    assert_eq!(objects["invoice.txt"].0, "text/plain");
    assert_eq!(objects["invoice.txt"].1.len(), 200 * 1024);
    assert_eq!(objects["orders.csv"].0, "application/octet-stream");
    assert_eq!(objects["orders.csv"].1.len(), 150 * 1024);
    drop(objects);

    let snapshots: Vec<Vec<u8>> = drain(rx)
        .into_iter()
        .filter_map(|e| match e {
            UploadEvent::Progress(p) => Some(p),
            UploadEvent::Began { .. } => None,
        })
        .collect();
    assert_eq!(snapshots.first().unwrap(), &vec![0, 0, 0]);
    assert!(snapshots.last().unwrap().is_empty());
    assert_eq!(snapshots[snapshots.len() - 2], vec![100, 100, 100]);
    for window in snapshots[..snapshots.len() - 1].windows(2) {
        for slot in 0..3 {
            assert!(window[1][slot] >= window[0][slot]);
        }
    }
}

#[tokio::test]
async fn test_empty_file_reaches_full_progress() {
    let store = ObjectStore::default();
    let base = spawn_backend(store.clone()).await;

    let (tx, rx) = mpsc::unbounded_channel();
    let outcome = orchestrator(&base)
        .run_with_events(
            vec![text_file("empty.txt", 0), text_file("body.txt", 4096)],
            Some(tx),
        )
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(store.objects.lock().unwrap()["empty.txt"].1.len(), 0);

    let snapshots: Vec<Vec<u8>> = drain(rx)
        .into_iter()
        .filter_map(|e| match e {
            UploadEvent::Progress(p) => Some(p),
            UploadEvent::Began { .. } => None,
        })
        .collect();
    assert!(snapshots.last().unwrap().is_empty());
    assert_eq!(snapshots[snapshots.len() - 2], vec![100, 100]);
}

#[tokio::test]
async fn test_failed_write_fails_batch_after_all_settle() {
    let store = ObjectStore::default();
    let base = spawn_backend(store.clone()).await;

    let outcome = orchestrator(&base)
        .run(vec![
            text_file("a.txt", 1024),
            text_file("fail-b.txt", 1024),
            text_file("c.txt", 1024),
        ])
        .await
        .unwrap();

    assert_eq!(store.puts.load(Ordering::SeqCst), 3);
    match outcome {
        BatchOutcome::Failed { error, outcomes } => {
            assert_eq!(error.file_name(), Some("fail-b.txt"));
            assert!(outcomes[0].is_ok());
            assert!(matches!(
                &outcomes[1],
                Err(UploadError::TransferFailed { reason, .. }) if reason.contains("500")
            ));
            assert!(outcomes[2].is_ok());
        }
        other => panic!("expected failure, got {:?}", other),
    }
    let objects = store.objects.lock().unwrap();
    assert!(objects.contains_key("a.txt"));
    assert!(objects.contains_key("c.txt"));
}

#[tokio::test]
async fn test_short_url_list_is_issuance_failure() {
    let store = ObjectStore::default();
    let storage_base = spawn_backend(store.clone()).await;
    let issuer_base = spawn_canned_issuer(json!({
        "signedURLs": [
            format!("{}/storage/a.txt", storage_base),
            format!("{}/storage/b.txt", storage_base)
        ]
    }))
    .await;

    let orchestrator = orchestrator(&issuer_base);
    let outcome = orchestrator
        .run(vec![
            text_file("a.txt", 10),
            text_file("b.txt", 10),
            text_file("c.txt", 10),
        ])
        .await
        .unwrap();

    match outcome {
        BatchOutcome::Failed { error, outcomes } => {
            assert!(matches!(error, UploadError::IssuanceFailure(_)));
            assert!(outcomes.is_empty());
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn test_malformed_issuer_response() {
    let base = spawn_canned_issuer(json!({"urls": ["http://example.com/a"]})).await;
    let issuer = HttpTokenIssuer::new(
        reqwest::Client::new(),
        base,
        chrono::Duration::seconds(3600),
    );

    let err = issuer
        .request_tokens(&[presigned_upload::client::AuthorizationRequest {
            name: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::IssuanceFailure(msg) if msg.contains("malformed")));
}

#[tokio::test]
async fn test_issuer_client_error_carries_message() {
    let base = spawn_backend(ObjectStore::default()).await;
    let issuer = HttpTokenIssuer::new(
        reqwest::Client::new(),
        format!("{}/", base),
        chrono::Duration::seconds(3600),
    );

    let requests: Vec<_> = (0..6)
        .map(|i| presigned_upload::client::AuthorizationRequest {
            name: format!("{i}.txt"),
            mime_type: "text/plain".to_string(),
        })
        .collect();
    let err = issuer.request_tokens(&requests).await.unwrap_err();
    assert!(matches!(err, UploadError::IssuanceFailure(msg) if msg.contains("5 files at a time")));
}

#[tokio::test]
async fn test_read_token_round_trip() {
    let base = spawn_backend(ObjectStore::default()).await;
    let issuer = HttpTokenIssuer::new(
        reqwest::Client::new(),
        base.clone(),
        chrono::Duration::seconds(3600),
    );

    let token = issuer
        .request_read_token("archive", "summary.csv")
        .await
        .unwrap();
    assert!(!token.is_expired());
    assert_eq!(token.url.path(), "/storage/summary.csv");
    assert!(token.url.query().unwrap().contains("bucket=archive"));

    let err = issuer.request_read_token("archive", "").await.unwrap_err();
    assert!(matches!(err, UploadError::IssuanceFailure(_)));
}

#[tokio::test]
async fn test_expired_token_is_not_used() {
    let store = ObjectStore::default();
    let base = spawn_backend(store.clone()).await;
    let token = AuthorizationToken::issued_now(
        format!("{}/storage/late.txt", base).parse().unwrap(),
        chrono::Duration::seconds(-5),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let executor = HttpTransferExecutor::new(reqwest::Client::new());
    let outcome = executor
        .transfer(&token, &text_file("late.txt", 10), ProgressReporter::new(0, tx))
        .await;

    assert!(matches!(outcome, Err(UploadError::TransferFailed { .. })));
    assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    assert!(!matches!(rx.try_recv(), Ok(ProgressSignal::Began { .. })));
}
