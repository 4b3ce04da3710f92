use anyhow::anyhow;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use presigned_upload::client::{
    BatchOrchestrator, BatchOutcome, FileDescriptor, SelectionGuard, UploadEvent,
};
use presigned_upload::config::{IssuerConfig, UploadConfig};
use presigned_upload::infrastructure::storage;
use presigned_upload::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the signed URL issuer
    Serve {
        /// Port for the API server (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Upload files directly to storage in one batch
    Upload {
        /// Issuer base URL (overrides ISSUER_URL)
        #[arg(long)]
        issuer_url: Option<String>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print a download URL for one stored object
    Link {
        bucket: String,
        key: String,

        /// Issuer base URL (overrides ISSUER_URL)
        #[arg(long)]
        issuer_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presigned_upload=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Command::Serve { port } => serve(port).await,
        Command::Upload { issuer_url, files } => upload(issuer_url, files).await,
        Command::Link {
            bucket,
            key,
            issuer_url,
        } => link(issuer_url, bucket, key).await,
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut config = IssuerConfig::from_env();
    if let Some(port) = port {
        config.port = port;
    }
    info!(
        "🚀 Starting signed URL issuer: bucket={}, ttl={}s, max batch={}",
        config.bucket, config.signed_url_ttl_secs, config.max_batch_size
    );

    let signer = storage::setup_storage(&config).await?;
    let state = AppState {
        signer,
        config: config.clone(),
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Issuer listening on: http://0.0.0.0:{}", config.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Issuer shut down gracefully.");
    Ok(())
}

async fn upload(issuer_url: Option<String>, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    let mut config = UploadConfig::from_env();
    if let Some(url) = issuer_url {
        config.issuer_url = url;
    }

    let mut candidates = Vec::with_capacity(paths.len());
    for path in &paths {
        candidates.push(FileDescriptor::from_path(path).await?);
    }

    let mut guard = SelectionGuard::new(config.max_batch_size);
    let added = guard.admit_all(candidates)?;
    if added < paths.len() {
        warn!("Skipped {} duplicate file names", paths.len() - added);
    }

    let orchestrator = BatchOrchestrator::from_config(&config)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                UploadEvent::Began { name, .. } => info!("⬆️  Upload begin: {}", name),
                UploadEvent::Progress(snapshot) if !snapshot.is_empty() => {
                    let line: Vec<String> = snapshot.iter().map(|p| format!("{:>3}%", p)).collect();
                    info!("📊 {}", line.join(" "));
                }
                UploadEvent::Progress(_) => {}
            }
        }
    });

    let outcome = orchestrator
        .run_with_events(guard.take(), Some(tx))
        .await?;
    let _ = printer.await;

    match outcome {
        BatchOutcome::Succeeded(files) => {
            for file in &files {
                info!("✅ {} ({} bytes)", file.name, file.size_bytes);
            }
            info!("Upload complete");
            Ok(())
        }
        BatchOutcome::Failed { error, outcomes } => {
            for failed in outcomes.iter().filter_map(|o| o.as_ref().err()) {
                error!("❌ {}", failed);
            }
            Err(anyhow!(error))
        }
    }
}

async fn link(issuer_url: Option<String>, bucket: String, key: String) -> anyhow::Result<()> {
    let mut config = UploadConfig::from_env();
    if let Some(url) = issuer_url {
        config.issuer_url = url;
    }

    let orchestrator = BatchOrchestrator::from_config(&config)?;
    let token = orchestrator
        .issuer()
        .request_read_token(&bucket, &key)
        .await?;
    info!("🔗 {} valid until {}", key, token.expires_at);
    println!("{}", token.url);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
