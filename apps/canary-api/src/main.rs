use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use canary_protocol::{Category, Codec, Finding, Metrics, StoreBackend};
use canary_runtime::{
    FrameSource, Ingestor, ProcessCodec, ProcessCodecConfig, RoomRegistry, ingest_channels,
};
use canary_store::{CategorizedStore, FileStoreBackend, FlushConfig, Flusher, Page};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tokio::io::BufReader;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "canary-api")]
#[command(about = "Codec round-trip canary: ingests protocol frames from stdin and serves findings")]
struct Cli {
    /// Store document to load at startup and flush to.
    #[arg(long, env = "CANARY_DB", default_value = "db.json")]
    db: PathBuf,
    #[arg(long, env = "HTTP_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
    /// Built dashboard served for every non-API path.
    #[arg(long, env = "STATIC_ASSETS", default_value = "./canary-client/build")]
    static_assets: PathBuf,
    /// Account the upstream session is logged in as, reported by /api/metadata.
    #[arg(long, env = "CANARY_USERNAME", default_value = "")]
    username: String,
    /// Executable that speaks the JSON-lines codec protocol.
    #[arg(long, env = "CANARY_CODEC_COMMAND")]
    codec_command: String,
    #[arg(long = "codec-arg", allow_hyphen_values = true)]
    codec_args: Vec<String>,
    #[arg(long, default_value_t = 5_000)]
    codec_timeout_ms: u64,
    #[arg(long, default_value_t = 60)]
    flush_interval_secs: u64,
    #[arg(long, default_value_t = 1_024)]
    channel_capacity: usize,
}

#[derive(Clone)]
struct AppState {
    store: Arc<CategorizedStore>,
    rooms: RoomRegistry,
    metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    start_time: DateTime<Utc>,
    username: String,
}

#[derive(Debug, Default)]
struct LogsQuery {
    category: Option<String>,
    from: Option<String>,
}

impl LogsQuery {
    /// A repeated parameter keeps its first value.
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "type" => {
                    query.category.get_or_insert(value);
                }
                "from" => {
                    query.from.get_or_insert(value);
                }
                _ => {}
            }
        }
        query
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let start_time = Utc::now();

    let backend: Arc<dyn StoreBackend> = Arc::new(FileStoreBackend::new(&cli.db));
    let document = backend
        .load()
        .await
        .with_context(|| format!("failed loading store document {}", cli.db.display()))?;
    info!(
        db = %cli.db.display(),
        total_messages = document.total_messages,
        "store document loaded"
    );
    let store = Arc::new(CategorizedStore::new(document));

    let codec_config = ProcessCodecConfig::new(&cli.codec_command)
        .args(cli.codec_args.clone())
        .call_timeout(Duration::from_millis(cli.codec_timeout_ms));
    let codec: Arc<dyn Codec> = Arc::new(
        ProcessCodec::spawn(codec_config)
            .await
            .context("failed starting codec process")?,
    );

    let rooms = RoomRegistry::default();
    let (senders, receivers) = ingest_channels(cli.channel_capacity);
    let (ingest_shutdown_tx, ingest_shutdown_rx) = watch::channel(false);
    let (flush_shutdown_tx, flush_shutdown_rx) = watch::channel(false);

    let ingest_task = tokio::spawn(
        Ingestor::new(store.clone(), codec).run(receivers, ingest_shutdown_rx),
    );
    let flush_task = tokio::spawn(
        Flusher::new(
            store.clone(),
            backend,
            FlushConfig {
                interval: Duration::from_secs(cli.flush_interval_secs.max(1)),
                ..FlushConfig::default()
            },
        )
        .run(flush_shutdown_rx),
    );
    let source_task = tokio::spawn(
        FrameSource::new(BufReader::new(tokio::io::stdin()), rooms.clone(), senders).run(),
    );

    let state = AppState {
        store,
        rooms,
        metadata: Metadata {
            start_time,
            username: cli.username.clone(),
        },
    };
    let app = router(state, &cli.static_assets);

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed binding {}", cli.listen))?;
    info!(
        listen = %cli.listen,
        static_assets = %cli.static_assets.display(),
        "canary-api listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    source_task.abort();
    let _ = ingest_shutdown_tx.send(true);
    match ingest_task.await {
        Ok(stats) => info!(lines = stats.lines, findings = stats.findings, "ingestion drained"),
        Err(error) => warn!(%error, "ingestion task stopped abnormally"),
    }
    let _ = flush_shutdown_tx.send(true);
    if let Err(error) = flush_task.await {
        warn!(%error, "flush task stopped abnormally");
    }

    Ok(())
}

fn router(state: AppState, static_assets: &std::path::Path) -> Router {
    let api = Router::new()
        .route("/metadata", get(metadata))
        .route("/metrics", get(metrics))
        .route("/rooms", get(rooms))
        .route("/logs", get(logs));

    let assets =
        ServeDir::new(static_assets).fallback(ServeFile::new(static_assets.join("index.html")));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .fallback_service(assets)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "canary-api"
    }))
}

async fn metadata(State(state): State<AppState>) -> Json<Metadata> {
    Json(state.metadata)
}

async fn metrics(State(state): State<AppState>) -> Json<Metrics> {
    Json(state.store.metrics())
}

async fn rooms(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.rooms.list())
}

async fn logs(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> ApiResult<Json<Page<Finding>>> {
    let Query(pairs) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    Ok(Json(read_logs(&state.store, &LogsQuery::from_pairs(pairs))))
}

/// Unknown or missing `type` yields an empty page; a `from` that is not a
/// non-negative integer is ignored.
fn read_logs(store: &CategorizedStore, query: &LogsQuery) -> Page<Finding> {
    let Some(category) = query
        .category
        .as_deref()
        .and_then(|category| category.parse::<Category>().ok())
    else {
        return Page::empty();
    };
    let from = query
        .from
        .as_deref()
        .and_then(|from| from.trim().parse::<usize>().ok());
    store.read(category, from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
