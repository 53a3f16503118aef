use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use canary_protocol::StoreBackend;
use canary_runtime::{ProcessCodec, ProcessCodecConfig, reclassify};
use canary_store::{CategorizedStore, FileStoreBackend};
use clap::Parser;
use tracing::info;

/// Run only while the daemon is stopped: nothing locks the document.
#[derive(Debug, Parser)]
#[command(name = "canary-rerun")]
#[command(about = "Reclassify every stored canary finding against the current codec")]
struct Cli {
    #[arg(long, env = "CANARY_DB", default_value = "db.json")]
    db: PathBuf,
    #[arg(long, env = "CANARY_CODEC_COMMAND")]
    codec_command: String,
    #[arg(long = "codec-arg", allow_hyphen_values = true)]
    codec_args: Vec<String>,
    #[arg(long, default_value_t = 5_000)]
    codec_timeout_ms: u64,
    /// Report what would change without writing the document back.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .compact()
        .init();

    let cli = Cli::parse();

    let backend = FileStoreBackend::new(&cli.db);
    let document = backend
        .load()
        .await
        .with_context(|| format!("failed loading store document {}", cli.db.display()))?;
    info!(
        db = %backend.path().display(),
        total_messages = document.total_messages,
        "store document loaded"
    );
    let store = CategorizedStore::new(document);

    let codec = ProcessCodec::spawn(
        ProcessCodecConfig::new(&cli.codec_command)
            .args(cli.codec_args.clone())
            .call_timeout(Duration::from_millis(cli.codec_timeout_ms)),
    )
    .await
    .context("failed starting codec process")?;

    let report = reclassify(&store, &codec).await;

    if cli.dry_run {
        info!("dry run; store document left untouched");
    } else {
        let (_, document) = store.snapshot();
        backend
            .save(&document)
            .await
            .with_context(|| format!("failed saving store document {}", cli.db.display()))?;
        info!(db = %backend.path().display(), "store document rewritten");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
