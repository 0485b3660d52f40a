//! genoref server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, starts the ingestion workers and serves the JSON and RefGet APIs
//! over HTTP.
//!
//! # Recovering after a crash
//!
//! Tasks still `queued` are re-enqueued at startup. Tasks left `running` by a
//! previous process are never resumed; mark them failed before restarting:
//!
//! ```sh
//! cargo run -p genoref-server -- --fail-running-tasks
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use genoref_api::{AppState, TaskManager};
use genoref_core::store::ReferenceStore as _;
use genoref_server::ServerConfig;
use genoref_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Reference genome and RefGet server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Mark every running task as failed and exit.
  #[arg(long)]
  fail_running_tasks: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let store = Arc::new(store);

  if cli.fail_running_tasks {
    let n = store
      .fail_running_tasks("abandoned by a previous server process".into())
      .await
      .context("failed to update running tasks")?;
    println!("marked {n} running task(s) as failed");
    return Ok(());
  }

  let http = reqwest::Client::builder()
    .user_agent(concat!("genoref/", env!("CARGO_PKG_VERSION")))
    .build()
    .context("failed to build HTTP client")?;
  let tasks = TaskManager::start(store.clone(), http.clone(), cfg.ingest_options(), cfg.ingest_workers);
  tasks.resume_queued(store.as_ref()).await.context("failed to resume queued tasks")?;

  let state = AppState { store, tasks, http, config: Arc::new(cfg.api_config()) };
  let app = genoref_api::router(state).layer(TraceLayer::new_for_http());

  let address = cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
