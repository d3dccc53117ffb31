//! Ekam API server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! registry and per-kind document stores, and serves the JSON API over
//! HTTP.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use ekam_api::{AppState, ServerConfig, StorePaths};
use ekam_core::{identity::DocumentKind, pipeline::Ingestor};
use ekam_store_sqlite::{SqliteDocumentStore, SqliteRegistry};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Ekam identity unification server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
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

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("EKAM"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let registry_path = expand_tilde(&server_cfg.registry_path);
  let aadhaar_path = expand_tilde(&server_cfg.aadhaar_path);
  let pan_path = expand_tilde(&server_cfg.pan_path);

  let registry = SqliteRegistry::open(&registry_path)
    .await
    .with_context(|| format!("failed to open registry at {registry_path:?}"))?;
  let aadhaar = SqliteDocumentStore::open(DocumentKind::Aadhaar, &aadhaar_path)
    .await
    .with_context(|| format!("failed to open store at {aadhaar_path:?}"))?;
  let pan = SqliteDocumentStore::open(DocumentKind::Pan, &pan_path)
    .await
    .with_context(|| format!("failed to open store at {pan_path:?}"))?;

  let state = AppState {
    ingestor: Arc::new(Ingestor::new(registry, aadhaar, pan)),
    paths:    Arc::new(StorePaths {
      registry:   registry_path,
      aadhaar:    aadhaar_path,
      pan:        pan_path,
      backup_dir: expand_tilde(&server_cfg.backup_dir),
    }),
  };

  let app = ekam_api::api_router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
