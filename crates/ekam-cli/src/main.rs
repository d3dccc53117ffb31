//! `ekam` — operator tooling for the Ekam identity stores.
//!
//! # Usage
//!
//! ```
//! ekam schema apply
//! ekam schema verify
//! ekam cleanup --store aadhaar            # dry run
//! ekam cleanup --store aadhaar --live
//! ekam report
//! ekam stats
//! ekam runs
//! ```
//!
//! Live migrations require exclusive access to the target store files; stop
//! the server first.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ekam_core::{
  identity::DocumentKind,
  migration::MigrationMode,
  pipeline::Ingestor,
};
use ekam_migrate::{CleanupMigrator, RunLog, SchemaMigrator, SchemaStep, StepState};
use ekam_store_sqlite::{SqliteDocumentStore, SqliteRegistry};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ekam", version, about = "Ekam identity store maintenance")]
struct Cli {
  /// Registry database file.
  #[arg(long, default_value = "registry.db")]
  registry: PathBuf,

  /// Aadhaar document store file.
  #[arg(long, default_value = "aadhaar.db")]
  aadhaar: PathBuf,

  /// PAN document store file.
  #[arg(long, default_value = "pan.db")]
  pan: PathBuf,

  /// Directory for pre-migration backups.
  #[arg(long, default_value = "backups")]
  backup_dir: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Apply or verify schema migration steps.
  Schema {
    #[command(subcommand)]
    action: SchemaAction,
  },
  /// Resolve duplicate rows in one document store.
  Cleanup {
    /// Which store to clean: `aadhaar` or `pan`.
    #[arg(long)]
    store: String,

    /// Actually delete rows. Without this flag only the plan is reported.
    #[arg(long)]
    live: bool,
  },
  /// Print per-store duplicate metrics.
  Report,
  /// Print user statistics.
  Stats,
  /// Print the migration run log, most recent first.
  Runs,
}

#[derive(Subcommand)]
enum SchemaAction {
  /// Apply one step by id, or every pending step in order.
  Apply {
    #[arg(long)]
    step: Option<String>,
  },
  /// Check which steps are applied on the configured stores.
  Verify,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let stores = vec![
    (DocumentKind::Aadhaar, cli.aadhaar.clone()),
    (DocumentKind::Pan, cli.pan.clone()),
  ];

  match cli.command {
    Command::Schema { action } => {
      let migrator =
        SchemaMigrator::new(&cli.registry, stores, &cli.backup_dir);
      match action {
        SchemaAction::Apply { step } => {
          let runs = match step {
            Some(id) => vec![migrator.apply(SchemaStep::parse(&id)?)?],
            None => migrator.apply_all()?,
          };
          print_json(&runs)?;
        }
        SchemaAction::Verify => {
          for step in SchemaStep::all() {
            let state = migrator.state(step)?;
            let marker = match state {
              StepState::Applied => "applied",
              StepState::NotApplied => "pending",
            };
            println!("{marker:<8} {}", step.id());
          }
        }
      }
    }

    Command::Cleanup { store, live } => {
      let kind = store
        .parse::<DocumentKind>()
        .map_err(|_| anyhow::anyhow!("unknown store: {store:?}"))?;
      let mode = if live {
        MigrationMode::Live
      } else {
        MigrationMode::DryRun
      };
      let migrator =
        CleanupMigrator::new(&cli.registry, stores, &cli.backup_dir);
      let run = migrator
        .run(kind, mode)
        .with_context(|| format!("cleanup of {kind} store failed"))?;
      print_json(&run)?;
    }

    Command::Report => {
      let ingestor = open_stores(&cli).await?;
      let report = ingestor.duplicate_report().await?;
      print_json(&report)?;
      if report.total_duplicate_groups() > 0 {
        bail!(
          "{} duplicate group(s) present; run `ekam cleanup`",
          report.total_duplicate_groups()
        );
      }
    }

    Command::Stats => {
      let ingestor = open_stores(&cli).await?;
      print_json(&ingestor.user_statistics().await?)?;
    }

    Command::Runs => {
      let log = RunLog::open(&cli.registry)?;
      print_json(&log.list()?)?;
    }
  }

  Ok(())
}

async fn open_stores(
  cli: &Cli,
) -> Result<Ingestor<SqliteRegistry, SqliteDocumentStore>> {
  let registry = SqliteRegistry::open(&cli.registry)
    .await
    .with_context(|| format!("failed to open registry at {:?}", cli.registry))?;
  let aadhaar = SqliteDocumentStore::open(DocumentKind::Aadhaar, &cli.aadhaar)
    .await
    .with_context(|| format!("failed to open store at {:?}", cli.aadhaar))?;
  let pan = SqliteDocumentStore::open(DocumentKind::Pan, &cli.pan)
    .await
    .with_context(|| format!("failed to open store at {:?}", cli.pan))?;
  Ok(Ingestor::new(registry, aadhaar, pan))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
