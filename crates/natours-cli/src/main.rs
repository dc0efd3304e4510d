use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use natours_core::TourInput;
use natours_storage::StoreLocation;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "natours-cli")]
#[command(about = "Natours data admin: bulk import and wipe", long_about = None)]
struct Cli {
    /// Store to load into or wipe: `file://<dir>` or a directory path.
    #[arg(long, env = "DATABASE")]
    database: StoreLocation,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create every tour in a JSON array file. Nothing is kept if one fails.
    Import { file: PathBuf },
    /// Delete all tours.
    Delete,
}

/// Only a persistent store outlives this process.
fn require_persistent(location: &StoreLocation) -> Result<()> {
    if let StoreLocation::Memory = location {
        bail!("--database {location} is in-memory; import and delete need a file store");
    }
    Ok(())
}

fn read_tours(path: &Path) -> Result<Vec<TourInput>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_tours(&text).with_context(|| format!("parsing {}", path.display()))
}

fn parse_tours(text: &str) -> Result<Vec<TourInput>> {
    let value: JsonValue = serde_json::from_str(text)?;
    let JsonValue::Array(items) = value else {
        bail!("expected a JSON array of tours");
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| TourInput::from_json(item).with_context(|| format!("tour #{i}")))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    require_persistent(&cli.database)?;
    let store = cli
        .database
        .open()
        .with_context(|| format!("opening store {}", cli.database))?;
    info!(backend = store.backend(), "DB connection successful");

    match cli.cmd {
        Cmd::Import { file } => {
            let inputs = read_tours(&file)?;
            let created = store
                .create_many(inputs)
                .await
                .context("importing tours")?;
            info!(count = created.len(), file = %file.display(), "data successfully loaded");
        }
        Cmd::Delete => {
            let removed = store.delete_all().await.context("deleting tours")?;
            info!(count = removed, "data successfully deleted");
        }
    }
    Ok(())
}
