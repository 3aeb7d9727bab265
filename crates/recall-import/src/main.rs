//! `recall-import`: load OpenClaw transcripts into the archive.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::Level;

use recall_core::settings::recall_home;
use recall_import::OpenClawImporter;
use recall_store::{ArchiveStore, Database};
use recall_telemetry::{init_telemetry, LogFormat, TelemetryConfig};

const DB_FILE: &str = "archive.db";

/// Import OpenClaw session transcripts.
#[derive(Parser, Debug)]
#[command(name = "recall-import", about = "Import OpenClaw session transcripts into the recall archive")]
struct Cli {
    /// OpenClaw data directory, scanned recursively for `*.jsonl`.
    #[arg(long, value_name = "PATH")]
    openclaw: PathBuf,

    /// Recall data directory holding the archive database.
    #[arg(long, value_name = "PATH")]
    data: Option<PathBuf>,

    /// Parse and report without writing.
    #[arg(long)]
    dry_run: bool,

    /// Remove earlier OpenClaw imports before importing.
    #[arg(long)]
    purge: bool,

    /// Debug-level logging.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _telemetry = init_telemetry(&TelemetryConfig {
        log_level: if cli.verbose { Level::DEBUG } else { Level::INFO },
        format: LogFormat::Compact,
        ..TelemetryConfig::default()
    });

    if !cli.openclaw.is_dir() {
        bail!("OpenClaw directory not found: {}", cli.openclaw.display());
    }
    let data_dir = cli.data.unwrap_or_else(recall_home);
    let db_path = data_dir.join(DB_FILE);
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open archive at {}", db_path.display()))?;
    let importer = OpenClawImporter::new(ArchiveStore::new(db)).dry_run(cli.dry_run);

    if cli.purge {
        if cli.dry_run {
            println!("dry run: skipping purge of earlier imports");
        } else {
            let purged = importer.purge().context("purge failed")?;
            println!("purged {purged} previously imported session(s)");
        }
    }

    let summary = importer
        .import_dir(&cli.openclaw)
        .with_context(|| format!("import from {} failed", cli.openclaw.display()))?;
    if cli.dry_run {
        println!("dry run: nothing written");
    }
    println!("{summary}");
    Ok(())
}
