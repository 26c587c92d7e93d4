//! CLI binary for passcheck.
//!
//! A thin shim over the library crate: maps CLI flags to [`IntakeConfig`],
//! drives the intake service, and renders the progress stream.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use passcheck::{
    compare, ChatInterpreter, IntakeConfig, IntakeError, IntakeService, ManifestRecord,
    PageInterpreter, PassportFields, PassportRecord, ProcessOutcome, RecordSet,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store a passport PDF (deduplicated by content)
  passcheck ingest batch_07.pdf

  # Parse a manifest and show the mapped rows
  passcheck manifest group_list.csv

  # Interpret every page of a stored or new PDF (live progress)
  passcheck process batch_07.pdf

  # Reprocess, ignoring cached results
  passcheck process --force batch_07.pdf

  # Full check: process the PDF and reconcile against the manifest
  passcheck check --manifest group_list.csv batch_07.pdf

  # Structured output for scripting
  passcheck process --json batch_07.pdf > records.json

ENVIRONMENT VARIABLES:
  PASSCHECK_API_KEY    Bearer token for the extraction service
  PASSCHECK_BOT_ID     Bot id the extraction service routes queries to
  PASSCHECK_API_URL    Override the extraction endpoint URL
  PASSCHECK_DATA_DIR   Data directory (default ./data)
"#;

/// Passport document intake: extract, interpret, reconcile.
#[derive(Parser, Debug)]
#[command(
    name = "passcheck",
    version,
    about = "Passport document intake: extract, interpret, reconcile",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Data directory for stored uploads and the durable cache.
    #[arg(long, global = true, env = "PASSCHECK_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Number of concurrent interpreter calls per document.
    #[arg(long, global = true, env = "PASSCHECK_WORKERS", default_value_t = 6)]
    workers: usize,

    /// Per-interpretation-call timeout in seconds.
    #[arg(long, global = true, env = "PASSCHECK_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PASSCHECK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PASSCHECK_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a passport PDF, printing its content id.
    Ingest {
        /// Path to the PDF file.
        file: PathBuf,
    },
    /// Parse a manifest CSV and print the mapped rows.
    Manifest {
        /// Path to the manifest file.
        file: PathBuf,
        /// Print rows as JSON instead of a summary table.
        #[arg(long)]
        json: bool,
    },
    /// Interpret every page of a passport PDF into structured records.
    Process {
        /// Path to the PDF file (ingested automatically).
        file: PathBuf,
        /// Ignore cached results and reprocess from scratch.
        #[arg(long)]
        force: bool,
        /// Print the record set as JSON instead of a table.
        #[arg(long)]
        json: bool,
        /// Disable the progress bar.
        #[arg(long)]
        no_progress: bool,
    },
    /// Process a PDF and reconcile the records against a manifest.
    Check {
        /// Path to the PDF file.
        file: PathBuf,
        /// Path to the manifest file.
        #[arg(long)]
        manifest: PathBuf,
        /// Ignore cached results and reprocess from scratch.
        #[arg(long)]
        force: bool,
    },
    /// Remove every cache entry (stored uploads are kept).
    PurgeCache,
}

/// Interpreter for subcommands that never call the upstream; processing
/// with it fails fast instead of hanging on a misconfigured endpoint.
struct OfflineInterpreter;

#[async_trait]
impl PageInterpreter for OfflineInterpreter {
    async fn interpret(&self, _page_text: &str) -> Result<Option<PassportFields>, IntakeError> {
        Err(IntakeError::ServiceUnavailable {
            detail: "this command does not use the extraction service".into(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = IntakeConfig::builder()
        .data_dir(&cli.data_dir)
        .workers(cli.workers)
        .api_timeout_secs(cli.api_timeout)
        .build()
        .context("Invalid configuration")?;

    match cli.command {
        Command::Ingest { file } => ingest(config, &file),
        Command::Manifest { file, json } => manifest(config, &file, json),
        Command::Process {
            file,
            force,
            json,
            no_progress,
        } => {
            let show_progress = !cli.quiet && !no_progress && !json;
            process(config, &file, force, json, show_progress).await
        }
        Command::Check {
            file,
            manifest,
            force,
        } => check(config, &file, &manifest, force).await,
        Command::PurgeCache => purge(config),
    }
}

fn offline_service(config: IntakeConfig) -> Result<IntakeService> {
    IntakeService::new(config, Arc::new(OfflineInterpreter)).context("Failed to open data directory")
}

async fn live_service(config: IntakeConfig) -> Result<IntakeService> {
    let interpreter = ChatInterpreter::connect(&config)
        .await
        .context("Extraction service is not reachable")?;
    IntakeService::new(config, Arc::new(interpreter)).context("Failed to open data directory")
}

// ── Subcommands ──────────────────────────────────────────────────────────────

fn ingest(config: IntakeConfig, file: &PathBuf) -> Result<()> {
    let service = offline_service(config)?;
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {file:?}"))?;
    let stored = service.ingest_document(&file.to_string_lossy(), &bytes)?;

    println!(
        "{} {}  {}",
        if stored.is_new { green("✔") } else { cyan("≡") },
        bold(&stored.content_id),
        if stored.is_new {
            "stored".to_string()
        } else {
            dim("already stored (deduplicated)")
        },
    );
    Ok(())
}

fn manifest(config: IntakeConfig, file: &PathBuf, json: bool) -> Result<()> {
    let service = offline_service(config)?;
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {file:?}"))?;
    let (content_id, records) = service.ingest_manifest(&bytes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    eprintln!("{}  {} rows", dim(&content_id), bold(&records.len().to_string()));
    for record in &records {
        println!(
            "{:<10} {:<10} {:<16} {:<12} {} {}  {}",
            record.index,
            record.passport_number,
            record.surname,
            record.given_name,
            record.gender,
            record.birth_date,
            dim(&record.chinese_name),
        );
    }
    Ok(())
}

async fn process(
    config: IntakeConfig,
    file: &PathBuf,
    force: bool,
    json: bool,
    show_progress: bool,
) -> Result<()> {
    let service = live_service(config).await?;
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {file:?}"))?;
    let stored = service.ingest_document(&file.to_string_lossy(), &bytes)?;

    if json {
        // Structured output wants the whole set; skip the event stream.
        let set = service.process(&stored.content_id, force).await?;
        if set.records.is_empty() {
            anyhow::bail!("no usable passport records in {}", file.display());
        }
        println!("{}", serde_json::to_string_pretty(&set)?);
        return Ok(());
    }

    let bar = if show_progress {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    let mut stream = service.process_stream(&stored.content_id, force);
    let mut outcome = None;
    while let Some(event) = stream.next().await {
        if let Some(ref bar) = bar {
            bar.set_position(event.progress as u64);
            bar.set_message(event.status.clone());
        }
        if event.outcome.is_some() {
            outcome = event.outcome;
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    match outcome {
        Some(ProcessOutcome::Complete {
            records,
            valid_pages,
            from_cache,
        }) => {
            eprintln!(
                "{} {} records from pages {:?}{}",
                green("✔"),
                bold(&records.len().to_string()),
                valid_pages,
                if from_cache { dim("  (cached)") } else { String::new() },
            );
            for record in &records {
                print_record(record);
            }
            Ok(())
        }
        Some(ProcessOutcome::Failed { error }) => {
            anyhow::bail!("{error}");
        }
        None => anyhow::bail!("processing ended without a result"),
    }
}

async fn check(config: IntakeConfig, file: &PathBuf, manifest: &PathBuf, force: bool) -> Result<()> {
    let service = live_service(config).await?;

    let manifest_bytes =
        std::fs::read(manifest).with_context(|| format!("Failed to read {manifest:?}"))?;
    let (_, rows) = service.ingest_manifest(&manifest_bytes)?;

    let pdf_bytes = std::fs::read(file).with_context(|| format!("Failed to read {file:?}"))?;
    let stored = service.ingest_document(&file.to_string_lossy(), &pdf_bytes)?;
    let set = service.process(&stored.content_id, force).await?;

    if set.records.is_empty() {
        anyhow::bail!("no usable passport records in {}", file.display());
    }

    let mut clean = 0usize;
    let mut flagged = 0usize;
    let mut unmatched = 0usize;

    for row in &rows {
        let Some(record) = find_record(&set, row) else {
            unmatched += 1;
            println!(
                "{} {:<10} {}  {}",
                cyan("?"),
                row.index,
                row.passport_number,
                dim("no matching page in document"),
            );
            continue;
        };

        let report = compare(row, record);
        if report.errors.is_empty() {
            clean += 1;
            println!(
                "{} {:<10} {}  {}",
                green("✓"),
                row.index,
                record.passport_number,
                dim(&format!("page {}", record.page_number)),
            );
        } else {
            flagged += 1;
            println!(
                "{} {:<10} {}  {}",
                red("✗"),
                row.index,
                record.passport_number,
                dim(&format!("page {}", record.page_number)),
            );
            for mismatch in &report.errors {
                println!(
                    "    {}: manifest {} ≠ document {}",
                    mismatch.field,
                    bold(&mismatch.manifest),
                    bold(&mismatch.extracted),
                );
            }
        }
    }

    eprintln!(
        "\n{} {} clean  {} flagged  {} unmatched  ({} rows, {} records)",
        if flagged == 0 { green("✔") } else { red("✘") },
        clean,
        flagged,
        unmatched,
        rows.len(),
        set.records.len(),
    );

    if flagged > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn purge(config: IntakeConfig) -> Result<()> {
    let service = offline_service(config)?;
    let removed = service.purge_cache();
    eprintln!("{} removed {removed} cache entries", green("✔"));
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Match a manifest row to a record by passport number.
fn find_record<'a>(set: &'a RecordSet, row: &ManifestRecord) -> Option<&'a PassportRecord> {
    if row.passport_number.is_empty() {
        return None;
    }
    set.records
        .iter()
        .find(|r| r.passport_number == row.passport_number)
}

fn print_record(record: &PassportRecord) {
    println!(
        "  {} {:<10} {:<16} {:<12} {} born {} expires {}{}",
        dim(&format!("p{:<3}", record.page_number)),
        record.passport_number,
        record.surname,
        record.given_name,
        record.gender,
        record.birth_date,
        record.expiry_date,
        record
            .chinese_name
            .as_deref()
            .map(|n| format!("  {}", dim(n)))
            .unwrap_or_default(),
    );
}
