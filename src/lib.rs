//! # passcheck
//!
//! Passport document intake: extract text from scanned-passport PDFs, turn
//! each page into structured fields via a conversational extraction API,
//! and reconcile the results against an uploaded manifest.
//!
//! ## Why this crate?
//!
//! Intake batches arrive as one multi-page PDF per group plus a
//! fixed-column manifest export. Reading the passports by hand is slow and
//! error-prone; a plain text dump is not enough either, because scanned
//! text layers carry systematic OCR confusions (`0`/`O`, `1`/`I`/`l`) that
//! corrupt exactly the fields that matter. This crate owns the pipeline
//! from upload to field-level discrepancy report, and caches every
//! expensive stage so identical documents are never reprocessed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Store      content-addressed dedupe (SHA-256 prefix digest)
//!  ├─ 2. Cache      two-tier lookup (in-process map + JSON files)
//!  ├─ 3. Extract    per-page text layer (CPU-bound, spawn_blocking)
//!  ├─ 4. Interpret  concurrent chat-API calls, one per page
//!  ├─ 5. Normalize  OCR-confusion fixes, then validate completeness
//!  └─ 6. Reconcile  field-by-field comparison against the manifest
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use passcheck::{IntakeConfig, IntakeService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key and bot id resolved from PASSCHECK_API_KEY / PASSCHECK_BOT_ID
//!     let config = IntakeConfig::builder().data_dir("./data").build()?;
//!     let service = IntakeService::connect(config).await?;
//!
//!     let bytes = std::fs::read("passports.pdf")?;
//!     let stored = service.ingest_document("passports.pdf", &bytes)?;
//!     let set = service.process(&stored.content_id, false).await?;
//!     for record in &set.records {
//!         println!("page {}: {}", record.page_number, record.passport_number);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `passcheck` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! passcheck = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod reconcile;
pub mod record;
pub mod service;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{CacheService, Stage};
pub use config::{IntakeConfig, IntakeConfigBuilder};
pub use error::IntakeError;
pub use pipeline::interpret::{ChatInterpreter, PageInterpreter};
pub use process::process_document;
pub use progress::{ProcessOutcome, ProgressEvent};
pub use reconcile::compare;
pub use record::{
    DiscrepancyReport, FieldMismatch, ManifestRecord, PageText, PassportFields, PassportRecord,
    RecordSet,
};
pub use service::IntakeService;
pub use store::{ContentStore, StoredObject};
pub use stream::{process_document_stream, EventStream};
