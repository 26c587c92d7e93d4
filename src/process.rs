//! Whole-document processing: cache lookup, extraction, page-parallel
//! interpretation, aggregation, cache write-back.
//!
//! ## Failure containment
//!
//! A single page's interpretation failure — upstream error, unusable
//! reply, invalid record — is logged and recorded as "no record for this
//! page"; it never aborts the batch. Only document-level problems
//! (missing file, unreadable PDF) propagate as errors.
//!
//! ## Ordering
//!
//! Pages complete in whatever order the worker pool finishes them, and
//! records are appended as they arrive. Consumers never depend on list
//! order: every record carries its own 1-based page number.

use crate::cache::{CacheService, Stage};
use crate::error::IntakeError;
use crate::pipeline::extract;
use crate::pipeline::interpret::PageInterpreter;
use crate::progress::{emit, ProcessOutcome, ProgressEvent};
use crate::record::{PageText, PassportRecord, RecordSet};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Process one stored document into a [`RecordSet`].
///
/// With `force = false` a cached record set short-circuits the whole run;
/// `force = true` bypasses and overwrites both cache stages. Progress
/// events go to `events` when a channel is attached (see
/// [`crate::stream`]); the eager caller passes `None`.
///
/// A document where no page yields a usable record returns an **empty**
/// record set (not an error) and is never written to the records cache,
/// so a later attempt is not masked by a cached empty result.
pub async fn process_document(
    cache: &CacheService,
    interpreter: Arc<dyn PageInterpreter>,
    workers: usize,
    pdf_path: &Path,
    content_id: &str,
    force: bool,
    events: Option<&mpsc::Sender<ProgressEvent>>,
) -> Result<RecordSet, IntakeError> {
    // ── Cached results fast path ─────────────────────────────────────────
    if !force {
        if let Some(set) = cache.get::<RecordSet>(Stage::Records, content_id) {
            if !set.records.is_empty() {
                info!(content_id, records = set.records.len(), "serving cached records");
                emit(events, ProgressEvent::status("Loading cached results…", 50)).await;
                emit(
                    events,
                    ProgressEvent::finished(
                        "Loaded from cache",
                        ProcessOutcome::Complete {
                            records: set.records.clone(),
                            valid_pages: set.valid_pages.clone(),
                            from_cache: true,
                        },
                    ),
                )
                .await;
                return Ok(set);
            }
        }
    }

    emit(events, ProgressEvent::status("Initializing…", 0)).await;

    // ── Page text (text-stage cache, then extractor) ─────────────────────
    let text = load_page_text(cache, pdf_path, content_id, force).await?;
    emit(
        events,
        ProgressEvent::status(
            format!(
                "Extracted text from {} of {} pages",
                text.len(),
                text.total_pages
            ),
            20,
        ),
    )
    .await;

    if text.is_empty() {
        info!(content_id, "document has no extractable pages");
        emit(
            events,
            ProgressEvent::finished(
                "No extractable pages in document",
                ProcessOutcome::Failed {
                    error: "no page yielded any text".into(),
                },
            ),
        )
        .await;
        return Ok(RecordSet {
            content_id: content_id.to_string(),
            total_pages: text.total_pages,
            ..Default::default()
        });
    }

    // ── Page-parallel interpretation ─────────────────────────────────────
    let jobs: Vec<(usize, String)> = text
        .pages
        .iter()
        .map(|(idx, page)| (*idx, page.clone()))
        .collect();
    let total = jobs.len();

    let mut outcomes = stream::iter(jobs.into_iter().map(|(idx, page)| {
        let interpreter = Arc::clone(&interpreter);
        async move {
            let record = interpret_page(interpreter.as_ref(), idx, &page).await;
            (idx, record)
        }
    }))
    .buffer_unordered(workers);

    let mut records: Vec<PassportRecord> = Vec::new();
    let mut valid_pages: Vec<usize> = Vec::new();
    let mut completed = 0usize;

    while let Some((idx, record)) = outcomes.next().await {
        completed += 1;
        let progress = 20 + (completed * 70 / total) as u8;
        emit(
            events,
            ProgressEvent::status(
                format!("Interpreted page {} ({completed}/{total})", idx + 1),
                progress,
            ),
        )
        .await;

        if let Some(record) = record {
            valid_pages.push(record.page_number);
            records.push(record);
        }
    }

    if records.is_empty() {
        warn!(content_id, "no page yielded a valid record");
        emit(
            events,
            ProgressEvent::finished(
                "No usable passport records found",
                ProcessOutcome::Failed {
                    error: "no page yielded a complete passport record".into(),
                },
            ),
        )
        .await;
        return Ok(RecordSet {
            content_id: content_id.to_string(),
            total_pages: text.total_pages,
            ..Default::default()
        });
    }

    // ── Aggregate and write back ─────────────────────────────────────────
    let set = RecordSet {
        content_id: content_id.to_string(),
        total_pages: text.total_pages,
        records,
        valid_pages,
    };
    cache.set(Stage::Records, content_id, &set);

    info!(
        content_id,
        records = set.records.len(),
        total_pages = set.total_pages,
        "processing complete"
    );
    emit(
        events,
        ProgressEvent::finished(
            "Processing complete",
            ProcessOutcome::Complete {
                records: set.records.clone(),
                valid_pages: set.valid_pages.clone(),
                from_cache: false,
            },
        ),
    )
    .await;

    Ok(set)
}

/// Text-stage lookup with extraction on miss (or on `force`).
pub(crate) async fn load_page_text(
    cache: &CacheService,
    pdf_path: &Path,
    content_id: &str,
    force: bool,
) -> Result<PageText, IntakeError> {
    if !force {
        if let Some(text) = cache.get::<PageText>(Stage::PageText, content_id) {
            debug!(content_id, "page text served from cache");
            return Ok(text);
        }
    }

    let text = extract::extract_pages(pdf_path, content_id).await?;
    cache.set(Stage::PageText, content_id, &text);
    Ok(text)
}

/// Interpret and validate a single page; any failure yields `None`.
async fn interpret_page(
    interpreter: &dyn PageInterpreter,
    page_index: usize,
    page_text: &str,
) -> Option<PassportRecord> {
    let page_number = page_index + 1;
    match interpreter.interpret(page_text).await {
        Ok(Some(fields)) => match fields.validate(page_number) {
            Ok(record) => {
                debug!(page = page_number, passport = %record.passport_number, "page yielded a valid record");
                Some(record)
            }
            Err(e) => {
                warn!(page = page_number, error = %e, "discarding incomplete record");
                None
            }
        },
        Ok(None) => {
            debug!(page = page_number, "no actionable content on page");
            None
        }
        Err(e) => {
            warn!(page = page_number, error = %e, "page interpretation failed");
            None
        }
    }
}
