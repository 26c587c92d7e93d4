//! Streaming processing API: progress events as the document is worked.
//!
//! ## Why stream?
//!
//! A 30-page batch takes tens of seconds against the upstream API. The
//! streaming API lets callers surface live progress — a terminal bar, an
//! incremental HTTP response — instead of blocking until the whole batch
//! finishes. The final event always carries the outcome, so consumers
//! need no side channel for the result.
//!
//! Use [`crate::process::process_document`] directly when only the final
//! [`crate::record::RecordSet`] matters.

use crate::cache::CacheService;
use crate::pipeline::interpret::PageInterpreter;
use crate::process::process_document;
use crate::progress::{ProcessOutcome, ProgressEvent};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

/// A boxed stream of progress events; the last one carries the outcome.
pub type EventStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

/// Process a document in the background, streaming progress events.
///
/// Events arrive in emission order (completion order for page events, not
/// page order). The stream ends after the terminal event: either the
/// pipeline's own outcome, or a [`ProcessOutcome::Failed`] wrapping a
/// fatal error (missing file, unreadable document, …).
pub fn process_document_stream(
    cache: Arc<CacheService>,
    interpreter: Arc<dyn PageInterpreter>,
    workers: usize,
    pdf_path: PathBuf,
    content_id: String,
    force: bool,
) -> EventStream {
    let (tx, rx) = mpsc::channel::<ProgressEvent>(32);

    tokio::spawn(async move {
        let result = process_document(
            &cache,
            interpreter,
            workers,
            &pdf_path,
            &content_id,
            force,
            Some(&tx),
        )
        .await;

        // The pipeline emits its own terminal event on every non-error
        // path; a fatal error is converted into one here so the stream
        // always ends with an outcome.
        if let Err(e) = result {
            tracing::error!(content_id, error = %e, "processing failed");
            let _ = tx
                .send(ProgressEvent::finished(
                    "Processing failed",
                    ProcessOutcome::Failed {
                        error: e.to_string(),
                    },
                ))
                .await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
