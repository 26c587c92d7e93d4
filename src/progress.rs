//! Progress events emitted while a document moves through the pipeline.
//!
//! # Why a channel instead of callbacks?
//!
//! The transport layer (CLI today, an HTTP handler tomorrow) only needs an
//! ordered sequence of events it can frame however it likes — terminal
//! progress bar, NDJSON lines, server-sent events. Producing events on a
//! bounded `tokio::sync::mpsc` channel keeps the core ignorant of the
//! consumer's framing while preserving ordering and backpressure.

use crate::record::PassportRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One status update from the processing pipeline.
///
/// `progress` is a 0–100 percentage and never decreases within a run. The
/// terminal event carries an [`outcome`](Self::outcome); all earlier
/// events carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Human-readable description of what the pipeline is doing.
    pub status: String,
    /// Completion percentage, monotonically non-decreasing.
    pub progress: u8,
    /// Present only on the final event of a run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ProcessOutcome>,
}

impl ProgressEvent {
    pub(crate) fn status(status: impl Into<String>, progress: u8) -> Self {
        Self {
            status: status.into(),
            progress,
            outcome: None,
        }
    }

    pub(crate) fn finished(status: impl Into<String>, outcome: ProcessOutcome) -> Self {
        Self {
            status: status.into(),
            progress: 100,
            outcome: Some(outcome),
        }
    }
}

/// Terminal payload of a processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// At least one page yielded a valid record.
    Complete {
        records: Vec<PassportRecord>,
        /// 1-based page numbers that yielded valid records.
        valid_pages: Vec<usize>,
        /// True when the records were served from the cache.
        from_cache: bool,
    },
    /// No page yielded a usable record, or processing failed outright.
    Failed { error: String },
}

/// Send an event if anyone is listening.
///
/// A dropped receiver is not an error — the eager API runs the same
/// pipeline with no consumer attached.
pub(crate) async fn emit(events: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
