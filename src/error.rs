//! Error types for the passcheck library.
//!
//! One enum covers the whole intake flow, but its variants split along a
//! line that matters to callers: everything except [`IntakeError::Validation`]
//! is **fatal for the operation that raised it**, while a validation failure
//! only ever condemns a single page's record. The page pipeline downgrades
//! per-page failures (upstream call errors, invalid records) to "no record
//! for this page" with a logged warning — they never surface from the
//! top-level `process*` functions.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the passcheck library.
#[derive(Debug, Error)]
pub enum IntakeError {
    // ── Storage errors ────────────────────────────────────────────────────
    /// Filesystem I/O failed while reading or writing stored content.
    #[error("storage I/O failed at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input document was not found at the given path.
    #[error("document not found: '{path}'")]
    NotFound { path: PathBuf },

    /// The file extension does not match the expected document type.
    #[error("unsupported document type '{extension}' for '{path}' (expected .pdf)")]
    UnsupportedFormat { path: PathBuf, extension: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The document could not be parsed (corrupt or unreadable).
    #[error("failed to read document '{path}': {detail}")]
    Extraction { path: PathBuf, detail: String },

    // ── Upstream errors ───────────────────────────────────────────────────
    /// The structured-extraction service never passed its connectivity
    /// probe, so no interpretation call may be issued.
    #[error("extraction service unavailable: {detail}")]
    ServiceUnavailable { detail: String },

    /// The structured-extraction service call failed or returned an
    /// unusable payload.
    #[error("extraction service error: {detail}")]
    Upstream { detail: String },

    // ── Record errors ─────────────────────────────────────────────────────
    /// An interpreted record failed the completeness/format checks.
    ///
    /// Raised by [`crate::record::PassportFields::validate`]; the page
    /// pipeline catches it and discards the record rather than aborting.
    #[error("invalid record: {field} {detail}")]
    Validation {
        field: &'static str,
        detail: String,
    },

    /// An upload exceeds the configured size limit.
    #[error("upload of {actual} bytes exceeds the {limit}-byte limit")]
    TooLarge { limit: u64, actual: u64 },

    // ── Manifest errors ───────────────────────────────────────────────────
    /// The manifest file could not be parsed.
    #[error("manifest parse failed: {detail}")]
    Manifest { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IntakeError {
    /// Wrap an I/O error with the path it occurred on.
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IntakeError::Storage {
            path: path.into(),
            source,
        }
    }
}
