//! Page extraction: turn a stored PDF into per-page plain text.
//!
//! This stage is pure with respect to its input file — it never touches
//! the cache (that is the caller's job), so it can be exercised directly
//! against any path. Parsing the text layer is CPU-bound, so the actual
//! extraction runs under `spawn_blocking` to keep it off the async
//! executor's hot path.

use crate::error::IntakeError;
use crate::record::PageText;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Extract trimmed per-page text from the PDF at `path`.
///
/// Pages that contain only whitespace are omitted from the result rather
/// than recorded as empty strings — downstream stages then never waste an
/// upstream call on a blank page.
///
/// # Errors
/// * [`IntakeError::NotFound`] — no file at `path`
/// * [`IntakeError::UnsupportedFormat`] — extension is not `.pdf`
/// * [`IntakeError::Extraction`] — the document could not be parsed
pub async fn extract_pages(path: &Path, content_id: &str) -> Result<PageText, IntakeError> {
    if !path.exists() {
        return Err(IntakeError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if extension != "pdf" {
        return Err(IntakeError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension,
        });
    }

    let bytes = std::fs::read(path).map_err(|e| IntakeError::storage(path, e))?;

    let owned_path = path.to_path_buf();
    let raw_pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| IntakeError::Extraction {
            path: owned_path,
            detail: e.to_string(),
        })
    })
    .await
    .map_err(|e| IntakeError::Extraction {
        path: path.to_path_buf(),
        detail: format!("extraction task failed: {e}"),
    })??;

    let total_pages = raw_pages.len();
    let mut pages = BTreeMap::new();
    for (index, text) in raw_pages.into_iter().enumerate() {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            warn!(page = index + 1, "page has no extractable text, skipping");
            continue;
        }
        debug!(page = index + 1, chars = trimmed.len(), "extracted page text");
        pages.insert(index, trimmed.to_string());
    }

    info!(
        total_pages,
        text_pages = pages.len(),
        "extracted text from document"
    );

    Ok(PageText {
        content_id: content_id.to_string(),
        total_pages,
        pages,
    })
}
