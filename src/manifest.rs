//! Manifest ingestion: headerless, fixed-column-order CSV rows into
//! [`ManifestRecord`]s.
//!
//! The feed is a 23-positional-column export; most columns are reserved
//! and never consumed here. Only the mapped subset below is read, so
//! layout changes in the reserved columns cannot break ingestion.

use crate::error::IntakeError;
use crate::record::ManifestRecord;
use std::path::Path;
use tracing::{debug, info, warn};

// Positional columns consumed from the 23-column feed.
const COL_INDEX: usize = 0;
const COL_PASSPORT_NUMBER: usize = 2;
const COL_EXPIRY_DATE: usize = 3;
const COL_SURNAME: usize = 4;
const COL_GIVEN_NAME: usize = 5;
const COL_GENDER: usize = 6;
const COL_BIRTH_DATE: usize = 7;
const COL_PHOTO_FILENAME: usize = 13;
const COL_BATCH_NUMBER: usize = 14;
const COL_CHINESE_NAME: usize = 22;

/// Parse manifest bytes into records.
///
/// An empty file yields an empty list, not an error. Rows shorter than 23
/// columns are tolerated; missing columns read as empty fields.
pub fn parse_manifest(bytes: &[u8]) -> Result<Vec<ManifestRecord>, IntakeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut records = Vec::new();
    for (row_num, row) in reader.records().enumerate() {
        let row = row.map_err(|e| IntakeError::Manifest {
            detail: format!("row {}: {e}", row_num + 1),
        })?;

        let col = |i: usize| row.get(i).unwrap_or("").trim().to_string();

        let record = ManifestRecord {
            index: col(COL_INDEX),
            passport_number: col(COL_PASSPORT_NUMBER),
            surname: col(COL_SURNAME),
            given_name: col(COL_GIVEN_NAME),
            gender: col(COL_GENDER),
            birth_date: pad_date(&col(COL_BIRTH_DATE)),
            expiry_date: pad_date(&col(COL_EXPIRY_DATE)),
            photo_filename: col(COL_PHOTO_FILENAME),
            batch_number: col(COL_BATCH_NUMBER),
            chinese_name: col(COL_CHINESE_NAME),
        };
        debug!(row = row_num + 1, index = %record.index, "parsed manifest row");
        records.push(record);
    }

    info!(rows = records.len(), "parsed manifest");
    Ok(records)
}

/// Zero-pad a date to 8 characters.
///
/// Exports drop leading zeros from all-numeric cells, so `900101` means
/// `00900101`-style padding is required before any comparison. Empty
/// values stay empty.
fn pad_date(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("{value:0>8}")
    }
}

/// Resolve each row's photo filename against the actual files on disk.
///
/// Uploaded photo names carry suffixes the manifest does not know about
/// (timestamps, duplicate counters), so a row's base name is matched by
/// substring against the directory listing; the first match wins.
pub fn link_photos(records: &mut [ManifestRecord], photos_dir: &Path) {
    let entries = match std::fs::read_dir(photos_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %photos_dir.display(), error = %e, "photos directory unreadable, skipping photo linking");
            return;
        }
    };

    let files: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();

    let mut linked = 0;
    for record in records.iter_mut() {
        if record.photo_filename.is_empty() {
            continue;
        }
        if let Some(actual) = files.iter().find(|f| f.contains(&record.photo_filename)) {
            if *actual != record.photo_filename {
                debug!(from = %record.photo_filename, to = %actual, "linked photo");
                record.photo_filename = actual.clone();
            }
            linked += 1;
        }
    }
    info!(linked, total = records.len(), "photo linking complete");
}
