//! Reconciliation: compare an interpreted record against a manifest row.
//!
//! The comparison is deliberately conservative: a finding is produced only
//! when **both** sides carry a value and the trimmed values differ. A
//! missing value on either side is not evidence of anything — manifests
//! routinely omit fields — so it produces no finding at all.

use crate::record::{DiscrepancyReport, FieldMismatch, ManifestRecord, PassportRecord};

/// The fixed set of fields compared between manifest and document.
const COMPARED_FIELDS: [&str; 6] = [
    "passport_number",
    "surname",
    "given_name",
    "gender",
    "birth_date",
    "expiry_date",
];

fn manifest_value<'a>(record: &'a ManifestRecord, field: &str) -> &'a str {
    match field {
        "passport_number" => &record.passport_number,
        "surname" => &record.surname,
        "given_name" => &record.given_name,
        "gender" => &record.gender,
        "birth_date" => &record.birth_date,
        "expiry_date" => &record.expiry_date,
        _ => unreachable!("unknown comparable field {field}"),
    }
}

fn extracted_value<'a>(record: &'a PassportRecord, field: &str) -> &'a str {
    match field {
        "passport_number" => &record.passport_number,
        "surname" => &record.surname,
        "given_name" => &record.given_name,
        "gender" => &record.gender,
        "birth_date" => &record.birth_date,
        "expiry_date" => &record.expiry_date,
        _ => unreachable!("unknown comparable field {field}"),
    }
}

/// Compare a manifest row against an interpreted record field by field.
///
/// Pure and order-independent across fields: each comparable field
/// contributes at most one `errors` entry, emitted when both sides are
/// non-empty after trimming and disagree.
pub fn compare(manifest: &ManifestRecord, extracted: &PassportRecord) -> DiscrepancyReport {
    let mut report = DiscrepancyReport::default();

    for field in COMPARED_FIELDS {
        let m = manifest_value(manifest, field).trim();
        let e = extracted_value(extracted, field).trim();
        if !m.is_empty() && !e.is_empty() && m != e {
            report.errors.push(FieldMismatch {
                field: field.to_string(),
                manifest: m.to_string(),
                extracted: e.to_string(),
            });
        }
    }

    report
}
