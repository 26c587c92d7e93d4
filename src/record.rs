//! Data model: extracted page text, interpreted passport records, manifest
//! rows, and reconciliation findings.
//!
//! The boundary between *interpreted* and *validated* data is explicit:
//! [`PassportFields`] is what the upstream service hands back (every field
//! optional, nothing guaranteed), while [`PassportRecord`] can only be
//! obtained through [`PassportFields::validate`] and is immutable from then
//! on. Code downstream of validation never has to re-check field presence.

use crate::error::IntakeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-page plain text extracted from a document.
///
/// Pages are keyed by **zero-based** index; pages that yielded only
/// whitespace are omitted entirely rather than stored as empty strings.
/// This doubles as the `text`-stage cache envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// Digest of the source document the text was extracted from.
    pub content_id: String,
    /// Page count of the source document, including empty pages.
    pub total_pages: usize,
    /// Zero-based page index → trimmed page text.
    pub pages: BTreeMap<usize, String>,
}

impl PageText {
    /// Number of pages that yielded text.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// True when no page yielded text.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Text for a zero-based page index, if that page yielded any.
    pub fn get(&self, page_index: usize) -> Option<&str> {
        self.pages.get(&page_index).map(String::as_str)
    }
}

/// Unvalidated passport fields as returned by the field interpreter.
///
/// All fields are optional; [`validate`](Self::validate) turns them into a
/// [`PassportRecord`] or says precisely which field is unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportFields {
    pub passport_number: Option<String>,
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub expiry_date: Option<String>,
    pub chinese_name: Option<String>,
}

impl PassportFields {
    /// Check completeness and format, producing an immutable record.
    ///
    /// A record is valid iff passport number, surname, given name, gender,
    /// birth date and expiry date are all present and non-empty, both dates
    /// are exactly 8 numeric characters, and gender is `M` or `F`. The
    /// Chinese name is optional and never checked.
    pub fn validate(self, page_number: usize) -> Result<PassportRecord, IntakeError> {
        let passport_number = require("passport_number", self.passport_number)?;
        let surname = require("surname", self.surname)?;
        let given_name = require("given_name", self.given_name)?;
        let gender = require("gender", self.gender)?;
        let birth_date = require("birth_date", self.birth_date)?;
        let expiry_date = require("expiry_date", self.expiry_date)?;

        check_date("birth_date", &birth_date)?;
        check_date("expiry_date", &expiry_date)?;

        if gender != "M" && gender != "F" {
            return Err(IntakeError::Validation {
                field: "gender",
                detail: format!("must be M or F, got '{gender}'"),
            });
        }

        Ok(PassportRecord {
            passport_number,
            surname,
            given_name,
            gender,
            birth_date,
            expiry_date,
            chinese_name: self.chinese_name.filter(|s| !s.is_empty()),
            page_number,
        })
    }
}

fn require(field: &'static str, value: Option<String>) -> Result<String, IntakeError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(IntakeError::Validation {
            field,
            detail: "is missing or empty".into(),
        }),
    }
}

fn check_date(field: &'static str, value: &str) -> Result<(), IntakeError> {
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(IntakeError::Validation {
            field,
            detail: format!("must be exactly 8 digits, got '{value}'"),
        })
    }
}

/// A validated passport record interpreted from one document page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportRecord {
    pub passport_number: String,
    pub surname: String,
    pub given_name: String,
    /// `M` or `F`.
    pub gender: String,
    /// `YYYYMMDD`.
    pub birth_date: String,
    /// `YYYYMMDD`.
    pub expiry_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chinese_name: Option<String>,
    /// 1-based page the record was interpreted from.
    pub page_number: usize,
}

/// Aggregated result of processing one document; the `processed`-stage
/// cache envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    pub content_id: String,
    pub total_pages: usize,
    /// Validated records, in completion order (each carries its page).
    pub records: Vec<PassportRecord>,
    /// 1-based page numbers that yielded a valid record.
    pub valid_pages: Vec<usize>,
}

/// One row of an uploaded manifest.
///
/// Fields mirror the comparable subset of [`PassportRecord`]; an empty
/// string means the manifest did not carry the value. Rows are read-only
/// once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// External acceptance number keying the row.
    pub index: String,
    pub passport_number: String,
    pub surname: String,
    pub given_name: String,
    pub gender: String,
    pub birth_date: String,
    pub expiry_date: String,
    /// Linked ID-photo filename, resolved against the photos directory.
    pub photo_filename: String,
    pub batch_number: String,
    pub chinese_name: String,
}

/// A single field-level difference between a manifest row and an
/// interpreted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMismatch {
    /// Canonical field name (e.g. `passport_number`).
    pub field: String,
    /// The manifest side of the disagreement.
    pub manifest: String,
    /// The interpreted-document side of the disagreement.
    pub extracted: String,
}

/// Findings from comparing one manifest row against one passport record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub errors: Vec<FieldMismatch>,
    pub warnings: Vec<FieldMismatch>,
}

impl DiscrepancyReport {
    /// True when the comparison produced no findings at all.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_fields() -> PassportFields {
        PassportFields {
            passport_number: Some("EA1234567".into()),
            surname: Some("WANG".into()),
            given_name: Some("XIAOMING".into()),
            gender: Some("M".into()),
            birth_date: Some("19900101".into()),
            expiry_date: Some("20301231".into()),
            chinese_name: Some("王小明".into()),
        }
    }

    #[test]
    fn complete_record_validates() {
        let record = complete_fields().validate(3).unwrap();
        assert_eq!(record.passport_number, "EA1234567");
        assert_eq!(record.page_number, 3);
        assert_eq!(record.chinese_name.as_deref(), Some("王小明"));
    }

    #[test]
    fn missing_gender_is_invalid() {
        let mut fields = complete_fields();
        fields.gender = None;
        let err = fields.validate(1).unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Validation { field: "gender", .. }
        ));
    }

    #[test]
    fn empty_surname_is_invalid() {
        let mut fields = complete_fields();
        fields.surname = Some(String::new());
        assert!(fields.validate(1).is_err());
    }

    #[test]
    fn seven_digit_date_is_invalid() {
        let mut fields = complete_fields();
        fields.birth_date = Some("1990010".into());
        let err = fields.validate(1).unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Validation {
                field: "birth_date",
                ..
            }
        ));
    }

    #[test]
    fn eight_digit_date_is_valid() {
        let mut fields = complete_fields();
        fields.birth_date = Some("19900101".into());
        assert!(fields.validate(1).is_ok());
    }

    #[test]
    fn non_numeric_date_is_invalid() {
        let mut fields = complete_fields();
        fields.expiry_date = Some("2030123X".into());
        assert!(fields.validate(1).is_err());
    }

    #[test]
    fn gender_domain_is_m_or_f_only() {
        for bad in ["X", "U", "0", "female"] {
            let mut fields = complete_fields();
            fields.gender = Some(bad.into());
            assert!(fields.validate(1).is_err(), "gender '{bad}' should fail");
        }
        for good in ["M", "F"] {
            let mut fields = complete_fields();
            fields.gender = Some(good.into());
            assert!(fields.validate(1).is_ok());
        }
    }

    #[test]
    fn missing_chinese_name_is_fine() {
        let mut fields = complete_fields();
        fields.chinese_name = None;
        let record = fields.validate(2).unwrap();
        assert_eq!(record.chinese_name, None);
    }

    #[test]
    fn page_text_skips_missing_pages() {
        let mut pages = BTreeMap::new();
        pages.insert(0, "first".to_string());
        pages.insert(2, "third".to_string());
        let text = PageText {
            content_id: "abc".into(),
            total_pages: 3,
            pages,
        };
        assert_eq!(text.len(), 2);
        assert_eq!(text.get(0), Some("first"));
        assert_eq!(text.get(1), None);
    }

    #[test]
    fn record_set_round_trips_through_json() {
        let record = complete_fields().validate(1).unwrap();
        let set = RecordSet {
            content_id: "deadbeef".into(),
            total_pages: 4,
            records: vec![record],
            valid_pages: vec![1],
        };
        let json = serde_json::to_string(&set).unwrap();
        let back: RecordSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
