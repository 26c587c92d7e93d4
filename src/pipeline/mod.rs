//! Pipeline stages for turning a stored document into validated records.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets us swap
//! implementations (e.g. a different extraction backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ interpret ──▶ normalize ──▶ validate
//! (text layer) (chat API)   (OCR fixes)   (completeness)
//! ```
//!
//! 1. [`extract`]   — per-page text from the PDF text layer; runs in
//!    `spawn_blocking` because parsing is CPU-bound
//! 2. [`interpret`] — one upstream call per page; the only stage with
//!    network I/O, behind the [`interpret::PageInterpreter`] seam
//! 3. [`normalize`] — deterministic OCR-confusion cleanup per field type
//!
//! Validation lives on the data type itself
//! ([`crate::record::PassportFields::validate`]); fan-out across pages is
//! orchestrated by [`crate::process`].

pub mod extract;
pub mod interpret;
pub mod normalize;
