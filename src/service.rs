//! Top-level assembly: one [`IntakeService`] owns the store, the cache,
//! and the interpreter handle, and every component receives them
//! explicitly from here — there is no ambient global state.

use crate::cache::{CacheService, Stage};
use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::manifest;
use crate::pipeline::interpret::{ChatInterpreter, PageInterpreter};
use crate::process::process_document;
use crate::record::{ManifestRecord, PassportRecord, RecordSet};
use crate::store::{ContentStore, StoredObject};
use crate::stream::{process_document_stream, EventStream};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Document-intake service: upload, process, reconcile.
///
/// Construction is the single place where the cache, the stores and the
/// interpreter come to life; everything downstream borrows them by
/// handle.
pub struct IntakeService {
    config: IntakeConfig,
    documents: ContentStore,
    manifests: ContentStore,
    cache: Arc<CacheService>,
    interpreter: Arc<dyn PageInterpreter>,
}

impl IntakeService {
    /// Assemble a service around an existing interpreter handle.
    ///
    /// Bootstraps the on-disk layout (`passports/`, `photos/`,
    /// `manifests/`, `cache/` under the configured data directory).
    pub fn new(
        config: IntakeConfig,
        interpreter: Arc<dyn PageInterpreter>,
    ) -> Result<Self, IntakeError> {
        config.ensure_layout()?;
        let documents = ContentStore::new(config.passports_dir(), config.hash_prefix_bytes)?;
        let manifests = ContentStore::new(config.manifests_dir(), config.hash_prefix_bytes)?;
        let cache = Arc::new(CacheService::new(config.cache_dir())?);
        Ok(Self {
            config,
            documents,
            manifests,
            cache,
            interpreter,
        })
    }

    /// Assemble a service with a live [`ChatInterpreter`], probing the
    /// upstream before returning.
    pub async fn connect(config: IntakeConfig) -> Result<Self, IntakeError> {
        let interpreter = Arc::new(ChatInterpreter::connect(&config).await?);
        Self::new(config, interpreter)
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    /// Canonical path of a stored passport document.
    pub fn document_path(&self, content_id: &str) -> PathBuf {
        self.documents.path_for(content_id, "pdf")
    }

    // ── Uploads ──────────────────────────────────────────────────────────

    /// Store an uploaded passport document.
    ///
    /// Validates the claimed extension and the `%PDF` magic before
    /// touching the store. Re-uploading known content is a no-op except
    /// that a **new** upload drops any cache entries left over from a
    /// previous document that hashed to the same id (stale state from a
    /// crashed run).
    pub fn ingest_document(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StoredObject, IntakeError> {
        let extension = PathBuf::from(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if extension != "pdf" {
            return Err(IntakeError::UnsupportedFormat {
                path: PathBuf::from(filename),
                extension,
            });
        }
        if !bytes.starts_with(b"%PDF") {
            return Err(IntakeError::UnsupportedFormat {
                path: PathBuf::from(filename),
                extension: "not a PDF payload".into(),
            });
        }
        if bytes.len() as u64 > self.config.max_document_bytes {
            return Err(IntakeError::TooLarge {
                limit: self.config.max_document_bytes,
                actual: bytes.len() as u64,
            });
        }

        let stored = self.documents.put(bytes, "pdf")?;
        if stored.is_new {
            self.cache.invalidate(Stage::PageText, &stored.content_id);
            self.cache.invalidate(Stage::Records, &stored.content_id);
        }
        Ok(stored)
    }

    /// Store and parse an uploaded manifest, serving repeat uploads from
    /// the cache.
    pub fn ingest_manifest(
        &self,
        bytes: &[u8],
    ) -> Result<(String, Vec<ManifestRecord>), IntakeError> {
        if bytes.len() as u64 > self.config.max_manifest_bytes {
            return Err(IntakeError::TooLarge {
                limit: self.config.max_manifest_bytes,
                actual: bytes.len() as u64,
            });
        }

        let stored = self.manifests.put(bytes, "csv")?;
        if let Some(records) = self
            .cache
            .get::<Vec<ManifestRecord>>(Stage::Manifest, &stored.content_id)
        {
            info!(content_id = %stored.content_id, rows = records.len(), "manifest served from cache");
            return Ok((stored.content_id, records));
        }

        let mut records = manifest::parse_manifest(bytes)?;
        manifest::link_photos(&mut records, &self.config.photos_dir());
        self.cache
            .set(Stage::Manifest, &stored.content_id, &records);
        Ok((stored.content_id, records))
    }

    // ── Processing ───────────────────────────────────────────────────────

    /// Process a stored document, waiting for the full record set.
    pub async fn process(&self, content_id: &str, force: bool) -> Result<RecordSet, IntakeError> {
        process_document(
            &self.cache,
            Arc::clone(&self.interpreter),
            self.config.workers,
            &self.document_path(content_id),
            content_id,
            force,
            None,
        )
        .await
    }

    /// Process a stored document, streaming progress events.
    pub fn process_stream(&self, content_id: &str, force: bool) -> EventStream {
        process_document_stream(
            Arc::clone(&self.cache),
            Arc::clone(&self.interpreter),
            self.config.workers,
            self.document_path(content_id),
            content_id.to_string(),
            force,
        )
    }

    /// Re-interpret specific pages of an already-processed document.
    ///
    /// Used after reconciliation flags a record: the caller names the
    /// 1-based pages to look at again, and any record that comes back
    /// valid replaces its predecessor (matched by passport number) in the
    /// cached record set. Pages that fail again are skipped with a logged
    /// warning, exactly like first-pass processing.
    pub async fn recheck(
        &self,
        content_id: &str,
        pages: &[usize],
    ) -> Result<Vec<PassportRecord>, IntakeError> {
        let text = crate::process::load_page_text(
            &self.cache,
            &self.document_path(content_id),
            content_id,
            false,
        )
        .await?;

        let mut updated: Vec<PassportRecord> = Vec::new();
        for &page in pages {
            let Some(page_text) = page.checked_sub(1).and_then(|idx| text.get(idx)) else {
                warn!(page, "recheck requested for a page with no text");
                continue;
            };
            match self.interpreter.interpret(page_text).await {
                Ok(Some(fields)) => match fields.validate(page) {
                    Ok(record) => updated.push(record),
                    Err(e) => warn!(page, error = %e, "rechecked record still incomplete"),
                },
                Ok(None) => warn!(page, "recheck found no actionable content"),
                Err(e) => warn!(page, error = %e, "recheck interpretation failed"),
            }
        }

        if !updated.is_empty() {
            if let Some(mut set) = self.cache.get::<RecordSet>(Stage::Records, content_id) {
                for record in &updated {
                    match set
                        .records
                        .iter_mut()
                        .find(|r| r.passport_number == record.passport_number)
                    {
                        Some(existing) => *existing = record.clone(),
                        None => {
                            set.records.push(record.clone());
                            if !set.valid_pages.contains(&record.page_number) {
                                set.valid_pages.push(record.page_number);
                            }
                        }
                    }
                }
                self.cache.set(Stage::Records, content_id, &set);
            }
        }

        Ok(updated)
    }

    /// True when usable interpreted records are cached for the document.
    pub fn has_cached_records(&self, content_id: &str) -> bool {
        self.cache
            .get::<RecordSet>(Stage::Records, content_id)
            .is_some_and(|set| !set.records.is_empty())
    }

    /// Drop every cache entry (both tiers). Returns the number of durable
    /// entries removed. Stored uploads are untouched.
    pub fn purge_cache(&self) -> usize {
        self.cache.purge()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PassportFields;
    use async_trait::async_trait;

    /// Interpreter that never finds anything; service-level tests only
    /// exercise ingest and cache wiring.
    struct NullInterpreter;

    #[async_trait]
    impl PageInterpreter for NullInterpreter {
        async fn interpret(
            &self,
            _page_text: &str,
        ) -> Result<Option<PassportFields>, IntakeError> {
            Ok(None)
        }
    }

    fn service(dir: &tempfile::TempDir) -> IntakeService {
        let config = IntakeConfig::builder()
            .data_dir(dir.path())
            .build()
            .unwrap();
        IntakeService::new(config, Arc::new(NullInterpreter)).unwrap()
    }

    #[test]
    fn layout_is_bootstrapped() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        assert!(svc.config().passports_dir().is_dir());
        assert!(svc.config().photos_dir().is_dir());
        assert!(svc.config().manifests_dir().is_dir());
        assert!(svc.config().cache_dir().is_dir());
    }

    #[test]
    fn ingest_rejects_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = service(&dir)
            .ingest_document("scan.docx", b"%PDF-1.4")
            .unwrap_err();
        assert!(matches!(err, IntakeError::UnsupportedFormat { .. }));
    }

    #[test]
    fn ingest_rejects_wrong_magic() {
        let dir = tempfile::tempdir().unwrap();
        let err = service(&dir)
            .ingest_document("scan.pdf", b"PK\x03\x04 not a pdf")
            .unwrap_err();
        assert!(matches!(err, IntakeError::UnsupportedFormat { .. }));
    }

    #[test]
    fn ingest_rejects_oversize_payload() {
        let dir = tempfile::tempdir().unwrap();
        let config = IntakeConfig::builder()
            .data_dir(dir.path())
            .max_document_bytes(8)
            .build()
            .unwrap();
        let svc = IntakeService::new(config, Arc::new(NullInterpreter)).unwrap();
        let err = svc
            .ingest_document("scan.pdf", b"%PDF-1.4 far too big")
            .unwrap_err();
        assert!(matches!(err, IntakeError::TooLarge { .. }));
    }

    #[test]
    fn reupload_is_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let first = svc.ingest_document("scan.pdf", b"%PDF-1.4 content").unwrap();
        assert!(first.is_new);
        let second = svc.ingest_document("scan.pdf", b"%PDF-1.4 content").unwrap();
        assert!(!second.is_new);
        assert_eq!(first.content_id, second.content_id);
    }

    #[test]
    fn new_upload_drops_stale_cache_entries() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        // Pre-existing entries under the id the upload will get.
        let id = {
            let store = ContentStore::new(dir.path().join("probe"), 1024 * 1024).unwrap();
            store.content_id(b"%PDF-1.4 content")
        };
        svc.cache().set(Stage::Records, &id, &RecordSet::default());
        svc.cache()
            .set(Stage::PageText, &id, &crate::record::PageText::default());

        let stored = svc.ingest_document("scan.pdf", b"%PDF-1.4 content").unwrap();
        assert_eq!(stored.content_id, id);
        assert!(!svc.cache().has(Stage::Records, &id));
        assert!(!svc.cache().has(Stage::PageText, &id));
    }

    #[test]
    fn manifest_is_cached_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let csv = b"A0001,1,EA1234567,20301231,WANG,XIAOMING,M,19900101";
        let (id, first) = svc.ingest_manifest(csv).unwrap();
        assert_eq!(first.len(), 1);

        // Second ingest of identical bytes comes out of the cache.
        let (id2, second) = svc.ingest_manifest(csv).unwrap();
        assert_eq!(id, id2);
        assert_eq!(first, second);
        assert!(svc.cache().has(Stage::Manifest, &id));
    }

    #[test]
    fn empty_manifest_is_zero_records_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_, records) = service(&dir).ingest_manifest(b"").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn cached_records_probe() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        assert!(!svc.has_cached_records("nope"));

        // An empty cached set does not count as usable records.
        svc.cache().set(Stage::Records, "empty", &RecordSet::default());
        assert!(!svc.has_cached_records("empty"));
    }
}
