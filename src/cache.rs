//! Two-tier processing cache: fast in-process map over durable JSON files.
//!
//! ## Why two tiers?
//!
//! Interpreting a 30-page scan costs one upstream call per page; the same
//! document is routinely re-submitted within a session (re-checks, page
//! corrections) and across restarts. The fast tier answers repeat lookups
//! without touching the disk; the durable tier survives process restarts
//! and backfills the fast tier on first access (read-through promotion).
//!
//! Entries are coarse — whole-document payloads keyed by
//! `(stage, content_id)` — so a single mutex around the fast tier is
//! enough even while pages are being processed concurrently.
//!
//! ## Corruption policy
//!
//! A durable entry that no longer deserialises is deleted and reported as
//! a miss; a parse error never propagates to the caller. The next process
//! run simply recomputes and rewrites the entry.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::IntakeError;

/// Which processing phase produced a cached payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Per-page extracted text ([`crate::record::PageText`]).
    PageText,
    /// Aggregated interpreted records ([`crate::record::RecordSet`]).
    Records,
    /// Parsed manifest rows (`Vec<ManifestRecord>`).
    Manifest,
}

impl Stage {
    /// Tag used in durable file names: `{content_id}_{tag}.json`.
    pub fn tag(self) -> &'static str {
        match self {
            Stage::PageText => "text",
            Stage::Records => "processed",
            Stage::Manifest => "manifest",
        }
    }
}

/// Two-tier key/value cache keyed by `(stage, content_id)`.
///
/// `get` reads fast-first with read-through promotion; `set` writes both
/// tiers (a durable write failure is logged, not propagated — the fast
/// tier stays authoritative for the process lifetime); `invalidate`
/// removes the key from both tiers unconditionally.
#[derive(Debug)]
pub struct CacheService {
    dir: PathBuf,
    fast: Mutex<HashMap<(Stage, String), serde_json::Value>>,
}

impl CacheService {
    /// Open (and create if needed) a cache rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| IntakeError::storage(&dir, e))?;
        Ok(Self {
            dir,
            fast: Mutex::new(HashMap::new()),
        })
    }

    /// Durable-tier path for a key.
    pub fn entry_path(&self, stage: Stage, content_id: &str) -> PathBuf {
        self.dir.join(format!("{content_id}_{}.json", stage.tag()))
    }

    /// Look up a payload, checking the fast tier first.
    ///
    /// A durable hit is promoted into the fast tier before being returned.
    /// Undeserialisable entries (either tier) are discarded and treated as
    /// a miss.
    pub fn get<T: DeserializeOwned>(&self, stage: Stage, content_id: &str) -> Option<T> {
        let key = (stage, content_id.to_string());

        if let Some(value) = self.fast.lock().unwrap().get(&key).cloned() {
            match serde_json::from_value(value) {
                Ok(payload) => {
                    debug!(stage = stage.tag(), content_id, "fast-tier hit");
                    return Some(payload);
                }
                Err(e) => {
                    // Shape mismatch; drop the entry and fall through to
                    // the durable tier.
                    warn!(stage = stage.tag(), content_id, error = %e, "discarding unusable fast-tier entry");
                    self.fast.lock().unwrap().remove(&key);
                }
            }
        }

        let path = self.entry_path(stage, content_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return None,
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "deleting corrupt cache entry");
                self.remove_durable(&path);
                return None;
            }
        };

        match serde_json::from_value::<T>(value.clone()) {
            Ok(payload) => {
                debug!(stage = stage.tag(), content_id, "durable-tier hit, promoting");
                self.fast.lock().unwrap().insert(key, value);
                Some(payload)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "deleting cache entry with unexpected shape");
                self.remove_durable(&path);
                None
            }
        }
    }

    /// Write a payload to both tiers.
    pub fn set<T: Serialize>(&self, stage: Stage, content_id: &str, payload: &T) {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(stage = stage.tag(), content_id, error = %e, "payload not serialisable, cache write skipped");
                return;
            }
        };

        self.fast
            .lock()
            .unwrap()
            .insert((stage, content_id.to_string()), value.clone());

        // Whole-file replace: write a sibling temp file, then rename, so a
        // concurrent reader never observes partial content.
        let path = self.entry_path(stage, content_id);
        let tmp = path.with_extension("json.tmp");
        let written = std::fs::write(&tmp, value.to_string())
            .and_then(|_| std::fs::rename(&tmp, &path));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "durable cache write failed; fast tier remains authoritative");
            let _ = std::fs::remove_file(&tmp);
        }
    }

    /// Remove a key from both tiers. Absence in either tier is not an error.
    pub fn invalidate(&self, stage: Stage, content_id: &str) {
        self.fast
            .lock()
            .unwrap()
            .remove(&(stage, content_id.to_string()));
        self.remove_durable(&self.entry_path(stage, content_id));
    }

    /// True when a usable entry exists in either tier.
    pub fn has(&self, stage: Stage, content_id: &str) -> bool {
        self.get::<serde_json::Value>(stage, content_id).is_some()
    }

    /// Drop every fast-tier entry, leaving the durable tier intact.
    pub fn clear_fast(&self) {
        self.fast.lock().unwrap().clear();
    }

    /// Remove every entry from both tiers.
    ///
    /// Returns the number of durable files deleted.
    pub fn purge(&self) -> usize {
        self.fast.lock().unwrap().clear();
        let mut removed = 0;
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json")
                    && std::fs::remove_file(&path).is_ok()
                {
                    removed += 1;
                }
            }
        }
        removed
    }

    fn remove_durable(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove cache file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        pages: Vec<usize>,
    }

    fn sample() -> Payload {
        Payload {
            name: "doc".into(),
            pages: vec![1, 2, 5],
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let cache = CacheService::new(dir.path()).unwrap();

        cache.set(Stage::PageText, "abc123", &sample());
        let got: Payload = cache.get(Stage::PageText, "abc123").unwrap();
        assert_eq!(got, sample());
    }

    #[test]
    fn durable_tier_serves_after_fast_tier_cleared() {
        let dir = tempdir().unwrap();
        let cache = CacheService::new(dir.path()).unwrap();

        cache.set(Stage::Records, "abc123", &sample());
        cache.clear_fast();

        // Durable tier answers and promotes back into the fast tier.
        let got: Payload = cache.get(Stage::Records, "abc123").unwrap();
        assert_eq!(got, sample());

        // Delete the durable file; the promoted fast entry must still answer.
        std::fs::remove_file(cache.entry_path(Stage::Records, "abc123")).unwrap();
        let got: Payload = cache.get(Stage::Records, "abc123").unwrap();
        assert_eq!(got, sample());
    }

    #[test]
    fn corrupt_durable_entry_is_deleted_and_missed() {
        let dir = tempdir().unwrap();
        let cache = CacheService::new(dir.path()).unwrap();

        cache.set(Stage::PageText, "abc123", &sample());
        cache.clear_fast();

        let path = cache.entry_path(Stage::PageText, "abc123");
        std::fs::write(&path, "{not json at all").unwrap();

        let got: Option<Payload> = cache.get(Stage::PageText, "abc123");
        assert!(got.is_none());
        assert!(!path.exists(), "corrupt file should have been removed");
    }

    #[test]
    fn wrong_shape_durable_entry_is_deleted_and_missed() {
        let dir = tempdir().unwrap();
        let cache = CacheService::new(dir.path()).unwrap();

        let path = cache.entry_path(Stage::Records, "abc123");
        std::fs::write(&path, r#"{"unexpected": true}"#).unwrap();

        let got: Option<Payload> = cache.get(Stage::Records, "abc123");
        assert!(got.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn invalidate_removes_both_tiers() {
        let dir = tempdir().unwrap();
        let cache = CacheService::new(dir.path()).unwrap();

        cache.set(Stage::PageText, "abc123", &sample());
        cache.invalidate(Stage::PageText, "abc123");

        let got: Option<Payload> = cache.get(Stage::PageText, "abc123");
        assert!(got.is_none());
        assert!(!cache.entry_path(Stage::PageText, "abc123").exists());

        // Invalidating an absent key is not an error.
        cache.invalidate(Stage::PageText, "missing");
    }

    #[test]
    fn stages_do_not_collide() {
        let dir = tempdir().unwrap();
        let cache = CacheService::new(dir.path()).unwrap();

        cache.set(Stage::PageText, "abc123", &sample());
        let other: Option<Payload> = cache.get(Stage::Records, "abc123");
        assert!(other.is_none());
    }

    #[test]
    fn purge_empties_everything() {
        let dir = tempdir().unwrap();
        let cache = CacheService::new(dir.path()).unwrap();

        cache.set(Stage::PageText, "a", &sample());
        cache.set(Stage::Records, "b", &sample());
        let removed = cache.purge();
        assert_eq!(removed, 2);
        assert!(!cache.has(Stage::PageText, "a"));
        assert!(!cache.has(Stage::Records, "b"));
    }

    #[test]
    fn last_write_wins() {
        let dir = tempdir().unwrap();
        let cache = CacheService::new(dir.path()).unwrap();

        cache.set(Stage::PageText, "abc123", &sample());
        let newer = Payload {
            name: "doc-v2".into(),
            pages: vec![1],
        };
        cache.set(Stage::PageText, "abc123", &newer);

        let got: Payload = cache.get(Stage::PageText, "abc123").unwrap();
        assert_eq!(got, newer);

        cache.clear_fast();
        let got: Payload = cache.get(Stage::PageText, "abc123").unwrap();
        assert_eq!(got, newer);
    }
}
