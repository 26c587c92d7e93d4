//! Content-addressed storage for uploaded documents.
//!
//! Every upload is identified by a SHA-256 digest of a bounded prefix of
//! its bytes and stored at a path derived solely from that digest, so
//! uploading identical content twice writes nothing the second time. This
//! is the dedupe point that keeps identical passports from being
//! reprocessed under a new name.

use crate::error::IntakeError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Result of storing one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Hex digest identifying the content.
    pub content_id: String,
    /// Canonical on-disk location.
    pub path: PathBuf,
    /// False when the path already existed and nothing was written.
    pub is_new: bool,
}

/// Flat directory of content-addressed files (`{root}/{content_id}.{ext}`).
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    hash_prefix_bytes: usize,
}

impl ContentStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new(root: impl AsRef<Path>, hash_prefix_bytes: usize) -> Result<Self, IntakeError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| IntakeError::storage(&root, e))?;
        Ok(Self {
            root,
            hash_prefix_bytes,
        })
    }

    /// Digest of (a bounded prefix of) the payload, hex-encoded.
    pub fn content_id(&self, bytes: &[u8]) -> String {
        let prefix_len = bytes.len().min(self.hash_prefix_bytes);
        let mut hasher = Sha256::new();
        hasher.update(&bytes[..prefix_len]);
        hex::encode(hasher.finalize())
    }

    /// Canonical path for a content id.
    pub fn path_for(&self, content_id: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{content_id}.{extension}"))
    }

    /// Store a payload, returning its identifier and whether it was new.
    ///
    /// If a file already exists at the derived path the call writes
    /// nothing and reports `is_new = false`. Two simultaneous uploads of
    /// identical content may both write; last writer wins and the bytes
    /// are identical either way.
    pub fn put(&self, bytes: &[u8], extension: &str) -> Result<StoredObject, IntakeError> {
        let content_id = self.content_id(bytes);
        let path = self.path_for(&content_id, extension);

        if path.exists() {
            return Ok(StoredObject {
                content_id,
                path,
                is_new: false,
            });
        }

        std::fs::write(&path, bytes).map_err(|e| IntakeError::storage(&path, e))?;
        tracing::info!(content_id = %content_id, path = %path.display(), "stored new document");

        Ok(StoredObject {
            content_id,
            path,
            is_new: true,
        })
    }
}
