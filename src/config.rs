//! Configuration for the intake service.
//!
//! All behaviour is controlled through [`IntakeConfig`], built via its
//! [`IntakeConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across the service, serialise it for logging,
//! and diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A ten-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::IntakeError;
use std::path::{Path, PathBuf};

/// Default upstream endpoint for the conversational extraction API.
pub const DEFAULT_API_URL: &str = "https://api.coze.cn/open_api/v2/chat";

/// Configuration for a document-intake service.
///
/// Built via [`IntakeConfig::builder()`] or [`IntakeConfig::default()`].
///
/// # Example
/// ```rust
/// use passcheck::IntakeConfig;
///
/// let config = IntakeConfig::builder()
///     .data_dir("/var/lib/passcheck")
///     .workers(4)
///     .api_timeout_secs(20)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Root directory for stored uploads and the durable cache tier.
    /// Default: `./data`.
    ///
    /// Four subdirectories are created on service construction:
    /// `passports/`, `photos/`, `manifests/`, and `cache/`.
    pub data_dir: PathBuf,

    /// Number of concurrent interpreter calls per document. Default: 6.
    ///
    /// The upstream API is network-bound, not CPU-bound; six in-flight
    /// calls cut wall-clock time on a typical 30-page batch to a fraction
    /// of sequential processing without tripping upstream rate limits.
    pub workers: usize,

    /// Upstream chat endpoint URL. Default: [`DEFAULT_API_URL`].
    pub api_url: String,

    /// Bearer token for the upstream API. Falls back to the
    /// `PASSCHECK_API_KEY` environment variable when unset.
    pub api_key: Option<String>,

    /// Bot identifier the upstream routes the query to. Falls back to the
    /// `PASSCHECK_BOT_ID` environment variable when unset.
    pub bot_id: Option<String>,

    /// Per-interpretation-call timeout in seconds. Default: 30.
    ///
    /// There is no automatic retry anywhere in the pipeline, so this bound
    /// is what frees a worker from a hung upstream call.
    pub api_timeout_secs: u64,

    /// Connection timeout for the startup probe in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// How many leading bytes of an upload feed the content digest.
    /// Default: 1 MiB.
    ///
    /// Hashing a bounded prefix keeps `put` fast on 100 MB scans while a
    /// collision between distinct uploads stays astronomically unlikely at
    /// these input sizes.
    pub hash_prefix_bytes: usize,

    /// Maximum accepted passport document size in bytes. Default: 100 MiB.
    pub max_document_bytes: u64,

    /// Maximum accepted manifest size in bytes. Default: 10 MiB.
    pub max_manifest_bytes: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            workers: 6,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            bot_id: None,
            api_timeout_secs: 30,
            connect_timeout_secs: 10,
            hash_prefix_bytes: 1024 * 1024,
            max_document_bytes: 100 * 1024 * 1024,
            max_manifest_bytes: 10 * 1024 * 1024,
        }
    }
}

impl IntakeConfig {
    /// Create a new builder for `IntakeConfig`.
    pub fn builder() -> IntakeConfigBuilder {
        IntakeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory holding stored passport documents.
    pub fn passports_dir(&self) -> PathBuf {
        self.data_dir.join("passports")
    }

    /// Directory holding uploaded ID photos.
    pub fn photos_dir(&self) -> PathBuf {
        self.data_dir.join("photos")
    }

    /// Directory holding uploaded manifests.
    pub fn manifests_dir(&self) -> PathBuf {
        self.data_dir.join("manifests")
    }

    /// Directory holding the durable cache tier.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Create the on-disk layout if it does not exist yet.
    pub fn ensure_layout(&self) -> Result<(), IntakeError> {
        for dir in [
            self.passports_dir(),
            self.photos_dir(),
            self.manifests_dir(),
            self.cache_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| IntakeError::storage(&dir, e))?;
        }
        Ok(())
    }

    /// API key from config, falling back to `PASSCHECK_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve(self.api_key.as_deref(), "PASSCHECK_API_KEY")
    }

    /// Bot id from config, falling back to `PASSCHECK_BOT_ID`.
    pub fn resolved_bot_id(&self) -> Option<String> {
        resolve(self.bot_id.as_deref(), "PASSCHECK_BOT_ID")
    }

    /// Endpoint URL from config, unless `PASSCHECK_API_URL` overrides it.
    pub fn resolved_api_url(&self) -> String {
        match std::env::var("PASSCHECK_API_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => self.api_url.clone(),
        }
    }
}

fn resolve(configured: Option<&str>, env_var: &str) -> Option<String> {
    if let Some(v) = configured {
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }
    std::env::var(env_var).ok().filter(|v| !v.is_empty())
}

/// Builder for [`IntakeConfig`].
#[derive(Debug)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn bot_id(mut self, id: impl Into<String>) -> Self {
        self.config.bot_id = Some(id.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn hash_prefix_bytes(mut self, bytes: usize) -> Self {
        self.config.hash_prefix_bytes = bytes;
        self
    }

    pub fn max_document_bytes(mut self, bytes: u64) -> Self {
        self.config.max_document_bytes = bytes;
        self
    }

    pub fn max_manifest_bytes(mut self, bytes: u64) -> Self {
        self.config.max_manifest_bytes = bytes;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IntakeConfig, IntakeError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(IntakeError::InvalidConfig("workers must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(IntakeError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.hash_prefix_bytes == 0 {
            return Err(IntakeError::InvalidConfig(
                "hash_prefix_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
