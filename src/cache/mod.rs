//! Local content cache for pulled artifacts
//!
//! Read-through accelerator in front of the registry:
//! - Blobs keyed by digest under `<path>/blobs/sha256/<hex>`
//! - Immutable release tags keyed under `<path>/tags/<tag>`
//! - Write timestamp is the file mtime; writes land via atomic rename
//! - Size-based eviction (oldest write first) on `put`, TTL checked lazily on `get`
//!
//! The cache never holds the only copy of anything. Read failures and
//! corrupt entries degrade to a miss.

mod eviction;
mod store;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

pub use eviction::{plan_eviction, scan_blobs, BlobEntry, EvictionPolicy};
pub use store::CacheManager;

/// Cache configuration (the `registry.cache` block)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Maximum total blob size (0 = unlimited)
    #[serde(default = "default_max_size_gb")]
    pub max_size_gb: f64,

    /// Entry lifetime (0 = never expires)
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_cache_path(),
            max_size_gb: default_max_size_gb(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl CacheConfig {
    /// Enabled cache rooted at `path` with default limits
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_gb() -> f64 {
    10.0
}

fn default_ttl_hours() -> f64 {
    24.0
}

/// `$HOME/.cache/floe/artifacts`, or the temp dir when HOME is unset
fn default_cache_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".cache").join("floe").join("artifacts"),
        None => std::env::temp_dir().join("floe-artifacts-cache"),
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub path: PathBuf,
    pub total_size_bytes: u64,
    pub entry_count: usize,
    pub max_size_gb: f64,
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to persist cache entry {path}: {message}")]
    Persist { path: PathBuf, message: String },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
