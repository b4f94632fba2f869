//! Cache eviction
//!
//! - Size-based: keep total blob bytes under the limit, oldest write evicted first
//! - Age-based: entries older than the TTL are expired

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use walkdir::WalkDir;

use super::CacheConfig;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Eviction limits derived from [`CacheConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Maximum total cache size in bytes (0 = unlimited)
    pub max_size_bytes: u64,
    /// Maximum entry age (None = unlimited)
    pub ttl: Option<Duration>,
}

impl EvictionPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        let max_size_bytes = if config.max_size_gb > 0.0 {
            (config.max_size_gb * BYTES_PER_GB) as u64
        } else {
            0
        };
        let ttl = if config.ttl_hours > 0.0 {
            Some(Duration::from_secs_f64(config.ttl_hours * 3600.0))
        } else {
            None
        };
        Self {
            max_size_bytes,
            ttl,
        }
    }

    /// Whether an entry written at `written_at` has outlived the TTL
    pub fn is_expired(&self, written_at: SystemTime, now: SystemTime) -> bool {
        match self.ttl {
            Some(ttl) => now
                .duration_since(written_at)
                .map(|age| age > ttl)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Whether a single entry of `size` bytes can ever fit
    pub fn admits(&self, size: u64) -> bool {
        self.max_size_bytes == 0 || size <= self.max_size_bytes
    }
}

/// A blob file on disk
#[derive(Debug, Clone)]
pub struct BlobEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub written_at: SystemTime,
}

/// Collect blob entries under `blob_dir`
///
/// Only files named by a 64-char hex digest count; in-flight temp files are
/// ignored. Unreadable entries are skipped.
pub fn scan_blobs(blob_dir: &Path) -> Vec<BlobEntry> {
    if !blob_dir.is_dir() {
        return Vec::new();
    }

    WalkDir::new(blob_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_blob_name(&e.file_name().to_string_lossy()))
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            Some(BlobEntry {
                path: e.into_path(),
                size_bytes: meta.len(),
                written_at: meta.modified().ok()?,
            })
        })
        .collect()
}

fn is_blob_name(name: &str) -> bool {
    name.len() == 64
        && name
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Pick the entries to delete so that `incoming` more bytes fit
///
/// Entries are considered oldest write first.
pub fn plan_eviction(
    mut entries: Vec<BlobEntry>,
    incoming: u64,
    policy: &EvictionPolicy,
) -> Vec<BlobEntry> {
    if policy.max_size_bytes == 0 {
        return Vec::new();
    }

    entries.sort_by_key(|e| e.written_at);

    let mut current_size: u64 = entries.iter().map(|e| e.size_bytes).sum();
    let mut victims = Vec::new();
    for entry in entries {
        if current_size.saturating_add(incoming) <= policy.max_size_bytes {
            break;
        }
        current_size = current_size.saturating_sub(entry.size_bytes);
        victims.push(entry);
    }
    victims
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size: u64, age_secs: u64) -> BlobEntry {
        BlobEntry {
            path: PathBuf::from(name),
            size_bytes: size,
            written_at: SystemTime::now() - Duration::from_secs(age_secs),
        }
    }

    #[test]
    fn test_policy_from_config() {
        let config = CacheConfig {
            max_size_gb: 1.0,
            ttl_hours: 2.0,
            ..CacheConfig::default()
        };
        let policy = EvictionPolicy::from_config(&config);
        assert_eq!(policy.max_size_bytes, 1024 * 1024 * 1024);
        assert_eq!(policy.ttl, Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_zero_means_unlimited() {
        let config = CacheConfig {
            max_size_gb: 0.0,
            ttl_hours: 0.0,
            ..CacheConfig::default()
        };
        let policy = EvictionPolicy::from_config(&config);
        assert_eq!(policy.max_size_bytes, 0);
        assert!(policy.ttl.is_none());
        assert!(policy.admits(u64::MAX));
        assert!(plan_eviction(vec![entry("a", 10, 5)], 10, &policy).is_empty());
    }

    #[test]
    fn test_oldest_evicted_first() {
        let policy = EvictionPolicy {
            max_size_bytes: 100,
            ttl: None,
        };
        let entries = vec![entry("new", 40, 10), entry("old", 40, 300), entry("mid", 10, 100)];

        let victims = plan_eviction(entries, 30, &policy);

        let names: Vec<_> = victims.iter().map(|v| v.path.to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["old"]);
    }

    #[test]
    fn test_evicts_until_fit() {
        let policy = EvictionPolicy {
            max_size_bytes: 100,
            ttl: None,
        };
        let entries = vec![entry("a", 50, 30), entry("b", 50, 20), entry("c", 0, 10)];

        let victims = plan_eviction(entries, 100, &policy);
        assert_eq!(victims.len(), 2);
    }

    #[test]
    fn test_expiry() {
        let policy = EvictionPolicy {
            max_size_bytes: 0,
            ttl: Some(Duration::from_secs(60)),
        };
        let now = SystemTime::now();
        assert!(policy.is_expired(now - Duration::from_secs(120), now));
        assert!(!policy.is_expired(now - Duration::from_secs(10), now));
    }

    #[test]
    fn test_blob_names() {
        assert!(is_blob_name(&"a".repeat(64)));
        assert!(!is_blob_name(".tmpXyZ"));
        assert!(!is_blob_name(&"A".repeat(64)));
    }
}
