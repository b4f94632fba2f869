//! Disk-backed cache manager

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use floe_oci::Digest;
use tempfile::NamedTempFile;

use super::eviction::{plan_eviction, scan_blobs, EvictionPolicy};
use super::{CacheConfig, CacheError, CacheResult, CacheStats};

/// Read-through blob and tag cache
#[derive(Debug, Clone)]
pub struct CacheManager {
    config: CacheConfig,
    policy: EvictionPolicy,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        let policy = EvictionPolicy::from_config(&config);
        Self { config, policy }
    }

    /// Cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn blob_dir(&self) -> PathBuf {
        self.config.path.join("blobs").join("sha256")
    }

    fn tag_dir(&self) -> PathBuf {
        self.config.path.join("tags")
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.blob_dir().join(digest.hex())
    }

    /// Look up a blob; any failure is a miss
    pub fn get(&self, digest: &Digest) -> Option<Vec<u8>> {
        if !self.config.enabled {
            return None;
        }

        let path = self.blob_path(digest);
        let written_at = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => {
                tracing::debug!(%digest, "cache miss");
                return None;
            }
        };

        if self.policy.is_expired(written_at, SystemTime::now()) {
            tracing::debug!(%digest, "cache entry expired");
            remove_quietly(&path);
            return None;
        }

        match fs::read(&path) {
            Ok(bytes) if digest.matches(&bytes) => {
                tracing::debug!(%digest, size = bytes.len(), "cache hit");
                Some(bytes)
            }
            Ok(_) => {
                tracing::warn!(%digest, path = %path.display(), "corrupt cache entry removed");
                remove_quietly(&path);
                None
            }
            Err(e) => {
                tracing::warn!(%digest, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a blob, evicting oldest entries first when over the size limit
    pub fn put(&self, digest: &Digest, bytes: &[u8]) -> CacheResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let size = bytes.len() as u64;
        if !self.policy.admits(size) {
            tracing::warn!(
                %digest,
                size,
                max_size_bytes = self.policy.max_size_bytes,
                "entry larger than cache limit, not cached"
            );
            return Ok(());
        }

        let blob_dir = self.blob_dir();
        fs::create_dir_all(&blob_dir)?;

        let target = self.blob_path(digest);
        let existing: Vec<_> = scan_blobs(&blob_dir)
            .into_iter()
            .filter(|e| e.path != target)
            .collect();
        for victim in plan_eviction(existing, size, &self.policy) {
            tracing::debug!(path = %victim.path.display(), size = victim.size_bytes, "evicting cache entry");
            remove_quietly(&victim.path);
        }

        write_atomic(&blob_dir, &target, bytes)
    }

    /// Cached digest for an immutable tag
    pub fn get_tag(&self, tag: &str) -> Option<Digest> {
        if !self.config.enabled || !is_safe_tag_name(tag) {
            return None;
        }

        let path = self.tag_dir().join(tag);
        let written_at = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        if self.policy.is_expired(written_at, SystemTime::now()) {
            remove_quietly(&path);
            return None;
        }

        let raw = fs::read_to_string(&path).ok()?;
        match Digest::parse(raw.trim()) {
            Ok(digest) => Some(digest),
            Err(_) => {
                remove_quietly(&path);
                None
            }
        }
    }

    /// Remember the digest an immutable tag resolves to
    pub fn put_tag(&self, tag: &str, digest: &Digest) -> CacheResult<()> {
        if !self.config.enabled || !is_safe_tag_name(tag) {
            return Ok(());
        }

        let tag_dir = self.tag_dir();
        fs::create_dir_all(&tag_dir)?;
        write_atomic(&tag_dir, &tag_dir.join(tag), digest.as_str().as_bytes())
    }

    /// Current blob usage
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let entries = scan_blobs(&self.blob_dir());
        Ok(CacheStats {
            path: self.config.path.clone(),
            total_size_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            entry_count: entries.len(),
            max_size_gb: self.config.max_size_gb,
        })
    }

    /// Remove every blob and tag entry
    pub fn clear(&self) -> CacheResult<()> {
        for dir in [self.blob_dir(), self.tag_dir()] {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::Io(e)),
            }
        }
        tracing::info!(path = %self.config.path.display(), "cache cleared");
        Ok(())
    }
}

/// Write into a temp file in `dir` then rename over `target`
fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> CacheResult<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| CacheError::Persist {
        path: target.to_path_buf(),
        message: e.error.to_string(),
    })?;
    Ok(())
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "failed to remove cache entry");
        }
    }
}

fn is_safe_tag_name(tag: &str) -> bool {
    !tag.is_empty() && !tag.starts_with('.') && !tag.contains(['/', '\\'])
}
