//! Local cache integration tests
//!
//! Size and TTL eviction, corruption handling, concurrent writers sharing
//! one directory, and read-through behavior in front of the registry.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use floe_artifacts::cache::{CacheConfig, CacheManager};
use floe_artifacts::registry::MemoryTransport;
use floe_artifacts::{Digest, PushOptions, RegistryClient};
use tempfile::TempDir;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

fn blob_path(dir: &TempDir, digest: &Digest) -> std::path::PathBuf {
    dir.path().join("blobs").join("sha256").join(digest.hex())
}

#[test]
fn test_put_then_get() {
    let dir = TempDir::new().unwrap();
    let cache = CacheManager::new(CacheConfig::at(dir.path()));
    let digest = Digest::compute(b"artifact");

    assert!(cache.get(&digest).is_none());
    cache.put(&digest, b"artifact").unwrap();
    assert_eq!(cache.get(&digest).unwrap(), b"artifact");

    let stats = cache.stats().unwrap();
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.total_size_bytes, 8);
}

#[test]
fn test_corrupt_entry_is_a_miss_and_removed() {
    let dir = TempDir::new().unwrap();
    let cache = CacheManager::new(CacheConfig::at(dir.path()));
    let digest = Digest::compute(b"artifact");
    cache.put(&digest, b"artifact").unwrap();

    fs::write(blob_path(&dir, &digest), b"tampered").unwrap();
    assert!(cache.get(&digest).is_none());
    assert!(!blob_path(&dir, &digest).exists());
}

#[test]
fn test_size_limit_evicts_oldest() {
    let dir = TempDir::new().unwrap();
    let mut config = CacheConfig::at(dir.path());
    config.max_size_gb = 100.0 / BYTES_PER_GB;
    let cache = CacheManager::new(config);

    let first = vec![1u8; 60];
    let second = vec![2u8; 60];
    let first_digest = Digest::compute(&first);
    let second_digest = Digest::compute(&second);

    cache.put(&first_digest, &first).unwrap();
    cache.put(&second_digest, &second).unwrap();

    assert!(cache.get(&first_digest).is_none());
    assert_eq!(cache.get(&second_digest).unwrap(), second);
    assert!(cache.stats().unwrap().total_size_bytes <= 100);
}

#[test]
fn test_oversized_entry_not_cached() {
    let dir = TempDir::new().unwrap();
    let mut config = CacheConfig::at(dir.path());
    config.max_size_gb = 10.0 / BYTES_PER_GB;
    let cache = CacheManager::new(config);

    let big = vec![7u8; 64];
    let digest = Digest::compute(&big);
    cache.put(&digest, &big).unwrap();
    assert!(cache.get(&digest).is_none());
}

#[test]
fn test_expired_entry_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let mut config = CacheConfig::at(dir.path());
    config.ttl_hours = 1e-9;
    let cache = CacheManager::new(config);

    let digest = Digest::compute(b"short-lived");
    cache.put(&digest, b"short-lived").unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(cache.get(&digest).is_none());
}

#[test]
fn test_disabled_cache_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let mut config = CacheConfig::at(dir.path());
    config.enabled = false;
    let cache = CacheManager::new(config);

    let digest = Digest::compute(b"artifact");
    cache.put(&digest, b"artifact").unwrap();
    assert!(cache.get(&digest).is_none());
    assert!(!dir.path().join("blobs").exists());
}

#[test]
fn test_clear_removes_blobs_and_tags() {
    let dir = TempDir::new().unwrap();
    let cache = CacheManager::new(CacheConfig::at(dir.path()));
    let digest = Digest::compute(b"artifact");
    cache.put(&digest, b"artifact").unwrap();
    cache.put_tag("v1.0.0", &digest).unwrap();

    cache.clear().unwrap();
    assert!(cache.get(&digest).is_none());
    assert!(cache.get_tag("v1.0.0").is_none());
    assert_eq!(cache.stats().unwrap().entry_count, 0);

    // Clearing an empty cache is fine
    cache.clear().unwrap();
}

#[test]
fn test_concurrent_writers_share_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let path = path.clone();
            thread::spawn(move || {
                // Separate managers stand in for separate processes
                let cache = CacheManager::new(CacheConfig::at(path));
                let shared = b"shared artifact".to_vec();
                let own = vec![i; 32];
                for _ in 0..10 {
                    cache.put(&Digest::compute(&shared), &shared).unwrap();
                    cache.put(&Digest::compute(&own), &own).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let cache = CacheManager::new(CacheConfig::at(&path));
    assert_eq!(
        cache.get(&Digest::compute(b"shared artifact")).unwrap(),
        b"shared artifact"
    );
    for i in 0..8u8 {
        let own = vec![i; 32];
        assert_eq!(cache.get(&Digest::compute(&own)).unwrap(), own);
    }
    assert_eq!(cache.stats().unwrap().entry_count, 9);
}

#[test]
fn test_corrupt_cache_falls_back_to_registry() {
    let dir = TempDir::new().unwrap();
    let transport = MemoryTransport::new();
    let client = RegistryClient::with_transport(Arc::new(transport.clone()))
        .with_cache(CacheManager::new(CacheConfig::at(dir.path())));

    let digest = client
        .push_bytes(b"compiled", "v1.0.0", &PushOptions::default())
        .unwrap();
    fs::write(blob_path(&dir, &digest), b"garbage").unwrap();

    assert_eq!(client.pull_bytes("v1.0.0", None).unwrap(), b"compiled");
    assert_eq!(transport.blob_fetches(), 1);

    // Refilled by the pull
    client.pull_bytes("v1.0.0", None).unwrap();
    assert_eq!(transport.blob_fetches(), 1);
}
