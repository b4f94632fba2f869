//! In-process registry transport
//!
//! Clones share the same backing store, so two clients (or two promotion
//! controllers) built from clones of one `MemoryTransport` see each other's
//! writes the way they would against a real registry. Supports:
//! - Blob fetch counters (to observe cache behaviour)
//! - Failure injection per operation, optionally for N calls only

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use floe_oci::Digest;

use super::transport::{RegistryTransport, TransportError};

/// Transport operation, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOp {
    BlobExists,
    PutBlob,
    GetBlob,
    PutManifest,
    GetManifest,
    ListTags,
}

impl TransportOp {
    pub const ALL: [TransportOp; 6] = [
        TransportOp::BlobExists,
        TransportOp::PutBlob,
        TransportOp::GetBlob,
        TransportOp::PutManifest,
        TransportOp::GetManifest,
        TransportOp::ListTags,
    ];
}

/// Kind of failure to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Unreachable,
    Unauthorized,
    Tls,
    Timeout,
    ServerError,
}

impl InjectedFailure {
    fn to_error(self, registry: &str) -> TransportError {
        match self {
            InjectedFailure::Unreachable => {
                TransportError::Connection(format!("{} is unreachable", registry))
            }
            InjectedFailure::Unauthorized => {
                TransportError::Authentication(format!("HTTP 401 from {}", registry))
            }
            InjectedFailure::Tls => {
                TransportError::Tls(format!("{}: certificate verify failed", registry))
            }
            InjectedFailure::Timeout => TransportError::Timeout(registry.to_string()),
            InjectedFailure::ServerError => {
                TransportError::Protocol(format!("HTTP 503 from {}", registry))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureConfig {
    failure: InjectedFailure,
    /// Number of times to fail before succeeding (None = always fail)
    fail_count: Option<u32>,
    calls: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    blobs: HashMap<Digest, Vec<u8>>,
    manifests: HashMap<Digest, Vec<u8>>,
    tags: BTreeMap<String, Digest>,
    failures: HashMap<TransportOp, FailureConfig>,
    blob_fetches: u64,
    manifest_fetches: u64,
    manifest_puts: u64,
}

impl MemoryState {
    fn check(&mut self, op: TransportOp) -> Result<(), TransportError> {
        if let Some(config) = self.failures.get_mut(&op) {
            config.calls += 1;
            let exhausted = config.fail_count.is_some_and(|limit| config.calls > limit);
            if !exhausted {
                return Err(config.failure.to_error(MEMORY_REGISTRY));
            }
        }
        Ok(())
    }
}

const MEMORY_REGISTRY: &str = "memory://registry";

/// Shared in-memory registry
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every operation fail
    pub fn fail_all(&self, failure: InjectedFailure) {
        for op in TransportOp::ALL {
            self.fail(op, failure, None);
        }
    }

    /// Make one operation fail, `fail_count` times or forever
    pub fn fail(&self, op: TransportOp, failure: InjectedFailure, fail_count: Option<u32>) {
        self.state().failures.insert(
            op,
            FailureConfig {
                failure,
                fail_count,
                calls: 0,
            },
        );
    }

    /// Remove all injected failures
    pub fn heal(&self) {
        self.state().failures.clear();
    }

    /// Number of `get_blob` calls served
    pub fn blob_fetches(&self) -> u64 {
        self.state().blob_fetches
    }

    /// Number of `get_manifest` calls served
    pub fn manifest_fetches(&self) -> u64 {
        self.state().manifest_fetches
    }

    /// Number of `put_manifest` calls served
    pub fn manifest_puts(&self) -> u64 {
        self.state().manifest_puts
    }

    /// Digest a tag currently points at, bypassing failure injection
    pub fn tag_target(&self, tag: &str) -> Option<Digest> {
        self.state().tags.get(tag).cloned()
    }
}

impl RegistryTransport for MemoryTransport {
    fn blob_exists(&self, digest: &Digest) -> Result<bool, TransportError> {
        let mut state = self.state();
        state.check(TransportOp::BlobExists)?;
        Ok(state.blobs.contains_key(digest))
    }

    fn put_blob(&self, digest: &Digest, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state();
        state.check(TransportOp::PutBlob)?;
        if !digest.matches(bytes) {
            return Err(TransportError::Protocol(format!(
                "blob content does not match {}",
                digest
            )));
        }
        state.blobs.insert(digest.clone(), bytes.to_vec());
        Ok(())
    }

    fn get_blob(&self, digest: &Digest) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state();
        state.check(TransportOp::GetBlob)?;
        state.blob_fetches += 1;
        state
            .blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(digest.to_string()))
    }

    fn put_manifest(&self, reference: &str, bytes: &[u8]) -> Result<Digest, TransportError> {
        let mut state = self.state();
        state.check(TransportOp::PutManifest)?;
        state.manifest_puts += 1;
        let digest = Digest::compute(bytes);
        state.manifests.insert(digest.clone(), bytes.to_vec());
        if Digest::parse(reference).is_err() {
            floe_oci::tag::validate(reference)
                .map_err(|e| TransportError::Protocol(e.to_string()))?;
            state.tags.insert(reference.to_string(), digest.clone());
        }
        Ok(digest)
    }

    fn get_manifest(&self, reference: &str) -> Result<(Vec<u8>, Digest), TransportError> {
        let mut state = self.state();
        state.check(TransportOp::GetManifest)?;
        state.manifest_fetches += 1;

        let digest = match Digest::parse(reference) {
            Ok(digest) => digest,
            Err(_) => state
                .tags
                .get(reference)
                .cloned()
                .ok_or_else(|| TransportError::NotFound(reference.to_string()))?,
        };
        let bytes = state
            .manifests
            .get(&digest)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(reference.to_string()))?;
        Ok((bytes, digest))
    }

    fn list_tags(&self) -> Result<Vec<String>, TransportError> {
        let mut state = self.state();
        state.check(TransportOp::ListTags)?;
        Ok(state.tags.keys().cloned().collect())
    }

    fn describe(&self) -> String {
        MEMORY_REGISTRY.to_string()
    }
}
