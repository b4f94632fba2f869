//! Registry transport seam
//!
//! The client speaks to the registry only through [`RegistryTransport`], which
//! exposes the handful of blob/manifest/tag primitives the platform needs:
//! - [`HttpTransport`](super::HttpTransport): OCI distribution v2 over HTTP(S)
//! - [`DirectoryTransport`](super::DirectoryTransport): `file://` local registry
//! - [`MemoryTransport`](super::MemoryTransport): in-process registry for tests

use std::io;

use floe_oci::Digest;

/// Registry storage primitives
pub trait RegistryTransport: Send + Sync {
    /// Whether a blob is already present
    fn blob_exists(&self, digest: &Digest) -> Result<bool, TransportError>;

    /// Upload a blob under its digest
    fn put_blob(&self, digest: &Digest, bytes: &[u8]) -> Result<(), TransportError>;

    /// Download a blob
    fn get_blob(&self, digest: &Digest) -> Result<Vec<u8>, TransportError>;

    /// Store a manifest under a tag or digest reference, returning its digest
    fn put_manifest(&self, reference: &str, bytes: &[u8]) -> Result<Digest, TransportError>;

    /// Fetch a manifest by tag or digest reference
    fn get_manifest(&self, reference: &str) -> Result<(Vec<u8>, Digest), TransportError>;

    /// All tags in the repository
    fn list_tags(&self) -> Result<Vec<String>, TransportError>;

    /// Human-readable registry location for logs and messages
    fn describe(&self) -> String;
}

/// Transport errors
///
/// Absence, credential problems and infrastructure failures are separate
/// variants so callers can decide what is worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}
