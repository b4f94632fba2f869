//! `file://` registry transport
//!
//! Layout under the root:
//! - `blobs/sha256/<hex>`: content and config blobs
//! - `manifests/sha256/<hex>`: manifests by digest
//! - `tags/<tag>`: manifest digest the tag points at
//!
//! Every write is temp-file-then-rename, so concurrent readers see either the
//! old or the new tag, never a torn one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use floe_oci::Digest;
use tempfile::NamedTempFile;

use super::transport::{RegistryTransport, TransportError};

/// Local directory registry
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root.join("blobs").join("sha256").join(digest.hex())
    }

    fn manifest_path(&self, digest: &Digest) -> PathBuf {
        self.root.join("manifests").join("sha256").join(digest.hex())
    }

    fn tag_dir(&self) -> PathBuf {
        self.root.join("tags")
    }

    fn tag_path(&self, tag: &str) -> Result<PathBuf, TransportError> {
        floe_oci::tag::validate(tag).map_err(|e| TransportError::Protocol(e.to_string()))?;
        Ok(self.tag_dir().join(tag))
    }

    fn resolve(&self, reference: &str) -> Result<Digest, TransportError> {
        if let Ok(digest) = Digest::parse(reference) {
            return Ok(digest);
        }

        // A malformed tag can never have been written
        if floe_oci::tag::validate(reference).is_err() {
            return Err(TransportError::NotFound(reference.to_string()));
        }
        let path = self.tag_path(reference)?;
        let raw = read_or_not_found(&path, reference)?;
        let text = String::from_utf8_lossy(&raw);
        Digest::parse(text.trim()).map_err(|e| {
            TransportError::Protocol(format!("corrupt tag file {}: {}", path.display(), e))
        })
    }
}

impl RegistryTransport for DirectoryTransport {
    fn blob_exists(&self, digest: &Digest) -> Result<bool, TransportError> {
        Ok(self.blob_path(digest).is_file())
    }

    fn put_blob(&self, digest: &Digest, bytes: &[u8]) -> Result<(), TransportError> {
        if !digest.matches(bytes) {
            return Err(TransportError::Protocol(format!(
                "blob content does not match {}",
                digest
            )));
        }
        write_atomic(&self.blob_path(digest), bytes)?;
        Ok(())
    }

    fn get_blob(&self, digest: &Digest) -> Result<Vec<u8>, TransportError> {
        read_or_not_found(&self.blob_path(digest), digest.as_str())
    }

    fn put_manifest(&self, reference: &str, bytes: &[u8]) -> Result<Digest, TransportError> {
        let digest = Digest::compute(bytes);
        write_atomic(&self.manifest_path(&digest), bytes)?;

        if Digest::parse(reference).is_err() {
            let tag_path = self.tag_path(reference)?;
            write_atomic(&tag_path, digest.as_str().as_bytes())?;
        }
        Ok(digest)
    }

    fn get_manifest(&self, reference: &str) -> Result<(Vec<u8>, Digest), TransportError> {
        let digest = self.resolve(reference)?;
        let bytes = read_or_not_found(&self.manifest_path(&digest), reference)?;
        Ok((bytes, digest))
    }

    fn list_tags(&self) -> Result<Vec<String>, TransportError> {
        let dir = self.tag_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut tags = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            // Skip in-flight temp files
            if floe_oci::tag::validate(&name).is_ok() && !name.starts_with(".tmp") {
                tags.push(name);
            }
        }
        tags.sort();
        Ok(tags)
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

fn read_or_not_found(path: &Path, reference: &str) -> Result<Vec<u8>, TransportError> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(TransportError::NotFound(reference.to_string()))
        }
        Err(e) => Err(TransportError::Io(e)),
    }
}

fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), TransportError> {
    let dir = target
        .parent()
        .ok_or_else(|| TransportError::Protocol(format!("no parent for {}", target.display())))?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| TransportError::Io(e.error))?;
    Ok(())
}
