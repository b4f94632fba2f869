//! Signature bundles and signing metadata
//!
//! A bundle carries the signature, the ephemeral public key it verifies
//! under, the certificate binding that key to an identity, and the
//! transparency log entry. The key alone proves nothing about who signed:
//! identity comes from the certificate once a trust root accepts it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier};
use floe_oci::Digest;
use serde::{Deserialize, Serialize};

use super::certificate::decode_key;
use super::error::SigningError;
use super::policy::TrustedIdentity;

/// Bundle media type
pub const BUNDLE_MEDIA_TYPE: &str = "application/vnd.floe.signature-bundle.v1+json";

/// Signature algorithm identifier
pub const SIGNATURE_ALGORITHM: &str = "ed25519";

/// Signing mode; keyless is the only one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SigningMode {
    #[default]
    Keyless,
}

/// Transparency log inclusion record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log (> 0)
    pub log_index: u64,
    /// Entry UUID assigned by the log
    pub uuid: String,
    /// Unix seconds the entry was integrated
    pub integrated_time: i64,
}

/// Portable signature bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBundle {
    pub media_type: String,
    pub algorithm: String,
    /// Digest whose string form was signed
    pub artifact_digest: Digest,
    /// Base64 Ed25519 signature
    pub signature: String,
    /// Base64 raw 32-byte Ed25519 public key
    pub public_key: String,
    /// PEM certificate chain from the certificate authority
    pub certificate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_entry: Option<LogEntry>,
}

impl SignatureBundle {
    /// Check the signature over `digest` with the bundled key
    pub fn verify_digest(&self, digest: &Digest) -> Result<(), SigningError> {
        if &self.artifact_digest != digest {
            return Err(SigningError::MalformedBundle(format!(
                "bundle signs {} but content is {}",
                self.artifact_digest, digest
            )));
        }
        self.verify_payload(digest.as_str().as_bytes())
    }

    /// Check the signature over arbitrary payload bytes
    pub fn verify_payload(&self, payload: &[u8]) -> Result<(), SigningError> {
        let key = decode_key(&self.public_key)?;

        let sig_bytes = STANDARD
            .decode(&self.signature)
            .map_err(|e| SigningError::MalformedBundle(format!("signature: {}", e)))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| SigningError::MalformedBundle(format!("signature: {}", e)))?;

        key.verify(payload, &signature)
            .map_err(|_| SigningError::MalformedBundle("signature does not verify".to_string()))
    }
}

/// Result of a keyless signing operation, stored as the signature referrer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningMetadata {
    pub mode: SigningMode,
    /// OIDC issuer bound into the certificate
    pub issuer: String,
    /// Certificate subject
    pub subject: String,
    pub bundle: SignatureBundle,
    /// Transparency log index (> 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rekor_log_index: Option<u64>,
    pub signed_at: DateTime<Utc>,
}

impl SigningMetadata {
    pub fn identity(&self) -> TrustedIdentity {
        TrustedIdentity::new(&self.issuer, &self.subject)
    }

    /// Serialized bundle bytes
    pub fn bundle_bytes(&self) -> Result<Vec<u8>, SigningError> {
        Ok(serde_json::to_vec(&self.bundle)?)
    }
}

/// Derived signature state of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SignatureStatus {
    Signed { issuer: String, subject: String },
    Unsigned,
}

impl SignatureStatus {
    pub fn is_signed(&self) -> bool {
        matches!(self, SignatureStatus::Signed { .. })
    }
}
