//! In-toto attestations
//!
//! A predicate document is wrapped in an in-toto Statement v1 whose subject is
//! the artifact digest, signed through the keyless flow, and stored next to the
//! artifact under its `.att` referrer tag.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use floe_oci::Digest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::bundle::SigningMetadata;
use super::error::SigningError;
use super::signer::KeylessSigner;

/// In-toto statement type
pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";

/// Attestation layer media type
pub const ATTESTATION_MEDIA_TYPE: &str = "application/vnd.in-toto+json";

/// SPDX predicate type
pub const SPDX_PREDICATE_TYPE: &str = "https://spdx.dev/Document";

/// CycloneDX predicate type
pub const CYCLONEDX_PREDICATE_TYPE: &str = "https://cyclonedx.org/bom";

/// Whether a predicate type is a software bill of materials
pub fn is_sbom_predicate(predicate_type: &str) -> bool {
    predicate_type.starts_with(SPDX_PREDICATE_TYPE)
        || predicate_type.starts_with(CYCLONEDX_PREDICATE_TYPE)
}

/// Statement subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementSubject {
    pub name: String,
    /// Algorithm -> hex
    pub digest: std::collections::BTreeMap<String, String>,
}

/// In-toto Statement v1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    pub subject: Vec<StatementSubject>,
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    pub predicate: Value,
}

impl Statement {
    pub fn new(name: &str, digest: &Digest, predicate_type: &str, predicate: Value) -> Self {
        let mut digests = std::collections::BTreeMap::new();
        digests.insert("sha256".to_string(), digest.hex().to_string());
        Self {
            statement_type: STATEMENT_TYPE.to_string(),
            subject: vec![StatementSubject {
                name: name.to_string(),
                digest: digests,
            }],
            predicate_type: predicate_type.to_string(),
            predicate,
        }
    }

    /// Whether the statement is about `digest`
    pub fn covers(&self, digest: &Digest) -> bool {
        self.subject
            .iter()
            .any(|s| s.digest.get("sha256").map(String::as_str) == Some(digest.hex()))
    }

    /// Canonical bytes that get signed
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, SigningError> {
        serde_json_canonicalizer::to_vec(self)
            .map_err(|e| SigningError::MalformedBundle(format!("canonical JSON: {}", e)))
    }
}

/// A signed statement attached to an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub predicate_type: String,
    pub statement: Statement,
    pub signing: SigningMetadata,
    pub created_at: DateTime<Utc>,
}

impl Attestation {
    /// Check the statement signature and subject
    pub fn verify_for(&self, digest: &Digest) -> Result<(), SigningError> {
        if !self.statement.covers(digest) {
            return Err(SigningError::MalformedBundle(format!(
                "attestation subject does not cover {}",
                digest
            )));
        }
        self.signing
            .bundle
            .verify_payload(&self.statement.canonical_bytes()?)
    }

    pub fn is_sbom(&self) -> bool {
        is_sbom_predicate(&self.predicate_type)
    }
}

/// Build and sign an attestation from a predicate file
///
/// Only keyless signing exists; `keyless = false` is rejected.
pub fn create_attestation(
    signer: &KeylessSigner,
    artifact_ref: &str,
    digest: &Digest,
    predicate_path: &Path,
    predicate_type: &str,
    keyless: bool,
) -> Result<Attestation, SigningError> {
    if !keyless {
        return Err(SigningError::KeyedModeUnsupported);
    }

    let raw = fs::read(predicate_path).map_err(|e| SigningError::Predicate {
        path: predicate_path.to_path_buf(),
        message: e.to_string(),
    })?;
    let predicate: Value = serde_json::from_slice(&raw).map_err(|e| SigningError::Predicate {
        path: predicate_path.to_path_buf(),
        message: e.to_string(),
    })?;

    let statement = Statement::new(artifact_ref, digest, predicate_type, predicate);
    let signing = signer.sign_payload(&statement.canonical_bytes()?, digest)?;

    tracing::info!(
        artifact = artifact_ref,
        %digest,
        predicate_type,
        "created attestation"
    );

    Ok(Attestation {
        predicate_type: predicate_type.to_string(),
        statement,
        signing,
        created_at: Utc::now(),
    })
}
