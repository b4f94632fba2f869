//! Policy-based artifact verification
//!
//! Findings are collected first, then the effective enforcement level decides
//! what happens to them:
//! - `off`: nothing is checked
//! - `warn`: findings are logged and returned
//! - `enforce`: any finding is a [`ArtifactError::SignatureVerification`]

use floe_oci::Digest;
use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, Result};

use super::attestation::Attestation;
use super::bundle::SigningMetadata;
use super::policy::{Enforcement, TrustedIdentity, VerificationPolicy};

/// Overall verification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Every check passed
    Verified,
    /// Checks failed under `warn`; content accepted
    Warned,
    /// Policy is off or disabled
    Skipped,
}

/// What verification concluded
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub artifact_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub enforcement: Enforcement,
    pub status: VerificationStatus,
    /// Verified signer identity, if the signature checked out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<TrustedIdentity>,
    pub sbom_present: bool,
    pub warnings: Vec<String>,
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

/// Applies a [`VerificationPolicy`]
#[derive(Debug, Clone)]
pub struct Verifier {
    policy: VerificationPolicy,
}

impl Verifier {
    pub fn new(policy: VerificationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Verify `content` against its signature and attestations
    pub fn verify(
        &self,
        content: &[u8],
        metadata: Option<&SigningMetadata>,
        attestations: &[Attestation],
        artifact_ref: &str,
        environment: Option<&str>,
    ) -> Result<VerificationResult> {
        self.verify_digest(
            &Digest::compute(content),
            metadata,
            attestations,
            artifact_ref,
            environment,
        )
    }

    /// Verify by content digest, when the bytes are already addressed
    pub fn verify_digest(
        &self,
        digest: &Digest,
        metadata: Option<&SigningMetadata>,
        attestations: &[Attestation],
        artifact_ref: &str,
        environment: Option<&str>,
    ) -> Result<VerificationResult> {
        let effective = self.policy.effective(environment);
        let mut result = VerificationResult {
            artifact_ref: artifact_ref.to_string(),
            environment: environment.map(str::to_string),
            enforcement: effective.enforcement,
            status: VerificationStatus::Skipped,
            signer: None,
            sbom_present: false,
            warnings: Vec::new(),
        };

        if effective.enforcement == Enforcement::Off {
            tracing::debug!(artifact = artifact_ref, "verification skipped (enforcement off)");
            return Ok(result);
        }

        let mut findings = Vec::new();

        match metadata {
            None => findings.push("artifact is unsigned: no signature found".to_string()),
            Some(meta) => match meta.bundle.verify_digest(digest) {
                Err(e) => findings.push(format!("signature is invalid: {}", e)),
                Ok(()) => match self.certified_identity(meta) {
                    Err(finding) => findings.push(finding),
                    Ok(identity) if self.is_trusted(&identity) => result.signer = Some(identity),
                    Ok(identity) => findings.push(format!(
                        "signer identity mismatch: issuer '{}' subject '{}' is not a trusted identity",
                        identity.issuer, identity.subject
                    )),
                },
            },
        }

        result.sbom_present = attestations.iter().any(|a| {
            a.is_sbom()
                && a.verify_for(digest).is_ok()
                && self
                    .certified_identity(&a.signing)
                    .is_ok_and(|identity| self.is_trusted(&identity))
        });
        if effective.require_sbom && !result.sbom_present {
            findings.push("no SBOM attestation attached".to_string());
        }

        if findings.is_empty() {
            result.status = VerificationStatus::Verified;
            tracing::debug!(artifact = artifact_ref, %digest, "artifact verified");
            return Ok(result);
        }

        match effective.enforcement {
            Enforcement::Enforce => Err(ArtifactError::SignatureVerification {
                artifact_ref: artifact_ref.to_string(),
                message: findings.join("; "),
            }),
            _ => {
                for finding in &findings {
                    tracing::warn!(
                        artifact = artifact_ref,
                        environment = environment.unwrap_or("-"),
                        "{}",
                        finding
                    );
                }
                result.status = VerificationStatus::Warned;
                result.warnings = findings;
                Ok(result)
            }
        }
    }

    /// Identity from a trusted certificate that binds the bundle's key
    ///
    /// The signature itself must already have been checked against
    /// `bundle.public_key`.
    fn certified_identity(&self, meta: &SigningMetadata) -> std::result::Result<TrustedIdentity, String> {
        let claims = self
            .policy
            .trusted_authorities
            .verify(&meta.bundle.certificate)
            .map_err(|e| format!("certificate is not trusted: {}", e))?;

        if claims.public_key != meta.bundle.public_key {
            return Err("certificate does not bind the signing key".to_string());
        }
        if claims.issuer != meta.issuer || claims.subject != meta.subject {
            return Err(format!(
                "signing metadata claims '{}' '{}' but certificate names '{}' '{}'",
                meta.issuer, meta.subject, claims.issuer, claims.subject
            ));
        }

        let entry = meta
            .bundle
            .log_entry
            .as_ref()
            .ok_or_else(|| "signature has no transparency log entry".to_string())?;
        if entry.log_index == 0 || meta.rekor_log_index != Some(entry.log_index) {
            return Err(format!(
                "transparency log index {} does not match the signing metadata",
                entry.log_index
            ));
        }
        if !claims.valid_at(entry.integrated_time) {
            return Err("signature was logged outside the certificate validity window".to_string());
        }

        Ok(TrustedIdentity::new(claims.issuer, claims.subject))
    }

    fn is_trusted(&self, identity: &TrustedIdentity) -> bool {
        self.policy
            .trusted_set()
            .contains(&(identity.issuer.as_str(), identity.subject.as_str()))
    }
}
