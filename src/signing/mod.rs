//! Signing and verification
//!
//! - Keyless signing: identity token -> short-lived certificate -> ephemeral
//!   Ed25519 signature -> transparency log entry
//! - In-toto attestations (SBOMs and other predicates)
//! - Policy-based verification with per-environment overrides
//! - SBOM generation through an external tool

mod attestation;
mod authority;
mod bundle;
mod certificate;
mod error;
pub mod fake;
mod identity;
mod policy;
mod sbom;
mod signer;
mod tlog;
mod verify;

pub use attestation::{
    create_attestation, is_sbom_predicate, Attestation, Statement, StatementSubject,
    ATTESTATION_MEDIA_TYPE, CYCLONEDX_PREDICATE_TYPE, SPDX_PREDICATE_TYPE, STATEMENT_TYPE,
};
pub use authority::{public_key_pem, CertificateAuthority, FulcioClient, SigningCertificate};
pub use bundle::{
    LogEntry, SignatureBundle, SignatureStatus, SigningMetadata, SigningMode, BUNDLE_MEDIA_TYPE,
    SIGNATURE_ALGORITHM,
};
pub use certificate::{
    key_fingerprint, CertificateClaims, IdentityCertificate, LocalCertificateAuthority, TrustRoot,
    CERTIFICATE_PEM_LABEL,
};
pub use error::{SbomError, SigningError};
pub use identity::{AmbientTokenProvider, IdentityToken, IdentityTokenProvider, StaticTokenProvider};
#[cfg(test)]
pub(crate) use identity::test_token;
pub use policy::{EffectivePolicy, Enforcement, EnvironmentPolicy, TrustedIdentity, VerificationPolicy};
pub use sbom::{SbomDocument, SbomFormat, SbomGenerator, SbomOutcome, DEFAULT_SBOM_TOOL};
pub use signer::KeylessSigner;
pub use tlog::{LogSubmission, RekorClient, TransparencyLog};
pub use verify::{VerificationResult, VerificationStatus, Verifier};
