//! Keyless signing flow
//!
//! 1. Obtain an identity token
//! 2. Generate an ephemeral Ed25519 key
//! 3. Exchange token + proof of possession for a short-lived certificate
//! 4. Sign the payload
//! 5. Record signature and certificate in the transparency log
//!
//! The private key never leaves this function.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use ed25519_dalek::{Signer as _, SigningKey};
use floe_oci::Digest;

use crate::config::SigningConfig;

use super::authority::{CertificateAuthority, FulcioClient};
use super::bundle::{
    SignatureBundle, SigningMetadata, SigningMode, BUNDLE_MEDIA_TYPE, SIGNATURE_ALGORITHM,
};
use super::certificate::LocalCertificateAuthority;
use super::error::SigningError;
use super::identity::{AmbientTokenProvider, IdentityTokenProvider, StaticTokenProvider};
use super::tlog::{LogSubmission, RekorClient, TransparencyLog};

/// Signs artifacts with short-lived, identity-bound keys
pub struct KeylessSigner {
    tokens: Box<dyn IdentityTokenProvider>,
    authority: Box<dyn CertificateAuthority>,
    log: Box<dyn TransparencyLog>,
    expected_issuer: Option<String>,
}

impl KeylessSigner {
    pub fn new(
        tokens: Box<dyn IdentityTokenProvider>,
        authority: Box<dyn CertificateAuthority>,
        log: Box<dyn TransparencyLog>,
    ) -> Self {
        Self {
            tokens,
            authority,
            log,
            expected_issuer: None,
        }
    }

    /// Reject tokens from any other issuer
    pub fn with_expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Signer for the configured authority and transparency log
    ///
    /// A configured `authority_private_key` selects the local authority;
    /// otherwise certificates come from Fulcio.
    pub fn from_config(config: &SigningConfig) -> Result<Self, SigningError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let tokens: Box<dyn IdentityTokenProvider> = match &config.identity_token {
            Some(raw) => Box::new(StaticTokenProvider::new(raw.clone())),
            None => Box::new(AmbientTokenProvider),
        };
        let authority: Box<dyn CertificateAuthority> = match &config.authority_private_key {
            Some(key) => Box::new(LocalCertificateAuthority::from_base64(key)?),
            None => Box::new(FulcioClient::new(&config.fulcio_url, timeout)),
        };
        Ok(Self::new(
            tokens,
            authority,
            Box::new(RekorClient::new(&config.rekor_url, timeout)),
        )
        .with_expected_issuer(&config.oidc_issuer))
    }

    /// Sign artifact content
    pub fn sign(&self, content: &[u8], artifact_ref: &str) -> Result<SigningMetadata, SigningError> {
        self.sign_digest(&Digest::compute(content), artifact_ref)
    }

    /// Sign an artifact by digest; the signed bytes are the digest string
    pub fn sign_digest(
        &self,
        digest: &Digest,
        artifact_ref: &str,
    ) -> Result<SigningMetadata, SigningError> {
        let metadata = self.sign_payload(digest.as_str().as_bytes(), digest)?;
        tracing::info!(
            artifact = artifact_ref,
            %digest,
            issuer = %metadata.issuer,
            subject = %metadata.subject,
            log_index = metadata.rekor_log_index,
            "signed artifact"
        );
        Ok(metadata)
    }

    /// Sign arbitrary payload bytes on behalf of `subject_digest`
    pub fn sign_payload(
        &self,
        payload: &[u8],
        subject_digest: &Digest,
    ) -> Result<SigningMetadata, SigningError> {
        let token = self.tokens.token()?;
        if let Some(expected) = &self.expected_issuer {
            if expected.trim_end_matches('/') != token.issuer.trim_end_matches('/') {
                return Err(SigningError::IssuerMismatch {
                    expected: expected.clone(),
                    actual: token.issuer,
                });
            }
        }

        let key = SigningKey::generate(&mut rand::thread_rng());
        let proof = key.sign(token.subject.as_bytes());
        let certificate = self
            .authority
            .issue(&token, &key.verifying_key(), &proof)?;

        let signature = key.sign(payload);
        let signature_bytes = signature.to_bytes();

        let entry = self.log.submit(&LogSubmission {
            payload,
            signature: &signature_bytes,
            certificate: &certificate.pem_chain,
        })?;
        if entry.log_index == 0 {
            return Err(SigningError::InvalidLogIndex(0));
        }

        let bundle = SignatureBundle {
            media_type: BUNDLE_MEDIA_TYPE.to_string(),
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            artifact_digest: subject_digest.clone(),
            signature: STANDARD.encode(signature_bytes),
            public_key: STANDARD.encode(key.verifying_key().as_bytes()),
            certificate: certificate.pem_chain,
            log_entry: Some(entry.clone()),
        };

        Ok(SigningMetadata {
            mode: SigningMode::Keyless,
            issuer: certificate.issuer,
            subject: certificate.subject,
            bundle,
            rekor_log_index: Some(entry.log_index),
            signed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::fake::FakeTransparencyLog;
    use crate::signing::LocalCertificateAuthority;
    use crate::signing::identity::test_token;

    fn signer(log: FakeTransparencyLog) -> KeylessSigner {
        KeylessSigner::new(
            Box::new(StaticTokenProvider::new(test_token(
                "https://token.actions.githubusercontent.com",
                "repo:acme/floe",
            ))),
            Box::new(LocalCertificateAuthority::new()),
            Box::new(log),
        )
    }

    #[test]
    fn test_sign_produces_verifiable_bundle() {
        let metadata = signer(FakeTransparencyLog::new()).sign(b"content", "v1.0.0").unwrap();

        assert_eq!(metadata.mode, SigningMode::Keyless);
        assert_eq!(metadata.issuer, "https://token.actions.githubusercontent.com");
        assert_eq!(metadata.subject, "repo:acme/floe");
        assert!(metadata.rekor_log_index.unwrap() > 0);
        metadata
            .bundle
            .verify_digest(&Digest::compute(b"content"))
            .unwrap();
    }

    #[test]
    fn test_signature_does_not_verify_other_content() {
        let metadata = signer(FakeTransparencyLog::new()).sign(b"content", "v1.0.0").unwrap();
        assert!(metadata
            .bundle
            .verify_digest(&Digest::compute(b"tampered"))
            .is_err());
    }

    #[test]
    fn test_each_signing_uses_fresh_key() {
        let s = signer(FakeTransparencyLog::new());
        let a = s.sign(b"content", "v1").unwrap();
        let b = s.sign(b"content", "v1").unwrap();
        assert_ne!(a.bundle.public_key, b.bundle.public_key);
    }

    #[test]
    fn test_zero_log_index_is_error() {
        let err = signer(FakeTransparencyLog::starting_at(0))
            .sign(b"content", "v1.0.0")
            .unwrap_err();
        assert!(matches!(err, SigningError::InvalidLogIndex(0)));
    }

    #[test]
    fn test_log_failure_propagates() {
        let err = signer(FakeTransparencyLog::failing())
            .sign(b"content", "v1.0.0")
            .unwrap_err();
        assert!(matches!(err, SigningError::TransparencyLog(_)));
    }

    #[test]
    fn test_issuer_mismatch() {
        let err = signer(FakeTransparencyLog::new())
            .with_expected_issuer("https://oauth2.sigstore.dev/auth")
            .sign(b"content", "v1.0.0")
            .unwrap_err();
        assert!(matches!(err, SigningError::IssuerMismatch { .. }));
    }

    #[test]
    fn test_from_config_authority_key() {
        let mut config = SigningConfig::default();
        config.authority_private_key = Some(STANDARD.encode([3u8; 32]));
        assert!(KeylessSigner::from_config(&config).is_ok());

        config.authority_private_key = Some("not-a-key".to_string());
        let err = KeylessSigner::from_config(&config).err().unwrap();
        assert!(matches!(err, SigningError::Certificate(_)));
    }
}
