//! Identity certificates and the trust root that accepts them
//!
//! A certificate binds an ephemeral Ed25519 public key to an (issuer, subject)
//! identity for a short window. The issuing authority signs the canonical
//! JSON of the claims with its own Ed25519 key; verifiers pin authorities by
//! public key.
//!
//! Fulcio chains are X.509 and are not accepted by [`TrustRoot`]; enforcing
//! deployments sign through a [`LocalCertificateAuthority`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use super::authority::{CertificateAuthority, SigningCertificate};
use super::error::SigningError;
use super::identity::IdentityToken;

/// PEM label of an identity certificate
pub const CERTIFICATE_PEM_LABEL: &str = "FLOE CERTIFICATE";

const CERTIFICATE_LIFETIME_MINUTES: i64 = 10;

/// What the authority vouches for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateClaims {
    pub issuer: String,
    pub subject: String,
    /// Base64 raw Ed25519 key of the signer
    pub public_key: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Fingerprint of the issuing authority's key
    pub authority: String,
}

impl CertificateClaims {
    /// Whether a Unix timestamp falls inside the validity window
    pub fn valid_at(&self, unix_seconds: i64) -> bool {
        unix_seconds >= self.not_before.timestamp() && unix_seconds <= self.not_after.timestamp()
    }
}

/// Claims plus the authority signature over them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCertificate {
    pub claims: CertificateClaims,
    /// Base64 Ed25519 signature over the canonical claims
    pub signature: String,
}

impl IdentityCertificate {
    /// Sign `claims` with an authority key
    pub fn issue(authority: &SigningKey, claims: CertificateClaims) -> Result<Self, SigningError> {
        let signature = authority.sign(&canonical(&claims)?);
        Ok(Self {
            claims,
            signature: STANDARD.encode(signature.to_bytes()),
        })
    }

    pub fn to_pem(&self) -> Result<String, SigningError> {
        Ok(format!(
            "-----BEGIN {label}-----\n{}\n-----END {label}-----\n",
            STANDARD.encode(serde_json::to_vec(self)?),
            label = CERTIFICATE_PEM_LABEL
        ))
    }

    /// Leaf certificate of a PEM chain
    pub fn from_pem(pem: &str) -> Result<Self, SigningError> {
        let begin = format!("-----BEGIN {}-----", CERTIFICATE_PEM_LABEL);
        let end = format!("-----END {}-----", CERTIFICATE_PEM_LABEL);
        let body = pem
            .split_once(&begin)
            .and_then(|(_, rest)| rest.split_once(&end))
            .map(|(body, _)| body)
            .ok_or_else(|| {
                SigningError::Certificate(format!("no {} block found", CERTIFICATE_PEM_LABEL))
            })?;
        let compact: String = body.split_whitespace().collect();
        let raw = STANDARD
            .decode(compact)
            .map_err(|e| SigningError::Certificate(format!("certificate body: {}", e)))?;
        serde_json::from_slice(&raw)
            .map_err(|e| SigningError::Certificate(format!("certificate body: {}", e)))
    }
}

/// Certificate authority holding its Ed25519 key in process
///
/// Used for self-hosted signing (`signing.authority_private_key`) and in
/// tests. Certificates are valid for ten minutes from issue; verifiers pin
/// the authority through [`LocalCertificateAuthority::trust_root`].
#[derive(Debug, Clone)]
pub struct LocalCertificateAuthority {
    key: SigningKey,
}

impl LocalCertificateAuthority {
    /// Authority with a fresh random key
    pub fn new() -> Self {
        Self::from_key(SigningKey::generate(&mut rand::thread_rng()))
    }

    pub fn from_key(key: SigningKey) -> Self {
        Self { key }
    }

    /// Authority from a base64 32-byte Ed25519 secret key
    pub fn from_base64(encoded: &str) -> Result<Self, SigningError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SigningError::Certificate(format!("authority key: {}", e)))?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SigningError::Certificate("authority key must be 32 bytes".to_string())
        })?;
        Ok(Self::from_key(SigningKey::from_bytes(&secret)))
    }

    /// Trust root containing only this authority
    pub fn trust_root(&self) -> TrustRoot {
        TrustRoot::new().with_authority(&self.key.verifying_key())
    }
}

impl Default for LocalCertificateAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateAuthority for LocalCertificateAuthority {
    fn issue(
        &self,
        token: &IdentityToken,
        public_key: &VerifyingKey,
        proof: &Signature,
    ) -> Result<SigningCertificate, SigningError> {
        public_key
            .verify(token.subject.as_bytes(), proof)
            .map_err(|_| SigningError::Certificate("proof of possession does not verify".to_string()))?;

        let now = Utc::now();
        let certificate = IdentityCertificate::issue(
            &self.key,
            CertificateClaims {
                issuer: token.issuer.clone(),
                subject: token.subject.clone(),
                public_key: STANDARD.encode(public_key.as_bytes()),
                not_before: now,
                not_after: now + Duration::minutes(CERTIFICATE_LIFETIME_MINUTES),
                authority: key_fingerprint(&self.key.verifying_key()),
            },
        )?;
        Ok(SigningCertificate {
            pem_chain: certificate.to_pem()?,
            issuer: token.issuer.clone(),
            subject: token.subject.clone(),
        })
    }
}

/// SHA-256 hex fingerprint of a public key
pub fn key_fingerprint(key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Certificate authorities whose certificates are accepted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustRoot {
    /// Base64 raw Ed25519 authority keys
    authorities: Vec<String>,
}

impl TrustRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authority(mut self, key: &VerifyingKey) -> Self {
        self.authorities.push(STANDARD.encode(key.as_bytes()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    /// Parse a PEM chain and check its leaf against a pinned authority
    pub fn verify(&self, pem: &str) -> Result<CertificateClaims, SigningError> {
        let certificate = IdentityCertificate::from_pem(pem)?;
        let authority = self
            .authorities
            .iter()
            .filter_map(|encoded| decode_key(encoded).ok())
            .find(|key| key_fingerprint(key) == certificate.claims.authority)
            .ok_or_else(|| {
                SigningError::Certificate(format!(
                    "issuing authority {} is not trusted",
                    certificate.claims.authority
                ))
            })?;

        let signature = STANDARD
            .decode(&certificate.signature)
            .ok()
            .and_then(|bytes| Signature::from_slice(&bytes).ok())
            .ok_or_else(|| SigningError::Certificate("malformed authority signature".to_string()))?;
        authority
            .verify(&canonical(&certificate.claims)?, &signature)
            .map_err(|_| {
                SigningError::Certificate("authority signature does not verify".to_string())
            })?;
        Ok(certificate.claims)
    }
}

/// Decode a base64 raw Ed25519 public key
pub(crate) fn decode_key(encoded: &str) -> Result<VerifyingKey, SigningError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| SigningError::MalformedBundle(format!("public key: {}", e)))?;
    let array: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| SigningError::MalformedBundle("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&array)
        .map_err(|e| SigningError::MalformedBundle(format!("public key: {}", e)))
}

fn canonical(claims: &CertificateClaims) -> Result<Vec<u8>, SigningError> {
    serde_json_canonicalizer::to_vec(claims)
        .map_err(|e| SigningError::Certificate(format!("canonical JSON: {}", e)))
}
