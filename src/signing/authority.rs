//! Short-lived signing certificates (Fulcio-style CA)

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Deserialize;
use serde_json::json;

use super::error::SigningError;
use super::identity::IdentityToken;

/// DER prefix of an Ed25519 SubjectPublicKeyInfo
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Certificate binding an ephemeral key to an OIDC identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCertificate {
    /// PEM chain, leaf first
    pub pem_chain: String,
    pub issuer: String,
    pub subject: String,
}

/// Issues signing certificates for an identity token
pub trait CertificateAuthority: Send + Sync {
    /// `proof` is the ephemeral key's signature over the token subject
    fn issue(
        &self,
        token: &IdentityToken,
        public_key: &VerifyingKey,
        proof: &Signature,
    ) -> Result<SigningCertificate, SigningError>;
}

/// Fulcio v2 HTTP client
pub struct FulcioClient {
    agent: ureq::Agent,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SigningCertResponse {
    #[serde(default)]
    signed_certificate_embedded_sct: Option<ChainHolder>,
    #[serde(default)]
    signed_certificate_detached_sct: Option<ChainHolder>,
}

#[derive(Debug, Deserialize)]
struct ChainHolder {
    chain: Chain,
}

#[derive(Debug, Deserialize)]
struct Chain {
    certificates: Vec<String>,
}

impl FulcioClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl CertificateAuthority for FulcioClient {
    fn issue(
        &self,
        token: &IdentityToken,
        public_key: &VerifyingKey,
        proof: &Signature,
    ) -> Result<SigningCertificate, SigningError> {
        let url = format!("{}/api/v2/signingCert", self.base_url);
        let request = json!({
            "credentials": {"oidcIdentityToken": token.raw},
            "publicKeyRequest": {
                "publicKey": {"algorithm": "ED25519", "content": public_key_pem(public_key)},
                "proofOfPossession": STANDARD.encode(proof.to_bytes()),
            }
        });

        let body = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .send(request.to_string().as_bytes())
            .map_err(|e| SigningError::Certificate(format!("{}: {}", url, e)))?
            .into_body()
            .read_to_vec()
            .map_err(|e| SigningError::Certificate(format!("{}: {}", url, e)))?;

        let response: SigningCertResponse = serde_json::from_slice(&body)
            .map_err(|e| SigningError::Certificate(format!("invalid response: {}", e)))?;
        let chain = response
            .signed_certificate_embedded_sct
            .or(response.signed_certificate_detached_sct)
            .map(|h| h.chain.certificates)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SigningError::Certificate("response carried no certificate".to_string()))?;

        Ok(SigningCertificate {
            pem_chain: chain.join("\n"),
            issuer: token.issuer.clone(),
            subject: token.subject.clone(),
        })
    }
}

/// PEM-encoded SubjectPublicKeyInfo for an Ed25519 key
pub fn public_key_pem(key: &VerifyingKey) -> String {
    let mut der = Vec::with_capacity(ED25519_SPKI_PREFIX.len() + 32);
    der.extend_from_slice(&ED25519_SPKI_PREFIX);
    der.extend_from_slice(key.as_bytes());
    format!(
        "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
        STANDARD.encode(der)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn test_public_key_pem_shape() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let pem = public_key_pem(&key.verifying_key());

        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----\n"));
        assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
        let body: String = pem.lines().nth(1).unwrap().to_string();
        let der = STANDARD.decode(body).unwrap();
        assert_eq!(der.len(), 44);
        assert_eq!(&der[..12], &ED25519_SPKI_PREFIX);
    }

    #[test]
    fn test_response_shapes() {
        let embedded: SigningCertResponse = serde_json::from_str(
            r#"{"signedCertificateEmbeddedSct":{"chain":{"certificates":["LEAF","ROOT"]}}}"#,
        )
        .unwrap();
        assert_eq!(
            embedded.signed_certificate_embedded_sct.unwrap().chain.certificates,
            vec!["LEAF", "ROOT"]
        );

        let detached: SigningCertResponse = serde_json::from_str(
            r#"{"signedCertificateDetachedSct":{"chain":{"certificates":["LEAF"]}}}"#,
        )
        .unwrap();
        assert!(detached.signed_certificate_detached_sct.is_some());
    }
}
