//! OIDC identity tokens
//!
//! The token's signature is checked by the certificate authority, not here;
//! we only read the `iss` / `sub` / `email` claims to know which identity the
//! certificate will carry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;

use crate::config::env::ENV_ID_TOKEN;

use super::error::SigningError;

/// A raw OIDC token and the identity it asserts
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken {
    pub raw: String,
    pub issuer: String,
    pub subject: String,
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityToken")
            .field("raw", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("subject", &self.subject)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    iss: String,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl IdentityToken {
    /// Decode the claims of a compact JWT
    ///
    /// The subject is the `email` claim when present, otherwise `sub`.
    pub fn parse(raw: &str) -> Result<Self, SigningError> {
        let raw = raw.trim();
        let mut parts = raw.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => {
                return Err(SigningError::IdentityToken(
                    "token is not a compact JWT".to_string(),
                ))
            }
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| SigningError::IdentityToken(format!("invalid token payload: {}", e)))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| SigningError::IdentityToken(format!("invalid token claims: {}", e)))?;

        let subject = claims
            .email
            .or(claims.sub)
            .ok_or_else(|| SigningError::IdentityToken("token has no subject".to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            issuer: claims.iss,
            subject,
        })
    }
}

/// Source of short-lived identity tokens
pub trait IdentityTokenProvider: Send + Sync {
    fn token(&self) -> Result<IdentityToken, SigningError>;
}

/// A token handed over directly (e.g. from config)
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    raw: String,
}

impl StaticTokenProvider {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

impl IdentityTokenProvider for StaticTokenProvider {
    fn token(&self) -> Result<IdentityToken, SigningError> {
        IdentityToken::parse(&self.raw)
    }
}

/// Ambient CI credentials from `SIGSTORE_ID_TOKEN`
#[derive(Debug, Clone, Default)]
pub struct AmbientTokenProvider;

impl IdentityTokenProvider for AmbientTokenProvider {
    fn token(&self) -> Result<IdentityToken, SigningError> {
        match std::env::var(ENV_ID_TOKEN) {
            Ok(raw) if !raw.trim().is_empty() => IdentityToken::parse(&raw),
            _ => Err(SigningError::IdentityToken(format!(
                "{} is not set; run in a CI environment with OIDC or pass a token",
                ENV_ID_TOKEN
            ))),
        }
    }
}

/// Build an unsigned compact JWT carrying the given claims
#[cfg(test)]
pub(crate) fn test_token(issuer: &str, subject: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let claims = serde_json::json!({"iss": issuer, "sub": subject});
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}
