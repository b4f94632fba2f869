//! Content digests
//!
//! A digest is `sha256:` followed by exactly 64 lowercase hex characters
//! (71 characters total). Identical bytes always produce the identical digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::ManifestError;

/// Algorithm prefix for every digest this crate produces
pub const ALGORITHM_PREFIX: &str = "sha256:";

/// Length of the hex-encoded SHA-256 portion
pub const HEX_LEN: usize = 64;

/// Total length of a rendered digest
pub const DIGEST_LEN: usize = ALGORITHM_PREFIX.len() + HEX_LEN;

/// Immutable identity of a content blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Compute the digest of a byte slice
    pub fn compute(bytes: &[u8]) -> Self {
        let hash = Sha256::digest(bytes);
        Self(format!("{}{}", ALGORITHM_PREFIX, hex::encode(hash)))
    }

    /// Parse and validate a rendered digest
    pub fn parse(value: &str) -> Result<Self, ManifestError> {
        let hex_part = value
            .strip_prefix(ALGORITHM_PREFIX)
            .ok_or_else(|| ManifestError::InvalidDigest(value.to_string()))?;

        let valid = hex_part.len() == HEX_LEN
            && hex_part
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !valid {
            return Err(ManifestError::InvalidDigest(value.to_string()));
        }

        Ok(Self(value.to_string()))
    }

    /// Full `sha256:<hex>` form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 64-character hex portion
    pub fn hex(&self) -> &str {
        &self.0[ALGORITHM_PREFIX.len()..]
    }

    /// Tag-safe rendering (`sha256-<hex>`), used for referrer tags
    pub fn tag_safe(&self) -> String {
        format!("sha256-{}", self.hex())
    }

    /// Check whether `bytes` hash to this digest
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::compute(bytes) == *self
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_format() {
        let digest = Digest::compute(b"compiled artifacts");
        assert_eq!(digest.as_str().len(), DIGEST_LEN);
        assert_eq!(DIGEST_LEN, 71);
        assert!(digest.as_str().starts_with("sha256:"));
        assert_eq!(digest.hex().len(), 64);
    }

    #[test]
    fn test_compute_deterministic() {
        let a = Digest::compute(b"{\"version\":\"0.2.0\"}");
        let b = Digest::compute(b"{\"version\":\"0.2.0\"}");
        let c = Digest::compute(b"{\"version\":\"0.3.0\"}");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_known_vector() {
        // SHA-256 of the empty string
        let digest = Digest::compute(b"");
        assert_eq!(
            digest.as_str(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Digest::parse("sha256:abc").is_err());
        assert!(Digest::parse("sha512:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855").is_err());
        // uppercase hex is not canonical
        assert!(Digest::parse("sha256:E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855").is_err());
        assert!(Digest::parse("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855").is_err());
    }

    #[test]
    fn test_tag_safe() {
        let digest = Digest::compute(b"x");
        let tag = digest.tag_safe();
        assert!(tag.starts_with("sha256-"));
        assert!(!tag.contains(':'));
    }

    #[test]
    fn test_serde_validates() {
        let digest = Digest::compute(b"payload");
        let json = serde_json::to_string(&digest).unwrap();
        let parsed: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, digest);

        let bad: Result<Digest, _> = serde_json::from_str("\"sha256:nothex\"");
        assert!(bad.is_err());
    }
}
