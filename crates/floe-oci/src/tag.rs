//! Tags and tag naming conventions
//!
//! - release tag: `v1.0.0`
//! - environment tag: `{tag}-{environment}`
//! - mutable latest tag: `latest-{environment}`
//! - rollback tag: `v{X.Y.Z}-{environment}-rollback-{N}` (N starts at 1 per environment)
//! - referrer tags: `sha256-<hex>.sig` / `sha256-<hex>.att`

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::{Digest, ManifestError};

/// Suffix of signature referrer tags
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Suffix of attestation referrer tags
pub const ATTESTATION_SUFFIX: &str = ".att";

/// Prefix of environment lock tags
pub const LOCK_PREFIX: &str = "floe-lock-";

/// Maximum tag length allowed by the OCI distribution spec
pub const MAX_TAG_LEN: usize = 128;

/// A mutable pointer to a digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTag {
    /// Tag name
    pub name: String,

    /// Content digest the tag resolves to
    pub digest: Digest,

    /// When the referenced artifact was created
    pub created_at: DateTime<Utc>,
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]*$").expect("tag pattern is a valid regex")
    })
}

fn release_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^v?\d+\.\d+\.\d+$").expect("release pattern is a valid regex"))
}

/// Validate a tag against the OCI tag grammar
pub fn validate(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() || name.len() > MAX_TAG_LEN || !tag_pattern().is_match(name) {
        return Err(ManifestError::InvalidTag(name.to_string()));
    }
    Ok(())
}

/// Whether `name` is an immutable release tag (`vX.Y.Z` or `X.Y.Z`)
pub fn is_release_tag(name: &str) -> bool {
    release_pattern().is_match(name)
}

/// `{tag}-{environment}`
pub fn environment_tag(tag: &str, environment: &str) -> String {
    format!("{}-{}", tag, environment)
}

/// `latest-{environment}`
pub fn latest_tag(environment: &str) -> String {
    format!("latest-{}", environment)
}

/// Tag holding the persisted lock state of an environment
pub fn lock_tag(environment: &str) -> String {
    format!("{}{}", LOCK_PREFIX, environment)
}

/// `v{X.Y.Z}-{environment}-rollback-{N}`
pub fn rollback_tag(tag: &str, environment: &str, sequence: u32) -> String {
    let version = if tag.starts_with('v') {
        tag.to_string()
    } else {
        format!("v{}", tag)
    };
    format!("{}-{}-rollback-{}", version, environment, sequence)
}

/// Extract N from a rollback tag belonging to `environment`
pub fn rollback_sequence(name: &str, environment: &str) -> Option<u32> {
    let (prefix, sequence) = name.rsplit_once("-rollback-")?;
    let env_suffix = format!("-{}", environment);
    if !prefix.ends_with(&env_suffix) || prefix.len() == env_suffix.len() {
        return None;
    }
    if sequence.is_empty() || !sequence.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    sequence.parse().ok()
}

/// Signature referrer tag for a content digest
pub fn signature_tag(digest: &Digest) -> String {
    format!("{}{}", digest.tag_safe(), SIGNATURE_SUFFIX)
}

/// Attestation referrer tag for a content digest
pub fn attestation_tag(digest: &Digest) -> String {
    format!("{}{}", digest.tag_safe(), ATTESTATION_SUFFIX)
}

/// Whether a tag is platform bookkeeping rather than an artifact tag
pub fn is_internal(name: &str) -> bool {
    name.starts_with(LOCK_PREFIX)
        || (name.starts_with("sha256-")
            && (name.ends_with(SIGNATURE_SUFFIX) || name.ends_with(ATTESTATION_SUFFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_conventions() {
        assert_eq!(environment_tag("v1.0.0", "staging"), "v1.0.0-staging");
        assert_eq!(latest_tag("prod"), "latest-prod");
        assert_eq!(rollback_tag("v1.0.0", "prod", 1), "v1.0.0-prod-rollback-1");
        assert_eq!(rollback_tag("2.3.4", "dev", 7), "v2.3.4-dev-rollback-7");
        assert_eq!(lock_tag("prod"), "floe-lock-prod");
    }

    #[test]
    fn test_rollback_sequence() {
        assert_eq!(rollback_sequence("v1.0.0-prod-rollback-3", "prod"), Some(3));
        assert_eq!(rollback_sequence("v1.0.0-prod-rollback-3", "staging"), None);
        assert_eq!(rollback_sequence("v1.0.0-preprod-rollback-2", "prod"), None);
        assert_eq!(rollback_sequence("v1.0.0-prod-rollback-x", "prod"), None);
        assert_eq!(rollback_sequence("v1.0.0-prod", "prod"), None);
    }

    #[test]
    fn test_validate() {
        assert!(validate("v1.0.0").is_ok());
        assert!(validate("latest-prod").is_ok());
        assert!(validate("").is_err());
        assert!(validate("-leading-dash").is_err());
        assert!(validate("has space").is_err());
        assert!(validate(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_release_tags() {
        assert!(is_release_tag("v1.0.0"));
        assert!(is_release_tag("10.2.33"));
        assert!(!is_release_tag("v1.0.0-prod"));
        assert!(!is_release_tag("latest-dev"));
    }

    #[test]
    fn test_referrer_tags() {
        let digest = Digest::compute(b"artifact");
        let sig = signature_tag(&digest);
        let att = attestation_tag(&digest);
        assert!(sig.ends_with(".sig"));
        assert!(att.ends_with(".att"));
        assert!(validate(&sig).is_ok());
        assert!(is_internal(&sig));
        assert!(is_internal(&att));
        assert!(is_internal("floe-lock-prod"));
        assert!(!is_internal("v1.0.0"));
    }
}
