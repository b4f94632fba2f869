//! Manifest annotation keys and encoding
//!
//! Annotations are always strings. Structured values are JSON-encoded into a
//! single annotation value. The `floe.*` namespace is reserved for contract,
//! promotion and product metadata.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ManifestError;

/// Standard OCI creation timestamp annotation
pub const CREATED: &str = "org.opencontainers.image.created";

/// Standard OCI title annotation
pub const TITLE: &str = "org.opencontainers.image.title";

/// Reserved namespace prefix
pub const RESERVED_PREFIX: &str = "floe.";

/// Content size in bytes, as a decimal string
pub const ARTIFACT_SIZE: &str = "floe.artifact.size";

pub const CONTRACT_ID: &str = "floe.contract.id";
pub const CONTRACT_VERSION: &str = "floe.contract.version";
pub const CONTRACT_SCHEMA_HASH: &str = "floe.contract.schema_hash";
pub const CONTRACT_OWNER: &str = "floe.contract.owner";
pub const CONTRACT_REGISTERED_AT: &str = "floe.contract.registered_at";

pub const PRODUCT_NAME: &str = "floe.product.name";
pub const PRODUCT_VERSION: &str = "floe.product.version";
/// JSON list of downstream product names
pub const PRODUCT_DOWNSTREAM: &str = "floe.product.downstream";

/// JSON-encoded promotion record on an environment tag
pub const PROMOTION: &str = "floe.promotion";
/// JSON-encoded rollback record on a rollback tag
pub const ROLLBACK: &str = "floe.rollback";
/// JSON-encoded environment lock state
pub const ENVIRONMENT_LOCK: &str = "floe.environment.lock";
/// Environment name on lock/promotion manifests
pub const ENVIRONMENT: &str = "floe.environment";

/// Whether `key` lives in the reserved `floe.*` namespace
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// JSON-encode a structured value into an annotation string
pub fn encode_json<T: Serialize>(value: &T) -> Result<String, ManifestError> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a JSON annotation value
pub fn decode_json<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, ManifestError> {
    serde_json::from_str(raw).map_err(|e| ManifestError::InvalidAnnotation {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
