//! Errors for digest, manifest and tag handling

/// Errors produced while building or decoding artifact metadata
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("invalid digest '{0}': expected sha256: followed by 64 lowercase hex characters")]
    InvalidDigest(String),

    #[error("artifact content is empty")]
    EmptyContent,

    #[error("manifest has no layers")]
    NoLayers,

    #[error("manifest is missing required annotation '{0}'")]
    MissingAnnotation(String),

    #[error("invalid annotation '{key}': {reason}")]
    InvalidAnnotation { key: String, reason: String },

    #[error("invalid tag '{0}'")]
    InvalidTag(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
