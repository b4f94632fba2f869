//! Signing and SBOM errors

use std::io;
use std::path::PathBuf;

/// Failures while producing a signature or attestation
///
/// Signing has no soft-failure mode: every one of these reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("no identity token available: {0}")]
    IdentityToken(String),

    #[error("identity token issued by '{actual}', expected '{expected}'")]
    IssuerMismatch { expected: String, actual: String },

    #[error("certificate authority error: {0}")]
    Certificate(String),

    #[error("transparency log error: {0}")]
    TransparencyLog(String),

    #[error("transparency log returned invalid index {0}")]
    InvalidLogIndex(i64),

    #[error("only keyless signing is supported")]
    KeyedModeUnsupported,

    #[error("cannot read predicate {}: {message}", .path.display())]
    Predicate { path: PathBuf, message: String },

    #[error("malformed signature bundle: {0}")]
    MalformedBundle(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// SBOM generation failures
#[derive(Debug, thiserror::Error)]
pub enum SbomError {
    #[error("SBOM tool '{tool}' not found on PATH")]
    ToolNotFound { tool: String },

    #[error("SBOM generation failed: {0}")]
    GenerationFailed(String),

    #[error("SBOM generation timed out after {0}s")]
    Timeout(u64),

    #[error("project directory does not exist: {}", .0.display())]
    MissingProject(PathBuf),

    #[error("SBOM tool produced invalid JSON: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
