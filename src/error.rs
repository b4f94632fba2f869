//! Error taxonomy and stable exit codes
//!
//! Every public operation returns [`ArtifactError`]. Infrastructure failures
//! (connection, timeout, TLS, registry 5xx) are kept apart from logic
//! rejections so callers can decide their own retry policy; nothing here
//! retries automatically.

use std::fmt;
use std::io;

use floe_oci::ManifestError;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::registry::{FilterError, TransportError};
use crate::signing::{SbomError, SigningError};

/// Result alias used across the crate
pub type Result<T, E = ArtifactError> = std::result::Result<T, E>;

/// Why a promotion edge was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionReason {
    /// Target precedes the source in the pipeline
    Backward,
    /// Target is more than one step ahead of the source
    Skip,
    /// Source and target are the same environment
    SameEnvironment,
    /// Environment is not part of the configured pipeline
    UnknownEnvironment(String),
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionReason::Backward => {
                write!(f, "backward promotion is not allowed")
            }
            TransitionReason::Skip => {
                write!(f, "skip promotion is not allowed; promote through each environment in order")
            }
            TransitionReason::SameEnvironment => {
                write!(f, "source and target environment are the same")
            }
            TransitionReason::UnknownEnvironment(name) => {
                write!(f, "unknown environment '{}'", name)
            }
        }
    }
}

/// Errors surfaced by registry, verification and promotion operations
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {reference}")]
    ArtifactNotFound { reference: String },

    #[error("invalid transition {} -> {to}: {reason}", .from.as_deref().unwrap_or("(none)"))]
    InvalidTransition {
        from: Option<String>,
        to: String,
        reason: TransitionReason,
    },

    #[error("environment '{environment}' is locked by {locked_by}: {reason}")]
    EnvironmentLocked {
        environment: String,
        reason: String,
        locked_by: String,
    },

    #[error("version '{tag}' was never promoted to environment '{environment}'")]
    VersionNotPromoted { tag: String, environment: String },

    #[error("signature verification failed for {artifact_ref}: {message}")]
    SignatureVerification {
        artifact_ref: String,
        message: String,
    },

    #[error("gate '{gate}' failed for environment '{environment}': {detail}")]
    GateValidation {
        gate: String,
        environment: String,
        detail: String,
    },

    #[error("cannot reach registry: {0}")]
    Connection(String),

    #[error("registry authentication failed: {0}")]
    Authentication(String),

    #[error("TLS failure talking to registry: {0}")]
    Tls(String),

    #[error("registry request timed out: {0}")]
    Timeout(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("artifact content does not match the declared schema: {0}")]
    Schema(String),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("SBOM error: {0}")]
    Sbom(#[from] SbomError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Filter(#[from] FilterError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArtifactError {
    /// Shorthand for a not-found error naming `reference`
    pub fn not_found(reference: impl Into<String>) -> Self {
        ArtifactError::ArtifactNotFound {
            reference: reference.into(),
        }
    }

    /// Stable, machine-readable error kind for CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactError::ArtifactNotFound { .. } => "ArtifactNotFoundError",
            ArtifactError::InvalidTransition { .. } => "InvalidTransitionError",
            ArtifactError::EnvironmentLocked { .. } => "EnvironmentLockedError",
            ArtifactError::VersionNotPromoted { .. } => "VersionNotPromotedError",
            ArtifactError::SignatureVerification { .. } => "SignatureVerificationError",
            ArtifactError::GateValidation { .. } => "GateValidationError",
            ArtifactError::Connection(_) => "RegistryConnectionError",
            ArtifactError::Authentication(_) => "AuthenticationError",
            ArtifactError::Tls(_) => "TlsError",
            ArtifactError::Timeout(_) => "TimeoutError",
            ArtifactError::Registry(_) => "RegistryError",
            ArtifactError::Schema(_) => "SchemaValidationError",
            ArtifactError::Signing(_) => "SigningError",
            ArtifactError::Sbom(_) => "SbomError",
            ArtifactError::Config(_) => "ConfigurationError",
            ArtifactError::Manifest(_) => "ManifestError",
            ArtifactError::Cache(_) => "CacheError",
            ArtifactError::Filter(_) => "InvalidFilterError",
            ArtifactError::Io(_) => "IoError",
            ArtifactError::Json(_) => "SerializationError",
        }
    }

    /// Stable exit code for CLI-facing callers
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ArtifactError::ArtifactNotFound { .. } => ExitCode::ArtifactNotFound,
            ArtifactError::InvalidTransition { .. } => ExitCode::InvalidTransition,
            ArtifactError::EnvironmentLocked { .. } => ExitCode::EnvironmentLocked,
            ArtifactError::VersionNotPromoted { .. } => ExitCode::VersionNotPromoted,
            ArtifactError::SignatureVerification { .. } => ExitCode::SignatureVerification,
            ArtifactError::GateValidation { .. } => ExitCode::GateFailed,
            ArtifactError::Authentication(_) | ArtifactError::Tls(_) => ExitCode::Authentication,
            ArtifactError::Connection(_)
            | ArtifactError::Timeout(_)
            | ArtifactError::Registry(_) => ExitCode::RegistryUnavailable,
            ArtifactError::Signing(_) | ArtifactError::Sbom(_) => ExitCode::Signing,
            ArtifactError::Config(_) => ExitCode::Config,
            ArtifactError::Schema(_)
            | ArtifactError::Manifest(_)
            | ArtifactError::Cache(_)
            | ArtifactError::Filter(_)
            | ArtifactError::Io(_)
            | ArtifactError::Json(_) => ExitCode::General,
        }
    }

    /// Whether the failure is an infrastructure condition worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArtifactError::Connection(_) | ArtifactError::Timeout(_) | ArtifactError::Registry(_)
        )
    }
}

impl From<TransportError> for ArtifactError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotFound(reference) => ArtifactError::ArtifactNotFound { reference },
            TransportError::Connection(msg) => ArtifactError::Connection(msg),
            TransportError::Authentication(msg) => ArtifactError::Authentication(msg),
            TransportError::Tls(msg) => ArtifactError::Tls(msg),
            TransportError::Timeout(msg) => ArtifactError::Timeout(msg),
            TransportError::Protocol(msg) => ArtifactError::Registry(msg),
            TransportError::Io(e) => ArtifactError::Io(e),
        }
    }
}

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Unexpected internal failure
    General = 1,
    /// Invalid or unreadable configuration
    Config = 2,
    /// Tag or digest absent from the registry
    ArtifactNotFound = 10,
    /// Illegal promotion edge
    InvalidTransition = 11,
    /// A promotion gate failed
    GateFailed = 12,
    /// Target environment is locked
    EnvironmentLocked = 13,
    /// Rollback target never reached the environment
    VersionNotPromoted = 14,
    /// Enforce-mode verification failure
    SignatureVerification = 15,
    /// Registry rejected credentials or TLS handshake failed
    Authentication = 16,
    /// Registry unreachable, timed out or returned a server error
    RegistryUnavailable = 17,
    /// Signing, attestation or SBOM generation failed
    Signing = 18,
}

impl ExitCode {
    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Create from integer value
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            1 => Some(ExitCode::General),
            2 => Some(ExitCode::Config),
            10 => Some(ExitCode::ArtifactNotFound),
            11 => Some(ExitCode::InvalidTransition),
            12 => Some(ExitCode::GateFailed),
            13 => Some(ExitCode::EnvironmentLocked),
            14 => Some(ExitCode::VersionNotPromoted),
            15 => Some(ExitCode::SignatureVerification),
            16 => Some(ExitCode::Authentication),
            17 => Some(ExitCode::RegistryUnavailable),
            18 => Some(ExitCode::Signing),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_maps_to_13() {
        let err = ArtifactError::EnvironmentLocked {
            environment: "prod".to_string(),
            reason: "incident".to_string(),
            locked_by: "oncall@example.com".to_string(),
        };
        assert_eq!(err.exit_code().as_i32(), 13);
        let msg = err.to_string();
        assert!(msg.contains("prod"));
        assert!(msg.contains("incident"));
        assert!(msg.contains("oncall@example.com"));
    }

    #[test]
    fn test_exit_codes_distinct() {
        let codes = [
            ExitCode::Success,
            ExitCode::General,
            ExitCode::Config,
            ExitCode::ArtifactNotFound,
            ExitCode::InvalidTransition,
            ExitCode::GateFailed,
            ExitCode::EnvironmentLocked,
            ExitCode::VersionNotPromoted,
            ExitCode::SignatureVerification,
            ExitCode::Authentication,
            ExitCode::RegistryUnavailable,
            ExitCode::Signing,
        ];
        for code in codes {
            assert_eq!(ExitCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ExitCode::from_i32(99), None);
    }

    #[test]
    fn test_transition_messages_distinguish_reason() {
        let backward = ArtifactError::InvalidTransition {
            from: Some("staging".to_string()),
            to: "dev".to_string(),
            reason: TransitionReason::Backward,
        };
        let skip = ArtifactError::InvalidTransition {
            from: Some("dev".to_string()),
            to: "prod".to_string(),
            reason: TransitionReason::Skip,
        };
        assert!(backward.to_string().contains("backward"));
        assert!(skip.to_string().contains("skip"));
        assert!(!skip.to_string().contains("backward"));
    }

    #[test]
    fn test_retryable_split() {
        assert!(ArtifactError::Connection("refused".to_string()).is_retryable());
        assert!(ArtifactError::Timeout("30s".to_string()).is_retryable());
        assert!(!ArtifactError::not_found("v1.0.0").is_retryable());
        assert!(!ArtifactError::Authentication("401".to_string()).is_retryable());
    }

    #[test]
    fn test_transport_not_found_keeps_reference() {
        let err: ArtifactError = TransportError::NotFound("v9.9.9".to_string()).into();
        assert!(matches!(err, ArtifactError::ArtifactNotFound { .. }));
        assert!(err.to_string().contains("v9.9.9"));
    }
}
