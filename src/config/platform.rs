//! Typed platform configuration
//!
//! Deserialized from the merged effective config value.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::promotion::PromotionConfig;
use crate::signing::VerificationPolicy;

use super::ConfigError;

/// Default sigstore public-good endpoints
pub const DEFAULT_OIDC_ISSUER: &str = "https://oauth2.sigstore.dev/auth";
pub const DEFAULT_FULCIO_URL: &str = "https://fulcio.sigstore.dev";
pub const DEFAULT_REKOR_URL: &str = "https://rekor.sigstore.dev";

/// Complete configuration for the artifact platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub registry: RegistryConfig,

    #[serde(default)]
    pub promotion: PromotionConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
}

impl PlatformConfig {
    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry.location()?;
        if self.registry.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "registry.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if let Some(cache) = &self.registry.cache {
            if cache.max_size_gb < 0.0 || cache.ttl_hours < 0.0 {
                return Err(ConfigError::ValidationError(
                    "registry.cache limits must not be negative".to_string(),
                ));
            }
        }
        self.promotion.validate()
    }
}

/// Registry connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// `oci://host/repo`, `https://host/repo`, `http://host/repo` or `file:///path`
    pub uri: String,

    #[serde(default)]
    pub auth: RegistryAuth,

    #[serde(default = "default_true")]
    pub tls_verify: bool,

    #[serde(default = "default_registry_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub cache: Option<CacheConfig>,

    #[serde(default)]
    pub verification: Option<VerificationPolicy>,
}

impl RegistryConfig {
    /// Minimal config for a registry URI
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            auth: RegistryAuth::Anonymous,
            tls_verify: true,
            timeout_seconds: default_registry_timeout(),
            cache: None,
            verification: None,
        }
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Resolve the URI into a concrete location
    pub fn location(&self) -> Result<RegistryLocation, ConfigError> {
        RegistryLocation::parse(&self.uri)
    }
}

/// Registry credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryAuth {
    #[default]
    Anonymous,
    Basic {
        username: String,
        password: String,
    },
    Token {
        token: String,
    },
}

/// Where the registry lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryLocation {
    /// OCI distribution endpoint
    Remote {
        /// Scheme + host (+ port), no trailing slash
        base_url: String,
        /// Repository path within the registry
        repository: String,
    },
    /// Local directory registry
    Directory(PathBuf),
}

impl RegistryLocation {
    /// Parse a registry URI
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        if let Some(path) = uri.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ConfigError::InvalidUri(uri.to_string()));
            }
            return Ok(RegistryLocation::Directory(PathBuf::from(path)));
        }

        let (scheme, rest) = if let Some(rest) = uri.strip_prefix("oci://") {
            ("https", rest)
        } else if let Some(rest) = uri.strip_prefix("https://") {
            ("https", rest)
        } else if let Some(rest) = uri.strip_prefix("http://") {
            ("http", rest)
        } else {
            return Err(ConfigError::InvalidUri(uri.to_string()));
        };

        let (host, repository) = rest
            .split_once('/')
            .ok_or_else(|| ConfigError::InvalidUri(uri.to_string()))?;
        let repository = repository.trim_matches('/');
        if host.is_empty() || repository.is_empty() {
            return Err(ConfigError::InvalidUri(uri.to_string()));
        }

        Ok(RegistryLocation::Remote {
            base_url: format!("{}://{}", scheme, host),
            repository: repository.to_string(),
        })
    }
}

/// Keyless signing endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default = "default_oidc_issuer")]
    pub oidc_issuer: String,

    #[serde(default = "default_fulcio_url")]
    pub fulcio_url: String,

    #[serde(default = "default_rekor_url")]
    pub rekor_url: String,

    /// Pre-issued identity token (CI ambient credentials)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,

    /// Base64 Ed25519 key of a self-hosted certificate authority; replaces
    /// Fulcio when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_private_key: Option<String>,

    #[serde(default = "default_signing_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            oidc_issuer: default_oidc_issuer(),
            fulcio_url: default_fulcio_url(),
            rekor_url: default_rekor_url(),
            identity_token: None,
            authority_private_key: None,
            timeout_seconds: default_signing_timeout(),
        }
    }
}

/// Table-format catalog used for contract metadata registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// REST catalog base URI
    pub uri: String,

    /// Namespace that receives contract properties
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_catalog_timeout")]
    pub timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_registry_timeout() -> u64 {
    30
}

fn default_signing_timeout() -> u64 {
    30
}

fn default_catalog_timeout() -> u64 {
    10
}

fn default_oidc_issuer() -> String {
    DEFAULT_OIDC_ISSUER.to_string()
}

fn default_fulcio_url() -> String {
    DEFAULT_FULCIO_URL.to_string()
}

fn default_rekor_url() -> String {
    DEFAULT_REKOR_URL.to_string()
}
