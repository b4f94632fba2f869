//! Catalog contract registration
//!
//! After a contract is validated its metadata is written as `floe.contract.*`
//! namespace properties in the data catalog. The catalog is a soft
//! dependency: registration failures come back as a warning on
//! [`RegistrationResult`] and are never raised.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use floe_oci::annotations;
use serde::{Deserialize, Serialize};

use crate::config::CatalogConfig;

/// Contract identity recorded in the catalog and on manifests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub contract_id: String,
    pub version: String,
    pub schema_hash: String,
    pub owner: String,
    pub registered_at: DateTime<Utc>,
}

impl ContractMetadata {
    pub fn new(
        contract_id: impl Into<String>,
        version: impl Into<String>,
        schema_hash: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            contract_id: contract_id.into(),
            version: version.into(),
            schema_hash: schema_hash.into(),
            owner: owner.into(),
            registered_at: Utc::now(),
        }
    }

    /// `floe.contract.*` properties; the timestamp is ISO-8601 UTC
    pub fn to_properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert(annotations::CONTRACT_ID.to_string(), self.contract_id.clone());
        props.insert(annotations::CONTRACT_VERSION.to_string(), self.version.clone());
        props.insert(
            annotations::CONTRACT_SCHEMA_HASH.to_string(),
            self.schema_hash.clone(),
        );
        props.insert(annotations::CONTRACT_OWNER.to_string(), self.owner.clone());
        props.insert(
            annotations::CONTRACT_REGISTERED_AT.to_string(),
            self.registered_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        props
    }
}

/// Catalog failures
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog unreachable: {0}")]
    Unreachable(String),

    #[error("catalog request timeout: {0}")]
    Timeout(String),

    #[error("permission denied by catalog: {0}")]
    PermissionDenied(String),

    #[error("catalog rejected request: {0}")]
    Rejected(String),
}

/// Outcome of a soft registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Minimal catalog surface needed for contract registration
pub trait CatalogClient: Send + Sync {
    fn set_namespace_properties(
        &self,
        namespace: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), CatalogError>;
}

/// Register contract metadata, reporting failure as a warning
pub fn register_contract_metadata(
    client: &dyn CatalogClient,
    namespace: &str,
    metadata: &ContractMetadata,
) -> RegistrationResult {
    match client.set_namespace_properties(namespace, &metadata.to_properties()) {
        Ok(()) => {
            tracing::info!(
                namespace,
                contract = %metadata.contract_id,
                version = %metadata.version,
                "registered contract metadata"
            );
            RegistrationResult {
                success: true,
                warning: None,
            }
        }
        Err(e) => {
            let warning = format!(
                "contract {} not registered in namespace '{}': {}",
                metadata.contract_id, namespace, e
            );
            tracing::warn!(namespace, contract = %metadata.contract_id, error = %e, "catalog registration degraded");
            RegistrationResult {
                success: false,
                warning: Some(warning),
            }
        }
    }
}

/// Iceberg REST catalog client (namespace properties endpoint)
pub struct RestCatalogClient {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl RestCatalogClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(
            &config.uri,
            config.token.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }
}

#[derive(Serialize)]
struct PropertiesUpdate<'a> {
    removals: Vec<String>,
    updates: &'a BTreeMap<String, String>,
}

impl CatalogClient for RestCatalogClient {
    fn set_namespace_properties(
        &self,
        namespace: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), CatalogError> {
        let url = format!(
            "{}/v1/namespaces/{}/properties",
            self.base_url,
            namespace.replace('.', "%1F")
        );
        let body = serde_json::to_vec(&PropertiesUpdate {
            removals: Vec::new(),
            updates: properties,
        })
        .map_err(|e| CatalogError::Rejected(e.to_string()))?;

        let mut request = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        request
            .send(&body[..])
            .map(|_| ())
            .map_err(|e| map_catalog_error(&url, &e))
    }
}

fn map_catalog_error(url: &str, err: &ureq::Error) -> CatalogError {
    match err {
        ureq::Error::StatusCode(code @ (401 | 403)) => {
            CatalogError::PermissionDenied(format!("HTTP {} from {}", code, url))
        }
        ureq::Error::StatusCode(code) => CatalogError::Rejected(format!("HTTP {} from {}", code, url)),
        ureq::Error::Timeout(_) => CatalogError::Timeout(url.to_string()),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            CatalogError::Unreachable(url.to_string())
        }
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            CatalogError::Timeout(url.to_string())
        }
        ureq::Error::Io(io) => CatalogError::Unreachable(format!("{}: {}", url, io)),
        other => CatalogError::Rejected(format!("{}: {}", url, other)),
    }
}
