//! Artifact manifests
//!
//! `OciManifest` is the wire form stored in the registry (OCI image manifest
//! v1 with an artifact type). `ArtifactManifest` is the platform view of it:
//! content digest, size, creation time, layers and annotations.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::annotations;
use crate::{Digest, ManifestError};

/// Media type of the OCI image manifest envelope
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Artifact (and layer) media type for compiled artifacts
pub const ARTIFACT_MEDIA_TYPE: &str = "application/vnd.floe.compiled-artifacts.v1+json";

/// Media type of the empty config descriptor
pub const EMPTY_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.empty.v1+json";

/// Bytes of the empty config blob
pub const EMPTY_CONFIG: &[u8] = b"{}";

/// A content descriptor (config or layer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,

    pub digest: Digest,

    pub size: u64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl LayerDescriptor {
    /// Describe a blob
    pub fn for_blob(media_type: &str, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.to_string(),
            digest: Digest::compute(bytes),
            size: bytes.len() as u64,
            annotations: BTreeMap::new(),
        }
    }

    /// Descriptor of the shared empty config blob
    pub fn empty_config() -> Self {
        Self::for_blob(EMPTY_CONFIG_MEDIA_TYPE, EMPTY_CONFIG)
    }
}

/// OCI image manifest as stored in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OciManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(rename = "mediaType")]
    pub media_type: String,

    #[serde(rename = "artifactType", default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    pub config: LayerDescriptor,

    pub layers: Vec<LayerDescriptor>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl OciManifest {
    /// Serialize for upload
    pub fn to_bytes(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse manifest bytes fetched from a registry
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Digest of the serialized manifest
    pub fn digest(&self) -> Result<Digest, ManifestError> {
        Ok(Digest::compute(&self.to_bytes()?))
    }
}

/// Platform view of a pushed compiled artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Digest of the primary content blob
    pub digest: Digest,

    /// Artifact media type
    pub artifact_type: String,

    /// Total content size in bytes (> 0)
    pub size: u64,

    /// When the artifact was pushed
    pub created_at: DateTime<Utc>,

    /// Content layers, primary layer first
    pub layers: Vec<LayerDescriptor>,

    /// Out-of-band string metadata
    pub annotations: BTreeMap<String, String>,
}

impl ArtifactManifest {
    /// Build a single-layer manifest for `content`
    pub fn for_content(
        content: &[u8],
        artifact_type: &str,
        annotations: BTreeMap<String, String>,
    ) -> Result<Self, ManifestError> {
        if content.is_empty() {
            return Err(ManifestError::EmptyContent);
        }

        let layer = LayerDescriptor::for_blob(artifact_type, content);
        Ok(Self {
            digest: layer.digest.clone(),
            artifact_type: artifact_type.to_string(),
            size: layer.size,
            created_at: Utc::now(),
            layers: vec![layer],
            annotations,
        })
    }

    /// Render the wire manifest. The creation timestamp travels as the
    /// standard `org.opencontainers.image.created` annotation.
    pub fn to_oci(&self) -> OciManifest {
        let mut annotations = self.annotations.clone();
        annotations.insert(
            annotations::CREATED.to_string(),
            self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );

        OciManifest {
            schema_version: 2,
            media_type: OCI_MANIFEST_MEDIA_TYPE.to_string(),
            artifact_type: Some(self.artifact_type.clone()),
            config: LayerDescriptor::empty_config(),
            layers: self.layers.clone(),
            annotations,
        }
    }

    /// Interpret a wire manifest
    pub fn from_oci(oci: &OciManifest) -> Result<Self, ManifestError> {
        let primary = oci.layers.first().ok_or(ManifestError::NoLayers)?;

        let mut annotations = oci.annotations.clone();
        let created = annotations
            .remove(annotations::CREATED)
            .ok_or_else(|| ManifestError::MissingAnnotation(annotations::CREATED.to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(&created)
            .map_err(|e| ManifestError::InvalidAnnotation {
                key: annotations::CREATED.to_string(),
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        let artifact_type = oci
            .artifact_type
            .clone()
            .unwrap_or_else(|| primary.media_type.clone());

        Ok(Self {
            digest: primary.digest.clone(),
            artifact_type,
            size: oci.layers.iter().map(|l| l.size).sum(),
            created_at,
            layers: oci.layers.clone(),
            annotations,
        })
    }

    /// Look up a single annotation
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Decode a JSON-encoded annotation value
    pub fn decode_annotation<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ManifestError> {
        self.annotation(key)
            .map(|raw| annotations::decode_json(key, raw))
            .transpose()
    }

    /// Set an annotation, returning the updated manifest
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}
