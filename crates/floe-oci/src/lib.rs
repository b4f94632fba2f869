//! Floe OCI model
//!
//! Content addressing, manifest structure, annotation encoding and tag naming
//! shared by the registry client, signing and promotion layers.

pub mod annotations;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod tag;

pub use digest::Digest;
pub use error::ManifestError;
pub use manifest::{
    ArtifactManifest, LayerDescriptor, OciManifest, ARTIFACT_MEDIA_TYPE, EMPTY_CONFIG,
    EMPTY_CONFIG_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE,
};
pub use tag::ArtifactTag;
