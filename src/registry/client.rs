//! Registry client
//!
//! Push, pull, inspect and list compiled artifacts, plus the referrer
//! bookkeeping used by signing and promotion:
//! - signatures under `sha256-<hex>.sig`, one layer of [`SigningMetadata`]
//! - attestations under `sha256-<hex>.att`, one layer per [`Attestation`]
//! - JSON documents (environment locks) under their own tag
//!
//! Content blobs go through the local cache; manifests never do. Tag to digest
//! resolution is cached only for immutable release tags.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use floe_oci::{
    annotations, tag as tags, ArtifactManifest, ArtifactTag, Digest, LayerDescriptor,
    OciManifest, ARTIFACT_MEDIA_TYPE, EMPTY_CONFIG,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheManager;
use crate::config::{RegistryConfig, RegistryLocation};
use crate::error::{ArtifactError, Result};
use crate::signing::{
    create_attestation, Attestation, KeylessSigner, SignatureStatus, SigningMetadata,
    VerificationPolicy, VerificationResult, Verifier, ATTESTATION_MEDIA_TYPE,
};

use super::directory::DirectoryTransport;
use super::filter::TagFilter;
use super::http::HttpTransport;
use super::transport::{RegistryTransport, TransportError};

/// Artifact type of signature referrer manifests
pub const SIGNATURE_MEDIA_TYPE: &str = "application/vnd.floe.signature.v1+json";

/// Artifact type of JSON state documents (locks)
pub const DOCUMENT_MEDIA_TYPE: &str = "application/vnd.floe.document.v1+json";

/// Options for a push
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Extra manifest annotations
    pub annotations: BTreeMap<String, String>,
    /// Artifact media type (defaults to the compiled-artifacts type)
    pub media_type: Option<String>,
}

impl PushOptions {
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Client for a single artifact repository
#[derive(Clone)]
pub struct RegistryClient {
    transport: Arc<dyn RegistryTransport>,
    cache: CacheManager,
    verifier: Option<Verifier>,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("registry", &self.transport.describe())
            .field("cache_enabled", &self.cache.is_enabled())
            .field("verification", &self.verifier.is_some())
            .finish()
    }
}

impl RegistryClient {
    /// Client for the configured registry, cache and verification policy
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let transport: Arc<dyn RegistryTransport> = match config.location()? {
            RegistryLocation::Remote {
                base_url,
                repository,
            } => Arc::new(HttpTransport::new(
                base_url,
                repository,
                &config.auth,
                config.tls_verify,
                config.timeout(),
            )),
            RegistryLocation::Directory(root) => Arc::new(DirectoryTransport::new(root)),
        };

        let cache = match &config.cache {
            Some(cache) => CacheManager::new(cache.clone()),
            None => CacheManager::disabled(),
        };

        let mut client = Self::with_transport(transport).with_cache(cache);
        if let Some(policy) = &config.verification {
            client = client.with_verification(policy.clone());
        }
        Ok(client)
    }

    /// Client over an explicit transport; no cache, no verification
    pub fn with_transport(transport: Arc<dyn RegistryTransport>) -> Self {
        Self {
            transport,
            cache: CacheManager::disabled(),
            verifier: None,
        }
    }

    pub fn with_cache(mut self, cache: CacheManager) -> Self {
        self.cache = cache;
        self
    }

    /// Verify every pull against `policy`
    pub fn with_verification(mut self, policy: VerificationPolicy) -> Self {
        self.verifier = Some(Verifier::new(policy));
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn verification_policy(&self) -> Option<&VerificationPolicy> {
        self.verifier.as_ref().map(Verifier::policy)
    }

    /// Registry location for messages
    pub fn registry(&self) -> String {
        self.transport.describe()
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Push raw content under `tag`, returning the content digest
    pub fn push_bytes(&self, content: &[u8], tag: &str, options: &PushOptions) -> Result<Digest> {
        tags::validate(tag)?;

        let mut annotations = options.annotations.clone();
        annotations.insert(
            annotations::ARTIFACT_SIZE.to_string(),
            content.len().to_string(),
        );
        let media_type = options.media_type.as_deref().unwrap_or(ARTIFACT_MEDIA_TYPE);
        let manifest = ArtifactManifest::for_content(content, media_type, annotations)?;

        self.upload_blob(&manifest.digest, content)?;
        self.write_manifest(&manifest, tag)?;
        self.cache_blob(&manifest.digest, content);
        if tags::is_release_tag(tag) {
            self.cache_tag(tag, &manifest.digest);
        }

        tracing::info!(
            registry = %self.transport.describe(),
            tag,
            digest = %manifest.digest,
            size = manifest.size,
            "pushed artifact"
        );
        Ok(manifest.digest)
    }

    /// Push a serializable value as canonical JSON
    pub fn push<T: Serialize>(&self, value: &T, tag: &str, options: &PushOptions) -> Result<Digest> {
        let bytes = canonical_json(value)?;
        self.push_bytes(&bytes, tag, options)
    }

    // ------------------------------------------------------------------
    // Pull / inspect / list
    // ------------------------------------------------------------------

    /// Artifact metadata for `tag`; the content blob is not downloaded
    pub fn inspect(&self, tag: &str) -> Result<ArtifactManifest> {
        let (manifest, _) = self.read_manifest(tag)?;
        Ok(manifest)
    }

    /// Content digest `tag` resolves to
    pub fn resolve_digest(&self, tag: &str) -> Result<Digest> {
        let release = tags::is_release_tag(tag);
        if release {
            if let Some(digest) = self.cache.get_tag(tag) {
                tracing::debug!(tag, %digest, "tag resolved from cache");
                return Ok(digest);
            }
        }

        let digest = self.inspect(tag)?.digest;
        if release {
            self.cache_tag(tag, &digest);
        }
        Ok(digest)
    }

    /// Pull content, verifying it if a policy is configured
    pub fn pull_bytes(&self, tag: &str, environment: Option<&str>) -> Result<Vec<u8>> {
        let (content, _) = self.pull_verified(tag, environment)?;
        Ok(content)
    }

    /// Pull content together with the verification outcome
    pub fn pull_verified(
        &self,
        tag: &str,
        environment: Option<&str>,
    ) -> Result<(Vec<u8>, Option<VerificationResult>)> {
        let digest = self.resolve_digest(tag)?;
        let content = self.fetch_blob(&digest)?;

        let verification = match &self.verifier {
            Some(verifier) => Some(self.verify_content(verifier, &digest, tag, environment)?),
            None => None,
        };

        tracing::debug!(tag, %digest, size = content.len(), "pulled artifact");
        Ok((content, verification))
    }

    /// Pull and deserialize; content that does not match `T` is a schema error
    pub fn pull<T: DeserializeOwned>(&self, tag: &str, environment: Option<&str>) -> Result<T> {
        let bytes = self.pull_bytes(tag, environment)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ArtifactError::Schema(format!("{}: {}", tag, e)))
    }

    /// Artifact tags, optionally filtered by substring or glob
    ///
    /// Lock and referrer tags are not listed.
    pub fn list(&self, filter: Option<&str>) -> Result<Vec<ArtifactTag>> {
        let filter = TagFilter::new(filter)?;
        let mut names: Vec<String> = self
            .transport
            .list_tags()?
            .into_iter()
            .filter(|name| !tags::is_internal(name) && filter.matches(name))
            .collect();
        names.sort();

        let mut listed = Vec::with_capacity(names.len());
        for name in names {
            match self.read_manifest(&name) {
                Ok((manifest, _)) => listed.push(ArtifactTag {
                    name,
                    digest: manifest.digest,
                    created_at: manifest.created_at,
                }),
                // Deleted between listing and lookup
                Err(ArtifactError::ArtifactNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(listed)
    }

    /// All tag names, internal ones included
    pub fn tag_names(&self) -> Result<Vec<String>> {
        Ok(self.transport.list_tags()?)
    }

    // ------------------------------------------------------------------
    // Tagging and documents
    // ------------------------------------------------------------------

    /// Point `target` at the artifact `source` resolves to, adding annotations
    pub fn tag(
        &self,
        source: &str,
        target: &str,
        extra: BTreeMap<String, String>,
    ) -> Result<Digest> {
        self.retag(source, target, extra, &[])
    }

    /// Like [`RegistryClient::tag`], dropping the `strip` annotations of the source
    pub fn retag(
        &self,
        source: &str,
        target: &str,
        extra: BTreeMap<String, String>,
        strip: &[&str],
    ) -> Result<Digest> {
        tags::validate(target)?;
        let (mut manifest, _) = self.read_manifest(source)?;
        for key in strip {
            manifest.annotations.remove(*key);
        }
        manifest.annotations.extend(extra);
        self.write_manifest(&manifest, target)?;

        tracing::debug!(source, target, digest = %manifest.digest, "tagged artifact");
        Ok(manifest.digest)
    }

    /// Point `target` at the artifact with content `digest`
    ///
    /// The source manifest is taken from the first artifact tag resolving to
    /// `digest`.
    pub fn tag_digest(
        &self,
        digest: &Digest,
        target: &str,
        extra: BTreeMap<String, String>,
    ) -> Result<Digest> {
        for name in self.tag_names()? {
            if tags::is_internal(&name) {
                continue;
            }
            match self.inspect(&name) {
                Ok(manifest) if &manifest.digest == digest => {
                    return self.tag(&name, target, extra);
                }
                Ok(_) | Err(ArtifactError::ArtifactNotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ArtifactError::not_found(digest.as_str()))
    }

    /// Store a JSON document under `tag`, replacing any previous one
    pub fn put_document<T: Serialize>(
        &self,
        tag: &str,
        value: &T,
        annotations: BTreeMap<String, String>,
    ) -> Result<Digest> {
        tags::validate(tag)?;
        let bytes = canonical_json(value)?;
        let manifest = ArtifactManifest::for_content(&bytes, DOCUMENT_MEDIA_TYPE, annotations)?;
        self.upload_blob(&manifest.digest, &bytes)?;
        self.write_manifest(&manifest, tag)?;
        Ok(manifest.digest)
    }

    /// JSON document stored under `tag`, if any
    pub fn get_document<T: DeserializeOwned>(&self, tag: &str) -> Result<Option<T>> {
        let manifest = match self.read_manifest(tag) {
            Ok((manifest, _)) => manifest,
            Err(ArtifactError::ArtifactNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let bytes = self.fetch_blob(&manifest.digest)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    // ------------------------------------------------------------------
    // Signatures and attestations
    // ------------------------------------------------------------------

    /// Sign the artifact `tag` resolves to and attach the signature
    pub fn sign(&self, signer: &KeylessSigner, tag: &str) -> Result<SigningMetadata> {
        let digest = self.resolve_digest(tag)?;
        let metadata = signer.sign_digest(&digest, tag)?;
        self.attach_signature(&digest, &metadata)?;
        Ok(metadata)
    }

    /// Store signing metadata as the signature referrer of `digest`
    pub fn attach_signature(&self, digest: &Digest, metadata: &SigningMetadata) -> Result<()> {
        let bytes = serde_json::to_vec(metadata)?;
        let layer = LayerDescriptor::for_blob(SIGNATURE_MEDIA_TYPE, &bytes);
        self.upload_blob(&layer.digest, &bytes)?;

        let manifest = referrer_manifest(SIGNATURE_MEDIA_TYPE, vec![layer], digest);
        self.write_manifest(&manifest, &tags::signature_tag(digest))?;
        tracing::debug!(%digest, issuer = %metadata.issuer, "attached signature");
        Ok(())
    }

    /// Signing metadata attached to `digest`, if any
    pub fn signing_metadata(&self, digest: &Digest) -> Result<Option<SigningMetadata>> {
        let manifest = match self.read_manifest(&tags::signature_tag(digest)) {
            Ok((manifest, _)) => manifest,
            Err(ArtifactError::ArtifactNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let bytes = self.fetch_blob(&manifest.digest)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Derived signature state of `tag`
    pub fn signature_status(&self, tag: &str) -> Result<SignatureStatus> {
        let digest = self.resolve_digest(tag)?;
        Ok(match self.signing_metadata(&digest)? {
            Some(meta) => SignatureStatus::Signed {
                issuer: meta.issuer,
                subject: meta.subject,
            },
            None => SignatureStatus::Unsigned,
        })
    }

    /// Create, sign and attach an attestation for `artifact_ref`
    pub fn attach_attestation(
        &self,
        signer: &KeylessSigner,
        artifact_ref: &str,
        predicate_path: &Path,
        predicate_type: &str,
        keyless: bool,
    ) -> Result<Attestation> {
        let digest = self.resolve_digest(artifact_ref)?;
        let attestation = create_attestation(
            signer,
            artifact_ref,
            &digest,
            predicate_path,
            predicate_type,
            keyless,
        )?;
        self.append_attestation(&digest, &attestation)?;
        Ok(attestation)
    }

    /// Append an existing attestation to the referrer of `digest`
    pub fn append_attestation(&self, digest: &Digest, attestation: &Attestation) -> Result<()> {
        let mut layers = match self.read_manifest(&tags::attestation_tag(digest)) {
            Ok((manifest, _)) => manifest.layers,
            Err(ArtifactError::ArtifactNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let bytes = serde_json::to_vec(attestation)?;
        let mut layer = LayerDescriptor::for_blob(ATTESTATION_MEDIA_TYPE, &bytes);
        layer.annotations.insert(
            "in-toto.io/predicate-type".to_string(),
            attestation.predicate_type.clone(),
        );
        self.upload_blob(&layer.digest, &bytes)?;
        layers.push(layer);

        let count = layers.len();
        let manifest = referrer_manifest(ATTESTATION_MEDIA_TYPE, layers, digest);
        self.write_manifest(&manifest, &tags::attestation_tag(digest))?;
        tracing::info!(
            %digest,
            predicate_type = %attestation.predicate_type,
            attestations = count,
            "attached attestation"
        );
        Ok(())
    }

    /// Attestations attached to `artifact_ref`
    pub fn retrieve_attestations(&self, artifact_ref: &str) -> Result<Vec<Attestation>> {
        let digest = self.resolve_digest(artifact_ref)?;
        self.attestations_for(&digest)
    }

    /// Attestations attached to `digest`
    pub fn attestations_for(&self, digest: &Digest) -> Result<Vec<Attestation>> {
        let manifest = match self.read_manifest(&tags::attestation_tag(digest)) {
            Ok((manifest, _)) => manifest,
            Err(ArtifactError::ArtifactNotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut attestations = Vec::with_capacity(manifest.layers.len());
        for layer in &manifest.layers {
            let bytes = self.fetch_blob(&layer.digest)?;
            attestations.push(serde_json::from_slice(&bytes)?);
        }
        Ok(attestations)
    }

    /// Verify `tag` against `policy` (or the configured one)
    pub fn verify(
        &self,
        tag: &str,
        environment: Option<&str>,
        policy: Option<&VerificationPolicy>,
    ) -> Result<VerificationResult> {
        let digest = self.resolve_digest(tag)?;
        let verifier = match (policy, &self.verifier) {
            (Some(policy), _) => Verifier::new(policy.clone()),
            (None, Some(verifier)) => verifier.clone(),
            (None, None) => Verifier::new(VerificationPolicy::default()),
        };
        self.verify_content(&verifier, &digest, tag, environment)
    }

    fn verify_content(
        &self,
        verifier: &Verifier,
        digest: &Digest,
        tag: &str,
        environment: Option<&str>,
    ) -> Result<VerificationResult> {
        if !verifier.policy().enabled {
            return verifier.verify_digest(digest, None, &[], tag, environment);
        }
        let metadata = self.signing_metadata(digest)?;
        let attestations = self.attestations_for(digest)?;
        verifier.verify_digest(digest, metadata.as_ref(), &attestations, tag, environment)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn read_manifest(&self, reference: &str) -> Result<(ArtifactManifest, Digest)> {
        if Digest::parse(reference).is_err() && floe_oci::tag::validate(reference).is_err() {
            return Err(ArtifactError::not_found(reference));
        }
        let (bytes, manifest_digest) = self.transport.get_manifest(reference)?;
        let oci = OciManifest::from_bytes(&bytes)?;
        Ok((ArtifactManifest::from_oci(&oci)?, manifest_digest))
    }

    fn write_manifest(&self, manifest: &ArtifactManifest, tag: &str) -> Result<Digest> {
        self.upload_blob(&Digest::compute(EMPTY_CONFIG), EMPTY_CONFIG)?;
        let bytes = manifest.to_oci().to_bytes()?;
        Ok(self.transport.put_manifest(tag, &bytes)?)
    }

    fn upload_blob(&self, digest: &Digest, bytes: &[u8]) -> Result<()> {
        if self.transport.blob_exists(digest)? {
            tracing::debug!(%digest, "blob already present");
            return Ok(());
        }
        self.transport.put_blob(digest, bytes)?;
        Ok(())
    }

    fn fetch_blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.get(digest) {
            tracing::debug!(%digest, "cache hit");
            return Ok(bytes);
        }

        let bytes = match self.transport.get_blob(digest) {
            Ok(bytes) => bytes,
            Err(TransportError::NotFound(_)) => return Err(ArtifactError::not_found(digest.as_str())),
            Err(e) => return Err(e.into()),
        };
        if !digest.matches(&bytes) {
            return Err(ArtifactError::Registry(format!(
                "blob content does not match {}",
                digest
            )));
        }
        self.cache_blob(digest, &bytes);
        Ok(bytes)
    }

    fn cache_blob(&self, digest: &Digest, bytes: &[u8]) {
        if let Err(e) = self.cache.put(digest, bytes) {
            tracing::warn!(%digest, error = %e, "failed to cache blob");
        }
    }

    fn cache_tag(&self, tag: &str, digest: &Digest) {
        if let Err(e) = self.cache.put_tag(tag, digest) {
            tracing::warn!(tag, error = %e, "failed to cache tag");
        }
    }
}

/// Manifest whose layers describe `subject`
fn referrer_manifest(
    artifact_type: &str,
    layers: Vec<LayerDescriptor>,
    subject: &Digest,
) -> ArtifactManifest {
    let mut annotations = BTreeMap::new();
    annotations.insert("floe.referrer.subject".to_string(), subject.to_string());
    ArtifactManifest {
        digest: layers
            .first()
            .map(|l| l.digest.clone())
            .unwrap_or_else(|| subject.clone()),
        artifact_type: artifact_type.to_string(),
        size: layers.iter().map(|l| l.size).sum(),
        created_at: Utc::now(),
        layers,
        annotations,
    }
}

fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json_canonicalizer::to_vec(value)
        .map_err(|e| ArtifactError::Schema(format!("cannot serialize artifact: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::registry::memory::{InjectedFailure, MemoryTransport, TransportOp};
    use crate::signing::fake::FakeTransparencyLog;
    use crate::signing::LocalCertificateAuthority;
    use crate::signing::{Enforcement, StaticTokenProvider, TrustedIdentity};
    use serde::Deserialize;
    use tempfile::TempDir;

    fn client() -> (RegistryClient, MemoryTransport) {
        let transport = MemoryTransport::new();
        (
            RegistryClient::with_transport(Arc::new(transport.clone())),
            transport,
        )
    }

    fn authority() -> LocalCertificateAuthority {
        LocalCertificateAuthority::from_key(ed25519_dalek::SigningKey::from_bytes(&[5u8; 32]))
    }

    fn signer() -> KeylessSigner {
        KeylessSigner::new(
            Box::new(StaticTokenProvider::new(crate::signing::test_token(
                "https://issuer",
                "ci@acme",
            ))),
            Box::new(authority()),
            Box::new(FakeTransparencyLog::new()),
        )
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Compiled {
        version: String,
        models: Vec<String>,
    }

    #[test]
    fn test_push_pull_round_trip() {
        let (client, _) = client();
        let digest = client
            .push_bytes(b"compiled", "v1.0.0", &PushOptions::default())
            .unwrap();
        assert_eq!(digest.as_str().len(), 71);
        assert_eq!(client.pull_bytes("v1.0.0", None).unwrap(), b"compiled");
        assert_eq!(client.resolve_digest("v1.0.0").unwrap(), digest);
    }

    #[test]
    fn test_typed_push_is_deterministic() {
        let (client, _) = client();
        let value = Compiled {
            version: "0.2.0".to_string(),
            models: vec!["orders".to_string()],
        };
        let a = client.push(&value, "v1.0.0", &PushOptions::default()).unwrap();
        let b = client.push(&value, "v1.0.1", &PushOptions::default()).unwrap();
        assert_eq!(a, b);

        let pulled: Compiled = client.pull("v1.0.1", None).unwrap();
        assert_eq!(pulled, value);
    }

    #[test]
    fn test_pull_schema_mismatch() {
        let (client, _) = client();
        client
            .push_bytes(b"not json", "v1.0.0", &PushOptions::default())
            .unwrap();
        let err = client.pull::<Compiled>("v1.0.0", None).unwrap_err();
        assert!(matches!(err, ArtifactError::Schema(_)));
    }

    #[test]
    fn test_unknown_tag_names_tag() {
        let (client, _) = client();
        let err = client.pull_bytes("v9.9.9", None).unwrap_err();
        assert!(matches!(err, ArtifactError::ArtifactNotFound { .. }));
        assert!(err.to_string().contains("v9.9.9"));
    }

    #[test]
    fn test_inspect_does_not_fetch_blob() {
        let (client, transport) = client();
        let options = PushOptions::default().with_annotation(annotations::CONTRACT_ID, "orders");
        client.push_bytes(b"compiled", "v1.0.0", &options).unwrap();

        let manifest = client.inspect("v1.0.0").unwrap();
        assert_eq!(manifest.annotation(annotations::CONTRACT_ID), Some("orders"));
        assert_eq!(manifest.annotation(annotations::ARTIFACT_SIZE), Some("8"));
        assert_eq!(transport.blob_fetches(), 0);
    }

    #[test]
    fn test_list_filters_and_hides_internal_tags() {
        let (client, _) = client();
        for tag in ["v1.0.0", "v1.1.0", "v2.0.0"] {
            client.push_bytes(tag.as_bytes(), tag, &PushOptions::default()).unwrap();
        }
        client.sign(&signer(), "v1.0.0").unwrap();

        let all = client.list(None).unwrap();
        assert_eq!(all.len(), 3);

        let v1: Vec<_> = client
            .list(Some("v1.*"))
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(v1, vec!["v1.0.0", "v1.1.0"]);
    }

    #[test]
    fn test_tag_copies_manifest_with_annotations() {
        let (client, transport) = client();
        let digest = client
            .push_bytes(b"compiled", "v1.0.0", &PushOptions::default())
            .unwrap();

        let mut extra = BTreeMap::new();
        extra.insert(annotations::ENVIRONMENT.to_string(), "dev".to_string());
        assert_eq!(client.tag("v1.0.0", "v1.0.0-dev", extra).unwrap(), digest);

        let manifest = client.inspect("v1.0.0-dev").unwrap();
        assert_eq!(manifest.digest, digest);
        assert_eq!(manifest.annotation(annotations::ENVIRONMENT), Some("dev"));
        assert!(transport.tag_target("v1.0.0-dev").is_some());
    }

    #[test]
    fn test_documents() {
        let (client, _) = client();
        assert!(client.get_document::<Compiled>("floe-lock-prod").unwrap().is_none());

        let doc = Compiled {
            version: "1".to_string(),
            models: vec![],
        };
        client
            .put_document("floe-lock-prod", &doc, BTreeMap::new())
            .unwrap();
        assert_eq!(client.get_document::<Compiled>("floe-lock-prod").unwrap(), Some(doc));
    }

    #[test]
    fn test_signature_status() {
        let (client, _) = client();
        client
            .push_bytes(b"compiled", "v1.0.0", &PushOptions::default())
            .unwrap();
        assert_eq!(client.signature_status("v1.0.0").unwrap(), SignatureStatus::Unsigned);

        client.sign(&signer(), "v1.0.0").unwrap();
        assert_eq!(
            client.signature_status("v1.0.0").unwrap(),
            SignatureStatus::Signed {
                issuer: "https://issuer".to_string(),
                subject: "ci@acme".to_string(),
            }
        );
    }

    #[test]
    fn test_pull_with_enforce_policy() {
        let (client, transport) = client();
        client
            .push_bytes(b"compiled", "v1.0.0", &PushOptions::default())
            .unwrap();

        let enforcing = RegistryClient::with_transport(Arc::new(transport)).with_verification(
            VerificationPolicy::new(
                Enforcement::Enforce,
                vec![TrustedIdentity::new("https://issuer", "ci@acme")],
            )
            .with_trust_root(authority().trust_root()),
        );
        let err = enforcing.pull_bytes("v1.0.0", None).unwrap_err();
        assert!(err.to_string().contains("unsigned"));

        client.sign(&signer(), "v1.0.0").unwrap();
        let (content, result) = enforcing.pull_verified("v1.0.0", None).unwrap();
        assert_eq!(content, b"compiled");
        assert!(result.unwrap().is_verified());
    }

    #[test]
    fn test_attestations_accumulate() {
        let (client, _) = client();
        client
            .push_bytes(b"compiled", "v1.0.0", &PushOptions::default())
            .unwrap();
        assert!(client.retrieve_attestations("v1.0.0").unwrap().is_empty());

        let dir = TempDir::new().unwrap();
        let sbom = dir.path().join("sbom.json");
        std::fs::write(&sbom, r#"{"spdxVersion":"SPDX-2.3"}"#).unwrap();
        let provenance = dir.path().join("provenance.json");
        std::fs::write(&provenance, r#"{"builder":{"id":"ci"}}"#).unwrap();

        let signer = signer();
        client
            .attach_attestation(&signer, "v1.0.0", &sbom, crate::signing::SPDX_PREDICATE_TYPE, true)
            .unwrap();
        client
            .attach_attestation(&signer, "v1.0.0", &provenance, "https://slsa.dev/provenance/v1", true)
            .unwrap();

        let attestations = client.retrieve_attestations("v1.0.0").unwrap();
        assert_eq!(attestations.len(), 2);
        assert_eq!(attestations.iter().filter(|a| a.is_sbom()).count(), 1);
    }

    #[test]
    fn test_warm_cache_skips_blob_fetch() {
        let dir = TempDir::new().unwrap();
        let transport = MemoryTransport::new();
        let client = RegistryClient::with_transport(Arc::new(transport.clone()))
            .with_cache(CacheManager::new(CacheConfig::at(dir.path())));

        client
            .push_bytes(b"compiled", "v1.0.0", &PushOptions::default())
            .unwrap();
        client.pull_bytes("v1.0.0", None).unwrap();
        client.pull_bytes("v1.0.0", None).unwrap();
        assert_eq!(transport.blob_fetches(), 0);
    }

    #[test]
    fn test_unreachable_registry_is_connection_error() {
        let (client, transport) = client();
        transport.fail_all(InjectedFailure::Unreachable);
        let err = client.pull_bytes("v1.0.0", None).unwrap_err();
        assert!(matches!(err, ArtifactError::Connection(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_auth_failure_distinct_from_not_found() {
        let (client, transport) = client();
        transport.fail(TransportOp::GetManifest, InjectedFailure::Unauthorized, None);
        let err = client.inspect("v1.0.0").unwrap_err();
        assert!(matches!(err, ArtifactError::Authentication(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_tag_digest_finds_source_artifact() {
        let (client, _) = client();
        let digest = client
            .push_bytes(b"compiled", "v1.0.0", &PushOptions::default())
            .unwrap();
        client.tag_digest(&digest, "candidate", BTreeMap::new()).unwrap();
        assert_eq!(client.resolve_digest("candidate").unwrap(), digest);

        let missing = Digest::compute(b"other");
        let err = client
            .tag_digest(&missing, "nope", BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, ArtifactError::ArtifactNotFound { .. }));
    }
}
