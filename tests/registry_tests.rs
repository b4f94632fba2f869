//! Registry client integration tests
//!
//! Push / pull / inspect / list over the directory and in-memory transports,
//! including cache interaction and signature referrers.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use floe_artifacts::cache::{CacheConfig, CacheManager};
use floe_artifacts::config::RegistryConfig;
use floe_artifacts::registry::{InjectedFailure, MemoryTransport, TransportOp};
use floe_artifacts::signing::fake::FakeTransparencyLog;
use floe_artifacts::signing::LocalCertificateAuthority;
use floe_artifacts::signing::{KeylessSigner, SignatureStatus, StaticTokenProvider};
use floe_artifacts::{ArtifactError, Digest, ExitCode, PushOptions, RegistryClient};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

fn token(issuer: &str, subject: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let claims = serde_json::json!({"iss": issuer, "sub": subject});
    format!("{}.{}.sig", header, URL_SAFE_NO_PAD.encode(claims.to_string()))
}

fn signer() -> KeylessSigner {
    KeylessSigner::new(
        Box::new(StaticTokenProvider::new(token(
            "https://token.actions.githubusercontent.com",
            "repo:acme/floe:ref:refs/heads/main",
        ))),
        Box::new(LocalCertificateAuthority::new()),
        Box::new(FakeTransparencyLog::new()),
    )
}

fn directory_client(dir: &TempDir) -> RegistryClient {
    let config = RegistryConfig::new(format!("file://{}", dir.path().join("registry").display()));
    RegistryClient::from_config(&config).unwrap()
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct CompiledArtifacts {
    version: String,
    models: Vec<String>,
}

#[test]
fn test_push_pull_through_directory_registry() {
    let dir = TempDir::new().unwrap();
    let client = directory_client(&dir);

    let digest = client
        .push_bytes(b"compiled payload", "v1.0.0", &PushOptions::default())
        .unwrap();
    assert_eq!(digest, Digest::compute(b"compiled payload"));
    assert_eq!(client.pull_bytes("v1.0.0", None).unwrap(), b"compiled payload");

    let manifest = client.inspect("v1.0.0").unwrap();
    assert_eq!(manifest.digest, digest);
    assert_eq!(manifest.size, 16);
    assert_eq!(manifest.annotations["floe.artifact.size"], "16");
}

#[test]
fn test_directory_registry_survives_new_client() {
    let dir = TempDir::new().unwrap();
    directory_client(&dir)
        .push_bytes(b"payload", "v2.0.0", &PushOptions::default())
        .unwrap();

    let fresh = directory_client(&dir);
    assert_eq!(fresh.pull_bytes("v2.0.0", None).unwrap(), b"payload");
}

#[test]
fn test_typed_push_is_deterministic() {
    let client = RegistryClient::with_transport(Arc::new(MemoryTransport::new()));
    let artifacts = CompiledArtifacts {
        version: "0.3.0".to_string(),
        models: vec!["orders".to_string(), "customers".to_string()],
    };

    let first = client.push(&artifacts, "v0.3.0", &PushOptions::default()).unwrap();
    let second = client.push(&artifacts, "candidate", &PushOptions::default()).unwrap();
    assert_eq!(first, second);

    let pulled: CompiledArtifacts = client.pull("v0.3.0", None).unwrap();
    assert_eq!(pulled, artifacts);
}

#[test]
fn test_pull_wrong_shape_is_schema_error() {
    let client = RegistryClient::with_transport(Arc::new(MemoryTransport::new()));
    client
        .push_bytes(br#"{"unexpected": true}"#, "v1.0.0", &PushOptions::default())
        .unwrap();

    let err = client.pull::<CompiledArtifacts>("v1.0.0", None).unwrap_err();
    assert!(matches!(err, ArtifactError::Schema(_)));
}

#[test]
fn test_missing_tag_maps_to_not_found_exit_code() {
    let client = RegistryClient::with_transport(Arc::new(MemoryTransport::new()));
    let err = client.pull_bytes("v9.9.9", None).unwrap_err();
    assert!(matches!(err, ArtifactError::ArtifactNotFound { .. }));
    assert_eq!(err.exit_code(), ExitCode::ArtifactNotFound);
}

#[test]
fn test_malformed_tag_is_not_found_not_infrastructure() {
    let dir = TempDir::new().unwrap();
    let client = directory_client(&dir);
    for reference in ["has space", "../escape"] {
        let err = client.pull_bytes(reference, None).unwrap_err();
        assert!(matches!(err, ArtifactError::ArtifactNotFound { .. }), "{}", reference);
        assert_eq!(err.exit_code(), ExitCode::ArtifactNotFound);
        assert!(!err.is_retryable());
        assert!(client.inspect(reference).is_err());
    }
}

#[test]
fn test_list_filters_and_hides_internal_tags() {
    let client = RegistryClient::with_transport(Arc::new(MemoryTransport::new()));
    for tag in ["v1.0.0", "v1.1.0", "v2.0.0", "nightly"] {
        client
            .push_bytes(tag.as_bytes(), tag, &PushOptions::default())
            .unwrap();
    }
    client.sign(&signer(), "v1.0.0").unwrap();

    let all: Vec<String> = client.list(None).unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(all, vec!["nightly", "v1.0.0", "v1.1.0", "v2.0.0"]);

    let glob: Vec<String> = client
        .list(Some("v1.*"))
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(glob, vec!["v1.0.0", "v1.1.0"]);

    let substring: Vec<String> = client
        .list(Some("night"))
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(substring, vec!["nightly"]);
}

#[test]
fn test_list_rejects_bad_glob() {
    let client = RegistryClient::with_transport(Arc::new(MemoryTransport::new()));
    let err = client.list(Some("v[1")).unwrap_err();
    assert_eq!(err.kind(), "InvalidFilterError");
}

#[test]
fn test_mutable_tag_always_resolved_remotely() {
    let dir = TempDir::new().unwrap();
    let transport = MemoryTransport::new();
    let client = RegistryClient::with_transport(Arc::new(transport.clone()))
        .with_cache(CacheManager::new(CacheConfig::at(dir.path())));

    client
        .push_bytes(b"one", "latest-dev", &PushOptions::default())
        .unwrap();
    client
        .push_bytes(b"two", "latest-dev", &PushOptions::default())
        .unwrap();
    assert_eq!(client.pull_bytes("latest-dev", None).unwrap(), b"two");

    let before = transport.manifest_fetches();
    client.resolve_digest("latest-dev").unwrap();
    assert_eq!(transport.manifest_fetches(), before + 1);
}

#[test]
fn test_release_tag_resolution_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let transport = MemoryTransport::new();
    let client = RegistryClient::with_transport(Arc::new(transport.clone()))
        .with_cache(CacheManager::new(CacheConfig::at(dir.path())));

    client
        .push_bytes(b"release", "v1.0.0", &PushOptions::default())
        .unwrap();
    let before = transport.manifest_fetches();
    client.pull_bytes("v1.0.0", None).unwrap();
    assert_eq!(transport.manifest_fetches(), before);
    assert_eq!(transport.blob_fetches(), 0);
}

#[test]
fn test_signature_status_follows_referrer() {
    let client = RegistryClient::with_transport(Arc::new(MemoryTransport::new()));
    client
        .push_bytes(b"payload", "v1.0.0", &PushOptions::default())
        .unwrap();
    assert_eq!(
        client.signature_status("v1.0.0").unwrap(),
        SignatureStatus::Unsigned
    );

    let metadata = client.sign(&signer(), "v1.0.0").unwrap();
    assert!(metadata.rekor_log_index.unwrap() > 0);
    match client.signature_status("v1.0.0").unwrap() {
        SignatureStatus::Signed { issuer, subject } => {
            assert_eq!(issuer, "https://token.actions.githubusercontent.com");
            assert_eq!(subject, "repo:acme/floe:ref:refs/heads/main");
        }
        other => panic!("expected signed, got {:?}", other),
    }
}

#[test]
fn test_retag_copies_manifest_with_annotations() {
    let client = RegistryClient::with_transport(Arc::new(MemoryTransport::new()));
    let digest = client
        .push_bytes(b"payload", "v1.0.0", &PushOptions::default())
        .unwrap();

    let mut extra = BTreeMap::new();
    extra.insert("floe.environment".to_string(), "dev".to_string());
    client.tag("v1.0.0", "v1.0.0-dev", extra).unwrap();

    let copy = client.inspect("v1.0.0-dev").unwrap();
    assert_eq!(copy.digest, digest);
    assert_eq!(copy.annotations["floe.environment"], "dev");
    assert!(!client
        .inspect("v1.0.0")
        .unwrap()
        .annotations
        .contains_key("floe.environment"));
}

#[test]
fn test_infrastructure_failures_are_distinct() {
    let transport = MemoryTransport::new();
    let client = RegistryClient::with_transport(Arc::new(transport.clone()));
    client
        .push_bytes(b"payload", "v1.0.0", &PushOptions::default())
        .unwrap();

    transport.fail(TransportOp::GetManifest, InjectedFailure::Timeout, Some(1));
    let err = client.inspect("v1.0.0").unwrap_err();
    assert!(matches!(err, ArtifactError::Timeout(_)));
    assert!(err.is_retryable());

    // Injected failure was one-shot
    assert!(client.inspect("v1.0.0").is_ok());

    transport.fail(TransportOp::GetManifest, InjectedFailure::Tls, None);
    let err = client.inspect("v1.0.0").unwrap_err();
    assert!(matches!(err, ArtifactError::Tls(_)));
    assert!(!err.is_retryable());

    transport.heal();
    assert!(client.inspect("v1.0.0").is_ok());
}
