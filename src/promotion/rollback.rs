//! Rollback impact analysis
//!
//! Compares the contract annotations of what an environment runs now
//! (`latest-{env}`) with the version a rollback would restore. Never writes.

use std::collections::BTreeSet;

use floe_oci::{annotations, tag as tags, ArtifactManifest, Digest};
use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, Result};
use crate::registry::RegistryClient;

/// What a rollback would change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackImpactAnalysis {
    pub tag: String,
    pub environment: String,
    /// What `latest-{env}` points at now
    pub current_digest: Option<Digest>,
    pub target_digest: Digest,
    pub breaking_changes: Vec<String>,
    pub affected_products: Vec<String>,
    pub recommendations: Vec<String>,
}

impl RollbackImpactAnalysis {
    pub fn is_breaking(&self) -> bool {
        !self.breaking_changes.is_empty()
    }
}

/// Build the impact report for rolling `environment` back to `tag`
pub fn analyze_rollback_impact(
    client: &RegistryClient,
    tag: &str,
    environment: &str,
) -> Result<RollbackImpactAnalysis> {
    let target = match client.inspect(&tags::environment_tag(tag, environment)) {
        Ok(manifest) => manifest,
        Err(ArtifactError::ArtifactNotFound { .. }) => client.inspect(tag)?,
        Err(e) => return Err(e),
    };
    let current = match client.inspect(&tags::latest_tag(environment)) {
        Ok(manifest) => Some(manifest),
        Err(ArtifactError::ArtifactNotFound { .. }) => None,
        Err(e) => return Err(e),
    };

    let breaking_changes = current
        .as_ref()
        .map(|current| breaking_changes(current, &target))
        .unwrap_or_default();

    let mut products = BTreeSet::new();
    for manifest in current.iter().chain(std::iter::once(&target)) {
        let downstream: Option<Vec<String>> =
            manifest.decode_annotation(annotations::PRODUCT_DOWNSTREAM)?;
        products.extend(downstream.unwrap_or_default());
    }
    let affected_products: Vec<String> = products.into_iter().collect();

    let mut recommendations = Vec::new();
    match &current {
        None => recommendations.push(format!(
            "{} has no current deployment; rollback will establish {}",
            environment,
            tags::latest_tag(environment)
        )),
        Some(current) if current.digest == target.digest => recommendations.push(format!(
            "{} is already running {}; rollback changes nothing",
            environment, tag
        )),
        Some(_) => {}
    }
    if breaking_changes.is_empty() {
        recommendations.push("no breaking contract changes detected".to_string());
    } else {
        recommendations.push(format!(
            "re-validate data contracts against {} before rolling back",
            tag
        ));
        if !affected_products.is_empty() {
            recommendations.push(format!(
                "notify owners of downstream products: {}",
                affected_products.join(", ")
            ));
        }
    }

    Ok(RollbackImpactAnalysis {
        tag: tag.to_string(),
        environment: environment.to_string(),
        current_digest: current.map(|m| m.digest),
        target_digest: target.digest,
        breaking_changes,
        affected_products,
        recommendations,
    })
}

fn breaking_changes(current: &ArtifactManifest, target: &ArtifactManifest) -> Vec<String> {
    let mut changes = Vec::new();

    if let (Some(from), Some(to)) = (
        current.annotation(annotations::CONTRACT_ID),
        target.annotation(annotations::CONTRACT_ID),
    ) {
        if from != to {
            changes.push(format!("contract id changes from '{}' to '{}'", from, to));
        }
    }

    if let (Some(from), Some(to)) = (
        current.annotation(annotations::CONTRACT_SCHEMA_HASH),
        target.annotation(annotations::CONTRACT_SCHEMA_HASH),
    ) {
        if from != to {
            changes.push(format!("contract schema changes ({} -> {})", from, to));
        }
    }

    if let (Some(from), Some(to)) = (
        current.annotation(annotations::CONTRACT_VERSION),
        target.annotation(annotations::CONTRACT_VERSION),
    ) {
        if let (Some(a), Some(b)) = (major_version(from), major_version(to)) {
            if a != b {
                changes.push(format!(
                    "contract major version changes from {} to {}",
                    from, to
                ));
            }
        }
    }

    changes
}

fn major_version(version: &str) -> Option<u64> {
    version
        .trim_start_matches('v')
        .split('.')
        .next()
        .and_then(|major| major.parse().ok())
}
