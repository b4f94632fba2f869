//! Promotion controller
//!
//! Moves tags through the environment pipeline:
//! 1. validate the transition
//! 2. refuse locked target environments
//! 3. verify the artifact with the target environment's policy
//! 4. run the target environment's gates
//! 5. write `{tag}-{env}` (with the promotion record) and `latest-{env}`
//!
//! Steps 1-4 run for dry runs too; a dry run only skips step 5.
//!
//! The registry is the only authority for tags and locks. Lock state is read
//! right before use, and the check-lock / run-gates / write-tag sequence is
//! not atomic: two concurrent promotions into one environment can both pass
//! the lock check. Callers that need strict serialization must lock
//! externally.

use std::collections::BTreeMap;

use chrono::Utc;
use floe_oci::{annotations, tag as tags, Digest};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::error::{ArtifactError, Result};
use crate::registry::RegistryClient;

use super::environment::{EnvironmentConfig, PromotionConfig};
use super::gates::{CommandGateExecutor, GateContext, GateExecutor, GateResult};
use super::lock::EnvironmentLock;
use super::record::{
    new_trace_id, PromotionRecord, RollbackRecord, PROMOTION_SCHEMA_ID, ROLLBACK_SCHEMA_ID,
    SCHEMA_VERSION,
};
use super::rollback::{analyze_rollback_impact, RollbackImpactAnalysis};

/// Where a tag currently stands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionStatus {
    pub tag: String,
    pub digest: Digest,
    /// Environments the tag was promoted into, in pipeline order
    pub environments: Vec<String>,
}

/// Drives promotions, locks and rollbacks against one registry
pub struct PromotionController {
    client: RegistryClient,
    config: PromotionConfig,
    gates: Box<dyn GateExecutor>,
}

impl PromotionController {
    /// Controller running gate commands with [`CommandGateExecutor`]
    pub fn new(client: RegistryClient, config: PromotionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            gates: Box::new(CommandGateExecutor),
        })
    }

    pub fn with_gate_executor(mut self, gates: Box<dyn GateExecutor>) -> Self {
        self.gates = gates;
        self
    }

    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    /// Promote `tag` from `from` into `to`
    pub fn promote(
        &self,
        tag: &str,
        from: Option<&str>,
        to: &str,
        operator: &str,
        dry_run: bool,
    ) -> Result<PromotionRecord> {
        self.config.validate_transition(from, to)?;
        let environment = self.environment(to)?;

        let lock = self.get_lock_status(to)?;
        if lock.locked {
            return Err(ArtifactError::EnvironmentLocked {
                environment: to.to_string(),
                reason: lock.reason.unwrap_or_default(),
                locked_by: lock.locked_by.unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let digest = self.client.resolve_digest(tag)?;

        let verification = match self.client.verification_policy() {
            Some(_) => Some(self.client.verify(tag, Some(to), None)?.status),
            None => None,
        };

        let gate_results = self.run_gates(environment, tag, &digest, from)?;

        let record = PromotionRecord {
            schema_version: SCHEMA_VERSION,
            schema_id: PROMOTION_SCHEMA_ID.to_string(),
            promotion_id: Uuid::new_v4(),
            tag: tag.to_string(),
            artifact_digest: digest,
            source_environment: from.map(str::to_string),
            target_environment: to.to_string(),
            operator: operator.to_string(),
            gate_results,
            verification,
            trace_id: new_trace_id(),
            dry_run,
            promoted_at: Utc::now(),
        };

        if dry_run {
            tracing::info!(
                tag,
                from = from.unwrap_or("-"),
                to,
                trace_id = %record.trace_id,
                "dry run: promotion checks passed, no tags written"
            );
            return Ok(record);
        }

        let mut extra = environment_annotation(to);
        extra.insert(
            annotations::PROMOTION.to_string(),
            annotations::encode_json(&record)?,
        );
        self.client
            .tag(tag, &tags::environment_tag(tag, to), extra)?;
        self.client
            .tag(tag, &tags::latest_tag(to), environment_annotation(to))?;

        tracing::info!(
            tag,
            from = from.unwrap_or("-"),
            to,
            operator,
            digest = %record.artifact_digest,
            trace_id = %record.trace_id,
            "promoted artifact"
        );
        Ok(record)
    }

    fn run_gates(
        &self,
        environment: &EnvironmentConfig,
        tag: &str,
        digest: &Digest,
        from: Option<&str>,
    ) -> Result<Vec<GateResult>> {
        let ctx = GateContext {
            tag,
            digest: digest.as_str(),
            source_env: from,
            target_env: &environment.name,
            timeout: environment.gate_timeout(),
        };

        let mut results = Vec::new();
        for (kind, setting) in environment.enabled_gates() {
            let result = self.gates.run(kind, setting, &ctx);
            tracing::debug!(
                gate = %kind,
                environment = %environment.name,
                status = ?result.status,
                duration_ms = result.duration_ms,
                "gate finished"
            );
            if result.is_failed() {
                return Err(ArtifactError::GateValidation {
                    gate: kind.to_string(),
                    environment: environment.name.clone(),
                    detail: result.error.unwrap_or_else(|| "gate failed".to_string()),
                });
            }
            results.push(result);
        }
        Ok(results)
    }

    /// Lock an environment against promotions
    pub fn lock_environment(
        &self,
        environment: &str,
        reason: &str,
        operator: &str,
    ) -> Result<EnvironmentLock> {
        self.environment(environment)?;
        let lock = EnvironmentLock::locked(environment, reason, operator);
        self.client.put_document(
            &tags::lock_tag(environment),
            &lock,
            environment_annotation(environment),
        )?;
        tracing::info!(environment, reason, operator, "environment locked");
        Ok(lock)
    }

    /// Clear an environment lock; unlocking an unlocked environment is a no-op
    pub fn unlock_environment(&self, environment: &str, operator: &str) -> Result<EnvironmentLock> {
        let current = self.get_lock_status(environment)?;
        if !current.locked {
            tracing::debug!(environment, "environment already unlocked");
            return Ok(current);
        }

        let lock = EnvironmentLock::unlocked(environment);
        self.client.put_document(
            &tags::lock_tag(environment),
            &lock,
            environment_annotation(environment),
        )?;
        tracing::info!(
            environment,
            operator,
            previously_locked_by = current.locked_by.as_deref().unwrap_or("unknown"),
            "environment unlocked"
        );
        Ok(lock)
    }

    /// Current lock state, read from the registry
    pub fn get_lock_status(&self, environment: &str) -> Result<EnvironmentLock> {
        self.environment(environment)?;
        Ok(self
            .client
            .get_document::<EnvironmentLock>(&tags::lock_tag(environment))?
            .unwrap_or_else(|| EnvironmentLock::unlocked(environment)))
    }

    /// Roll `environment` back to the version `tag`
    ///
    /// Locks do not block rollbacks.
    pub fn rollback(
        &self,
        tag: &str,
        environment: &str,
        reason: &str,
        operator: &str,
    ) -> Result<RollbackRecord> {
        self.environment(environment)?;
        let promoted = self.promotion_record(tag, environment)?.ok_or_else(|| {
            ArtifactError::VersionNotPromoted {
                tag: tag.to_string(),
                environment: environment.to_string(),
            }
        })?;

        let env_tag = tags::environment_tag(tag, environment);
        let target = self.client.inspect(&env_tag)?.digest;
        let latest = tags::latest_tag(environment);
        let previous = match self.client.inspect(&latest) {
            Ok(manifest) => Some(manifest.digest),
            Err(ArtifactError::ArtifactNotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let sequence = self.next_rollback_sequence(environment)?;
        let rollback_tag = tags::rollback_tag(tag, environment, sequence);

        let record = RollbackRecord {
            schema_version: SCHEMA_VERSION,
            schema_id: ROLLBACK_SCHEMA_ID.to_string(),
            rollback_id: Uuid::new_v4(),
            tag: tag.to_string(),
            environment: environment.to_string(),
            artifact_digest: target,
            previous_digest: previous,
            rollback_tag: rollback_tag.clone(),
            sequence,
            reason: reason.to_string(),
            operator: operator.to_string(),
            trace_id: new_trace_id(),
            rolled_back_at: Utc::now(),
        };

        let mut extra = environment_annotation(environment);
        extra.insert(
            annotations::ROLLBACK.to_string(),
            annotations::encode_json(&record)?,
        );
        let strip = [annotations::PROMOTION];
        self.client.retag(&env_tag, &rollback_tag, extra, &strip)?;
        self.client
            .retag(&env_tag, &latest, environment_annotation(environment), &strip)?;

        tracing::info!(
            tag,
            environment,
            operator,
            rollback_tag = %rollback_tag,
            digest = %record.artifact_digest,
            previous = record.previous_digest.as_ref().map(Digest::as_str).unwrap_or("-"),
            promoted_by = %promoted.operator,
            trace_id = %record.trace_id,
            "rolled back environment"
        );
        Ok(record)
    }

    /// Read-only impact report for rolling `environment` back to `tag`
    pub fn analyze_rollback_impact(
        &self,
        tag: &str,
        environment: &str,
    ) -> Result<RollbackImpactAnalysis> {
        self.environment(environment)?;
        analyze_rollback_impact(&self.client, tag, environment)
    }

    /// Promotion records of `tag`, in pipeline order
    pub fn get_promotion_history(&self, tag: &str) -> Result<Vec<PromotionRecord>> {
        let mut history = Vec::new();
        for env in self.config.names() {
            if let Some(record) = self.promotion_record(tag, env)? {
                history.push(record);
            }
        }
        Ok(history)
    }

    /// Rollback records of `environment`, oldest first
    pub fn get_rollback_history(&self, environment: &str) -> Result<Vec<RollbackRecord>> {
        self.environment(environment)?;
        let mut history = Vec::new();
        for name in self.client.tag_names()? {
            if tags::rollback_sequence(&name, environment).is_none() {
                continue;
            }
            let manifest = match self.client.inspect(&name) {
                Ok(manifest) => manifest,
                Err(ArtifactError::ArtifactNotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            if let Some(record) = manifest.decode_annotation::<RollbackRecord>(annotations::ROLLBACK)? {
                history.push(record);
            }
        }
        history.sort_by_key(|r| r.sequence);
        Ok(history)
    }

    /// Digest of `tag` and the environments it reached
    pub fn get_status(&self, tag: &str) -> Result<PromotionStatus> {
        let digest = self.client.resolve_digest(tag)?;
        let environments = self
            .get_promotion_history(tag)?
            .into_iter()
            .map(|r| r.target_environment)
            .collect();
        Ok(PromotionStatus {
            tag: tag.to_string(),
            digest,
            environments,
        })
    }

    fn promotion_record(&self, tag: &str, environment: &str) -> Result<Option<PromotionRecord>> {
        match self.client.inspect(&tags::environment_tag(tag, environment)) {
            Ok(manifest) => Ok(manifest.decode_annotation(annotations::PROMOTION)?),
            Err(ArtifactError::ArtifactNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn next_rollback_sequence(&self, environment: &str) -> Result<u32> {
        let highest = self
            .client
            .tag_names()?
            .iter()
            .filter_map(|name| tags::rollback_sequence(name, environment))
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.config.get(name).ok_or_else(|| {
            ArtifactError::Config(ConfigError::ValidationError(format!(
                "unknown environment '{}'; configured: {}",
                name,
                self.config.names().collect::<Vec<_>>().join(", ")
            )))
        })
    }
}

fn environment_annotation(environment: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert(annotations::ENVIRONMENT.to_string(), environment.to_string());
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promotion::gates::{GateKind, ScriptedGateExecutor};
    use crate::registry::{MemoryTransport, PushOptions};
    use std::sync::Arc;

    fn setup() -> (PromotionController, MemoryTransport) {
        let transport = MemoryTransport::new();
        let client = RegistryClient::with_transport(Arc::new(transport.clone()));
        client
            .push_bytes(b"compiled-v1", "v1.0.0", &PushOptions::default())
            .unwrap();
        let controller = PromotionController::new(client, PromotionConfig::default())
            .unwrap()
            .with_gate_executor(Box::new(ScriptedGateExecutor::new()));
        (controller, transport)
    }

    #[test]
    fn test_first_promotion_writes_tags() {
        let (controller, transport) = setup();
        let record = controller
            .promote("v1.0.0", None, "dev", "ci@acme", false)
            .unwrap();

        assert!(!record.dry_run);
        assert_eq!(record.trace_id.len(), 32);
        assert_eq!(record.gate_results.len(), 1);
        assert!(transport.tag_target("v1.0.0-dev").is_some());
        assert!(transport.tag_target("latest-dev").is_some());
    }

    #[test]
    fn test_history_round_trips_record() {
        let (controller, _) = setup();
        let dev = controller.promote("v1.0.0", None, "dev", "ci", false).unwrap();
        let staging = controller
            .promote("v1.0.0", Some("dev"), "staging", "ci", false)
            .unwrap();

        let history = controller.get_promotion_history("v1.0.0").unwrap();
        assert_eq!(history, vec![dev, staging]);

        let status = controller.get_status("v1.0.0").unwrap();
        assert_eq!(status.environments, vec!["dev", "staging"]);
    }

    #[test]
    fn test_gate_failure_blocks_and_names_gate() {
        let (controller, transport) = setup();
        let controller = controller.with_gate_executor(Box::new(
            ScriptedGateExecutor::new().failing(GateKind::PolicyCompliance, "3 violations"),
        ));
        let err = controller
            .promote("v1.0.0", None, "dev", "ci", false)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::GateValidation { .. }));
        assert!(err.to_string().contains("policy_compliance"));
        assert!(transport.tag_target("v1.0.0-dev").is_none());
    }

    #[test]
    fn test_unknown_tag() {
        let (controller, _) = setup();
        let err = controller
            .promote("v9.9.9", None, "dev", "ci", false)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_rollback_sequence_increments() {
        let (controller, _) = setup();
        controller.promote("v1.0.0", None, "dev", "ci", false).unwrap();

        let first = controller.rollback("v1.0.0", "dev", "bad deploy", "oncall").unwrap();
        let second = controller.rollback("v1.0.0", "dev", "again", "oncall").unwrap();
        assert_eq!(first.rollback_tag, "v1.0.0-dev-rollback-1");
        assert_eq!(second.rollback_tag, "v1.0.0-dev-rollback-2");

        let history = controller.get_rollback_history("dev").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].reason, "again");
    }

    #[test]
    fn test_unknown_environment_lock() {
        let (controller, _) = setup();
        let err = controller.lock_environment("qa", "x", "y").unwrap_err();
        assert!(err.to_string().contains("unknown environment"));
    }
}
