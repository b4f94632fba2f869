//! Environment pipeline configuration
//!
//! Environments form a strictly linear pipeline (dev → staging → prod by
//! default). A promotion is legal only onto the immediate successor of the
//! source environment, or onto the first environment when the tag has not
//! been promoted anywhere yet.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::config::ConfigError;
use crate::error::{ArtifactError, TransitionReason};

use super::gates::{GateKind, GateSetting};

/// One stage of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,

    /// Gates in execution order
    #[serde(default)]
    pub gates: IndexMap<GateKind, GateSetting>,

    /// Per-gate timeout
    #[serde(default = "default_gate_timeout")]
    pub gate_timeout_seconds: u64,
}

fn default_gate_timeout() -> u64 {
    60
}

impl EnvironmentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gates: IndexMap::new(),
            gate_timeout_seconds: default_gate_timeout(),
        }
    }

    pub fn with_gate(mut self, kind: GateKind, setting: GateSetting) -> Self {
        self.gates.insert(kind, setting);
        self
    }

    pub fn with_gate_timeout(mut self, seconds: u64) -> Self {
        self.gate_timeout_seconds = seconds;
        self
    }

    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_timeout_seconds)
    }

    /// Enabled gates in configured order
    pub fn enabled_gates(&self) -> impl Iterator<Item = (GateKind, &GateSetting)> {
        self.gates
            .iter()
            .filter(|(_, setting)| setting.is_enabled())
            .map(|(kind, setting)| (*kind, setting))
    }
}

/// Ordered environment pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionConfig {
    pub environments: Vec<EnvironmentConfig>,
}

impl Default for PromotionConfig {
    /// dev → staging → prod with escalating gates and timeouts
    fn default() -> Self {
        Self {
            environments: vec![
                EnvironmentConfig::new("dev")
                    .with_gate(GateKind::PolicyCompliance, GateSetting::Enabled(true))
                    .with_gate_timeout(60),
                EnvironmentConfig::new("staging")
                    .with_gate(GateKind::PolicyCompliance, GateSetting::Enabled(true))
                    .with_gate(GateKind::Tests, GateSetting::Enabled(true))
                    .with_gate_timeout(300),
                EnvironmentConfig::new("prod")
                    .with_gate(GateKind::PolicyCompliance, GateSetting::Enabled(true))
                    .with_gate(GateKind::Tests, GateSetting::Enabled(true))
                    .with_gate(GateKind::SecurityScan, GateSetting::Enabled(true))
                    .with_gate_timeout(600),
            ],
        }
    }
}

impl PromotionConfig {
    pub fn new(environments: Vec<EnvironmentConfig>) -> Self {
        Self { environments }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environments.is_empty() {
            return Err(ConfigError::ValidationError(
                "promotion.environments must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for env in &self.environments {
            if env.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "environment name must not be empty".to_string(),
                ));
            }
            floe_oci::tag::validate(&env.name).map_err(|_| {
                ConfigError::ValidationError(format!(
                    "environment name '{}' cannot be used in a tag",
                    env.name
                ))
            })?;
            if !seen.insert(env.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate environment '{}'",
                    env.name
                )));
            }
            if env.gate_timeout_seconds == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "environment '{}': gate_timeout_seconds must be greater than 0",
                    env.name
                )));
            }
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.environments.iter().map(|e| e.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.environments.iter().position(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Check that `from → to` is a legal promotion edge
    ///
    /// With no source, only the first environment is reachable.
    pub fn validate_transition(&self, from: Option<&str>, to: &str) -> Result<(), ArtifactError> {
        let reject = |reason| ArtifactError::InvalidTransition {
            from: from.map(str::to_string),
            to: to.to_string(),
            reason,
        };

        let to_pos = self
            .position(to)
            .ok_or_else(|| reject(TransitionReason::UnknownEnvironment(to.to_string())))?;

        let from_pos = match from {
            None if to_pos == 0 => return Ok(()),
            None => return Err(reject(TransitionReason::Skip)),
            Some(name) => self
                .position(name)
                .ok_or_else(|| reject(TransitionReason::UnknownEnvironment(name.to_string())))?,
        };

        if to_pos == from_pos {
            Err(reject(TransitionReason::SameEnvironment))
        } else if to_pos < from_pos {
            Err(reject(TransitionReason::Backward))
        } else if to_pos > from_pos + 1 {
            Err(reject(TransitionReason::Skip))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> PromotionConfig {
        PromotionConfig::default()
    }

    fn reason(result: Result<(), ArtifactError>) -> TransitionReason {
        match result {
            Err(ArtifactError::InvalidTransition { reason, .. }) => reason,
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_forward_edges_valid() {
        let p = pipeline();
        assert!(p.validate_transition(Some("dev"), "staging").is_ok());
        assert!(p.validate_transition(Some("staging"), "prod").is_ok());
        assert!(p.validate_transition(None, "dev").is_ok());
    }

    #[test]
    fn test_backward_and_skip_rejected() {
        let p = pipeline();
        assert_eq!(reason(p.validate_transition(Some("staging"), "dev")), TransitionReason::Backward);
        assert_eq!(reason(p.validate_transition(Some("prod"), "dev")), TransitionReason::Backward);
        assert_eq!(reason(p.validate_transition(Some("prod"), "staging")), TransitionReason::Backward);
        assert_eq!(reason(p.validate_transition(Some("dev"), "prod")), TransitionReason::Skip);
        assert_eq!(reason(p.validate_transition(None, "staging")), TransitionReason::Skip);
    }

    #[test]
    fn test_unknown_and_same() {
        let p = pipeline();
        assert_eq!(
            reason(p.validate_transition(Some("dev"), "qa")),
            TransitionReason::UnknownEnvironment("qa".to_string())
        );
        assert_eq!(
            reason(p.validate_transition(Some("dev"), "dev")),
            TransitionReason::SameEnvironment
        );
    }

    #[test]
    fn test_default_gates_escalate() {
        let p = pipeline();
        let counts: Vec<_> = p
            .environments
            .iter()
            .map(|e| e.enabled_gates().count())
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);

        let timeouts: Vec<_> = p.environments.iter().map(|e| e.gate_timeout_seconds).collect();
        assert_eq!(timeouts, vec![60, 300, 600]);
    }

    #[test]
    fn test_validate() {
        assert!(pipeline().validate().is_ok());
        assert!(PromotionConfig::new(vec![]).validate().is_err());
        assert!(PromotionConfig::new(vec![
            EnvironmentConfig::new("dev"),
            EnvironmentConfig::new("dev"),
        ])
        .validate()
        .is_err());
        assert!(PromotionConfig::new(vec![EnvironmentConfig::new("has space")])
            .validate()
            .is_err());
    }

    #[test]
    fn test_gate_order_preserved_from_toml() {
        let env: EnvironmentConfig = toml::from_str(
            r#"
            name = "prod"
            gate_timeout_seconds = 900

            [gates]
            security_scan = true
            tests = { command = "make", args = ["test"] }
            policy_compliance = false
            "#,
        )
        .unwrap();

        let order: Vec<_> = env.gates.keys().copied().collect();
        assert_eq!(
            order,
            vec![GateKind::SecurityScan, GateKind::Tests, GateKind::PolicyCompliance]
        );
        let enabled: Vec<_> = env.enabled_gates().map(|(k, _)| k).collect();
        assert_eq!(enabled, vec![GateKind::SecurityScan, GateKind::Tests]);
    }
}
