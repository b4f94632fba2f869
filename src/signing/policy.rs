//! Verification policy
//!
//! A base policy plus optional per-environment overrides. Only `enforcement`
//! and `require_sbom` can be overridden; trusted identities and certificate
//! authorities are global.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::certificate::TrustRoot;

/// How verification findings are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// No checks
    Off,
    /// Findings are logged and returned, never raised
    #[default]
    Warn,
    /// Any finding is a verification error
    Enforce,
}

impl fmt::Display for Enforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Enforcement::Off => write!(f, "off"),
            Enforcement::Warn => write!(f, "warn"),
            Enforcement::Enforce => write!(f, "enforce"),
        }
    }
}

/// A certificate identity allowed to sign artifacts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustedIdentity {
    /// OIDC issuer URL
    pub issuer: String,
    /// Certificate subject (email or workflow identity)
    pub subject: String,
}

impl TrustedIdentity {
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
        }
    }
}

/// Partial policy applied for one environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<Enforcement>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_sbom: Option<bool>,
}

/// Signature verification policy (the `registry.verification` block)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub enforcement: Enforcement,

    #[serde(default)]
    pub trusted_issuers: Vec<TrustedIdentity>,

    /// Authorities whose certificates vouch for signer identities
    #[serde(default, skip_serializing_if = "TrustRoot::is_empty")]
    pub trusted_authorities: TrustRoot,

    #[serde(default)]
    pub require_sbom: bool,

    #[serde(default)]
    pub environment_policies: IndexMap<String, EnvironmentPolicy>,
}

fn default_enabled() -> bool {
    true
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            enforcement: Enforcement::default(),
            trusted_issuers: Vec::new(),
            trusted_authorities: TrustRoot::default(),
            require_sbom: false,
            environment_policies: IndexMap::new(),
        }
    }
}

/// Policy after environment overrides have been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub enforcement: Enforcement,
    pub require_sbom: bool,
}

impl VerificationPolicy {
    /// Policy with the given enforcement level and trusted identities
    pub fn new(enforcement: Enforcement, trusted_issuers: Vec<TrustedIdentity>) -> Self {
        Self {
            enforcement,
            trusted_issuers,
            ..Self::default()
        }
    }

    /// Accept certificates from these authorities
    pub fn with_trust_root(mut self, root: TrustRoot) -> Self {
        self.trusted_authorities = root;
        self
    }

    /// Add an environment override
    pub fn with_environment(mut self, environment: impl Into<String>, policy: EnvironmentPolicy) -> Self {
        self.environment_policies.insert(environment.into(), policy);
        self
    }

    /// Merge the override for `environment` (if any) over the base policy
    ///
    /// A disabled policy is always `off`.
    pub fn effective(&self, environment: Option<&str>) -> EffectivePolicy {
        if !self.enabled {
            return EffectivePolicy {
                enforcement: Enforcement::Off,
                require_sbom: false,
            };
        }

        let overrides = environment.and_then(|env| self.environment_policies.get(env));
        EffectivePolicy {
            enforcement: overrides
                .and_then(|o| o.enforcement)
                .unwrap_or(self.enforcement),
            require_sbom: overrides
                .and_then(|o| o.require_sbom)
                .unwrap_or(self.require_sbom),
        }
    }

    /// Trusted identities as a set for O(1) membership checks
    pub fn trusted_set(&self) -> HashSet<(&str, &str)> {
        self.trusted_issuers
            .iter()
            .map(|t| (t.issuer.as_str(), t.subject.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> VerificationPolicy {
        VerificationPolicy::new(Enforcement::Warn, vec![])
            .with_environment(
                "prod",
                EnvironmentPolicy {
                    enforcement: Some(Enforcement::Enforce),
                    require_sbom: Some(true),
                },
            )
            .with_environment(
                "staging",
                EnvironmentPolicy {
                    enforcement: None,
                    require_sbom: Some(true),
                },
            )
    }

    #[test]
    fn test_base_policy_without_environment() {
        let effective = policy().effective(None);
        assert_eq!(effective.enforcement, Enforcement::Warn);
        assert!(!effective.require_sbom);
    }

    #[test]
    fn test_full_override() {
        let effective = policy().effective(Some("prod"));
        assert_eq!(effective.enforcement, Enforcement::Enforce);
        assert!(effective.require_sbom);
    }

    #[test]
    fn test_partial_override_keeps_base() {
        let effective = policy().effective(Some("staging"));
        assert_eq!(effective.enforcement, Enforcement::Warn);
        assert!(effective.require_sbom);
    }

    #[test]
    fn test_unknown_environment_uses_base() {
        let effective = policy().effective(Some("dev"));
        assert_eq!(effective.enforcement, Enforcement::Warn);
    }

    #[test]
    fn test_disabled_is_off() {
        let mut p = policy();
        p.enabled = false;
        assert_eq!(p.effective(Some("prod")).enforcement, Enforcement::Off);
    }

    #[test]
    fn test_deserialize_block() {
        let p: VerificationPolicy = serde_json::from_value(serde_json::json!({
            "enforcement": "enforce",
            "trusted_issuers": [{"issuer": "https://token.actions.githubusercontent.com", "subject": "repo:acme/floe"}],
            "environment_policies": {"dev": {"enforcement": "off"}}
        }))
        .unwrap();

        assert!(p.enabled);
        assert_eq!(p.enforcement, Enforcement::Enforce);
        assert_eq!(p.trusted_issuers.len(), 1);
        assert_eq!(p.effective(Some("dev")).enforcement, Enforcement::Off);
    }
}
