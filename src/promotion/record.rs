//! Promotion and rollback audit records
//!
//! Records are immutable once created. Promotion records travel as the
//! `floe.promotion` annotation on `{tag}-{env}`; rollback records as the
//! `floe.rollback` annotation on the rollback tag.

use chrono::{DateTime, Utc};
use floe_oci::Digest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signing::VerificationStatus;

use super::gates::GateResult;

/// Schema version for promotion records
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const PROMOTION_SCHEMA_ID: &str = "floe-artifacts/promotion_record@1";

/// Schema identifier
pub const ROLLBACK_SCHEMA_ID: &str = "floe-artifacts/rollback_record@1";

/// New trace correlation id: 32 lowercase hex characters
pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// One promotion of a tag into an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub schema_version: u32,
    pub schema_id: String,
    pub promotion_id: Uuid,
    pub tag: String,
    pub artifact_digest: Digest,
    /// None for a first promotion
    pub source_environment: Option<String>,
    pub target_environment: String,
    pub operator: String,
    pub gate_results: Vec<GateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationStatus>,
    pub trace_id: String,
    pub dry_run: bool,
    pub promoted_at: DateTime<Utc>,
}

/// One rollback of an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub schema_version: u32,
    pub schema_id: String,
    pub rollback_id: Uuid,
    pub tag: String,
    pub environment: String,
    /// Digest the environment was rolled back to
    pub artifact_digest: Digest,
    /// Digest `latest-{env}` pointed at before the rollback
    pub previous_digest: Option<Digest>,
    pub rollback_tag: String,
    pub sequence: u32,
    pub reason: String,
    pub operator: String,
    pub trace_id: String,
    pub rolled_back_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_shape() {
        let id = new_trace_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, new_trace_id());
    }
}
