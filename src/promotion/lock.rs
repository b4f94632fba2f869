//! Environment locks
//!
//! Lock state is a JSON document stored in the registry under
//! `floe-lock-{environment}`, so every controller sharing the registry sees
//! the same state. A missing document means unlocked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version for lock documents
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "floe-artifacts/environment_lock@1";

/// Lock state of one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentLock {
    pub schema_version: u32,
    pub schema_id: String,
    pub environment: String,
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

impl EnvironmentLock {
    pub fn unlocked(environment: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            environment: environment.into(),
            locked: false,
            reason: None,
            locked_by: None,
            locked_at: None,
        }
    }

    pub fn locked(
        environment: impl Into<String>,
        reason: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            locked: true,
            reason: Some(reason.into()),
            locked_by: Some(operator.into()),
            locked_at: Some(Utc::now()),
            ..Self::unlocked(environment)
        }
    }
}
