//! Environment promotion
//!
//! - [`PromotionConfig`]: the ordered environment pipeline and its gates
//! - [`PromotionController`]: promote, lock, roll back, and query history
//! - [`GateExecutor`]: how gates are run

mod controller;
mod environment;
mod gates;
mod lock;
mod record;
mod rollback;

pub use controller::{PromotionController, PromotionStatus};
pub use environment::{EnvironmentConfig, PromotionConfig};
pub use gates::{
    CommandGateExecutor, GateCommand, GateContext, GateExecutor, GateKind, GateResult,
    GateSetting, GateStatus, ScriptedGateExecutor, ENV_ARTIFACT_DIGEST, ENV_ARTIFACT_TAG,
    ENV_SOURCE_ENV, ENV_TARGET_ENV,
};
pub use lock::EnvironmentLock;
pub use record::{new_trace_id, PromotionRecord, RollbackRecord};
pub use rollback::{analyze_rollback_impact, RollbackImpactAnalysis};
