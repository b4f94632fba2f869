//! Floe compiled-artifact lifecycle
//!
//! Publishes compiled artifacts to an OCI registry, signs and verifies them,
//! and promotes them through an ordered set of deployment environments with
//! gates, locks, an audit trail and rollback.
//!
//! - [`registry`]: push / pull / inspect / list, signature and attestation referrers
//! - [`cache`]: disk cache of pulled content with size and TTL eviction
//! - [`signing`]: keyless signing, attestations, SBOMs, policy verification
//! - [`promotion`]: environment state machine, gates, locks, rollback
//! - [`catalog`]: soft-failure contract registration in the data catalog
//! - [`config`]: layered configuration

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod promotion;
pub mod registry;
pub mod signing;

pub use error::{ArtifactError, ExitCode, Result, TransitionReason};
pub use floe_oci::{ArtifactManifest, ArtifactTag, Digest};
pub use promotion::{PromotionController, PromotionRecord, RollbackRecord};
pub use registry::{PushOptions, RegistryClient};
