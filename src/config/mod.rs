//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Config file (`floe.toml`)
//! 3. Environment variables (`FLOE_REGISTRY_URI`, `REKOR_URL`, ...)
//! 4. CLI flags

mod defaults;
mod effective;
pub mod env;
mod merge;
mod platform;

pub use defaults::BuiltinDefaults;
pub use effective::{
    toml_to_json, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, DEFAULT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};
pub use platform::{
    CatalogConfig, PlatformConfig, RegistryAuth, RegistryConfig, RegistryLocation, SigningConfig,
    DEFAULT_FULCIO_URL, DEFAULT_OIDC_ISSUER, DEFAULT_REKOR_URL,
};
