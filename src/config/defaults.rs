//! Built-in defaults (layer 1)
//!
//! Everything except the registry URI has a default.

use serde_json::{json, Value};

use crate::cache::CacheConfig;
use crate::promotion::PromotionConfig;

use super::platform::{DEFAULT_FULCIO_URL, DEFAULT_OIDC_ISSUER, DEFAULT_REKOR_URL};

/// Built-in default configuration values
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    pub tls_verify: bool,
    pub registry_timeout_seconds: u64,
    pub cache: CacheConfig,
    pub promotion: PromotionConfig,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            tls_verify: true,
            registry_timeout_seconds: 30,
            cache: CacheConfig::default(),
            promotion: PromotionConfig::default(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> Value {
        json!({
            "registry": {
                "auth": {"type": "anonymous"},
                "tls_verify": self.tls_verify,
                "timeout_seconds": self.registry_timeout_seconds,
                "cache": self.cache,
            },
            "promotion": self.promotion,
            "signing": {
                "oidc_issuer": DEFAULT_OIDC_ISSUER,
                "fulcio_url": DEFAULT_FULCIO_URL,
                "rekor_url": DEFAULT_REKOR_URL,
                "timeout_seconds": 30,
            }
        })
    }
}
