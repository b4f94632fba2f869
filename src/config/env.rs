//! Environment-variable overrides (layer 3)

use serde_json::{json, Map, Value};

pub const ENV_REGISTRY_URI: &str = "FLOE_REGISTRY_URI";
pub const ENV_REGISTRY_USERNAME: &str = "FLOE_REGISTRY_USERNAME";
pub const ENV_REGISTRY_PASSWORD: &str = "FLOE_REGISTRY_PASSWORD";
pub const ENV_REGISTRY_TOKEN: &str = "FLOE_REGISTRY_TOKEN";
pub const ENV_CACHE_DIR: &str = "FLOE_CACHE_DIR";
pub const ENV_OIDC_ISSUER: &str = "OIDC_ISSUER";
pub const ENV_FULCIO_URL: &str = "FULCIO_URL";
pub const ENV_REKOR_URL: &str = "REKOR_URL";
pub const ENV_ID_TOKEN: &str = "SIGSTORE_ID_TOKEN";
pub const ENV_AUTHORITY_KEY: &str = "FLOE_SIGNING_AUTHORITY_KEY";

/// Build the override layer from the process environment
pub fn from_process_env() -> Value {
    env_overrides(|key| std::env::var(key).ok())
}

/// Build the override layer from an arbitrary variable lookup
///
/// Empty values are ignored. A registry token wins over basic credentials.
pub fn env_overrides<F>(lookup: F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    let mut registry = Map::new();
    if let Some(uri) = get(ENV_REGISTRY_URI) {
        registry.insert("uri".to_string(), Value::String(uri));
    }
    if let Some(token) = get(ENV_REGISTRY_TOKEN) {
        registry.insert("auth".to_string(), json!({"type": "token", "token": token}));
    } else if let (Some(username), Some(password)) =
        (get(ENV_REGISTRY_USERNAME), get(ENV_REGISTRY_PASSWORD))
    {
        registry.insert(
            "auth".to_string(),
            json!({"type": "basic", "username": username, "password": password}),
        );
    }
    if let Some(dir) = get(ENV_CACHE_DIR) {
        registry.insert("cache".to_string(), json!({"path": dir}));
    }

    let mut signing = Map::new();
    for (var, key) in [
        (ENV_OIDC_ISSUER, "oidc_issuer"),
        (ENV_FULCIO_URL, "fulcio_url"),
        (ENV_REKOR_URL, "rekor_url"),
        (ENV_ID_TOKEN, "identity_token"),
        (ENV_AUTHORITY_KEY, "authority_private_key"),
    ] {
        if let Some(value) = get(var) {
            signing.insert(key.to_string(), Value::String(value));
        }
    }

    let mut root = Map::new();
    if !registry.is_empty() {
        root.insert("registry".to_string(), Value::Object(registry));
    }
    if !signing.is_empty() {
        root.insert("signing".to_string(), Value::Object(signing));
    }
    Value::Object(root)
}
