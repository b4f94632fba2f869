//! Configuration merge logic
//!
//! Layers merge with:
//! - Objects: deep-merge by key, existing key order kept
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge two JSON values.
///
/// Merge semantics:
/// - Objects: deep-merge by key (recursive)
/// - Arrays: REPLACE (second wins entirely)
/// - Scalars: override (second wins)
/// - Null: override (null can override any value)
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                // Merge in place so configured ordering (gate order) survives
                match base_map.get_mut(&key) {
                    Some(base_value) => {
                        let merged = deep_merge(base_value.take(), overlay_value);
                        *base_value = merged;
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }

        (Value::Array(_), overlay @ Value::Array(_)) => overlay,

        (_, overlay) => overlay,
    }
}

/// Merge multiple config layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let base = json!({"registry": {"tls_verify": true}});
        let overlay = json!({"registry": {"tls_verify": false}});
        let result = deep_merge(base, overlay);
        assert_eq!(result["registry"]["tls_verify"], false);
    }

    #[test]
    fn test_object_deep_merge() {
        let base = json!({
            "cache": {
                "enabled": true,
                "max_size_gb": 10.0
            }
        });
        let overlay = json!({
            "cache": {
                "enabled": false
            }
        });
        let result = deep_merge(base, overlay);

        assert_eq!(result["cache"]["enabled"], false);
        assert_eq!(result["cache"]["max_size_gb"], 10.0);
    }

    #[test]
    fn test_array_replace() {
        let base = json!({
            "environments": [{"name": "dev"}, {"name": "staging"}, {"name": "prod"}]
        });
        let overlay = json!({
            "environments": [{"name": "qa"}, {"name": "live"}]
        });
        let result = deep_merge(base, overlay);

        let envs = result["environments"].as_array().unwrap();
        assert_eq!(envs.len(), 2);
        assert_eq!(envs[0]["name"], "qa");
    }

    #[test]
    fn test_key_order_preserved() {
        let base = json!({"gates": {"policy_compliance": true, "tests": true, "security_scan": false}});
        let overlay = json!({"gates": {"tests": false}});
        let result = deep_merge(base, overlay);

        let keys: Vec<_> = result["gates"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["policy_compliance", "tests", "security_scan"]);
        assert_eq!(result["gates"]["tests"], false);
    }

    #[test]
    fn test_null_override() {
        let base = json!({"catalog": {"uri": "http://catalog"}});
        let overlay = json!({"catalog": null});
        let result = deep_merge(base, overlay);

        assert!(result["catalog"].is_null());
    }

    #[test]
    fn test_merge_layers() {
        let builtin = json!({"registry": {"timeout_seconds": 30}, "signing": {"rekor_url": "a"}});
        let file = json!({"registry": {"timeout_seconds": 60}});
        let env = json!({"signing": {"rekor_url": "b"}});
        let cli = json!({"registry": {"timeout_seconds": 5}});

        let result = merge_layers(vec![builtin, file, env, cli]);

        assert_eq!(result["registry"]["timeout_seconds"], 5);
        assert_eq!(result["signing"]["rekor_url"], "b");
    }
}
