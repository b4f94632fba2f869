//! Tracing subscriber setup for the CLI
//!
//! Filter precedence: `FLOE_LOG`, then `RUST_LOG`, then the `-v` count.
//! Logs go to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

/// Crate-specific log filter variable
pub const ENV_LOG: &str = "FLOE_LOG";

/// Filter directive for the given environment and verbosity
pub fn directive(floe_log: Option<&str>, rust_log: Option<&str>, verbosity: u8) -> String {
    if let Some(value) = floe_log.filter(|v| !v.trim().is_empty()) {
        return value.to_string();
    }
    if let Some(value) = rust_log.filter(|v| !v.trim().is_empty()) {
        return value.to_string();
    }
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
    .to_string()
}

/// Install the global subscriber; a second call is ignored
pub fn init(verbosity: u8, json: bool) {
    let floe_log = std::env::var(ENV_LOG).ok();
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = directive(floe_log.as_deref(), rust_log.as_deref(), verbosity);

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        assert_eq!(directive(Some("floe_artifacts=debug"), Some("trace"), 0), "floe_artifacts=debug");
        assert_eq!(directive(None, Some("info"), 0), "info");
        assert_eq!(directive(Some("  "), Some("info"), 0), "info");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(directive(None, None, 0), "warn");
        assert_eq!(directive(None, None, 1), "info");
        assert_eq!(directive(None, None, 2), "debug");
        assert_eq!(directive(None, None, 7), "trace");
    }
}
