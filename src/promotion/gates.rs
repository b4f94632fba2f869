//! Promotion gates
//!
//! A gate is an external check run before a tag is written into an
//! environment. Each gate yields PASSED, FAILED or SKIPPED; a timed-out gate
//! is FAILED.

use std::collections::HashMap;
use std::fmt;
use std::process::Command;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::process::{self, CommandOutcome};

/// Environment variable carrying the artifact tag
pub const ENV_ARTIFACT_TAG: &str = "FLOE_ARTIFACT_TAG";
/// Environment variable carrying the artifact digest
pub const ENV_ARTIFACT_DIGEST: &str = "FLOE_ARTIFACT_DIGEST";
/// Environment variable carrying the source environment (empty if none)
pub const ENV_SOURCE_ENV: &str = "FLOE_SOURCE_ENV";
/// Environment variable carrying the target environment
pub const ENV_TARGET_ENV: &str = "FLOE_TARGET_ENV";

/// Characters of stderr kept in a failure detail
const STDERR_TAIL_CHARS: usize = 2000;

/// Kind of promotion gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    PolicyCompliance,
    Tests,
    SecurityScan,
    CostAnalysis,
    PerformanceBaseline,
}

impl GateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::PolicyCompliance => "policy_compliance",
            GateKind::Tests => "tests",
            GateKind::SecurityScan => "security_scan",
            GateKind::CostAnalysis => "cost_analysis",
            GateKind::PerformanceBaseline => "performance_baseline",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate configuration: a toggle or a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GateSetting {
    Enabled(bool),
    Command(GateCommand),
}

/// Command-backed gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCommand {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl GateSetting {
    /// Command gate invoking `program args...`
    pub fn command(program: impl Into<String>, args: &[&str]) -> Self {
        GateSetting::Command(GateCommand {
            command: Some(program.into()),
            args: args.iter().map(|a| a.to_string()).collect(),
            enabled: true,
        })
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            GateSetting::Enabled(enabled) => *enabled,
            GateSetting::Command(cmd) => cmd.enabled,
        }
    }

    /// Program and arguments, if the gate has a command
    pub fn invocation(&self) -> Option<(&str, &[String])> {
        match self {
            GateSetting::Command(GateCommand {
                command: Some(program),
                args,
                ..
            }) => Some((program.as_str(), args.as_slice())),
            _ => None,
        }
    }
}

/// Gate outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of running one gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: GateKind,
    pub status: GateStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GateResult {
    pub fn passed(gate: GateKind, duration: Duration) -> Self {
        Self {
            gate,
            status: GateStatus::Passed,
            duration_ms: duration.as_millis() as u64,
            error: None,
        }
    }

    pub fn failed(gate: GateKind, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            gate,
            status: GateStatus::Failed,
            duration_ms: duration.as_millis() as u64,
            error: Some(error.into()),
        }
    }

    pub fn skipped(gate: GateKind) -> Self {
        Self {
            gate,
            status: GateStatus::Skipped,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == GateStatus::Failed
    }
}

/// What a gate is checking
#[derive(Debug, Clone)]
pub struct GateContext<'a> {
    pub tag: &'a str,
    pub digest: &'a str,
    pub source_env: Option<&'a str>,
    pub target_env: &'a str,
    pub timeout: Duration,
}

/// Runs a single gate
pub trait GateExecutor: Send + Sync {
    fn run(&self, gate: GateKind, setting: &GateSetting, ctx: &GateContext<'_>) -> GateResult;
}

/// Runs each gate's configured command with a deadline
///
/// Exit 0 passes, any other exit fails with the stderr tail, and the deadline
/// kills the child and fails the gate. An enabled gate without a command is
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct CommandGateExecutor;

impl GateExecutor for CommandGateExecutor {
    fn run(&self, gate: GateKind, setting: &GateSetting, ctx: &GateContext<'_>) -> GateResult {
        let Some((program, args)) = setting.invocation() else {
            tracing::debug!(%gate, environment = ctx.target_env, "no command configured, skipping gate");
            return GateResult::skipped(gate);
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(ENV_ARTIFACT_TAG, ctx.tag)
            .env(ENV_ARTIFACT_DIGEST, ctx.digest)
            .env(ENV_SOURCE_ENV, ctx.source_env.unwrap_or(""))
            .env(ENV_TARGET_ENV, ctx.target_env);

        let started = Instant::now();
        match process::run_with_timeout(&mut cmd, ctx.timeout) {
            Err(e) => GateResult::failed(
                gate,
                started.elapsed(),
                format!("could not run '{}': {}", program, e),
            ),
            Ok(CommandOutcome::TimedOut { elapsed }) => GateResult::failed(
                gate,
                elapsed,
                format!("timed out after {}s", ctx.timeout.as_secs()),
            ),
            Ok(CommandOutcome::Completed {
                status,
                stderr,
                elapsed,
                ..
            }) => {
                if status.success() {
                    GateResult::passed(gate, elapsed)
                } else {
                    let tail = process::tail(&stderr, STDERR_TAIL_CHARS);
                    let detail = if tail.is_empty() {
                        format!("'{}' exited with {}", program, status)
                    } else {
                        format!("'{}' exited with {}: {}", program, status, tail)
                    };
                    GateResult::failed(gate, elapsed, detail)
                }
            }
        }
    }
}

/// Executor with predetermined outcomes, recording every invocation
///
/// Gates without a scripted outcome pass.
#[derive(Debug, Default)]
pub struct ScriptedGateExecutor {
    failures: HashMap<GateKind, String>,
    invocations: Mutex<Vec<(GateKind, String)>>,
}

impl ScriptedGateExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `gate` fail with `detail`
    pub fn failing(mut self, gate: GateKind, detail: impl Into<String>) -> Self {
        self.failures.insert(gate, detail.into());
        self
    }

    /// `(gate, target environment)` pairs run so far
    pub fn invocations(&self) -> Vec<(GateKind, String)> {
        self.invocations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl GateExecutor for ScriptedGateExecutor {
    fn run(&self, gate: GateKind, _setting: &GateSetting, ctx: &GateContext<'_>) -> GateResult {
        self.invocations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((gate, ctx.target_env.to_string()));
        match self.failures.get(&gate) {
            Some(detail) => GateResult::failed(gate, Duration::ZERO, detail.clone()),
            None => GateResult::passed(gate, Duration::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(timeout: Duration) -> GateContext<'static> {
        GateContext {
            tag: "v1.0.0",
            digest: "sha256:abc",
            source_env: Some("dev"),
            target_env: "staging",
            timeout,
        }
    }

    #[test]
    fn test_setting_forms() {
        let toggle: GateSetting = serde_json::from_str("true").unwrap();
        assert!(toggle.is_enabled());
        assert!(toggle.invocation().is_none());

        let cmd: GateSetting =
            serde_json::from_str(r#"{"command":"make","args":["check"]}"#).unwrap();
        assert!(cmd.is_enabled());
        assert_eq!(cmd.invocation().unwrap().0, "make");

        let off: GateSetting =
            serde_json::from_str(r#"{"command":"make","enabled":false}"#).unwrap();
        assert!(!off.is_enabled());
    }

    #[test]
    fn test_status_wire_form() {
        assert_eq!(serde_json::to_string(&GateStatus::Passed).unwrap(), "\"PASSED\"");
        assert_eq!(
            serde_json::to_string(&GateKind::SecurityScan).unwrap(),
            "\"security_scan\""
        );
    }

    #[test]
    fn test_toggle_without_command_skips() {
        let result = CommandGateExecutor.run(
            GateKind::Tests,
            &GateSetting::Enabled(true),
            &ctx(Duration::from_secs(5)),
        );
        assert_eq!(result.status, GateStatus::Skipped);
    }

    #[test]
    fn test_missing_program_fails() {
        let result = CommandGateExecutor.run(
            GateKind::Tests,
            &GateSetting::command("floe-no-such-gate-binary", &[]),
            &ctx(Duration::from_secs(5)),
        );
        assert!(result.is_failed());
        assert!(result.error.unwrap().contains("could not run"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_pass_and_fail() {
        let pass = CommandGateExecutor.run(
            GateKind::Tests,
            &GateSetting::command("sh", &["-c", "test \"$FLOE_TARGET_ENV\" = staging"]),
            &ctx(Duration::from_secs(5)),
        );
        assert_eq!(pass.status, GateStatus::Passed);

        let fail = CommandGateExecutor.run(
            GateKind::SecurityScan,
            &GateSetting::command("sh", &["-c", "echo 'CVE-2024-0001 found' >&2; exit 3"]),
            &ctx(Duration::from_secs(5)),
        );
        assert!(fail.is_failed());
        assert!(fail.error.unwrap().contains("CVE-2024-0001"));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_is_failure() {
        let result = CommandGateExecutor.run(
            GateKind::Tests,
            &GateSetting::command("sh", &["-c", "exec sleep 5"]),
            &ctx(Duration::from_millis(200)),
        );
        assert!(result.is_failed());
        assert!(result.error.unwrap().contains("timed out"));
        assert!(result.duration_ms < 5000);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_applies_to_wrapped_commands() {
        let started = std::time::Instant::now();
        let result = CommandGateExecutor.run(
            GateKind::Tests,
            &GateSetting::command("sh", &["-c", "sleep 6; exit 0"]),
            &ctx(Duration::from_secs(1)),
        );
        assert_eq!(result.status, GateStatus::Failed);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_scripted_executor() {
        let executor = ScriptedGateExecutor::new().failing(GateKind::SecurityScan, "critical CVE");
        let c = ctx(Duration::from_secs(1));
        assert!(!executor.run(GateKind::Tests, &GateSetting::Enabled(true), &c).is_failed());
        assert!(executor
            .run(GateKind::SecurityScan, &GateSetting::Enabled(true), &c)
            .is_failed());
        assert_eq!(executor.invocations().len(), 2);
    }
}
