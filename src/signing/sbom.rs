//! SBOM generation via an external tool (`syft`)

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::process::{self, CommandOutcome};

use super::attestation::{CYCLONEDX_PREDICATE_TYPE, SPDX_PREDICATE_TYPE};
use super::error::SbomError;

/// Default generator binary
pub const DEFAULT_SBOM_TOOL: &str = "syft";

/// Output document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SbomFormat {
    #[default]
    SpdxJson,
    CycloneDxJson,
}

impl SbomFormat {
    /// `-o` argument for the tool
    pub fn tool_arg(&self) -> &'static str {
        match self {
            SbomFormat::SpdxJson => "spdx-json",
            SbomFormat::CycloneDxJson => "cyclonedx-json",
        }
    }

    /// Attestation predicate type for documents of this format
    pub fn predicate_type(&self) -> &'static str {
        match self {
            SbomFormat::SpdxJson => SPDX_PREDICATE_TYPE,
            SbomFormat::CycloneDxJson => CYCLONEDX_PREDICATE_TYPE,
        }
    }
}

impl std::str::FromStr for SbomFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spdx" | "spdx-json" => Ok(SbomFormat::SpdxJson),
            "cyclonedx" | "cyclonedx-json" => Ok(SbomFormat::CycloneDxJson),
            other => Err(format!("unknown SBOM format '{}'", other)),
        }
    }
}

/// A generated SBOM document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbomDocument {
    pub format: SbomFormat,
    pub document: Value,
}

/// Soft result for callers that treat a missing SBOM as degraded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SbomOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<SbomDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<Result<SbomDocument, SbomError>> for SbomOutcome {
    fn from(result: Result<SbomDocument, SbomError>) -> Self {
        match result {
            Ok(document) => SbomOutcome {
                success: true,
                document: Some(document),
                warning: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "SBOM generation degraded");
                SbomOutcome {
                    success: false,
                    document: None,
                    warning: Some(e.to_string()),
                }
            }
        }
    }
}

/// Runs the SBOM tool against a project directory
#[derive(Debug, Clone)]
pub struct SbomGenerator {
    tool: PathBuf,
    timeout: Duration,
}

impl Default for SbomGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SBOM_TOOL, Duration::from_secs(300))
    }
}

impl SbomGenerator {
    pub fn new(tool: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            timeout,
        }
    }

    /// Generate a document; a missing tool is [`SbomError::ToolNotFound`]
    pub fn generate(&self, project_dir: &Path, format: SbomFormat) -> Result<SbomDocument, SbomError> {
        if !project_dir.is_dir() {
            return Err(SbomError::MissingProject(project_dir.to_path_buf()));
        }

        let mut cmd = Command::new(&self.tool);
        cmd.arg(format!("dir:{}", project_dir.display()))
            .arg("-o")
            .arg(format.tool_arg())
            .arg("-q");

        let outcome = match process::run_with_timeout(&mut cmd, self.timeout) {
            Ok(outcome) => outcome,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SbomError::ToolNotFound {
                    tool: self.tool.display().to_string(),
                })
            }
            Err(e) => return Err(SbomError::Io(e)),
        };

        match outcome {
            CommandOutcome::TimedOut { .. } => Err(SbomError::Timeout(self.timeout.as_secs())),
            CommandOutcome::Completed {
                status, stdout, stderr, ..
            } => {
                if !status.success() {
                    return Err(SbomError::GenerationFailed(format!(
                        "{} exited with {}: {}",
                        self.tool.display(),
                        status,
                        process::tail(&stderr, 2000)
                    )));
                }
                let document: Value = serde_json::from_slice(&stdout)?;
                tracing::info!(project = %project_dir.display(), format = format.tool_arg(), "generated SBOM");
                Ok(SbomDocument { format, document })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_tool_is_distinct_error() {
        let dir = TempDir::new().unwrap();
        let generator = SbomGenerator::new("floe-no-such-sbom-tool", Duration::from_secs(5));

        let err = generator.generate(dir.path(), SbomFormat::SpdxJson).unwrap_err();
        assert!(matches!(err, SbomError::ToolNotFound { .. }));
    }

    #[test]
    fn test_outcome_wraps_error() {
        let outcome: SbomOutcome = Err(SbomError::ToolNotFound {
            tool: "syft".to_string(),
        })
        .into();
        assert!(!outcome.success);
        assert!(outcome.warning.unwrap().contains("syft"));
    }

    #[test]
    fn test_missing_project() {
        let generator = SbomGenerator::default();
        let err = generator
            .generate(Path::new("/nonexistent/project"), SbomFormat::SpdxJson)
            .unwrap_err();
        assert!(matches!(err, SbomError::MissingProject(_)));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("spdx".parse::<SbomFormat>().unwrap(), SbomFormat::SpdxJson);
        assert_eq!(
            "cyclonedx-json".parse::<SbomFormat>().unwrap(),
            SbomFormat::CycloneDxJson
        );
        assert!("xml".parse::<SbomFormat>().is_err());
        assert_eq!(SbomFormat::CycloneDxJson.predicate_type(), CYCLONEDX_PREDICATE_TYPE);
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_output_parsed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("fake-syft");
        std::fs::write(&tool, "#!/bin/sh\necho '{\"spdxVersion\":\"SPDX-2.3\"}'\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let doc = SbomGenerator::new(&tool, Duration::from_secs(10))
            .generate(dir.path(), SbomFormat::SpdxJson)
            .unwrap();
        assert_eq!(doc.document["spdxVersion"], "SPDX-2.3");
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("fake-syft");
        std::fs::write(&tool, "#!/bin/sh\necho 'cannot catalog' >&2\nexit 2\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = SbomGenerator::new(&tool, Duration::from_secs(10))
            .generate(dir.path(), SbomFormat::SpdxJson)
            .unwrap_err();
        assert!(matches!(err, SbomError::GenerationFailed(ref m) if m.contains("cannot catalog")));
    }
}
