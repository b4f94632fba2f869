//! Transparency log submission (Rekor-style)

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest as _, Sha256};

use super::bundle::LogEntry;
use super::error::SigningError;

/// What gets recorded in the log
#[derive(Debug, Clone)]
pub struct LogSubmission<'a> {
    /// Exact bytes that were signed
    pub payload: &'a [u8],
    pub signature: &'a [u8],
    /// Signing certificate PEM
    pub certificate: &'a str,
}

/// Append-only transparency log
pub trait TransparencyLog: Send + Sync {
    fn submit(&self, submission: &LogSubmission<'_>) -> Result<LogEntry, SigningError>;
}

/// Rekor v1 HTTP client submitting `hashedrekord` entries
pub struct RekorClient {
    agent: ureq::Agent,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RekorEntry {
    log_index: i64,
    #[serde(default)]
    integrated_time: i64,
}

impl RekorClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl TransparencyLog for RekorClient {
    fn submit(&self, submission: &LogSubmission<'_>) -> Result<LogEntry, SigningError> {
        let url = format!("{}/api/v1/log/entries", self.base_url);
        let request = json!({
            "kind": "hashedrekord",
            "apiVersion": "0.0.1",
            "spec": {
                "signature": {
                    "content": STANDARD.encode(submission.signature),
                    "publicKey": {"content": STANDARD.encode(submission.certificate)},
                },
                "data": {
                    "hash": {
                        "algorithm": "sha256",
                        "value": hex::encode(Sha256::digest(submission.payload)),
                    }
                }
            }
        });

        let body = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .send(request.to_string().as_bytes())
            .map_err(|e| SigningError::TransparencyLog(format!("{}: {}", url, e)))?
            .into_body()
            .read_to_vec()
            .map_err(|e| SigningError::TransparencyLog(format!("{}: {}", url, e)))?;

        parse_entry(&body)
    }
}

/// Response body is `{ "<uuid>": { "logIndex": N, ... } }`
fn parse_entry(body: &[u8]) -> Result<LogEntry, SigningError> {
    let entries: BTreeMap<String, RekorEntry> = serde_json::from_slice(body)
        .map_err(|e| SigningError::TransparencyLog(format!("invalid response: {}", e)))?;
    let (uuid, entry) = entries
        .into_iter()
        .next()
        .ok_or_else(|| SigningError::TransparencyLog("response carried no entry".to_string()))?;

    if entry.log_index <= 0 {
        return Err(SigningError::InvalidLogIndex(entry.log_index));
    }

    Ok(LogEntry {
        log_index: entry.log_index as u64,
        uuid,
        integrated_time: entry.integrated_time,
    })
}
