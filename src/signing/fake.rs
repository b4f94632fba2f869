//! In-process transparency log
//!
//! Stand-in for Rekor in tests and offline registries.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use super::bundle::LogEntry;
use super::error::SigningError;
use super::tlog::{LogSubmission, TransparencyLog};

/// Monotonic in-memory log
#[derive(Debug)]
pub struct FakeTransparencyLog {
    next_index: AtomicU64,
    fail: bool,
}

impl FakeTransparencyLog {
    /// Log whose first entry gets index 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(index: u64) -> Self {
        Self {
            next_index: AtomicU64::new(index),
            fail: false,
        }
    }

    /// Log that rejects every submission
    pub fn failing() -> Self {
        Self {
            next_index: AtomicU64::new(1),
            fail: true,
        }
    }
}

impl Default for FakeTransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TransparencyLog for FakeTransparencyLog {
    fn submit(&self, submission: &LogSubmission<'_>) -> Result<LogEntry, SigningError> {
        if self.fail {
            return Err(SigningError::TransparencyLog(
                "transparency log is unreachable".to_string(),
            ));
        }
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        Ok(LogEntry {
            log_index: index,
            uuid: hex::encode(&submission.signature[..8.min(submission.signature.len())]),
            integrated_time: Utc::now().timestamp(),
        })
    }
}
