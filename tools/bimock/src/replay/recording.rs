//! Serializable types for invocation logs.
//!
//! An invocation log is a JSONL file where each line is one `InvocationRecord`.

use crate::codec::JsonCodec;
use crate::errors::BimockError;
use crate::replay::payload::Payload;
use crate::runtime::FileSystem;
use crate::signature::MethodSignature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ── RecordedFailure ───────────────────────────────────────────────────────────

/// Type name and message of an error returned by a recorded call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFailure {
    pub type_name: String,
    #[serde(default)]
    pub message: String,
}

impl RecordedFailure {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Captures any displayable error under its unqualified Rust type name.
    pub fn of<E: fmt::Display>(error: &E) -> Self {
        let full = std::any::type_name::<E>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self::new(short, error.to_string())
    }
}

impl fmt::Display for RecordedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for RecordedFailure {}

/// Error types that can be captured in a log and rebuilt during replay.
pub trait ReplayableError: Sized {
    fn to_failure(&self) -> RecordedFailure;

    /// Rebuilds the error. Unknown `type_name`s should be reported as
    /// `BimockError::Codec`.
    fn from_failure(failure: RecordedFailure) -> Result<Self, BimockError>;
}

impl ReplayableError for RecordedFailure {
    fn to_failure(&self) -> RecordedFailure {
        self.clone()
    }

    fn from_failure(failure: RecordedFailure) -> Result<Self, BimockError> {
        Ok(failure)
    }
}

impl From<BimockError> for RecordedFailure {
    fn from(error: BimockError) -> Self {
        Self::of(&error)
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Exactly one of success or failure; `status` is the discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        #[serde(default)]
        value: Payload,
    },
    Failure {
        failure: RecordedFailure,
    },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

// ── InvocationRecord ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// 1-based position in the log, informational only.
    #[serde(default)]
    pub seq: u64,
    pub method: MethodSignature,
    pub outcome: Outcome,
}

impl InvocationRecord {
    pub fn success(seq: u64, method: MethodSignature, value: Payload) -> Self {
        Self {
            seq,
            method,
            outcome: Outcome::Success { value },
        }
    }

    pub fn failure(seq: u64, method: MethodSignature, failure: RecordedFailure) -> Self {
        Self {
            seq,
            method,
            outcome: Outcome::Failure { failure },
        }
    }

    pub fn encode_line(&self) -> Result<String, BimockError> {
        JsonCodec.to_json(self)
    }

    pub fn decode_line(line: &str) -> Result<Self, BimockError> {
        JsonCodec.from_json(line)
    }
}

/// Decodes a whole log. Blank lines are skipped; the first bad line aborts.
pub fn decode_log(raw: &str) -> Result<Vec<InvocationRecord>, BimockError> {
    let mut records = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = InvocationRecord::decode_line(line).map_err(|e| {
            BimockError::Codec(format!("invocation log line {}: {e}", idx + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}

pub fn load_records(
    fs: &dyn FileSystem,
    path: &Path,
) -> Result<Vec<InvocationRecord>, BimockError> {
    let raw = fs.read_to_string(path)?;
    decode_log(&raw)
}
