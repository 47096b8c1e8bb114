use crate::errors::BimockError;
use crate::log_retention::enforce_total_budget;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Structured harness event log, one `LogEvent` per line.
#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), BimockError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| BimockError::Io(e.to_string()))?;
            }
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| BimockError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BimockError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| BimockError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| BimockError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let _ = enforce_total_budget(parent, &self.retention_prefix(), self.budget_bytes)?;
        }

        Ok(())
    }

    pub fn info(&self, event_type: &str, payload: Value) {
        let _ = self.append(&LogEvent {
            level: "info",
            event_type,
            payload,
        });
    }

    pub fn warn(&self, event_type: &str, payload: Value) {
        let _ = self.append(&LogEvent {
            level: "warn",
            event_type,
            payload,
        });
    }

    fn retention_prefix(&self) -> String {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("events")
            .to_string()
    }
}

/// Optional logger shared by the recorder and replayer.
pub fn emit(logger: Option<&JsonlLogger>, level: &str, event_type: &str, payload: Value) {
    let Some(logger) = logger else {
        return;
    };
    match level {
        "warn" => logger.warn(event_type, payload),
        _ => logger.info(event_type, payload),
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}
