use crate::errors::BimockError;
use crate::replay::recording::{decode_log, InvocationRecord};
use crate::signature::MethodSignature;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSummary {
    pub signature: MethodSignature,
    pub calls: usize,
    pub successes: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSummary {
    /// In first-seen order.
    pub signatures: Vec<SignatureSummary>,
    pub records: usize,
    /// First 8 bytes of the SHA-256 of the raw log, hex encoded.
    pub fingerprint: String,
}

impl LogSummary {
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = self
            .signatures
            .iter()
            .map(|s| {
                format!(
                    "{} calls={} successes={} failures={}",
                    s.signature, s.calls, s.successes, s.failures
                )
            })
            .collect::<Vec<_>>();
        lines.push(format!(
            "records={} sha256={}",
            self.records, self.fingerprint
        ));
        lines
    }
}

pub fn summarize(raw: &str) -> Result<LogSummary, BimockError> {
    let records = decode_log(raw)?;
    Ok(summarize_records(&records, fingerprint(raw)))
}

fn summarize_records(records: &[InvocationRecord], fingerprint: String) -> LogSummary {
    let mut index: HashMap<&MethodSignature, usize> = HashMap::new();
    let mut signatures: Vec<SignatureSummary> = Vec::new();
    for record in records {
        let slot = *index.entry(&record.method).or_insert_with(|| {
            signatures.push(SignatureSummary {
                signature: record.method.clone(),
                calls: 0,
                successes: 0,
                failures: 0,
            });
            signatures.len() - 1
        });
        let summary = &mut signatures[slot];
        summary.calls += 1;
        if record.outcome.is_failure() {
            summary.failures += 1;
        } else {
            summary.successes += 1;
        }
    }
    LogSummary {
        signatures,
        records: records.len(),
        fingerprint,
    }
}

pub fn fingerprint(raw: &str) -> String {
    let hash = Sha256::digest(raw.as_bytes());
    hex_bytes(&hash[..8])
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
