use crate::errors::BimockError;
use std::fs;
use std::path::{Path, PathBuf};

/// Deletes the oldest files in `dir` whose names start with `prefix` until their
/// combined size fits `budget_bytes`. Files without the prefix are never touched.
pub fn enforce_total_budget(
    dir: &Path,
    prefix: &str,
    budget_bytes: u64,
) -> Result<Vec<PathBuf>, BimockError> {
    let mut files = fs::read_dir(dir)
        .map_err(|e| BimockError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(prefix))
        })
        .collect::<Vec<_>>();

    files.sort_by(|a, b| {
        let ma = fs::metadata(a).ok().and_then(|m| m.modified().ok());
        let mb = fs::metadata(b).ok().and_then(|m| m.modified().ok());
        ma.cmp(&mb)
    });

    let mut total = files
        .iter()
        .filter_map(|path| fs::metadata(path).ok().map(|meta| meta.len()))
        .sum::<u64>();

    let mut deleted = Vec::new();
    for path in files {
        if total <= budget_bytes {
            break;
        }
        let len = fs::metadata(&path)
            .map_err(|e| BimockError::Io(e.to_string()))?
            .len();
        fs::remove_file(&path).map_err(|e| BimockError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::enforce_total_budget;
    use std::fs;

    #[test]
    fn prunes_oldest_prefixed_files_until_budget_is_met() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("events.1.jsonl"), vec![0u8; 40]).expect("a");
        std::thread::sleep(std::time::Duration::from_millis(2));
        fs::write(dir.path().join("events.jsonl"), vec![0u8; 40]).expect("b");

        let deleted = enforce_total_budget(dir.path(), "events", 50).expect("pruned");
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].ends_with("events.1.jsonl"));
    }

    #[test]
    fn leaves_invocation_logs_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("calculator.jsonl"), vec![0u8; 400]).expect("log");
        fs::write(dir.path().join("events.jsonl"), vec![0u8; 10]).expect("events");

        let deleted = enforce_total_budget(dir.path(), "events", 50).expect("pruned");
        assert!(deleted.is_empty());
        assert!(dir.path().join("calculator.jsonl").exists());
    }
}
