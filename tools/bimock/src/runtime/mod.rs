use crate::errors::BimockError;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, BimockError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), BimockError>;
    /// Appends `line` plus a trailing newline, creating the file when missing.
    fn append_line(&self, path: &Path, line: &str) -> Result<(), BimockError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), BimockError>;
    fn remove_file(&self, path: &Path) -> Result<(), BimockError>;
    fn exists(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), BimockError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, BimockError> {
        std::fs::read_to_string(path)
            .map_err(|e| BimockError::Io(format!("read {}: {e}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), BimockError> {
        std::fs::write(path, contents).map_err(|e| BimockError::Io(e.to_string()))
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), BimockError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| BimockError::Io(format!("open {}: {e}", path.display())))?;
        // One write per line keeps O_APPEND writes whole.
        let mut buffer = String::with_capacity(line.len() + 1);
        buffer.push_str(line);
        buffer.push('\n');
        file.write_all(buffer.as_bytes())
            .map_err(|e| BimockError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), BimockError> {
        std::fs::create_dir_all(path).map_err(|e| BimockError::Io(e.to_string()))
    }

    fn remove_file(&self, path: &Path) -> Result<(), BimockError> {
        std::fs::remove_file(path).map_err(|e| BimockError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), BimockError> {
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| BimockError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<BimockError>>>,
    locked: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: BimockError) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Marks `path` as undeletable; `remove_file` on it always fails.
    pub fn lock_file(&self, path: impl Into<PathBuf>) {
        self.locked.lock().unwrap_or_else(PoisonError::into_inner).push(path.into());
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).get(path).cloned()
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn maybe_fail(&self) -> Result<(), BimockError> {
        if let Some(err) = self.fail_next.lock().unwrap_or_else(PoisonError::into_inner).take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, BimockError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| BimockError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), BimockError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), BimockError> {
        self.maybe_fail()?;
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = files.entry(path.to_path_buf()).or_default();
        entry.push_str(line);
        entry.push('\n');
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), BimockError> {
        self.maybe_fail()?;
        self.dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), BimockError> {
        self.maybe_fail()?;
        if self
            .locked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| p == path)
        {
            return Err(BimockError::Io(format!(
                "permission denied: {}",
                path.display()
            )));
        }
        self.files.lock().unwrap_or_else(PoisonError::into_inner).remove(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), BimockError> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FakeFileSystem, FileSystem, ProductionFileSystem};
    use crate::errors::BimockError;
    use std::path::Path;

    #[test]
    fn fake_file_system_appends_lines_in_order() {
        let fs = FakeFileSystem::default();
        let path = Path::new("/log.jsonl");
        fs.append_line(path, "one").expect("append one");
        fs.append_line(path, "two").expect("append two");
        assert_eq!(fs.read_to_string(path).expect("read"), "one\ntwo\n");
    }

    #[test]
    fn fake_file_system_refuses_to_remove_locked_files() {
        let fs = FakeFileSystem::with_file("/stale.jsonl", "{}\n");
        fs.lock_file("/stale.jsonl");
        let err = fs
            .remove_file(Path::new("/stale.jsonl"))
            .expect_err("locked file must not be removed");
        assert!(matches!(err, BimockError::Io(_)));
        assert!(fs.exists(Path::new("/stale.jsonl")));
    }

    #[test]
    fn fake_file_system_fail_next_is_one_shot() {
        let fs = FakeFileSystem::default();
        fs.set_fail_next(BimockError::Io("disk full".to_string()));
        assert!(fs.append_line(Path::new("/a"), "x").is_err());
        assert!(fs.append_line(Path::new("/a"), "x").is_ok());
    }

    #[test]
    fn production_file_system_appends_with_trailing_newline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("calls.jsonl");
        let fs = ProductionFileSystem;
        fs.append_line(&path, "{\"a\":1}").expect("append");
        fs.append_line(&path, "{\"a\":2}").expect("append");
        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text, "{\"a\":1}\n{\"a\":2}\n");
        fs.remove_file(&path).expect("remove");
        assert!(!fs.exists(&path));
    }
}
