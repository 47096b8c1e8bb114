//! Record mode: delegate to the real target and log each outermost call.
//!
//! Re-entrancy depth is tracked per thread and per recorder in a
//! `thread_local!` map keyed by recorder id.

use crate::errors::BimockError;
use crate::logging::{emit, JsonlLogger};
use crate::replay::payload::Replayable;
use crate::replay::recording::{InvocationRecord, Outcome, ReplayableError};
use crate::runtime::FileSystem;
use crate::signature::MethodSignature;
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ── Thread-local call depth ───────────────────────────────────────────────────

thread_local! {
    static CALL_DEPTH: RefCell<HashMap<u64, usize>> = RefCell::new(HashMap::new());
}

static NEXT_RECORDER_ID: AtomicU64 = AtomicU64::new(1);

/// Depth of the current thread inside calls intercepted by `recorder_id`.
pub fn current_depth(recorder_id: u64) -> usize {
    CALL_DEPTH.with(|cell| cell.borrow().get(&recorder_id).copied().unwrap_or(0))
}

struct DepthGuard {
    recorder_id: u64,
    outermost: bool,
}

impl DepthGuard {
    fn enter(recorder_id: u64) -> Self {
        let depth = CALL_DEPTH.with(|cell| {
            let mut depths = cell.borrow_mut();
            let depth = depths.entry(recorder_id).or_insert(0);
            *depth += 1;
            *depth
        });
        Self {
            recorder_id,
            outermost: depth == 1,
        }
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|cell| {
            let mut depths = cell.borrow_mut();
            if let Some(depth) = depths.get_mut(&self.recorder_id) {
                *depth = depth.saturating_sub(1);
                if *depth == 0 {
                    depths.remove(&self.recorder_id);
                }
            }
        });
    }
}

// ── Recorder ──────────────────────────────────────────────────────────────────

pub struct Recorder {
    id: u64,
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    /// Guards appends; holds the next `seq`.
    write_lock: Mutex<u64>,
    logger: Option<JsonlLogger>,
}

impl Recorder {
    /// Starts a fresh recording session at `path`, clearing any stale log.
    pub fn start(fs: Arc<dyn FileSystem>, path: impl AsRef<Path>) -> Result<Self, BimockError> {
        Self::start_with_events(fs, path, None)
    }

    pub fn start_with_events(
        fs: Arc<dyn FileSystem>,
        path: impl AsRef<Path>,
        logger: Option<JsonlLogger>,
    ) -> Result<Self, BimockError> {
        let path = path.as_ref().to_path_buf();
        if fs.exists(&path) {
            fs.remove_file(&path)
                .map_err(|e| BimockError::StaleLogConflict {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            if fs.exists(&path) {
                return Err(BimockError::StaleLogConflict {
                    path: path.display().to_string(),
                    reason: "log still present after removal".to_string(),
                });
            }
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs.create_dir_all(parent)?;
        }
        fs.write_string(&path, "")?;

        emit(
            logger.as_ref(),
            "info",
            "record_started",
            json!({ "log": path.display().to_string() }),
        );
        Ok(Self {
            id: NEXT_RECORDER_ID.fetch_add(1, Ordering::Relaxed),
            path,
            fs,
            write_lock: Mutex::new(1),
            logger,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        *self.next_seq() - 1
    }

    /// Runs a fallible call and records its outcome if it is the outermost
    /// intercepted call on this thread.
    pub fn call<T, E, F>(&self, signature: &MethodSignature, call: F) -> Result<T, E>
    where
        T: Replayable,
        E: ReplayableError + From<BimockError>,
        F: FnOnce() -> Result<T, E>,
    {
        let guard = DepthGuard::enter(self.id);
        let result = call();
        let outermost = guard.outermost;
        drop(guard);
        if !outermost {
            return result;
        }

        match result {
            Ok(value) => {
                let (value, payload) = value.capture()?;
                self.append(signature, Outcome::Success { value: payload })?;
                Ok(value)
            }
            Err(error) => {
                let failure = error.to_failure();
                self.append(signature, Outcome::Failure { failure })?;
                Err(error)
            }
        }
    }

    /// Infallible variant of [`Recorder::call`].
    ///
    /// # Panics
    /// When the outcome cannot be captured or written; the call has no error
    /// channel to report it through.
    pub fn call_infallible<T, F>(&self, signature: &MethodSignature, call: F) -> T
    where
        T: Replayable,
        F: FnOnce() -> T,
    {
        let guard = DepthGuard::enter(self.id);
        let value = call();
        let outermost = guard.outermost;
        drop(guard);
        if !outermost {
            return value;
        }

        let recorded = value.capture().and_then(|(value, payload)| {
            self.append(signature, Outcome::Success { value: payload })?;
            Ok(value)
        });
        match recorded {
            Ok(value) => value,
            Err(error) => panic!("bimock could not record {signature}: {error}"),
        }
    }

    // The counter only advances after a line is fully written, so a guard
    // poisoned mid-append still holds the right next seq.
    fn next_seq(&self) -> MutexGuard<'_, u64> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, signature: &MethodSignature, outcome: Outcome) -> Result<(), BimockError> {
        let mut next_seq = self.next_seq();
        let seq = *next_seq;
        let status = if outcome.is_failure() { "failure" } else { "success" };
        let line = InvocationRecord {
            seq,
            method: signature.clone(),
            outcome,
        }
        .encode_line()?;
        self.fs.append_line(&self.path, &line)?;
        *next_seq += 1;
        drop(next_seq);

        emit(
            self.logger.as_ref(),
            "info",
            "invocation_recorded",
            json!({
                "seq": seq,
                "signature": signature.to_string(),
                "status": status,
            }),
        );
        Ok(())
    }
}
