//! Replay mode: answer calls from a previously recorded invocation log.

use crate::errors::BimockError;
use crate::logging::{emit, JsonlLogger};
use crate::replay::payload::Replayable;
use crate::replay::recording::{load_records, InvocationRecord, Outcome, ReplayableError};
use crate::runtime::FileSystem;
use crate::signature::MethodSignature;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Records recorded for a signature but never asked for during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvocations {
    pub signature: MethodSignature,
    pub count: usize,
}

/// Per-signature FIFO queues built from a fully loaded log.
pub struct Replayer {
    path: Option<PathBuf>,
    queues: Mutex<HashMap<MethodSignature, VecDeque<InvocationRecord>>>,
    /// Signatures in first-seen log order.
    order: Vec<MethodSignature>,
    total: usize,
    logger: Option<JsonlLogger>,
}

impl Replayer {
    /// Loads and parses the entire log before any call can be answered.
    pub fn load(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<Self, BimockError> {
        Self::load_with_events(fs, path, None)
    }

    pub fn load_with_events(
        fs: &dyn FileSystem,
        path: impl AsRef<Path>,
        logger: Option<JsonlLogger>,
    ) -> Result<Self, BimockError> {
        let path = path.as_ref();
        let records = load_records(fs, path)?;
        let mut replayer = Self::from_records(records);
        replayer.path = Some(path.to_path_buf());
        emit(
            logger.as_ref(),
            "info",
            "replay_loaded",
            json!({
                "log": path.display().to_string(),
                "records": replayer.total,
                "signatures": replayer.order.len(),
            }),
        );
        replayer.logger = logger;
        Ok(replayer)
    }

    pub fn from_records(records: Vec<InvocationRecord>) -> Self {
        let total = records.len();
        let mut order = Vec::new();
        let mut queues: HashMap<MethodSignature, VecDeque<InvocationRecord>> = HashMap::new();
        for record in records {
            let queue = queues.entry(record.method.clone()).or_insert_with(|| {
                order.push(record.method.clone());
                VecDeque::new()
            });
            queue.push_back(record);
        }
        Self {
            path: None,
            queues: Mutex::new(queues),
            order,
            total,
            logger: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn total_records(&self) -> usize {
        self.total
    }

    /// Pops the next recorded outcome for `signature`.
    pub fn next_record(&self, signature: &MethodSignature) -> Result<InvocationRecord, BimockError> {
        let next = self
            .queues()
            .get_mut(signature)
            .and_then(VecDeque::pop_front);
        next.ok_or_else(|| {
            emit(
                self.logger.as_ref(),
                "warn",
                "replay_overflow",
                json!({ "signature": signature.to_string() }),
            );
            BimockError::ReplayOverflow {
                signature: signature.to_string(),
            }
        })
    }

    /// Reproduces the next recorded outcome through the caller's types.
    pub fn answer<T, E>(&self, signature: &MethodSignature) -> Result<T, E>
    where
        T: Replayable,
        E: ReplayableError + From<BimockError>,
    {
        match self.next_record(signature)?.outcome {
            Outcome::Success { value } => Ok(T::from_payload(value)?),
            Outcome::Failure { failure } => Err(E::from_failure(failure)?),
        }
    }

    /// Infallible variant of [`Replayer::answer`].
    ///
    /// # Panics
    /// On replay overflow, on a recorded failure, or when the recorded value
    /// does not decode into `T`.
    pub fn answer_infallible<T: Replayable>(&self, signature: &MethodSignature) -> T {
        let answered = self
            .next_record(signature)
            .and_then(|record| match record.outcome {
                Outcome::Success { value } => T::from_payload(value),
                Outcome::Failure { failure } => Err(BimockError::Codec(format!(
                    "recorded failure `{failure}` cannot be replayed through infallible {signature}"
                ))),
            });
        match answered {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Unconsumed records per signature, in first-seen log order.
    pub fn remaining(&self) -> Vec<PendingInvocations> {
        let queues = self.queues();
        self.order
            .iter()
            .filter_map(|signature| {
                let count = queues.get(signature).map_or(0, VecDeque::len);
                (count > 0).then(|| PendingInvocations {
                    signature: signature.clone(),
                    count,
                })
            })
            .collect()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_empty()
    }

    /// Fails when any recorded invocation was never replayed.
    pub fn verify_exhausted(&self) -> Result<(), BimockError> {
        let pending = self.remaining();
        if pending.is_empty() {
            return Ok(());
        }
        let pending = pending
            .iter()
            .map(|p| format!("{} x{}", p.signature, p.count))
            .collect::<Vec<_>>()
            .join(", ");
        Err(BimockError::UnconsumedRecords { pending })
    }

    // A panic while holding the lock cannot leave a queue half-popped, so a
    // poisoned guard is still consistent.
    fn queues(&self) -> MutexGuard<'_, HashMap<MethodSignature, VecDeque<InvocationRecord>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
