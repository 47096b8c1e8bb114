//! Capability proxies selected at construction time.
//!
//! A capability is an ordinary trait. Implement it for `Proxy<YourTarget>` by
//! routing each method through [`Proxy::invoke`] or [`Proxy::invoke_infallible`]:
//!
//! ```
//! use bimock::errors::BimockError;
//! use bimock::proxy::Proxy;
//! use bimock::replay::recording::RecordedFailure;
//! use bimock::signature;
//!
//! trait Calculator {
//!     fn add(&self, a: i32, b: i32) -> i32;
//!     fn divide(&self, a: i32, b: i32) -> Result<i32, RecordedFailure>;
//! }
//!
//! struct RealCalculator;
//!
//! impl Calculator for RealCalculator {
//!     fn add(&self, a: i32, b: i32) -> i32 {
//!         a + b
//!     }
//!     fn divide(&self, a: i32, b: i32) -> Result<i32, RecordedFailure> {
//!         a.checked_div(b)
//!             .ok_or_else(|| RecordedFailure::new("ArithmeticError", "div by zero"))
//!     }
//! }
//!
//! impl<T: Calculator> Calculator for Proxy<T> {
//!     fn add(&self, a: i32, b: i32) -> i32 {
//!         self.invoke_infallible(&signature!(Calculator::add(i32, i32)), |t| t.add(a, b))
//!     }
//!     fn divide(&self, a: i32, b: i32) -> Result<i32, RecordedFailure> {
//!         self.invoke(&signature!(Calculator::divide(i32, i32)), |t| t.divide(a, b))
//!     }
//! }
//! # let _ = BimockError::Cli(String::new());
//! ```

use crate::config::BimockConfig;
use crate::errors::BimockError;
use crate::replay::payload::Replayable;
use crate::replay::recorder::Recorder;
use crate::replay::recording::ReplayableError;
use crate::replay::replayer::Replayer;
use crate::runtime::{FileSystem, ProductionFileSystem};
use crate::signature::MethodSignature;
use crate::types::Mode;
use std::path::Path;
use std::sync::Arc;

pub enum Interceptor {
    Record(Recorder),
    Replay(Replayer),
}

impl Interceptor {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Record(_) => Mode::Record,
            Self::Replay(_) => Mode::Replay,
        }
    }
}

/// Wraps a target behind record or replay interception.
///
/// In replay mode the target is a stand-in and is never called.
pub struct Proxy<T> {
    target: T,
    interceptor: Interceptor,
}

impl<T> Proxy<T> {
    pub fn new(target: T, interceptor: Interceptor) -> Self {
        Self {
            target,
            interceptor,
        }
    }

    pub fn mode(&self) -> Mode {
        self.interceptor.mode()
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn replayer(&self) -> Option<&Replayer> {
        match &self.interceptor {
            Interceptor::Replay(replayer) => Some(replayer),
            Interceptor::Record(_) => None,
        }
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        match &self.interceptor {
            Interceptor::Record(recorder) => Some(recorder),
            Interceptor::Replay(_) => None,
        }
    }

    pub fn invoke<R, E, F>(&self, signature: &MethodSignature, call: F) -> Result<R, E>
    where
        R: Replayable,
        E: ReplayableError + From<BimockError>,
        F: FnOnce(&T) -> Result<R, E>,
    {
        match &self.interceptor {
            Interceptor::Record(recorder) => recorder.call(signature, || call(&self.target)),
            Interceptor::Replay(replayer) => replayer.answer(signature),
        }
    }

    /// # Panics
    /// See [`Recorder::call_infallible`] and [`Replayer::answer_infallible`].
    pub fn invoke_infallible<R, F>(&self, signature: &MethodSignature, call: F) -> R
    where
        R: Replayable,
        F: FnOnce(&T) -> R,
    {
        match &self.interceptor {
            Interceptor::Record(recorder) => {
                recorder.call_infallible(signature, || call(&self.target))
            }
            Interceptor::Replay(replayer) => replayer.answer_infallible(signature),
        }
    }
}

/// Builds proxies from configuration.
pub struct Bimock {
    config: BimockConfig,
    fs: Arc<dyn FileSystem>,
}

impl Bimock {
    pub fn new(config: BimockConfig) -> Self {
        Self::with_file_system(config, Arc::new(ProductionFileSystem))
    }

    pub fn with_file_system(config: BimockConfig, fs: Arc<dyn FileSystem>) -> Self {
        Self { config, fs }
    }

    pub fn config(&self) -> &BimockConfig {
        &self.config
    }

    /// Opens the named resource in the configured default mode.
    pub fn of<T>(&self, target: T, name: &str) -> Result<Proxy<T>, BimockError> {
        self.open(target, self.config.mode.default, self.config.resource_path(name))
    }

    pub fn open<T>(
        &self,
        target: T,
        mode: Mode,
        log: impl AsRef<Path>,
    ) -> Result<Proxy<T>, BimockError> {
        match mode {
            Mode::Record => self.record(target, log),
            Mode::Replay => self.replay(target, log),
        }
    }

    pub fn record<T>(&self, target: T, log: impl AsRef<Path>) -> Result<Proxy<T>, BimockError> {
        let recorder =
            Recorder::start_with_events(Arc::clone(&self.fs), log, self.config.event_logger())?;
        Ok(Proxy::new(target, Interceptor::Record(recorder)))
    }

    pub fn replay<T>(&self, stand_in: T, log: impl AsRef<Path>) -> Result<Proxy<T>, BimockError> {
        let replayer =
            Replayer::load_with_events(self.fs.as_ref(), log, self.config.event_logger())?;
        Ok(Proxy::new(stand_in, Interceptor::Replay(replayer)))
    }
}
