//! Invocation recording and replay.
//!
//! # Overview
//!
//! In **Record** mode every outermost call on a proxy is delegated to the real
//! target and its outcome (value or error) is appended to a JSONL invocation
//! log, one `InvocationRecord` per line.
//!
//! In **Replay** mode the whole log is loaded up front and grouped into one FIFO
//! queue per method signature. Calls are answered from those queues without
//! touching a real implementation; a call with nothing left to answer it is a
//! `ReplayOverflow`.

pub mod payload;
pub mod recorder;
pub mod recording;
pub mod replayer;
