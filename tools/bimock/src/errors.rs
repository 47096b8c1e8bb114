use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BimockError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("stale invocation log {path} could not be cleared: {reason}")]
    StaleLogConflict { path: String, reason: String },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("replay overflow: unexpected invocation of {signature}")]
    ReplayOverflow { signature: String },
    #[error("replay incomplete: unconsumed records {pending}")]
    UnconsumedRecords { pending: String },
}
