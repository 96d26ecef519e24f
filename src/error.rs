use std::time::Duration;

use crate::gate::GateKind;

/// Rejected gate construction. Raised before any store interaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("unknown gate kind: {0}")]
    UnknownKind(String),

    #[error("{0} gate requires a non-empty subject")]
    MissingSubject(GateKind),

    #[error("boolean gate does not take a subject (got {0:?})")]
    UnexpectedSubject(String),
}

/// Persistent store faults. Absence of a flag is not one of these.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("corrupt record for flag {flag}: {reason}")]
    Corrupt { flag: String, reason: String },

    #[error("IO error: {0}")]
    Io(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        match e {
            sled::Error::Io(io) => StoreError::Io(io.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalidation channel unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by [`crate::FlagClient`].
///
/// Only a confirmed absence of a flag evaluates to `false`. Everything here is
/// a condition the caller must decide how to handle (fail open or closed).
#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store did not answer for flag {flag} within {after:?}")]
    Timeout { flag: String, after: Duration },

    #[error(transparent)]
    InvalidGate(#[from] GateError),
}

impl FlagError {
    /// True for failures of the persistent store, including timeouts.
    pub fn is_store_fault(&self) -> bool {
        matches!(self, FlagError::Store(_) | FlagError::Timeout { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
}
