//! Error types for tangle.
//!
//! Dependency tracking itself never fails: untracked reads, triggers on
//! unknown keys and deletes of absent keys are silent no-ops. The errors
//! below come from the edges of the runtime (queue flushing, option
//! parsing and JSON conversion).

use thiserror::Error;

/// Errors reported by the reactive runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReactiveError {
    #[error("Job queue still had pending jobs after {rounds} flush rounds")]
    FlushLimitExceeded {
        rounds: usize,
    },

    #[error("Invalid flush mode '{0}', expected one of: sync, pre, post")]
    InvalidFlushMode(String),

    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
